//! End-to-end tests: emitter -> decision engine -> correlator, over the
//! in-memory bus and store.

use async_trait::async_trait;
use bytes::Bytes;
use payrisk_core::bus::{
    BusError, InMemoryBus, Lane, LaneAssignment, MessageBus, MessageBusRef, PublishAck,
    PublishError, encode,
};
use payrisk_core::entities::{Operation, OperationStatus};
use payrisk_core::events::emit_command_channel;
use payrisk_core::processors::{
    DecisionEngine, EmitterHandle, RiskRequestEmitter, RiskResponseCorrelator,
};
use payrisk_core::risk::RiskLimits;
use payrisk_core::store::{
    InMemoryOperationStore, OperationStore, OperationStoreRef, StoreError,
};
use payrisk_core::utils::backoff::RetryPolicy;
use payrisk_sdk::messages::{Decision, RiskResponse};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

const REQUESTS: &str = "risk-evaluation-request";
const RESPONSES: &str = "risk-evaluation-response";
const ENGINE_GROUP: &str = "risk-simulator-group";
const CORRELATOR_GROUP: &str = "payment-api-response-consumer";

struct Pipeline {
    bus: InMemoryBus,
    store: InMemoryOperationStore,
    engine: Arc<DecisionEngine>,
    emitter: EmitterHandle,
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl Pipeline {
    async fn start() -> Self {
        let bus = InMemoryBus::new(4);
        let store = InMemoryOperationStore::new();
        Self::start_with(bus.clone(), Arc::new(bus), store.clone(), Arc::new(store)).await
    }

    async fn start_with(
        bus: InMemoryBus,
        bus_port: MessageBusRef,
        store: InMemoryOperationStore,
        store_port: OperationStoreRef,
    ) -> Self {
        let retry = RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(20));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut workers = Vec::new();

        let (commands_tx, commands_rx) = emit_command_channel();
        let emitter = RiskRequestEmitter::new(bus_port.clone(), REQUESTS);
        workers.push(tokio::spawn(emitter.run(commands_rx, shutdown_rx.clone())));

        let engine = Arc::new(DecisionEngine::new(
            bus_port.clone(),
            RiskLimits::default(),
            RESPONSES,
        ));
        let lanes = bus_port
            .subscribe(REQUESTS, ENGINE_GROUP, LaneAssignment::SOLE)
            .await
            .unwrap();
        workers.push(tokio::spawn(
            engine.clone().run(lanes, retry, shutdown_rx.clone()),
        ));

        let correlator = Arc::new(RiskResponseCorrelator::new(store_port));
        let lanes = bus_port
            .subscribe(RESPONSES, CORRELATOR_GROUP, LaneAssignment::SOLE)
            .await
            .unwrap();
        workers.push(tokio::spawn(correlator.run(lanes, retry, shutdown_rx)));

        Self {
            bus,
            store,
            engine,
            emitter: EmitterHandle::new(commands_tx),
            shutdown_tx,
            workers,
        }
    }

    /// Persist first, then emit.
    async fn create(&self, customer_id: Uuid, amount: Decimal) -> Operation {
        let op = Operation::new_evaluating(customer_id, Uuid::new_v4(), 1, amount);
        self.store.insert(&op).await.unwrap();
        self.emitter.emit(op.risk_request()).await.unwrap();
        op
    }

    async fn settled(&self, correlation_id: Uuid) -> Operation {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match self.store.get_by_correlation_id(correlation_id).await.unwrap() {
                    Some(op) if op.status.is_terminal() => return op,
                    _ => tokio::time::sleep(Duration::from_millis(5)).await,
                }
            }
        })
        .await
        .expect("operation never settled")
    }

    /// Wait until `group` has committed everything published on `topic`.
    async fn drained(&self, topic: &str, group: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let published = self.bus.published_count(topic).await as u64;
                let mut committed = 0;
                for partition in 0..self.bus.partitions() {
                    committed += self
                        .bus
                        .committed_offset(topic, group, partition)
                        .await
                        .unwrap_or(0);
                }
                if committed == published {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("topic never drained")
    }

    async fn publish_response(&self, correlation_id: Uuid, decision: Decision) {
        let response = RiskResponse {
            correlation_id,
            decision,
        };
        self.bus
            .publish(RESPONSES, &response.routing_key(), encode(&response).unwrap())
            .await
            .unwrap();
    }

    async fn shutdown(self) {
        self.shutdown_tx.send(true).unwrap();
        for worker in self.workers {
            tokio::time::timeout(Duration::from_secs(2), worker)
                .await
                .expect("worker did not stop")
                .unwrap();
        }
    }
}

#[tokio::test]
async fn test_operation_is_accepted_end_to_end() {
    let pipeline = Pipeline::start().await;
    let op = pipeline.create(Uuid::new_v4(), dec!(100)).await;
    assert_eq!(op.status, OperationStatus::Evaluating);

    let settled = pipeline.settled(op.correlation_id).await;
    assert_eq!(settled.status, OperationStatus::Accepted);
    assert!(settled.updated_at.is_some());
    assert_eq!(settled.created_at, op.created_at);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_response_leaves_record_unchanged() {
    let pipeline = Pipeline::start().await;
    let op = pipeline.create(Uuid::new_v4(), dec!(100)).await;
    let settled = pipeline.settled(op.correlation_id).await;

    pipeline
        .publish_response(op.correlation_id, Decision::Accepted)
        .await;
    pipeline.drained(RESPONSES, CORRELATOR_GROUP).await;

    let after = pipeline
        .store
        .get_by_correlation_id(op.correlation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after, settled);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_accepted_is_not_overwritten_by_late_denial() {
    let pipeline = Pipeline::start().await;
    let op = pipeline.create(Uuid::new_v4(), dec!(100)).await;
    let settled = pipeline.settled(op.correlation_id).await;
    assert_eq!(settled.status, OperationStatus::Accepted);

    pipeline
        .publish_response(op.correlation_id, Decision::Denied)
        .await;
    pipeline.drained(RESPONSES, CORRELATOR_GROUP).await;

    let after = pipeline
        .store
        .get_by_correlation_id(op.correlation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.status, OperationStatus::Accepted);
    assert_eq!(after.updated_at, settled.updated_at);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_unknown_response_is_discarded_and_committed() {
    let pipeline = Pipeline::start().await;
    let stranger = Uuid::new_v4();
    pipeline.publish_response(stranger, Decision::Accepted).await;
    pipeline.drained(RESPONSES, CORRELATOR_GROUP).await;

    assert!(
        pipeline
            .store
            .get_by_correlation_id(stranger)
            .await
            .unwrap()
            .is_none()
    );
    assert!(pipeline.store.is_empty().await);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_malformed_request_does_not_block_lane() {
    let pipeline = Pipeline::start().await;
    pipeline
        .bus
        .publish(REQUESTS, "garbage", Bytes::from_static(b"{oops"))
        .await
        .unwrap();

    let op = pipeline.create(Uuid::new_v4(), dec!(50)).await;
    assert_eq!(
        pipeline.settled(op.correlation_id).await.status,
        OperationStatus::Accepted
    );
    pipeline.drained(REQUESTS, ENGINE_GROUP).await;
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_per_transaction_ceiling() {
    let pipeline = Pipeline::start().await;
    let customer = Uuid::new_v4();

    let over = pipeline.create(customer, dec!(2001)).await;
    assert_eq!(
        pipeline.settled(over.correlation_id).await.status,
        OperationStatus::Denied
    );

    let at = pipeline.create(customer, dec!(2000)).await;
    assert_eq!(
        pipeline.settled(at.correlation_id).await.status,
        OperationStatus::Accepted
    );
    assert_eq!(pipeline.engine.accumulator().total(customer).await, dec!(2000));
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_daily_ceiling() {
    let pipeline = Pipeline::start().await;
    let customer = Uuid::new_v4();

    for amount in [dec!(2000), dec!(2000), dec!(800)] {
        let op = pipeline.create(customer, amount).await;
        assert_eq!(
            pipeline.settled(op.correlation_id).await.status,
            OperationStatus::Accepted
        );
    }
    assert_eq!(pipeline.engine.accumulator().total(customer).await, dec!(4800));

    let too_much = pipeline.create(customer, dec!(300)).await;
    assert_eq!(
        pipeline.settled(too_much.correlation_id).await.status,
        OperationStatus::Denied
    );

    let fits = pipeline.create(customer, dec!(200)).await;
    assert_eq!(
        pipeline.settled(fits.correlation_id).await.status,
        OperationStatus::Accepted
    );
    assert_eq!(pipeline.engine.accumulator().total(customer).await, dec!(5000));
    pipeline.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_accumulator_matches_accepted_amounts_across_customers() {
    let pipeline = Arc::new(Pipeline::start().await);
    let customers: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();

    let mut tasks = Vec::new();
    for customer in customers.iter().copied() {
        for _ in 0..6 {
            let pipeline = pipeline.clone();
            tasks.push(tokio::spawn(async move {
                let op = pipeline.create(customer, dec!(1000)).await;
                pipeline.settled(op.correlation_id).await
            }));
        }
    }

    let mut settled = Vec::new();
    for task in tasks {
        settled.push(task.await.unwrap());
    }

    for customer in &customers {
        let accepted: Decimal = settled
            .iter()
            .filter(|op| op.customer_id == *customer && op.status == OperationStatus::Accepted)
            .map(|op| op.amount)
            .sum();
        // Five of six 1000s fit under the 5000 ceiling.
        assert_eq!(accepted, dec!(5000));
        assert_eq!(pipeline.engine.accumulator().total(*customer).await, accepted);
    }

    let pipeline = Arc::into_inner(pipeline).expect("pipeline still shared");
    pipeline.shutdown().await;
}

/// Store that fails the first `failures` lookups.
struct FlakyStore {
    inner: InMemoryOperationStore,
    failures: AtomicU32,
}

impl FlakyStore {
    fn trip(&self) -> Result<(), StoreError> {
        match self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(_) => Err(StoreError::Unavailable("injected failure".to_string())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl OperationStore for FlakyStore {
    async fn insert(&self, operation: &Operation) -> Result<(), StoreError> {
        self.inner.insert(operation).await
    }

    async fn get_by_correlation_id(
        &self,
        correlation_id: Uuid,
    ) -> Result<Option<Operation>, StoreError> {
        self.trip()?;
        self.inner.get_by_correlation_id(correlation_id).await
    }

    async fn update(
        &self,
        operation: &Operation,
        expected: OperationStatus,
    ) -> Result<bool, StoreError> {
        self.inner.update(operation, expected).await
    }
}

#[tokio::test]
async fn test_store_failures_are_retried_not_dropped() {
    let bus = InMemoryBus::new(2);
    let store = InMemoryOperationStore::new();
    let flaky = Arc::new(FlakyStore {
        inner: store.clone(),
        failures: AtomicU32::new(3),
    });
    let pipeline = Pipeline::start_with(bus.clone(), Arc::new(bus), store, flaky.clone()).await;

    let op = pipeline.create(Uuid::new_v4(), dec!(100)).await;
    assert_eq!(
        pipeline.settled(op.correlation_id).await.status,
        OperationStatus::Accepted
    );
    assert_eq!(flaky.failures.load(Ordering::SeqCst), 0);
    pipeline.shutdown().await;
}

/// Bus whose response publishes fail `failures` times.
struct FlakyBus {
    inner: InMemoryBus,
    failures: AtomicU32,
}

#[async_trait]
impl MessageBus for FlakyBus {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: Bytes,
    ) -> Result<PublishAck, PublishError> {
        if topic == RESPONSES
            && self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(PublishError::Unavailable("injected failure".to_string()));
        }
        self.inner.publish(topic, key, payload).await
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        assignment: LaneAssignment,
    ) -> Result<Vec<Box<dyn Lane>>, BusError> {
        self.inner.subscribe(topic, group, assignment).await
    }
}

#[tokio::test]
async fn test_response_publish_failures_are_retried_without_double_counting() {
    let bus = InMemoryBus::new(2);
    let store = InMemoryOperationStore::new();
    let flaky = Arc::new(FlakyBus {
        inner: bus.clone(),
        failures: AtomicU32::new(3),
    });
    let pipeline = Pipeline::start_with(bus, flaky.clone(), store.clone(), Arc::new(store)).await;

    let customer = Uuid::new_v4();
    let op = pipeline.create(customer, dec!(700)).await;
    assert_eq!(
        pipeline.settled(op.correlation_id).await.status,
        OperationStatus::Accepted
    );
    assert_eq!(flaky.failures.load(Ordering::SeqCst), 0);
    assert_eq!(pipeline.engine.accumulator().total(customer).await, dec!(700));
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_workers_resume_from_committed_offsets() {
    let bus = InMemoryBus::new(2);
    let store = InMemoryOperationStore::new();

    let first = Pipeline::start_with(
        bus.clone(),
        Arc::new(bus.clone()),
        store.clone(),
        Arc::new(store.clone()),
    )
    .await;
    let op = first.create(Uuid::new_v4(), dec!(100)).await;
    first.settled(op.correlation_id).await;
    first.drained(REQUESTS, ENGINE_GROUP).await;
    first.drained(RESPONSES, CORRELATOR_GROUP).await;
    first.shutdown().await;

    // A replacement set of workers must not replay already-committed work.
    let second = Pipeline::start_with(
        bus.clone(),
        Arc::new(bus.clone()),
        store.clone(),
        Arc::new(store),
    )
    .await;
    let op2 = second.create(Uuid::new_v4(), dec!(100)).await;
    second.settled(op2.correlation_id).await;
    second.drained(REQUESTS, ENGINE_GROUP).await;
    assert_eq!(bus.published_count(RESPONSES).await, 2);
    second.shutdown().await;
}
