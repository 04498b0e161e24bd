//! DecisionEngine processor.
//!
//! The DecisionEngine is responsible for:
//! - Consuming `RiskRequest` messages from its assigned request lanes
//! - Evaluating each request against `RiskLimits` and the customer's running total
//! - Publishing exactly one `RiskResponse` per request on the response topic
//!
//! A request is committed only once its response is acknowledged by the bus.
//! Response publish failures are retried with backoff. Malformed requests
//! are logged and skipped.
//!
//! Decisions are remembered per correlation id, so a redelivered request
//! gets the same answer again without being counted twice. Only uncommitted
//! deliveries are ever redelivered, so the memo keeps the most recent
//! [`DEFAULT_MEMO_CAPACITY`] decisions and forgets the oldest first. Both
//! this memo and the running totals live in process memory.

use super::lanes::{DeliveryHandler, LaneWorker};
use crate::bus::{Delivery, Lane, MessageBusRef, ParseError, PublishError, decode, encode};
use crate::risk::{Accumulator, Evaluation, RiskLimits};
use crate::utils::backoff::RetryPolicy;
use async_trait::async_trait;
use kanau::processor::Processor;
use payrisk_sdk::messages::{Decision, RiskRequest, RiskResponse};
use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("failed to publish risk response: {0}")]
    Publish(#[from] PublishError),
}

/// Decisions kept for redelivered requests.
pub const DEFAULT_MEMO_CAPACITY: usize = 65_536;

/// Insertion-ordered map that drops its oldest entry past `capacity`.
struct DecisionMemo {
    decisions: HashMap<Uuid, Decision>,
    order: VecDeque<Uuid>,
    capacity: usize,
}

impl DecisionMemo {
    fn new(capacity: usize) -> Self {
        Self {
            decisions: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, correlation_id: &Uuid) -> Option<Decision> {
        self.decisions.get(correlation_id).copied()
    }

    fn insert(&mut self, correlation_id: Uuid, decision: Decision) {
        if self.decisions.insert(correlation_id, decision).is_some() {
            return;
        }
        self.order.push_back(correlation_id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.decisions.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.decisions.len()
    }
}

pub struct DecisionEngine {
    bus: MessageBusRef,
    limits: RiskLimits,
    accumulator: Accumulator,
    decided: RwLock<DecisionMemo>,
    response_topic: String,
}

impl DecisionEngine {
    pub fn new(bus: MessageBusRef, limits: RiskLimits, response_topic: impl Into<String>) -> Self {
        Self {
            bus,
            limits,
            accumulator: Accumulator::new(),
            decided: RwLock::new(DecisionMemo::new(DEFAULT_MEMO_CAPACITY)),
            response_topic: response_topic.into(),
        }
    }

    /// Remember at most `capacity` decisions instead of the default.
    pub fn with_memo_capacity(mut self, capacity: usize) -> Self {
        self.decided = RwLock::new(DecisionMemo::new(capacity));
        self
    }

    /// Number of decisions currently remembered.
    pub async fn memo_len(&self) -> usize {
        self.decided.read().await.len()
    }

    pub fn limits(&self) -> RiskLimits {
        self.limits
    }

    pub fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }

    /// Consume `lanes` until shutdown.
    pub async fn run(
        self: Arc<Self>,
        lanes: Vec<Box<dyn Lane>>,
        retry: RetryPolicy,
        shutdown_rx: watch::Receiver<bool>,
    ) {
        LaneWorker::new("DecisionEngine", self, retry)
            .run(lanes, shutdown_rx)
            .await;
    }

    /// Decide, then publish the response. Returns the decision sent.
    async fn respond(&self, payload: &[u8]) -> Result<Decision, EngineError> {
        let request: RiskRequest = decode(payload)?;
        let Ok(decision) = self.process(request.clone()).await;

        let response = RiskResponse {
            correlation_id: request.correlation_id,
            decision,
        };
        let ack = self
            .bus
            .publish(
                &self.response_topic,
                &response.routing_key(),
                encode(&response)?,
            )
            .await?;

        debug!(
            correlation_id = %response.correlation_id,
            decision = %decision,
            partition = ack.partition,
            offset = ack.offset,
            "Published risk response"
        );
        Ok(decision)
    }
}

impl Processor<RiskRequest> for DecisionEngine {
    type Output = Decision;
    type Error = Infallible;

    async fn process(&self, request: RiskRequest) -> Result<Decision, Infallible> {
        if let Some(decision) = self.decided.read().await.get(&request.correlation_id) {
            debug!(
                correlation_id = %request.correlation_id,
                decision = %decision,
                "Request already decided, reusing decision"
            );
            return Ok(decision);
        }

        let evaluation = self.limits.evaluate(&self.accumulator, &request).await;
        match evaluation {
            Evaluation::Accepted { accumulated } => info!(
                correlation_id = %request.correlation_id,
                customer_id = %request.customer_id,
                amount = %request.amount,
                accumulated = %accumulated,
                "Risk request accepted"
            ),
            Evaluation::Denied(reason) => info!(
                correlation_id = %request.correlation_id,
                customer_id = %request.customer_id,
                amount = %request.amount,
                reason = %reason,
                "Risk request denied"
            ),
        }

        let decision = evaluation.decision();
        self.decided
            .write()
            .await
            .insert(request.correlation_id, decision);
        Ok(decision)
    }
}

#[async_trait]
impl DeliveryHandler for DecisionEngine {
    type Error = EngineError;

    async fn handle(&self, delivery: &Delivery) -> Result<(), EngineError> {
        match self.respond(&delivery.payload).await {
            Ok(_) => Ok(()),
            Err(EngineError::Parse(e)) => {
                warn!(
                    partition = delivery.partition,
                    offset = delivery.offset,
                    key = %delivery.key,
                    error = %e,
                    "Discarding malformed risk request"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
