//! Per-lane consume loop shared by the bus consumers.
//!
//! Every lane gets its own task, so a slow message only holds up its own
//! partition. Within a lane the loop is strictly sequential: a delivery is
//! committed only after its handler succeeds, and the next one is not pulled
//! before that.

use crate::bus::{Delivery, Lane};
use crate::utils::backoff::{RetryPolicy, sleep_or_shutdown};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Side effects for one delivery.
///
/// `Ok` means the delivery may be committed, including when it was
/// deliberately discarded. `Err` means it must be retried.
#[async_trait]
pub trait DeliveryHandler: Send + Sync + 'static {
    type Error: std::fmt::Display + Send;

    async fn handle(&self, delivery: &Delivery) -> Result<(), Self::Error>;
}

pub struct LaneWorker<H> {
    name: &'static str,
    handler: Arc<H>,
    retry: RetryPolicy,
}

impl<H: DeliveryHandler> LaneWorker<H> {
    pub fn new(name: &'static str, handler: Arc<H>, retry: RetryPolicy) -> Self {
        Self {
            name,
            handler,
            retry,
        }
    }

    /// Drive every lane until shutdown or until the bus closes them.
    pub async fn run(self, lanes: Vec<Box<dyn Lane>>, shutdown_rx: watch::Receiver<bool>) {
        info!(worker = self.name, lanes = lanes.len(), "Worker started");

        let mut tasks = JoinSet::new();
        for lane in lanes {
            tasks.spawn(drive_lane(
                self.name,
                self.handler.clone(),
                self.retry,
                lane,
                shutdown_rx.clone(),
            ));
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(worker = self.name, error = %e, "Lane task failed");
            }
        }

        info!(worker = self.name, "Worker shutdown complete");
    }
}

async fn drive_lane<H: DeliveryHandler>(
    name: &'static str,
    handler: Arc<H>,
    retry: RetryPolicy,
    mut lane: Box<dyn Lane>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let partition = lane.partition();

    loop {
        if *shutdown_rx.borrow() {
            info!(worker = name, partition, "Lane received shutdown signal");
            break;
        }

        let delivery = tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!(worker = name, partition, "Lane received shutdown signal");
                    break;
                }
                continue;
            }

            delivery = lane.recv() => match delivery {
                Some(delivery) => delivery,
                None => {
                    info!(worker = name, partition, "Lane closed");
                    break;
                }
            },
        };

        debug!(
            worker = name,
            partition,
            offset = delivery.offset,
            key = %delivery.key,
            "Received delivery"
        );

        let mut attempt = 0u32;
        loop {
            match handler.handle(&delivery).await {
                Ok(()) => break,
                Err(e) => {
                    let delay = retry.delay(attempt);
                    error!(
                        worker = name,
                        partition,
                        offset = delivery.offset,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Failed to handle delivery, will retry"
                    );
                    attempt = attempt.saturating_add(1);
                    if !sleep_or_shutdown(delay, &mut shutdown_rx).await {
                        info!(
                            worker = name,
                            partition,
                            offset = delivery.offset,
                            "Shutdown during retry, leaving delivery uncommitted"
                        );
                        return;
                    }
                }
            }
        }

        if let Err(e) = lane.commit(&delivery).await {
            error!(
                worker = name,
                partition,
                offset = delivery.offset,
                error = %e,
                "Failed to commit delivery"
            );
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{InMemoryBus, LaneAssignment, MessageBus};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex;

    const TOPIC: &str = "lanes";
    const GROUP: &str = "lanes-group";

    /// Fails the first `failures` calls, then records payloads.
    struct Recording {
        failures: AtomicU32,
        seen: Mutex<Vec<Bytes>>,
    }

    #[async_trait]
    impl DeliveryHandler for Recording {
        type Error = String;

        async fn handle(&self, delivery: &Delivery) -> Result<(), String> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err("transient".to_string());
            }
            self.seen.lock().await.push(delivery.payload.clone());
            Ok(())
        }
    }

    /// Takes `delay` per delivery, then records its payload.
    struct Slow {
        delay: Duration,
        seen: Mutex<Vec<Bytes>>,
    }

    #[async_trait]
    impl DeliveryHandler for Slow {
        type Error = String;

        async fn handle(&self, delivery: &Delivery) -> Result<(), String> {
            tokio::time::sleep(self.delay).await;
            self.seen.lock().await.push(delivery.payload.clone());
            Ok(())
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_retries_then_commits_in_order() {
        let bus = InMemoryBus::new(1);
        for payload in ["a", "b", "c"] {
            bus.publish(TOPIC, "same-key", Bytes::from(payload)).await.unwrap();
        }
        let handler = Arc::new(Recording {
            failures: AtomicU32::new(2),
            seen: Mutex::new(Vec::new()),
        });
        let lanes = bus.subscribe(TOPIC, GROUP, LaneAssignment::SOLE).await.unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(
            LaneWorker::new("test", handler.clone(), fast_retry()).run(lanes, shutdown_rx),
        );

        tokio::time::timeout(Duration::from_secs(2), async {
            while bus.committed_offset(TOPIC, GROUP, 0).await != Some(3) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(true).unwrap();
        worker.await.unwrap();
        let seen = handler.seen.lock().await.clone();
        assert_eq!(seen, vec![Bytes::from("a"), Bytes::from("b"), Bytes::from("c")]);
    }

    #[tokio::test]
    async fn test_shutdown_during_retry_leaves_delivery_uncommitted() {
        let bus = InMemoryBus::new(1);
        bus.publish(TOPIC, "k", Bytes::from("stuck")).await.unwrap();
        let handler = Arc::new(Recording {
            failures: AtomicU32::new(u32::MAX),
            seen: Mutex::new(Vec::new()),
        });
        let lanes = bus.subscribe(TOPIC, GROUP, LaneAssignment::SOLE).await.unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(
            LaneWorker::new("test", handler, RetryPolicy::default()).run(lanes, shutdown_rx),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bus.committed_offset(TOPIC, GROUP, 0).await, None);
    }

    #[tokio::test]
    async fn test_shutdown_mid_handle_finishes_in_flight_and_pulls_nothing_more() {
        let bus = InMemoryBus::new(1);
        for payload in ["first", "second"] {
            bus.publish(TOPIC, "k", Bytes::from(payload)).await.unwrap();
        }
        let handler = Arc::new(Slow {
            delay: Duration::from_millis(100),
            seen: Mutex::new(Vec::new()),
        });
        let lanes = bus.subscribe(TOPIC, GROUP, LaneAssignment::SOLE).await.unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(
            LaneWorker::new("test", handler.clone(), fast_retry()).run(lanes, shutdown_rx),
        );

        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(bus.committed_offset(TOPIC, GROUP, 0).await, Some(1));
        assert_eq!(*handler.seen.lock().await, vec![Bytes::from("first")]);
    }
}
