//! RiskRequestEmitter processor.
//!
//! Publishes one `RiskRequest` per created operation on the request topic,
//! keyed by correlation id. The caller must have persisted the operation in
//! `evaluating` before emitting, otherwise a fast response could arrive for
//! an operation that does not exist yet.
//!
//! Publish failures are returned to the caller, never dropped. An operation
//! whose request was never published stays `evaluating`; nothing here
//! retries it later.

use crate::bus::{MessageBusRef, PublishAck, PublishError, encode};
use crate::events::{EmitCommand, EmitCommandReceiver, EmitCommandSender};
use payrisk_sdk::messages::RiskRequest;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info};

pub struct RiskRequestEmitter {
    bus: MessageBusRef,
    topic: String,
}

impl RiskRequestEmitter {
    pub fn new(bus: MessageBusRef, topic: impl Into<String>) -> Self {
        Self {
            bus,
            topic: topic.into(),
        }
    }

    /// Publish `request` and wait for the bus acknowledgement.
    pub async fn emit(&self, request: &RiskRequest) -> Result<PublishAck, PublishError> {
        let payload = encode(request)?;
        match self
            .bus
            .publish(&self.topic, &request.routing_key(), payload)
            .await
        {
            Ok(ack) => {
                info!(
                    correlation_id = %request.correlation_id,
                    topic = %ack.topic,
                    partition = ack.partition,
                    offset = ack.offset,
                    "Published risk request"
                );
                Ok(ack)
            }
            Err(e) => {
                error!(
                    correlation_id = %request.correlation_id,
                    topic = %self.topic,
                    error = %e,
                    "Failed to publish risk request"
                );
                Err(e)
            }
        }
    }

    /// Run the emitter as a worker fed by [`EmitterHandle`]s.
    ///
    /// Commands already queued when shutdown arrives are still published.
    /// The worker also stops once every handle has been dropped.
    pub async fn run(self, mut commands: EmitCommandReceiver, mut shutdown_rx: watch::Receiver<bool>) {
        info!(topic = %self.topic, "RiskRequestEmitter started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("RiskRequestEmitter received shutdown signal");
                        break;
                    }
                }

                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        info!("EmitCommand channel closed");
                        break;
                    }
                },
            }
        }

        commands.close();
        while let Ok(command) = commands.try_recv() {
            self.handle_command(command).await;
        }

        info!("RiskRequestEmitter shutdown complete");
    }

    async fn handle_command(&self, command: EmitCommand) {
        let EmitCommand { request, reply } = command;
        let result = self.emit(&request).await;
        if reply.send(result).is_err() {
            debug!(
                correlation_id = %request.correlation_id,
                "Emit caller went away before the reply"
            );
        }
    }
}

/// Cloneable front end to a running [`RiskRequestEmitter`].
#[derive(Clone)]
pub struct EmitterHandle {
    commands: EmitCommandSender,
}

impl EmitterHandle {
    pub fn new(commands: EmitCommandSender) -> Self {
        Self { commands }
    }

    /// Publish through the worker. Fails with [`PublishError::Closed`] if it
    /// has stopped.
    pub async fn emit(&self, request: RiskRequest) -> Result<PublishAck, PublishError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(EmitCommand { request, reply })
            .await
            .map_err(|_| PublishError::Closed)?;
        response.await.map_err(|_| PublishError::Closed)?
    }
}
