//! RiskResponseCorrelator processor.
//!
//! Applies each `RiskResponse` to the stored operation it names. Responses
//! are delivered at least once; the stored status is what makes applying
//! them at most once:
//!
//! - unknown correlation id: logged and discarded
//! - operation already terminal: discarded as a duplicate
//! - operation `evaluating`: status and `updated_at` written with a
//!   compare-and-swap on the status
//!
//! Store failures leave the response uncommitted so it is redelivered.

use super::lanes::{DeliveryHandler, LaneWorker};
use crate::bus::{Delivery, Lane, ParseError, decode};
use crate::entities::{OperationStatus, TransitionError, utc_now};
use crate::store::{OperationStoreRef, StoreError};
use crate::utils::backoff::RetryPolicy;
use async_trait::async_trait;
use kanau::processor::Processor;
use payrisk_sdk::messages::RiskResponse;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("no operation with correlation id {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    IllegalTransition(#[from] TransitionError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl CorrelationError {
    /// Whether the same message could succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CorrelationError::Store(_))
    }
}

/// What happened to one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correlation {
    /// The operation moved to this terminal status.
    Applied(OperationStatus),
    /// The operation was already terminal and kept this status.
    Duplicate(OperationStatus),
    /// No operation with this correlation id.
    Unknown(Uuid),
    /// The body could not be decoded.
    Malformed,
}

pub struct RiskResponseCorrelator {
    store: OperationStoreRef,
}

impl RiskResponseCorrelator {
    pub fn new(store: OperationStoreRef) -> Self {
        Self { store }
    }

    /// Consume `lanes` until shutdown.
    pub async fn run(
        self: Arc<Self>,
        lanes: Vec<Box<dyn Lane>>,
        retry: RetryPolicy,
        shutdown_rx: watch::Receiver<bool>,
    ) {
        LaneWorker::new("RiskResponseCorrelator", self, retry)
            .run(lanes, shutdown_rx)
            .await;
    }

    /// Decode and apply one response body.
    ///
    /// Only store failures are returned as errors; everything else is a
    /// settled [`Correlation`].
    pub async fn correlate(&self, payload: &[u8]) -> Result<Correlation, StoreError> {
        let outcome = match decode::<RiskResponse>(payload) {
            Ok(response) => self.process(response).await,
            Err(e) => Err(CorrelationError::Parse(e)),
        };
        match outcome {
            Ok(status) => Ok(Correlation::Applied(status)),
            Err(CorrelationError::Parse(_)) => Ok(Correlation::Malformed),
            Err(CorrelationError::NotFound(id)) => Ok(Correlation::Unknown(id)),
            Err(CorrelationError::IllegalTransition(e)) => Ok(Correlation::Duplicate(e.current)),
            Err(CorrelationError::Store(e)) => Err(e),
        }
    }
}

impl Processor<RiskResponse> for RiskResponseCorrelator {
    type Output = OperationStatus;
    type Error = CorrelationError;

    async fn process(&self, response: RiskResponse) -> Result<OperationStatus, CorrelationError> {
        let id = response.correlation_id;
        let mut operation = self
            .store
            .get_by_correlation_id(id)
            .await?
            .ok_or(CorrelationError::NotFound(id))?;

        let expected = operation.status;
        operation.apply_decision(response.decision, utc_now())?;
        if self.store.update(&operation, expected).await? {
            return Ok(operation.status);
        }

        // Another consumer settled it between our read and write.
        match self.store.get_by_correlation_id(id).await? {
            Some(current) => Err(TransitionError {
                current: current.status,
                attempted: response.decision,
            }
            .into()),
            None => Err(CorrelationError::NotFound(id)),
        }
    }
}

#[async_trait]
impl DeliveryHandler for RiskResponseCorrelator {
    type Error = StoreError;

    async fn handle(&self, delivery: &Delivery) -> Result<(), StoreError> {
        match self.correlate(&delivery.payload).await? {
            Correlation::Applied(status) => info!(
                correlation_id = %delivery.key,
                status = %status,
                "Operation settled"
            ),
            Correlation::Duplicate(status) => debug!(
                correlation_id = %delivery.key,
                status = %status,
                "Operation already settled, ignoring response"
            ),
            Correlation::Unknown(id) => warn!(
                correlation_id = %id,
                "No operation for risk response, discarding"
            ),
            Correlation::Malformed => warn!(
                partition = delivery.partition,
                offset = delivery.offset,
                key = %delivery.key,
                "Discarding malformed risk response"
            ),
        }
        Ok(())
    }
}
