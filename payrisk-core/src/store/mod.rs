//! Operation store port.
//!
//! The store is the single source of truth for an operation's status. The
//! correlator never trusts an in-memory copy: every decision about whether a
//! transition is legal is made against what [`OperationStore::get_by_correlation_id`]
//! returns, and written back with the compare-and-swap [`OperationStore::update`].

mod memory;
mod postgres;

pub use memory::InMemoryOperationStore;
pub use postgres::PgOperationStore;

use crate::entities::{Operation, OperationStatus};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by an [`OperationStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An operation with this correlation id already exists.
    #[error("operation with correlation id {0} already exists")]
    Conflict(Uuid),

    /// The backing store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait OperationStore: Send + Sync {
    /// Persist a new operation. Correlation ids are unique.
    async fn insert(&self, operation: &Operation) -> Result<(), StoreError>;

    async fn get_by_correlation_id(
        &self,
        correlation_id: Uuid,
    ) -> Result<Option<Operation>, StoreError>;

    /// Write `operation`'s status and `updated_at` if the stored status is
    /// still `expected`.
    ///
    /// Returns `false` when the stored record is missing or has moved on.
    async fn update(
        &self,
        operation: &Operation,
        expected: OperationStatus,
    ) -> Result<bool, StoreError>;
}

pub type OperationStoreRef = Arc<dyn OperationStore>;
