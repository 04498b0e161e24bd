use super::{OperationStore, StoreError};
use crate::entities::operations::{
    GetOperationByCorrelationId, InsertOperation, UpdateOperationStatus,
};
use crate::entities::{Operation, OperationStatus};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use sqlx::PgPool;
use uuid::Uuid;

/// Postgres-backed operation store (`payment_operations` table).
#[derive(Clone)]
pub struct PgOperationStore {
    processor: DatabaseProcessor,
}

impl PgOperationStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            processor: DatabaseProcessor { pool },
        }
    }
}

#[async_trait]
impl OperationStore for PgOperationStore {
    async fn insert(&self, operation: &Operation) -> Result<(), StoreError> {
        self.processor
            .process(InsertOperation {
                operation: operation.clone(),
            })
            .await
            .map_err(|e| match e.as_database_error() {
                Some(db) if db.is_unique_violation() => {
                    StoreError::Conflict(operation.correlation_id)
                }
                _ => StoreError::Database(e),
            })
    }

    async fn get_by_correlation_id(
        &self,
        correlation_id: Uuid,
    ) -> Result<Option<Operation>, StoreError> {
        let operation = self
            .processor
            .process(GetOperationByCorrelationId { correlation_id })
            .await?;
        Ok(operation)
    }

    async fn update(
        &self,
        operation: &Operation,
        expected: OperationStatus,
    ) -> Result<bool, StoreError> {
        let applied = self
            .processor
            .process(UpdateOperationStatus {
                correlation_id: operation.correlation_id,
                expected,
                status: operation.status,
                updated_at: operation.updated_at,
            })
            .await?;
        Ok(applied)
    }
}
