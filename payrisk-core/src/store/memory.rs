use super::{OperationStore, StoreError};
use crate::entities::{Operation, OperationStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A thread-safe in-memory operation store keyed by correlation id.
///
/// Ideal for testing or single-process deployments where persistence is not
/// required.
#[derive(Default, Clone)]
pub struct InMemoryOperationStore {
    operations: Arc<RwLock<HashMap<Uuid, Operation>>>,
}

impl InMemoryOperationStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.operations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.operations.read().await.is_empty()
    }
}

#[async_trait]
impl OperationStore for InMemoryOperationStore {
    async fn insert(&self, operation: &Operation) -> Result<(), StoreError> {
        let mut operations = self.operations.write().await;
        match operations.entry(operation.correlation_id) {
            Entry::Occupied(_) => Err(StoreError::Conflict(operation.correlation_id)),
            Entry::Vacant(slot) => {
                slot.insert(operation.clone());
                Ok(())
            }
        }
    }

    async fn get_by_correlation_id(
        &self,
        correlation_id: Uuid,
    ) -> Result<Option<Operation>, StoreError> {
        let operations = self.operations.read().await;
        Ok(operations.get(&correlation_id).cloned())
    }

    async fn update(
        &self,
        operation: &Operation,
        expected: OperationStatus,
    ) -> Result<bool, StoreError> {
        let mut operations = self.operations.write().await;
        match operations.get_mut(&operation.correlation_id) {
            Some(stored) if stored.status == expected => {
                stored.status = operation.status;
                stored.updated_at = operation.updated_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::utc_now;
    use payrisk_sdk::messages::Decision;
    use rust_decimal_macros::dec;

    fn operation() -> Operation {
        Operation::new_evaluating(Uuid::new_v4(), Uuid::new_v4(), 7, dec!(250))
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let store = InMemoryOperationStore::new();
        let op = operation();
        store.insert(&op).await.unwrap();

        let found = store.get_by_correlation_id(op.correlation_id).await.unwrap();
        assert_eq!(found, Some(op));
        assert!(
            store
                .get_by_correlation_id(Uuid::new_v4())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_duplicate_correlation_id_is_rejected() {
        let store = InMemoryOperationStore::new();
        let op = operation();
        store.insert(&op).await.unwrap();
        assert!(matches!(
            store.insert(&op).await,
            Err(StoreError::Conflict(id)) if id == op.correlation_id
        ));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_is_compare_and_swap() {
        let store = InMemoryOperationStore::new();
        let op = operation();
        store.insert(&op).await.unwrap();

        let mut accepted = op.clone();
        accepted.apply_decision(Decision::Accepted, utc_now()).unwrap();
        assert!(store.update(&accepted, OperationStatus::Evaluating).await.unwrap());

        // A second writer still expecting `evaluating` loses.
        let mut denied = op.clone();
        denied.apply_decision(Decision::Denied, utc_now()).unwrap();
        assert!(!store.update(&denied, OperationStatus::Evaluating).await.unwrap());

        let stored = store
            .get_by_correlation_id(op.correlation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, OperationStatus::Accepted);
        assert_eq!(stored.updated_at, accepted.updated_at);
    }

    #[tokio::test]
    async fn test_update_of_unknown_operation_does_not_create_it() {
        let store = InMemoryOperationStore::new();
        let mut op = operation();
        op.apply_decision(Decision::Accepted, utc_now()).unwrap();
        assert!(!store.update(&op, OperationStatus::Evaluating).await.unwrap());
        assert!(store.is_empty().await);
    }
}
