//! The payment operation record and its status state machine.
//!
//! ```text
//! evaluating --accept--> accepted
//! evaluating --deny----> denied
//! ```
//!
//! `accepted` and `denied` are terminal. Re-targeting a terminal operation
//! yields [`TransitionError`], which consumers treat as a no-op.

use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use payrisk_sdk::messages::{Decision, RiskRequest};
use payrisk_sdk::objects::{
    OperationResponse, OperationStatus as SdkOperationStatus, PaymentCreated,
};
use rust_decimal::Decimal;
use thiserror::Error;
use time::PrimitiveDateTime;
use uuid::Uuid;

/// Operation status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see
/// `payrisk_sdk::objects::OperationStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "operation_status")]
pub enum OperationStatus {
    Evaluating,
    Accepted,
    Denied,
}

impl OperationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OperationStatus::Evaluating)
    }

    /// Look up the transition table for `decision`.
    pub fn transition(self, decision: Decision) -> Result<OperationStatus, TransitionError> {
        match self {
            OperationStatus::Evaluating => Ok(decision.into()),
            current => Err(TransitionError {
                current,
                attempted: decision,
            }),
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&SdkOperationStatus::from(*self), f)
    }
}

impl From<Decision> for OperationStatus {
    fn from(value: Decision) -> Self {
        match value {
            Decision::Accepted => OperationStatus::Accepted,
            Decision::Denied => OperationStatus::Denied,
        }
    }
}

impl From<OperationStatus> for SdkOperationStatus {
    fn from(value: OperationStatus) -> Self {
        match value {
            OperationStatus::Evaluating => SdkOperationStatus::Evaluating,
            OperationStatus::Accepted => SdkOperationStatus::Accepted,
            OperationStatus::Denied => SdkOperationStatus::Denied,
        }
    }
}

/// A decision was applied to an operation that already left `evaluating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot apply {attempted} to an operation that is already {current}")]
pub struct TransitionError {
    pub current: OperationStatus,
    pub attempted: Decision,
}

/// A payment operation awaiting, or holding, a risk decision.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Operation {
    pub id: Uuid,
    /// Join key across the asynchronous boundary. Assigned once, never changes.
    pub correlation_id: Uuid,
    pub customer_id: Uuid,
    pub counterparty_id: Uuid,
    pub payment_method_id: i32,
    pub amount: Decimal,
    pub status: OperationStatus,
    pub created_at: PrimitiveDateTime,
    /// `None` until the terminal transition lands.
    pub updated_at: Option<PrimitiveDateTime>,
}

impl Operation {
    /// Build a fresh operation in `evaluating` with a newly minted correlation id.
    pub fn new_evaluating(
        customer_id: Uuid,
        counterparty_id: Uuid,
        payment_method_id: i32,
        amount: Decimal,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            correlation_id: Uuid::new_v4(),
            customer_id,
            counterparty_id,
            payment_method_id,
            amount,
            status: OperationStatus::Evaluating,
            created_at: utc_now(),
            updated_at: None,
        }
    }

    /// The evaluation request to publish for this operation.
    pub fn risk_request(&self) -> RiskRequest {
        RiskRequest {
            correlation_id: self.correlation_id,
            customer_id: self.customer_id,
            amount: self.amount,
        }
    }

    /// Move to the terminal status named by `decision`, stamping `updated_at`.
    ///
    /// Leaves the record untouched if it is already terminal.
    pub fn apply_decision(
        &mut self,
        decision: Decision,
        at: PrimitiveDateTime,
    ) -> Result<(), TransitionError> {
        self.status = self.status.transition(decision)?;
        self.updated_at = Some(at);
        Ok(())
    }

    pub fn to_created_response(&self) -> PaymentCreated {
        PaymentCreated {
            external_operation_id: self.correlation_id,
            created_at: self.created_at.assume_utc().unix_timestamp(),
            status: self.status.into(),
        }
    }

    pub fn to_response(&self) -> OperationResponse {
        OperationResponse {
            external_operation_id: self.correlation_id,
            created_at: self.created_at.assume_utc().unix_timestamp(),
            status: self.status.into(),
            updated_at: self
                .updated_at
                .map(|at| at.assume_utc().unix_timestamp()),
        }
    }
}

/// Current UTC wall-clock time without offset, as stored in the database.
pub fn utc_now() -> PrimitiveDateTime {
    let now = time::OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
/// Insert a newly created operation.
pub struct InsertOperation {
    pub operation: Operation,
}

impl Processor<InsertOperation> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertOperation")]
    async fn process(&self, query: InsertOperation) -> Result<(), sqlx::Error> {
        let op = query.operation;
        sqlx::query(
            r#"
            INSERT INTO payment_operations (
                id, correlation_id, customer_id, counterparty_id,
                payment_method_id, amount, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(op.id)
        .bind(op.correlation_id)
        .bind(op.customer_id)
        .bind(op.counterparty_id)
        .bind(op.payment_method_id)
        .bind(op.amount)
        .bind(op.status)
        .bind(op.created_at)
        .bind(op.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Point lookup by correlation id.
pub struct GetOperationByCorrelationId {
    pub correlation_id: Uuid,
}

impl Processor<GetOperationByCorrelationId> for DatabaseProcessor {
    type Output = Option<Operation>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetOperationByCorrelationId")]
    async fn process(
        &self,
        query: GetOperationByCorrelationId,
    ) -> Result<Option<Operation>, sqlx::Error> {
        let operation = sqlx::query_as::<_, Operation>(
            r#"
            SELECT
                id, correlation_id, customer_id, counterparty_id,
                payment_method_id, amount, status, created_at, updated_at
            FROM payment_operations
            WHERE correlation_id = $1
            "#,
        )
        .bind(query.correlation_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(operation)
    }
}

#[derive(Debug, Clone)]
/// Conditionally write a new status.
///
/// The row is only touched while its status still equals `expected`, which
/// makes the write a compare-and-swap across concurrent consumers.
pub struct UpdateOperationStatus {
    pub correlation_id: Uuid,
    pub expected: OperationStatus,
    pub status: OperationStatus,
    pub updated_at: Option<PrimitiveDateTime>,
}

impl Processor<UpdateOperationStatus> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpdateOperationStatus")]
    async fn process(&self, query: UpdateOperationStatus) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE payment_operations
            SET status = $2, updated_at = $3
            WHERE correlation_id = $1 AND status = $4
            "#,
        )
        .bind(query.correlation_id)
        .bind(query.status)
        .bind(query.updated_at)
        .bind(query.expected)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
