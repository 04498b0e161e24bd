//! Payment API request and response types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::messages::Decision;

/// Operation status for API responses.
///
/// This is the API/DTO version without sqlx::Type.
/// For database operations, use the version in `payrisk-core::entities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Evaluating,
    Accepted,
    Denied,
}

impl OperationStatus {
    /// `accepted` and `denied` are final.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::Evaluating)
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

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationStatus::Evaluating => write!(f, "evaluating"),
            OperationStatus::Accepted => write!(f, "accepted"),
            OperationStatus::Denied => write!(f, "denied"),
        }
    }
}

/// Request body for `POST /api/payments`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub customer_id: Uuid,
    /// The counterparty receiving the payment.
    pub service_provider_id: Uuid,
    pub payment_method_id: i32,
    pub amount: Decimal,
}

/// Response body returned after an operation is created.
///
/// The operation always starts in `evaluating`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCreated {
    pub external_operation_id: Uuid,
    /// Unix timestamp (seconds).
    pub created_at: i64,
    pub status: OperationStatus,
}

/// Response body for `GET /api/payments/{externalOperationId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    pub external_operation_id: Uuid,
    pub created_at: i64,
    pub status: OperationStatus,
    /// Set once the operation reaches a terminal status.
    pub updated_at: Option<i64>,
}
