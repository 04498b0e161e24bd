//! Message bus payloads.
//!
//! Both messages are keyed by `correlation_id` on the bus so every message
//! belonging to one operation travels through the same ordered lane.
//!
//! Field names are camelCase on the wire. The PascalCase names used by older
//! producers (`ExternalOperationId`, `CustomerId`, `Amount`, `Status`) are
//! accepted when decoding.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of a risk evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accepted,
    Denied,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Accepted => write!(f, "accepted"),
            Decision::Denied => write!(f, "denied"),
        }
    }
}

/// Evaluation request published once per newly created operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskRequest {
    #[serde(alias = "ExternalOperationId")]
    pub correlation_id: Uuid,
    #[serde(alias = "CustomerId")]
    pub customer_id: Uuid,
    #[serde(alias = "Amount")]
    pub amount: Decimal,
}

impl RiskRequest {
    /// Routing key on the bus.
    pub fn routing_key(&self) -> String {
        self.correlation_id.to_string()
    }
}

/// Decision published by the decision service for one request.
///
/// The bus may deliver zero, one or several copies of the same response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskResponse {
    #[serde(alias = "ExternalOperationId")]
    pub correlation_id: Uuid,
    #[serde(alias = "status", alias = "Status")]
    pub decision: Decision,
}

impl RiskResponse {
    /// Routing key on the bus.
    pub fn routing_key(&self) -> String {
        self.correlation_id.to_string()
    }
}
