use super::accumulator::{Accumulator, Reservation};
use payrisk_sdk::messages::{Decision, RiskRequest};
use rust_decimal::Decimal;

/// Ceilings applied to every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskLimits {
    /// Largest single amount that can be accepted.
    pub per_transaction_ceiling: Decimal,
    /// Largest running total a customer can reach.
    pub daily_ceiling: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            per_transaction_ceiling: Decimal::from(2000),
            daily_ceiling: Decimal::from(5000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    NonPositiveAmount,
    PerTransactionCeiling,
    DailyCeiling { current: Decimal },
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenialReason::NonPositiveAmount => write!(f, "amount is not positive"),
            DenialReason::PerTransactionCeiling => write!(f, "per-transaction ceiling exceeded"),
            DenialReason::DailyCeiling { current } => {
                write!(f, "daily ceiling exceeded (accumulated {current})")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    Accepted { accumulated: Decimal },
    Denied(DenialReason),
}

impl Evaluation {
    pub fn decision(&self) -> Decision {
        match self {
            Evaluation::Accepted { .. } => Decision::Accepted,
            Evaluation::Denied(_) => Decision::Denied,
        }
    }
}

impl RiskLimits {
    /// Evaluate `request`, reserving its amount on acceptance.
    pub async fn evaluate(&self, accumulator: &Accumulator, request: &RiskRequest) -> Evaluation {
        if request.amount <= Decimal::ZERO {
            return Evaluation::Denied(DenialReason::NonPositiveAmount);
        }
        if request.amount > self.per_transaction_ceiling {
            return Evaluation::Denied(DenialReason::PerTransactionCeiling);
        }
        match accumulator
            .reserve(request.customer_id, request.amount, self.daily_ceiling)
            .await
        {
            Reservation::Reserved { total } => Evaluation::Accepted { accumulated: total },
            Reservation::Exceeded { current } => {
                Evaluation::Denied(DenialReason::DailyCeiling { current })
            }
        }
    }
}
