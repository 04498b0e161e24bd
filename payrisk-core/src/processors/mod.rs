//! Workers of the evaluation pipeline.
//!
//! - `RiskRequestEmitter`: Receives `EmitCommand`, publishes `RiskRequest`
//! - `DecisionEngine`: Consumes `RiskRequest`, publishes `RiskResponse`
//! - `RiskResponseCorrelator`: Consumes `RiskResponse`, settles the stored operation
//!
//! The two bus consumers share the per-lane loop in [`lanes`].

pub mod correlator;
pub mod decision_engine;
pub mod emitter;
pub mod lanes;

pub use correlator::{Correlation, CorrelationError, RiskResponseCorrelator};
pub use decision_engine::{DEFAULT_MEMO_CAPACITY, DecisionEngine, EngineError};
pub use emitter::{EmitterHandle, RiskRequestEmitter};
pub use lanes::{DeliveryHandler, LaneWorker};
