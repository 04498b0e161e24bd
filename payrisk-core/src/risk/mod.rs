//! Risk evaluation rules.
//!
//! A request is denied if its amount is not positive, if it exceeds the
//! per-transaction ceiling, or if adding it to the customer's running total
//! would pass the daily ceiling. Otherwise it is accepted and its amount is
//! added to the total in the same step.

pub mod accumulator;
pub mod policy;

pub use accumulator::{Accumulator, Reservation};
pub use policy::{DenialReason, Evaluation, RiskLimits};
