//! HTTP API handlers.

pub mod payments;
