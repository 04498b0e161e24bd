//! Event system for the in-process workers.
//!
//! # Event Flow
//!
//! 1. HTTP handler persists an operation, sends `EmitCommand` -> `RiskRequestEmitter`
//! 2. `RiskRequestEmitter` publishes `RiskRequest` on the request topic
//! 3. `DecisionEngine` consumes requests, publishes `RiskResponse` on the response topic
//! 4. `RiskResponseCorrelator` consumes responses and settles the stored operation
//!
//! Only step 1 travels over an mpsc channel; the rest goes through the
//! message bus.

pub mod channels;
pub mod types;

pub use channels::{
    DEFAULT_CHANNEL_BUFFER, EmitCommandReceiver, EmitCommandSender, emit_command_channel,
};
pub use types::EmitCommand;
