//! Shared types for the payrisk asynchronous risk-evaluation service.
//!
//! - [`messages`]: payloads carried over the message bus between the payment
//!   side and the decision service.
//! - [`objects`]: request and response bodies of the payment HTTP API.
//! - `client` (feature `client`): a typed HTTP client for the payment API.

#[cfg(feature = "client")]
pub mod client;
pub mod messages;
pub mod objects;
