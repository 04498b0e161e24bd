#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod bus;
pub mod entities;
pub mod events;
pub mod framework;
pub mod processors;
pub mod risk;
pub mod store;
pub mod utils;
