pub mod operations;

pub use operations::{Operation, OperationStatus, TransitionError, utc_now};
