//! Application state shared across all request handlers.

use payrisk_core::processors::EmitterHandle;
use payrisk_core::store::OperationStoreRef;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc or
/// a channel sender).
#[derive(Clone)]
pub struct AppState {
    /// Where operations are persisted before their request is emitted.
    pub store: OperationStoreRef,
    /// Front end of the running request emitter.
    pub emitter: EmitterHandle,
}

impl AppState {
    pub fn new(store: OperationStoreRef, emitter: EmitterHandle) -> Self {
        Self { store, emitter }
    }
}
