//! Event channel factories and handles.

use super::types::EmitCommand;
use tokio::sync::mpsc;

/// Default buffer size for event channels.
///
/// This provides enough buffer to handle bursts while keeping memory bounded.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for EmitCommand events.
pub type EmitCommandSender = mpsc::Sender<EmitCommand>;
/// Receiver handle for EmitCommand events.
pub type EmitCommandReceiver = mpsc::Receiver<EmitCommand>;

/// Create a new EmitCommand channel.
///
/// Returns a (sender, receiver) pair. The sender can be cloned into every
/// request handler; the receiver goes to a single emitter worker.
pub fn emit_command_channel() -> (EmitCommandSender, EmitCommandReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
