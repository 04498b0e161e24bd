//! Event type definitions for the in-process worker channels.

use crate::bus::{PublishAck, PublishError};
use payrisk_sdk::messages::RiskRequest;
use tokio::sync::oneshot;

/// Request to publish one `RiskRequest`, answered over `reply`.
///
/// Sent by request handlers to the `RiskRequestEmitter` worker once the
/// operation has been persisted.
#[derive(Debug)]
pub struct EmitCommand {
    pub request: RiskRequest,
    pub reply: oneshot::Sender<Result<PublishAck, PublishError>>,
}
