//! JSON payload encoding for bus messages.

use super::PublishError;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// A message body that could not be decoded.
#[derive(Debug, Error)]
#[error("malformed message body: {0}")]
pub struct ParseError(#[from] serde_json::Error);

pub fn encode<T: Serialize>(message: &T) -> Result<Bytes, PublishError> {
    serde_json::to_vec(message)
        .map(Bytes::from)
        .map_err(PublishError::Encode)
}

pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ParseError> {
    Ok(serde_json::from_slice(payload)?)
}
