//! JSON encoding of change-feed payloads.
//!
//! Feed payloads are JSON documents. Partial rows rely on the difference
//! between an absent column and an explicit `null`, which only a
//! self-describing format preserves.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::change::ChangeEvent;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The payload decoded but carries no row at all.
    #[error("event carries neither `new` nor `old`")]
    EmptyEvent,
}

/// Encodes a change event as a JSON payload.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the row cannot be serialized.
pub fn encode<R: Serialize>(event: &ChangeEvent<R>) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(event).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a change event from a JSON payload.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the bytes are not a valid event,
/// or `CodecError::EmptyEvent` if neither row slot is populated.
pub fn decode<R: DeserializeOwned>(bytes: &[u8]) -> Result<ChangeEvent<R>, CodecError> {
    let event: ChangeEvent<R> =
        serde_json::from_slice(bytes).map_err(|e| CodecError::Serialization(e.to_string()))?;
    if event.new.is_none() && event.old.is_none() {
        return Err(CodecError::EmptyEvent);
    }
    Ok(event)
}
