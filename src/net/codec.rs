//! Conversion between wire text and [`Envelope`]s.
//!
//! The codec checks structure only: the bytes must be a JSON object with a
//! string `messageType` and, when present, an object `data`. Payload
//! interpretation is the receiver's job.

use super::{
    errors::{NetError, Result},
    messages::Envelope,
};

/// Serialize an envelope to its wire text.
///
/// # Errors
///
/// Returns an error if the payload cannot be represented as JSON.
pub fn encode(envelope: &Envelope) -> Result<String> {
    serde_json::to_string(envelope).map_err(|error| NetError::MalformedMessage(error.to_string()))
}

/// Parse wire bytes into an envelope.
///
/// # Errors
///
/// Returns [`NetError::MalformedMessage`] if the bytes are not JSON, not an
/// object, lack a string `messageType`, or carry a `data` that is neither
/// an object nor null.
pub fn decode(bytes: &[u8]) -> Result<Envelope> {
    let mut envelope: Envelope = serde_json::from_slice(bytes)
        .map_err(|error| NetError::MalformedMessage(error.to_string()))?;
    if envelope.data.is_null() {
        envelope = Envelope::bare(envelope.message_type);
    } else if !envelope.data.is_object() {
        return Err(NetError::MalformedMessage(format!(
            "{} data is not an object",
            envelope.message_type
        )));
    }
    Ok(envelope)
}
