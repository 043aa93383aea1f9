//! Request payload decoding.
//!
//! Decoding is one pluggable step with a pass/fail outcome. The dispatcher
//! only runs it for requests that carry a body; the decoded document is
//! opaque to keel and typed later by the handler via
//! [`Context::payload_as`](crate::Context::payload_as).

use serde_json::Value;

/// A failed decode. The message is sent back to the caller verbatim.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct DecodeError(pub String);

/// Turns raw body bytes into a structured document.
pub trait Decoder: Send + Sync + 'static {
    fn decode(&self, body: &[u8]) -> Result<Value, DecodeError>;
}

/// The default decoder: the body must be a single JSON document.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode(&self, body: &[u8]) -> Result<Value, DecodeError> {
        serde_json::from_slice(body).map_err(|e| DecodeError(format!("invalid JSON: {e}")))
    }
}
