//! Unified error type.

use std::time::Duration;

use http::StatusCode;
use serde::Serialize;

/// Kind reported for malformed request payloads.
pub const INVALID_REQUEST: &str = "invalid request";

/// The error type returned by handlers, middleware and keel's fallible
/// operations.
///
/// Exactly one variant is client-caused: [`Error::BadRequest`]. Every other
/// variant is translated to a 500 by the built-in error handlers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The caller sent something we cannot act on.
    #[error("{msg}")]
    BadRequest { kind: String, msg: String },

    /// A handler failed for reasons that are not the caller's fault.
    #[error("{0}")]
    Internal(String),

    /// The chain returned without writing a response or reporting a failure.
    #[error("unhandled request")]
    Unhandled,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("handler panicked: {0}")]
    Panic(String),

    /// A response was already written for this request.
    #[error("response already written")]
    AlreadyWritten,

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(#[from] toml::de::Error),
}

/// Shorthand used throughout the crate and by handlers.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn bad_request(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::BadRequest { kind: kind.into(), msg: msg.into() }
    }

    pub fn internal(msg: impl std::fmt::Display) -> Self {
        Self::Internal(msg.to_string())
    }

    /// True for failures attributed to the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::BadRequest { .. })
    }

    pub fn status(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// Machine-readable kind carried in error response bodies.
    pub fn kind(&self) -> &str {
        match self {
            Self::BadRequest { kind, .. } => kind,
            Self::Unhandled => "unhandled request",
            Self::Timeout(_) => "timeout",
            _ => "internal",
        }
    }

    /// Serialized `{"kind":…,"msg":…}` document for this error.
    pub(crate) fn to_body(&self) -> Vec<u8> {
        let body = ErrorBody { kind: self.kind(), msg: self.to_string() };
        // A two-string struct cannot fail to serialize.
        serde_json::to_vec(&body).unwrap_or_default()
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    kind: &'a str,
    msg: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_bad_request_is_client_caused() {
        assert!(Error::bad_request("validation", "name is required").is_client_error());
        assert!(!Error::internal("db down").is_client_error());
        assert!(!Error::Unhandled.is_client_error());
        assert!(!Error::Timeout(Duration::from_secs(1)).is_client_error());
    }

    #[test]
    fn status_follows_client_flag() {
        assert_eq!(Error::bad_request("x", "y").status(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::Panic("boom".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn body_is_kind_then_msg() {
        let err = Error::bad_request(INVALID_REQUEST, "invalid JSON: EOF");
        assert_eq!(
            err.to_body(),
            br#"{"kind":"invalid request","msg":"invalid JSON: EOF"}"#.to_vec(),
        );
        assert_eq!(
            Error::Unhandled.to_body(),
            br#"{"kind":"unhandled request","msg":"unhandled request"}"#.to_vec(),
        );
    }
}
