//! Error values carried on the wire.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error value a handler can return instead of its output.
///
/// Serialized as `{"message": "..."}` and sent with the same status as a
/// successful result, so callers have to inspect the decoded shape.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[error("{message}")]
pub struct RpcError {
    /// Human readable message, optionally prefixed with `[Kind]: `.
    pub message: String,
}

impl RpcError {
    /// Create an error with a plain message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Create a namespaced error, rendered as `[kind]: message`.
    #[must_use]
    pub fn kind(kind: impl AsRef<str>, message: impl AsRef<str>) -> Self {
        Self {
            message: format!("[{}]: {}", kind.as_ref(), message.as_ref()),
        }
    }

    /// The body returned for an operation name that is not registered.
    #[must_use]
    pub fn not_found() -> Self {
        Self::new(NOT_FOUND_MESSAGE)
    }

    /// Split a namespaced message back into `(kind, detail)`.
    #[must_use]
    pub fn split_kind(&self) -> Option<(&str, &str)> {
        let rest = self.message.strip_prefix('[')?;
        let (kind, detail) = rest.split_once("]: ")?;
        Some((kind, detail))
    }
}

/// Message of the fixed not-found body.
pub const NOT_FOUND_MESSAGE: &str = "Doesn't exist";

/// Shorthand for [`RpcError::new`].
#[must_use]
pub fn error(message: impl Into<String>) -> RpcError {
    RpcError::new(message)
}

/// Shorthand for [`RpcError::kind`].
#[must_use]
pub fn error_kind(kind: impl AsRef<str>, message: impl AsRef<str>) -> RpcError {
    RpcError::kind(kind, message)
}

/// Result returned by query, mutation and subscription argument handling.
pub type HandlerResult<T> = Result<T, RpcError>;

/// Failure to encode or decode a protocol frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid frame: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("Failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_error_shape() {
        let err = error("no existing user with id 2");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json, serde_json::json!({ "message": "no existing user with id 2" }));
        assert_eq!(err.split_kind(), None);
    }

    #[test]
    fn test_namespaced_error() {
        let err = error_kind("NotFound", "no existing user with name \"B Ross\"");
        assert_eq!(err.message, "[NotFound]: no existing user with name \"B Ross\"");
        assert_eq!(
            err.split_kind(),
            Some(("NotFound", "no existing user with name \"B Ross\""))
        );
    }

    #[test]
    fn test_not_found_body() {
        let json = serde_json::to_string(&RpcError::not_found()).unwrap();
        assert_eq!(json, r#"{"message":"Doesn't exist"}"#);
    }

    #[test]
    fn test_rejects_extra_fields() {
        let parsed = serde_json::from_str::<RpcError>(r#"{"message":"x","id":1}"#);
        assert!(parsed.is_err());
    }
}
