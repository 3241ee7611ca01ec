//! Wire protocol for the subscription socket and reply bodies.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::{ProtocolError, RpcError};

/// Envelope of every frame on the duplex connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame<P> {
    /// Operation name, used as the topic.
    pub route: String,
    /// Frame body.
    pub payload: P,
}

/// What a client asks of a subscription route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    /// Start the subscription handler for this connection.
    Subscribe,
    /// Push a value into the subscription handler.
    Broadcast,
}

/// Payload of a client → server frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    #[serde(rename = "type")]
    pub kind: ControlKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Payload of a server → client frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Push {
    #[serde(default)]
    pub data: Value,
}

/// Frame sent by clients.
pub type ControlFrame = Frame<Control>;

/// Frame sent by servers.
pub type PushFrame = Frame<Push>;

impl ControlFrame {
    /// Build a subscribe request for `route`.
    #[must_use]
    pub fn subscribe(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            payload: Control {
                kind: ControlKind::Subscribe,
                data: None,
            },
        }
    }

    /// Build a broadcast carrying `data` for `route`.
    #[must_use]
    pub fn broadcast(route: impl Into<String>, data: Value) -> Self {
        Self {
            route: route.into(),
            payload: Control {
                kind: ControlKind::Broadcast,
                data: Some(data),
            },
        }
    }
}

impl PushFrame {
    /// Build a push of `data` tagged with `route`.
    #[must_use]
    pub fn push(route: impl Into<String>, data: Value) -> Self {
        Self {
            route: route.into(),
            payload: Push { data },
        }
    }
}

/// Encode a frame as JSON text.
///
/// # Errors
/// Returns error if the payload cannot be serialized.
pub fn encode<P: Serialize>(frame: &Frame<P>) -> Result<String, ProtocolError> {
    serde_json::to_string(frame).map_err(ProtocolError::Encode)
}

/// Decode a frame from JSON text.
///
/// # Errors
/// Returns error if the text is not a well formed frame.
pub fn decode<P: DeserializeOwned>(text: &str) -> Result<Frame<P>, ProtocolError> {
    serde_json::from_str(text).map_err(ProtocolError::Decode)
}

/// Decoded reply body.
///
/// Success values and handler errors share one wire shape, so a body that
/// is exactly `{"message": string}` is read as `Err` and anything else as
/// `Ok`. An output type that itself looks like that is indistinguishable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply<T> {
    Err(RpcError),
    Ok(T),
}

impl<T> Reply<T> {
    /// Convert into a standard result.
    ///
    /// # Errors
    /// Returns the handler's error value if the body carried one.
    pub fn into_result(self) -> Result<T, RpcError> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Err(err) => Err(err),
        }
    }

    /// Whether the body carried an error value.
    #[must_use]
    pub const fn is_err(&self) -> bool {
        matches!(self, Self::Err(_))
    }
}

impl<T> From<Result<T, RpcError>> for Reply<T> {
    fn from(result: Result<T, RpcError>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(err) => Self::Err(err),
        }
    }
}
