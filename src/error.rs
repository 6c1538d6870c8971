use thiserror::Error;

use crate::message::types::CallId;
use crate::value::Value;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The far side answered with an Error envelope; the carried value is
    /// passed through untouched.
    #[error("Remote error: {0}")]
    Remote(Value),

    #[error("Connection closed before a reply arrived")]
    ConnectionClosed,

    #[error("Call {id} timed out after {timeout_ms}ms")]
    Timeout { id: CallId, timeout_ms: u64 },

    #[error("Topic path is empty")]
    EmptyTopicPath,

    #[error("Reserved property name: {0}")]
    ReservedName(String),

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),
}

impl RpcError {
    /// Message of a remote error record, if this is one.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            RpcError::Remote(value) => value.error_message(),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Channel closed")]
    Closed,

    #[error("Send failed: {reason}")]
    SendFailed { reason: String },

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Timeout after {duration_ms}ms during {operation}")]
    Timeout { duration_ms: u64, operation: String },

    #[error("Connection to {name} failed: {reason}")]
    ConnectionFailed { name: String, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, RpcError>;
pub type TransportResult<T> = std::result::Result<T, TransportError>;

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Serialization(err.to_string())
    }
}
