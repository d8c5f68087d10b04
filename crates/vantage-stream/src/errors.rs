//! Stream client error types.

use thiserror::Error;

/// Errors raised by the stream client.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    /// No address was supplied at construction.
    #[error("WebSocket URL is required")]
    MissingUrl,

    /// The address is not a usable `ws://` or `wss://` URL.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// Address as supplied.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// `send` was called while the connection is not open.
    #[error("WebSocket is not connected")]
    NotConnected,

    /// The underlying transport failed (connect, read or write).
    #[error("transport error: {0}")]
    Transport(String),

    /// An inbound frame was not a valid `{type, data}` envelope.
    #[error("failed to parse message: {0}")]
    Parse(String),

    /// An inbound frame used a type name the client reserves for its own
    /// connection lifecycle events.
    #[error("server sent reserved event type '{0}'")]
    ReservedType(String),

    /// An outbound message could not be serialized.
    #[error("failed to serialize message: {0}")]
    Serialize(String),
}

impl StreamError {
    /// Whether the condition may clear up on its own (reconnect can fix it).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Error category string for event payloads and logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::MissingUrl | Self::InvalidUrl { .. } => "configuration",
            Self::NotConnected => "policy",
            Self::Transport(_) => "transport",
            Self::Parse(_) | Self::ReservedType(_) | Self::Serialize(_) => "protocol",
        }
    }
}

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;
