//! Wire envelope and event kinds.
//!
//! Every text frame on the feed is `{"type": string, "data": any}`. The
//! `type` picks an [`EventKind`]; lifecycle kinds are raised locally by the
//! client and share the same registry.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::StreamError;

/// A decoded inbound message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Routing discriminant.
    #[serde(rename = "type")]
    pub kind: String,
    /// Payload handed to subscribers. `null` when absent.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, StreamError> {
        serde_json::from_str(text).map_err(|e| StreamError::Parse(e.to_string()))
    }

    /// Event kind selected by the `type` field.
    pub fn event_kind(&self) -> EventKind {
        EventKind::from_type(&self.kind)
    }
}

/// Subscribable event names.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Server push: aggregate metrics changed.
    MetricsUpdate,
    /// Server push: network graph changed.
    NetworkUpdate,
    /// Connection opened.
    Connected,
    /// Transport error, unparseable frame, or server-sent `error`.
    Error,
    /// Connection closed.
    Disconnect,
    /// A reconnect attempt has been scheduled. Not raised once the attempt
    /// limit is reached; `MaxReconnectAttempts` fires in its place.
    Reconnecting,
    /// Connection re-established after one or more attempts.
    Reconnected,
    /// Automatic reconnection gave up.
    MaxReconnectAttempts,
    /// Any other server `type`.
    Message(String),
}

impl EventKind {
    /// Map a wire `type` onto a kind.
    pub fn from_type(name: &str) -> Self {
        match name {
            "metrics_update" => Self::MetricsUpdate,
            "network_update" => Self::NetworkUpdate,
            "connected" => Self::Connected,
            "error" => Self::Error,
            "disconnect" => Self::Disconnect,
            "reconnecting" => Self::Reconnecting,
            "reconnected" => Self::Reconnected,
            "max_reconnect_attempts" => Self::MaxReconnectAttempts,
            other => Self::Message(other.to_owned()),
        }
    }

    /// Wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::MetricsUpdate => "metrics_update",
            Self::NetworkUpdate => "network_update",
            Self::Connected => "connected",
            Self::Error => "error",
            Self::Disconnect => "disconnect",
            Self::Reconnecting => "reconnecting",
            Self::Reconnected => "reconnected",
            Self::MaxReconnectAttempts => "max_reconnect_attempts",
            Self::Message(name) => name,
        }
    }

    /// Whether the client raises this kind itself rather than the server.
    /// Inbound frames carrying one of these types are rejected.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::Connected
                | Self::Disconnect
                | Self::Reconnecting
                | Self::Reconnected
                | Self::MaxReconnectAttempts
        )
    }
}

impl From<&str> for EventKind {
    fn from(name: &str) -> Self {
        Self::from_type(name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
