//! Connection lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where the connection is in its lifecycle.
///
/// `Connecting → Open → Closing → Closed`, with `Reconnecting` entered
/// from `Closed` when an unexpected close has scheduled a new attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Transport handshake in progress.
    Connecting,
    /// Frames flow in both directions.
    Open,
    /// Close handshake in progress.
    Closing,
    /// No transport.
    Closed,
    /// Waiting out the backoff delay before the next attempt.
    Reconnecting,
}

impl ConnectionState {
    /// Lowercase name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
