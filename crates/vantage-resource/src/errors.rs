//! Resource client error types.

use thiserror::Error;

/// Errors raised by the resource client.
///
/// `Clone` so that one outcome can be shared by every caller waiting on a
/// deduplicated request.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResourceError {
    /// No base address was supplied at construction.
    #[error("base URL is required")]
    MissingBaseUrl,

    /// The base address is not a usable `http://` or `https://` URL.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// Address as supplied.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Request parameters were rejected before any network activity.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Response status code.
        status: u16,
        /// Server-supplied `error` message, or the status reason.
        message: String,
    },

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// A single attempt exceeded the configured timeout.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout {
        /// Per-attempt bound that was exceeded.
        timeout_ms: u64,
    },

    /// The response body was not valid JSON.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// The response lacked a field the resource requires.
    #[error("{resource} response is missing required field '{field}'")]
    MissingField {
        /// Resource name.
        resource: String,
        /// Missing field name.
        field: String,
    },
}

impl ResourceError {
    /// Whether another attempt may succeed: network failures, timeouts and 5xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// HTTP status, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Error category string for logs and diagnostics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::MissingBaseUrl | Self::InvalidUrl { .. } | Self::InvalidConfig(_) => {
                "configuration"
            }
            Self::Validation(_) => "validation",
            Self::Http { status, .. } if *status < 500 => "validation",
            Self::Http { .. } | Self::Network(_) | Self::Timeout { .. } => "transport",
            Self::Parse(_) | Self::MissingField { .. } => "protocol",
        }
    }
}

/// Result type for resource operations.
pub type Result<T> = std::result::Result<T, ResourceError>;
