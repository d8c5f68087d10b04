//! Stream client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use vantage_core::BackoffPolicy;

/// Default first reconnect delay in milliseconds.
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 1000;
/// Default reconnect delay cap in milliseconds.
pub const DEFAULT_MAX_RECONNECT_INTERVAL_MS: u64 = 30_000;

/// Reconnection behavior for [`StreamClient`](crate::StreamClient).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamConfig {
    /// Reconnect after an unexpected close (default: false).
    pub auto_reconnect: bool,
    /// Delay before the first reconnect attempt in ms (default: 1000).
    pub reconnect_interval_ms: u64,
    /// Cap on the doubling reconnect delay in ms (default: 30000).
    pub max_reconnect_interval_ms: u64,
    /// Give up after this many consecutive failed attempts. `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: false,
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            max_reconnect_interval_ms: DEFAULT_MAX_RECONNECT_INTERVAL_MS,
            max_reconnect_attempts: None,
        }
    }
}

impl StreamConfig {
    /// Reconnect delay schedule.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::exponential(
            Duration::from_millis(self.reconnect_interval_ms),
            Duration::from_millis(self.max_reconnect_interval_ms),
        )
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn allows_attempt(&self, attempts: u32) -> bool {
        self.max_reconnect_attempts.is_none_or(|max| attempts < max)
    }
}
