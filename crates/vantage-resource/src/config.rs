//! Resource client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use vantage_core::{BackoffPolicy, RetryStrategy};

use crate::errors::{ResourceError, Result};

/// Default cache lifetime in milliseconds.
pub const DEFAULT_CACHE_TTL_MS: u64 = 30_000;
/// Default per-attempt timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default delay between attempts in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
/// Default cap for exponential retry delays in milliseconds.
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 10_000;

/// Caching, timeout and retry behavior for
/// [`ResourceClient`](crate::ResourceClient).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceConfig {
    /// Lifetime of cached responses in ms. Must be positive.
    pub cache_ttl_ms: u64,
    /// Bound on each individual attempt in ms.
    pub timeout_ms: u64,
    /// Retries after the first attempt for retryable failures.
    pub max_retries: u32,
    /// Delay before a retry in ms (the base delay for exponential spacing).
    pub retry_delay_ms: u64,
    /// How retries are spaced.
    pub retry_strategy: RetryStrategy,
    /// Cap on exponential retry delays in ms.
    pub max_retry_delay_ms: u64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            retry_strategy: RetryStrategy::default(),
            max_retry_delay_ms: DEFAULT_MAX_RETRY_DELAY_MS,
        }
    }
}

impl ResourceConfig {
    /// Reject values the client cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl_ms == 0 {
            return Err(ResourceError::InvalidConfig(
                "cacheTtlMs must be greater than zero".into(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ResourceError::InvalidConfig(
                "timeoutMs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Cache lifetime.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Retry delay schedule.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::from_strategy(
            self.retry_strategy,
            self.retry_delay_ms,
            self.max_retry_delay_ms,
        )
    }
}
