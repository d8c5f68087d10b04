//! Backoff calculation for retries and reconnects.
//!
//! Everything here is a pure function of the attempt number. The async
//! loops that actually sleep live in the client crates, which keeps the
//! math trivially testable and the timers cancellable in one place.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// How consecutive attempts are spaced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    /// Same delay before every attempt.
    #[default]
    Fixed,
    /// Delay doubles on every consecutive attempt, up to the cap.
    Exponential,
}

/// Computes the wait before the next attempt.
///
/// Attempt numbers are zero-based: `delay(0)` is the wait before the first
/// retry and always equals the base interval (clamped to the maximum).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    strategy: RetryStrategy,
}

impl BackoffPolicy {
    /// Doubling delay starting at `base`, capped at `max`.
    ///
    /// A `max` below `base` is raised to `base`.
    pub fn exponential(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            strategy: RetryStrategy::Exponential,
        }
    }

    /// Constant delay between attempts.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base: delay,
            max: delay,
            strategy: RetryStrategy::Fixed,
        }
    }

    /// Build a policy from a strategy and millisecond bounds.
    pub fn from_strategy(strategy: RetryStrategy, base_ms: u64, max_ms: u64) -> Self {
        let base = Duration::from_millis(base_ms);
        match strategy {
            RetryStrategy::Fixed => Self::fixed(base),
            RetryStrategy::Exponential => Self::exponential(base, Duration::from_millis(max_ms)),
        }
    }

    /// Wait before the attempt following `attempt` previous failures.
    #[allow(clippy::cast_possible_truncation)]
    pub fn delay(&self, attempt: u32) -> Duration {
        match self.strategy {
            RetryStrategy::Fixed => self.base,
            RetryStrategy::Exponential => Duration::from_millis(calculate_backoff_delay(
                attempt,
                self.base.as_millis() as u64,
                self.max.as_millis() as u64,
            )),
        }
    }

    /// Base interval.
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Upper bound on any single delay.
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Spacing strategy.
    pub fn strategy(&self) -> RetryStrategy {
        self.strategy
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(
            Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        )
    }
}

/// Exponential backoff: `min(max_delay, base_delay * 2^attempt)`.
///
/// Saturates instead of overflowing for large attempt numbers.
pub fn calculate_backoff_delay(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    exponential.min(max_delay_ms.max(base_delay_ms))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_exponential_growth() {
        assert_eq!(calculate_backoff_delay(0, 1000, 60_000), 1000);
        assert_eq!(calculate_backoff_delay(1, 1000, 60_000), 2000);
        assert_eq!(calculate_backoff_delay(2, 1000, 60_000), 4000);
        assert_eq!(calculate_backoff_delay(3, 1000, 60_000), 8000);
    }

    #[test]
    fn backoff_caps_at_max() {
        assert_eq!(calculate_backoff_delay(10, 1000, 60_000), 60_000);
    }

    #[test]
    fn backoff_high_attempt_no_overflow() {
        assert_eq!(calculate_backoff_delay(u32::MAX, 1000, 60_000), 60_000);
        assert_eq!(calculate_backoff_delay(63, u64::MAX, u64::MAX), u64::MAX);
    }

    #[test]
    fn backoff_max_below_base_uses_base() {
        assert_eq!(calculate_backoff_delay(4, 500, 100), 500);
    }

    #[test]
    fn exponential_policy_stays_within_bounds() {
        let policy =
            BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_millis(1000));
        for attempt in 0..20 {
            let d = policy.delay(attempt);
            assert!(d >= Duration::from_millis(100), "attempt {attempt}: {d:?}");
            assert!(d <= Duration::from_millis(1000), "attempt {attempt}: {d:?}");
        }
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
        assert_eq!(policy.delay(4), Duration::from_millis(1000));
    }

    #[test]
    fn fixed_policy_is_constant() {
        let policy = BackoffPolicy::fixed(Duration::from_millis(10));
        assert_eq!(policy.delay(0), Duration::from_millis(10));
        assert_eq!(policy.delay(7), Duration::from_millis(10));
        assert_eq!(policy.strategy(), RetryStrategy::Fixed);
    }

    #[test]
    fn from_strategy_builds_matching_policy() {
        let fixed = BackoffPolicy::from_strategy(RetryStrategy::Fixed, 250, 10_000);
        assert_eq!(fixed.delay(5), Duration::from_millis(250));

        let exp = BackoffPolicy::from_strategy(RetryStrategy::Exponential, 250, 10_000);
        assert_eq!(exp.delay(2), Duration::from_millis(1000));
        assert_eq!(exp.max(), Duration::from_millis(10_000));
    }

    #[test]
    fn default_policy() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base(), Duration::from_millis(DEFAULT_BASE_DELAY_MS));
        assert_eq!(policy.max(), Duration::from_millis(DEFAULT_MAX_DELAY_MS));
    }

    #[test]
    fn retry_strategy_serde() {
        let json = serde_json::to_string(&RetryStrategy::Exponential).unwrap();
        assert_eq!(json, "\"exponential\"");
        let back: RetryStrategy = serde_json::from_str("\"fixed\"").unwrap();
        assert_eq!(back, RetryStrategy::Fixed);
    }
}
