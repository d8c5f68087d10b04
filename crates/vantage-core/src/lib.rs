//! # vantage-core
//!
//! Shared building blocks for the Vantage metrics clients:
//!
//! - [`BackoffPolicy`]: pure delay calculation for retries and reconnects
//! - [`RetryStrategy`]: fixed vs exponential spacing between attempts
//! - [`logging`]: one-shot `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod backoff;
pub mod logging;

pub use backoff::{BackoffPolicy, RetryStrategy, calculate_backoff_delay};
pub use logging::{LogFormat, init_subscriber};
