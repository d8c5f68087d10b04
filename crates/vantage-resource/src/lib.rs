//! # vantage-resource
//!
//! HTTP client for the metrics API. Every fetch goes through one pipeline:
//! parameter validation, TTL cache lookup, in-flight deduplication, then
//! per-attempt timeouts with retry on network failures, timeouts and 5xx.
//! Responses are checked for the fields their resource requires before
//! being cached.
//!
//! ```no_run
//! # async fn demo() -> vantage_resource::Result<()> {
//! use vantage_resource::{ResourceClient, ResourceConfig};
//!
//! let client = ResourceClient::new("http://localhost:3000", ResourceConfig::default())?;
//! let network = client.fetch_network_data().await?;
//! println!("{} nodes", network["nodes"].as_array().map_or(0, Vec::len));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod cache;
pub mod client;
pub mod config;
pub mod errors;
pub mod resources;

pub use cache::{InFlight, RequestCache};
pub use client::{FetchOptions, ResourceClient};
pub use config::ResourceConfig;
pub use errors::{ResourceError, Result};
pub use resources::Resource;
