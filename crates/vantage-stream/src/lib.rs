//! # vantage-stream
//!
//! Persistent subscription to the server-pushed metrics feed.
//!
//! - [`StreamClient`]: connection state machine with automatic reconnection
//! - [`EventKind`] / [`Envelope`]: typed routing of `{type, data}` frames
//! - [`Connector`]: transport seam, WebSocket by default
//!
//! ```no_run
//! # async fn demo() -> Result<(), vantage_stream::StreamError> {
//! use vantage_stream::{EventKind, StreamClient, StreamConfig};
//!
//! let client = StreamClient::new(
//!     "ws://localhost:8765",
//!     StreamConfig { auto_reconnect: true, ..StreamConfig::default() },
//! )?;
//! let _ = client.on(EventKind::MetricsUpdate, |data| println!("{data}"));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod registry;
pub mod state;
pub mod transport;

#[cfg(test)]
mod mock;

pub use client::StreamClient;
pub use config::StreamConfig;
pub use envelope::{Envelope, EventKind};
pub use errors::{Result, StreamError};
pub use registry::{Handler, HandlerId, HandlerRegistry};
pub use state::ConnectionState;
pub use transport::{Connector, Frame, Transport, TungsteniteConnector};
