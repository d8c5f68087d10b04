//! Settings schema.

use serde::{Deserialize, Serialize};
use vantage_core::LogFormat;
use vantage_resource::ResourceConfig;
use vantage_stream::StreamConfig;

/// Default stream endpoint.
pub const DEFAULT_STREAM_URL: &str = "ws://localhost:3000/ws";
/// Default API base address.
pub const DEFAULT_API_URL: &str = "http://localhost:3000";
/// Default log filter.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Complete client settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VantageSettings {
    /// WebSocket address of the metrics feed.
    pub stream_url: String,
    /// Base address of the HTTP API.
    pub api_url: String,
    /// Reconnection behavior.
    pub stream: StreamConfig,
    /// Caching, timeout and retry behavior.
    pub resource: ResourceConfig,
    /// Log output.
    pub logging: LoggingSettings,
}

impl Default for VantageSettings {
    fn default() -> Self {
        Self {
            stream_url: DEFAULT_STREAM_URL.into(),
            api_url: DEFAULT_API_URL.into(),
            stream: StreamConfig::default(),
            resource: ResourceConfig::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.into(),
            format: LogFormat::default(),
        }
    }
}
