//! Catalogue of the metric resources the API serves.

use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::Value;

use crate::errors::{ResourceError, Result};

/// Characters left as-is in path segments and query values.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Query values additionally keep commas so list parameters stay readable.
const QUERY_VALUE: &AsciiSet = &COMPONENT.remove(b',');

/// A fetchable resource and its parameters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Service liveness.
    Health,
    /// Agent interaction graph.
    Network,
    /// Event timeline, optionally bounded by tick.
    Timeline {
        /// First tick, inclusive.
        start: Option<i64>,
        /// Last tick.
        end: Option<i64>,
    },
    /// Spatial density grid.
    Spatial,
    /// Inequality indicators.
    Inequality,
    /// Cultural diversity indicators.
    Cultural,
    /// Named metric series.
    TimeSeries {
        /// Series to include. Must not be empty.
        metrics: Vec<String>,
    },
    /// Detail for one agent.
    Agent {
        /// Agent identifier. Must not be empty.
        id: String,
    },
}

impl Resource {
    /// Short name used in logs, metrics labels and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::Network => "network",
            Self::Timeline { .. } => "timeline",
            Self::Spatial => "spatial",
            Self::Inequality => "inequality",
            Self::Cultural => "cultural",
            Self::TimeSeries { .. } => "timeseries",
            Self::Agent { .. } => "agent",
        }
    }

    /// Request path, including the encoded agent id where applicable.
    pub fn path(&self) -> String {
        match self {
            Self::Health => "/api/health".into(),
            Self::Agent { id } => {
                format!("/api/metrics/agent/{}", utf8_percent_encode(id, COMPONENT))
            }
            other => format!("/api/metrics/{}", other.name()),
        }
    }

    /// Query parameters sorted by name. List values are comma-joined.
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut params = match self {
            Self::Timeline { start, end } => {
                let mut params = Vec::new();
                if let Some(start) = start {
                    params.push(("start", start.to_string()));
                }
                if let Some(end) = end {
                    params.push(("end", end.to_string()));
                }
                params
            }
            Self::TimeSeries { metrics } => vec![("metrics", metrics.join(","))],
            _ => Vec::new(),
        };
        params.sort_by(|a, b| a.0.cmp(b.0));
        params
    }

    /// Path plus encoded query. Doubles as the cache key, so equal
    /// requests always produce the same string.
    pub fn path_and_query(&self) -> String {
        let query = self.query();
        if query.is_empty() {
            return self.path();
        }
        let encoded: Vec<String> = query
            .iter()
            .map(|(name, value)| format!("{name}={}", utf8_percent_encode(value, QUERY_VALUE)))
            .collect();
        format!("{}?{}", self.path(), encoded.join("&"))
    }

    /// Check parameters before any network activity.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Timeline {
                start: Some(start),
                end: Some(end),
            } if start >= end => Err(ResourceError::Validation(
                "start time must be before end time".into(),
            )),
            Self::TimeSeries { metrics } if metrics.iter().all(|m| m.trim().is_empty()) => Err(
                ResourceError::Validation("at least one metric is required".into()),
            ),
            Self::Agent { id } if id.trim().is_empty() => {
                Err(ResourceError::Validation("agent id is required".into()))
            }
            _ => Ok(()),
        }
    }

    /// Top-level fields a response must carry.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Health => &["status"],
            Self::Network => &["nodes", "edges"],
            Self::Spatial => &["density"],
            _ => &[],
        }
    }

    /// Check the minimal shape of a decoded response.
    pub fn check_shape(&self, body: &Value) -> Result<()> {
        if body.is_null() {
            return Err(ResourceError::Parse(format!("{} response is empty", self.name())));
        }
        for field in self.required_fields() {
            if body.get(field).is_none_or(Value::is_null) {
                return Err(ResourceError::MissingField {
                    resource: self.name().into(),
                    field: (*field).into(),
                });
            }
        }
        Ok(())
    }

    /// Whether successful responses are cached. Health always goes to
    /// the network.
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, Self::Health)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path_and_query())
    }
}
