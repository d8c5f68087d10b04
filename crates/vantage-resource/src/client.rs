//! [`ResourceClient`]: cached, deduplicated, retrying fetches.

use std::time::Duration;

use reqwest::header::ACCEPT;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use vantage_core::BackoffPolicy;

use crate::cache::RequestCache;
use crate::config::ResourceConfig;
use crate::errors::{ResourceError, Result};
use crate::resources::Resource;

/// Per-call options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Skip the cache read. A successful response still refreshes the cache.
    pub force: bool,
}

impl FetchOptions {
    /// Options that bypass the cache read.
    pub fn forced() -> Self {
        Self { force: true }
    }
}

/// HTTP client for the metrics API.
///
/// Each constructed client owns its cache. Clones share it.
#[derive(Clone, Debug)]
pub struct ResourceClient {
    base: String,
    config: ResourceConfig,
    http: reqwest::Client,
    cache: RequestCache<Value>,
}

impl ResourceClient {
    /// Client for the API served at `base_url`.
    ///
    /// Fails when the address is empty or not an `http://` / `https://`
    /// URL, or when the configuration is out of range.
    pub fn new(base_url: &str, config: ResourceConfig) -> Result<Self> {
        Self::with_http_client(base_url, config, reqwest::Client::new())
    }

    /// Like [`new`](Self::new) with a preconfigured `reqwest` client.
    pub fn with_http_client(
        base_url: &str,
        config: ResourceConfig,
        http: reqwest::Client,
    ) -> Result<Self> {
        let base = normalize_base(base_url)?;
        config.validate()?;
        Ok(Self {
            base,
            cache: RequestCache::new(config.cache_ttl()),
            config,
            http,
        })
    }

    /// Base address without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Active configuration.
    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    /// `GET /api/health`. Never cached.
    pub async fn fetch_health(&self) -> Result<Value> {
        self.fetch(Resource::Health, FetchOptions::default()).await
    }

    /// `GET /api/metrics/network`. The response must carry `nodes` and `edges`.
    pub async fn fetch_network_data(&self) -> Result<Value> {
        self.fetch(Resource::Network, FetchOptions::default()).await
    }

    /// `GET /api/metrics/timeline`, optionally bounded. `start` must be
    /// before `end` when both are given.
    pub async fn fetch_timeline_data(&self, start: Option<i64>, end: Option<i64>) -> Result<Value> {
        self.fetch(Resource::Timeline { start, end }, FetchOptions::default())
            .await
    }

    /// `GET /api/metrics/spatial`. The response must carry `density`.
    pub async fn fetch_spatial_data(&self) -> Result<Value> {
        self.fetch(Resource::Spatial, FetchOptions::default()).await
    }

    /// `GET /api/metrics/inequality`.
    pub async fn fetch_inequality_data(&self) -> Result<Value> {
        self.fetch(Resource::Inequality, FetchOptions::default()).await
    }

    /// `GET /api/metrics/cultural`.
    pub async fn fetch_cultural_data(&self) -> Result<Value> {
        self.fetch(Resource::Cultural, FetchOptions::default()).await
    }

    /// `GET /api/metrics/timeseries?metrics=a,b`.
    pub async fn fetch_time_series<S: AsRef<str>>(&self, metrics: &[S]) -> Result<Value> {
        let metrics = metrics.iter().map(|m| m.as_ref().to_owned()).collect();
        self.fetch(Resource::TimeSeries { metrics }, FetchOptions::default())
            .await
    }

    /// `GET /api/metrics/agent/<id>`.
    pub async fn fetch_agent_detail(&self, id: &str) -> Result<Value> {
        self.fetch(Resource::Agent { id: id.to_owned() }, FetchOptions::default())
            .await
    }

    /// Fetch any resource.
    ///
    /// Parameters are validated first. Unless `options.force` is set a live
    /// cache entry is returned without touching the network. Otherwise the
    /// call joins an identical in-flight request or starts one.
    #[instrument(skip_all, fields(resource = resource.name()))]
    pub async fn fetch(&self, resource: Resource, options: FetchOptions) -> Result<Value> {
        resource.validate()?;
        let key = resource.path_and_query();
        metrics::counter!("resource_requests_total", "resource" => resource.name()).increment(1);

        let cacheable = resource.is_cacheable();
        if cacheable && !options.force {
            if let Some(value) = self.cache.get(&key) {
                metrics::counter!("resource_cache_hits_total", "resource" => resource.name())
                    .increment(1);
                debug!(key = %key, "cache hit");
                return Ok(value);
            }
        }

        let attempt = Attempt {
            http: self.http.clone(),
            url: format!("{}{key}", self.base),
            resource,
            timeout: self.config.timeout(),
            timeout_ms: self.config.timeout_ms,
        };
        let retry = Retry {
            max_retries: self.config.max_retries,
            backoff: self.config.backoff(),
        };
        let (future, started) = self
            .cache
            .join_or_start(&key, cacheable, retry.run(attempt));
        if started {
            debug!(key = %key, force = options.force, "request started");
        } else {
            debug!(key = %key, "joined in-flight request");
        }
        future.await
    }

    /// Drop every cached response.
    pub fn clear_cache(&self) {
        let dropped = self.cache.len();
        self.cache.clear();
        debug!(dropped, "cache cleared");
    }

    /// Drop the cached response for one resource. Returns whether one existed.
    pub fn invalidate(&self, resource: &Resource) -> bool {
        self.cache.invalidate(&resource.path_and_query())
    }

    /// Keys of live cache entries, sorted.
    pub fn cached_entries(&self) -> Vec<String> {
        self.cache.keys()
    }
}

fn normalize_base(base_url: &str) -> Result<String> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(ResourceError::MissingBaseUrl);
    }
    let invalid = |reason: String| ResourceError::InvalidUrl {
        url: trimmed.to_owned(),
        reason,
    };
    let parsed = reqwest::Url::parse(trimmed).map_err(|e| invalid(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https".into()));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".into()));
    }
    Ok(trimmed.trim_end_matches('/').to_owned())
}

// ─────────────────────────────────────────────────────────────────────────────
// Request execution
// ─────────────────────────────────────────────────────────────────────────────

/// One bounded HTTP exchange.
struct Attempt {
    http: reqwest::Client,
    url: String,
    resource: Resource,
    timeout: Duration,
    timeout_ms: u64,
}

impl Attempt {
    async fn run(&self) -> Result<Value> {
        tokio::time::timeout(self.timeout, self.exchange())
            .await
            .map_err(|_| ResourceError::Timeout {
                timeout_ms: self.timeout_ms,
            })?
    }

    async fn exchange(&self) -> Result<Value> {
        let response = self
            .http
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ResourceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_owned());
            return Err(ResourceError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ResourceError::Network(e.to_string()))?;
        let body: Value =
            serde_json::from_slice(&bytes).map_err(|e| ResourceError::Parse(e.to_string()))?;
        self.resource.check_shape(&body)?;
        Ok(body)
    }
}

/// Server-supplied `{ "error": "..." }` message, falling back to the raw body.
fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .or_else(|| Some(trimmed.to_owned())),
        Err(_) => Some(trimmed.to_owned()),
    }
}

struct Retry {
    max_retries: u32,
    backoff: BackoffPolicy,
}

impl Retry {
    #[allow(clippy::cast_possible_truncation)]
    async fn run(self, attempt: Attempt) -> Result<Value> {
        let name = attempt.resource.name();
        let mut retries = 0;
        loop {
            match attempt.run().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && retries < self.max_retries => {
                    let delay = self.backoff.delay(retries);
                    retries += 1;
                    metrics::counter!("resource_retries_total", "resource" => name).increment(1);
                    warn!(
                        resource = name,
                        retry = retries,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if retries > 0 {
                        warn!(resource = name, retries, error = %err, "request failed after retries");
                    }
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn empty_base_rejected() {
        let err = ResourceClient::new("  ", ResourceConfig::default()).unwrap_err();
        assert_eq!(err, ResourceError::MissingBaseUrl);
    }

    #[test]
    fn non_http_base_rejected() {
        let err = ResourceClient::new("ws://localhost:3000", ResourceConfig::default()).unwrap_err();
        assert_matches!(err, ResourceError::InvalidUrl { .. });
        assert!(err.to_string().contains("Invalid URL"));
    }

    #[test]
    fn garbage_base_rejected() {
        let err = ResourceClient::new("not a url", ResourceConfig::default()).unwrap_err();
        assert_matches!(err, ResourceError::InvalidUrl { .. });
    }

    #[test]
    fn zero_ttl_rejected_at_construction() {
        let cfg = ResourceConfig {
            cache_ttl_ms: 0,
            ..ResourceConfig::default()
        };
        let err = ResourceClient::new("http://localhost:3000", cfg).unwrap_err();
        assert_matches!(err, ResourceError::InvalidConfig(_));
    }

    #[test]
    fn trailing_slash_trimmed() {
        let client = ResourceClient::new("http://localhost:3000/", ResourceConfig::default()).unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000");
    }

    #[test]
    fn error_message_prefers_error_field() {
        assert_eq!(
            error_message(r#"{"error":"agent not found"}"#).as_deref(),
            Some("agent not found")
        );
        assert_eq!(error_message("upstream down").as_deref(), Some("upstream down"));
        assert_eq!(error_message(""), None);
    }

    #[tokio::test]
    async fn validation_fails_without_network() {
        // Port 9 discards; a network attempt would surface a transport error.
        let client = ResourceClient::new("http://127.0.0.1:9", ResourceConfig::default()).unwrap();
        let err = client.fetch_timeline_data(Some(100), Some(50)).await.unwrap_err();
        assert_eq!(
            err,
            ResourceError::Validation("start time must be before end time".into())
        );
        let empty: [&str; 0] = [];
        assert_matches!(
            client.fetch_time_series(&empty).await,
            Err(ResourceError::Validation(_))
        );
        assert_matches!(
            client.fetch_agent_detail("").await,
            Err(ResourceError::Validation(_))
        );
    }
}
