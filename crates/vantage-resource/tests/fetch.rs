//! Fetch pipeline against a mock HTTP server.

use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;
use vantage_resource::{FetchOptions, Resource, ResourceClient, ResourceConfig, ResourceError};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config() -> ResourceConfig {
    ResourceConfig {
        retry_delay_ms: 10,
        ..ResourceConfig::default()
    }
}

fn network_body() -> serde_json::Value {
    json!({"nodes": [{"id": 1}], "edges": []})
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.map_or(0, |r| r.len())
}

#[tokio::test]
async fn concurrent_identical_fetches_hit_network_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/metrics/network"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(network_body())
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = ResourceClient::new(&server.uri(), fast_config()).unwrap();
    let (a, b, c) = tokio::join!(
        client.fetch_network_data(),
        client.fetch_network_data(),
        client.fetch_network_data(),
    );
    assert_eq!(a.unwrap(), network_body());
    assert_eq!(b.unwrap(), network_body());
    assert_eq!(c.unwrap(), network_body());
}

#[tokio::test]
async fn invalid_timeline_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let client = ResourceClient::new(&server.uri(), fast_config()).unwrap();
    let err = client
        .fetch_timeline_data(Some(100), Some(50))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "invalid request: start time must be before end time");
}

#[tokio::test]
async fn retries_server_errors_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/metrics/inequality"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/metrics/inequality"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"gini": 0.3})))
        .mount(&server)
        .await;

    let config = ResourceConfig {
        max_retries: 3,
        ..fast_config()
    };
    let client = ResourceClient::new(&server.uri(), config).unwrap();
    let body = client.fetch_inequality_data().await.unwrap();
    assert_eq!(body, json!({"gini": 0.3}));
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/metrics/agent/ghost"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "agent not found"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = ResourceClient::new(&server.uri(), fast_config()).unwrap();
    let err = client.fetch_agent_detail("ghost").await.unwrap_err();
    assert_eq!(
        err,
        ResourceError::Http {
            status: 404,
            message: "agent not found".into()
        }
    );
}

#[tokio::test]
async fn server_errors_exhaust_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/metrics/cultural"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = ResourceClient::new(&server.uri(), fast_config()).unwrap();
    let err = client.fetch_cultural_data().await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn attempts_time_out_and_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/metrics/spatial"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"density": []}))
                .set_delay(Duration::from_millis(500)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let config = ResourceConfig {
        timeout_ms: 50,
        max_retries: 1,
        ..fast_config()
    };
    let client = ResourceClient::new(&server.uri(), config).unwrap();
    let err = client.fetch_spatial_data().await.unwrap_err();
    assert_eq!(err, ResourceError::Timeout { timeout_ms: 50 });
}

#[tokio::test]
async fn missing_required_field_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/metrics/network"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"nodes": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = ResourceClient::new(&server.uri(), fast_config()).unwrap();
    let err = client.fetch_network_data().await.unwrap_err();
    assert_matches!(err, ResourceError::MissingField { ref field, .. } if field == "edges");
    assert!(client.cached_entries().is_empty());
}

#[tokio::test]
async fn malformed_body_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/metrics/cultural"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = ResourceClient::new(&server.uri(), fast_config()).unwrap();
    assert_matches!(
        client.fetch_cultural_data().await,
        Err(ResourceError::Parse(_))
    );
}

#[tokio::test]
async fn unreachable_server_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ResourceConfig {
        retry_delay_ms: 1,
        ..ResourceConfig::default()
    };
    let client = ResourceClient::new(&format!("http://{addr}"), config).unwrap();
    let err = client.fetch_inequality_data().await.unwrap_err();
    assert_matches!(err, ResourceError::Network(_));
}

#[tokio::test]
async fn cached_until_ttl_expires() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/metrics/network"))
        .respond_with(ResponseTemplate::new(200).set_body_json(network_body()))
        .mount(&server)
        .await;

    let config = ResourceConfig {
        cache_ttl_ms: 100,
        ..fast_config()
    };
    let client = ResourceClient::new(&server.uri(), config).unwrap();
    let _ = client.fetch_network_data().await.unwrap();
    let _ = client.fetch_network_data().await.unwrap();
    assert_eq!(request_count(&server).await, 1);
    assert_eq!(client.cached_entries(), vec!["/api/metrics/network".to_owned()]);

    tokio::time::sleep(Duration::from_millis(150)).await;
    let _ = client.fetch_network_data().await.unwrap();
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn force_bypasses_cache_and_refreshes_it() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/metrics/inequality"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"gini": 0.1})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/metrics/inequality"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"gini": 0.2})))
        .mount(&server)
        .await;

    let client = ResourceClient::new(&server.uri(), fast_config()).unwrap();
    assert_eq!(client.fetch_inequality_data().await.unwrap(), json!({"gini": 0.1}));

    let forced = client
        .fetch(Resource::Inequality, FetchOptions::forced())
        .await
        .unwrap();
    assert_eq!(forced, json!({"gini": 0.2}));
    // the forced result replaced the cached one
    assert_eq!(client.fetch_inequality_data().await.unwrap(), json!({"gini": 0.2}));
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn clear_cache_and_invalidate_force_refetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/metrics/spatial"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"density": [[0]]})))
        .expect(3)
        .mount(&server)
        .await;

    let client = ResourceClient::new(&server.uri(), fast_config()).unwrap();
    let _ = client.fetch_spatial_data().await.unwrap();
    client.clear_cache();
    assert!(client.cached_entries().is_empty());

    let _ = client.fetch_spatial_data().await.unwrap();
    assert!(client.invalidate(&Resource::Spatial));
    let _ = client.fetch_spatial_data().await.unwrap();
}

#[tokio::test]
async fn health_is_never_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(2)
        .mount(&server)
        .await;

    let client = ResourceClient::new(&server.uri(), fast_config()).unwrap();
    let health = client.fetch_health().await.unwrap();
    assert_eq!(health["status"], "ok");
    let _ = client.fetch_health().await.unwrap();
    assert!(client.cached_entries().is_empty());
}

#[tokio::test]
async fn time_series_sends_comma_joined_metrics() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/metrics/timeseries"))
        .and(query_param("metrics", "gini,population"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"series": {}})))
        .expect(1)
        .mount(&server)
        .await;

    let client = ResourceClient::new(&server.uri(), fast_config()).unwrap();
    let _ = client
        .fetch_time_series(&["gini", "population"])
        .await
        .unwrap();
}

#[tokio::test]
async fn timeline_sends_bounds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/metrics/timeline"))
        .and(query_param("start", "10"))
        .and(query_param("end", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"events": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = ResourceClient::new(&server.uri(), fast_config()).unwrap();
    let _ = client.fetch_timeline_data(Some(10), Some(20)).await.unwrap();
    assert_eq!(
        client.cached_entries(),
        vec!["/api/metrics/timeline?end=20&start=10".to_owned()]
    );
}
