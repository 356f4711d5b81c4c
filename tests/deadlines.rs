//! Inbound deadline vs. retry loop, driven on a paused clock.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use api_gateway::config::{validation::validate_config, GatewayConfig};
use api_gateway::proxy::{ForwardResult, Upstream, UpstreamError, UpstreamRequest};
use api_gateway::security::InMemoryCounterStore;
use api_gateway::HttpServer;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;

use common::{token, SECRET};

/// Backend that never answers within the upstream deadline.
#[derive(Default)]
struct StalledUpstream {
    calls: AtomicU32,
}

#[async_trait]
impl Upstream for StalledUpstream {
    async fn send(&self, _request: UpstreamRequest) -> Result<ForwardResult, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let deadline = Duration::from_secs(10);
        tokio::time::sleep(deadline).await;
        Err(UpstreamError::Timeout(deadline))
    }
}

async fn send(server: &HttpServer, method: &str, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token("alice")))
        .body(Body::empty())
        .unwrap();

    let response = server.router().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test(start_paused = true)]
async fn test_stalled_backend_is_502_then_trips_breaker_under_defaults() {
    let mut config = GatewayConfig::default();
    config.auth.jwt_secret = SECRET.into();
    assert_eq!(validate_config(&config), Ok(()));

    let upstream = Arc::new(StalledUpstream::default());
    let server = HttpServer::with_parts(
        config.clone(),
        upstream.clone(),
        Arc::new(InMemoryCounterStore::new()),
    )
    .unwrap();

    for n in 1..=config.circuit_breaker.fail_max {
        let (status, body) = send(&server, "GET", "/service-a/x").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY, "request {}", n);
        let detail = body["detail"].as_str().unwrap();
        assert!(detail.starts_with("Error communicating with upstream: "), "{}", detail);
        assert_eq!(upstream.calls.load(Ordering::SeqCst), n * config.retries.max_attempts);
    }

    let before = upstream.calls.load(Ordering::SeqCst);
    let (status, body) = send(&server, "GET", "/service-a/x").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({"detail": "Service temporarily unavailable"}));
    assert_eq!(upstream.calls.load(Ordering::SeqCst), before);
}

#[tokio::test(start_paused = true)]
async fn test_health_path_rejects_other_methods_with_detail() {
    let mut config = GatewayConfig::default();
    config.auth.jwt_secret = SECRET.into();
    let upstream = Arc::new(StalledUpstream::default());
    let server = HttpServer::with_parts(config, upstream.clone(), Arc::new(InMemoryCounterStore::new())).unwrap();

    let (status, body) = send(&server, "POST", "/health").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body, json!({"detail": "Method Not Allowed"}));
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 0);
}
