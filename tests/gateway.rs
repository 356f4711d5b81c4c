//! End-to-end tests: real sockets on both sides of the gateway.

use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, Request, StatusCode};
use api_gateway::config::BackoffConfig;
use api_gateway::HttpServer;
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;

use common::{client, closed_port, start_gateway, start_mock_backend, start_programmable_backend, test_config, token};

#[tokio::test]
async fn test_authenticated_request_is_forwarded() {
    let backend = start_mock_backend(200, r#"{"message":"ok"}"#).await;
    let (addr, shutdown) = start_gateway(test_config(&[("service-a", "/service-a", backend.url())])).await;

    let res = client()
        .get(format!("http://{}/service-a/items/7?b=2&a=1", addr))
        .bearer_auth(token("alice"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"message": "ok"}));

    let seen = backend.requests();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, "GET");
    assert_eq!(seen[0].target, "/items/7?b=2&a=1");
    assert_eq!(seen[0].header("x-forwarded-for"), Some("127.0.0.1"));
    assert!(seen[0].header("traceparent").is_some());

    shutdown.trigger();
}

#[tokio::test]
async fn test_missing_token_never_reaches_backend() {
    let backend = start_mock_backend(200, r#"{"message":"ok"}"#).await;
    let (addr, shutdown) = start_gateway(test_config(&[("service-a", "/service-a", backend.url())])).await;

    let res = client()
        .get(format!("http://{}/service-a/items", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.headers().get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"detail": "Authorization header missing"}));
    assert_eq!(backend.calls(), 0);

    shutdown.trigger();
}

#[tokio::test]
async fn test_unknown_prefix_is_404() {
    let backend = start_mock_backend(200, "{}").await;
    let (addr, shutdown) = start_gateway(test_config(&[("service-a", "/service-a", backend.url())])).await;

    let res = client()
        .get(format!("http://{}/service-c/items", addr))
        .bearer_auth(token("alice"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"detail": "Service not found"}));
    assert_eq!(backend.calls(), 0);

    shutdown.trigger();
}

#[tokio::test]
async fn test_disallowed_method_is_405() {
    let backend = start_mock_backend(200, "{}").await;
    let (addr, shutdown) = start_gateway(test_config(&[("service-a", "/service-a", backend.url())])).await;

    let res = client()
        .request(reqwest::Method::OPTIONS, format!("http://{}/service-a/items", addr))
        .bearer_auth(token("alice"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(backend.calls(), 0);

    shutdown.trigger();
}

#[tokio::test]
async fn test_unreachable_backend_is_502_after_retries() {
    let dead = closed_port().await;
    let (addr, shutdown) = start_gateway(test_config(&[("service-a", "/service-a", format!("http://{}", dead))])).await;

    let res = client()
        .get(format!("http://{}/service-a/items", addr))
        .bearer_auth(token("alice"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: Value = res.json().await.unwrap();
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.starts_with("Error communicating with upstream: "), "{}", detail);

    shutdown.trigger();
}

#[tokio::test]
async fn test_transient_status_is_retried() {
    let backend = start_programmable_backend(|call| async move {
        if call < 2 {
            (503, r#"{"error":"busy"}"#.to_string())
        } else {
            (200, r#"{"message":"recovered"}"#.to_string())
        }
    })
    .await;
    let (addr, shutdown) = start_gateway(test_config(&[("service-a", "/service-a", backend.url())])).await;

    let res = client()
        .get(format!("http://{}/service-a/flaky", addr))
        .bearer_auth(token("alice"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"message": "recovered"}));
    assert_eq!(backend.calls(), 3);

    shutdown.trigger();
}

#[tokio::test]
async fn test_backend_error_status_passes_through() {
    let backend = start_mock_backend(404, r#"{"error":"no such item"}"#).await;
    let (addr, shutdown) = start_gateway(test_config(&[("service-a", "/service-a", backend.url())])).await;

    let res = client()
        .get(format!("http://{}/service-a/items/404", addr))
        .bearer_auth(token("alice"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"error": "no such item"}));
    assert_eq!(backend.calls(), 1);

    shutdown.trigger();
}

#[tokio::test]
async fn test_open_circuit_short_circuits() {
    let dead = closed_port().await;
    let mut config = test_config(&[("service-a", "/service-a", format!("http://{}", dead))]);
    config.circuit_breaker.fail_max = 2;
    config.retries.max_attempts = 1;
    let (addr, shutdown) = start_gateway(config).await;
    let client = client();
    let url = format!("http://{}/service-a/items", addr);

    for _ in 0..2 {
        let res = client.get(&url).bearer_auth(token("alice")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    }

    let res = client.get(&url).bearer_auth(token("alice")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"detail": "Service temporarily unavailable"}));

    shutdown.trigger();
}

#[tokio::test]
async fn test_rate_limit_rejects_with_retry_after() {
    let backend = start_mock_backend(200, r#"{"message":"ok"}"#).await;
    let mut config = test_config(&[("service-a", "/service-a", backend.url())]);
    config.rate_limit.rate = "2/minute".parse().unwrap();
    let (addr, shutdown) = start_gateway(config).await;
    let client = client();
    let url = format!("http://{}/service-a/items", addr);

    for _ in 0..2 {
        let res = client.get(&url).bearer_auth(token("bob")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = client.get(&url).bearer_auth(token("bob")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = res
        .headers()
        .get(header::RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));

    // Separate subject, separate budget
    let res = client.get(&url).bearer_auth(token("carol")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    shutdown.trigger();
}

#[tokio::test]
async fn test_repeated_get_is_served_from_cache() {
    let backend = start_mock_backend(200, r#"{"items":[1,2,3]}"#).await;
    let (addr, shutdown) = start_gateway(test_config(&[("service-a", "/service-a", backend.url())])).await;
    let client = client();

    for url in [
        format!("http://{}/service-a/items?a=1&b=2", addr),
        format!("http://{}/service-a/items?b=2&a=1", addr),
    ] {
        let res = client.get(&url).bearer_auth(token("alice")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body, json!({"items": [1, 2, 3]}));
    }

    assert_eq!(backend.calls(), 1);

    shutdown.trigger();
}

#[tokio::test]
async fn test_post_body_is_transformed() {
    let backend = start_mock_backend(201, r#"{"id":1}"#).await;
    let (addr, shutdown) = start_gateway(test_config(&[("service-b", "/service-b", backend.url())])).await;

    let res = client()
        .post(format!("http://{}/service-b/orders", addr))
        .bearer_auth(token("alice"))
        .json(&json!({"qty": 2}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    let seen = backend.requests();
    assert_eq!(seen[0].target, "/orders");
    let forwarded: Value = serde_json::from_slice(&seen[0].body).unwrap();
    assert_eq!(forwarded, json!({"qty": 2, "transformed": true}));

    shutdown.trigger();
}

#[tokio::test]
async fn test_health_reports_each_backend() {
    let up = start_mock_backend(200, r#"{"status":"ok"}"#).await;
    let dead = closed_port().await;
    let mut config = test_config(&[
        ("service-a", "/service-a", up.url()),
        ("service-b", "/service-b", format!("http://{}", dead)),
    ]);
    config.retries.backoff = BackoffConfig::Fixed { delay_ms: 1 };
    let (addr, shutdown) = start_gateway(config).await;

    let res = client().get(format!("http://{}/health", addr)).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"service_a_healthy": true, "service_b_healthy": false}));
    assert_eq!(up.requests()[0].target, "/health");

    shutdown.trigger();
}

#[tokio::test]
async fn test_short_body_is_400() {
    let backend = start_mock_backend(200, "{}").await;
    let server = HttpServer::new(test_config(&[("service-a", "/service-a", backend.url())])).unwrap();

    let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from_static(b"{\"partial\"")),
        Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "client went away")),
    ];
    let request = Request::builder()
        .method("POST")
        .uri("/service-a/orders")
        .header(header::AUTHORIZATION, format!("Bearer {}", token("alice")))
        .header(header::CONTENT_LENGTH, "64")
        .body(Body::from_stream(futures_util::stream::iter(chunks)))
        .unwrap();

    let res = tokio::time::timeout(Duration::from_secs(5), server.router().oneshot(request))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body, json!({"detail": "Too little data for declared Content-Length"}));
    assert_eq!(backend.calls(), 0);
}
