//! Backend call seam.
//!
//! # Responsibilities
//! - Perform one HTTP exchange with a backend under an overall deadline
//! - Classify transport failures (connect, timeout, everything else)
//! - Normalize the response into a `ForwardResult`
//!
//! # Design Decisions
//! - A trait seam so the forwarder can be tested against scripted backends
//! - Backend bodies are parsed as JSON; empty or non-JSON bodies become `{}`
//! - Non-2xx statuses are results, not errors

use std::error::Error as _;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde_json::{Map, Value};

use crate::config::TimeoutConfig;

/// Largest backend body the gateway will buffer.
const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("{0}")]
    Transport(String),

    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),
}

impl UpstreamError {
    /// Label used for the attempts metric.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::Connect(_) => "connect",
            UpstreamError::Timeout(_) => "timeout",
            UpstreamError::Transport(_) => "transport",
            UpstreamError::InvalidRequest(_) => "invalid_request",
        }
    }

    /// Whether the request left the gateway at all.
    pub fn reached_network(&self) -> bool {
        !matches!(self, UpstreamError::InvalidRequest(_))
    }
}

/// Normalized outcome of a backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardResult {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl ForwardResult {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// Build from raw response parts, tolerating empty or non-JSON bodies.
    pub fn from_parts(status: StatusCode, headers: HeaderMap, body: &[u8]) -> Self {
        let body = if body.is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_slice(body).unwrap_or_else(|e| {
                tracing::debug!(error = %e, %status, "Backend body is not JSON, substituting empty object");
                Value::Object(Map::new())
            })
        };
        Self { status, headers, body }
    }
}

/// Request as sent to a backend.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

#[async_trait]
pub trait Upstream: Send + Sync {
    async fn send(&self, request: UpstreamRequest) -> Result<ForwardResult, UpstreamError>;
}

/// Pooled hyper client.
#[derive(Clone)]
pub struct HyperUpstream {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl HyperUpstream {
    pub fn new(timeouts: &TimeoutConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            timeout: Duration::from_secs(timeouts.upstream_secs),
        }
    }

    async fn exchange(&self, request: Request<Body>) -> Result<ForwardResult, UpstreamError> {
        let response: Response<Incoming> = self.client.request(request).await.map_err(|e| {
            let detail = match e.source() {
                Some(source) => format!("{}: {}", e, source),
                None => e.to_string(),
            };
            if e.is_connect() {
                UpstreamError::Connect(detail)
            } else {
                UpstreamError::Transport(detail)
            }
        })?;

        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(Body::new(body), MAX_RESPONSE_BYTES)
            .await
            .map_err(|e| UpstreamError::Transport(format!("failed to read response body: {}", e)))?;

        Ok(ForwardResult::from_parts(parts.status, parts.headers, &bytes))
    }
}

#[async_trait]
impl Upstream for HyperUpstream {
    async fn send(&self, request: UpstreamRequest) -> Result<ForwardResult, UpstreamError> {
        let uri: Uri = request
            .url
            .parse()
            .map_err(|e| UpstreamError::InvalidRequest(format!("{}: {}", request.url, e)))?;

        let mut builder = Request::builder().method(request.method).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            *headers = request.headers;
        }
        let outbound = builder
            .body(Body::from(request.body))
            .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;

        tokio::time::timeout(self.timeout, self.exchange(outbound))
            .await
            .map_err(|_| UpstreamError::Timeout(self.timeout))?
    }
}
