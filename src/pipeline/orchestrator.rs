//! Pipeline orchestration.
//!
//! # Stage Order
//! ```text
//! log start → span start
//!     → method allow-list → body buffering
//!     → transform → auth → rate limit      (gates short-circuit)
//!     → forward
//! span end → log end → metrics
//! ```
//!
//! # Design Decisions
//! - Every request, including rejected ones, is logged and counted
//! - Gate failures never reach the forwarder
//! - Forwarder errors are translated here, internal state is never exposed

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request};
use axum::response::{IntoResponse, Response};
use tracing::Instrument;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::request::{buffer_body, request_id};
use crate::observability::metrics;
use crate::observability::tracing::{TraceContext, TRACEPARENT};
use crate::pipeline::transform::RequestTransformer;
use crate::proxy::{ForwardRequest, ForwardResult, Forwarder, Upstream};
use crate::routing::RouteTable;
use crate::security::auth::{AuthError, AuthVerifier};
use crate::security::rate_limit::{Admission, RateLimiter};
use crate::security::store::{CounterStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid auth settings: {0}")]
    Auth(#[from] jsonwebtoken::errors::Error),

    #[error("rate limit store: {0}")]
    Store(#[from] StoreError),
}

pub struct Pipeline {
    allowed_methods: Vec<Method>,
    max_body_size: usize,
    transformer: RequestTransformer,
    auth: AuthVerifier,
    rate_limiter: Option<RateLimiter>,
    forwarder: Forwarder,
}

impl Pipeline {
    pub fn new(
        config: &GatewayConfig,
        upstream: Arc<dyn Upstream>,
        store: Arc<dyn CounterStore>,
    ) -> Result<Self, BuildError> {
        let allowed_methods = config
            .security
            .allowed_methods
            .iter()
            .filter_map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok())
            .collect();

        Ok(Self {
            allowed_methods,
            max_body_size: config.security.max_body_size,
            transformer: RequestTransformer::from_config(&config.transform),
            auth: AuthVerifier::new(&config.auth)?,
            rate_limiter: config
                .rate_limit
                .enabled
                .then(|| RateLimiter::new(store, &config.rate_limit)),
            forwarder: Forwarder::new(config, upstream),
        })
    }

    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    pub fn update_routes(&self, table: RouteTable) {
        self.forwarder.update_routes(table);
    }

    /// Run one request through every stage and render the outcome.
    pub async fn handle(&self, request: Request<Body>, client: Option<SocketAddr>) -> Response {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let request_id = request_id(request.headers()).to_string();
        let trace = TraceContext::from_headers(request.headers());
        let route = self
            .forwarder
            .routes()
            .resolve(&path)
            .map(|m| m.route.name.clone())
            .unwrap_or_else(|| "none".to_string());

        let span = tracing::info_span!(
            "gateway.request",
            http.method = %method,
            http.target = %path,
            request_id = %request_id,
            trace_id = %trace.trace_id,
            http.status_code = tracing::field::Empty,
        );

        async move {
            tracing::info!(client = ?client, "Request started");

            let response = match self.process(request, client, &trace).await {
                Ok(result) => result.into_response(),
                Err(e) => {
                    match &e {
                        GatewayError::UpstreamUnavailable(_) | GatewayError::RateLimiterUnavailable => {
                            tracing::error!(error = %e, "Request failed")
                        }
                        _ => tracing::warn!(error = %e, status = e.status().as_u16(), "Request rejected"),
                    }
                    e.into_response()
                }
            };

            let status = response.status().as_u16();
            tracing::Span::current().record("http.status_code", status);
            tracing::info!(
                status,
                route = %route,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Request completed"
            );
            metrics::record_request(method.as_str(), status, &route, start);

            response
        }
        .instrument(span)
        .await
    }

    async fn process(
        &self,
        request: Request<Body>,
        client: Option<SocketAddr>,
        trace: &TraceContext,
    ) -> Result<ForwardResult, GatewayError> {
        let (parts, body) = request.into_parts();
        if !self.allowed_methods.contains(&parts.method) {
            return Err(GatewayError::MethodNotAllowed);
        }

        let body = buffer_body(&parts.headers, body, self.max_body_size).await?;
        let path = parts.uri.path();
        let body = self.transformer.apply(&parts.method, path, body);

        let claims = self.auth.authenticate(credential_header(&parts.headers)?)?;

        if let Some(limiter) = &self.rate_limiter {
            let key = limiter.identity_key(Some(&claims), client.map(|c| c.ip()));
            match limiter.check(&key).await {
                Ok(Admission::Admitted { remaining }) => {
                    tracing::debug!(key = %key, remaining, "Rate limit admitted");
                }
                Ok(Admission::Rejected { retry_after }) => {
                    metrics::record_rate_limited();
                    return Err(GatewayError::RateLimitExceeded { retry_after });
                }
                Err(_) => return Err(GatewayError::RateLimiterUnavailable),
            }
        }

        let mut headers = parts.headers;
        if let Some(value) = trace.header_value() {
            headers.insert(TRACEPARENT, value);
        }
        headers.remove(header::CONTENT_LENGTH);

        let forward = ForwardRequest {
            method: parts.method,
            path: path.to_string(),
            query: parts.uri.query().map(str::to_string),
            headers,
            body,
            client_ip: client.map(|c| c.ip()),
        };
        self.forwarder.forward(&forward).await
    }
}

/// Raw `Authorization` value; a header that is not valid text is malformed.
fn credential_header(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    headers
        .get(header::AUTHORIZATION)
        .map(|value| value.to_str().map_err(|_| AuthError::MalformedCredential))
        .transpose()
}
