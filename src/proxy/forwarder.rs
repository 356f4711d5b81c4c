//! Router/Forwarder: resolve the backend and run the resilience policies.
//!
//! # Responsibilities
//! - Map the inbound path to a backend and strip the route prefix
//! - Serve cache-eligible requests from the response cache
//! - Guard each backend with its circuit breaker
//! - Retry transient failures, then translate what remains
//!
//! # Design Decisions
//! - Fixed order: route → cache → breaker → retries → record → cache fill
//! - One route table snapshot per request; swaps never tear a request
//! - Backend non-2xx statuses come back as results, only transport
//!   failures become errors

use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::body::Bytes;
use axum::http::{header, HeaderMap, Method};

use crate::cache::{cache_key, CachePolicy, ResponseCache};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::proxy::upstream::{ForwardResult, Upstream, UpstreamError, UpstreamRequest};
use crate::resilience::{CallPermit, CircuitBreakers, RetryPolicy};
use crate::routing::RouteTable;
use crate::security::headers::{append_forwarded_for, sanitize_outbound};

/// Inbound request after the gate stages, ready to forward.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub client_ip: Option<IpAddr>,
}

struct CacheLayer {
    cache: ResponseCache,
    policy: CachePolicy,
}

pub struct Forwarder {
    routes: ArcSwap<RouteTable>,
    upstream: Arc<dyn Upstream>,
    breakers: Option<CircuitBreakers>,
    retry: RetryPolicy,
    cache: Option<CacheLayer>,
}

impl Forwarder {
    pub fn new(config: &GatewayConfig, upstream: Arc<dyn Upstream>) -> Self {
        let breakers = config
            .circuit_breaker
            .enabled
            .then(|| CircuitBreakers::new(&config.circuit_breaker));

        let cache = config.cache.enabled.then(|| CacheLayer {
            cache: ResponseCache::new(
                NonZeroUsize::new(config.cache.max_entries).unwrap_or(NonZeroUsize::MIN),
                Duration::from_secs(config.cache.ttl_secs),
            ),
            policy: CachePolicy::from_config(&config.cache),
        });

        Self {
            routes: ArcSwap::from_pointee(RouteTable::from_config(&config.routes)),
            upstream,
            breakers,
            retry: RetryPolicy::from_config(&config.retries),
            cache,
        }
    }

    /// Current route table snapshot.
    pub fn routes(&self) -> Arc<RouteTable> {
        self.routes.load_full()
    }

    /// Replace the route table; in-flight requests keep their snapshot.
    pub fn update_routes(&self, table: RouteTable) {
        let names: Vec<&str> = table.routes().iter().map(|r| r.name.as_str()).collect();
        tracing::info!(routes = ?names, "Route table updated");
        self.routes.store(Arc::new(table));
    }

    pub async fn forward(&self, request: &ForwardRequest) -> Result<ForwardResult, GatewayError> {
        let table = self.routes.load_full();
        let matched = table.resolve(&request.path).ok_or(GatewayError::RouteNotFound)?;
        let route = matched.route;
        let url = route.target_url(matched.rest, request.query.as_deref());

        let cached = self
            .cache
            .as_ref()
            .filter(|layer| layer.policy.is_eligible(&request.method, &request.path))
            .map(|layer| (layer, cache_key(&request.method, &url)));

        if let Some((layer, key)) = &cached {
            let hit = layer.cache.get(key);
            metrics::record_cache_lookup(hit.is_some());
            if let Some(hit) = hit {
                tracing::debug!(route = %route.name, key = %key, "Served from cache");
                return Ok(hit);
            }
        }

        let permit = match &self.breakers {
            Some(breakers) => Some(breakers.for_backend(&route.name).try_acquire().map_err(|_| {
                tracing::warn!(route = %route.name, "Circuit open, rejecting without backend call");
                GatewayError::ServiceUnavailable {
                    route: route.name.clone(),
                }
            })?),
            None => None,
        };
        let max_attempts = if permit.as_ref().is_some_and(CallPermit::is_trial) {
            1
        } else {
            self.retry.max_attempts()
        };

        let mut headers = sanitize_outbound(&request.headers);
        // Bodies are parsed as JSON, so ask for them uncompressed
        headers.remove(header::ACCEPT_ENCODING);
        if let Some(ip) = request.client_ip {
            append_forwarded_for(&mut headers, ip);
        }

        let route_name = route.name.as_str();
        let outcome = self
            .retry
            .run(&request.method, max_attempts, |attempt| {
                let outbound = UpstreamRequest {
                    method: request.method.clone(),
                    url: url.clone(),
                    headers: headers.clone(),
                    body: request.body.clone(),
                };
                let upstream = Arc::clone(&self.upstream);
                async move {
                    let outcome = upstream.send(outbound).await;
                    let label = match &outcome {
                        Ok(result) if self.retry.is_retryable_status(result.status) => "retryable_status",
                        Ok(_) => "ok",
                        Err(e) => e.kind(),
                    };
                    metrics::record_upstream_attempt(route_name, label);
                    tracing::debug!(route = route_name, attempt, outcome = label, "Upstream attempt finished");
                    outcome
                }
            })
            .await;

        if let Some(permit) = permit {
            self.record_outcome(permit, &outcome);
        }

        match outcome {
            Ok(result) => {
                if result.status.is_success() {
                    if let Some((layer, key)) = cached {
                        layer.cache.put(key, result.clone());
                    }
                }
                Ok(result)
            }
            Err(e) => {
                tracing::error!(route = route_name, url = %url, error = %e, "Upstream unavailable");
                Err(GatewayError::UpstreamUnavailable(e))
            }
        }
    }

    fn record_outcome(&self, permit: CallPermit, outcome: &Result<ForwardResult, UpstreamError>) {
        match outcome {
            Ok(result) if self.retry.is_retryable_status(result.status) => permit.failure(),
            Ok(_) => permit.success(),
            Err(e) if e.reached_network() => permit.failure(),
            // Never left the gateway: no verdict on the backend
            Err(_) => drop(permit),
        }
    }
}
