//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, route
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_rate_limited_total` (counter): requests rejected with 429
//! - `gateway_cache_lookups_total` (counter): cache hits and misses
//! - `gateway_upstream_attempts_total` (counter): backend calls by outcome
//! - `gateway_circuit_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `gateway_backend_health` (gauge): 1=healthy, 0=unhealthy
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - Prometheus exposition runs on its own listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    register_descriptions();
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn register_descriptions() {
    describe_counter!("gateway_requests_total", "Requests handled by the gateway");
    describe_histogram!("gateway_request_duration_seconds", "End-to-end request latency");
    describe_counter!("gateway_rate_limited_total", "Requests rejected by the rate limiter");
    describe_counter!("gateway_cache_lookups_total", "Response cache lookups by result");
    describe_counter!("gateway_upstream_attempts_total", "Backend call attempts by outcome");
    describe_gauge!("gateway_circuit_state", "Circuit state per backend (0 closed, 1 open, 2 half-open)");
    describe_gauge!("gateway_backend_health", "Backend health as last probed (1 healthy, 0 unhealthy)");
}

/// Record a completed request.
pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);

    histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    counter!("gateway_rate_limited_total").increment(1);
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("gateway_cache_lookups_total", "result" => result).increment(1);
}

/// `outcome` is one of `ok`, `retryable_status`, `connect`, `timeout`, `transport`.
pub fn record_upstream_attempt(route: &str, outcome: &'static str) {
    counter!(
        "gateway_upstream_attempts_total",
        "route" => route.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_circuit_state(route: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::Open => 1.0,
        CircuitState::HalfOpen => 2.0,
    };
    gauge!("gateway_circuit_state", "route" => route.to_string()).set(value);
}

pub fn record_backend_health(route: &str, healthy: bool) {
    gauge!("gateway_backend_health", "route" => route.to_string()).set(if healthy { 1.0 } else { 0.0 });
}
