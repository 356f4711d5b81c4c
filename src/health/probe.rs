//! Health endpoint aggregation.
//!
//! # Responsibilities
//! - Probe every backend's health path concurrently
//! - Report one `<route>_healthy` flag per backend
//!
//! # Design Decisions
//! - On-demand probing; no background state to go stale
//! - Healthy means a 2xx within the upstream deadline
//! - Probes bypass the circuit breaker and the cache

use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::{Map, Value};

use crate::observability::metrics;
use crate::proxy::upstream::{Upstream, UpstreamRequest};
use crate::routing::{Route, RouteTable};

pub struct HealthChecker {
    upstream: Arc<dyn Upstream>,
}

/// Key reported for a route: `service-a` becomes `service_a_healthy`.
pub fn health_key(route_name: &str) -> String {
    format!("{}_healthy", route_name.replace('-', "_"))
}

impl HealthChecker {
    pub fn new(upstream: Arc<dyn Upstream>) -> Self {
        Self { upstream }
    }

    pub async fn check_all(&self, routes: &RouteTable) -> Map<String, Value> {
        let probes = routes.routes().iter().map(|route| self.probe(route));
        let results = join_all(probes).await;

        routes
            .routes()
            .iter()
            .zip(results)
            .map(|(route, healthy)| (health_key(&route.name), Value::Bool(healthy)))
            .collect()
    }

    async fn probe(&self, route: &Route) -> bool {
        let url = route.health_url();
        let mut request = UpstreamRequest::get(url.as_str());
        request
            .headers
            .insert("user-agent", axum::http::HeaderValue::from_static("api-gateway-health-check"));

        let healthy = match self.upstream.send(request).await {
            Ok(result) if result.status.is_success() => true,
            Ok(result) => {
                tracing::warn!(route = %route.name, url = %url, status = %result.status, "Health check failed: non-success status");
                false
            }
            Err(e) => {
                tracing::warn!(route = %route.name, url = %url, error = %e, "Health check failed");
                false
            }
        };

        metrics::record_backend_health(&route.name, healthy);
        healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;
    use crate::proxy::upstream::{ForwardResult, UpstreamError};
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use serde_json::json;

    /// Healthy only for URLs on port 8001.
    struct PortUpstream;

    #[async_trait]
    impl Upstream for PortUpstream {
        async fn send(&self, request: UpstreamRequest) -> Result<ForwardResult, UpstreamError> {
            if request.url.contains(":8001/") {
                Ok(ForwardResult::new(StatusCode::OK, json!({"status": "up"})))
            } else if request.url.contains(":8002/") {
                Ok(ForwardResult::new(StatusCode::SERVICE_UNAVAILABLE, json!({})))
            } else {
                Err(UpstreamError::Connect("refused".into()))
            }
        }
    }

    #[test]
    fn test_health_key() {
        assert_eq!(health_key("service-a"), "service_a_healthy");
        assert_eq!(health_key("billing"), "billing_healthy");
    }

    #[tokio::test]
    async fn test_reports_each_backend() {
        let routes = RouteTable::from_config(&[
            RouteConfig::new("service-a", "/service-a", "http://localhost:8001"),
            RouteConfig::new("service-b", "/service-b", "http://localhost:8002"),
            RouteConfig::new("service-c", "/service-c", "http://localhost:8003"),
        ]);

        let report = HealthChecker::new(Arc::new(PortUpstream)).check_all(&routes).await;
        assert_eq!(
            Value::Object(report),
            json!({
                "service_a_healthy": true,
                "service_b_healthy": false,
                "service_c_healthy": false,
            })
        );
    }
}
