//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (attempts > 0, cache size > 0)
//! - Detect conflicting routes (overlapping prefixes, duplicate names)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use std::str::FromStr;

use axum::http::Method;
use jsonwebtoken::Algorithm;
use url::Url;

use crate::config::schema::{BackoffConfig, GatewayConfig};
use crate::routing::matcher::PathPrefixMatcher;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("at least one route must be configured")]
    NoRoutes,

    #[error("duplicate route name '{0}'")]
    DuplicateRouteName(String),

    #[error("route '{0}' has an empty prefix")]
    EmptyPrefix(String),

    #[error("routes '{0}' and '{1}' have overlapping prefixes")]
    OverlappingPrefixes(String, String),

    #[error("route '{route}' has invalid url '{url}': {reason}")]
    InvalidUrl { route: String, url: String, reason: String },

    #[error("route '{0}' health path must start with '/'")]
    InvalidHealthPath(String),

    #[error("unsupported jwt algorithm '{0}' (expected HS256, HS384 or HS512)")]
    UnsupportedAlgorithm(String),

    #[error("jwt secret must not be empty")]
    EmptySecret,

    #[error("invalid bind address '{0}'")]
    InvalidBindAddress(String),

    #[error("invalid http method '{0}'")]
    InvalidMethod(String),

    #[error("cache.max_entries must be positive")]
    ZeroCacheEntries,

    #[error("retries.max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("retry status {0} is not a valid http status")]
    InvalidRetryStatus(u16),

    #[error("circuit_breaker.fail_max must be at least 1")]
    ZeroFailMax,

    #[error("gateway health path must start with '/' and name a path below the root")]
    InvalidGatewayHealthPath,

    #[error("timeouts.request_secs ({request_secs}s) must exceed the worst-case retry budget ({budget_ms}ms)")]
    RequestDeadlineTooShort { request_secs: u64, budget_ms: u64 },
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(config.listener.bind_address.clone()));
    }

    validate_routes(config, &mut errors);

    match Algorithm::from_str(&config.auth.jwt_algorithm) {
        Ok(Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) => {}
        _ => errors.push(ValidationError::UnsupportedAlgorithm(config.auth.jwt_algorithm.clone())),
    }
    if config.auth.jwt_secret.is_empty() {
        errors.push(ValidationError::EmptySecret);
    }

    let methods = config
        .security
        .allowed_methods
        .iter()
        .chain(config.cache.rules.iter().map(|r| &r.method))
        .chain(config.transform.rules.iter().map(|r| &r.method));
    for method in methods {
        if Method::from_bytes(method.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidMethod(method.clone()));
        }
    }

    if config.cache.max_entries == 0 {
        errors.push(ValidationError::ZeroCacheEntries);
    }
    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::ZeroAttempts);
    }
    for status in &config.retries.retryable_statuses {
        if !(100..=599).contains(status) {
            errors.push(ValidationError::InvalidRetryStatus(*status));
        }
    }
    if config.circuit_breaker.fail_max == 0 {
        errors.push(ValidationError::ZeroFailMax);
    }
    let budget_ms = retry_budget_ms(config);
    if config.timeouts.request_secs.saturating_mul(1000) <= budget_ms {
        errors.push(ValidationError::RequestDeadlineTooShort {
            request_secs: config.timeouts.request_secs,
            budget_ms,
        });
    }
    if !config.health.path.starts_with('/') || config.health.path.trim_matches('/').is_empty() {
        errors.push(ValidationError::InvalidGatewayHealthPath);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Longest the retry loop can run: every attempt hitting the upstream
/// deadline, plus the largest delay (jitter included) between attempts.
fn retry_budget_ms(config: &GatewayConfig) -> u64 {
    let attempts = u64::from(config.retries.max_attempts.max(1));
    let max_delay_ms = match config.retries.backoff {
        BackoffConfig::Fixed { delay_ms } => delay_ms,
        BackoffConfig::Exponential { max_delay_ms, .. } => max_delay_ms.saturating_add(max_delay_ms / 10),
    };

    attempts
        .saturating_mul(config.timeouts.upstream_secs.saturating_mul(1000))
        .saturating_add((attempts - 1).saturating_mul(max_delay_ms))
}

fn validate_routes(config: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    if config.routes.is_empty() {
        errors.push(ValidationError::NoRoutes);
        return;
    }

    let mut names = HashSet::new();
    let mut prefixes: Vec<(&str, PathPrefixMatcher)> = Vec::new();

    for route in &config.routes {
        if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRouteName(route.name.clone()));
        }

        match Url::parse(&route.url) {
            Ok(url) if url.scheme() == "http" && url.host().is_some() => {}
            Ok(url) => errors.push(ValidationError::InvalidUrl {
                route: route.name.clone(),
                url: route.url.clone(),
                reason: format!("unsupported scheme '{}' or missing host", url.scheme()),
            }),
            Err(e) => errors.push(ValidationError::InvalidUrl {
                route: route.name.clone(),
                url: route.url.clone(),
                reason: e.to_string(),
            }),
        }

        if !route.health_path.starts_with('/') {
            errors.push(ValidationError::InvalidHealthPath(route.name.clone()));
        }

        if route.prefix.trim().trim_matches('/').is_empty() {
            errors.push(ValidationError::EmptyPrefix(route.name.clone()));
            continue;
        }

        let matcher = PathPrefixMatcher::new(&route.prefix);
        for (other_name, other) in &prefixes {
            if matcher.overlaps(other) {
                errors.push(ValidationError::OverlappingPrefixes(
                    other_name.to_string(),
                    route.name.clone(),
                ));
            }
        }
        prefixes.push((route.name.as_str(), matcher));
    }
}
