//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Root configuration for the API gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Backend routes, one per service prefix.
    pub routes: Vec<RouteConfig>,

    /// Bearer token verification settings.
    pub auth: AuthConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Response cache configuration.
    pub cache: CacheConfig,

    /// Per-backend circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Gateway health endpoint settings.
    pub health: HealthConfig,

    /// Request transformation rules.
    pub transform: TransformConfig,

    /// Request limits and method allow-list.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            routes: vec![
                RouteConfig::new("service-a", "/service-a", "http://localhost:8001"),
                RouteConfig::new("service-b", "/service-b", "http://localhost:8002"),
            ],
            auth: AuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retries: RetryConfig::default(),
            timeouts: TimeoutConfig::default(),
            health: HealthConfig::default(),
            transform: TransformConfig::default(),
            security: SecurityConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

/// A backend service reachable under a path prefix.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RouteConfig {
    /// Route identifier for logging, metrics and the health report.
    pub name: String,

    /// Path prefix to match (e.g. "/service-a").
    pub prefix: String,

    /// Backend base URL (e.g. "http://localhost:8001").
    pub url: String,

    /// Path probed on the backend by the health endpoint.
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

impl RouteConfig {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            url: url.into(),
            health_path: default_health_path(),
        }
    }
}

fn default_health_path() -> String {
    "/health".to_string()
}

/// Bearer token verification settings.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared secret used to verify token signatures.
    pub jwt_secret: String,

    /// Signing algorithm accepted by the verifier (HS256, HS384, HS512).
    pub jwt_algorithm: String,

    /// Clock skew tolerated on the expiry claim, in seconds.
    pub leeway_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_algorithm: "HS256".to_string(),
            leeway_secs: 0,
        }
    }
}

// Keeps the secret out of logs.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Allowed requests per window, e.g. "100/minute".
    pub rate: RateSpec,

    /// How the caller identity is derived.
    pub key_by: RateLimitKey,

    /// Counter store backing the limiter.
    pub store: StoreKind,

    /// Redis connection URL when `store = "redis"`.
    pub redis_url: String,

    /// Behavior when the counter store cannot be reached.
    pub on_store_error: StoreFailurePolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate: RateSpec::new(100, Duration::from_secs(60)),
            key_by: RateLimitKey::Subject,
            store: StoreKind::Memory,
            redis_url: "redis://localhost:6379/0".to_string(),
            on_store_error: StoreFailurePolicy::FailOpen,
        }
    }
}

/// Identity used as the rate limit counter key.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitKey {
    /// The token's `sub` claim, falling back to the client IP.
    Subject,
    /// The client IP address.
    ClientIp,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Memory,
    Redis,
}

/// What the limiter decides when the counter store is unavailable.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreFailurePolicy {
    /// Admit the request and log a warning.
    FailOpen,
    /// Reject the request with 503.
    FailClosed,
}

/// A request budget per fixed window, written as `N/unit`.
///
/// Units: `second`, `minute`, `hour`, `day` (plural forms and `s`, `m`, `h`,
/// `d` accepted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct RateSpec {
    pub limit: u64,
    pub window: Duration,
}

impl RateSpec {
    pub fn new(limit: u64, window: Duration) -> Self {
        Self { limit, window }
    }
}

impl FromStr for RateSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (count, unit) = s
            .split_once('/')
            .ok_or_else(|| format!("invalid rate '{}': expected N/unit", s))?;

        let limit: u64 = count
            .trim()
            .parse()
            .map_err(|_| format!("invalid rate '{}': '{}' is not a number", s, count.trim()))?;
        if limit == 0 {
            return Err(format!("invalid rate '{}': limit must be positive", s));
        }

        let secs = match unit.trim().to_ascii_lowercase().as_str() {
            "s" | "sec" | "second" | "seconds" => 1,
            "m" | "min" | "minute" | "minutes" => 60,
            "h" | "hour" | "hours" => 3_600,
            "d" | "day" | "days" => 86_400,
            other => return Err(format!("invalid rate '{}': unknown unit '{}'", s, other)),
        };

        Ok(Self::new(limit, Duration::from_secs(secs)))
    }
}

impl TryFrom<String> for RateSpec {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RateSpec> for String {
    fn from(spec: RateSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for RateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.window.as_secs() {
            1 => "second",
            60 => "minute",
            3_600 => "hour",
            86_400 => "day",
            secs => return write!(f, "{}/{}s", self.limit, secs),
        };
        write!(f, "{}/{}", self.limit, unit)
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable response caching.
    pub enabled: bool,

    /// Maximum number of cached responses.
    pub max_entries: usize,

    /// Time to live for each entry in seconds.
    pub ttl_secs: u64,

    /// Method + prefix allow-list of cacheable requests.
    pub rules: Vec<CacheRule>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1024,
            ttl_secs: 60,
            rules: vec![CacheRule {
                method: "GET".to_string(),
                path_prefix: "/".to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CacheRule {
    pub method: String,
    pub path_prefix: String,
}

/// Circuit breaker thresholds, applied per backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Enable circuit breaking.
    pub enabled: bool,

    /// Consecutive failures that trip the breaker.
    pub fail_max: u32,

    /// Seconds the breaker stays open before allowing a trial call.
    pub reset_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fail_max: 5,
            reset_timeout_secs: 60,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per request, including the first.
    pub max_attempts: u32,

    /// Delay between attempts.
    pub backoff: BackoffConfig,

    /// Backend statuses treated as transient.
    pub retryable_statuses: Vec<u16>,

    /// Also retry timeouts and retryable statuses for POST/PATCH.
    pub retry_non_idempotent: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffConfig::default(),
            retryable_statuses: vec![500, 502, 503, 504],
            retry_non_idempotent: false,
        }
    }
}

/// Delay strategy between retry attempts.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum BackoffConfig {
    /// Same delay before every retry.
    Fixed { delay_ms: u64 },
    /// Doubling delay with up to 10% jitter, capped at `max_delay_ms`.
    Exponential { base_delay_ms: u64, max_delay_ms: u64 },
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig::Fixed { delay_ms: 1000 }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Deadline for a single backend call (connect + read) in seconds.
    pub upstream_secs: u64,

    /// Deadline for the whole inbound request in seconds. Must outlast every
    /// retry attempt plus the delays between them.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            upstream_secs: 10,
            request_secs: 40,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Path of the gateway's own health endpoint.
    pub path: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
        }
    }
}

/// Request transformation rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransformConfig {
    pub rules: Vec<TransformRule>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        let mut set = Map::new();
        set.insert("transformed".to_string(), Value::Bool(true));
        Self {
            rules: vec![TransformRule {
                method: "POST".to_string(),
                path_prefix: "/service-b".to_string(),
                set,
            }],
        }
    }
}

/// Merge `set` into JSON object bodies of matching requests.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TransformRule {
    pub method: String,
    pub path_prefix: String,
    #[serde(default)]
    pub set: Map<String, Value>,
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
    /// Methods the gateway forwards; anything else gets 405.
    pub allowed_methods: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "PATCH"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}
