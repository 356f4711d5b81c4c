//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse, environment overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → handed to the pipeline at startup
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → route table swapped atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only routes are hot-swappable
//! - All fields have defaults to allow minimal configs
//! - Environment variables keep the deployment's historical names

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::ConfigError;
pub use schema::{
    AuthConfig, BackoffConfig, CacheConfig, CacheRule, CircuitBreakerConfig, GatewayConfig,
    HealthConfig, ListenerConfig, LogFormat, ObservabilityConfig, RateLimitConfig, RateLimitKey,
    RateSpec, RetryConfig, RouteConfig, SecurityConfig, StoreFailurePolicy, StoreKind,
    TimeoutConfig, TransformConfig, TransformRule,
};
