//! API Gateway Library
//!
//! A single entry point in front of a set of backend HTTP services:
//! bearer-token authentication, rate limiting, prefix routing, response
//! caching, retries with a per-backend circuit breaker, and aggregated
//! backend health.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod pipeline;
pub mod proxy;
pub mod routing;

// Traffic management
pub mod cache;
pub mod health;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pipeline::Pipeline;
