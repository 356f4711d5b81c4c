//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline (one gateway.request span per request):
//!     → logging.rs (subscriber: pretty or JSON, EnvFilter)
//!     → metrics.rs (requests, cache, upstream attempts, breaker, health)
//!     → tracing.rs (traceparent continued or started, sent upstream)
//!
//! Sinks:
//!     → stdout
//!     → Prometheus scrape listener
//!     → backends via the traceparent header
//! ```

pub mod logging;
pub mod metrics;
pub mod tracing;
