//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → circuit_breaker.rs (admit, or fail fast while open)
//!     → retries.rs (repeat transient failures, delays from backoff.rs)
//!     → circuit_breaker.rs (record one outcome for the whole retry loop)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every backend call has a deadline
//! - Policies are plain objects invoked in a fixed order by the forwarder

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;

pub use backoff::Backoff;
pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitBreakers, CircuitOpen, CircuitState};
pub use retries::RetryPolicy;
