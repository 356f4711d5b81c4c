//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → auth.rs (verify bearer token, extract claims)
//!     → rate_limit.rs (count the caller's window in store.rs)
//!     → headers.rs (sanitize, add X-Forwarded-For) on the way out
//!     → Pass to routing
//! ```
//!
//! # Design Decisions
//! - Authentication precedes rate limiting so the subject can key the limiter
//! - Rejections never reach a backend

pub mod auth;
pub mod headers;
pub mod rate_limit;
pub mod store;

pub use auth::{AuthClaims, AuthError, AuthVerifier};
pub use rate_limit::{Admission, RateLimiter};
pub use store::{build_store, CounterStore, InMemoryCounterStore, RedisCounterStore, StoreError, WindowCount};
