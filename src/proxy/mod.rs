//! Backend forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! ForwardRequest
//!     → forwarder.rs (route, cache, breaker, retries)
//!     → upstream.rs (one HTTP exchange per attempt)
//!     → ForwardResult or GatewayError
//! ```

pub mod forwarder;
pub mod upstream;

pub use forwarder::{ForwardRequest, Forwarder};
pub use upstream::{ForwardResult, HyperUpstream, Upstream, UpstreamError, UpstreamRequest};
