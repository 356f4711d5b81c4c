//! Request pipeline.
//!
//! # Data Flow
//! ```text
//! axum handler
//!     → orchestrator.rs (fixed stage order, logging, span, metrics)
//!     → transform.rs (narrow body mutation)
//!     → security (auth, rate limit)
//!     → proxy::Forwarder
//! ```

pub mod orchestrator;
pub mod transform;

pub use orchestrator::{BuildError, Pipeline};
pub use transform::RequestTransformer;
