//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! GET {health.path}
//!     → probe.rs (probe each backend's health path concurrently)
//!     → {"<route>_healthy": bool, ...}
//! ```

pub mod probe;

pub use probe::{health_key, HealthChecker};
