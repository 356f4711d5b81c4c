//! Response caching.
//!
//! Consulted by the forwarder before the circuit breaker: a hit never touches
//! the network and never counts toward breaker state.

pub mod response;

pub use response::{cache_key, CachePolicy, ResponseCache};
