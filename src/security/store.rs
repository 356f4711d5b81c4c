//! Counter stores backing the rate limiter.
//!
//! # Responsibilities
//! - Atomically increment a per-identity counter inside a fixed window
//! - Report how long until the window resets
//!
//! # Design Decisions
//! - The window opens on the first increment and expires with the key
//! - Redis is the shared store for multi-instance deployments; atomicity comes
//!   from a single Lua script, the gateway takes no lock of its own
//! - The in-memory store serves single-instance deployments and tests

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use tokio::sync::OnceCell;
use tokio::time::Instant;

use crate::config::{RateLimitConfig, StoreKind};

/// Deadline for any single store round-trip.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(1);

/// Purge expired in-memory windows every this many increments.
const PURGE_EVERY: u64 = 1024;

/// Counter state after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Requests counted in the current window, including this one.
    pub count: u64,
    /// Time until the window resets.
    pub resets_in: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    #[error("counter store timed out")]
    Timeout,
}

/// Atomic increment-with-expiry.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError>;
}

/// Build the store selected by configuration.
pub fn build_store(config: &RateLimitConfig) -> Result<Arc<dyn CounterStore>, StoreError> {
    match config.store {
        StoreKind::Memory => Ok(Arc::new(InMemoryCounterStore::new())),
        StoreKind::Redis => Ok(Arc::new(RedisCounterStore::new(&config.redis_url)?)),
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u64,
    reset_at: Instant,
}

/// Process-local fixed-window counters.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    windows: DashMap<String, Window>,
    increments: AtomicU64,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn purge_expired(&self, now: Instant) {
        self.windows.retain(|_, w| w.reset_at > now);
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError> {
        let now = Instant::now();
        if self.increments.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
            self.purge_expired(now);
        }

        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            reset_at: now + window,
        });
        if entry.reset_at <= now {
            entry.count = 0;
            entry.reset_at = now + window;
        }
        entry.count += 1;

        Ok(WindowCount {
            count: entry.count,
            resets_in: entry.reset_at.saturating_duration_since(now),
        })
    }
}

/// INCR the key, start the window on the first hit, and return the count
/// with the remaining window in milliseconds.
const INCREMENT_SCRIPT: &str = r"
local count = redis.call('INCR', KEYS[1])
local ttl = redis.call('PTTL', KEYS[1])
if count == 1 or ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
";

/// Redis-backed counters shared by every gateway instance.
pub struct RedisCounterStore {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
    script: redis::Script,
}

impl RedisCounterStore {
    /// Parse the URL; the connection itself is opened on first use so a
    /// missing Redis falls under the limiter's outage policy.
    pub fn new(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
            script: redis::Script::new(INCREMENT_SCRIPT),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                match tokio::time::timeout(COMMAND_TIMEOUT, self.client.get_connection_manager()).await {
                    Ok(Ok(manager)) => {
                        tracing::info!("Connected to rate limit store");
                        Ok(manager)
                    }
                    Ok(Err(e)) => Err(StoreError::Unavailable(e.to_string())),
                    Err(_) => Err(StoreError::Timeout),
                }
            })
            .await?;
        Ok(manager.clone())
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError> {
        let mut conn = self.connection().await?;
        let window_ms = window.as_millis().max(1) as u64;

        let mut invocation = self.script.prepare_invoke();
        invocation.key(key).arg(window_ms);
        let result: redis::RedisResult<(u64, i64)> =
            tokio::time::timeout(COMMAND_TIMEOUT, invocation.invoke_async(&mut conn))
                .await
                .map_err(|_| StoreError::Timeout)?;
        let (count, ttl_ms) = result.map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(WindowCount {
            count,
            resets_in: Duration::from_millis(ttl_ms.max(0) as u64),
        })
    }
}
