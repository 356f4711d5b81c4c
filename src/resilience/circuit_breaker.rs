//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: a single trial call tests whether the backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= fail_max
//! Open → Half-Open: first request after reset_timeout (becomes the trial)
//! Half-Open → Closed: trial succeeds
//! Half-Open → Open: trial fails (opened_at restarts)
//! Half-Open → Open: trial abandoned (opened_at kept, next caller is the trial)
//! ```
//!
//! # Design Decisions
//! - Per-backend circuit breaker (not global), owned by the forwarder
//! - Fail fast in Open state (no network I/O)
//! - Admission and outcome recording go through a `CallPermit`, so the
//!   Open → Half-Open transition and the trial flag change under one lock

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Returned when the breaker rejects a call without touching the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("circuit open")]
pub struct CircuitOpen;

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Breaker guarding a single backend.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    fail_max: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, fail_max: u32, reset_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            fail_max: fail_max.max(1),
            reset_timeout,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Current state. An Open breaker whose timeout elapsed still reports
    /// Open until a caller claims the trial.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Ask to call the backend.
    pub fn try_acquire(self: &Arc<Self>) -> Result<CallPermit, CircuitOpen> {
        let mut inner = self.inner.lock();
        let state = inner.state;
        match state {
            CircuitState::Closed => Ok(self.permit(false)),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.reset_timeout)
                    .unwrap_or(true);
                if !elapsed {
                    return Err(CircuitOpen);
                }
                inner.state = CircuitState::HalfOpen;
                inner.trial_in_flight = true;
                drop(inner);

                tracing::info!(route = %self.name, "Circuit half-open, admitting trial call");
                metrics::record_circuit_state(&self.name, CircuitState::HalfOpen);
                Ok(self.permit(true))
            }
            CircuitState::HalfOpen if inner.trial_in_flight => Err(CircuitOpen),
            CircuitState::HalfOpen => {
                inner.trial_in_flight = true;
                Ok(self.permit(true))
            }
        }
    }

    fn permit(self: &Arc<Self>, trial: bool) -> CallPermit {
        CallPermit {
            breaker: Arc::clone(self),
            trial,
            settled: false,
        }
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.inner.lock();
        if trial {
            inner.state = CircuitState::Closed;
            inner.consecutive_failures = 0;
            inner.opened_at = None;
            inner.trial_in_flight = false;
            drop(inner);

            tracing::info!(route = %self.name, "Circuit closed, backend recovered");
            metrics::record_circuit_state(&self.name, CircuitState::Closed);
        } else if inner.state == CircuitState::Closed {
            inner.consecutive_failures = 0;
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.inner.lock();
        let trips = if trial {
            true
        } else if inner.state == CircuitState::Closed {
            inner.consecutive_failures += 1;
            inner.consecutive_failures >= self.fail_max
        } else {
            // Late result from a call admitted before the breaker opened
            false
        };

        if trips {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            inner.trial_in_flight = false;
            let failures = inner.consecutive_failures;
            drop(inner);

            tracing::warn!(
                route = %self.name,
                consecutive_failures = failures,
                reset_timeout_secs = self.reset_timeout.as_secs(),
                trial,
                "Circuit opened"
            );
            metrics::record_circuit_state(&self.name, CircuitState::Open);
        }
    }

    fn on_abandoned(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen && inner.trial_in_flight {
            inner.state = CircuitState::Open;
            inner.trial_in_flight = false;
            drop(inner);

            tracing::debug!(route = %self.name, "Trial call abandoned, circuit back to open");
            metrics::record_circuit_state(&self.name, CircuitState::Open);
        }
    }
}

/// Admission to call the backend once. Record exactly one outcome; a trial
/// permit dropped without an outcome puts the breaker back to Open.
#[must_use = "record the call outcome with success() or failure()"]
#[derive(Debug)]
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    trial: bool,
    settled: bool,
}

impl CallPermit {
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.on_abandoned();
        }
    }
}

/// Breakers keyed by backend name, created on first use.
#[derive(Debug)]
pub struct CircuitBreakers {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    fail_max: u32,
    reset_timeout: Duration,
}

impl CircuitBreakers {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            fail_max: config.fail_max,
            reset_timeout: Duration::from_secs(config.reset_timeout_secs),
        }
    }

    pub fn for_backend(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(name) {
            return Arc::clone(breaker.value());
        }
        let breaker = self
            .breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.fail_max, self.reset_timeout)));
        Arc::clone(breaker.value())
    }
}
