//! Fixed-window rate limiting against a counter store.
//!
//! # Responsibilities
//! - Derive a stable identity key per caller
//! - Count requests per window in the store and compare against the limit
//! - Apply the configured outage policy when the store cannot answer
//!
//! # Design Decisions
//! - Identity is the authenticated subject, falling back to the client IP
//! - Fail open by default: a store outage must not take the gateway down
//! - Retry-After is the remaining window reported by the store

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{RateLimitConfig, RateLimitKey, RateSpec, StoreFailurePolicy};
use crate::security::auth::AuthClaims;
use crate::security::store::{CounterStore, StoreError};

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted { remaining: u64 },
    Rejected { retry_after: Duration },
}

/// Rate limiter bound to a counter store and a configured budget.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    spec: RateSpec,
    key_by: RateLimitKey,
    on_store_error: StoreFailurePolicy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: &RateLimitConfig) -> Self {
        Self {
            store,
            spec: config.rate,
            key_by: config.key_by,
            on_store_error: config.on_store_error,
        }
    }

    /// Counter key for the caller.
    pub fn identity_key(&self, claims: Option<&AuthClaims>, client_ip: Option<IpAddr>) -> String {
        let subject = match self.key_by {
            RateLimitKey::Subject => claims.and_then(AuthClaims::subject),
            RateLimitKey::ClientIp => None,
        };
        match (subject, client_ip) {
            (Some(sub), _) => format!("rate:sub:{}", sub),
            (None, Some(ip)) => format!("rate:ip:{}", ip),
            (None, None) => "rate:anonymous".to_string(),
        }
    }

    /// Increment the caller's window and decide.
    pub async fn admit(
        &self,
        identity_key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<Admission, StoreError> {
        let counted = self.store.increment(identity_key, window).await?;

        if counted.count > limit {
            Ok(Admission::Rejected {
                retry_after: counted.resets_in,
            })
        } else {
            Ok(Admission::Admitted {
                remaining: limit - counted.count,
            })
        }
    }

    /// Check against the configured budget, applying the outage policy.
    ///
    /// Only returns an error when the store failed and the policy is fail-closed.
    pub async fn check(&self, identity_key: &str) -> Result<Admission, StoreError> {
        match self.admit(identity_key, self.spec.limit, self.spec.window).await {
            Ok(admission) => Ok(admission),
            Err(e) => match self.on_store_error {
                StoreFailurePolicy::FailOpen => {
                    tracing::warn!(error = %e, key = %identity_key, "Rate limit store unavailable, admitting request");
                    Ok(Admission::Admitted { remaining: self.spec.limit })
                }
                StoreFailurePolicy::FailClosed => {
                    tracing::warn!(error = %e, key = %identity_key, "Rate limit store unavailable, rejecting request");
                    Err(e)
                }
            },
        }
    }
}
