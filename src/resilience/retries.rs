//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a failed attempt is worth repeating
//! - Execute attempts with the configured backoff between them
//!
//! # Design Decisions
//! - Connection failures are always retryable: the backend never saw the request
//! - Timeouts, broken exchanges and retryable statuses are retried only for
//!   idempotent methods unless explicitly allowed
//! - The last attempt's outcome is returned as-is, so an exhausted 5xx
//!   response still reaches the caller verbatim

use std::future::Future;

use axum::http::{Method, StatusCode};

use crate::config::RetryConfig;
use crate::proxy::upstream::{ForwardResult, UpstreamError};
use crate::resilience::backoff::Backoff;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    retryable_statuses: Vec<StatusCode>,
    retry_non_idempotent: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.backoff.into(),
            retryable_statuses: config
                .retryable_statuses
                .iter()
                .filter_map(|s| StatusCode::from_u16(*s).ok())
                .collect(),
            retry_non_idempotent: config.retry_non_idempotent,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_retryable_status(&self, status: StatusCode) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Whether `outcome` of an attempt with `method` should be repeated.
    pub fn should_retry(&self, method: &Method, outcome: &Result<ForwardResult, UpstreamError>) -> bool {
        let replay_safe = method.is_idempotent() || self.retry_non_idempotent;
        match outcome {
            Ok(result) => replay_safe && self.is_retryable_status(result.status),
            Err(UpstreamError::Connect(_)) => true,
            Err(UpstreamError::Timeout(_)) | Err(UpstreamError::Transport(_)) => replay_safe,
            Err(UpstreamError::InvalidRequest(_)) => false,
        }
    }

    /// Run `attempt` up to `max_attempts` times. `attempt` receives the
    /// 1-based attempt number.
    pub async fn run<F, Fut>(
        &self,
        method: &Method,
        max_attempts: u32,
        mut attempt: F,
    ) -> Result<ForwardResult, UpstreamError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<ForwardResult, UpstreamError>>,
    {
        let max_attempts = max_attempts.clamp(1, self.max_attempts);
        let mut n = 1;
        loop {
            let outcome = attempt(n).await;
            if n >= max_attempts || !self.should_retry(method, &outcome) {
                return outcome;
            }

            let delay = self.backoff.delay(n);
            match &outcome {
                Ok(result) => tracing::info!(attempt = n, delay_ms = delay.as_millis() as u64, status = %result.status, "Retrying request"),
                Err(e) => tracing::info!(attempt = n, delay_ms = delay.as_millis() as u64, error = %e, "Retrying after upstream error"),
            }
            tokio::time::sleep(delay).await;
            n += 1;
        }
    }
}
