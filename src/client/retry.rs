//! Retry logic with exponential backoff.
//!
//! The operation decides what failed; [`IsRetryable`] decides whether that
//! failure is worth another attempt. Delays start at the policy's initial
//! delay and double after each retry, never exceeding the policy's cap.

use std::future::Future;
use std::time::Duration;

use crate::error::{ArchiveError, MediaError};

/// Explicit retry parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first attempt; it is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay slept before retry number `retry` (1 for the first retry).
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Errors that can be classified as transient.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for ArchiveError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded { .. } | Self::Server { .. } | Self::Network(_)
        )
    }
}

impl IsRetryable for MediaError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http(status) => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or the policy's
/// attempts are used up.
///
/// The operation receives the 1-based attempt number. On exhaustion the
/// error from the last attempt is returned.
///
/// # Errors
///
/// Returns the first non-retryable error, or the last retryable one.
pub async fn with_retry<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < policy.max_attempts() => {
                let delay = policy.delay_for_retry(attempt);
                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts = policy.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "Request failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(error = %e, attempts = attempt, "Retry budget exhausted");
                } else {
                    tracing::debug!(error = %e, "Request failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}
