//! Retry policy with capped exponential backoff.
//!
//! Resolution attempts that fail transiently are retried; by default with
//! no attempt cap at all. Every attempt runs under its own deadline and every
//! wait races the shared [`ScanCancellation`], so an aborted run stops
//! retrying promptly.

use crate::cancel::ScanCancellation;
use crate::error::GeoScanError;
use std::future::Future;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts; `None` retries forever
    pub max_attempts: Option<u32>,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Cap for the exponential delay
    pub max_delay: Duration,
    /// Jitter factor (0.0-1.0) added on top of the capped delay
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Retry forever with the default backoff.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Limit the number of attempts. Zero means unlimited.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = if attempts == 0 { None } else { Some(attempts) };
        self
    }

    /// Set base and cap of the backoff.
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max.max(base);
        self
    }

    /// Whether another attempt may follow `attempts_made` failed ones.
    pub fn allows_retry(&self, attempts_made: u32) -> bool {
        match self.max_attempts {
            None => true,
            Some(max) => attempts_made < max,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    ///
    /// `base * 2^(attempt-1)`, capped at `max_delay`, plus deterministic
    /// jitter derived from the attempt number.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(1u64 << (attempt - 1).min(16));
        let capped_ms = delay_ms.min(max_ms);

        let jitter_range = (capped_ms as f64 * self.jitter_factor) as u64;
        let jittered_ms = if jitter_range > 0 {
            capped_ms.saturating_add((attempt as u64 * 7) % jitter_range)
        } else {
            capped_ms
        };

        Duration::from_millis(jittered_ms)
    }
}

/// Run `op` until it succeeds, fails permanently, or the run is cancelled.
///
/// Each attempt is bounded by `attempt_timeout`; an elapsed deadline counts
/// as a retryable [`GeoScanError::Timeout`]. `on_retry` is called with the
/// attempt number and the error before every backoff wait.
pub async fn retry_with_policy<T, F, Fut, R>(
    policy: &RetryPolicy,
    attempt_timeout: Duration,
    cancel: &ScanCancellation,
    operation: &str,
    mut op: F,
    mut on_retry: R,
) -> Result<T, GeoScanError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GeoScanError>>,
    R: FnMut(u32, &GeoScanError),
{
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(GeoScanError::cancelled(format!("{} aborted", operation)));
        }
        attempt = attempt.saturating_add(1);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(GeoScanError::cancelled(format!("{} aborted", operation)));
            }
            outcome = tokio::time::timeout(attempt_timeout, op()) => match outcome {
                Ok(result) => result,
                Err(_) => Err(GeoScanError::timeout(operation, attempt_timeout)),
            },
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && policy.allows_retry(attempt) => {
                on_retry(attempt, &err);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(GeoScanError::cancelled(format!("{} aborted", operation)));
                    }
                    _ = tokio::time::sleep(policy.backoff(attempt)) => {}
                }
            }
            Err(err) => return Err(err),
        }
    }
}
