use std::future::Future;
use std::time::Duration;

use rand::Rng as _;

/// Retry decision returned by the error classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Abort,
}

impl RetryAction {
    pub fn from_retryable(retryable: bool) -> Self {
        if retryable {
            RetryAction::Retry
        } else {
            RetryAction::Abort
        }
    }
}

/// Errors that know whether repeating the request could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Exponential backoff with jitter for transient API failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_secs: 5,
            max_delay_secs: 60,
        }
    }
}

impl RetryConfig {
    /// No retries at all; the first error is returned as-is.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay_secs: 0,
            max_delay_secs: 0,
        }
    }

    /// Delay before retry number `retry` (0-indexed):
    /// `min(base * 2^retry, max) + jitter(0..base)`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exp_delay = self
            .base_delay_secs
            .saturating_mul(1u64.checked_shl(retry).unwrap_or(u64::MAX));
        let capped = exp_delay.min(self.max_delay_secs);
        let jitter = if self.base_delay_secs > 0 {
            rand::thread_rng().gen_range(0..self.base_delay_secs)
        } else {
            0
        };
        Duration::from_secs(capped + jitter)
    }
}

/// Retry an async operation with exponential backoff and jitter.
///
/// Returns the first `Ok`, or the last error once retries are exhausted or
/// the classifier answers `Abort`.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    config: &RetryConfig,
    classifier: C,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Display,
{
    let total_attempts = config.max_retries + 1;
    let mut attempt = 0;

    loop {
        let err = match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => e,
        };
        attempt += 1;
        if attempt >= total_attempts || classifier(&err) == RetryAction::Abort {
            return Err(err);
        }
        let delay = config.delay_for_retry(attempt - 1);
        tracing::warn!(
            "Retryable error (attempt {}/{}), retrying in {}s: {}",
            attempt,
            total_attempts,
            delay.as_secs(),
            err
        );
        tokio::time::sleep(delay).await;
    }
}

/// [`retry_with_backoff`] using the error's own [`Retryable`] classification.
pub async fn retry_transient<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display + Retryable,
{
    retry_with_backoff(
        config,
        |e: &E| RetryAction::from_retryable(e.is_retryable()),
        operation,
    )
    .await
}
