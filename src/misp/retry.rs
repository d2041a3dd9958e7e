//! Retry with exponential backoff for remote calls.
//!
//! Only transient failures (network errors, HTTP 429 and 5xx) are retried.
//! Auth and client errors fail immediately since no amount of waiting fixes
//! a bad API key or a rejected payload.

use std::future::Future;
use std::time::Duration;

use log::warn;
use tokio_retry::strategy::ExponentialBackoff;

use crate::config::{BACKOFF_FACTOR_SECS, DEFAULT_MAX_ATTEMPTS};
use crate::error::{ApiError, ClientError};

/// How many attempts a remote call gets and how long to wait between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Clamped to at least 1.
    pub max_attempts: usize,
    /// Base of the exponential delay: attempt n waits `base^n` seconds.
    pub backoff_base_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_secs: BACKOFF_FACTOR_SECS,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, backoff_base_secs: u64) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            backoff_base_secs,
        }
    }

    fn delays(&self) -> impl Iterator<Item = Duration> {
        // base^1, base^2, ... seconds.
        ExponentialBackoff::from_millis(self.backoff_base_secs).factor(1000)
    }

    /// Runs `operation` until it succeeds, fails permanently, or the attempt
    /// budget is spent.
    pub async fn run<T, F, Fut>(&self, context: &str, mut operation: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut delays = self.delays();
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => {
                    return Err(ClientError::Unexpected(format!("{context}: {e}")));
                }
                Err(e) if attempt >= max_attempts => {
                    return Err(ClientError::Connection {
                        attempts: max_attempts,
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = delays.next().unwrap_or(Duration::ZERO);
                    warn!(
                        "{context} failed (attempt {attempt}/{max_attempts}): {e}. Retrying in {}s",
                        delay.as_secs()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
