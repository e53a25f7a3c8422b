use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::AdapterResult;

/// Exponential backoff with optional jitter for completion calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; zero is treated as one.
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Un-jittered delay before retry number `retry` (zero-based).
    fn base_backoff_millis(&self, retry: usize) -> f64 {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        (self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(exponent))
            .min(self.max_backoff.as_millis() as f64)
    }

    /// Delay before retry number `retry` (zero-based).
    fn backoff_for(&self, retry: usize) -> Duration {
        let millis = self.base_backoff_millis(retry);

        let millis = if self.jitter {
            millis * rand::thread_rng().gen_range(0.5..1.5)
        } else {
            millis
        };

        Duration::from_millis(millis as u64)
    }

    /// Upper bound on a full `execute` run when each attempt is capped at
    /// `per_attempt`: all attempts time out and every backoff draws the
    /// largest jitter.
    pub fn worst_case(&self, per_attempt: Duration) -> Duration {
        let attempts = self.max_attempts.max(1);
        let jitter = if self.jitter { 1.5 } else { 1.0 };
        let backoff_millis: f64 = (0..attempts - 1)
            .map(|retry| self.base_backoff_millis(retry) * jitter)
            .sum();

        per_attempt.saturating_mul(u32::try_from(attempts).unwrap_or(u32::MAX))
            + Duration::from_millis(backoff_millis.ceil() as u64)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempts run out. The last error is returned.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> AdapterResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AdapterResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Completion call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if attempt < max_attempts && err.is_retryable() => {
                    let backoff = self.backoff_for(attempt - 1);
                    warn!(
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Completion call failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    debug!(attempt, retryable = err.is_retryable(), "Giving up on completion call");
                    return Err(err);
                }
            }
        }
    }
}
