//! Retry policy with exponential or fixed backoff.

use std::thread;
use std::time::Duration;

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never below 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Backoff growth factor per retry; 1 gives a fixed delay.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3, Duration::from_millis(200), Duration::from_secs(5))
    }
}

impl RetryPolicy {
    pub fn exponential(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
            multiplier: 2,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: delay,
            max_backoff: delay,
            multiplier: 1,
        }
    }

    pub fn none() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff.max(self.initial_backoff))
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempts are used up. The closure receives the 1-based attempt
    /// number.
    pub fn run<T, E, F, R>(&self, mut operation: F, is_retryable: R) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        R: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts && is_retryable(&err) => {
                    let delay = self.backoff(attempt);
                    debug!(attempt, error = %err, delay_ms = delay.as_millis() as u64, "retrying");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
