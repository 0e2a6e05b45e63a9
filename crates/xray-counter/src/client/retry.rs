//! Retry policy for transient API failures.

use std::time::Duration;

use crate::error::ApiError;

/// Exponential backoff for requests against Xray Cloud.
///
/// `max_retries` counts retries after the first attempt, so a policy with
/// `max_retries: 0` sends each request exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// How long to wait before retrying a request that failed with `err`
    /// after `retries_so_far` retries. `None` means give up and surface it.
    #[must_use]
    pub fn backoff(&self, retries_so_far: u32, err: &ApiError) -> Option<Duration> {
        (err.is_transient() && retries_so_far < self.max_retries)
            .then(|| self.delay(retries_so_far))
    }

    /// `initial_delay * multiplier^n`, never above `max_delay`.
    fn delay(&self, n: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(i32::try_from(n).unwrap_or(i32::MAX));
        Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}
