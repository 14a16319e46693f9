//! Retry policy: fixed delay plus random jitter

use std::time::Duration;

use rand::Rng;

/// How many times to retry a failed request and how long to wait between tries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts made after the first one
    pub max_retries: u32,
    /// Base pause before each retry
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Total number of attempts, including the first
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Pause before a retry: the base delay plus up to half of it again,
    /// so that many clients failing together do not retry in lockstep.
    pub fn backoff<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let half = self.delay.as_secs_f64() / 2.0;
        let jitter = rng.random_range(0.0..=half);
        self.delay + Duration::from_secs_f64(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}
