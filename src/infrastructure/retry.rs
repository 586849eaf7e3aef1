//! Linear retry policy shared by fetches and whole scrape attempts
//!
//! Attempt `n` (1-based) that fails waits `n * base` before attempt `n + 1`.
//! The default policy makes 3 attempts in total with a 2s base, so it backs
//! off 2s and then 4s.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
}

/// Classification of one failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after the policy delay, extended to at least `min_delay`
    Retry { min_delay: Option<Duration> },
    GiveUp,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay after failed attempt `attempt`
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    pub const fn has_attempts_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Sleep the backoff for `attempt`; returns `false` if cancelled first.
    pub async fn backoff(&self, attempt: u32, min_delay: Option<Duration>, cancel: &CancellationToken) -> bool {
        let delay = min_delay.map_or_else(|| self.delay_after(attempt), |min| min.max(self.delay_after(attempt)));
        debug!("Backing off {:?} after attempt {}", delay, attempt);
        tokio::select! {
            () = tokio::time::sleep(delay) => true,
            () = cancel.cancelled() => false,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}
