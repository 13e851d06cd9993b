//! Retry policy: attempt budget and exponential backoff.

use std::time::Duration;

/// How many times, and how long between, the pipeline retries a transient
/// failure.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  /// Retries after the first attempt; 3 retries means 4 attempts total.
  pub max_retries: u32,
  /// Delay before the first retry; doubles each retry after that.
  pub base_delay:  Duration,
}

impl RetryPolicy {
  /// Delay inserted after failed attempt number `attempt` (zero-based).
  pub fn delay_after(&self, attempt: u32) -> Duration {
    self.base_delay * 2u32.saturating_pow(attempt)
  }

  /// Total attempts this policy permits.
  pub fn max_attempts(&self) -> u32 { self.max_retries + 1 }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self { max_retries: 3, base_delay: Duration::from_secs(1) }
  }
}
