//! Exponential backoff schedule for retry delays.

use std::time::Duration;

/// Capped exponential backoff.
///
/// The delay before retry `n` (1-based) is `base * 2^(n-1)`, capped at
/// `max`. With `base = 1000ms, max = 10000ms` the schedule runs
/// 1000, 2000, 4000, 8000, 10000, 10000, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryBackoff {
    base: Duration,
    max: Duration,
}

impl RetryBackoff {
    /// Create a schedule with the given base delay and cap.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before the `retry`th retry (1-based).
    ///
    /// A `retry` of 0 is treated as 1. Delays are non-decreasing in
    /// `retry` and never exceed the cap.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(32);
        let base_ms = self.base.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(1u64 << exponent).min(max_ms);
        Duration::from_millis(delay_ms)
    }
}
