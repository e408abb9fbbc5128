//! Scheduler configuration.

use std::time::Duration;

use super::backoff::RetryBackoff;

/// Default concurrency ceiling.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Default retry bound (retries after the first attempt).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff (1 second).
pub const DEFAULT_RETRY_DELAY_BASE_MS: u64 = 1_000;

/// Default backoff cap (10 seconds).
pub const DEFAULT_RETRY_DELAY_MAX_MS: u64 = 10_000;

/// Default per-attempt timeout (30 seconds).
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Scheduler configuration, immutable per instance.
///
/// The timeout applies per attempt, not per request: a request that
/// retries can take up to `(max_retries + 1) * request_timeout` plus
/// backoff delays before it turns terminal. Callers that need an overall
/// deadline impose it externally.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum requests actively fetching at any instant.
    pub max_concurrent: usize,
    /// Retries allowed after the initial attempt.
    pub max_retries: u32,
    /// Backoff delay after the first failed attempt.
    pub retry_delay_base: Duration,
    /// Backoff delay cap.
    pub retry_delay_max: Duration,
    /// Per-attempt timeout for the fetch delegate.
    pub request_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_base: Duration::from_millis(DEFAULT_RETRY_DELAY_BASE_MS),
            retry_delay_max: Duration::from_millis(DEFAULT_RETRY_DELAY_MAX_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

impl SchedulerConfig {
    /// Set the concurrency ceiling.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Set the retry bound.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff base delay.
    pub fn with_retry_delay_base(mut self, delay: Duration) -> Self {
        self.retry_delay_base = delay;
        self
    }

    /// Set the backoff cap.
    pub fn with_retry_delay_max(mut self, delay: Duration) -> Self {
        self.retry_delay_max = delay;
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Backoff schedule derived from this configuration.
    pub fn backoff(&self) -> RetryBackoff {
        RetryBackoff::new(self.retry_delay_base, self.retry_delay_max)
    }
}
