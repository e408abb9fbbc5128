//! Recorder for request outcomes and load-time samples.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::LoadSnapshot;

/// Records load-time samples and outcome counters for tile requests.
///
/// Counters only ever increase; recording cannot fail. The sample buffer
/// grows unbounded until the owner calls [`prune`](Self::prune), which
/// keeps only the most recent samples. [`snapshot`](Self::snapshot) is a
/// read-only aggregation and never mutates internal state.
#[derive(Debug, Default)]
pub struct LoadMetrics {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    /// Load-time samples in milliseconds, in recording order.
    samples: Mutex<Vec<u64>>,
}

impl LoadMetrics {
    /// Create a new recorder with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a load attempt started.
    pub fn record_start(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful request.
    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request that exhausted its retries.
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cancelled request.
    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Append a load-time sample.
    pub fn record_load_time(&self, elapsed: Duration) {
        self.samples.lock().push(elapsed.as_millis() as u64);
    }

    /// Truncate the sample buffer to the most recent `max_samples` entries.
    ///
    /// The caller decides the cadence; nothing prunes automatically.
    pub fn prune(&self, max_samples: usize) {
        let mut samples = self.samples.lock();
        let len = samples.len();
        if len > max_samples {
            samples.drain(..len - max_samples);
        }
    }

    /// Number of samples currently buffered.
    pub fn sample_count(&self) -> usize {
        self.samples.lock().len()
    }

    /// Aggregate the current counters and samples into a [`LoadSnapshot`].
    ///
    /// Percentiles are taken from an ascending-sorted copy of the sample
    /// buffer at index `ceil(p/100 * n) - 1`; every latency field is zero
    /// when the buffer is empty.
    pub fn snapshot(&self) -> LoadSnapshot {
        let mut sorted = self.samples.lock().clone();
        sorted.sort_unstable();

        let avg_ms = if sorted.is_empty() {
            0.0
        } else {
            sorted.iter().sum::<u64>() as f64 / sorted.len() as f64
        };

        LoadSnapshot {
            total: self.started.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            avg_ms,
            p50_ms: percentile(&sorted, 50.0),
            p95_ms: percentile(&sorted, 95.0),
            p99_ms: percentile(&sorted, 99.0),
        }
    }
}

/// Value at the `p`th percentile of an ascending-sorted slice.
///
/// Uses the nearest-rank method: index `ceil(p/100 * n) - 1`.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    let index = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted[index]
}
