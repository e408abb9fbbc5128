//! Point-in-time aggregate of recorded load metrics.

use serde::Serialize;

/// Aggregated view of request outcomes and load latencies.
///
/// Produced by [`LoadMetrics::snapshot`](super::LoadMetrics::snapshot).
/// All latency fields are zero when no samples have been recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadSnapshot {
    /// Attempts started.
    pub total: u64,
    /// Requests that delivered tile data.
    pub succeeded: u64,
    /// Requests that exhausted their retries.
    pub failed: u64,
    /// Requests cancelled before completion.
    pub cancelled: u64,
    /// Mean load time over the current sample buffer, in milliseconds.
    pub avg_ms: f64,
    /// Median load time in milliseconds.
    pub p50_ms: u64,
    /// 95th-percentile load time in milliseconds.
    pub p95_ms: u64,
    /// 99th-percentile load time in milliseconds.
    pub p99_ms: u64,
}
