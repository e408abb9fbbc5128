//! Load metrics for tile delivery observability.
//!
//! This module records per-request outcomes and load-time samples from the
//! scheduler and aggregates them on demand. Counters use lock-free atomics
//! for low-overhead instrumentation; latency samples accumulate behind a
//! mutex until the owner prunes them.
//!
//! # Architecture
//!
//! ```text
//! Scheduler attempts ─────► LoadMetrics ─────► LoadSnapshot ─────► Embedder
//!                           (atomic counters,  (point-in-time
//!                            sample buffer)     aggregate)
//! ```
//!
//! # Example
//!
//! ```
//! use tilestream::metrics::LoadMetrics;
//! use std::time::Duration;
//!
//! let metrics = LoadMetrics::new();
//! metrics.record_start();
//! metrics.record_load_time(Duration::from_millis(42));
//! metrics.record_success();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.total, 1);
//! assert_eq!(snapshot.succeeded, 1);
//! ```

mod recorder;
mod snapshot;

pub use recorder::LoadMetrics;
pub use snapshot::LoadSnapshot;
