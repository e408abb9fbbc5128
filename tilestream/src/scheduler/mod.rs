//! Tile request scheduling.
//!
//! The [`TileScheduler`] sits between a consumer (rendering layer) and a
//! caller-supplied fetch delegate that performs the actual I/O. It owns
//! every in-flight request's lifecycle and enforces the delivery
//! policies: a global concurrency ceiling, per-attempt timeouts, capped
//! exponential backoff between retries, and cooperative cancellation.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                        TileScheduler                           │
//! │                                                                │
//! │  request(id) ──► ┌──────────────┐                              │
//! │                  │  In-flight?  │──► yes ──► join outcome      │
//! │                  └──────┬───────┘                              │
//! │                         │ no                                   │
//! │                         ▼                                      │
//! │                  ┌──────────────┐   at ceiling                 │
//! │                  │  Admission   │◄─────── suspend ──────┐      │
//! │                  └──────┬───────┘                       │      │
//! │                         ▼                               │      │
//! │                  ┌──────────────┐  fetch vs timeout     │      │
//! │                  │   Attempt    │  vs cancellation      │      │
//! │                  └──────┬───────┘                       │      │
//! │                         │ failure                       │      │
//! │                         ▼                               │      │
//! │                  ┌──────────────┐  retries left:        │      │
//! │                  │   Backoff    │─── sleep, loop ───────┘      │
//! │                  └──────┬───────┘                              │
//! │                         │ exhausted                            │
//! │                         ▼                                      │
//! │                  Loaded / Failed / Cancelled ──► metrics       │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The scheduler is cache-agnostic by design: consumers run the
//! cache-aside pattern around it (check the cache, request on miss,
//! populate on success), which keeps both halves independently testable.

mod backoff;
mod config;
mod dispatcher;
mod error;
mod inflight;
mod request;

pub use backoff::RetryBackoff;
pub use config::{
    SchedulerConfig, DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT_MS,
    DEFAULT_RETRY_DELAY_BASE_MS, DEFAULT_RETRY_DELAY_MAX_MS,
};
pub use dispatcher::{SchedulerStats, TileScheduler};
pub use error::{FetchError, SchedulerError};
pub use request::{Priority, RequestId, RequestState, TileRequest};
