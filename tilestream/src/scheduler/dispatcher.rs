//! The tile request scheduler.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::coord::TileCoord;
use crate::metrics::{LoadMetrics, LoadSnapshot};

use super::backoff::RetryBackoff;
use super::config::SchedulerConfig;
use super::error::{FetchError, SchedulerError};
use super::inflight::{InFlight, InFlightTable, Outcome, Registration};
use super::request::{RequestId, RequestState, TileRequest};

/// Point-in-time scheduler statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerStats {
    /// Requests actively fetching right now.
    pub active: usize,
    /// Registered requests waiting for a slot or between retries.
    pub queued: usize,
    /// Aggregated load metrics.
    pub load: LoadSnapshot,
}

/// Schedules tile fetches with bounded concurrency, capped exponential
/// backoff, per-attempt timeouts, and cooperative cancellation.
///
/// The scheduler is cache-agnostic: consumers check their cache before
/// calling [`request`](Self::request) and populate it from the returned
/// bytes (cache-aside). The actual I/O lives in the caller-supplied fetch
/// delegate; the scheduler only orchestrates it.
///
/// Duplicate `request` calls for an id already in flight join the
/// existing work and receive the same terminal outcome.
///
/// Cancellation is cooperative: it is observed at the retry-loop
/// checkpoints and interrupts the in-flight race, but a fetch delegate
/// that ignores it may keep running to completion on its own — only the
/// scheduler's bookkeeping stops.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use tilestream::coord::TileCoord;
/// use tilestream::scheduler::{SchedulerConfig, TileRequest, TileScheduler};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let scheduler = TileScheduler::new(SchedulerConfig::default());
/// let request = TileRequest::new(TileCoord::new(1, 2, 3), "memory");
///
/// let data = scheduler
///     .request(request, |_coord| async { Ok(Bytes::from_static(b"tile bytes")) })
///     .await
///     .expect("fetch cannot fail here");
/// assert_eq!(&data[..], b"tile bytes");
/// # }
/// ```
pub struct TileScheduler {
    config: SchedulerConfig,
    backoff: RetryBackoff,
    /// Concurrency slots; one permit per active fetch attempt.
    slots: Arc<Semaphore>,
    inflight: InFlightTable,
    /// Requests currently inside the fetch race. Never exceeds
    /// `config.max_concurrent`.
    active: AtomicUsize,
    metrics: Arc<LoadMetrics>,
}

impl TileScheduler {
    /// Create a scheduler with its own metrics recorder.
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_metrics(config, Arc::new(LoadMetrics::new()))
    }

    /// Create a scheduler reporting into a shared metrics recorder.
    pub fn with_metrics(config: SchedulerConfig, metrics: Arc<LoadMetrics>) -> Self {
        Self {
            backoff: config.backoff(),
            slots: Arc::new(Semaphore::new(config.max_concurrent)),
            inflight: InFlightTable::new(),
            active: AtomicUsize::new(0),
            metrics,
            config,
        }
    }

    /// The metrics recorder this scheduler reports into.
    pub fn metrics(&self) -> &Arc<LoadMetrics> {
        &self.metrics
    }

    /// Fetch one tile, suspending until a terminal outcome.
    ///
    /// Drives the retry loop: admission through the concurrency ceiling,
    /// the fetch delegate raced against the per-attempt timeout, capped
    /// exponential backoff between attempts, and cancellation checks at
    /// every suspend point. Terminal outcomes are the tile bytes, a
    /// [`SchedulerError::RetriesExhausted`] wrapping the last attempt
    /// error, or [`SchedulerError::Cancelled`].
    ///
    /// If `request.id` is already in flight, this call joins the existing
    /// request: the delegate is not invoked again and the shared outcome
    /// is returned to every caller.
    pub async fn request<F, Fut>(
        &self,
        request: TileRequest,
        fetch: F,
    ) -> Result<Bytes, SchedulerError>
    where
        F: Fn(TileCoord) -> Fut,
        Fut: Future<Output = Result<Bytes, FetchError>>,
    {
        let entry = match self
            .inflight
            .register(request.id.clone(), request.coord, request.priority)
        {
            Registration::New(entry) => entry,
            Registration::Joined(existing) => {
                debug!(id = %request.id, "joining in-flight request");
                return existing.join(request.id).await;
            }
        };

        let outcome = self.run_attempts(&request, &entry, fetch).await;

        entry.publish(outcome.clone());
        self.inflight.remove(&request.id);
        outcome
    }

    /// The retry loop for one owned request.
    ///
    /// Every exit path has already released its permit and dropped the
    /// active count; slots cannot leak even under persistent failure.
    async fn run_attempts<F, Fut>(
        &self,
        request: &TileRequest,
        entry: &Arc<InFlight>,
        fetch: F,
    ) -> Outcome
    where
        F: Fn(TileCoord) -> Fut,
        Fut: Future<Output = Result<Bytes, FetchError>>,
    {
        let timeout_ms = self.config.request_timeout.as_millis() as u64;

        loop {
            // Checkpoint: cancelled while waiting to start this attempt.
            if entry.state() == RequestState::Cancelled {
                self.metrics.record_cancelled();
                return Err(SchedulerError::Cancelled(request.id.clone()));
            }

            // Admission: suspend until a slot frees up, unless cancelled
            // first.
            let permit = tokio::select! {
                permit = self.slots.acquire() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        // Semaphore closed; treat like cancellation.
                        entry.try_cancel();
                        self.metrics.record_cancelled();
                        return Err(SchedulerError::Cancelled(request.id.clone()));
                    }
                },
                _ = entry.cancel.cancelled() => {
                    self.metrics.record_cancelled();
                    return Err(SchedulerError::Cancelled(request.id.clone()));
                }
            };

            if !entry.transition(RequestState::Loading) {
                self.metrics.record_cancelled();
                return Err(SchedulerError::Cancelled(request.id.clone()));
            }

            self.active.fetch_add(1, Ordering::SeqCst);
            self.metrics.record_start();
            let started = Instant::now();

            let attempt: Result<Bytes, SchedulerError> = tokio::select! {
                raced = tokio::time::timeout(self.config.request_timeout, fetch(request.coord)) => {
                    match raced {
                        Ok(Ok(bytes)) => Ok(bytes),
                        Ok(Err(err)) => Err(SchedulerError::Fetch(err)),
                        Err(_elapsed) => Err(SchedulerError::Timeout { timeout_ms }),
                    }
                }
                _ = entry.cancel.cancelled() => {
                    Err(SchedulerError::Cancelled(request.id.clone()))
                }
            };

            self.active.fetch_sub(1, Ordering::SeqCst);
            drop(permit);

            match attempt {
                Ok(bytes) => {
                    if !entry.transition(RequestState::Loaded) {
                        // Cancelled in the window after the fetch resolved.
                        self.metrics.record_cancelled();
                        return Err(SchedulerError::Cancelled(request.id.clone()));
                    }
                    self.metrics.record_load_time(started.elapsed());
                    self.metrics.record_success();
                    debug!(
                        id = %request.id,
                        tile = %request.coord,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "tile loaded"
                    );
                    return Ok(bytes);
                }
                Err(SchedulerError::Cancelled(id)) => {
                    self.metrics.record_cancelled();
                    debug!(id = %id, "request cancelled mid-attempt");
                    return Err(SchedulerError::Cancelled(id));
                }
                Err(err) => {
                    let retries = entry.bump_retry();
                    entry.set_last_error(err.clone());
                    if retries > self.config.max_retries {
                        entry.transition(RequestState::Failed);
                        self.metrics.record_failure();
                        warn!(
                            id = %request.id,
                            tile = %request.coord,
                            attempts = retries,
                            error = %err,
                            "request failed, retries exhausted"
                        );
                        return Err(SchedulerError::RetriesExhausted {
                            attempts: retries,
                            last: Box::new(err),
                        });
                    }

                    entry.transition(RequestState::Pending);
                    let delay = self.backoff.delay_for(retries);
                    debug!(
                        id = %request.id,
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = entry.cancel.cancelled() => {
                            self.metrics.record_cancelled();
                            return Err(SchedulerError::Cancelled(request.id.clone()));
                        }
                    }
                }
            }
        }
    }

    /// Cancel a live request.
    ///
    /// Returns `true` if a Pending/Loading request was found and flipped
    /// to `Cancelled`; repeated cancels of one id, and unknown ids,
    /// return `false`.
    pub fn cancel(&self, id: &RequestId) -> bool {
        match self.inflight.get(id) {
            Some(entry) => {
                let cancelled = entry.try_cancel();
                if cancelled {
                    debug!(
                        id = %id,
                        tile = %entry.coord,
                        priority = entry.priority.value(),
                        "request cancelled"
                    );
                }
                cancelled
            }
            None => false,
        }
    }

    /// Cancel a batch of requests; returns how many were newly cancelled.
    pub fn cancel_batch(&self, ids: &[RequestId]) -> usize {
        ids.iter().filter(|id| self.cancel(id)).count()
    }

    /// Cancel every in-flight request; returns how many were newly
    /// cancelled.
    pub fn cancel_all(&self) -> usize {
        let cancelled = self.inflight.cancel_all();
        if cancelled > 0 {
            info!(cancelled, "cancelled all in-flight requests");
        }
        cancelled
    }

    /// Lifecycle state of a registered request, if still tracked.
    pub fn state_of(&self, id: &RequestId) -> Option<RequestState> {
        self.inflight.get(id).map(|entry| entry.state())
    }

    /// Most recent attempt failure of a registered request, if any.
    ///
    /// Only meaningful while the request is still in flight (during
    /// backoff, or waiting for a slot after a failed attempt); terminal
    /// requests are deregistered together with their error history.
    pub fn last_error_of(&self, id: &RequestId) -> Option<SchedulerError> {
        self.inflight.get(id).and_then(|entry| entry.last_error())
    }

    /// Retry count of a registered request, if still tracked.
    pub fn retry_count_of(&self, id: &RequestId) -> Option<u32> {
        self.inflight.get(id).map(|entry| entry.retry_count())
    }

    /// Current scheduler statistics.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            active: self.active.load(Ordering::SeqCst),
            queued: self.inflight.count_in_state(RequestState::Pending),
            load: self.metrics.snapshot(),
        }
    }

    /// Cancel everything and clear the in-flight table.
    ///
    /// Owner tasks observe their cancellation at the next checkpoint and
    /// resolve with [`SchedulerError::Cancelled`]; joined callers receive
    /// the same outcome. The scheduler remains usable afterwards.
    pub fn shutdown(&self) {
        let registered = self.inflight.len();
        let cancelled = self.inflight.cancel_all();
        self.inflight.clear();
        info!(registered, cancelled, "scheduler shut down");
    }
}

// =============================================================================
// Tests
// =============================================================================
