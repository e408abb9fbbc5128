//! In-flight request tracking and duplicate coalescing.
//!
//! Each registered request gets one [`InFlight`] entry owning the mutable
//! lifecycle state (current [`RequestState`], retry count, cancellation
//! token) and a watch channel the terminal outcome is published on. A
//! second `request` call for an id already in the table joins the
//! existing entry instead of fetching twice: it subscribes to the outcome
//! channel and receives the same result the owner delivers.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::coord::TileCoord;

use super::error::SchedulerError;
use super::request::{Priority, RequestId, RequestState};

/// Terminal result delivered to the owner and every joined caller.
pub(crate) type Outcome = Result<Bytes, SchedulerError>;

/// Shared state for one registered request.
pub(crate) struct InFlight {
    pub coord: TileCoord,
    pub priority: Priority,
    pub cancel: CancellationToken,
    state: Mutex<RequestState>,
    retry_count: AtomicU32,
    last_error: Mutex<Option<SchedulerError>>,
    outcome_tx: watch::Sender<Option<Outcome>>,
}

impl InFlight {
    fn new(coord: TileCoord, priority: Priority) -> Self {
        let (outcome_tx, _) = watch::channel(None);
        Self {
            coord,
            priority,
            cancel: CancellationToken::new(),
            state: Mutex::new(RequestState::Pending),
            retry_count: AtomicU32::new(0),
            last_error: Mutex::new(None),
            outcome_tx,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RequestState {
        *self.state.lock()
    }

    /// Current retry count.
    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::Relaxed)
    }

    /// Increment the retry count and return the new value.
    pub fn bump_retry(&self) -> u32 {
        self.retry_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record the most recent attempt failure.
    pub fn set_last_error(&self, err: SchedulerError) {
        *self.last_error.lock() = Some(err);
    }

    /// The most recent attempt failure, if any.
    pub fn last_error(&self) -> Option<SchedulerError> {
        self.last_error.lock().clone()
    }

    /// Transition to `next` unless already cancelled.
    ///
    /// Returns whether the transition happened; a cancelled request never
    /// moves to another state.
    pub fn transition(&self, next: RequestState) -> bool {
        let mut state = self.state.lock();
        if *state == RequestState::Cancelled {
            return false;
        }
        *state = next;
        true
    }

    /// Cancel the request if it is still live (Pending or Loading).
    ///
    /// Returns `true` exactly once per request: repeat calls see the
    /// `Cancelled` state and return `false`.
    pub fn try_cancel(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            RequestState::Pending | RequestState::Loading => {
                *state = RequestState::Cancelled;
                drop(state);
                self.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Publish the terminal outcome to joined callers.
    pub fn publish(&self, outcome: Outcome) {
        // Send can only fail when no receiver exists, which is fine: the
        // owner already holds the outcome it is about to return.
        let _ = self.outcome_tx.send(Some(outcome));
    }

    /// Wait for the owner to publish this request's outcome.
    pub async fn join(&self, id: RequestId) -> Outcome {
        let mut rx = self.outcome_tx.subscribe();
        let result = match rx.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) => match outcome.as_ref() {
                Some(result) => result.clone(),
                None => Err(SchedulerError::Cancelled(id)),
            },
            // Sender dropped without publishing: owner task died.
            Err(_) => Err(SchedulerError::Cancelled(id)),
        };
        result
    }
}

/// Result of registering a request id.
pub(crate) enum Registration {
    /// The id was free; the caller owns the new entry's lifecycle.
    New(Arc<InFlight>),
    /// The id is already in flight; the caller should join this entry.
    Joined(Arc<InFlight>),
}

/// Concurrent table of in-flight requests keyed by id.
#[derive(Default)]
pub(crate) struct InFlightTable {
    requests: DashMap<RequestId, Arc<InFlight>>,
}

impl InFlightTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id`, or hand back the existing entry to join.
    pub fn register(&self, id: RequestId, coord: TileCoord, priority: Priority) -> Registration {
        match self.requests.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                Registration::Joined(Arc::clone(existing.get()))
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let entry = Arc::new(InFlight::new(coord, priority));
                vacant.insert(Arc::clone(&entry));
                Registration::New(entry)
            }
        }
    }

    /// Look up a live entry.
    pub fn get(&self, id: &RequestId) -> Option<Arc<InFlight>> {
        self.requests.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Deregister a request that reached a terminal state.
    pub fn remove(&self, id: &RequestId) {
        self.requests.remove(id);
    }

    /// Cancel every live request. Returns how many flipped to cancelled.
    pub fn cancel_all(&self) -> usize {
        self.requests
            .iter()
            .filter(|entry| entry.value().try_cancel())
            .count()
    }

    /// Number of registered requests in the given state.
    pub fn count_in_state(&self, state: RequestState) -> usize {
        self.requests
            .iter()
            .filter(|entry| entry.value().state() == state)
            .count()
    }

    /// Number of registered requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Drop every entry without cancelling.
    pub fn clear(&self) {
        self.requests.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_register(table: &InFlightTable, id: &str) -> Registration {
        table.register(RequestId::new(id), TileCoord::new(1, 2, 3), Priority::default())
    }

    #[test]
    fn test_register_new_then_join() {
        let table = InFlightTable::new();
        assert!(matches!(table_register(&table, "a"), Registration::New(_)));
        assert!(matches!(table_register(&table, "a"), Registration::Joined(_)));
        assert!(matches!(table_register(&table, "b"), Registration::New(_)));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_cancel_once() {
        let entry = InFlight::new(TileCoord::new(0, 0, 0), Priority::default());
        assert!(entry.try_cancel());
        assert!(!entry.try_cancel());
        assert_eq!(entry.state(), RequestState::Cancelled);
        assert!(entry.cancel.is_cancelled());
    }

    #[test]
    fn test_cancelled_entry_refuses_transitions() {
        let entry = InFlight::new(TileCoord::new(0, 0, 0), Priority::default());
        assert!(entry.transition(RequestState::Loading));
        assert!(entry.try_cancel());
        assert!(!entry.transition(RequestState::Loaded));
        assert_eq!(entry.state(), RequestState::Cancelled);
    }

    #[test]
    fn test_terminal_entry_cannot_be_cancelled() {
        let entry = InFlight::new(TileCoord::new(0, 0, 0), Priority::default());
        assert!(entry.transition(RequestState::Loaded));
        assert!(!entry.try_cancel());
        assert_eq!(entry.state(), RequestState::Loaded);
    }

    #[test]
    fn test_last_error_tracks_latest_failure() {
        let entry = InFlight::new(TileCoord::new(0, 0, 0), Priority::default());
        assert!(entry.last_error().is_none());

        entry.set_last_error(SchedulerError::Timeout { timeout_ms: 10 });
        entry.set_last_error(SchedulerError::Timeout { timeout_ms: 20 });
        assert_eq!(
            entry.last_error(),
            Some(SchedulerError::Timeout { timeout_ms: 20 })
        );
    }

    #[test]
    fn test_retry_counter() {
        let entry = InFlight::new(TileCoord::new(0, 0, 0), Priority::default());
        assert_eq!(entry.retry_count(), 0);
        assert_eq!(entry.bump_retry(), 1);
        assert_eq!(entry.bump_retry(), 2);
        assert_eq!(entry.retry_count(), 2);
    }

    #[tokio::test]
    async fn test_join_receives_published_outcome() {
        let entry = Arc::new(InFlight::new(TileCoord::new(0, 0, 0), Priority::default()));

        let joiner = {
            let entry = Arc::clone(&entry);
            tokio::spawn(async move { entry.join(RequestId::new("x")).await })
        };

        entry.publish(Ok(Bytes::from_static(b"tile")));
        let outcome = joiner.await.expect("join task should not panic");
        assert_eq!(outcome.expect("published success"), Bytes::from_static(b"tile"));
    }

    #[tokio::test]
    async fn test_join_after_publish_still_sees_outcome() {
        let entry = InFlight::new(TileCoord::new(0, 0, 0), Priority::default());
        entry.publish(Err(SchedulerError::Timeout { timeout_ms: 5 }));

        let outcome = entry.join(RequestId::new("x")).await;
        assert_eq!(outcome, Err(SchedulerError::Timeout { timeout_ms: 5 }));
    }

    #[test]
    fn test_cancel_all_counts_live_only() {
        let table = InFlightTable::new();
        let first = match table_register(&table, "a") {
            Registration::New(entry) => entry,
            Registration::Joined(_) => unreachable!("fresh table"),
        };
        table_register(&table, "b");
        first.transition(RequestState::Loaded); // terminal before shutdown

        assert_eq!(table.cancel_all(), 1);
    }

    #[test]
    fn test_count_in_state() {
        let table = InFlightTable::new();
        let entry = match table_register(&table, "a") {
            Registration::New(entry) => entry,
            Registration::Joined(_) => unreachable!("fresh table"),
        };
        table_register(&table, "b");

        assert_eq!(table.count_in_state(RequestState::Pending), 2);
        entry.transition(RequestState::Loading);
        assert_eq!(table.count_in_state(RequestState::Pending), 1);
        assert_eq!(table.count_in_state(RequestState::Loading), 1);
    }
}
