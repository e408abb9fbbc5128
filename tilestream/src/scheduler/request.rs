//! Tile request descriptor and lifecycle types.

use std::fmt;

use crate::coord::TileCoord;

// =============================================================================
// Request Id
// =============================================================================

/// Unique identifier for a scheduled request, used for lookup and
/// cancellation.
///
/// Two concurrent `request` calls with the same id are coalesced onto one
/// fetch; the default id derived by [`TileRequest::new`] is the tile's
/// cache key, so duplicate requests for the same tile share work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Create a request id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// =============================================================================
// Priority
// =============================================================================

/// Advisory scheduling priority (higher = more urgent).
///
/// Carried on every request as a hint for embedders and diagnostics; the
/// scheduler's admission order does not consult it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub i32);

impl Priority {
    /// Requests a consumer is actively waiting on.
    pub const ON_DEMAND: Priority = Priority(100);

    /// Speculative background work.
    pub const PREFETCH: Priority = Priority(0);

    /// Create a priority with the given value.
    pub fn new(value: i32) -> Self {
        Self(value)
    }

    /// The numeric priority value.
    pub fn value(&self) -> i32 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::PREFETCH
    }
}

// =============================================================================
// Request State
// =============================================================================

/// Lifecycle state of a scheduled request.
///
/// Transitions are owned solely by the scheduler:
/// `Pending → Loading → {Loaded | Pending (retry) | Failed}`, with
/// `Cancelled` reachable from `Pending` or `Loading` at any time. A
/// cancelled request never becomes `Loading` or `Loaded` afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Registered, waiting for a concurrency slot (or between retries).
    Pending,
    /// Fetch delegate in flight.
    Loading,
    /// Tile data delivered.
    Loaded,
    /// Retries exhausted.
    Failed,
    /// Cancelled before completion.
    Cancelled,
}

impl RequestState {
    /// Whether the state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Loaded | Self::Failed | Self::Cancelled)
    }
}

// =============================================================================
// Tile Request
// =============================================================================

/// Descriptor for one tile fetch handed to the scheduler.
///
/// Mutable lifecycle state (current [`RequestState`], retry count, last
/// error) lives inside the scheduler while the request is in flight; the
/// descriptor itself stays immutable.
///
/// # Example
///
/// ```
/// use tilestream::coord::TileCoord;
/// use tilestream::scheduler::{Priority, TileRequest};
///
/// let request = TileRequest::new(TileCoord::new(1, 2, 3), "https://tiles.example/{z}/{x}/{y}")
///     .with_priority(Priority::ON_DEMAND);
/// assert_eq!(request.id.as_str(), "3/1/2");
/// ```
#[derive(Debug, Clone)]
pub struct TileRequest {
    /// Unique id; defaults to the tile's cache key.
    pub id: RequestId,
    /// Tile to fetch.
    pub coord: TileCoord,
    /// Opaque source locator handed through to the fetch delegate's
    /// embedder (URL template, dataset path, provider name).
    pub source: String,
    /// Advisory priority hint.
    pub priority: Priority,
}

impl TileRequest {
    /// Create a request for `coord`, with the id derived from the tile's
    /// cache key so duplicate requests for one tile coalesce.
    pub fn new(coord: TileCoord, source: impl Into<String>) -> Self {
        Self {
            id: RequestId::new(coord.cache_key()),
            coord,
            source: source.into(),
            priority: Priority::default(),
        }
    }

    /// Override the request id.
    pub fn with_id(mut self, id: impl Into<RequestId>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the advisory priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}
