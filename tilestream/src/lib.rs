//! TileStream - map-tile delivery core.
//!
//! This library sits between a rendering/consumer layer that asks "give
//! me tile (x, y, z)" and a caller-supplied fetch delegate that performs
//! the actual network or disk I/O. It schedules fetches under a global
//! concurrency ceiling, retries failures with capped exponential
//! backoff, races every attempt against a timeout, supports out-of-band
//! cancellation, and maintains a versioned, size-bounded, LRU-evicted
//! cache of already-fetched tile metadata.
//!
//! # Cache-aside flow
//!
//! The scheduler is deliberately cache-agnostic; the consumer wires the
//! two together:
//!
//! ```
//! use bytes::Bytes;
//! use tilestream::cache::{CacheConfig, VersionedTileCache};
//! use tilestream::coord::TileCoord;
//! use tilestream::scheduler::{SchedulerConfig, TileRequest, TileScheduler};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let scheduler = TileScheduler::new(SchedulerConfig::default());
//! let cache = VersionedTileCache::new(CacheConfig::default());
//! cache.create_version("v1", None, None);
//!
//! let coord = TileCoord::new(8192, 5461, 14);
//! if cache.get(&coord).is_none() {
//!     let data = scheduler
//!         .request(TileRequest::new(coord, "memory"), |_| async {
//!             Ok(Bytes::from_static(b"tile bytes"))
//!         })
//!         .await
//!         .expect("fetch cannot fail here");
//!     cache.put(coord, "store/14/8192/5461", data.len() as u64, "v1");
//! }
//! assert!(cache.get(&coord).is_some());
//! # }
//! ```

pub mod cache;
pub mod coord;
pub mod logging;
pub mod metrics;
pub mod scheduler;

pub use cache::{CacheConfig, CacheStats, VersionedTileCache};
pub use coord::TileCoord;
pub use metrics::{LoadMetrics, LoadSnapshot};
pub use scheduler::{
    FetchError, Priority, RequestId, RequestState, SchedulerConfig, SchedulerError,
    SchedulerStats, TileRequest, TileScheduler,
};

/// Version of the TileStream library.
///
/// Defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
