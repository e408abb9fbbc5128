//! Versioned, size-bounded tile cache.
//!
//! The cache tracks *metadata* for already-fetched tiles: where the bytes
//! live (an opaque locator owned by the byte-storage delegate), how large
//! they are, and which upstream dataset version produced them. Byte storage
//! itself is someone else's job; the cache is a best-effort index, never a
//! source of truth, so no operation here can fail — a lookup miss is a
//! normal outcome, not an error.
//!
//! Entries are grouped by an opaque version tag, enabling bulk invalidation
//! when the upstream dataset changes, and evicted least-recently-accessed
//! first when the configured entry limit is reached.
//!
//! # Example
//!
//! ```
//! use tilestream::cache::{CacheConfig, VersionedTileCache};
//! use tilestream::coord::TileCoord;
//!
//! let cache = VersionedTileCache::new(CacheConfig::default());
//! cache.create_version("2026-08", None, None);
//!
//! let coord = TileCoord::new(8192, 5461, 14);
//! cache.put(coord, "store/14/8192/5461.png", 24_576, "2026-08");
//!
//! let (locator, version) = cache.get(&coord).expect("just inserted");
//! assert_eq!(locator, "store/14/8192/5461.png");
//! assert_eq!(version, "2026-08");
//! ```

mod types;
mod versioned;

pub use types::{CacheConfig, CacheEntry, CacheStats, TileVersion};
pub use versioned::VersionedTileCache;
