//! Core types for the versioned tile cache.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::coord::TileCoord;

/// Default maximum number of cached entries.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Cache configuration, immutable per instance.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of live entries.
    pub max_entries: usize,
    /// Whether inserts at capacity evict the least-recently-accessed
    /// entries. When disabled, inserts at capacity are dropped instead
    /// so the size bound still holds.
    pub enable_lru: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            enable_lru: true,
        }
    }
}

impl CacheConfig {
    /// Set the maximum number of live entries.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Enable or disable LRU eviction.
    pub fn with_lru(mut self, enable: bool) -> Self {
        self.enable_lru = enable;
        self
    }
}

/// Metadata for one cached tile.
///
/// The entry holds a locator reference to wherever the bytes actually
/// live, never the bytes themselves. At most one live entry exists per
/// coordinate.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Tile coordinate this entry describes.
    pub coord: TileCoord,
    /// Canonical cache key (`"{z}/{x}/{y}"`).
    pub key: String,
    /// Opaque reference into the byte-storage delegate.
    pub locator: String,
    /// Size of the stored bytes.
    pub size_bytes: u64,
    /// Last read or insert time.
    pub last_access: Instant,
    /// Monotonic access sequence; later accesses get larger values, so
    /// eviction order is deterministic even when two accesses share an
    /// `Instant`.
    pub(crate) access_seq: u64,
    /// Version tag of the dataset snapshot that produced the bytes.
    pub version: String,
    /// Reads served from this entry.
    pub hit_count: u64,
}

/// A registered dataset version grouping cache entries.
#[derive(Debug, Clone)]
pub struct TileVersion {
    /// Opaque version tag.
    pub tag: String,
    /// When the version was registered.
    pub created_at: Instant,
    /// Optional human-readable description.
    pub description: Option<String>,
    /// Caller-supplied fingerprint of the upstream dataset.
    pub source_hash: Option<String>,
    /// Live entries currently tagged with this version. Kept in lockstep
    /// with the entry table on every insert, replace, remove, and
    /// invalidation.
    pub tile_count: u64,
    /// Set when the version is removed by age-based expiry.
    pub expired: bool,
}

impl TileVersion {
    pub(crate) fn new(
        tag: impl Into<String>,
        description: Option<String>,
        source_hash: Option<String>,
    ) -> Self {
        Self {
            tag: tag.into(),
            created_at: Instant::now(),
            description,
            source_hash,
            tile_count: 0,
            expired: false,
        }
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Live entries.
    pub entry_count: usize,
    /// Sum of `size_bytes` over live entries.
    pub total_bytes: u64,
    /// `hits / (hits + entry_count)`. Not a true hit/miss ratio — misses
    /// are never counted — but preserved for compatibility with existing
    /// consumers of this figure.
    pub hit_rate: f64,
    /// Age of the least-recently-accessed entry, if any.
    pub oldest_access: Option<Duration>,
}
