//! Versioned tile cache with LRU eviction.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::coord::TileCoord;

use super::types::{CacheConfig, CacheEntry, CacheStats, TileVersion};

/// Interior state guarded by a single mutex.
///
/// Reads are not idempotent (an LRU touch mutates `last_access`), so all
/// operations go through one lock rather than per-entry locking.
#[derive(Debug, Default)]
struct CacheState {
    /// Live entries keyed by the canonical `"{z}/{x}/{y}"` string.
    entries: HashMap<String, CacheEntry>,
    /// Registered versions keyed by tag.
    versions: HashMap<String, TileVersion>,
    /// Monotonic counter stamped on every insert and read.
    access_seq: u64,
    /// Reads served from the cache since construction.
    total_hits: u64,
    /// Running sum of `size_bytes` over live entries.
    total_bytes: u64,
}

impl CacheState {
    fn next_seq(&mut self) -> u64 {
        self.access_seq += 1;
        self.access_seq
    }

    /// Register `tag` if the caller never did. Keeps the tile-count
    /// invariant intact for entries inserted under an unseen tag.
    fn ensure_version(&mut self, tag: &str) {
        if !self.versions.contains_key(tag) {
            self.versions
                .insert(tag.to_string(), TileVersion::new(tag, None, None));
        }
    }

    fn bump_version_count(&mut self, tag: &str, delta: i64) {
        if let Some(version) = self.versions.get_mut(tag) {
            if delta >= 0 {
                version.tile_count += delta as u64;
            } else {
                version.tile_count = version.tile_count.saturating_sub((-delta) as u64);
            }
        }
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.total_bytes -= entry.size_bytes;
        let tag = entry.version.clone();
        self.bump_version_count(&tag, -1);
        Some(entry)
    }

    /// Evict the `count` least-recently-accessed entries.
    ///
    /// Ordering is by access sequence, which is strictly increasing, so
    /// eviction is deterministic even for same-instant accesses.
    fn evict_lru(&mut self, count: usize) {
        let mut order: Vec<(u64, String)> = self
            .entries
            .values()
            .map(|e| (e.access_seq, e.key.clone()))
            .collect();
        order.sort_unstable();

        for (_, key) in order.into_iter().take(count) {
            self.remove_entry(&key);
        }
    }
}

/// Bounded mapping from tile coordinate to cached-tile metadata, grouped
/// by an opaque version tag.
///
/// Supports LRU eviction at the entry limit, per-version bulk
/// invalidation, and age-based version expiry. No operation errors:
/// "not found" is an `Option`/`bool`, never a failure.
///
/// Invariants upheld across every operation:
/// - live entry count never exceeds `max_entries`;
/// - at most one live entry per coordinate;
/// - each version's `tile_count` equals its live-entry count.
pub struct VersionedTileCache {
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl VersionedTileCache {
    /// Create an empty cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Register a dataset version.
    ///
    /// Re-registering an existing tag overwrites it (last-writer-wins);
    /// callers that still have entries under the old registration are
    /// expected to invalidate them first. Returns a copy of the stored
    /// record.
    pub fn create_version(
        &self,
        tag: impl Into<String>,
        description: Option<String>,
        source_hash: Option<String>,
    ) -> TileVersion {
        let tag = tag.into();
        let version = TileVersion::new(tag.clone(), description, source_hash);
        let mut state = self.state.lock();
        state.versions.insert(tag, version.clone());
        version
    }

    /// Insert or replace the entry for `coord`.
    ///
    /// Replacing an existing coordinate keeps the entry count unchanged
    /// and moves the tile between version counts. A fresh insert at
    /// capacity evicts least-recently-accessed entries first when LRU is
    /// enabled, and is dropped otherwise.
    pub fn put(
        &self,
        coord: TileCoord,
        locator: impl Into<String>,
        size_bytes: u64,
        version: impl Into<String>,
    ) {
        let key = coord.cache_key();
        let version = version.into();
        let mut state = self.state.lock();
        state.ensure_version(&version);

        if state.entries.contains_key(&key) {
            state.remove_entry(&key);
        } else if state.entries.len() >= self.config.max_entries {
            if !self.config.enable_lru {
                debug!(key = %key, "cache full and LRU disabled, dropping insert");
                return;
            }
            let excess = state.entries.len() + 1 - self.config.max_entries;
            debug!(key = %key, evicting = excess, "cache full, evicting LRU entries");
            state.evict_lru(excess);
        }

        let seq = state.next_seq();
        let entry = CacheEntry {
            coord,
            key: key.clone(),
            locator: locator.into(),
            size_bytes,
            last_access: Instant::now(),
            access_seq: seq,
            version: version.clone(),
            hit_count: 0,
        };
        state.total_bytes += size_bytes;
        state.entries.insert(key, entry);
        state.bump_version_count(&version, 1);
    }

    /// Look up the entry for `coord`.
    ///
    /// A hit refreshes the entry's access time and hit count and returns
    /// its `(locator, version)` pair.
    pub fn get(&self, coord: &TileCoord) -> Option<(String, String)> {
        let key = coord.cache_key();
        let mut state = self.state.lock();
        let seq = state.next_seq();
        let entry = state.entries.get_mut(&key)?;
        entry.last_access = Instant::now();
        entry.access_seq = seq;
        entry.hit_count += 1;
        let result = (entry.locator.clone(), entry.version.clone());
        state.total_hits += 1;
        Some(result)
    }

    /// Whether a live entry exists for `coord`. Does not refresh LRU state.
    pub fn contains(&self, coord: &TileCoord) -> bool {
        self.state.lock().entries.contains_key(&coord.cache_key())
    }

    /// Remove the entry for `coord`, if any.
    pub fn remove(&self, coord: &TileCoord) -> bool {
        self.state
            .lock()
            .remove_entry(&coord.cache_key())
            .is_some()
    }

    /// Remove every entry tagged with `tag`.
    ///
    /// Returns the number of entries removed. The version record stays
    /// registered with `tile_count` zeroed.
    pub fn invalidate_version(&self, tag: &str) -> usize {
        let mut state = self.state.lock();
        let keys: Vec<String> = state
            .entries
            .values()
            .filter(|e| e.version == tag)
            .map(|e| e.key.clone())
            .collect();

        for key in &keys {
            state.remove_entry(key);
        }
        if let Some(version) = state.versions.get_mut(tag) {
            version.tile_count = 0;
        }

        debug!(tag, removed = keys.len(), "invalidated version");
        keys.len()
    }

    /// Remove every version registered longer ago than `max_age`,
    /// cascading to [`invalidate_version`](Self::invalidate_version) for
    /// each. Removed version records are marked expired and dropped.
    ///
    /// Returns the number of versions removed.
    pub fn expire_versions_older_than(&self, max_age: Duration) -> usize {
        let stale: Vec<String> = {
            let state = self.state.lock();
            state
                .versions
                .values()
                .filter(|v| v.created_at.elapsed() > max_age)
                .map(|v| v.tag.clone())
                .collect()
        };

        for tag in &stale {
            self.invalidate_version(tag);
            let mut state = self.state.lock();
            if let Some(mut version) = state.versions.remove(tag) {
                version.expired = true;
                debug!(tag = %tag, "expired version");
            }
        }
        stale.len()
    }

    /// A copy of the version record for `tag`, if registered.
    pub fn version(&self, tag: &str) -> Option<TileVersion> {
        self.state.lock().versions.get(tag).cloned()
    }

    /// Current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let entry_count = state.entries.len();
        let denominator = state.total_hits + entry_count as u64;
        let hit_rate = if denominator == 0 {
            0.0
        } else {
            state.total_hits as f64 / denominator as f64
        };
        let oldest_access = state
            .entries
            .values()
            .map(|e| e.last_access)
            .min()
            .map(|instant| instant.elapsed());

        CacheStats {
            entry_count,
            total_bytes: state.total_bytes,
            hit_rate,
            oldest_access,
        }
    }
}
