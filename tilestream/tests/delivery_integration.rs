//! Integration tests for the tile delivery pipeline.
//!
//! These tests verify the complete consumer flow across the scheduler
//! and the versioned cache:
//! - Cache-aside: get-miss → scheduled fetch → put → get-hit
//! - Version invalidation forcing a refetch
//! - Viewport-change cancellation of no-longer-needed tiles
//! - Failure surfacing alongside metrics
//!
//! Run with: `cargo test --test delivery_integration`

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use tilestream::cache::{CacheConfig, VersionedTileCache};
use tilestream::coord::TileCoord;
use tilestream::scheduler::{
    FetchError, Priority, SchedulerConfig, SchedulerError, TileRequest, TileScheduler,
};

// ============================================================================
// Test Helpers
// ============================================================================

/// In-memory tile source standing in for the network fetch delegate.
///
/// Tracks invocations so tests can assert how often real fetch work ran.
struct FakeTileSource {
    tiles: Mutex<HashMap<String, Bytes>>,
    fetches: AtomicU32,
}

impl FakeTileSource {
    fn new() -> Self {
        Self {
            tiles: Mutex::new(HashMap::new()),
            fetches: AtomicU32::new(0),
        }
    }

    fn insert(&self, coord: TileCoord, data: &'static [u8]) {
        self.tiles.lock().insert(coord.cache_key(), Bytes::from_static(data));
    }

    async fn fetch(&self, coord: TileCoord) -> Result<Bytes, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.tiles
            .lock()
            .get(&coord.cache_key())
            .cloned()
            .ok_or_else(|| FetchError::Network(format!("no tile at {coord}")))
    }

    fn fetch_count(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

fn fast_config() -> SchedulerConfig {
    SchedulerConfig::default()
        .with_retry_delay_base(Duration::from_millis(1))
        .with_retry_delay_max(Duration::from_millis(5))
        .with_request_timeout(Duration::from_millis(500))
}

/// The consumer side of the cache-aside pattern: check the cache, fetch
/// on miss, populate on success.
async fn get_or_fetch(
    scheduler: &TileScheduler,
    cache: &VersionedTileCache,
    source: &Arc<FakeTileSource>,
    coord: TileCoord,
    version: &str,
) -> Result<String, SchedulerError> {
    if let Some((locator, _version)) = cache.get(&coord) {
        return Ok(locator);
    }

    let source_ref = Arc::clone(source);
    let data = scheduler
        .request(
            TileRequest::new(coord, "fake").with_priority(Priority::ON_DEMAND),
            move |coord| {
                let source = Arc::clone(&source_ref);
                async move { source.fetch(coord).await }
            },
        )
        .await?;

    let locator = format!("store/{}", coord.cache_key());
    cache.put(coord, locator.clone(), data.len() as u64, version);
    Ok(locator)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_cache_aside_miss_then_hit() {
    let scheduler = TileScheduler::new(fast_config());
    let cache = VersionedTileCache::new(CacheConfig::default());
    cache.create_version("v1", Some("first snapshot".into()), None);

    let source = Arc::new(FakeTileSource::new());
    let coord = TileCoord::new(8192, 5461, 14);
    source.insert(coord, b"satellite pixels");

    // Miss populates the cache through the scheduler.
    let locator = get_or_fetch(&scheduler, &cache, &source, coord, "v1")
        .await
        .expect("tile available");
    assert_eq!(locator, "store/14/8192/5461");
    assert_eq!(source.fetch_count(), 1);

    // Hit short-circuits: no second fetch.
    let locator = get_or_fetch(&scheduler, &cache, &source, coord, "v1")
        .await
        .expect("cache hit");
    assert_eq!(locator, "store/14/8192/5461");
    assert_eq!(source.fetch_count(), 1);

    let stats = cache.stats();
    assert_eq!(stats.entry_count, 1);
    assert_eq!(stats.total_bytes, 16);
    assert_eq!(scheduler.stats().load.succeeded, 1);
}

#[tokio::test]
async fn test_version_invalidation_forces_refetch() {
    let scheduler = TileScheduler::new(fast_config());
    let cache = VersionedTileCache::new(CacheConfig::default());

    let source = Arc::new(FakeTileSource::new());
    let coord = TileCoord::new(1, 2, 10);
    source.insert(coord, b"old imagery");

    get_or_fetch(&scheduler, &cache, &source, coord, "2026-07")
        .await
        .expect("initial fetch");
    assert_eq!(source.fetch_count(), 1);

    // Upstream dataset rolled over; drop everything from the old version.
    let removed = cache.invalidate_version("2026-07");
    assert_eq!(removed, 1);
    assert!(!cache.contains(&coord));

    get_or_fetch(&scheduler, &cache, &source, coord, "2026-08")
        .await
        .expect("refetch under new version");
    assert_eq!(source.fetch_count(), 2);

    let (_, version) = cache.get(&coord).expect("repopulated");
    assert_eq!(version, "2026-08");
}

#[tokio::test]
async fn test_viewport_change_cancels_stale_tiles() {
    let scheduler = Arc::new(TileScheduler::new(fast_config().with_max_concurrent(1)));

    // Slow source: every tile takes far longer than the test runs.
    let mut handles = Vec::new();
    let mut ids = Vec::new();
    for x in 0..4 {
        let coord = TileCoord::new(x, 0, 12);
        let request = TileRequest::new(coord, "slow");
        ids.push(request.id.clone());

        let scheduler = Arc::clone(&scheduler);
        handles.push(tokio::spawn(async move {
            scheduler
                .request(request, |_| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(Bytes::from_static(b"never arrives"))
                })
                .await
        }));
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    // The viewport moved on; none of these tiles are needed anymore.
    let cancelled = scheduler.cancel_batch(&ids);
    assert_eq!(cancelled, 4);

    for handle in handles {
        let outcome = handle.await.expect("task ok");
        assert!(matches!(outcome, Err(SchedulerError::Cancelled(_))));
    }
    assert_eq!(scheduler.stats().load.cancelled, 4);
    assert_eq!(scheduler.stats().active, 0);
}

#[tokio::test]
async fn test_missing_tile_fails_after_retries() {
    let scheduler = TileScheduler::new(fast_config().with_max_retries(2));
    let cache = VersionedTileCache::new(CacheConfig::default());
    let source = Arc::new(FakeTileSource::new());

    // Nothing inserted for this coordinate; every attempt fails.
    let coord = TileCoord::new(9, 9, 9);
    let result = get_or_fetch(&scheduler, &cache, &source, coord, "v1").await;

    assert_eq!(source.fetch_count(), 3);
    assert!(matches!(
        result,
        Err(SchedulerError::RetriesExhausted { attempts: 3, .. })
    ));
    assert!(!cache.contains(&coord));
    assert_eq!(scheduler.stats().load.failed, 1);
}

#[tokio::test]
async fn test_shared_metrics_across_components() {
    use tilestream::metrics::LoadMetrics;

    let metrics = Arc::new(LoadMetrics::new());
    let scheduler = TileScheduler::with_metrics(fast_config(), Arc::clone(&metrics));

    let source = Arc::new(FakeTileSource::new());
    let coord = TileCoord::new(3, 3, 3);
    source.insert(coord, b"t");

    let cache = VersionedTileCache::new(CacheConfig::default());
    get_or_fetch(&scheduler, &cache, &source, coord, "v1")
        .await
        .expect("fetch ok");

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.total, 1);
    assert_eq!(snapshot.succeeded, 1);
}
