//! Tier-order tests for TieredCache.
//!
//! Uses counting fakes for the shared tier and origin, and a ManualClock for
//! memory-tier expiry.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use certworker_core::{
    InMemorySharedCache, KeyMaterial, ManualClock, OriginFetcher, SharedCache, TieredCache,
    TtlStore, WorkerError, WorkerResult, LOADTEST_HOSTNAME,
};
use serde_json::json;

const HOST: &str = "issuer.example";

fn key(tag: &str) -> KeyMaterial {
    KeyMaterial::new(json!({"kty": "OKP", "crv": "Ed25519", "x": tag}))
}

#[derive(Debug)]
struct CountingOrigin {
    calls: AtomicUsize,
    fail: AtomicBool,
    key: KeyMaterial,
}

impl CountingOrigin {
    fn new(key: KeyMaterial) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            key,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OriginFetcher for CountingOrigin {
    async fn fetch_public_key(&self, hostname: &str) -> WorkerResult<KeyMaterial> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(WorkerError::Fetch {
                hostname: hostname.to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(self.key.clone())
    }
}

#[derive(Debug)]
struct CountingShared {
    inner: InMemorySharedCache,
    gets: AtomicUsize,
    sets: AtomicUsize,
}

impl CountingShared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemorySharedCache::new(Duration::from_secs(3600)),
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SharedCache for CountingShared {
    async fn get(&self, key: &str) -> WorkerResult<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> WorkerResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value, ttl).await
    }

    async fn contains(&self, key: &str) -> WorkerResult<bool> {
        self.inner.contains(key).await
    }
}

/// Shared tier whose every call fails.
#[derive(Debug)]
struct BrokenShared;

#[async_trait]
impl SharedCache for BrokenShared {
    async fn get(&self, _key: &str) -> WorkerResult<Option<Vec<u8>>> {
        Err(WorkerError::SharedCache {
            message: "connection reset".to_string(),
        })
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Option<Duration>) -> WorkerResult<()> {
        Err(WorkerError::SharedCache {
            message: "connection reset".to_string(),
        })
    }

    async fn contains(&self, _key: &str) -> WorkerResult<bool> {
        Ok(false)
    }
}

struct Fixture {
    cache: TieredCache,
    origin: Arc<CountingOrigin>,
    shared: Arc<CountingShared>,
    clock: ManualClock,
}

fn fixture() -> Fixture {
    let clock = ManualClock::default();
    let origin = CountingOrigin::new(key("origin"));
    let shared = CountingShared::new();
    let memory = TtlStore::with_clock(Duration::from_secs(600), Arc::new(clock.clone()));

    let cache = TieredCache::new(memory, Some(shared.clone()), origin.clone());
    Fixture {
        cache,
        origin,
        shared,
        clock,
    }
}

#[tokio::test]
async fn test_miss_everywhere_fetches_origin_once_and_fills_both_tiers() {
    let f = fixture();

    let fetched = f.cache.lookup(HOST).await.unwrap();

    assert_eq!(fetched, key("origin"));
    assert_eq!(f.origin.calls(), 1);
    assert!(f.cache.in_memory(HOST).await);
    let stored = f.shared.inner.get(HOST).await.unwrap().expect("shared tier filled");
    assert_eq!(KeyMaterial::from_slice(&stored).unwrap(), fetched);
}

#[tokio::test]
async fn test_memory_hit_consults_no_other_tier() {
    let f = fixture();
    f.cache.lookup(HOST).await.unwrap();
    let gets = f.shared.gets.load(Ordering::SeqCst);

    for _ in 0..3 {
        assert_eq!(f.cache.lookup(HOST).await.unwrap(), key("origin"));
    }

    assert_eq!(f.origin.calls(), 1);
    assert_eq!(f.shared.gets.load(Ordering::SeqCst), gets);
}

#[tokio::test]
async fn test_shared_hit_promotes_without_origin() {
    let f = fixture();
    f.shared
        .inner
        .set(HOST, &key("shared").to_bytes().unwrap(), None)
        .await
        .unwrap();

    let found = f.cache.lookup(HOST).await.unwrap();

    assert_eq!(found, key("shared"));
    assert_eq!(f.origin.calls(), 0);
    assert_eq!(f.shared.sets.load(Ordering::SeqCst), 0);
    assert!(f.cache.in_memory(HOST).await);

    // Served from memory now, even if the shared tier changes underneath.
    f.shared
        .inner
        .set(HOST, &key("newer").to_bytes().unwrap(), None)
        .await
        .unwrap();
    assert_eq!(f.cache.lookup(HOST).await.unwrap(), key("shared"));
}

#[tokio::test]
async fn test_memory_expiry_falls_through_to_shared() {
    let f = fixture();
    f.cache.lookup(HOST).await.unwrap();
    assert_eq!(f.origin.calls(), 1);

    f.clock.advance(chrono::Duration::seconds(600));
    assert!(!f.cache.in_memory(HOST).await);

    assert_eq!(f.cache.lookup(HOST).await.unwrap(), key("origin"));
    assert_eq!(f.origin.calls(), 1, "shared tier still holds the key");
    assert!(f.cache.in_memory(HOST).await);
}

#[tokio::test]
async fn test_failed_fetch_is_not_cached() {
    let f = fixture();
    f.origin.fail.store(true, Ordering::SeqCst);

    let err = f.cache.lookup(HOST).await.unwrap_err();
    assert!(matches!(err, WorkerError::Fetch { .. }));
    assert!(!f.cache.in_memory(HOST).await);
    assert_eq!(f.shared.inner.get(HOST).await.unwrap(), None);

    f.origin.fail.store(false, Ordering::SeqCst);
    assert_eq!(f.cache.lookup(HOST).await.unwrap(), key("origin"));
    assert_eq!(f.origin.calls(), 2, "second lookup retried the origin");
}

#[tokio::test]
async fn test_without_shared_tier() {
    let origin = CountingOrigin::new(key("origin"));
    let cache = TieredCache::new(TtlStore::new(Duration::from_secs(600)), None, origin.clone());
    assert!(!cache.has_shared_tier());

    cache.lookup(HOST).await.unwrap();
    cache.lookup(HOST).await.unwrap();
    assert_eq!(origin.calls(), 1);
}

#[tokio::test]
async fn test_without_memory_tier_reads_shared_each_time() {
    let origin = CountingOrigin::new(key("origin"));
    let shared = CountingShared::new();
    let cache = TieredCache::without_memory_tier(Some(shared.clone()), origin.clone());

    for _ in 0..3 {
        assert_eq!(cache.lookup(HOST).await.unwrap(), key("origin"));
    }

    assert_eq!(origin.calls(), 1, "shared tier answers after the first fetch");
    assert_eq!(shared.gets.load(Ordering::SeqCst), 3);
    assert!(!cache.in_memory(HOST).await);
}

#[tokio::test]
async fn test_broken_shared_tier_degrades_to_origin() {
    let origin = CountingOrigin::new(key("origin"));
    let cache = TieredCache::new(
        TtlStore::new(Duration::from_secs(600)),
        Some(Arc::new(BrokenShared)),
        origin.clone(),
    );

    assert_eq!(cache.lookup(HOST).await.unwrap(), key("origin"));
    assert_eq!(origin.calls(), 1);
    assert!(cache.in_memory(HOST).await);
}

#[tokio::test]
async fn test_corrupt_shared_entry_is_a_miss() {
    let f = fixture();
    f.shared.inner.set(HOST, b"\xff not json", None).await.unwrap();

    assert_eq!(f.cache.lookup(HOST).await.unwrap(), key("origin"));
    assert_eq!(f.origin.calls(), 1);
}

#[tokio::test]
async fn test_loadtest_entry_never_expires() {
    let clock = ManualClock::default();
    let origin = CountingOrigin::new(key("origin"));
    let memory = TtlStore::with_clock(Duration::from_secs(600), Arc::new(clock.clone()));
    let cache = TieredCache::new(memory, None, origin.clone()).with_loadtest_mode(true);

    let seeded = cache.lookup(LOADTEST_HOSTNAME).await.unwrap();
    clock.advance(chrono::Duration::days(3650));

    assert_eq!(cache.lookup(LOADTEST_HOSTNAME).await.unwrap(), seeded);
    assert_eq!(origin.calls(), 0);
}
