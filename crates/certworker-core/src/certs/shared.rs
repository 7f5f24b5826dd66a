//! Shared cache tier reachable by every worker instance.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::WorkerResult;
use crate::store::TtlStore;

/// Networked key/value cache shared across workers.
///
/// Consistency is whatever the backend offers; last write wins on a key.
#[async_trait]
pub trait SharedCache: Send + Sync + Debug {
    /// Fetch a value, `None` on miss.
    async fn get(&self, key: &str) -> WorkerResult<Option<Vec<u8>>>;

    /// Store a value. `None` uses the client's configured default TTL; zero never expires.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> WorkerResult<()>;

    async fn contains(&self, key: &str) -> WorkerResult<bool>;
}

/// Redis-protocol shared cache.
#[derive(Clone)]
pub struct RedisSharedCache {
    connection: ConnectionManager,
    address: String,
    default_ttl: Duration,
}

impl Debug for RedisSharedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSharedCache")
            .field("address", &self.address)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl RedisSharedCache {
    /// Connect to `address` (`redis://host:port` or bare `host:port`).
    pub async fn connect(address: &str, default_ttl: Duration) -> WorkerResult<Self> {
        let address = normalize_address(address);
        let client = redis::Client::open(address.as_str())?;
        let connection = ConnectionManager::new(client).await?;
        debug!(address = %address, "connected to shared cache");

        Ok(Self {
            connection,
            address,
            default_ttl,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl SharedCache for RedisSharedCache {
    async fn get(&self, key: &str) -> WorkerResult<Option<Vec<u8>>> {
        let mut conn = self.connection.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> WorkerResult<()> {
        let mut conn = self.connection.clone();
        let ttl = ttl.unwrap_or(self.default_ttl);
        if ttl.is_zero() {
            conn.set::<_, _, ()>(key, value).await?;
        } else {
            // Round sub-second TTLs up so they do not turn into "never expires".
            let seconds = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
            conn.set_ex::<_, _, ()>(key, value, seconds).await?;
        }
        Ok(())
    }

    async fn contains(&self, key: &str) -> WorkerResult<bool> {
        let mut conn = self.connection.clone();
        Ok(conn.exists(key).await?)
    }
}

fn normalize_address(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("redis://{}", address)
    }
}

/// Process-local stand-in for the shared tier.
///
/// Useful for single-host deployments and tests; clones share the same data.
#[derive(Debug, Clone)]
pub struct InMemorySharedCache {
    entries: Arc<Mutex<TtlStore<String, Vec<u8>>>>,
}

impl InMemorySharedCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_clock(default_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(TtlStore::with_clock(default_ttl, clock))),
        }
    }
}

#[async_trait]
impl SharedCache for InMemorySharedCache {
    async fn get(&self, key: &str) -> WorkerResult<Option<Vec<u8>>> {
        let mut entries = self.entries.lock().await;
        Ok(entries.get(key).ok().cloned())
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> WorkerResult<()> {
        let mut entries = self.entries.lock().await;
        match ttl {
            Some(ttl) => entries.set_with_ttl(key.to_string(), value.to_vec(), ttl),
            None => entries.set(key.to_string(), value.to_vec()),
        }
        Ok(())
    }

    async fn contains(&self, key: &str) -> WorkerResult<bool> {
        Ok(self.entries.lock().await.contains(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("cache:6379"), "redis://cache:6379");
        assert_eq!(normalize_address("redis://cache:6379/2"), "redis://cache:6379/2");
        assert_eq!(normalize_address("rediss://cache"), "rediss://cache");
    }

    #[tokio::test]
    async fn test_in_memory_default_ttl() {
        let clock = ManualClock::default();
        let cache = InMemorySharedCache::with_clock(Duration::from_secs(30), Arc::new(clock.clone()));

        cache.set("host", b"key", None).await.unwrap();
        cache
            .set("pinned", b"key", Some(Duration::ZERO))
            .await
            .unwrap();
        assert!(cache.contains("host").await.unwrap());

        clock.advance(chrono::Duration::seconds(30));
        assert_eq!(cache.get("host").await.unwrap(), None);
        assert_eq!(cache.get("pinned").await.unwrap(), Some(b"key".to_vec()));
    }

    #[tokio::test]
    async fn test_in_memory_clones_share_entries() {
        let cache = InMemorySharedCache::new(Duration::from_secs(60));
        let other = cache.clone();

        cache.set("host", b"v", None).await.unwrap();
        assert_eq!(other.get("host").await.unwrap(), Some(b"v".to_vec()));
        assert!(!other.contains("missing").await.unwrap());
    }
}
