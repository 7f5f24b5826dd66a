//! Tiered certificate cache.
//!
//! Lookups go memory tier → shared tier (optional) → origin. A hit in a slower
//! tier is promoted into the faster ones. Failed origin fetches leave no trace,
//! so the next lookup goes back to the origin.
//!
//! Concurrent lookups for the same hostname are single-flighted: one caller
//! walks the slow tiers and every caller that joined the flight receives its
//! outcome, success or failure. A flight ends with its result; the next lookup
//! starts a new one.

mod loadtest;
mod origin;
mod shared;

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::crypto::KeyMaterial;
use crate::error::WorkerResult;
use crate::store::{TtlStore, NEVER_EXPIRES};

pub use loadtest::{loadtest_key_material, loadtest_signing_key, LOADTEST_HOSTNAME, LOADTEST_SEED};
pub use origin::{HttpOriginFetcher, OriginFetcher, SUPPORT_DOCUMENT_PATH};
pub use shared::{InMemorySharedCache, RedisSharedCache, SharedCache};

/// Default memory-tier TTL (10 minutes).
pub const DEFAULT_MEMORY_TTL: Duration = Duration::from_secs(10 * 60);

/// Outcome of one slow-path walk, shared by everyone who joined it.
type Flight = Arc<OnceCell<WorkerResult<KeyMaterial>>>;

type FlightMap = StdMutex<HashMap<String, Flight>>;

/// Certificate cache keyed by issuer hostname.
#[derive(Debug)]
pub struct TieredCache {
    memory: Option<Mutex<TtlStore<String, KeyMaterial>>>,
    shared: Option<Arc<dyn SharedCache>>,
    origin: Arc<dyn OriginFetcher>,
    in_flight: FlightMap,
}

impl TieredCache {
    /// Create a cache over the given tiers. The memory tier is owned; the
    /// shared tier and origin are shared capabilities.
    pub fn new(
        memory: TtlStore<String, KeyMaterial>,
        shared: Option<Arc<dyn SharedCache>>,
        origin: Arc<dyn OriginFetcher>,
    ) -> Self {
        Self {
            memory: Some(Mutex::new(memory)),
            shared,
            origin,
            in_flight: StdMutex::new(HashMap::new()),
        }
    }

    /// Create a cache with no memory tier. Every lookup consults the shared
    /// tier (if any) and then the origin.
    pub fn without_memory_tier(
        shared: Option<Arc<dyn SharedCache>>,
        origin: Arc<dyn OriginFetcher>,
    ) -> Self {
        Self {
            memory: None,
            shared,
            origin,
            in_flight: StdMutex::new(HashMap::new()),
        }
    }

    /// Pre-seed the load-test certificate with a TTL of zero.
    ///
    /// Needs a memory tier; without one the seed is skipped with a warning.
    pub fn with_loadtest_mode(mut self, enabled: bool) -> Self {
        if !enabled {
            return self;
        }
        match self.memory.as_mut() {
            Some(memory) => {
                memory.get_mut().set_with_ttl(
                    LOADTEST_HOSTNAME.to_string(),
                    loadtest_key_material(),
                    NEVER_EXPIRES,
                );
                info!(hostname = LOADTEST_HOSTNAME, "load-test certificate seeded");
            }
            None => warn!(
                hostname = LOADTEST_HOSTNAME,
                "load-test mode needs a memory tier, certificate not seeded"
            ),
        }
        self
    }

    pub fn has_memory_tier(&self) -> bool {
        self.memory.is_some()
    }

    pub fn has_shared_tier(&self) -> bool {
        self.shared.is_some()
    }

    /// Whether the memory tier currently holds a live entry for `hostname`.
    pub async fn in_memory(&self, hostname: &str) -> bool {
        match &self.memory {
            Some(memory) => memory.lock().await.contains(hostname),
            None => false,
        }
    }

    /// Resolve the public key for `hostname`.
    pub async fn lookup(&self, hostname: &str) -> WorkerResult<KeyMaterial> {
        if let Some(key) = self.memory_get(hostname).await {
            debug!(hostname, tier = "memory", "certificate cache hit");
            return Ok(key);
        }

        let passenger = self.join_flight(hostname);
        passenger
            .flight
            .get_or_init(|| self.lookup_slow(hostname))
            .await
            .clone()
    }

    async fn lookup_slow(&self, hostname: &str) -> WorkerResult<KeyMaterial> {
        // An earlier flight may have filled the memory tier since our first check.
        if let Some(key) = self.memory_get(hostname).await {
            debug!(hostname, tier = "memory", "certificate filled by concurrent lookup");
            return Ok(key);
        }

        if let Some(key) = self.shared_get(hostname).await {
            debug!(hostname, tier = "shared", "certificate cache hit, promoting");
            self.memory_set(hostname, &key).await;
            return Ok(key);
        }

        info!(hostname, "fetching certificate from origin");
        let key = self.origin.fetch_public_key(hostname).await?;

        self.shared_set(hostname, &key).await;
        self.memory_set(hostname, &key).await;

        Ok(key)
    }

    async fn memory_get(&self, hostname: &str) -> Option<KeyMaterial> {
        let mut memory = self.memory.as_ref()?.lock().await;
        memory.get(hostname).ok().cloned()
    }

    async fn memory_set(&self, hostname: &str, key: &KeyMaterial) {
        if let Some(memory) = &self.memory {
            memory.lock().await.set(hostname.to_string(), key.clone());
        }
    }

    /// Shared-tier read; I/O failures and corrupt values count as a miss.
    async fn shared_get(&self, hostname: &str) -> Option<KeyMaterial> {
        let shared = self.shared.as_ref()?;

        match shared.get(hostname).await {
            Ok(Some(bytes)) => match KeyMaterial::from_slice(&bytes) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(hostname, tier = "shared", error = %e, "ignoring corrupt shared cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(hostname, tier = "shared", error = %e, "shared cache read failed");
                None
            }
        }
    }

    /// Shared-tier write after an origin fetch; failures are logged only.
    async fn shared_set(&self, hostname: &str, key: &KeyMaterial) {
        let Some(shared) = self.shared.as_ref() else {
            return;
        };

        let written = match key.to_bytes() {
            Ok(bytes) => shared.set(hostname, &bytes, None).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(hostname, tier = "shared", error = %e, "shared cache write failed");
        }
    }

    /// Join the flight in progress for `hostname`, or start a new one.
    fn join_flight(&self, hostname: &str) -> Passenger<'_> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let flight = match in_flight.get(hostname) {
            Some(flight) if !flight.initialized() => flight.clone(),
            _ => {
                let flight = Flight::default();
                in_flight.insert(hostname.to_string(), flight.clone());
                flight
            }
        };

        Passenger {
            in_flight: &self.in_flight,
            hostname: hostname.to_string(),
            flight,
        }
    }
}

/// A caller's seat on a flight. Dropping it, whether the lookup finished or
/// its future was cancelled, removes the flight once it has landed or once
/// nobody else is aboard.
struct Passenger<'a> {
    in_flight: &'a FlightMap,
    hostname: String,
    flight: Flight,
}

impl Drop for Passenger<'_> {
    fn drop(&mut self) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(current) = in_flight.get(&self.hostname) else {
            return;
        };
        if !Arc::ptr_eq(current, &self.flight) {
            return;
        }
        // One reference in the map plus ours: nobody else is waiting.
        if self.flight.initialized() || Arc::strong_count(&self.flight) <= 2 {
            in_flight.remove(&self.hostname);
        }
    }
}
