//! Worker façade: raw job bytes in, response bytes out.

use std::sync::Arc;

use tracing::{debug, info};

use crate::certs::{HttpOriginFetcher, OriginFetcher, RedisSharedCache, SharedCache, TieredCache};
use crate::config::WorkerConfig;
use crate::crypto::{CryptoPrimitives, RustCrypto};
use crate::dispatch::Dispatcher;
use crate::envelope::BuiltinSchemas;
use crate::error::{WorkerError, WorkerResult};
use crate::handlers::Handlers;
use crate::store::TtlStore;

/// One worker: a dispatcher with its handlers and certificate cache.
///
/// Build it once at process start and hand it to the job loop.
#[derive(Debug)]
pub struct Worker {
    dispatcher: Dispatcher,
}

impl Worker {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Build a worker from configuration, connecting to the shared tier if one is set.
    pub async fn from_config(config: &WorkerConfig) -> WorkerResult<Self> {
        config.validate()?;

        let shared: Option<Arc<dyn SharedCache>> = match &config.memcache_host {
            Some(host) => {
                let ttl = config.memcache_ttl().ok_or_else(|| WorkerError::Config {
                    message: "memcache_ttl is required when memcache_host is set".to_string(),
                })?;
                Some(Arc::new(RedisSharedCache::connect(host, ttl).await?))
            }
            None => None,
        };

        let origin = Arc::new(HttpOriginFetcher::with_scheme(
            &config.fetch_scheme,
            config.fetch_timeout(),
        )?);

        Self::from_parts(config, shared, origin, Arc::new(RustCrypto))
    }

    /// Build a worker around already-constructed capabilities.
    pub fn from_parts(
        config: &WorkerConfig,
        shared: Option<Arc<dyn SharedCache>>,
        origin: Arc<dyn OriginFetcher>,
        crypto: Arc<dyn CryptoPrimitives>,
    ) -> WorkerResult<Self> {
        config.validate()?;
        info!(
            memory_ttl = config.memory_ttl,
            memory_tier = config.memory_cache,
            shared_tier = shared.is_some(),
            loadtest_mode = config.loadtest_mode,
            "starting a crypto worker"
        );

        let certs = if config.memory_cache {
            TieredCache::new(TtlStore::new(config.memory_ttl()), shared, origin)
        } else {
            TieredCache::without_memory_tier(shared, origin)
        };
        let certs = certs.with_loadtest_mode(config.loadtest_mode);
        let handlers = Handlers::new(certs, crypto);
        let dispatcher = Dispatcher::new(handlers, Arc::new(BuiltinSchemas::new()?))?;

        Ok(Self::new(dispatcher))
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Decode, dispatch and encode one job.
    ///
    /// Domain errors come back as an encoded failure response; every other
    /// error is returned as `Err` for the supervisor to handle.
    pub async fn handle(&self, raw: &[u8]) -> WorkerResult<Vec<u8>> {
        let fields = self.dispatcher.decode(raw)?;
        let function_id = fields.function_id().to_string();
        debug!(function_id = %function_id, bytes = raw.len(), "worker called");

        let response = self.dispatcher.dispatch(&function_id, &fields).await?;
        self.dispatcher.encode(&function_id, &response)
    }
}
