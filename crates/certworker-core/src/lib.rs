//! Crypto-verification job worker.
//!
//! Jobs arrive as opaque bytes of the form `<function_id>::<payload>`. The
//! worker decodes them against a per-function schema, runs the matching
//! handler and encodes a response. Handlers that need an issuer certificate
//! resolve it through a tiered cache:
//!
//! - memory tier: process-local [`TtlStore`] (default TTL 10 minutes)
//! - shared tier: optional networked cache shared by all workers
//! - origin: fetch of the issuer's support document
//!
//! # Quick Start
//!
//! ```no_run
//! use certworker_core::{Worker, WorkerConfig};
//!
//! # async fn example() -> certworker_core::WorkerResult<()> {
//! let worker = Worker::from_config(&WorkerConfig::from_env()).await?;
//!
//! let response = worker
//!     .handle(br#"derive_key::{"ikm":"0b0b","salt":"","info":"","length":16,"hash_algorithm":"sha256"}"#)
//!     .await?;
//! println!("{}", String::from_utf8_lossy(&response));
//! # Ok(())
//! # }
//! ```
//!
//! # Error boundary
//!
//! Only [`WorkerError::Verification`] is converted into a failure response
//! (`{"error_type": ..., "error": ...}`). Decode errors, unknown functions,
//! origin fetch failures and everything else are returned as `Err`.

pub mod certs;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod store;
pub mod worker;

// Re-export main types
pub use certs::{
    HttpOriginFetcher, InMemorySharedCache, OriginFetcher, RedisSharedCache, SharedCache,
    TieredCache, DEFAULT_MEMORY_TTL, LOADTEST_HOSTNAME,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::WorkerConfig;
pub use crypto::{CryptoPrimitives, HashAlgorithm, KeyMaterial, RustCrypto, SignatureAlgorithm};
pub use dispatch::{Dispatcher, Function};
pub use envelope::{
    BuiltinSchemas, FunctionSchema, JobEnvelope, RequestFields, Response, SchemaRegistry,
};
pub use error::{WorkerError, WorkerResult, VERIFICATION_ERROR_TYPE};
pub use handlers::Handlers;
pub use store::{CacheEntry, StoreError, TtlStore, NEVER_EXPIRES};
pub use worker::Worker;
