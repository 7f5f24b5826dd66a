//! Crypto operation handlers.
//!
//! Each handler takes already-decoded arguments and delegates the math to
//! [`CryptoPrimitives`]. Errors come back as [`WorkerError`]; the dispatcher
//! decides which of them become structured responses.

use std::sync::Arc;

use crate::certs::TieredCache;
use crate::crypto::{CryptoPrimitives, HashAlgorithm, KeyMaterial};
use crate::error::{WorkerError, WorkerResult};

/// The handler set of a worker.
#[derive(Debug)]
pub struct Handlers {
    certs: TieredCache,
    crypto: Arc<dyn CryptoPrimitives>,
}

impl Handlers {
    pub fn new(certs: TieredCache, crypto: Arc<dyn CryptoPrimitives>) -> Self {
        Self { certs, crypto }
    }

    pub fn certs(&self) -> &TieredCache {
        &self.certs
    }

    /// Verify a signature with the issuer certificate of `hostname`.
    pub async fn check_signature(
        &self,
        hostname: &str,
        signed_data: &[u8],
        signature: &[u8],
        algorithm: &str,
    ) -> WorkerResult<bool> {
        let key = self.certs.lookup(hostname).await?;
        self.crypto.verify(algorithm, &key, signed_data, signature)
    }

    /// Verify a signature with a certificate supplied by the caller.
    pub fn check_signature_with_cert(
        &self,
        cert: &KeyMaterial,
        signed_data: &[u8],
        signature: &[u8],
        algorithm: &str,
    ) -> WorkerResult<bool> {
        self.crypto.verify(algorithm, cert, signed_data, signature)
    }

    /// HKDF with hex-encoded inputs and output.
    pub fn derive_key(
        &self,
        ikm: &str,
        salt: &str,
        info: &str,
        length: u64,
        hash_algorithm: HashAlgorithm,
    ) -> WorkerResult<String> {
        let ikm = decode_hex("ikm", ikm)?;
        let salt = decode_hex("salt", salt)?;
        let info = decode_hex("info", info)?;
        let length = usize::try_from(length)
            .map_err(|_| WorkerError::invalid_argument("length", "does not fit in memory"))?;

        let okm = self.crypto.derive(&ikm, &salt, &info, length, hash_algorithm)?;
        Ok(hex::encode(okm))
    }

    /// Always fails. Used to exercise the failure path end to end.
    pub fn error(&self, message: &str) -> WorkerResult<serde_json::Value> {
        Err(WorkerError::Handler {
            message: message.to_string(),
        })
    }
}

fn decode_hex(field: &str, value: &str) -> WorkerResult<Vec<u8>> {
    hex::decode(value).map_err(|e| WorkerError::invalid_argument(field, e.to_string()))
}
