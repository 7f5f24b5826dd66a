//! Signature verification and key derivation primitives.
//!
//! Handlers only see the [`CryptoPrimitives`] trait. Failures to interpret a
//! key or algorithm are reported as [`WorkerError::Verification`]; a signature
//! that simply does not match is `Ok(false)`.

mod hkdf;
mod keys;

use std::fmt::Debug;

use ed25519_dalek::Verifier as _;
use rsa::pkcs1v15;
use rsa::signature::Verifier as _;
use sha2::{Sha256, Sha384, Sha512};

use crate::error::{WorkerError, WorkerResult};

pub use keys::{HashAlgorithm, KeyMaterial, PublicKey, SignatureAlgorithm};

/// Crypto capability used by the handlers.
pub trait CryptoPrimitives: Send + Sync + Debug {
    /// Verify `signature` over `signed_data` with the given key.
    fn verify(
        &self,
        algorithm: &str,
        key: &KeyMaterial,
        signed_data: &[u8],
        signature: &[u8],
    ) -> WorkerResult<bool>;

    /// Derive `length` bytes with HKDF.
    fn derive(
        &self,
        ikm: &[u8],
        salt: &[u8],
        info: &[u8],
        length: usize,
        hash: HashAlgorithm,
    ) -> WorkerResult<Vec<u8>>;
}

/// Default primitives backed by the RustCrypto crates.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustCrypto;

impl CryptoPrimitives for RustCrypto {
    fn verify(
        &self,
        algorithm: &str,
        key: &KeyMaterial,
        signed_data: &[u8],
        signature: &[u8],
    ) -> WorkerResult<bool> {
        let algorithm: SignatureAlgorithm = algorithm.parse()?;
        let key = key.to_public_key()?;

        match (algorithm, key) {
            (SignatureAlgorithm::EdDsa, PublicKey::Ed25519(key)) => {
                let Ok(signature) = ed25519_dalek::Signature::from_slice(signature) else {
                    return Ok(false);
                };
                Ok(key.verify(signed_data, &signature).is_ok())
            }
            (SignatureAlgorithm::Rs256, PublicKey::Rsa(key)) => {
                Ok(verify_pkcs1v15(pkcs1v15::VerifyingKey::<Sha256>::new(key), signed_data, signature))
            }
            (SignatureAlgorithm::Rs384, PublicKey::Rsa(key)) => {
                Ok(verify_pkcs1v15(pkcs1v15::VerifyingKey::<Sha384>::new(key), signed_data, signature))
            }
            (SignatureAlgorithm::Rs512, PublicKey::Rsa(key)) => {
                Ok(verify_pkcs1v15(pkcs1v15::VerifyingKey::<Sha512>::new(key), signed_data, signature))
            }
            (algorithm, key) => Err(WorkerError::verification(format!(
                "algorithm {} does not match {} key",
                algorithm,
                match key {
                    PublicKey::Rsa(_) => "RSA",
                    PublicKey::Ed25519(_) => "Ed25519",
                }
            ))),
        }
    }

    fn derive(
        &self,
        ikm: &[u8],
        salt: &[u8],
        info: &[u8],
        length: usize,
        hash: HashAlgorithm,
    ) -> WorkerResult<Vec<u8>> {
        hkdf::derive(ikm, salt, info, length, hash)
    }
}

fn verify_pkcs1v15<D>(key: pkcs1v15::VerifyingKey<D>, signed_data: &[u8], signature: &[u8]) -> bool
where
    D: sha2::Digest,
    pkcs1v15::VerifyingKey<D>: rsa::signature::Verifier<pkcs1v15::Signature>,
{
    match pkcs1v15::Signature::try_from(signature) {
        Ok(signature) => key.verify(signed_data, &signature).is_ok(),
        Err(_) => false,
    }
}
