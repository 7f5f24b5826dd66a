//! Public-key material and algorithm names.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::VerifyingKey;
use rsa::{BigUint, RsaPublicKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{WorkerError, WorkerResult};

/// Opaque public-key document as published by an issuer.
///
/// Stored verbatim in every cache tier; only the crypto primitives look inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyMaterial(Value);

impl KeyMaterial {
    pub fn new(document: Value) -> Self {
        Self(document)
    }

    /// Key material for an Ed25519 verifying key (`kty: OKP`).
    pub fn ed25519(key: &VerifyingKey) -> Self {
        Self(serde_json::json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "x": URL_SAFE_NO_PAD.encode(key.as_bytes()),
        }))
    }

    /// Key material for an RSA key from big-endian modulus and exponent.
    pub fn rsa(modulus: &[u8], exponent: &[u8]) -> Self {
        Self(serde_json::json!({
            "kty": "RSA",
            "n": URL_SAFE_NO_PAD.encode(modulus),
            "e": URL_SAFE_NO_PAD.encode(exponent),
        }))
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }

    /// Serialized form used by the shared cache tier.
    pub fn to_bytes(&self) -> WorkerResult<Vec<u8>> {
        serde_json::to_vec(&self.0).map_err(|e| WorkerError::SharedCache {
            message: format!("could not serialize key material: {}", e),
        })
    }

    pub fn from_slice(bytes: &[u8]) -> WorkerResult<Self> {
        serde_json::from_slice(bytes)
            .map(Self)
            .map_err(|e| WorkerError::SharedCache {
                message: format!("corrupt key material in shared cache: {}", e),
            })
    }

    /// Decode into a usable verifying key.
    pub fn to_public_key(&self) -> WorkerResult<PublicKey> {
        let doc = self
            .0
            .as_object()
            .ok_or_else(|| WorkerError::verification("key material is not a JSON object"))?;

        // `algorithm` is the older marker ("RS", "Ed25519"); `kty` the JWK one.
        let kind = doc
            .get("kty")
            .or_else(|| doc.get("algorithm"))
            .and_then(Value::as_str)
            .ok_or_else(|| WorkerError::verification("key material has no key type"))?;

        match kind {
            "RSA" | "RS" => {
                let n = b64_member(doc, "n")?;
                let e = b64_member(doc, "e")?;
                let key = RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from_bytes_be(&e))
                    .map_err(|e| WorkerError::verification(format!("invalid RSA key: {}", e)))?;
                Ok(PublicKey::Rsa(key))
            }
            "OKP" | "Ed25519" => {
                if let Some(crv) = doc.get("crv").and_then(Value::as_str) {
                    if crv != "Ed25519" {
                        return Err(WorkerError::verification(format!(
                            "unsupported curve {}",
                            crv
                        )));
                    }
                }
                let x = b64_member(doc, "x")?;
                let bytes: [u8; 32] = x.as_slice().try_into().map_err(|_| {
                    WorkerError::verification(format!(
                        "Ed25519 key must be 32 bytes, got {}",
                        x.len()
                    ))
                })?;
                let key = VerifyingKey::from_bytes(&bytes).map_err(|e| {
                    WorkerError::verification(format!("invalid Ed25519 key: {}", e))
                })?;
                Ok(PublicKey::Ed25519(key))
            }
            other => Err(WorkerError::verification(format!(
                "unsupported key type {}",
                other
            ))),
        }
    }
}

fn b64_member(doc: &serde_json::Map<String, Value>, name: &str) -> WorkerResult<Vec<u8>> {
    let text = doc
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| WorkerError::verification(format!("key material is missing {}", name)))?;

    URL_SAFE_NO_PAD
        .decode(text.trim_end_matches('='))
        .map_err(|e| WorkerError::verification(format!("invalid base64url in {}: {}", name, e)))
}

/// A decoded verifying key.
#[derive(Debug, Clone)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    Ed25519(VerifyingKey),
}

/// Signature algorithms accepted by `check_signature`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Rs256,
    Rs384,
    Rs512,
    EdDsa,
}

impl FromStr for SignatureAlgorithm {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RS256" => Ok(Self::Rs256),
            "RS384" => Ok(Self::Rs384),
            "RS512" => Ok(Self::Rs512),
            "EdDSA" | "Ed25519" => Ok(Self::EdDsa),
            other => Err(WorkerError::verification(format!(
                "unknown algorithm {}",
                other
            ))),
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rs256 => "RS256",
            Self::Rs384 => "RS384",
            Self::Rs512 => "RS512",
            Self::EdDsa => "EdDSA",
        };
        f.write_str(name)
    }
}

/// Hash functions available to `derive_key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub const NAMES: [&'static str; 3] = ["sha256", "sha384", "sha512"];

    /// Digest length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            other => Err(WorkerError::invalid_argument(
                "hash_algorithm",
                format!("unknown hash {}", other),
            )),
        }
    }
}
