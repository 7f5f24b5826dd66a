//! Fixed certificate served in load-test mode.
//!
//! The signing seed is public. Load generators use it to produce
//! assertions the worker accepts without any network access.

use ed25519_dalek::SigningKey;

use crate::crypto::KeyMaterial;

/// Hostname pre-seeded into the memory tier in load-test mode.
pub const LOADTEST_HOSTNAME: &str = "loadtest.local";

/// Seed of the load-test Ed25519 key.
pub const LOADTEST_SEED: [u8; 32] = *b"certworker-loadtest-signing-seed";

/// Signing half of the load-test key.
pub fn loadtest_signing_key() -> SigningKey {
    SigningKey::from_bytes(&LOADTEST_SEED)
}

/// Key material seeded for [`LOADTEST_HOSTNAME`].
pub fn loadtest_key_material() -> KeyMaterial {
    KeyMaterial::ed25519(&loadtest_signing_key().verifying_key())
}
