//! HKDF (RFC 5869) over HMAC.

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384, Sha512};

use super::keys::HashAlgorithm;
use crate::error::{WorkerError, WorkerResult};

/// Extract-then-expand `length` bytes of output keying material.
pub fn derive(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
    length: usize,
    hash: HashAlgorithm,
) -> WorkerResult<Vec<u8>> {
    let max = 255 * hash.output_len();
    if length > max {
        return Err(WorkerError::invalid_argument(
            "length",
            format!("{} exceeds the {} byte limit for {:?}", length, max, hash),
        ));
    }

    match hash {
        HashAlgorithm::Sha256 => hkdf_with::<Hmac<Sha256>>(ikm, salt, info, length),
        HashAlgorithm::Sha384 => hkdf_with::<Hmac<Sha384>>(ikm, salt, info, length),
        HashAlgorithm::Sha512 => hkdf_with::<Hmac<Sha512>>(ikm, salt, info, length),
    }
}

fn hkdf_with<M: Mac + KeyInit>(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
    length: usize,
) -> WorkerResult<Vec<u8>> {
    // An empty salt is equivalent to HashLen zero bytes: HMAC zero-pads its key.
    let mut extract = new_mac::<M>(salt)?;
    extract.update(ikm);
    let prk = extract.finalize().into_bytes();

    let mut okm = Vec::with_capacity(length);
    let mut block: Vec<u8> = Vec::new();
    let mut counter: u8 = 1;

    while okm.len() < length {
        let mut expand = new_mac::<M>(&prk)?;
        expand.update(&block);
        expand.update(info);
        expand.update(&[counter]);
        block = expand.finalize().into_bytes().to_vec();

        let take = (length - okm.len()).min(block.len());
        okm.extend_from_slice(&block[..take]);
        counter = counter.wrapping_add(1);
    }

    Ok(okm)
}

fn new_mac<M: Mac + KeyInit>(key: &[u8]) -> WorkerResult<M> {
    <M as Mac>::new_from_slice(key)
        .map_err(|e| WorkerError::invalid_argument("salt", format!("unusable HMAC key: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 5869, A.1
    #[test]
    fn test_rfc5869_case_1() {
        let ikm = [0x0bu8; 22];
        let salt = hex::decode("000102030405060708090a0b0c").unwrap();
        let info = hex::decode("f0f1f2f3f4f5f6f7f8f9").unwrap();

        let okm = derive(&ikm, &salt, &info, 42, HashAlgorithm::Sha256).unwrap();
        assert_eq!(
            hex::encode(okm),
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865"
        );
    }

    // RFC 5869, A.3 (empty salt and info)
    #[test]
    fn test_rfc5869_case_3() {
        let ikm = [0x0bu8; 22];

        let okm = derive(&ikm, &[], &[], 42, HashAlgorithm::Sha256).unwrap();
        assert_eq!(
            hex::encode(okm),
            "8da4e775a563c18f715f802a063c5a31b8a11f5c5ee1879ec3454e5f3c738d2d9d201395faa4b61a96c8"
        );
    }

    #[test]
    fn test_length_limit() {
        assert!(derive(b"k", b"s", b"i", 255 * 32, HashAlgorithm::Sha256).is_ok());
        assert!(matches!(
            derive(b"k", b"s", b"i", 255 * 32 + 1, HashAlgorithm::Sha256),
            Err(WorkerError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_output_depends_on_hash() {
        let a = derive(b"k", b"s", b"i", 16, HashAlgorithm::Sha256).unwrap();
        let b = derive(b"k", b"s", b"i", 16, HashAlgorithm::Sha512).unwrap();
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
        assert!(derive(b"k", b"s", b"i", 0, HashAlgorithm::Sha384)
            .unwrap()
            .is_empty());
    }
}
