//! SHA-256 / HMAC-SHA256 digests for integrity tags

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::DIGEST_SIZE;

/// SHA-256 digest.
pub fn sha256(data: &[u8]) -> [u8; DIGEST_SIZE] {
    Sha256::digest(data).into()
}

/// Standard base64 of `sha256(data)`, the checksum form stored in metadata.
pub fn sha256_b64(data: &[u8]) -> String {
    STANDARD.encode(sha256(data))
}

/// HMAC-SHA256 of `message` under `key`.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> anyhow::Result<[u8; DIGEST_SIZE]> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
        .map_err(|e| anyhow::anyhow!("HMAC key setup failed: {e}"))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().into())
}

/// Constant-time byte comparison. Slices of different length are unequal.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        let digest = sha256(b"abc");
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha256_b64_length() {
        // 32 bytes → 44 base64 chars with padding
        assert_eq!(sha256_b64(b"hello world").len(), 44);
    }

    #[test]
    fn test_hmac_rfc4231_case2() {
        let mac = hmac_sha256(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            hex::encode(mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_hmac_empty_key_is_accepted() {
        assert!(hmac_sha256(b"", b"message").is_ok());
    }

    #[test]
    fn test_ct_eq() {
        assert!(ct_eq(b"same", b"same"));
        assert!(!ct_eq(b"same", b"diff"));
        assert!(!ct_eq(b"short", b"longer"));
    }
}
