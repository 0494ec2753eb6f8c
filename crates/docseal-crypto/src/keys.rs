//! Data encryption keys, HKDF key-encryption-key derivation, nonce derivation

use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::hash::sha256;
use crate::{DEK_SIZE, NONCE_SIZE};

/// A per-document 256-bit data encryption key. Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct Dek {
    bytes: [u8; DEK_SIZE],
}

impl Dek {
    pub fn from_bytes(bytes: [u8; DEK_SIZE]) -> Self {
        Self { bytes }
    }

    /// Build a DEK from an unwrapped buffer, wiping the buffer either way.
    pub fn from_vec(mut bytes: Vec<u8>) -> anyhow::Result<Self> {
        if bytes.len() != DEK_SIZE {
            let len = bytes.len();
            bytes.zeroize();
            anyhow::bail!("unwrapped key has wrong size: {len} bytes (expected {DEK_SIZE})");
        }
        let mut key = [0u8; DEK_SIZE];
        key.copy_from_slice(&bytes);
        bytes.zeroize();
        Ok(Self::from_bytes(key))
    }

    pub fn as_bytes(&self) -> &[u8; DEK_SIZE] {
        &self.bytes
    }
}

impl Drop for Dek {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for Dek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dek").field("bytes", &"[REDACTED]").finish()
    }
}

/// Generate a random 256-bit DEK.
pub fn generate_dek() -> Dek {
    let mut bytes = [0u8; DEK_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    Dek::from_bytes(bytes)
}

/// HKDF-SHA256 with empty info, 32-byte output. An empty salt is treated
/// as no salt.
pub fn hkdf_sha256(ikm: &[u8], salt: &[u8]) -> anyhow::Result<Zeroizing<[u8; DEK_SIZE]>> {
    let salt = (!salt.is_empty()).then_some(salt);
    let hkdf = Hkdf::<Sha256>::new(salt, ikm);
    let mut okm = Zeroizing::new([0u8; DEK_SIZE]);
    hkdf.expand(&[], &mut okm[..])
        .map_err(|e| anyhow::anyhow!("HKDF expand failed: {e}"))?;
    Ok(okm)
}

/// Seal-time nonce: first 12 bytes of `sha256(owner || timestamp || counter)`.
pub fn derive_nonce(owner: &str, timestamp: &str, counter: &str) -> [u8; NONCE_SIZE] {
    let digest = sha256(format!("{owner}{timestamp}{counter}").as_bytes());
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&digest[..NONCE_SIZE]);
    nonce
}
