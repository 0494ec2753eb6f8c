//! AES-256-GCM payload encryption/decryption
//!
//! Ciphertext format (binary):
//! ```text
//! [N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! The nonce is not stored with the ciphertext. It travels in document
//! metadata as hex and is derived deterministically at seal time.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};

use crate::{DEK_SIZE, NONCE_SIZE, TAG_SIZE};

/// Encrypt with AES-256-GCM. Returns `[ciphertext][16-byte tag]`.
pub fn aes_gcm_encrypt(
    key: &[u8; DEK_SIZE],
    plaintext: &[u8],
    nonce: &[u8; NONCE_SIZE],
) -> anyhow::Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.into());
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| anyhow::anyhow!("AES-GCM encryption failed: {e}"))
}

/// Decrypt `[ciphertext][16-byte tag]` with AES-256-GCM.
///
/// Fails on a wrong key, wrong nonce, or any modified byte.
pub fn aes_gcm_decrypt(
    key: &[u8; DEK_SIZE],
    ciphertext: &[u8],
    nonce: &[u8; NONCE_SIZE],
) -> anyhow::Result<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        anyhow::bail!(
            "ciphertext too short: {} bytes (minimum {})",
            ciphertext.len(),
            TAG_SIZE
        );
    }

    let cipher = Aes256Gcm::new(key.into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| anyhow::anyhow!("authentication failed: {e}"))
}
