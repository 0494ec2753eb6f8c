//! docseal-crypto: document crypto for sealed documents
//!
//! Payload pipeline: plaintext → AES-256-GCM (DEK, 12-byte nonce) → XOR-bind to
//! holder address, mint timestamp and counter → metachunk envelope
//!
//! Key hierarchy:
//! ```text
//! Wallet (secp256k1)
//!   ├── Owner KEK: HKDF-SHA256(sig("NFTDoc-KEK-DERIVATION-v1"), salt = checksummed address)
//!   ├── Share KEK: HKDF-SHA256(owner sig("Essentialis-Share-DEK-v1"), salt = recipient address)
//!   └── Session KEK: HKDF-SHA256(ECDH(ephemeral, recipient pubkey))
//!         └── wraps the per-document DEK (AES-256-GCM, document nonce)
//! ```

pub mod address;
pub mod aead;
pub mod codec;
pub mod hash;
pub mod keys;
pub mod wallet;
pub mod wrap;

pub use aead::{aes_gcm_decrypt, aes_gcm_encrypt};
pub use codec::{combine, decode, divide, encode, join, split, to_u8};
pub use hash::{ct_eq, hmac_sha256, sha256, sha256_b64};
pub use keys::{derive_nonce, generate_dek, hkdf_sha256, Dek};
pub use wallet::{LocalWallet, WalletSigner};
pub use wrap::{
    unwrap_dek, unwrap_shared_dek, unwrap_shared_dek_with_provider,
    unwrap_shared_dek_with_signature, wrap_dek, wrap_dek_for_recipient,
    wrap_dek_for_recipient_with_signature, EphemeralWrap, SignatureWrap,
};

/// Size of a data encryption key in bytes (AES-256)
pub const DEK_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of a SHA-256 digest / HMAC-SHA256 tag
pub const DIGEST_SIZE: usize = 32;
