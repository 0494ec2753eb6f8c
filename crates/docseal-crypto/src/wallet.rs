//! Wallet signer capability and a local secp256k1 implementation
//!
//! Signatures are Ethereum personal-sign (EIP-191): ECDSA over
//! `keccak256("\x19Ethereum Signed Message:\n" || len || message)`, encoded as
//! 65 bytes `r || s || v` with `v = 27 + recovery_id`.

use std::future::Future;

use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::SecretKey;

use crate::address::{self, keccak256};

/// The signing surface a connected wallet exposes to the unwrap and share flows.
pub trait WalletSigner: Send + Sync {
    /// Checksummed address of the connected account.
    fn address(&self) -> String;

    /// Personal-sign `message`. May block on a user prompt.
    fn sign_message(&self, message: &str) -> impl Future<Output = anyhow::Result<Vec<u8>>> + Send;

    /// Local secp256k1 secret, when the wallet can expose one (needed for
    /// ephemeral-key unwrap).
    fn secret_key(&self) -> Option<&SecretKey> {
        None
    }

    /// Wallet-native decryption of an opaque provider payload. Returns the
    /// base64-encoded DEK.
    fn provider_decrypt(
        &self,
        payload: &str,
    ) -> impl Future<Output = anyhow::Result<String>> + Send {
        let len = payload.len();
        async move {
            Err::<String, _>(anyhow::anyhow!(
                "wallet does not support provider decryption ({len}-byte payload)"
            ))
        }
    }
}

/// EIP-191 personal message hash.
pub fn eip191_hash(message: &[u8]) -> [u8; 32] {
    let mut buf = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    buf.extend_from_slice(message);
    keccak256(&buf)
}

/// `0x`-prefixed lowercase hex, the form signatures take in metadata.
pub fn signature_hex(signature: &[u8]) -> String {
    format!("0x{}", hex::encode(signature))
}

/// A wallet backed by an in-process secp256k1 key.
pub struct LocalWallet {
    secret: SecretKey,
    address: String,
}

impl LocalWallet {
    /// Parse a 32-byte hex private key (with or without `0x`).
    pub fn from_hex(key: &str) -> anyhow::Result<Self> {
        let key = key.trim();
        let body = key.strip_prefix("0x").unwrap_or(key);
        let mut bytes =
            hex::decode(body).map_err(|e| anyhow::anyhow!("wallet key is not valid hex: {e}"))?;
        let secret = SecretKey::from_slice(&bytes);
        zeroize::Zeroize::zeroize(&mut bytes);
        let secret = secret.map_err(|e| anyhow::anyhow!("invalid secp256k1 private key: {e}"))?;
        Ok(Self::from_secret(secret))
    }

    pub fn random() -> Self {
        Self::from_secret(SecretKey::random(&mut rand::rngs::OsRng))
    }

    pub fn from_secret(secret: SecretKey) -> Self {
        let address = address::from_public_key(&secret.public_key());
        Self { secret, address }
    }

    /// Uncompressed public key as `0x04…` hex, the form a recipient hands
    /// out for ephemeral-key sharing.
    pub fn public_key_hex(&self) -> String {
        let point = self.secret.public_key().to_encoded_point(false);
        format!("0x{}", hex::encode(point.as_bytes()))
    }

    fn sign_sync(&self, message: &str) -> anyhow::Result<Vec<u8>> {
        let digest = eip191_hash(message.as_bytes());
        let (signature, recovery_id) = SigningKey::from(&self.secret)
            .sign_prehash_recoverable(&digest)
            .map_err(|e| anyhow::anyhow!("signing failed: {e}"))?;
        let mut out = signature.to_bytes().to_vec();
        out.push(27 + recovery_id.to_byte());
        Ok(out)
    }
}

impl WalletSigner for LocalWallet {
    fn address(&self) -> String {
        self.address.clone()
    }

    fn sign_message(&self, message: &str) -> impl Future<Output = anyhow::Result<Vec<u8>>> + Send {
        let result = self.sign_sync(message);
        async move { result }
    }

    fn secret_key(&self) -> Option<&SecretKey> {
        Some(&self.secret)
    }
}

impl std::fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWallet")
            .field("address", &self.address)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
