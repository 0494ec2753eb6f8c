//! DEK wrapping: owner-direct, signature-derived, ephemeral-key, provider
//!
//! Every variant wraps the 32-byte DEK with AES-256-GCM under a KEK and the
//! document nonce. Wrapped DEKs travel as hex (`[48 bytes: ciphertext + tag]`).
//!
//! | Variant | KEK |
//! |---|---|
//! | owner-direct | `HKDF(sig(OWNER_KEK_MESSAGE), salt = checksummed address)` |
//! | signature | `HKDF(owner sig(SHARE_DEK_MESSAGE), salt = lowercase recipient)` |
//! | ephemeral | `HKDF(x ‖ y of ECDH(ephemeral secret, recipient pubkey))` |
//! | provider | none; the wallet decrypts an opaque payload |

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{AffinePoint, PublicKey, SecretKey};
use tracing::debug;
use zeroize::Zeroizing;

use crate::aead::{aes_gcm_decrypt, aes_gcm_encrypt};
use crate::hash::sha256;
use crate::keys::{hkdf_sha256, Dek};
use crate::wallet::{signature_hex, WalletSigner};
use crate::{DEK_SIZE, NONCE_SIZE};

/// Message the owner signs to derive their own KEK.
pub const OWNER_KEK_MESSAGE: &str = "NFTDoc-KEK-DERIVATION-v1";

/// Message the owner signs when sharing with a recipient.
pub const SHARE_DEK_MESSAGE: &str = "Essentialis-Share-DEK-v1";

/// Message whose signature seeds the owner's ephemeral ECDH secret.
pub const SHARE_SESSION_MESSAGE: &str = "Essentialis-Share-Session-v1";

/// Output of [`wrap_dek_for_recipient_with_signature`].
#[derive(Debug, Clone)]
pub struct SignatureWrap {
    pub wrapped_dek_hex: String,
    /// `0x`-hex owner signature to embed in the recipient's entry
    pub owner_signature_hex: String,
}

/// Output of [`wrap_dek_for_recipient`].
#[derive(Debug, Clone)]
pub struct EphemeralWrap {
    pub wrapped_dek_hex: String,
    /// Base64 of the 65-byte uncompressed ephemeral public key
    pub ephemeral_pubkey_b64: String,
}

// ── Owner-direct ─────────────────────────────────────────────────────────

async fn owner_kek<S: WalletSigner>(signer: &S) -> anyhow::Result<Zeroizing<[u8; DEK_SIZE]>> {
    let signature = Zeroizing::new(signer.sign_message(OWNER_KEK_MESSAGE).await?);
    hkdf_sha256(&signature, signer.address().as_bytes())
}

/// Wrap `dek` for the signer itself.
pub async fn wrap_dek<S: WalletSigner>(
    signer: &S,
    dek: &Dek,
    nonce: &[u8; NONCE_SIZE],
) -> anyhow::Result<String> {
    let kek = owner_kek(signer).await?;
    seal_dek(&kek, dek, nonce)
}

/// Recover a DEK that was wrapped with [`wrap_dek`] by the same wallet.
pub async fn unwrap_dek<S: WalletSigner>(
    signer: &S,
    wrapped_dek_hex: &str,
    nonce: &[u8; NONCE_SIZE],
) -> anyhow::Result<Dek> {
    let wrapped = decode_hex(wrapped_dek_hex, "wrapped DEK")?;
    let kek = owner_kek(signer).await?;
    open_dek(&kek, &wrapped, nonce)
}

// ── Signature-derived ────────────────────────────────────────────────────

/// Owner side: sign the share message and wrap `dek` under a KEK bound to
/// the recipient's lowercase address.
pub async fn wrap_dek_for_recipient_with_signature<S: WalletSigner>(
    owner: &S,
    dek: &Dek,
    recipient_address: &str,
    nonce: &[u8; NONCE_SIZE],
) -> anyhow::Result<SignatureWrap> {
    let signature = Zeroizing::new(owner.sign_message(SHARE_DEK_MESSAGE).await?);
    let kek = hkdf_sha256(&signature, recipient_address.to_ascii_lowercase().as_bytes())?;
    Ok(SignatureWrap {
        wrapped_dek_hex: seal_dek(&kek, dek, nonce)?,
        owner_signature_hex: signature_hex(&signature),
    })
}

/// Recipient side. The recipient is asked to sign the share message so the
/// wallet shows a prompt; a refusal is ignored and the KEK comes from the
/// owner's signature and the recipient's address alone.
pub async fn unwrap_shared_dek_with_signature<S: WalletSigner>(
    signer: &S,
    owner_signature_hex: &str,
    wrapped_dek_hex: &str,
    nonce: &[u8; NONCE_SIZE],
) -> anyhow::Result<Dek> {
    let owner_signature = Zeroizing::new(decode_hex(owner_signature_hex, "owner signature")?);
    let wrapped = decode_hex(wrapped_dek_hex, "wrapped DEK")?;

    if let Err(e) = signer.sign_message(SHARE_DEK_MESSAGE).await {
        debug!(error = %e, "recipient declined share prompt");
    }

    let kek = hkdf_sha256(&owner_signature, signer.address().to_ascii_lowercase().as_bytes())?;
    open_dek(&kek, &wrapped, nonce)
}

// ── Ephemeral key (ECDH) ─────────────────────────────────────────────────

/// Owner side: derive a deterministic ephemeral secret from the owner's
/// session signature, agree a KEK with `recipient_pubkey`, and wrap `dek`.
pub async fn wrap_dek_for_recipient<S: WalletSigner>(
    owner: &S,
    dek: &Dek,
    recipient_pubkey: &str,
    nonce: &[u8; NONCE_SIZE],
) -> anyhow::Result<EphemeralWrap> {
    let recipient = parse_public_key(recipient_pubkey)?;
    let session = owner.sign_message(SHARE_SESSION_MESSAGE).await?;
    let seed = Zeroizing::new(sha256(signature_hex(&session).as_bytes()));
    let ephemeral = SecretKey::from_slice(&seed[..])
        .map_err(|e| anyhow::anyhow!("ephemeral key derivation failed: {e}"))?;

    let kek = ecdh_kek(&ephemeral, &recipient)?;
    let ephemeral_point = ephemeral.public_key().to_encoded_point(false);
    Ok(EphemeralWrap {
        wrapped_dek_hex: seal_dek(&kek, dek, nonce)?,
        ephemeral_pubkey_b64: STANDARD.encode(ephemeral_point.as_bytes()),
    })
}

/// Recipient side of [`wrap_dek_for_recipient`]. Needs a wallet that exposes
/// its secp256k1 secret.
pub fn unwrap_shared_dek<S: WalletSigner>(
    signer: &S,
    owner_ephemeral_pubkey: &str,
    wrapped_dek_hex: &str,
    nonce: &[u8; NONCE_SIZE],
) -> anyhow::Result<Dek> {
    let secret = signer.secret_key().ok_or_else(|| {
        anyhow::anyhow!(
            "this wallet cannot perform ECDH locally; ask the owner to re-share using signature-based sharing"
        )
    })?;
    let ephemeral = parse_public_key(owner_ephemeral_pubkey)?;
    let wrapped = decode_hex(wrapped_dek_hex, "wrapped DEK")?;
    let kek = ecdh_kek(secret, &ephemeral)?;
    open_dek(&kek, &wrapped, nonce)
}

/// KEK from the uncompressed shared point without its `0x04` tag (`x || y`).
fn ecdh_kek(secret: &SecretKey, public: &PublicKey) -> anyhow::Result<Zeroizing<[u8; DEK_SIZE]>> {
    hkdf_sha256(&shared_point(secret, public)[1..], &[])
}

fn shared_point(secret: &SecretKey, public: &PublicKey) -> Zeroizing<Vec<u8>> {
    let shared: AffinePoint = (public.to_projective() * *secret.to_nonzero_scalar()).into();
    Zeroizing::new(shared.to_encoded_point(false).as_bytes().to_vec())
}

/// Accepts hex (with or without `0x`) or base64, as 33-byte compressed,
/// 65-byte uncompressed, or 64-byte raw `x || y`.
pub fn parse_public_key(encoded: &str) -> anyhow::Result<PublicKey> {
    let trimmed = encoded.trim();
    let body = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let mut bytes = match hex::decode(body) {
        Ok(bytes) => bytes,
        Err(_) => STANDARD
            .decode(trimmed)
            .map_err(|e| anyhow::anyhow!("public key is neither hex nor base64: {e}"))?,
    };
    if bytes.len() == 64 {
        bytes.insert(0, 0x04);
    }
    PublicKey::from_sec1_bytes(&bytes)
        .map_err(|e| anyhow::anyhow!("invalid secp256k1 public key ({} bytes): {e}", bytes.len()))
}

// ── Provider ─────────────────────────────────────────────────────────────

/// Hand an opaque provider payload to the wallet. The payload must be JSON;
/// the wallet returns the DEK as base64.
pub async fn unwrap_shared_dek_with_provider<S: WalletSigner>(
    signer: &S,
    provider_encrypted: &str,
) -> anyhow::Result<Dek> {
    serde_json::from_str::<serde_json::Value>(provider_encrypted)
        .map_err(|e| anyhow::anyhow!("provider payload is not valid JSON: {e}"))?;
    let encoded = Zeroizing::new(signer.provider_decrypt(provider_encrypted).await?);
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| anyhow::anyhow!("provider returned invalid base64: {e}"))?;
    Dek::from_vec(bytes)
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn seal_dek(kek: &[u8; DEK_SIZE], dek: &Dek, nonce: &[u8; NONCE_SIZE]) -> anyhow::Result<String> {
    let wrapped = aes_gcm_encrypt(kek, dek.as_bytes(), nonce)?;
    Ok(hex::encode(wrapped))
}

fn open_dek(kek: &[u8; DEK_SIZE], wrapped: &[u8], nonce: &[u8; NONCE_SIZE]) -> anyhow::Result<Dek> {
    let plain = aes_gcm_decrypt(kek, wrapped, nonce)?;
    Dek::from_vec(plain)
}

fn decode_hex(s: &str, what: &str) -> anyhow::Result<Vec<u8>> {
    let s = s.trim();
    let body = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(body).map_err(|e| anyhow::anyhow!("{what} is not valid hex: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_dek;
    use crate::wallet::LocalWallet;

    const NONCE: [u8; NONCE_SIZE] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];

    /// Signs like a wallet but never exposes its key.
    struct RemoteWallet {
        inner: LocalWallet,
        refuse_prompts: bool,
        provider_dek: Option<String>,
    }

    impl WalletSigner for RemoteWallet {
        fn address(&self) -> String {
            self.inner.address()
        }

        async fn sign_message(&self, message: &str) -> anyhow::Result<Vec<u8>> {
            if self.refuse_prompts {
                anyhow::bail!("user rejected the request");
            }
            self.inner.sign_message(message).await
        }

        async fn provider_decrypt(&self, _payload: &str) -> anyhow::Result<String> {
            self.provider_dek
                .clone()
                .ok_or_else(|| anyhow::anyhow!("no provider key"))
        }
    }

    #[tokio::test]
    async fn test_owner_wrap_unwrap_roundtrip() {
        let owner = LocalWallet::random();
        let dek = generate_dek();

        let wrapped = wrap_dek(&owner, &dek, &NONCE).await.unwrap();
        assert_eq!(wrapped.len(), 2 * (DEK_SIZE + 16));

        let unwrapped = unwrap_dek(&owner, &wrapped, &NONCE).await.unwrap();
        assert_eq!(unwrapped.as_bytes(), dek.as_bytes());
    }

    #[tokio::test]
    async fn test_owner_unwrap_wrong_wallet_fails() {
        let dek = generate_dek();
        let wrapped = wrap_dek(&LocalWallet::random(), &dek, &NONCE).await.unwrap();
        assert!(unwrap_dek(&LocalWallet::random(), &wrapped, &NONCE).await.is_err());
    }

    #[tokio::test]
    async fn test_owner_unwrap_accepts_0x_prefix() {
        let owner = LocalWallet::random();
        let dek = generate_dek();
        let wrapped = format!("0x{}", wrap_dek(&owner, &dek, &NONCE).await.unwrap());
        assert!(unwrap_dek(&owner, &wrapped, &NONCE).await.is_ok());
    }

    #[tokio::test]
    async fn test_signature_share_roundtrip() {
        let owner = LocalWallet::random();
        let recipient = LocalWallet::random();
        let dek = generate_dek();

        let wrap = wrap_dek_for_recipient_with_signature(&owner, &dek, &recipient.address(), &NONCE)
            .await
            .unwrap();
        assert!(wrap.owner_signature_hex.starts_with("0x"));

        let unwrapped = unwrap_shared_dek_with_signature(
            &recipient,
            &wrap.owner_signature_hex,
            &wrap.wrapped_dek_hex,
            &NONCE,
        )
        .await
        .unwrap();
        assert_eq!(unwrapped.as_bytes(), dek.as_bytes());
    }

    #[tokio::test]
    async fn test_signature_share_ignores_refused_prompt() {
        let owner = LocalWallet::random();
        let recipient = RemoteWallet {
            inner: LocalWallet::random(),
            refuse_prompts: true,
            provider_dek: None,
        };
        let dek = generate_dek();
        let wrap = wrap_dek_for_recipient_with_signature(&owner, &dek, &recipient.address(), &NONCE)
            .await
            .unwrap();

        let unwrapped = unwrap_shared_dek_with_signature(
            &recipient,
            &wrap.owner_signature_hex,
            &wrap.wrapped_dek_hex,
            &NONCE,
        )
        .await
        .unwrap();
        assert_eq!(unwrapped.as_bytes(), dek.as_bytes());
    }

    #[tokio::test]
    async fn test_signature_share_other_recipient_fails() {
        let owner = LocalWallet::random();
        let dek = generate_dek();
        let wrap = wrap_dek_for_recipient_with_signature(
            &owner,
            &dek,
            &LocalWallet::random().address(),
            &NONCE,
        )
        .await
        .unwrap();

        let result = unwrap_shared_dek_with_signature(
            &LocalWallet::random(),
            &wrap.owner_signature_hex,
            &wrap.wrapped_dek_hex,
            &NONCE,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_ephemeral_share_roundtrip() {
        let owner = LocalWallet::random();
        let recipient = LocalWallet::random();
        let dek = generate_dek();

        let wrap = wrap_dek_for_recipient(&owner, &dek, &recipient.public_key_hex(), &NONCE)
            .await
            .unwrap();
        assert_eq!(STANDARD.decode(&wrap.ephemeral_pubkey_b64).unwrap().len(), 65);

        let unwrapped =
            unwrap_shared_dek(&recipient, &wrap.ephemeral_pubkey_b64, &wrap.wrapped_dek_hex, &NONCE)
                .unwrap();
        assert_eq!(unwrapped.as_bytes(), dek.as_bytes());
    }

    #[test]
    fn test_ecdh_kek_covers_both_coordinates() {
        let a = SecretKey::random(&mut rand::rngs::OsRng);
        let b = SecretKey::random(&mut rand::rngs::OsRng);

        let point = shared_point(&a, &b.public_key());
        assert_eq!(point.len(), 65);
        assert_eq!(point[0], 0x04);
        let x_only = k256::ecdh::diffie_hellman(a.to_nonzero_scalar(), b.public_key().as_affine());
        assert_eq!(&point[1..33], x_only.raw_secret_bytes().as_slice());

        let kek = ecdh_kek(&a, &b.public_key()).unwrap();
        assert_eq!(*kek, *hkdf_sha256(&point[1..], &[]).unwrap());
        assert_ne!(*kek, *hkdf_sha256(&point[1..33], &[]).unwrap());
        assert_eq!(*kek, *ecdh_kek(&b, &a.public_key()).unwrap());
    }

    #[tokio::test]
    async fn test_ephemeral_key_is_deterministic_per_owner() {
        let owner = LocalWallet::random();
        let recipient = LocalWallet::random();
        let dek = generate_dek();
        let a = wrap_dek_for_recipient(&owner, &dek, &recipient.public_key_hex(), &NONCE)
            .await
            .unwrap();
        let b = wrap_dek_for_recipient(&owner, &dek, &recipient.public_key_hex(), &NONCE)
            .await
            .unwrap();
        assert_eq!(a.ephemeral_pubkey_b64, b.ephemeral_pubkey_b64);
    }

    #[test]
    fn test_ephemeral_unwrap_requires_local_secret() {
        let recipient = RemoteWallet {
            inner: LocalWallet::random(),
            refuse_prompts: false,
            provider_dek: None,
        };
        let err = unwrap_shared_dek(&recipient, "0x04", "00", &NONCE).unwrap_err();
        assert!(err.to_string().contains("re-share"));
    }

    #[test]
    fn test_parse_public_key_forms() {
        let wallet = LocalWallet::random();
        let hex_uncompressed = wallet.public_key_hex();
        let raw = hex::decode(&hex_uncompressed[2..]).unwrap();

        let expected = parse_public_key(&hex_uncompressed).unwrap();
        assert_eq!(parse_public_key(&hex_uncompressed[2..]).unwrap(), expected);
        assert_eq!(parse_public_key(&hex::encode(&raw[1..])).unwrap(), expected);
        assert_eq!(parse_public_key(&STANDARD.encode(&raw)).unwrap(), expected);

        let compressed = expected.to_encoded_point(true);
        assert_eq!(parse_public_key(&hex::encode(compressed.as_bytes())).unwrap(), expected);

        assert!(parse_public_key("0x1234").is_err());
    }

    #[tokio::test]
    async fn test_provider_unwrap() {
        let dek = generate_dek();
        let wallet = RemoteWallet {
            inner: LocalWallet::random(),
            refuse_prompts: false,
            provider_dek: Some(STANDARD.encode(dek.as_bytes())),
        };
        let unwrapped = unwrap_shared_dek_with_provider(&wallet, r#"{"version":"x25519"}"#)
            .await
            .unwrap();
        assert_eq!(unwrapped.as_bytes(), dek.as_bytes());
    }

    #[tokio::test]
    async fn test_provider_rejects_non_json_payload() {
        let wallet = RemoteWallet {
            inner: LocalWallet::random(),
            refuse_prompts: false,
            provider_dek: Some(String::new()),
        };
        let err = unwrap_shared_dek_with_provider(&wallet, "not json").await.unwrap_err();
        assert!(err.to_string().contains("JSON"));
    }
}
