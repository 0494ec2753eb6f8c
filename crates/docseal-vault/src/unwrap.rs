//! Strategy selection for a holder's wrapped DEK

use docseal_core::{DocsealError, DocsealResult};
use docseal_crypto::{
    ct_eq, sha256_b64, unwrap_dek, unwrap_shared_dek, unwrap_shared_dek_with_provider,
    unwrap_shared_dek_with_signature, Dek, WalletSigner, NONCE_SIZE,
};
use tracing::debug;

use crate::metadata::WrappedKeyEntry;

/// Which unwrap variant an entry calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnwrapStrategy {
    /// Owner signature embedded at share time
    Signature,
    /// Opaque payload decrypted by the wallet
    Provider,
    /// ECDH against the owner's ephemeral public key
    Ephemeral,
    /// The connected wallet sealed the document
    Owner,
}

impl UnwrapStrategy {
    /// Signature, then provider, then ephemeral key; otherwise owner-direct.
    pub fn select(entry: &WrappedKeyEntry) -> Self {
        if non_empty(&entry.owner_signature) {
            Self::Signature
        } else if entry.provider_payload().is_some() {
            Self::Provider
        } else if non_empty(&entry.owner_ephemeral_pubkey) {
            Self::Ephemeral
        } else {
            Self::Owner
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Signature => "signature",
            Self::Provider => "provider",
            Self::Ephemeral => "ephemeral-key",
            Self::Owner => "owner",
        }
    }
}

impl std::fmt::Display for UnwrapStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn non_empty(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.trim().is_empty())
}

/// Recover the DEK for `entry` with the selected strategy.
pub async fn unwrap_entry<S: WalletSigner>(
    signer: &S,
    holder: &str,
    entry: &WrappedKeyEntry,
    nonce: &[u8; NONCE_SIZE],
) -> DocsealResult<Dek> {
    let strategy = UnwrapStrategy::select(entry);
    debug!(holder = %holder, strategy = %strategy, "unwrapping DEK");

    let wrapped = || {
        entry
            .wrapped_dek
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| DocsealError::WrappedDekMissing(holder.to_string()))
    };

    let result = match strategy {
        UnwrapStrategy::Signature => {
            let signature = entry.owner_signature.as_deref().unwrap_or_default();
            unwrap_shared_dek_with_signature(signer, signature, wrapped()?, nonce).await
        }
        UnwrapStrategy::Provider => {
            let payload = entry.provider_payload().unwrap_or_default();
            unwrap_shared_dek_with_provider(signer, &payload).await
        }
        UnwrapStrategy::Ephemeral => {
            let pubkey = entry.owner_ephemeral_pubkey.as_deref().unwrap_or_default();
            unwrap_shared_dek(signer, pubkey, wrapped()?, nonce)
        }
        UnwrapStrategy::Owner => unwrap_dek(signer, wrapped()?, nonce).await,
    };
    result.map_err(|e| DocsealError::unwrap_failed(strategy.name(), format!("{e:#}")))
}

/// Compare the DEK against the entry's recorded checksum, if any.
pub fn verify_dek_checksum(dek: &Dek, entry: &WrappedKeyEntry) -> DocsealResult<()> {
    let Some(expected) = entry.dek_sha256_b64.as_deref().filter(|s| !s.is_empty()) else {
        return Ok(());
    };
    if ct_eq(sha256_b64(dek.as_bytes()).as_bytes(), expected.trim().as_bytes()) {
        Ok(())
    } else {
        Err(DocsealError::DekMismatch)
    }
}
