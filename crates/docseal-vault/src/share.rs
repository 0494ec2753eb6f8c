//! Share orchestrator: re-wrap the owner's DEK for a recipient and commit the
//! updated metadata as the token's new URI.

use std::time::Duration;

use docseal_core::{DocsealError, DocsealResult};
use docseal_crypto::{
    address, decode, sha256_b64, split, unwrap_dek, wrap_dek_for_recipient,
    wrap_dek_for_recipient_with_signature, Dek, WalletSigner, NONCE_SIZE,
};
use docseal_storage::ContentStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::binding::unbind_ciphertext;
use crate::metadata::{load_metadata, DocumentMetadata, MetadataSource, WrappedDeks, WrappedKeyEntry};
use crate::registry::TokenRegistry;
use crate::status::{ensure_live, report, with_deadline, Phase, StatusFn};
use crate::unwrap::verify_dek_checksum;

/// How the recipient's copy of the DEK is wrapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareMethod {
    /// KEK from an owner signature bound to the recipient address
    Signature,
    /// KEK from ECDH with the recipient's secp256k1 public key
    EphemeralKey { recipient_pubkey: String },
}

#[derive(Debug, Clone)]
pub struct ShareRequest {
    pub token_id: String,
    pub recipient: String,
    pub method: ShareMethod,
}

#[derive(Debug, Clone)]
pub struct ShareReceipt {
    pub token_id: String,
    /// Lowercase recipient address, as keyed in `wrapped_deks`
    pub recipient: String,
    pub tx_hash: String,
    pub version: u64,
    pub encrypted_data_sha256_b64: Option<String>,
}

pub struct DocumentSharer<'a, S, R> {
    signer: &'a S,
    store: &'a ContentStore,
    registry: &'a R,
    signature_timeout: Option<Duration>,
    confirmation_timeout: Option<Duration>,
    cancel: CancellationToken,
    status: Option<StatusFn>,
}

impl<'a, S: WalletSigner, R: TokenRegistry> DocumentSharer<'a, S, R> {
    pub fn new(signer: &'a S, store: &'a ContentStore, registry: &'a R) -> Self {
        Self {
            signer,
            store,
            registry,
            signature_timeout: None,
            confirmation_timeout: None,
            cancel: CancellationToken::new(),
            status: None,
        }
    }

    pub fn with_signature_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.signature_timeout = timeout;
        self
    }

    /// Deadline for the update confirmation, separate from wallet prompts.
    pub fn with_confirmation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_status(mut self, status: StatusFn) -> Self {
        self.status = Some(status);
        self
    }

    fn phase(&self, phase: Phase) {
        report(self.status.as_ref(), phase);
    }

    pub async fn share(&self, request: &ShareRequest) -> DocsealResult<ShareReceipt> {
        self.phase(Phase::Idle);
        match self.run(request).await {
            Ok(receipt) => {
                self.phase(Phase::Done);
                info!(
                    token_id = %receipt.token_id,
                    recipient = %receipt.recipient,
                    tx = %receipt.tx_hash,
                    "document shared"
                );
                Ok(receipt)
            }
            Err(e) => {
                self.phase(Phase::Failed);
                warn!(kind = e.kind(), error = %e, "share failed");
                Err(e)
            }
        }
    }

    async fn run(&self, request: &ShareRequest) -> DocsealResult<ShareReceipt> {
        if !address::is_address(&request.recipient) {
            return Err(DocsealError::Other(anyhow::anyhow!(
                "invalid recipient address: {:?}",
                request.recipient
            )));
        }
        let recipient = request.recipient.to_ascii_lowercase();
        let owner = self.signer.address();

        // ── 1. Load ──
        ensure_live(&self.cancel)?;
        self.phase(Phase::LoadingMetadata);
        let record = self.registry.token_uri(&request.token_id).await?;
        let mut metadata = load_metadata(&MetadataSource::parse(&record.uri), self.store).await?;

        // ── 2–3. Owner key ──
        self.phase(Phase::UnwrappingOwnerKey);
        let entry = metadata.entry_for(&owner)?;
        let nonce = metadata.resolve_nonce(&entry)?;
        let wrapped = entry
            .wrapped_dek
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| DocsealError::WrappedDekMissing(owner.clone()))?;
        let dek = with_deadline(
            unwrap_dek(self.signer, wrapped, &nonce),
            self.signature_timeout,
            &self.cancel,
            |d| DocsealError::WalletTimeout(d.as_secs()),
        )
        .await?
        .map_err(|e| DocsealError::unwrap_failed("owner", format!("{e:#}")))?;
        verify_dek_checksum(&dek, &entry)?;

        // ── 4. Wrap for recipient ──
        self.phase(Phase::WrappingForRecipient);
        let mut new_entry = self.wrap_for(&dek, &recipient, &request.method, &nonce).await?;

        // ── 5–6. Checksums ──
        self.phase(Phase::ComputingChecksums);
        new_entry.dek_sha256_b64 = Some(sha256_b64(dek.as_bytes()));
        let data_sha = self.ciphertext_checksum(&metadata, &owner).await;
        // recorded even when unavailable, as an explicit null
        new_entry.encrypted_data_sha256_b64 = Some(data_sha.clone());

        // ── 7. Append ──
        match metadata.wrapped_deks.as_mut() {
            Some(deks) => deks.upsert(&recipient, new_entry),
            None => {
                let mut deks = WrappedDeks::ByAddress(Default::default());
                deks.upsert(&recipient, new_entry);
                metadata.wrapped_deks = Some(deks);
            }
        }
        if data_sha.is_some() {
            metadata.encrypted_data_sha256_b64 = data_sha.clone();
        }
        let uri = metadata.to_data_uri()?;

        // ── 8. Submit ──
        ensure_live(&self.cancel)?;
        self.phase(Phase::SubmittingUpdate);
        let latest = self.registry.token_uri(&request.token_id).await?;
        if latest.version != record.version {
            return Err(DocsealError::ConcurrentModification {
                token_id: request.token_id.clone(),
                expected: record.version,
                found: latest.version,
            });
        }
        let tx_hash = self
            .registry
            .submit_update(&request.token_id, &uri, record.version)
            .await
            .map_err(|e| match e {
                e @ (DocsealError::ConcurrentModification { .. }
                | DocsealError::ShareTransactionFailed(_)) => e,
                other => DocsealError::ShareTransactionFailed(other.to_string()),
            })?;
        debug!(tx = %tx_hash, "update submitted");

        self.phase(Phase::AwaitingConfirmation);
        let receipt = with_deadline(
            self.registry.wait_for_receipt(&tx_hash),
            self.confirmation_timeout,
            &self.cancel,
            |d| {
                DocsealError::ShareTransactionFailed(format!(
                    "timed out after {}s waiting for confirmation of {tx_hash}",
                    d.as_secs()
                ))
            },
        )
        .await??;
        if !receipt.success {
            return Err(DocsealError::ShareTransactionFailed(format!(
                "transaction {tx_hash} reverted"
            )));
        }

        Ok(ShareReceipt {
            token_id: request.token_id.clone(),
            recipient,
            tx_hash,
            version: receipt.version,
            encrypted_data_sha256_b64: data_sha,
        })
    }

    async fn wrap_for(
        &self,
        dek: &Dek,
        recipient: &str,
        method: &ShareMethod,
        nonce: &[u8; NONCE_SIZE],
    ) -> DocsealResult<WrappedKeyEntry> {
        let on_timeout = |d: Duration| DocsealError::WalletTimeout(d.as_secs());
        let entry = match method {
            ShareMethod::Signature => {
                let wrap = with_deadline(
                    wrap_dek_for_recipient_with_signature(self.signer, dek, recipient, nonce),
                    self.signature_timeout,
                    &self.cancel,
                    on_timeout,
                )
                .await?
                .map_err(|e| DocsealError::Other(e.context("wrapping DEK for recipient")))?;
                WrappedKeyEntry {
                    wrapped_dek: Some(wrap.wrapped_dek_hex),
                    owner_signature: Some(wrap.owner_signature_hex),
                    ..Default::default()
                }
            }
            ShareMethod::EphemeralKey { recipient_pubkey } => {
                let wrap = with_deadline(
                    wrap_dek_for_recipient(self.signer, dek, recipient_pubkey, nonce),
                    self.signature_timeout,
                    &self.cancel,
                    on_timeout,
                )
                .await?
                .map_err(|e| DocsealError::Other(e.context("wrapping DEK for recipient")))?;
                WrappedKeyEntry {
                    wrapped_dek: Some(wrap.wrapped_dek_hex),
                    owner_ephemeral_pubkey: Some(wrap.ephemeral_pubkey_b64),
                    ..Default::default()
                }
            }
        };
        Ok(entry)
    }

    /// `base64(sha256(ciphertext))` of the owner's binding. Best effort: any
    /// failure leaves the checksum unset.
    async fn ciphertext_checksum(&self, metadata: &DocumentMetadata, owner: &str) -> Option<String> {
        let result: anyhow::Result<String> = async {
            let cid = metadata
                .encrypted_file_cid
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("no encrypted_file_cid"))?;
            let (timestamp, counter) = metadata.binding_attributes()?;
            let metachunk = self.store.fetch(cid).await?;
            let pieces = split(&decode(&metachunk)?);
            let chunk_a = pieces
                .first()
                .filter(|_| pieces.len() >= 2)
                .ok_or_else(|| anyhow::anyhow!("metachunk has fewer than 2 pieces"))?;
            let bound = metadata.bound_address.as_deref().unwrap_or(owner);
            let ciphertext = unbind_ciphertext(chunk_a, bound, &timestamp, &counter);
            Ok::<_, anyhow::Error>(sha256_b64(&ciphertext))
        }
        .await;

        match result {
            Ok(sum) => Some(sum),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "could not compute encrypted data checksum");
                None
            }
        }
    }
}
