//! Decrypt orchestrator
//!
//! ```text
//! Idle → FetchingMetachunk → DecodingChunks → ResolvingKey
//!      → LocatingCiphertext → Decrypting → VerifyingIntegrity → Done | Failed
//! ```
//!
//! Every step fails fast. The candidate-address search in `Decrypting` is
//! the only internal retry: the first candidate whose ciphertext passes
//! GCM authentication wins, and the integrity check reuses exactly that
//! candidate's address and ciphertext bytes.

use std::time::Duration;

use docseal_core::{DocsealError, DocsealResult};
use docseal_crypto::{aes_gcm_decrypt, decode, sha256_b64, split, Dek, WalletSigner, NONCE_SIZE, TAG_SIZE};
use docseal_storage::ContentStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::binding::{candidate_addresses, unbind_ciphertext, verify_integrity};
use crate::metadata::DocumentMetadata;
use crate::status::{ensure_live, report, with_deadline, Phase, StatusFn};
use crate::unwrap::{unwrap_entry, verify_dek_checksum, UnwrapStrategy};

/// MIME type used when the document has no `File Type` attribute.
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// A verified plaintext ready for display or saving.
#[derive(Debug, Clone)]
pub struct DecryptedDocument {
    pub bytes: Vec<u8>,
    pub mime: String,
    /// Address the winning candidate was bound to
    pub bound_address: String,
    pub strategy: UnwrapStrategy,
}

pub struct DocumentDecryptor<'a, S> {
    signer: &'a S,
    store: &'a ContentStore,
    signature_timeout: Option<Duration>,
    cancel: CancellationToken,
    status: Option<StatusFn>,
}

impl<'a, S: WalletSigner> DocumentDecryptor<'a, S> {
    pub fn new(signer: &'a S, store: &'a ContentStore) -> Self {
        Self {
            signer,
            store,
            signature_timeout: None,
            cancel: CancellationToken::new(),
            status: None,
        }
    }

    /// Deadline for each wallet prompt.
    pub fn with_signature_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.signature_timeout = timeout;
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

    pub async fn decrypt(&self, metadata: &DocumentMetadata) -> DocsealResult<DecryptedDocument> {
        self.phase(Phase::Idle);
        match self.run(metadata).await {
            Ok(doc) => {
                self.phase(Phase::Done);
                info!(
                    bytes = doc.bytes.len(),
                    mime = %doc.mime,
                    strategy = %doc.strategy,
                    "document decrypted and verified"
                );
                Ok(doc)
            }
            Err(e) => {
                self.phase(Phase::Failed);
                warn!(kind = e.kind(), error = %e, "decrypt failed");
                Err(e)
            }
        }
    }

    async fn run(&self, metadata: &DocumentMetadata) -> DocsealResult<DecryptedDocument> {
        let caller = self.signer.address();

        // ── 1. Fetch ──
        ensure_live(&self.cancel)?;
        self.phase(Phase::FetchingMetachunk);
        let cid = metadata
            .encrypted_file_cid
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                DocsealError::MetachunkFetchFailed("metadata has no encrypted_file_cid".into())
            })?;
        let metachunk = with_deadline(self.store.fetch(cid), None, &self.cancel, |_| {
            DocsealError::Cancelled
        })
        .await?
        .map_err(|e| DocsealError::MetachunkFetchFailed(format!("{e:#}")))?;

        // ── 2. Decode ──
        ensure_live(&self.cancel)?;
        self.phase(Phase::DecodingChunks);
        let inner = decode(&metachunk)
            .map_err(|e| DocsealError::InvalidMetachunkFormat(e.to_string()))?;
        let pieces = split(&inner);
        if pieces.len() < 2 {
            return Err(DocsealError::InvalidMetachunkFormat(format!(
                "expected at least 2 pieces, found {}",
                pieces.len()
            )));
        }
        let (chunk_a, chunk_b) = (&pieces[0], &pieces[1]);
        debug!(chunk_a = chunk_a.len(), chunk_b = chunk_b.len(), "metachunk decoded");

        // ── 3. Resolve key ──
        self.phase(Phase::ResolvingKey);
        let (timestamp, counter) = metadata.binding_attributes()?;
        let entry = metadata.entry_for(&caller)?;
        let nonce = metadata.resolve_nonce(&entry)?;
        let strategy = UnwrapStrategy::select(&entry);
        let dek = with_deadline(
            unwrap_entry(self.signer, &caller, &entry, &nonce),
            self.signature_timeout,
            &self.cancel,
            |d| DocsealError::WalletTimeout(d.as_secs()),
        )
        .await??;
        verify_dek_checksum(&dek, &entry)?;

        // ── 4. Locate ──
        ensure_live(&self.cancel)?;
        self.phase(Phase::LocatingCiphertext);
        let holders = metadata
            .wrapped_deks
            .as_ref()
            .map(|d| d.holders())
            .unwrap_or_default();
        let candidates = candidate_addresses(&caller, metadata.bound_address.as_deref(), &holders);
        let candidate_count = candidates.len();

        // ── 5. Decrypt ──
        ensure_live(&self.cancel)?;
        self.phase(Phase::Decrypting);
        // Unbinding preserves length, so a short chunk_a fails every candidate.
        let winner = if chunk_a.len() >= TAG_SIZE {
            first_authentic(&dek, &nonce, chunk_a, &timestamp, &counter, candidates)
        } else {
            None
        };
        let Some((used_address, ciphertext, plaintext)) = winner else {
            return Err(self.diagnose(&dek, &nonce, chunk_a, &caller, &timestamp, &counter));
        };
        debug!(address = %used_address, candidates = candidate_count, "ciphertext located");

        if let Some(expected) = entry.ciphertext_checksum() {
            let actual = sha256_b64(&ciphertext);
            if actual != expected {
                warn!(
                    expected = %expected,
                    actual = %actual,
                    "encrypted data checksum differs from the value recorded at share time"
                );
            }
        }

        // ── 6. Verify ──
        self.phase(Phase::VerifyingIntegrity);
        verify_integrity(chunk_b, &plaintext, &used_address, &timestamp, &ciphertext)?;

        Ok(DecryptedDocument {
            bytes: plaintext,
            mime: metadata.file_type().unwrap_or_else(|| DEFAULT_MIME.to_string()),
            bound_address: used_address,
            strategy,
        })
    }

    /// Retry once with the raw connected address to report a concrete
    /// decryption error.
    fn diagnose(
        &self,
        dek: &Dek,
        nonce: &[u8; NONCE_SIZE],
        chunk_a: &[u8],
        caller: &str,
        timestamp: &str,
        counter: &str,
    ) -> DocsealError {
        let ciphertext = unbind_ciphertext(chunk_a, caller, timestamp, counter);
        let reason = match aes_gcm_decrypt(dek.as_bytes(), &ciphertext, nonce) {
            Err(e) => e.to_string(),
            Ok(_) => "no candidate address authenticated".to_string(),
        };
        DocsealError::DecryptionFailed {
            reason,
            ciphertext_len: ciphertext.len(),
            nonce_len: nonce.len(),
        }
    }
}

/// First candidate whose ciphertext authenticates, in order. Each
/// candidate's ciphertext is unbound only when it is tried.
fn first_authentic(
    dek: &Dek,
    nonce: &[u8; NONCE_SIZE],
    chunk_a: &[u8],
    timestamp: &str,
    counter: &str,
    candidates: Vec<String>,
) -> Option<(String, Vec<u8>, Vec<u8>)> {
    candidates.into_iter().find_map(|addr| {
        let ct = unbind_ciphertext(chunk_a, &addr, timestamp, counter);
        match aes_gcm_decrypt(dek.as_bytes(), &ct, nonce) {
            Ok(plaintext) => Some((addr, ct, plaintext)),
            Err(e) => {
                debug!(address = %addr, error = %e, "candidate rejected");
                None
            }
        }
    })
}
