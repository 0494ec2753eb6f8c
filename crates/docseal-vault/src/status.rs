//! Pipeline phases, status reporting, and deadlines on suspension points

use std::future::Future;
use std::time::Duration;

use docseal_core::{DocsealError, DocsealResult};
use tokio_util::sync::CancellationToken;

/// Named phase of the decrypt or share pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    FetchingMetachunk,
    DecodingChunks,
    ResolvingKey,
    LocatingCiphertext,
    Decrypting,
    VerifyingIntegrity,
    LoadingMetadata,
    UnwrappingOwnerKey,
    WrappingForRecipient,
    ComputingChecksums,
    SubmittingUpdate,
    AwaitingConfirmation,
    Done,
    Failed,
}

impl Phase {
    /// User-facing status line.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::FetchingMetachunk => "Fetching encrypted bundle",
            Phase::DecodingChunks => "Decoding chunks",
            Phase::ResolvingKey => "Unwrapping document key",
            Phase::LocatingCiphertext => "Locating ciphertext",
            Phase::Decrypting => "Decrypting",
            Phase::VerifyingIntegrity => "Verifying integrity",
            Phase::LoadingMetadata => "Loading metadata",
            Phase::UnwrappingOwnerKey => "Unwrapping owner key",
            Phase::WrappingForRecipient => "Wrapping key for recipient",
            Phase::ComputingChecksums => "Computing checksums",
            Phase::SubmittingUpdate => "Submitting token update",
            Phase::AwaitingConfirmation => "Waiting for confirmation",
            Phase::Done => "Done",
            Phase::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Status callback, invoked on every phase transition
pub type StatusFn = Box<dyn Fn(Phase) + Send + Sync>;

pub(crate) fn report(status: Option<&StatusFn>, phase: Phase) {
    tracing::debug!(phase = ?phase, "phase");
    if let Some(cb) = status {
        cb(phase);
    }
}

/// Await `fut` under an optional deadline, racing the cancellation token.
pub(crate) async fn with_deadline<T>(
    fut: impl Future<Output = T>,
    limit: Option<Duration>,
    cancel: &CancellationToken,
    on_timeout: impl FnOnce(Duration) -> DocsealError,
) -> DocsealResult<T> {
    let timed = async {
        match limit {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| on_timeout(limit)),
            None => Ok(fut.await),
        }
    };
    tokio::select! {
        _ = cancel.cancelled() => Err(DocsealError::Cancelled),
        result = timed => result,
    }
}

pub(crate) fn ensure_live(cancel: &CancellationToken) -> DocsealResult<()> {
    if cancel.is_cancelled() {
        return Err(DocsealError::Cancelled);
    }
    Ok(())
}
