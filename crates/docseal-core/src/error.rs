use thiserror::Error;

pub type DocsealResult<T> = Result<T, DocsealError>;

/// Failure kinds surfaced by the decrypt, share and seal pipelines.
///
/// Every kind is fatal to the current operation. Messages carry the
/// underlying library error verbatim.
#[derive(Debug, Error)]
pub enum DocsealError {
    #[error("could not fetch metadata bundle: {0}")]
    MetachunkFetchFailed(String),

    #[error("could not load document metadata: {0}")]
    MetadataLoadFailed(String),

    #[error("invalid metadata chunk format: {0}")]
    InvalidMetachunkFormat(String),

    #[error("missing required attributes ({0}) for decryption")]
    MissingAttributes(String),

    #[error("access denied: {0} does not have a key for this document")]
    AccessDenied(String),

    #[error("wrapped DEK not found in metadata entry for {0}")]
    WrappedDekMissing(String),

    #[error("nonce not found in metadata or wrapped entry")]
    NonceMissing,

    #[error("nonce is not valid hex: {0}")]
    InvalidNonceHex(String),

    #[error("invalid nonce length {0}; expected 12 bytes")]
    InvalidNonceLength(usize),

    #[error("{strategy} unwrap failed: {reason}")]
    UnwrapFailed { strategy: String, reason: String },

    #[error("derived DEK mismatch. Ask owner to re-share.")]
    DekMismatch,

    #[error(
        "AES-GCM decrypt failed: {reason} (ciphertext {ciphertext_len} bytes, nonce {nonce_len} bytes)"
    )]
    DecryptionFailed {
        reason: String,
        ciphertext_len: usize,
        nonce_len: usize,
    },

    #[error("verification failed! data may be corrupt or tampered with")]
    IntegrityCheckFailed,

    #[error("share transaction failed: {0}")]
    ShareTransactionFailed(String),

    #[error("token {token_id} changed since it was read (expected version {expected}, found {found})")]
    ConcurrentModification {
        token_id: String,
        expected: u64,
        found: u64,
    },

    #[error("wallet prompt timed out after {0}s")]
    WalletTimeout(u64),

    #[error("operation cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DocsealError {
    pub fn unwrap_failed(strategy: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::UnwrapFailed {
            strategy: strategy.into(),
            reason: reason.to_string(),
        }
    }

    /// Short stable name of the kind, for logs and CLI exit reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MetachunkFetchFailed(_) => "MetachunkFetchFailed",
            Self::MetadataLoadFailed(_) => "MetadataLoadFailed",
            Self::InvalidMetachunkFormat(_) => "InvalidMetachunkFormat",
            Self::MissingAttributes(_) => "MissingAttributes",
            Self::AccessDenied(_) => "AccessDenied",
            Self::WrappedDekMissing(_) => "WrappedDekMissing",
            Self::NonceMissing => "NonceMissing",
            Self::InvalidNonceHex(_) => "InvalidNonceHex",
            Self::InvalidNonceLength(_) => "InvalidNonceLength",
            Self::UnwrapFailed { .. } => "UnwrapFailed",
            Self::DekMismatch => "DekMismatch",
            Self::DecryptionFailed { .. } => "DecryptionFailed",
            Self::IntegrityCheckFailed => "IntegrityCheckFailed",
            Self::ShareTransactionFailed(_) => "ShareTransactionFailed",
            Self::ConcurrentModification { .. } => "ConcurrentModification",
            Self::WalletTimeout(_) => "WalletTimeout",
            Self::Cancelled => "Cancelled",
            Self::Config(_) => "Config",
            Self::Storage(_) => "Storage",
            Self::Io(_) => "Io",
            Self::Other(_) => "Other",
        }
    }
}
