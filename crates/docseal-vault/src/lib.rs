//! docseal-vault: metadata model and the seal, decrypt and share pipelines

pub mod binding;
pub mod decrypt;
pub mod metadata;
pub mod registry;
pub mod seal;
pub mod share;
pub mod status;
pub mod unwrap;

pub use decrypt::{DecryptedDocument, DocumentDecryptor, DEFAULT_MIME};
pub use metadata::{
    load_metadata, DocumentMetadata, MetadataSource, WrappedDeks, WrappedKeyEntry,
};
pub use registry::{Receipt, StoreRegistry, TokenRecord, TokenRegistry};
pub use seal::{seal_document, SealRequest, SealedDocument};
pub use share::{DocumentSharer, ShareMethod, ShareReceipt, ShareRequest};
pub use status::{Phase, StatusFn};
pub use unwrap::UnwrapStrategy;
