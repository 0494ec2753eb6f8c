//! Seal (mint) flow: encrypt a document for its owner and produce the
//! metadata that becomes the token URI.

use std::collections::BTreeMap;

use docseal_core::{DocsealError, DocsealResult};
use docseal_crypto::{
    address, aes_gcm_encrypt, derive_nonce, encode, generate_dek, join, sha256_b64, wrap_dek,
    WalletSigner,
};
use docseal_storage::ContentStore;
use tracing::{debug, info};

use crate::binding::{bind_ciphertext, integrity_chunk};
use crate::metadata::{
    Attribute, DocumentMetadata, MapEntry, WrappedDeks, WrappedKeyEntry, TRAIT_COUNTER,
    TRAIT_FILE_TYPE, TRAIT_TIMESTAMP,
};

#[derive(Debug, Clone)]
pub struct SealRequest {
    pub name: String,
    pub description: String,
    /// MIME type recorded as the `File Type` attribute
    pub file_type: String,
    pub timestamp: String,
    pub counter: String,
}

#[derive(Debug, Clone)]
pub struct SealedDocument {
    pub metadata: DocumentMetadata,
    /// Content id of the stored metachunk
    pub cid: String,
}

/// Encrypt `plaintext` under a fresh DEK, bind it to the signer's address and
/// store the metachunk.
pub async fn seal_document<S: WalletSigner>(
    signer: &S,
    plaintext: &[u8],
    request: &SealRequest,
    store: &ContentStore,
) -> DocsealResult<SealedDocument> {
    let owner = address::to_checksum(&signer.address())?;
    let (timestamp, counter) = (request.timestamp.as_str(), request.counter.as_str());
    if timestamp.is_empty() || counter.is_empty() {
        return Err(DocsealError::MissingAttributes(
            [(TRAIT_TIMESTAMP, timestamp), (TRAIT_COUNTER, counter)]
                .into_iter()
                .filter(|(_, v)| v.is_empty())
                .map(|(k, _)| k)
                .collect::<Vec<_>>()
                .join(", "),
        ));
    }

    let nonce = derive_nonce(&owner, timestamp, counter);
    let dek = generate_dek();
    let ciphertext = aes_gcm_encrypt(dek.as_bytes(), plaintext, &nonce)?;
    let wrapped_dek = wrap_dek(signer, &dek, &nonce)
        .await
        .map_err(|e| DocsealError::Other(e.context("wrapping DEK for owner")))?;

    let chunk_a = bind_ciphertext(&ciphertext, &owner, timestamp, counter);
    let chunk_b = integrity_chunk(plaintext, &owner, timestamp, &ciphertext)?;
    let merged = join(&[&chunk_a, &chunk_b])
        .map_err(|e| DocsealError::InvalidMetachunkFormat(format!("{e:#}; retry with another counter")))?;
    let metachunk = encode(&merged);

    let cid = store
        .put(&metachunk)
        .await
        .map_err(|e| DocsealError::Storage(format!("{e:#}")))?;
    debug!(cid = %cid, bytes = metachunk.len(), "metachunk stored");

    let mut holders = BTreeMap::new();
    holders.insert(
        owner.to_ascii_lowercase(),
        MapEntry::Entry(WrappedKeyEntry {
            wrapped_dek: Some(wrapped_dek),
            dek_sha256_b64: Some(sha256_b64(dek.as_bytes())),
            ..Default::default()
        }),
    );

    let metadata = DocumentMetadata {
        name: request.name.clone(),
        description: request.description.clone(),
        attributes: vec![
            Attribute::new(TRAIT_FILE_TYPE, request.file_type.clone()),
            Attribute::new(TRAIT_TIMESTAMP, timestamp),
            Attribute::new(TRAIT_COUNTER, counter),
        ],
        encrypted_file_cid: Some(cid.clone()),
        nonce: Some(format!("0x{}", hex::encode(nonce))),
        wrapped_deks: Some(WrappedDeks::ByAddress(holders)),
        bound_address: Some(owner.clone()),
        encrypted_data_sha256_b64: Some(sha256_b64(&ciphertext)),
        extra: Default::default(),
    };

    info!(owner = %owner, cid = %cid, bytes = plaintext.len(), "document sealed");
    Ok(SealedDocument { metadata, cid })
}
