//! Document metadata: the token-URI JSON that describes a sealed document.
//!
//! ```json
//! {
//!   "name": "...", "description": "...",
//!   "attributes": [{"trait_type": "Tokenization Date", "value": "..."}, ...],
//!   "encrypted_file_cid": "...",
//!   "nonce": "0x0102...0c",
//!   "wrapped_deks": { "0xabc...": { "wrapped_dek": "..." } }
//! }
//! ```
//!
//! `wrapped_deks` comes in two shapes (object keyed by lowercase address, or
//! an array of entries carrying `address`). Both are kept as written so a
//! share rewrite preserves the shape; [`WrappedDeks::entries`] gives a single
//! normalized view. Unknown fields are carried through untouched.

use std::collections::BTreeMap;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use docseal_core::{DocsealError, DocsealResult};
use docseal_crypto::NONCE_SIZE;
use docseal_storage::ContentStore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Prefix of an inline JSON token URI.
pub const DATA_URI_PREFIX: &str = "data:application/json;base64,";

pub const TRAIT_TIMESTAMP: &str = "Tokenization Date";
pub const TRAIT_COUNTER: &str = "Counter";
pub const TRAIT_FILE_TYPE: &str = "File Type";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_file_cid: Option<String>,
    #[serde(default, alias = "nonce_hex", skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapped_deks: Option<WrappedDeks>,
    /// Address the metachunk was XOR-bound to at seal time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_data_sha256_b64: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Display attribute. Either field may be absent in third-party metadata;
/// nameless attributes are kept but never match a lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trait_type: String,
    #[serde(default)]
    pub value: Value,
}

impl Attribute {
    pub fn new(trait_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            trait_type: trait_type.into(),
            value: Value::String(value.into()),
        }
    }

    /// The value as text. Numbers and booleans are rendered; null is absent.
    pub fn value_string(&self) -> Option<String> {
        match &self.value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// A holder's wrapped DEK and the fields that select its unwrap strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WrappedKeyEntry {
    /// Holder address; only present in the array shape
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, alias = "wrappedDek", skip_serializing_if = "Option::is_none")]
    pub wrapped_dek: Option<String>,
    #[serde(
        default,
        alias = "ownerSignature",
        alias = "owner_sig",
        skip_serializing_if = "Option::is_none"
    )]
    pub owner_signature: Option<String>,
    #[serde(
        default,
        alias = "ownerEphemPubKey",
        alias = "ownerEphemeralPubKey",
        skip_serializing_if = "Option::is_none"
    )]
    pub owner_ephemeral_pubkey: Option<String>,
    /// Opaque provider payload: a JSON string or an inline JSON object
    #[serde(
        default,
        alias = "providerEncrypted",
        alias = "provider",
        skip_serializing_if = "Option::is_none"
    )]
    pub provider_encrypted: Option<Value>,
    #[serde(
        default,
        alias = "dekSha256B64",
        alias = "dek_sha",
        skip_serializing_if = "Option::is_none"
    )]
    pub dek_sha256_b64: Option<String>,
    #[serde(default, alias = "nonce_hex", skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// `Some(None)` is an explicit `null`, written when the share-time
    /// checksum could not be computed.
    #[serde(
        default,
        deserialize_with = "explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub encrypted_data_sha256_b64: Option<Option<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Keeps a present-but-null field distinct from an absent one.
fn explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl WrappedKeyEntry {
    /// Share-time ciphertext checksum, if one was recorded.
    pub fn ciphertext_checksum(&self) -> Option<&str> {
        self.encrypted_data_sha256_b64.as_ref()?.as_deref()
    }

    /// Provider payload as the string handed to the wallet.
    pub fn provider_payload(&self) -> Option<String> {
        match self.provider_encrypted.as_ref()? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Object-shape map value: a full entry, just the wrapped DEK hex, or
/// `null` for a holder with no key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MapEntry {
    Null,
    Bare(String),
    Entry(WrappedKeyEntry),
}

impl MapEntry {
    fn to_entry(&self) -> Option<WrappedKeyEntry> {
        match self {
            Self::Null => None,
            Self::Bare(hex) => Some(WrappedKeyEntry {
                wrapped_dek: Some(hex.clone()),
                ..Default::default()
            }),
            Self::Entry(entry) => Some(entry.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WrappedDeks {
    ByAddress(BTreeMap<String, MapEntry>),
    List(Vec<WrappedKeyEntry>),
}

impl WrappedDeks {
    /// Normalized `(lowercase address, entry)` view in document order.
    /// Array entries without an address and `null` map values are skipped.
    pub fn entries(&self) -> Vec<(String, WrappedKeyEntry)> {
        match self {
            Self::ByAddress(map) => map
                .iter()
                .filter_map(|(addr, value)| Some((addr.to_ascii_lowercase(), value.to_entry()?)))
                .collect(),
            Self::List(list) => list
                .iter()
                .filter_map(|entry| {
                    let addr = entry.address.as_deref()?.to_ascii_lowercase();
                    Some((addr, entry.clone()))
                })
                .collect(),
        }
    }

    /// Holder addresses (lowercase) in document order, including holders
    /// whose map value is `null`.
    pub fn holders(&self) -> Vec<String> {
        match self {
            Self::ByAddress(map) => map.keys().map(|addr| addr.to_ascii_lowercase()).collect(),
            Self::List(_) => self.entries().into_iter().map(|(addr, _)| addr).collect(),
        }
    }

    /// Case-insensitive lookup, so raw and checksummed forms both match.
    pub fn find(&self, address: &str) -> Option<WrappedKeyEntry> {
        let wanted = address.to_ascii_lowercase();
        self.entries()
            .into_iter()
            .find(|(addr, _)| *addr == wanted)
            .map(|(_, entry)| entry)
    }

    /// Add or replace the entry for `address`, keeping the current shape.
    pub fn upsert(&mut self, address: &str, mut entry: WrappedKeyEntry) {
        let key = address.to_ascii_lowercase();
        match self {
            Self::ByAddress(map) => {
                entry.address = None;
                map.retain(|existing, _| existing.to_ascii_lowercase() != key);
                map.insert(key, MapEntry::Entry(entry));
            }
            Self::List(list) => {
                entry.address = Some(key.clone());
                let existing = list.iter_mut().find(|e| {
                    e.address
                        .as_deref()
                        .is_some_and(|a| a.to_ascii_lowercase() == key)
                });
                match existing {
                    Some(slot) => *slot = entry,
                    None => list.push(entry),
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentMetadata {
    /// Attribute value by trait name, case-insensitive. Entries without a
    /// usable value are skipped.
    pub fn attribute(&self, trait_type: &str) -> Option<String> {
        self.attributes
            .iter()
            .filter(|a| !a.trait_type.is_empty() && a.trait_type.eq_ignore_ascii_case(trait_type))
            .find_map(Attribute::value_string)
    }

    /// Mint timestamp: `Tokenization Date`, else any trait whose name contains "date".
    pub fn timestamp(&self) -> Option<String> {
        self.attribute(TRAIT_TIMESTAMP).or_else(|| {
            self.attributes
                .iter()
                .filter(|a| a.trait_type.to_ascii_lowercase().contains("date"))
                .find_map(Attribute::value_string)
        })
    }

    pub fn counter(&self) -> Option<String> {
        self.attribute(TRAIT_COUNTER)
    }

    pub fn file_type(&self) -> Option<String> {
        self.attribute(TRAIT_FILE_TYPE)
    }

    /// Timestamp and counter, or `MissingAttributes` naming what is absent.
    pub fn binding_attributes(&self) -> DocsealResult<(String, String)> {
        match (self.timestamp(), self.counter()) {
            (Some(ts), Some(counter)) => Ok((ts, counter)),
            (ts, counter) => {
                let mut missing = Vec::new();
                if ts.is_none() {
                    missing.push(TRAIT_TIMESTAMP);
                }
                if counter.is_none() {
                    missing.push(TRAIT_COUNTER);
                }
                Err(DocsealError::MissingAttributes(missing.join(", ")))
            }
        }
    }

    /// The caller's entry, or `AccessDenied`.
    pub fn entry_for(&self, address: &str) -> DocsealResult<WrappedKeyEntry> {
        self.wrapped_deks
            .as_ref()
            .and_then(|deks| deks.find(address))
            .ok_or_else(|| DocsealError::AccessDenied(address.to_string()))
    }

    /// Nonce for `entry`: entry-level first, then top-level.
    pub fn resolve_nonce(&self, entry: &WrappedKeyEntry) -> DocsealResult<[u8; NONCE_SIZE]> {
        let raw = [entry.nonce.as_deref(), self.nonce.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
            .ok_or(DocsealError::NonceMissing)?;
        parse_nonce(raw)
    }

    pub fn to_json(&self) -> DocsealResult<String> {
        serde_json::to_string(self)
            .map_err(|e| DocsealError::Other(anyhow::anyhow!("serializing metadata: {e}")))
    }

    pub fn from_json(json: &[u8]) -> DocsealResult<Self> {
        serde_json::from_slice(json)
            .map_err(|e| DocsealError::MetadataLoadFailed(format!("invalid metadata JSON: {e}")))
    }

    /// `data:application/json;base64,…` token URI for this metadata.
    pub fn to_data_uri(&self) -> DocsealResult<String> {
        Ok(format!("{DATA_URI_PREFIX}{}", STANDARD.encode(self.to_json()?)))
    }

    pub fn from_data_uri(uri: &str) -> DocsealResult<Self> {
        let encoded = uri.trim().strip_prefix(DATA_URI_PREFIX).ok_or_else(|| {
            DocsealError::MetadataLoadFailed("not a base64 JSON data URI".into())
        })?;
        let json = STANDARD
            .decode(encoded)
            .map_err(|e| DocsealError::MetadataLoadFailed(format!("invalid base64: {e}")))?;
        Self::from_json(&json)
    }
}

/// Parse a hex nonce (`0x` optional) and require exactly 12 bytes.
pub fn parse_nonce(raw: &str) -> DocsealResult<[u8; NONCE_SIZE]> {
    let body = raw.strip_prefix("0x").unwrap_or(raw);
    let bytes = hex::decode(body).map_err(|e| DocsealError::InvalidNonceHex(e.to_string()))?;
    <[u8; NONCE_SIZE]>::try_from(bytes.as_slice())
        .map_err(|_| DocsealError::InvalidNonceLength(bytes.len()))
}

/// Where to load metadata from.
#[derive(Debug, Clone)]
pub enum MetadataSource {
    /// Content id in the store (`ipfs://` accepted)
    Cid(String),
    /// `http(s)://` URL
    Url(String),
    /// `data:application/json;base64,…`
    DataUri(String),
    File(PathBuf),
    Inline(Box<DocumentMetadata>),
}

impl MetadataSource {
    /// Classify a user-supplied string. Existing local paths win over bare ids.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.starts_with("data:") {
            Self::DataUri(input.to_string())
        } else if input.starts_with("http://") || input.starts_with("https://") {
            Self::Url(input.to_string())
        } else if input.starts_with("ipfs://") {
            Self::Cid(input.to_string())
        } else if std::path::Path::new(input).exists() {
            Self::File(PathBuf::from(input))
        } else {
            Self::Cid(input.to_string())
        }
    }
}

/// Load and parse metadata. Every failure is `MetadataLoadFailed`.
pub async fn load_metadata(
    source: &MetadataSource,
    store: &ContentStore,
) -> DocsealResult<DocumentMetadata> {
    let load_failed = |e: anyhow::Error| DocsealError::MetadataLoadFailed(format!("{e:#}"));
    match source {
        MetadataSource::Inline(metadata) => Ok((**metadata).clone()),
        MetadataSource::DataUri(uri) => DocumentMetadata::from_data_uri(uri),
        MetadataSource::Cid(cid) => {
            debug!(cid = %cid, "loading metadata from store");
            let bytes = store.fetch(cid).await.map_err(load_failed)?;
            DocumentMetadata::from_json(&bytes)
        }
        MetadataSource::File(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| load_failed(anyhow::anyhow!("reading {}: {e}", path.display())))?;
            DocumentMetadata::from_json(&bytes)
        }
        MetadataSource::Url(url) => {
            debug!(url = %url, "loading metadata over HTTP");
            let bytes = fetch_url(url, store).await.map_err(load_failed)?;
            DocumentMetadata::from_json(&bytes)
        }
    }
}

async fn fetch_url(url: &str, store: &ContentStore) -> anyhow::Result<Vec<u8>> {
    let scheme_end = url
        .find("://")
        .ok_or_else(|| anyhow::anyhow!("invalid URL: {url}"))?
        + 3;
    let (origin, path) = match url[scheme_end..].find('/') {
        Some(i) => url.split_at(scheme_end + i),
        None => (url, "/"),
    };
    let builder = opendal::services::Http::default().endpoint(origin);
    let op = opendal::Operator::new(builder)?.finish();

    let read = op.read(path);
    let buffer = match store.fetch_timeout() {
        Some(limit) => tokio::time::timeout(limit, read)
            .await
            .map_err(|_| anyhow::anyhow!("timed out after {}s", limit.as_secs()))?,
        None => read.await,
    }
    .map_err(|e| anyhow::anyhow!("GET {url}: {e}"))?;
    Ok(buffer.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> DocumentMetadata {
        serde_json::from_value(json!({
            "name": "Lease",
            "description": "signed lease",
            "image": "ipfs://preview",
            "attributes": [
                {"trait_type": "Tokenization Date", "value": "2024-01-01T00:00:00Z"},
                {"trait_type": "Counter", "value": 1},
                {"trait_type": "File Type", "value": "text/plain"}
            ],
            "encrypted_file_cid": "bafy",
            "nonce": "0x0102030405060708090a0b0c",
            "wrapped_deks": {
                "0xabc0000000000000000000000000000000000001": {"wrapped_dek": "aa"},
                "0xdef0000000000000000000000000000000000002": "bb"
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_attributes_lookup() {
        let m = sample();
        assert_eq!(m.timestamp().as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(m.counter().as_deref(), Some("1"), "numeric values render as text");
        assert_eq!(m.attribute("file type").as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_timestamp_falls_back_to_any_date_trait() {
        let mut m = sample();
        m.attributes[0].trait_type = "Mint Date".into();
        assert_eq!(m.timestamp().as_deref(), Some("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn test_missing_attributes_named() {
        let mut m = sample();
        m.attributes.retain(|a| a.trait_type == "File Type");
        match m.binding_attributes() {
            Err(DocsealError::MissingAttributes(what)) => {
                assert!(what.contains("Tokenization Date"));
                assert!(what.contains("Counter"));
            }
            other => panic!("expected MissingAttributes, got {other:?}"),
        }
    }

    #[test]
    fn test_object_shape_lookup_is_case_insensitive() {
        let m = sample();
        let entry = m
            .entry_for("0xABC0000000000000000000000000000000000001")
            .unwrap();
        assert_eq!(entry.wrapped_dek.as_deref(), Some("aa"));
    }

    #[test]
    fn test_bare_string_entry() {
        let m = sample();
        let entry = m
            .entry_for("0xdef0000000000000000000000000000000000002")
            .unwrap();
        assert_eq!(entry.wrapped_dek.as_deref(), Some("bb"));
    }

    #[test]
    fn test_access_denied_for_unknown_holder() {
        let m = sample();
        assert!(matches!(
            m.entry_for("0x9990000000000000000000000000000000000009"),
            Err(DocsealError::AccessDenied(_))
        ));
    }

    #[test]
    fn test_array_shape_with_aliases() {
        let m: DocumentMetadata = serde_json::from_value(json!({
            "wrapped_deks": [
                {"address": "0xAbC0000000000000000000000000000000000001",
                 "wrappedDek": "cc", "ownerSignature": "0x11", "dekSha256B64": "c2hh",
                 "nonce_hex": "0c0b0a090807060504030201"},
                {"wrapped_dek": "no address, skipped"}
            ]
        }))
        .unwrap();

        let deks = m.wrapped_deks.as_ref().unwrap();
        assert_eq!(deks.holders(), vec!["0xabc0000000000000000000000000000000000001"]);

        let entry = m.entry_for("0xabc0000000000000000000000000000000000001").unwrap();
        assert_eq!(entry.wrapped_dek.as_deref(), Some("cc"));
        assert_eq!(entry.owner_signature.as_deref(), Some("0x11"));
        assert_eq!(entry.dek_sha256_b64.as_deref(), Some("c2hh"));
        assert_eq!(m.resolve_nonce(&entry).unwrap()[0], 0x0c);
    }

    #[test]
    fn test_nameless_attribute_is_skipped() {
        let m: DocumentMetadata = serde_json::from_value(json!({
            "attributes": [
                {"value": "preview"},
                {"trait_type": "Tokenization Date", "value": "2024-01-01T00:00:00Z"},
                {"trait_type": "Counter"},
                {"trait_type": "Counter", "value": "4"}
            ]
        }))
        .unwrap();
        assert_eq!(m.attributes.len(), 4);
        assert_eq!(m.attributes[2].value, Value::Null);
        assert_eq!(
            m.binding_attributes().unwrap(),
            ("2024-01-01T00:00:00Z".to_string(), "4".to_string()),
            "a valueless Counter falls through to the next one"
        );

        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["attributes"][0], json!({"value": "preview"}));
    }

    #[test]
    fn test_null_map_value_only_affects_that_holder() {
        let m: DocumentMetadata = serde_json::from_value(json!({
            "wrapped_deks": {
                "0xabc0000000000000000000000000000000000001": null,
                "0xdef0000000000000000000000000000000000002": {"wrapped_dek": "bb"}
            }
        }))
        .unwrap();
        let deks = m.wrapped_deks.as_ref().unwrap();
        assert_eq!(deks.len(), 1);
        assert_eq!(deks.holders().len(), 2);
        assert!(matches!(
            m.entry_for("0xabc0000000000000000000000000000000000001"),
            Err(DocsealError::AccessDenied(_))
        ));
        assert_eq!(
            m.entry_for("0xdef0000000000000000000000000000000000002")
                .unwrap()
                .wrapped_dek
                .as_deref(),
            Some("bb")
        );

        let json = serde_json::to_value(&m).unwrap();
        assert!(json["wrapped_deks"]["0xabc0000000000000000000000000000000000001"].is_null());
    }

    #[test]
    fn test_entry_checksum_null_is_written_back() {
        let entry: WrappedKeyEntry =
            serde_json::from_value(json!({"wrapped_dek": "aa", "encrypted_data_sha256_b64": null}))
                .unwrap();
        assert_eq!(entry.encrypted_data_sha256_b64, Some(None));
        assert_eq!(entry.ciphertext_checksum(), None);
        assert!(serde_json::to_value(&entry).unwrap()["encrypted_data_sha256_b64"].is_null());
        assert!(serde_json::to_value(&entry)
            .unwrap()
            .as_object()
            .unwrap()
            .contains_key("encrypted_data_sha256_b64"));

        let absent: WrappedKeyEntry = serde_json::from_value(json!({"wrapped_dek": "aa"})).unwrap();
        assert_eq!(absent.encrypted_data_sha256_b64, None);
        assert!(!serde_json::to_value(&absent)
            .unwrap()
            .as_object()
            .unwrap()
            .contains_key("encrypted_data_sha256_b64"));
    }

    #[test]
    fn test_provider_payload_forms() {
        let entry: WrappedKeyEntry =
            serde_json::from_value(json!({"provider": {"ciphertext": "x"}})).unwrap();
        assert_eq!(entry.provider_payload().as_deref(), Some(r#"{"ciphertext":"x"}"#));

        let entry: WrappedKeyEntry =
            serde_json::from_value(json!({"providerEncrypted": "{\"a\":1}"})).unwrap();
        assert_eq!(entry.provider_payload().as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn test_upsert_preserves_object_shape() {
        let mut m = sample();
        let deks = m.wrapped_deks.as_mut().unwrap();
        deks.upsert(
            "0x1110000000000000000000000000000000000003",
            WrappedKeyEntry {
                wrapped_dek: Some("dd".into()),
                ..Default::default()
            },
        );
        assert!(matches!(deks, WrappedDeks::ByAddress(_)));
        assert_eq!(deks.len(), 3);

        let json = serde_json::to_value(&m).unwrap();
        assert!(json["wrapped_deks"]["0x1110000000000000000000000000000000000003"].is_object());
        assert_eq!(json["wrapped_deks"]["0xdef0000000000000000000000000000000000002"], "bb");
    }

    #[test]
    fn test_upsert_preserves_array_shape_and_replaces() {
        let mut deks = WrappedDeks::List(vec![WrappedKeyEntry {
            address: Some("0xAAA0000000000000000000000000000000000001".into()),
            wrapped_dek: Some("old".into()),
            ..Default::default()
        }]);
        let entry = WrappedKeyEntry {
            wrapped_dek: Some("new".into()),
            ..Default::default()
        };
        deks.upsert("0xbbb0000000000000000000000000000000000002", entry.clone());
        deks.upsert("0xaaa0000000000000000000000000000000000001", entry);

        match &deks {
            WrappedDeks::List(list) => {
                assert_eq!(list.len(), 2);
                assert_eq!(list[0].wrapped_dek.as_deref(), Some("new"));
                assert_eq!(
                    list[1].address.as_deref(),
                    Some("0xbbb0000000000000000000000000000000000002")
                );
            }
            other => panic!("shape changed: {other:?}"),
        }
    }

    #[test]
    fn test_nonce_resolution() {
        let m = sample();
        let mut entry = m.entry_for("0xabc0000000000000000000000000000000000001").unwrap();
        assert_eq!(m.resolve_nonce(&entry).unwrap(), [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);

        entry.nonce = Some("0x0102".into());
        assert!(matches!(
            m.resolve_nonce(&entry),
            Err(DocsealError::InvalidNonceLength(2))
        ));

        entry.nonce = Some("zz".into());
        assert!(matches!(m.resolve_nonce(&entry), Err(DocsealError::InvalidNonceHex(_))));

        let bare = DocumentMetadata {
            nonce: Some(String::new()),
            ..Default::default()
        };
        assert!(matches!(
            bare.resolve_nonce(&WrappedKeyEntry::default()),
            Err(DocsealError::NonceMissing)
        ));
    }

    #[test]
    fn test_data_uri_roundtrip_keeps_unknown_fields() {
        let m = sample();
        let uri = m.to_data_uri().unwrap();
        assert!(uri.starts_with(DATA_URI_PREFIX));

        let back = DocumentMetadata::from_data_uri(&uri).unwrap();
        assert_eq!(back.extra.get("image"), Some(&json!("ipfs://preview")));
        assert_eq!(back.wrapped_deks, m.wrapped_deks);
    }

    #[test]
    fn test_from_data_uri_rejects_other_uris() {
        assert!(matches!(
            DocumentMetadata::from_data_uri("ipfs://bafy"),
            Err(DocsealError::MetadataLoadFailed(_))
        ));
    }

    #[test]
    fn test_source_parse() {
        assert!(matches!(MetadataSource::parse("ipfs://bafy"), MetadataSource::Cid(_)));
        assert!(matches!(MetadataSource::parse("bafy"), MetadataSource::Cid(_)));
        assert!(matches!(
            MetadataSource::parse("https://gw.example/ipfs/bafy"),
            MetadataSource::Url(_)
        ));
        assert!(matches!(
            MetadataSource::parse("data:application/json;base64,e30="),
            MetadataSource::DataUri(_)
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        std::fs::write(&path, "{}").unwrap();
        assert!(matches!(
            MetadataSource::parse(&path.to_string_lossy()),
            MetadataSource::File(_)
        ));
    }

    #[tokio::test]
    async fn test_load_from_store_and_file() {
        let op = opendal::Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();
        let store = ContentStore::new(op);
        let json = sample().to_json().unwrap();
        let cid = store.put(json.as_bytes()).await.unwrap();

        let m = load_metadata(&MetadataSource::Cid(format!("ipfs://{cid}")), &store)
            .await
            .unwrap();
        assert_eq!(m.name, "Lease");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        std::fs::write(&path, &json).unwrap();
        let m = load_metadata(&MetadataSource::File(path), &store).await.unwrap();
        assert_eq!(m.description, "signed lease");

        let err = load_metadata(&MetadataSource::Cid("missing".into()), &store)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "MetadataLoadFailed");
    }
}
