//! Token registry: where a document's token URI lives, with conditional updates
//!
//! `StoreRegistry` keeps one JSON record per token at `{prefix}/{token_id}.json`
//! and one receipt per accepted update at `{prefix}/tx/{hash}.json`. Updates
//! are compare-and-swap on the record version.

use std::future::Future;

use docseal_core::{DocsealError, DocsealResult};
use docseal_crypto::sha256;
use opendal::{ErrorKind, Operator};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Current token URI and its version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub uri: String,
    pub version: u64,
}

/// Confirmation of an accepted update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: String,
    pub token_id: String,
    /// Record version written by this update
    pub version: u64,
    pub success: bool,
}

/// Where token URIs are read and updated.
pub trait TokenRegistry: Send + Sync {
    fn token_uri(&self, token_id: &str) -> impl Future<Output = DocsealResult<TokenRecord>> + Send;

    /// Replace the URI if the record is still at `expected_version`.
    /// Returns the transaction hash.
    fn submit_update(
        &self,
        token_id: &str,
        uri: &str,
        expected_version: u64,
    ) -> impl Future<Output = DocsealResult<String>> + Send;

    fn wait_for_receipt(&self, tx_hash: &str) -> impl Future<Output = DocsealResult<Receipt>> + Send;
}

/// Registry over an OpenDAL operator.
#[derive(Debug)]
pub struct StoreRegistry {
    op: Operator,
    prefix: String,
    write_lock: Mutex<()>,
}

impl StoreRegistry {
    pub fn new(op: Operator, prefix: impl Into<String>) -> Self {
        Self {
            op,
            prefix: prefix.into().trim_matches('/').to_string(),
            write_lock: Mutex::new(()),
        }
    }

    fn record_path(&self, token_id: &str) -> String {
        format!("{}/{token_id}.json", self.prefix)
    }

    fn receipt_path(&self, tx_hash: &str) -> String {
        format!("{}/tx/{tx_hash}.json", self.prefix)
    }

    /// Create the record for a new token at version 1. Fails if it exists.
    pub async fn register(&self, token_id: &str, uri: &str) -> DocsealResult<TokenRecord> {
        let _guard = self.write_lock.lock().await;
        if self.read_record(token_id).await?.is_some() {
            return Err(DocsealError::Storage(format!(
                "token {token_id} is already registered"
            )));
        }
        let record = TokenRecord {
            uri: uri.to_string(),
            version: 1,
        };
        self.write_json(&self.record_path(token_id), &record).await?;
        info!(token_id = %token_id, "registered token");
        Ok(record)
    }

    async fn read_record(&self, token_id: &str) -> DocsealResult<Option<TokenRecord>> {
        let path = self.record_path(token_id);
        match self.op.read(&path).await {
            Ok(buf) => serde_json::from_slice(&buf.to_vec())
                .map(Some)
                .map_err(|e| DocsealError::Storage(format!("corrupt token record {path}: {e}"))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DocsealError::Storage(format!("reading {path}: {e}"))),
        }
    }

    async fn write_json<T: Serialize>(&self, path: &str, value: &T) -> DocsealResult<()> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| DocsealError::Storage(format!("serializing {path}: {e}")))?;
        self.op
            .write(path, bytes)
            .await
            .map(|_| ())
            .map_err(|e| DocsealError::Storage(format!("writing {path}: {e}")))
    }
}

impl TokenRegistry for StoreRegistry {
    async fn token_uri(&self, token_id: &str) -> DocsealResult<TokenRecord> {
        self.read_record(token_id)
            .await?
            .ok_or_else(|| DocsealError::MetadataLoadFailed(format!("unknown token {token_id}")))
    }

    async fn submit_update(
        &self,
        token_id: &str,
        uri: &str,
        expected_version: u64,
    ) -> DocsealResult<String> {
        let _guard = self.write_lock.lock().await;

        let current = self.read_record(token_id).await?.ok_or_else(|| {
            DocsealError::ShareTransactionFailed(format!("unknown token {token_id}"))
        })?;
        if current.version != expected_version {
            return Err(DocsealError::ConcurrentModification {
                token_id: token_id.to_string(),
                expected: expected_version,
                found: current.version,
            });
        }

        let version = current.version + 1;
        let tx_hash = format!(
            "0x{}",
            hex::encode(sha256(format!("{token_id}:{version}:{uri}").as_bytes()))
        );
        self.write_json(
            &self.record_path(token_id),
            &TokenRecord {
                uri: uri.to_string(),
                version,
            },
        )
        .await?;
        self.write_json(
            &self.receipt_path(&tx_hash),
            &Receipt {
                tx_hash: tx_hash.clone(),
                token_id: token_id.to_string(),
                version,
                success: true,
            },
        )
        .await?;

        debug!(token_id = %token_id, version, tx = %tx_hash, "token URI updated");
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> DocsealResult<Receipt> {
        let path = self.receipt_path(tx_hash);
        let buf = self.op.read(&path).await.map_err(|e| {
            DocsealError::ShareTransactionFailed(format!("no receipt for {tx_hash}: {e}"))
        })?;
        serde_json::from_slice(&buf.to_vec())
            .map_err(|e| DocsealError::ShareTransactionFailed(format!("corrupt receipt {path}: {e}")))
    }
}
