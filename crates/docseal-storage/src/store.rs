//! Content store: fetch and put blobs by content id

use std::time::Duration;

use anyhow::{Context, Result};
use opendal::Operator;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Content id for `data`: lowercase hex SHA-256.
pub fn content_id(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Blob store addressed by content id. Wraps an OpenDAL operator and applies
/// an optional fetch deadline.
#[derive(Clone, Debug)]
pub struct ContentStore {
    op: Operator,
    fetch_timeout: Option<Duration>,
}

impl ContentStore {
    pub fn new(op: Operator) -> Self {
        Self {
            op,
            fetch_timeout: None,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout
    }

    /// Fetch a blob. Accepts bare ids and `ipfs://` URIs.
    pub async fn fetch(&self, cid: &str) -> Result<Vec<u8>> {
        let path = object_path(cid)?;
        debug!(cid = %path, "fetching content");

        let read = self.op.read(&path);
        let buffer = match self.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| anyhow::anyhow!("timed out after {}s", limit.as_secs()))?,
            None => read.await,
        }
        .with_context(|| format!("reading {path}"))?;

        Ok(buffer.to_vec())
    }

    /// Store a blob under its content id and return the id.
    pub async fn put(&self, data: &[u8]) -> Result<String> {
        let cid = content_id(data);
        self.op
            .write(&cid, data.to_vec())
            .await
            .with_context(|| format!("writing {cid}"))?;
        debug!(cid = %cid, bytes = data.len(), "stored content");
        Ok(cid)
    }
}

/// Object path for a content id: strips `ipfs://` and leading slashes.
pub fn object_path(cid: &str) -> Result<String> {
    let trimmed = cid.trim();
    let bare = trimmed.strip_prefix("ipfs://").unwrap_or(trimmed);
    let bare = bare.strip_prefix("ipfs/").unwrap_or(bare).trim_start_matches('/');
    if bare.is_empty() {
        anyhow::bail!("empty content id");
    }
    Ok(bare.to_string())
}
