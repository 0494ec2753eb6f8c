//! OpenDAL Operator factory for docseal storage backends

use anyhow::{Context, Result};
use docseal_core::config::{GatewayConfig, StorageBackend, StorageConfig};
use opendal::Operator;
use std::path::{Path, PathBuf};

/// S3 access keys, loaded by the caller (never stored in config)
#[derive(Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

/// Build an Operator for the configured backend.
///
/// `credentials` is only consulted for the S3 backend, where it is required.
pub fn build_operator(
    storage: &StorageConfig,
    gateway: &GatewayConfig,
    credentials: Option<&S3Credentials>,
) -> Result<Operator> {
    let op = match storage.backend {
        StorageBackend::Gateway => {
            let builder = opendal::services::Http::default()
                .endpoint(&gateway.endpoint)
                .root(&gateway.root);
            Operator::new(builder).context("creating OpenDAL HTTP gateway operator")?.finish()
        }
        StorageBackend::Fs => {
            let root = expand_home(&storage.root);
            let builder = opendal::services::Fs::default().root(&root.to_string_lossy());
            Operator::new(builder).context("creating OpenDAL fs operator")?.finish()
        }
        StorageBackend::S3 => {
            let creds = credentials.context(
                "S3 backend requires credentials (AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY)",
            )?;
            check_tls(storage)?;
            // Path-style addressing (opendal default) is what SeaweedFS and MinIO expect
            let builder = opendal::services::S3::default()
                .endpoint(&storage.endpoint)
                .region(&storage.region)
                .bucket(&storage.bucket)
                .access_key_id(&creds.access_key_id)
                .secret_access_key(&creds.secret_access_key);
            Operator::new(builder).context("creating OpenDAL S3 operator")?.finish()
        }
        StorageBackend::Memory => Operator::new(opendal::services::Memory::default())
            .context("creating OpenDAL memory operator")?
            .finish(),
    };

    Ok(op
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        ))
}

/// If `enforce_tls` is true and the endpoint uses HTTP, this returns an error.
/// Otherwise, a warning is logged for non-HTTPS endpoints.
fn check_tls(storage: &StorageConfig) -> Result<()> {
    if storage.endpoint.starts_with("http://") {
        if storage.enforce_tls {
            anyhow::bail!(
                "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                storage.endpoint
            );
        }
        tracing::warn!(
            endpoint = %storage.endpoint,
            "S3 endpoint uses plaintext HTTP; credentials are transmitted unencrypted"
        );
    }
    Ok(())
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}
