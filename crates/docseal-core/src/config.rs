use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration (loaded from docseal.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocsealConfig {
    pub gateway: GatewayConfig,
    pub storage: StorageConfig,
    pub wallet: WalletConfig,
    pub timeouts: TimeoutConfig,
    pub registry: RegistryConfig,
    pub logging: LoggingConfig,
}

/// Read-only IPFS gateway used to resolve content ids
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Gateway base URL (default: https://ipfs.io)
    pub endpoint: String,
    /// Path under the endpoint where content ids live (default: /ipfs/)
    pub root: String,
}

/// Content store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Read-only HTTP gateway (see [gateway])
    Gateway,
    /// Local directory
    Fs,
    /// S3-compatible bucket
    S3,
    /// Process-local, for tests and dry runs
    Memory,
}

impl StorageBackend {
    /// Whether `put` works; the gateway backend is read-only.
    pub fn is_writable(self) -> bool {
        !matches!(self, Self::Gateway)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory for the fs backend
    pub root: PathBuf,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// S3 bucket
    pub bucket: String,
    /// Refuse plaintext HTTP S3 endpoints
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Environment variable holding the hex-encoded secp256k1 private key
    pub key_env: String,
}

/// Deadlines for suspension points. Zero disables the deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Content fetch from the store or gateway
    pub fetch_secs: u64,
    /// Wallet signature / decrypt prompt
    pub signature_secs: u64,
    /// Token URI update confirmation
    pub confirmation_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Object prefix holding token URI records
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl DocsealConfig {
    /// Load from a TOML file, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "config file not found (using defaults)");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    }
}

impl TimeoutConfig {
    pub fn fetch(&self) -> Option<Duration> {
        non_zero_secs(self.fetch_secs)
    }

    pub fn signature(&self) -> Option<Duration> {
        non_zero_secs(self.signature_secs)
    }

    pub fn confirmation(&self) -> Option<Duration> {
        non_zero_secs(self.confirmation_secs)
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://ipfs.io".into(),
            root: "/ipfs/".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Gateway,
            root: PathBuf::from("~/.local/share/docseal/store"),
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "docseal".into(),
            enforce_tls: false,
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            key_env: "DOCSEAL_WALLET_KEY".into(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            fetch_secs: 60,
            signature_secs: 120,
            confirmation_secs: 300,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            prefix: "tokens".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[gateway]
endpoint = "https://gateway.pinata.cloud"
root = "/ipfs/"

[storage]
backend = "s3"
endpoint = "https://s3.example.com:8333"
region = "eu-west-1"
bucket = "sealed-docs"
enforce_tls = true

[wallet]
key_env = "MY_WALLET_KEY"

[timeouts]
fetch_secs = 10
signature_secs = 0
confirmation_secs = 600

[registry]
prefix = "nft/tokens"

[logging]
level = "debug"
format = "json"
"#;
        let config: DocsealConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.gateway.endpoint, "https://gateway.pinata.cloud");
        assert_eq!(config.storage.backend, StorageBackend::S3);
        assert_eq!(config.storage.bucket, "sealed-docs");
        assert!(config.storage.enforce_tls);
        assert_eq!(config.wallet.key_env, "MY_WALLET_KEY");
        assert_eq!(config.timeouts.fetch(), Some(Duration::from_secs(10)));
        assert_eq!(config.timeouts.signature(), None, "zero disables the deadline");
        assert_eq!(config.registry.prefix, "nft/tokens");
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let config: DocsealConfig = toml::from_str("").unwrap();

        assert_eq!(config.gateway.endpoint, "https://ipfs.io");
        assert_eq!(config.gateway.root, "/ipfs/");
        assert_eq!(config.storage.backend, StorageBackend::Gateway);
        assert_eq!(config.wallet.key_env, "DOCSEAL_WALLET_KEY");
        assert_eq!(config.timeouts.signature(), Some(Duration::from_secs(120)));
        assert_eq!(config.timeouts.confirmation(), Some(Duration::from_secs(300)));
        assert_eq!(config.registry.prefix, "tokens");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[storage]
backend = "fs"
root = "/var/lib/docseal"
"#;
        let config: DocsealConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.storage.backend, StorageBackend::Fs);
        assert_eq!(config.storage.root, PathBuf::from("/var/lib/docseal"));
        // Defaults
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.gateway.endpoint, "https://ipfs.io");
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = DocsealConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: DocsealConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.gateway.endpoint, parsed.gateway.endpoint);
        assert_eq!(config.storage.backend, parsed.storage.backend);
        assert_eq!(config.timeouts.signature_secs, parsed.timeouts.signature_secs);
    }

    #[test]
    fn test_only_gateway_is_read_only() {
        assert!(!StorageBackend::Gateway.is_writable());
        for backend in [StorageBackend::Fs, StorageBackend::S3, StorageBackend::Memory] {
            assert!(backend.is_writable(), "{backend:?}");
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docseal.toml");
        std::fs::write(&path, "[wallet]\nkey_env = \"K\"\n").unwrap();

        let config = DocsealConfig::load(&path).unwrap();
        assert_eq!(config.wallet.key_env, "K");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DocsealConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.registry.prefix, "tokens");
    }

    #[test]
    fn test_load_malformed_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[storage]\nbackend = \"floppy\"\n").unwrap();
        let err = DocsealConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parsing config"));
    }
}
