//! docseal: wallet-bound document CLI
//!
//! Commands:
//!   config show                          - display current configuration
//!   seal <file>                          - encrypt a document, store its metachunk, register its token URI
//!   decrypt <source> | --token-id <id>   - decrypt and verify a document this wallet holds a key for
//!   share --token-id <id> --recipient <0x..> - grant a recipient access by re-wrapping the DEK
//!   inspect <source> | --token-id <id>   - list holders, unwrap strategies, and binding attributes

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use docseal_core::config::LoggingConfig;
use docseal_core::{DocsealConfig, DocsealError};
use docseal_crypto::{LocalWallet, WalletSigner};
use docseal_storage::{build_operator, ContentStore, S3Credentials};
use docseal_vault::{
    load_metadata, seal_document, DocumentDecryptor, DocumentMetadata, DocumentSharer,
    MetadataSource, Phase, SealRequest, ShareMethod, ShareRequest, StatusFn, StoreRegistry,
    TokenRegistry, UnwrapStrategy,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "docseal",
    version,
    about = "Seal, decrypt, and share wallet-bound documents",
    long_about = "docseal: encrypt documents under a per-document key wrapped for wallet holders, \
                  verify them on decrypt, and share access by re-wrapping the key"
)]
struct Cli {
    /// Path to docseal.toml configuration file
    #[arg(long, short = 'c', env = "DOCSEAL_CONFIG", default_value = "docseal.toml")]
    config: PathBuf,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, env = "DOCSEAL_LOG")]
    log_level: Option<String>,

    /// Log format: text or json
    #[arg(long, env = "DOCSEAL_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Encrypt a file for the connected wallet and register its token URI
    Seal {
        /// Plaintext file
        file: PathBuf,
        /// MIME type recorded in the `File Type` attribute
        #[arg(long)]
        file_type: String,
        /// Document name (default: file name)
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
        /// Mint timestamp (default: current unix time)
        #[arg(long)]
        timestamp: Option<String>,
        /// Mint counter
        #[arg(long, default_value = "1")]
        counter: String,
        /// Token id to register (default: the metachunk content id)
        #[arg(long)]
        token_id: Option<String>,
    },

    /// Decrypt a document and verify its integrity
    ///
    /// SOURCE may be a content id (ipfs:// accepted), an http(s) URL, a
    /// data:application/json;base64 URI, or a local metadata file.
    Decrypt {
        #[arg(required_unless_present = "token_id", conflicts_with = "token_id")]
        source: Option<String>,
        /// Read the metadata from the token registry instead
        #[arg(long)]
        token_id: Option<String>,
        /// Write plaintext here (text documents default to stdout)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Grant a recipient access to a document
    ///
    /// Without --recipient-pubkey the key is wrapped with an owner signature
    /// bound to the recipient address; with it, by ECDH against that key.
    Share {
        #[arg(long)]
        token_id: String,
        /// Recipient address (0x-prefixed, 40 hex digits)
        #[arg(long)]
        recipient: String,
        /// Recipient secp256k1 public key (hex or base64)
        #[arg(long)]
        recipient_pubkey: Option<String>,
    },

    /// Show holders and key-unwrap strategy per holder
    Inspect {
        #[arg(required_unless_present = "token_id", conflicts_with = "token_id")]
        source: Option<String>,
        #[arg(long)]
        token_id: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = DocsealConfig::load(&cli.config)?;

    let logging = LoggingConfig {
        level: cli.log_level.clone().unwrap_or_else(|| config.logging.level.clone()),
        format: cli.log_format.clone().unwrap_or_else(|| config.logging.format.clone()),
    };
    init_logging(&logging);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    match cli.command {
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
        Commands::Seal {
            file,
            file_type,
            name,
            description,
            timestamp,
            counter,
            token_id,
        } => {
            let request = SealRequest {
                name: name.unwrap_or_else(|| default_name(&file)),
                description,
                file_type,
                timestamp: timestamp.unwrap_or_else(unix_timestamp),
                counter,
            };
            cmd_seal(&config, &file, request, token_id.as_deref()).await
        }
        Commands::Decrypt { source, token_id, out } => {
            cmd_decrypt(&config, source.as_deref(), token_id.as_deref(), out.as_deref(), cancel)
                .await
        }
        Commands::Share {
            token_id,
            recipient,
            recipient_pubkey,
        } => {
            let method = match recipient_pubkey {
                Some(recipient_pubkey) => ShareMethod::EphemeralKey { recipient_pubkey },
                None => ShareMethod::Signature,
            };
            let request = ShareRequest {
                token_id,
                recipient,
                method,
            };
            cmd_share(&config, &request, cancel).await
        }
        Commands::Inspect { source, token_id } => {
            cmd_inspect(&config, source.as_deref(), token_id.as_deref()).await
        }
    }
}

fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    // Logs go to stderr so decrypted text on stdout stays clean
    match logging.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Wallet and storage from environment ───────────────────────────────────────

/// Load the wallet key from the environment variable named in `[wallet]`.
fn load_wallet(config: &DocsealConfig) -> Result<LocalWallet> {
    let var = &config.wallet.key_env;
    let key = std::env::var(var).map(SecretString::from).with_context(|| {
        format!(
            "wallet key not set\n\
             Set {var} to the hex-encoded secp256k1 private key of the wallet.\n\
             Example:\n\
             \texport {var}=0x4c0883a6..."
        )
    })?;
    LocalWallet::from_hex(key.expose_secret()).context("loading wallet key")
}

/// S3 credentials from the standard AWS environment variables, when set.
fn s3_credentials_from_env() -> Option<S3Credentials> {
    let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
        .or_else(|_| std::env::var("DOCSEAL_ACCESS_KEY_ID"))
        .ok()?;
    let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
        .or_else(|_| std::env::var("DOCSEAL_SECRET_ACCESS_KEY"))
        .ok()?;
    Some(S3Credentials {
        access_key_id,
        secret_access_key,
    })
}

fn open_store(config: &DocsealConfig) -> Result<ContentStore> {
    let creds = s3_credentials_from_env();
    let op = build_operator(&config.storage, &config.gateway, creds.as_ref())
        .context("building storage operator")?;
    Ok(ContentStore::new(op).with_fetch_timeout(config.timeouts.fetch()))
}

/// Seal and share write to the store; fail before prompting the wallet.
fn require_writable(config: &DocsealConfig, command: &str) -> Result<()> {
    if !config.storage.backend.is_writable() {
        anyhow::bail!(
            "`{command}` needs a writable storage backend; the {:?} backend is read-only \
             (set [storage] backend = \"fs\", \"s3\" or \"memory\")",
            config.storage.backend
        );
    }
    Ok(())
}

fn open_registry(config: &DocsealConfig, store: &ContentStore) -> StoreRegistry {
    StoreRegistry::new(store.operator().clone(), config.registry.prefix.as_str())
}

/// Metadata from a user-supplied source or from the token registry.
async fn resolve_metadata(
    config: &DocsealConfig,
    store: &ContentStore,
    source: Option<&str>,
    token_id: Option<&str>,
) -> Result<DocumentMetadata> {
    let source = match (source, token_id) {
        (_, Some(id)) => {
            let record = open_registry(config, store)
                .token_uri(id)
                .await
                .map_err(tagged)?;
            MetadataSource::parse(&record.uri)
        }
        (Some(source), None) => MetadataSource::parse(source),
        (None, None) => anyhow::bail!("a metadata source or --token-id is required"),
    };
    load_metadata(&source, store).await.map_err(tagged)
}

/// Surface the failure kind alongside its message.
fn tagged(e: DocsealError) -> anyhow::Error {
    anyhow::anyhow!("[{}] {e}", e.kind())
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Status callback that mirrors pipeline phases onto the spinner.
fn phase_reporter(pb: &ProgressBar) -> StatusFn {
    let pb = pb.clone();
    Box::new(move |phase: Phase| pb.set_message(phase.label()))
}

// ── `docseal config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &DocsealConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── `docseal seal` ────────────────────────────────────────────────────────────

async fn cmd_seal(
    config: &DocsealConfig,
    file: &Path,
    request: SealRequest,
    token_id: Option<&str>,
) -> Result<()> {
    require_writable(config, "seal")?;
    let wallet = load_wallet(config)?;
    let store = open_store(config)?;
    let plaintext = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    println!("Sealing {} for {}", file.display(), wallet.address());

    let pb = make_spinner("seal");
    pb.set_message("encrypting");
    let sealed = seal_document(&wallet, &plaintext, &request, &store)
        .await
        .map_err(tagged)?;

    pb.set_message("registering token URI");
    let token_id = token_id.unwrap_or(sealed.cid.as_str());
    let uri = sealed.metadata.to_data_uri().map_err(tagged)?;
    open_registry(config, &store)
        .register(token_id, &uri)
        .await
        .map_err(tagged)?;
    pb.finish_with_message("done");

    println!("  cid:       {}", sealed.cid);
    println!("  token id:  {token_id}");
    println!("  bytes:     {}", fmt_bytes(plaintext.len() as u64));
    println!("  timestamp: {}", request.timestamp);
    println!("  counter:   {}", request.counter);
    Ok(())
}

// ── `docseal decrypt` ─────────────────────────────────────────────────────────

async fn cmd_decrypt(
    config: &DocsealConfig,
    source: Option<&str>,
    token_id: Option<&str>,
    out: Option<&Path>,
    cancel: CancellationToken,
) -> Result<()> {
    let wallet = load_wallet(config)?;
    let store = open_store(config)?;
    let metadata = resolve_metadata(config, &store, source, token_id).await?;

    let pb = make_spinner("decrypt");
    let decryptor = DocumentDecryptor::new(&wallet, &store)
        .with_signature_timeout(config.timeouts.signature())
        .with_cancellation(cancel)
        .with_status(phase_reporter(&pb));
    let doc = match decryptor.decrypt(&metadata).await {
        Ok(doc) => doc,
        Err(e) => {
            pb.abandon_with_message("failed");
            return Err(tagged(e));
        }
    };
    pb.finish_with_message("verified");

    match out {
        Some(path) => {
            tokio::fs::write(path, &doc.bytes)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("Decrypted:");
            eprintln!("  out:      {}", path.display());
            eprintln!("  bytes:    {}", fmt_bytes(doc.bytes.len() as u64));
            eprintln!("  type:     {}", doc.mime);
            eprintln!("  key via:  {}", doc.strategy);
        }
        None if doc.mime.starts_with("text/") => {
            let text = String::from_utf8_lossy(&doc.bytes);
            print!("{text}");
        }
        None => anyhow::bail!(
            "document is {} ({}); use --out to save it",
            doc.mime,
            fmt_bytes(doc.bytes.len() as u64)
        ),
    }
    Ok(())
}

// ── `docseal share` ───────────────────────────────────────────────────────────

async fn cmd_share(
    config: &DocsealConfig,
    request: &ShareRequest,
    cancel: CancellationToken,
) -> Result<()> {
    require_writable(config, "share")?;
    let wallet = load_wallet(config)?;
    let store = open_store(config)?;
    let registry = open_registry(config, &store);

    println!("Sharing token {} with {}", request.token_id, request.recipient);

    let pb = make_spinner("share");
    let sharer = DocumentSharer::new(&wallet, &store, &registry)
        .with_signature_timeout(config.timeouts.signature())
        .with_confirmation_timeout(config.timeouts.confirmation())
        .with_cancellation(cancel)
        .with_status(phase_reporter(&pb));
    let receipt = match sharer.share(request).await {
        Ok(receipt) => receipt,
        Err(e) => {
            pb.abandon_with_message("failed");
            return Err(tagged(e));
        }
    };
    pb.finish_with_message("confirmed");

    println!("  recipient: {}", receipt.recipient);
    println!("  tx:        {}", receipt.tx_hash);
    println!("  version:   {}", receipt.version);
    if let Some(sum) = &receipt.encrypted_data_sha256_b64 {
        println!("  data sha:  {sum}");
    }
    Ok(())
}

// ── `docseal inspect` ─────────────────────────────────────────────────────────

async fn cmd_inspect(
    config: &DocsealConfig,
    source: Option<&str>,
    token_id: Option<&str>,
) -> Result<()> {
    let store = open_store(config)?;
    let metadata = resolve_metadata(config, &store, source, token_id).await?;
    print!("{}", render_inspect(&metadata));
    Ok(())
}

fn render_inspect(metadata: &DocumentMetadata) -> String {
    let present = |v: Option<String>| v.unwrap_or_else(|| "(missing)".into());
    let mut out = String::new();
    out.push_str(&format!("Document: {}\n", metadata.name));
    out.push_str(&format!("  file type:   {}\n", present(metadata.file_type())));
    out.push_str(&format!("  timestamp:   {}\n", present(metadata.timestamp())));
    out.push_str(&format!("  counter:     {}\n", present(metadata.counter())));
    out.push_str(&format!(
        "  nonce:       {}\n",
        present(metadata.nonce.clone())
    ));
    out.push_str(&format!(
        "  cid:         {}\n",
        present(metadata.encrypted_file_cid.clone())
    ));
    out.push_str(&format!(
        "  bound to:    {}\n",
        present(metadata.bound_address.clone())
    ));

    let entries = metadata
        .wrapped_deks
        .as_ref()
        .map(|d| d.entries())
        .unwrap_or_default();
    out.push_str(&format!("Holders: {}\n", entries.len()));
    for (address, entry) in entries {
        let strategy = UnwrapStrategy::select(&entry);
        let checksum = if entry.dek_sha256_b64.is_some() { "dek sha" } else { "no dek sha" };
        let nonce = if entry.nonce.is_some() { ", own nonce" } else { "" };
        out.push_str(&format!("  {address}  {strategy} ({checksum}{nonce})\n"));
    }
    out
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn default_name(file: &Path) -> String {
    file.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string())
}

fn unix_timestamp() -> String {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        .to_string()
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
