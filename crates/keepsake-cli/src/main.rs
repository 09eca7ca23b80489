//! keepsake: zero-knowledge vault and release bundles
//!
//! Owner commands:
//!   init / passwd / status       - enroll, change passphrase, show vault state
//!   add-note / add-file / cat / rm / ls
//!   bundle create|add-item|remove-item|add-trustee|release|delete|list
//!   check-in / release-due       - heartbeat and policy evaluation
//!
//! Trustee commands:
//!   payload <token>              - fetch the public release payload (opens the access window)
//!   open <token> --payload FILE  - decrypt a payload's items with the token alone

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use keepsake_core::config::{expand_tilde, KeepsakeConfig, StorageBackend};
use keepsake_core::types::{ItemKind, ReleasePayload, ReleasePolicy, Trustee};
use keepsake_crypto::{CryptoError, KdfParams, UnlockOutcome, VaultSession};
use keepsake_release::vault::{self, NewBundle};
use keepsake_release::{now_secs, Ledger, ReleaseError};
use keepsake_storage::{BlobStore, S3Credentials};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "keepsake",
    version,
    about = "Zero-knowledge vault with token-released bundles"
)]
struct Cli {
    /// Path to keepsake.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "KEEPSAKE_CONFIG",
        default_value = "~/.config/keepsake/keepsake.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log].level
    #[arg(long, env = "KEEPSAKE_LOG")]
    log: Option<String>,

    /// Log format; overrides [log].format
    #[arg(long, env = "KEEPSAKE_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the vault: generate and wrap the data key under your passphrase
    Init,

    /// Change the vault passphrase (items are not re-encrypted)
    Passwd,

    /// Show vault, item, bundle, and storage status
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Encrypt and store a text note
    #[command(name = "add-note")]
    AddNote {
        /// Display name
        name: String,
        /// Note text (default: read from stdin)
        #[arg(long, short = 't')]
        text: Option<String>,
    },

    /// Encrypt and store a file
    #[command(name = "add-file")]
    AddFile {
        path: PathBuf,
        /// Display name (default: the file name)
        #[arg(long, short = 'n')]
        name: Option<String>,
    },

    /// List items
    Ls,

    /// Decrypt an item (by id or unique name)
    Cat {
        item: String,
        /// Write to this file instead of stdout
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Delete an item and its ciphertext
    Rm { item: String },

    /// Release bundle management
    Bundle {
        #[command(subcommand)]
        action: BundleAction,
    },

    /// Record a heartbeat on every pending heartbeat bundle
    #[command(name = "check-in")]
    CheckIn,

    /// Release every bundle whose policy has fired
    #[command(name = "release-due")]
    ReleaseDue,

    /// Fetch the public release payload for a token
    Payload {
        token: String,
        /// Write JSON to this file instead of stdout
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Open a release payload with its token
    Open {
        token: String,
        /// Payload JSON produced by `keepsake payload`
        #[arg(long)]
        payload: PathBuf,
        /// Directory to write decrypted items into
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
}

#[derive(Subcommand, Debug)]
enum BundleAction {
    /// Create a bundle and print its release token
    Create {
        name: String,
        /// Item id or name (repeatable)
        #[arg(long = "item", short = 'i')]
        items: Vec<String>,
        /// Time-lock: release at this Unix timestamp
        #[arg(long, conflicts_with = "heartbeat_days")]
        release_at: Option<u64>,
        /// Heartbeat: release when no check-in for this many days
        #[arg(long)]
        heartbeat_days: Option<u64>,
        /// Heartbeat grace period in days
        #[arg(long, default_value_t = 7)]
        grace_days: u64,
        /// Trustee as "Name <email>" (repeatable)
        #[arg(long = "trustee")]
        trustees: Vec<String>,
        /// Note for the trustees, sealed with the release token
        #[arg(long)]
        note: Option<String>,
    },

    /// Add an item to an unreleased bundle
    #[command(name = "add-item")]
    AddItem { bundle: String, item: String },

    /// Remove an item from an unreleased bundle
    #[command(name = "remove-item")]
    RemoveItem { bundle: String, item: String },

    /// Add a trustee to an unreleased bundle
    #[command(name = "add-trustee")]
    AddTrustee {
        bundle: String,
        /// "Name <email>"
        trustee: String,
    },

    /// Release a bundle now
    Release { bundle: String },

    /// Delete a bundle (items are kept)
    Delete { bundle: String },

    /// List bundles
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = KeepsakeConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;

    let level = cli.log.as_deref().unwrap_or(&config.log.level);
    let format = cli.log_format.clone().unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(level, &format);

    let result = match cli.command {
        Commands::Init => cmd_init(&config),
        Commands::Passwd => cmd_passwd(&config),
        Commands::Status => cmd_status(&config).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path),
        Commands::AddNote { name, text } => cmd_add_note(&config, &name, text).await,
        Commands::AddFile { path, name } => cmd_add_file(&config, &path, name.as_deref()).await,
        Commands::Ls => cmd_ls(&config),
        Commands::Cat { item, out } => cmd_cat(&config, &item, out.as_deref()).await,
        Commands::Rm { item } => cmd_rm(&config, &item).await,
        Commands::Bundle { action } => cmd_bundle(&config, action),
        Commands::CheckIn => cmd_check_in(&config),
        Commands::ReleaseDue => cmd_release_due(&config),
        Commands::Payload { token, out } => cmd_payload(&config, &token, out.as_deref()),
        Commands::Open {
            token,
            payload,
            out,
        } => cmd_open(&config, &token, &payload, &out).await,
    };

    if let Some(defect) = result.as_ref().err().and_then(crypto_defect) {
        tracing::error!(error = %defect, "inconsistent vault data or client state");
    }
    result
}

/// The crypto error behind `err` when it is not one a user should normally
/// see (malformed envelopes, a locked session, bad hex).
fn crypto_defect(err: &anyhow::Error) -> Option<&CryptoError> {
    err.chain()
        .find_map(|cause| {
            cause.downcast_ref::<CryptoError>().or_else(|| {
                match cause.downcast_ref::<ReleaseError>() {
                    Some(ReleaseError::Crypto(e)) => Some(e),
                    _ => None,
                }
            })
        })
        .filter(|e| !e.is_user_facing())
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Shared plumbing ───────────────────────────────────────────────────────────

fn open_ledger(config: &KeepsakeConfig) -> Result<Ledger> {
    let path = expand_tilde(&config.ledger.path);
    Ledger::open(&path).with_context(|| format!("opening ledger: {}", path.display()))
}

/// Blob store for the configured backend. S3 credentials come from
/// AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY (or the KEEPSAKE_ prefixed pair).
fn open_blobs(config: &KeepsakeConfig) -> Result<BlobStore> {
    let creds = match config.storage.backend {
        StorageBackend::S3 => S3Credentials {
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID")
                .or_else(|_| std::env::var("KEEPSAKE_ACCESS_KEY_ID"))
                .context(
                    "S3 credentials not set\n\
                     Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables.",
                )?,
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY")
                .or_else(|_| std::env::var("KEEPSAKE_SECRET_ACCESS_KEY"))
                .context("AWS_SECRET_ACCESS_KEY environment variable not set")?,
        },
        StorageBackend::Memory => {
            tracing::warn!("memory storage backend: blobs do not outlive this process");
            S3Credentials::default()
        }
        StorageBackend::Fs => S3Credentials::default(),
    };
    let op = keepsake_storage::build_from_core_config(&config.storage, &creds)
        .context("building storage operator")?;
    Ok(BlobStore::new(op))
}

/// Passphrase from `env_var`, or an interactive prompt.
fn read_passphrase(env_var: &str, prompt: &str) -> Result<SecretString> {
    if let Ok(p) = std::env::var(env_var) {
        return Ok(SecretString::from(p));
    }
    let p = rpassword::prompt_password(prompt).context("reading passphrase")?;
    Ok(SecretString::from(p))
}

/// New passphrase, prompted twice unless supplied through `env_var`.
fn read_new_passphrase(env_var: &str) -> Result<SecretString> {
    if let Ok(p) = std::env::var(env_var) {
        return Ok(SecretString::from(p));
    }
    let first = rpassword::prompt_password("New passphrase: ").context("reading passphrase")?;
    let second = rpassword::prompt_password("Repeat passphrase: ").context("reading passphrase")?;
    if first != second {
        anyhow::bail!("passphrases do not match");
    }
    Ok(SecretString::from(first))
}

fn new_session(config: &KeepsakeConfig) -> VaultSession {
    VaultSession::new(
        KdfParams::from(&config.kdf),
        config.release.min_passphrase_len,
    )
}

/// Unlock an enrolled vault.
fn unlock(config: &KeepsakeConfig, ledger: &Ledger) -> Result<VaultSession> {
    if !ledger.user_record().is_enrolled() {
        anyhow::bail!("vault is not initialised; run `keepsake init` first");
    }
    let passphrase = read_passphrase("KEEPSAKE_PASSPHRASE", "Passphrase: ")?;
    let mut session = new_session(config);
    session
        .unlock(&passphrase, ledger.user_record())
        .context("unlocking vault")?;
    Ok(session)
}

/// Resolve an item by id or unique name.
fn resolve_item(ledger: &Ledger, query: &str) -> Result<String> {
    if ledger.item(query).is_some() {
        return Ok(query.to_string());
    }
    let matches: Vec<_> = ledger.items().filter(|i| i.name == query).collect();
    match matches.as_slice() {
        [one] => Ok(one.id.clone()),
        [] => anyhow::bail!("no item with id or name {query:?}"),
        _ => anyhow::bail!("{} items are named {query:?}; use the id", matches.len()),
    }
}

/// Resolve a bundle by id or unique name.
fn resolve_bundle(ledger: &Ledger, query: &str) -> Result<String> {
    if ledger.bundle(query).is_some() {
        return Ok(query.to_string());
    }
    let matches: Vec<_> = ledger.bundles().filter(|b| b.name == query).collect();
    match matches.as_slice() {
        [one] => Ok(one.id.clone()),
        [] => anyhow::bail!("no bundle with id or name {query:?}"),
        _ => anyhow::bail!("{} bundles are named {query:?}; use the id", matches.len()),
    }
}

/// Parse `Name <email>`.
fn parse_trustee(s: &str) -> Result<Trustee> {
    let (name, rest) = s
        .split_once('<')
        .with_context(|| format!("trustee must look like \"Name <email>\", got {s:?}"))?;
    let email = rest
        .strip_suffix('>')
        .with_context(|| format!("trustee must look like \"Name <email>\", got {s:?}"))?
        .trim();
    if !email.contains('@') {
        anyhow::bail!("invalid trustee email: {email:?}");
    }
    Ok(Trustee {
        name: name.trim().to_string(),
        email: email.to_string(),
    })
}

/// File name for a decrypted item: the item's base name, or its id.
fn output_name(name: &str, id: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty() && n != "." && n != "..")
        .unwrap_or_else(|| id.to_string())
}

/// [`output_name`], prefixed with the id when another item already took it.
fn unique_output_name(name: &str, id: &str, used: &mut HashSet<String>) -> String {
    let base = output_name(name, id);
    let chosen = if used.contains(&base) {
        format!("{id}-{base}")
    } else {
        base
    };
    used.insert(chosen.clone());
    chosen
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

// ── `keepsake init` / `passwd` ────────────────────────────────────────────────

fn cmd_init(config: &KeepsakeConfig) -> Result<()> {
    let mut ledger = open_ledger(config)?;
    if ledger.user_record().is_enrolled() {
        anyhow::bail!(
            "vault already initialised at {}; use `keepsake passwd` to change the passphrase",
            ledger.path().display()
        );
    }

    let passphrase = read_new_passphrase("KEEPSAKE_PASSPHRASE")?;
    let mut session = new_session(config);
    match session
        .unlock(&passphrase, ledger.user_record())
        .context("creating vault keys")?
    {
        UnlockOutcome::Enrolled(record) => ledger.set_user_record(record),
        UnlockOutcome::Unlocked => {}
    }
    ledger.flush().context("writing ledger")?;

    println!("Vault initialised");
    println!("  user:   {}", ledger.user_id());
    println!("  ledger: {}", ledger.path().display());
    Ok(())
}

fn cmd_passwd(config: &KeepsakeConfig) -> Result<()> {
    let mut ledger = open_ledger(config)?;
    let mut session = unlock(config, &ledger)?;
    let new_passphrase = read_new_passphrase("KEEPSAKE_NEW_PASSPHRASE")?;

    let record = session
        .change_passphrase(&new_passphrase)
        .context("changing passphrase")?;
    ledger.set_user_record(record);
    ledger.flush().context("writing ledger")?;
    session.lock();

    println!("Passphrase changed");
    Ok(())
}

// ── `keepsake status` / `config show` ─────────────────────────────────────────

async fn cmd_status(config: &KeepsakeConfig) -> Result<()> {
    let ledger = open_ledger(config)?;
    let released = ledger.bundles().filter(|b| b.released).count();
    let total_bundles = ledger.bundles().count();
    let stored: u64 = ledger.items().map(|i| i.size).sum();

    println!("keepsake v{}", env!("CARGO_PKG_VERSION"));
    println!("  ledger:   {}", ledger.path().display());
    println!("  user:     {}", ledger.user_id());
    println!(
        "  vault:    {}",
        if ledger.user_record().is_enrolled() {
            "initialised"
        } else {
            "not initialised"
        }
    );
    println!(
        "  items:    {} ({})",
        ledger.items().count(),
        fmt_bytes(stored)
    );
    println!(
        "  bundles:  {} ({} released, {} pending)",
        total_bundles,
        released,
        total_bundles - released
    );
    let due = ledger.due_bundles(now_secs());
    if !due.is_empty() {
        println!("  due:      {} (run `keepsake release-due`)", due.len());
    }

    let backend = format!("{:?}", config.storage.backend).to_lowercase();
    match open_blobs(config) {
        Ok(blobs) => {
            let healthy = blobs.is_healthy().await;
            println!(
                "  storage:  {backend} ({})",
                if healthy { "reachable" } else { "UNREACHABLE" }
            );
        }
        Err(e) => println!("  storage:  {backend} (not configured: {e})"),
    }
    Ok(())
}

fn cmd_config_show(config: &KeepsakeConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── Items ─────────────────────────────────────────────────────────────────────

async fn store(config: &KeepsakeConfig, name: &str, kind: ItemKind, plaintext: &[u8]) -> Result<()> {
    let mut ledger = open_ledger(config)?;
    let blobs = open_blobs(config)?;
    let mut session = unlock(config, &ledger)?;

    let item = vault::store_item(&mut session, &mut ledger, &blobs, name, kind, plaintext)
        .await
        .with_context(|| format!("storing {name}"))?;
    session.lock();

    println!("Stored {} {}", item.kind, item.name);
    println!("  id:     {}", item.id);
    println!("  size:   {}", fmt_bytes(item.size));
    println!("  blob:   {}", item.r2_key);
    Ok(())
}

async fn cmd_add_note(config: &KeepsakeConfig, name: &str, text: Option<String>) -> Result<()> {
    let text = match text {
        Some(t) => t,
        None => {
            use std::io::Read;
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading note from stdin")?;
            buf
        }
    };
    store(config, name, ItemKind::Note, text.as_bytes()).await
}

async fn cmd_add_file(config: &KeepsakeConfig, path: &Path, name: Option<&str>) -> Result<()> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let name = match name {
        Some(n) => n.to_string(),
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .with_context(|| format!("no file name in {}", path.display()))?,
    };
    store(config, &name, ItemKind::File, &data).await
}

fn cmd_ls(config: &KeepsakeConfig) -> Result<()> {
    let ledger = open_ledger(config)?;
    if ledger.items().next().is_none() {
        println!("No items");
        return Ok(());
    }
    println!("{:<36}  {:<4}  {:>9}  {:>7}  NAME", "ID", "TYPE", "SIZE", "BUNDLES");
    for item in ledger.items() {
        println!(
            "{:<36}  {:<4}  {:>9}  {:>7}  {}",
            item.id,
            item.kind,
            fmt_bytes(item.size),
            ledger.bundles_containing(&item.id).len(),
            item.name
        );
    }
    Ok(())
}

async fn cmd_cat(config: &KeepsakeConfig, query: &str, out: Option<&Path>) -> Result<()> {
    let ledger = open_ledger(config)?;
    let item_id = resolve_item(&ledger, query)?;
    let blobs = open_blobs(config)?;
    let mut session = unlock(config, &ledger)?;

    let plaintext = vault::read_item(&mut session, &ledger, &blobs, &item_id)
        .await
        .with_context(|| format!("reading {query}"))?;
    session.lock();

    match out {
        Some(path) => {
            tokio::fs::write(path, &plaintext)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("Wrote {} to {}", fmt_bytes(plaintext.len() as u64), path.display());
        }
        None => {
            use std::io::Write;
            std::io::stdout()
                .write_all(&plaintext)
                .context("writing to stdout")?;
        }
    }
    Ok(())
}

async fn cmd_rm(config: &KeepsakeConfig, query: &str) -> Result<()> {
    let mut ledger = open_ledger(config)?;
    let item_id = resolve_item(&ledger, query)?;
    let blobs = open_blobs(config)?;

    let removed = vault::delete_item(&mut ledger, &blobs, &item_id)
        .await
        .with_context(|| format!("deleting {query}"))?;
    println!("Deleted {} ({})", removed.name, removed.id);
    Ok(())
}

// ── Bundles ───────────────────────────────────────────────────────────────────

fn cmd_bundle(config: &KeepsakeConfig, action: BundleAction) -> Result<()> {
    let mut ledger = open_ledger(config)?;

    match action {
        BundleAction::Create {
            name,
            items,
            release_at,
            heartbeat_days,
            grace_days,
            trustees,
            note,
        } => {
            let policy = match (release_at, heartbeat_days) {
                (Some(release_date), None) => ReleasePolicy::TimeLock { release_date },
                (None, Some(days)) => ReleasePolicy::Heartbeat {
                    interval_secs: days.saturating_mul(86_400),
                    grace_secs: grace_days.saturating_mul(86_400),
                    last_check_in: now_secs(),
                },
                _ => anyhow::bail!("choose exactly one of --release-at or --heartbeat-days"),
            };
            let item_ids = items
                .iter()
                .map(|q| resolve_item(&ledger, q))
                .collect::<Result<Vec<_>>>()?;
            let trustees = trustees
                .iter()
                .map(|t| parse_trustee(t))
                .collect::<Result<Vec<_>>>()?;

            let mut session = unlock(config, &ledger)?;
            let created = vault::create_bundle(
                &mut session,
                &mut ledger,
                NewBundle {
                    name: name.clone(),
                    policy,
                    item_ids,
                    trustees,
                    note,
                },
            )
            .with_context(|| format!("creating bundle {name}"))?;
            session.lock();

            println!("Created bundle {name}");
            println!("  id:     {}", created.id);
            println!("  token:  {}", created.release_token);
            println!();
            println!("Share the token with your trustees. Anyone holding it can");
            println!("decrypt this bundle once it is released.");
        }
        BundleAction::AddItem { bundle, item } => {
            let bundle_id = resolve_bundle(&ledger, &bundle)?;
            let item_id = resolve_item(&ledger, &item)?;
            let mut session = unlock(config, &ledger)?;
            vault::add_item_to_bundle(&mut session, &mut ledger, &bundle_id, &item_id)
                .with_context(|| format!("adding {item} to {bundle}"))?;
            session.lock();
            println!("Added {item} to {bundle}");
        }
        BundleAction::RemoveItem { bundle, item } => {
            let bundle_id = resolve_bundle(&ledger, &bundle)?;
            let item_id = resolve_item(&ledger, &item)?;
            if ledger.remove_bundle_item(&bundle_id, &item_id)? {
                println!("Removed {item} from {bundle}");
            } else {
                println!("{item} is not in {bundle}");
            }
        }
        BundleAction::AddTrustee { bundle, trustee } => {
            let bundle_id = resolve_bundle(&ledger, &bundle)?;
            let trustee = parse_trustee(&trustee)?;
            let email = trustee.email.clone();
            ledger.add_trustee(&bundle_id, trustee)?;
            println!("Added trustee {email} to {bundle}");
        }
        BundleAction::Release { bundle } => {
            let bundle_id = resolve_bundle(&ledger, &bundle)?;
            ledger.release_bundle(&bundle_id, now_secs())?;
            println!("Released {bundle}");
        }
        BundleAction::Delete { bundle } => {
            let bundle_id = resolve_bundle(&ledger, &bundle)?;
            let removed = ledger.delete_bundle(&bundle_id)?;
            println!("Deleted bundle {} ({})", removed.name, removed.id);
        }
        BundleAction::List => {
            if ledger.bundles().next().is_none() {
                println!("No bundles");
            }
            for b in ledger.bundles() {
                let state = if b.released { "released" } else { "pending" };
                println!("{}  {}  [{}, {}]", b.id, b.name, b.mode(), state);
                println!(
                    "    items: {}  trustees: {}",
                    ledger.bundle_links(&b.id).len(),
                    b.trustees.len()
                );
                for t in &b.trustees {
                    println!("      {} <{}>", t.name, t.email);
                }
            }
        }
    }

    ledger.flush().context("writing ledger")?;
    Ok(())
}

fn cmd_check_in(config: &KeepsakeConfig) -> Result<()> {
    let mut ledger = open_ledger(config)?;
    let touched = ledger.check_in(now_secs());
    ledger.flush().context("writing ledger")?;
    println!("Checked in ({touched} heartbeat bundles)");
    Ok(())
}

fn cmd_release_due(config: &KeepsakeConfig) -> Result<()> {
    let mut ledger = open_ledger(config)?;
    let released = ledger.release_due(now_secs())?;
    ledger.flush().context("writing ledger")?;
    if released.is_empty() {
        println!("Nothing due");
    }
    for id in released {
        println!("Released {id}");
    }
    Ok(())
}

// ── Trustee side ──────────────────────────────────────────────────────────────

fn cmd_payload(config: &KeepsakeConfig, token: &str, out: Option<&Path>) -> Result<()> {
    let mut ledger = open_ledger(config)?;
    let payload = ledger.release_payload(token, now_secs(), config.release.access_window_secs());
    // Persist the window start even when the fetch itself is refused.
    ledger.flush().context("writing ledger")?;
    let payload = payload.context("fetching release payload")?;

    let json = serde_json::to_string_pretty(&payload).context("serializing payload")?;
    match out {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("Wrote payload for {} to {}", payload.bundle.name, path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

async fn cmd_open(config: &KeepsakeConfig, token: &str, payload_path: &Path, out: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(payload_path)
        .await
        .with_context(|| format!("reading payload: {}", payload_path.display()))?;
    let payload: ReleasePayload =
        serde_json::from_str(&content).context("parsing release payload")?;
    let blobs = open_blobs(config)?;
    let token = SecretString::from(token.to_string());

    let opened = vault::open_release(token.expose_secret(), &payload, &blobs)
        .await
        .context("opening release")?;

    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("creating {}", out.display()))?;

    println!("Bundle: {}", opened.name);
    match &opened.note {
        Some(Ok(note)) => {
            println!();
            println!("{note}");
            println!();
        }
        Some(Err(e)) => println!("  note: {e}"),
        None => {}
    }

    let mut failed = 0;
    let mut used = HashSet::new();
    for item in &opened.items {
        match &item.content {
            Ok(plaintext) => {
                let path = out.join(unique_output_name(&item.name, &item.id, &mut used));
                tokio::fs::write(&path, plaintext)
                    .await
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("  {}  {} → {}", item.kind, fmt_bytes(item.size), path.display());
            }
            Err(e) => {
                failed += 1;
                println!("  {}  {}: {e}", item.kind, item.name);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} items could not be opened", opened.items.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trustee() {
        let t = parse_trustee("Alex Doe <alex@example.com>").unwrap();
        assert_eq!(t.name, "Alex Doe");
        assert_eq!(t.email, "alex@example.com");

        assert!(parse_trustee("alex@example.com").is_err());
        assert!(parse_trustee("Alex <not-an-email>").is_err());
    }

    #[test]
    fn test_output_name_strips_directories() {
        assert_eq!(output_name("../../etc/passwd", "id1"), "passwd");
        assert_eq!(output_name("notes/letter.txt", "id1"), "letter.txt");
        assert_eq!(output_name("..", "id1"), "id1");
        assert_eq!(output_name("", "id1"), "id1");
    }

    #[test]
    fn test_output_names_do_not_collide() {
        let mut used = HashSet::new();
        assert_eq!(unique_output_name("letter", "i1", &mut used), "letter");
        assert_eq!(unique_output_name("letter", "i2", &mut used), "i2-letter");
        assert_eq!(unique_output_name("a/x.txt", "i3", &mut used), "x.txt");
        assert_eq!(unique_output_name("b/x.txt", "i4", &mut used), "i4-x.txt");
        assert_eq!(used.len(), 4);
    }

    #[test]
    fn test_crypto_defects_are_told_apart_from_bad_credentials() {
        let locked = anyhow::Error::from(CryptoError::VaultLocked).context("reading note");
        assert_eq!(crypto_defect(&locked), Some(&CryptoError::VaultLocked));

        let wrong = anyhow::Error::from(CryptoError::InvalidCredentials).context("unlocking vault");
        assert_eq!(crypto_defect(&wrong), None);

        let nested = anyhow::Error::from(ReleaseError::from(
            CryptoError::Encoding { field: "wrappedItemKey" },
        ));
        assert!(crypto_defect(&nested).is_some());

        assert_eq!(crypto_defect(&anyhow::anyhow!("no such bundle")), None);
    }

    #[test]
    fn test_resolve_item_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = Ledger::open(&dir.path().join("ledger.json")).unwrap();
        ledger.insert_item(keepsake_core::types::ItemRecord {
            id: "abc".into(),
            name: "letter".into(),
            kind: ItemKind::Note,
            size: 1,
            version: 1,
            item_key_salt: String::new(),
            wrapped_item_key: String::new(),
            wrapped_item_key_iv: String::new(),
            r2_key: "u/abc/1".into(),
            created_at: 0,
        });

        assert_eq!(resolve_item(&ledger, "abc").unwrap(), "abc");
        assert_eq!(resolve_item(&ledger, "letter").unwrap(), "abc");
        assert!(resolve_item(&ledger, "missing").is_err());
    }

    #[test]
    fn test_cli_parses_bundle_create() {
        let cli = Cli::try_parse_from([
            "keepsake",
            "bundle",
            "create",
            "family",
            "--item",
            "will",
            "--heartbeat-days",
            "30",
            "--trustee",
            "Sam <sam@example.com>",
        ])
        .unwrap();
        match cli.command {
            Commands::Bundle {
                action:
                    BundleAction::Create {
                        items,
                        heartbeat_days,
                        grace_days,
                        ..
                    },
            } => {
                assert_eq!(items, vec!["will".to_string()]);
                assert_eq!(heartbeat_days, Some(30));
                assert_eq!(grace_days, 7);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
