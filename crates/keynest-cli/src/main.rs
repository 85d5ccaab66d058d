//! `KeyNest` CLI — a local encrypted credential vault with remote backup.
//!
//! Each invocation signs in as the account named in the environment, opens
//! that account's vault, runs one command, and signs out again.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod config;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use keynest_core::identity::StaticIdentity;
use keynest_core::{
    BackupCoordinator, CredentialEntry, Principal, RestoreStatus, StorageRemote, VaultSession,
    VaultStore,
};
use keynest_storage::{FileBackend, StorageBackend};
use tracing::debug;

use crate::config::{CliConfig, LocalBackendKind};

const MASK: &str = "********";

// ── CLI structure ────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "keynest",
    version,
    about = "KeyNest CLI — encrypted credential vault with remote backup",
    long_about = None,
    after_help = "Environment variables:\n  \
         KEYNEST_PRINCIPAL    Account id (required)\n  \
         KEYNEST_PASSPHRASE   Vault passphrase, also used to confirm deletes\n  \
         KEYNEST_NEW_PASSPHRASE  Replacement passphrase for change-passphrase\n  \
         KEYNEST_EMAIL        Account email\n  \
         KEYNEST_DATA_DIR     Local vault directory (default: ./.keynest/local)\n  \
         KEYNEST_STORAGE      Local storage: file or redb (default: file)\n  \
         KEYNEST_REMOTE_DIR   Backup directory (default: ./.keynest/remote)\n  \
         KEYNEST_LOG_LEVEL    Log filter (default: warn)\n\n\
         Examples:\n  \
         keynest add Mail bob@example.com 'p4ssw0rd'\n  \
         keynest list --show\n  \
         keynest backup\n  \
         keynest restore"
)]
struct Cli {
    /// Start over when the local vault cannot be decrypted, overwriting it
    /// on the next save.
    #[arg(long, global = true)]
    discard_unreadable: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List saved credentials.
    List {
        /// Print passwords instead of masking them.
        #[arg(long)]
        show: bool,
    },
    /// Save a new credential.
    Add {
        title: String,
        username: String,
        password: String,
    },
    /// Replace the credential with the given number.
    Update {
        /// Entry number as shown by `list`.
        number: usize,
        title: String,
        username: String,
        password: String,
    },
    /// Delete the credential with the given number.
    Remove {
        /// Entry number as shown by `list`.
        number: usize,
        /// Account passphrase, required to confirm the delete.
        #[arg(long, env = "KEYNEST_CONFIRM", hide_env_values = true)]
        confirm: String,
    },
    /// Find credentials whose title or username contains a query.
    Search {
        query: String,
        /// Print passwords instead of masking them.
        #[arg(long)]
        show: bool,
    },
    /// Encrypt the vault and upload it as this account's backup.
    Backup,
    /// Merge this account's backup into the local vault.
    Restore,
    /// Re-encrypt the vault and its backup under a new passphrase.
    ChangePassphrase {
        /// Current account passphrase.
        #[arg(long, env = "KEYNEST_CONFIRM", hide_env_values = true)]
        confirm: String,
        /// New account passphrase.
        #[arg(long = "new", env = "KEYNEST_NEW_PASSPHRASE", hide_env_values = true)]
        new_passphrase: String,
    },
    /// Delete the local vault and the remote backup.
    Destroy {
        /// Account passphrase, required to confirm.
        #[arg(long, env = "KEYNEST_CONFIRM", hide_env_values = true)]
        confirm: String,
    },
}

// ── Output helpers ───────────────────────────────────────────────────

fn success(msg: &str) {
    println!("✓ {msg}");
}

fn warning(msg: &str) {
    eprintln!("⚠ {msg}");
}

fn print_entry(number: usize, entry: &CredentialEntry, show: bool) {
    let password = if show { entry.secret.as_str() } else { MASK };
    println!(
        "{number:>3}  {:<24} {:<28} {password}",
        entry.title, entry.username
    );
}

// ── Wiring ───────────────────────────────────────────────────────────

fn init_tracing(config: &CliConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(feature = "redb")]
fn open_redb(path: &Path) -> Result<Arc<dyn StorageBackend>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let backend = keynest_storage::RedbBackend::open(path)
        .with_context(|| format!("failed to open redb vault at {}", path.display()))?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "redb"))]
fn open_redb(path: &Path) -> Result<Arc<dyn StorageBackend>> {
    bail!(
        "KEYNEST_STORAGE=redb ({}) needs a build with the `redb` feature",
        path.display()
    )
}

fn identity(config: &CliConfig) -> StaticIdentity {
    let Some(account) = &config.account else {
        return StaticIdentity::signed_out();
    };

    let mut principal = Principal::new(account.principal.as_str());
    if let Some(email) = &account.email {
        principal = principal.with_email(email.as_str());
    }
    if let Some(passphrase) = &account.passphrase {
        principal = principal.with_key_secret(passphrase.as_bytes().to_vec());
    }
    StaticIdentity::signed_in(principal, account.passphrase.clone().unwrap_or_default())
}

async fn coordinator(config: &CliConfig) -> Result<Arc<BackupCoordinator>> {
    let local: Arc<dyn StorageBackend> = match &config.local_backend {
        LocalBackendKind::File => Arc::new(
            FileBackend::open(&config.data_dir)
                .await
                .with_context(|| {
                    format!("failed to open data directory {}", config.data_dir.display())
                })?,
        ),
        LocalBackendKind::Redb { path } => open_redb(path)?,
    };
    let remote = FileBackend::open(&config.remote_dir)
        .await
        .with_context(|| {
            format!(
                "failed to open remote directory {}",
                config.remote_dir.display()
            )
        })?;

    debug!(
        data_dir = %config.data_dir.display(),
        remote_dir = %config.remote_dir.display(),
        "storage opened"
    );

    let store = match &config.account {
        Some(account) => VaultStore::for_principal(local, &account.principal),
        None => VaultStore::new(local),
    };

    Ok(Arc::new(BackupCoordinator::new(
        Arc::new(identity(config)),
        Arc::new(StorageRemote::new(Arc::new(remote))),
        store,
    )))
}

// ── Command dispatch ─────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match CliConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config);
    debug!(?config, "configuration loaded");

    match run(&config, cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("✗ Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &CliConfig, cli: Cli) -> Result<()> {
    let coordinator = coordinator(config).await?;
    let mut session = VaultSession::open(coordinator)
        .await
        .context("cannot open vault (is KEYNEST_PRINCIPAL set?)")?;

    if cli.discard_unreadable {
        if let Some(e) = session.discard_unreadable() {
            warning(&format!(
                "local vault could not be read and will be replaced on the next save: {e}"
            ));
        }
    } else if let Some(e) = session.load_error() {
        warning(&format!(
            "local vault could not be read, starting empty: {e}; \
             changes are blocked unless --discard-unreadable is given"
        ));
    }

    let result = dispatch(&mut session, cli.command).await;
    session.sign_out();
    result
}

async fn dispatch(session: &mut VaultSession, command: Commands) -> Result<()> {
    match command {
        Commands::List { show } => {
            cmd_list(session, show);
            Ok(())
        }
        Commands::Add {
            title,
            username,
            password,
        } => cmd_add(session, CredentialEntry::new(title, username, password)).await,
        Commands::Update {
            number,
            title,
            username,
            password,
        } => cmd_update(session, number, CredentialEntry::new(title, username, password)).await,
        Commands::Remove { number, confirm } => cmd_remove(session, number, &confirm).await,
        Commands::Search { query, show } => {
            cmd_search(session, &query, show);
            Ok(())
        }
        Commands::Backup => cmd_backup(session).await,
        Commands::Restore => cmd_restore(session).await,
        Commands::ChangePassphrase {
            confirm,
            new_passphrase,
        } => cmd_change_passphrase(session, &confirm, &new_passphrase).await,
        Commands::Destroy { confirm } => cmd_destroy(session, &confirm).await,
    }
}

fn slot(number: usize) -> Result<usize> {
    number.checked_sub(1).context("entry numbers start at 1")
}

fn cmd_list(session: &VaultSession, show: bool) {
    let vault = session.vault();
    if vault.is_empty() {
        println!("Vault is empty.");
        return;
    }
    for (i, entry) in vault.entries().iter().enumerate() {
        print_entry(i + 1, entry, show);
    }
}

fn cmd_search(session: &VaultSession, query: &str, show: bool) {
    let mut found = false;
    for (i, entry) in session.vault().search(query) {
        print_entry(i + 1, entry, show);
        found = true;
    }
    if !found {
        println!("No entries match '{query}'.");
    }
}

async fn cmd_add(session: &mut VaultSession, entry: CredentialEntry) -> Result<()> {
    if session
        .vault()
        .contains_identity(&entry.title, &entry.username)
    {
        warning(&format!(
            "'{}' ({}) is already saved; keeping both",
            entry.title, entry.username
        ));
    }
    let label = format!("'{}' ({})", entry.title, entry.username);
    session
        .add(entry)
        .await
        .context("failed to save local vault")?;
    success(&format!("Added {label}"));
    Ok(())
}

async fn cmd_update(session: &mut VaultSession, number: usize, entry: CredentialEntry) -> Result<()> {
    let index = slot(number)?;
    let label = format!("'{}' ({})", entry.title, entry.username);
    match session
        .update(index, entry)
        .await
        .context("failed to save local vault")?
    {
        Some(_) => {
            success(&format!("Updated #{number} to {label}"));
            Ok(())
        }
        None => bail!("no entry #{number}"),
    }
}

async fn cmd_remove(session: &mut VaultSession, number: usize, confirm: &str) -> Result<()> {
    let index = slot(number)?;
    match session
        .remove(index, confirm)
        .await
        .context("failed to remove entry")?
    {
        Some(removed) => {
            success(&format!(
                "Removed '{}' ({})",
                removed.title, removed.username
            ));
            Ok(())
        }
        None => bail!("no entry #{number}"),
    }
}

async fn cmd_backup(session: &mut VaultSession) -> Result<()> {
    session.backup().await.context("backup failed")?;
    success(&format!("Backed up {} entries", session.vault().len()));
    Ok(())
}

async fn cmd_restore(session: &mut VaultSession) -> Result<()> {
    let report = session.restore().await.context("restore failed")?;
    match report.status {
        RestoreStatus::NotFound => println!("No backup found."),
        RestoreStatus::Merged { added } => success(&format!(
            "Restored backup: {added} new, {} total",
            session.vault().len()
        )),
    }
    if let Some(e) = report.persist_error {
        warning(&format!("merged vault could not be saved locally: {e}"));
    }
    Ok(())
}

async fn cmd_change_passphrase(session: &mut VaultSession, old: &str, new: &str) -> Result<()> {
    session
        .change_passphrase(old, new)
        .await
        .context("passphrase change failed")?;
    success("Passphrase changed; set KEYNEST_PASSPHRASE to the new value");
    Ok(())
}

async fn cmd_destroy(session: &mut VaultSession, confirm: &str) -> Result<()> {
    session
        .destroy_all(confirm)
        .await
        .context("destroy failed")?;
    success("Deleted the local vault and the remote backup");
    Ok(())
}
