//! Command-line front end.
//!
//! Flags fall back to `CLOUDGLIDE_*` environment variables. Every storage
//! command unlocks the vault, opens a [`StorageSession`] on the chosen account
//! and drives it through the same intents a graphical client would use.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::adapter::{browse_directory, AdapterSettings};
use crate::config_paths::{expand_user_path, vault_path};
use crate::models::{AccountInfo, AccountInput, StorageEntry};
use crate::preview::format_file_size;
use crate::session::{
    Notification, NotificationLevel, SortDirection, SortKey, StorageSession, UploadItem,
};
use crate::vault::Vault;

#[derive(Parser, Debug)]
#[command(author, version, about = "Browse S3 buckets and local directories")]
pub struct Cli {
    /// Encrypted account store (defaults to the per-user config directory)
    #[arg(long, env = "CLOUDGLIDE_VAULT", global = true)]
    pub vault: Option<PathBuf>,

    /// Passphrase that unlocks the account store
    #[arg(long, env = "CLOUDGLIDE_PASSPHRASE", hide_env_values = true, global = true)]
    pub passphrase: Option<String>,

    /// Lifetime in seconds of preview URLs
    #[arg(long, env = "CLOUDGLIDE_PREVIEW_TTL", default_value_t = 900, global = true)]
    pub preview_ttl: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage stored accounts
    #[command(subcommand)]
    Accounts(AccountsCommand),
    /// List the immediate children of a host directory
    Browse { path: String },
    /// List buckets of an account
    Buckets(AccountArg),
    /// Create a bucket
    Mb {
        #[command(flatten)]
        account: AccountArg,
        name: String,
        #[arg(long, default_value = "")]
        region: String,
    },
    /// List a prefix
    Ls {
        #[command(flatten)]
        target: BucketArg,
        #[arg(default_value = "")]
        prefix: String,
        /// Only show entries whose name contains this text
        #[arg(long)]
        search: Option<String>,
        #[arg(long, value_enum, default_value_t = SortColumn::Name)]
        sort: SortColumn,
        #[arg(long)]
        desc: bool,
    },
    /// Create a folder under a prefix
    Mkdir {
        #[command(flatten)]
        target: BucketArg,
        #[arg(long, default_value = "")]
        prefix: String,
        name: String,
    },
    /// Delete objects; keys ending in `/` remove whole folders
    Rm {
        #[command(flatten)]
        target: BucketArg,
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Rename an object or folder in place
    Mv {
        #[command(flatten)]
        target: BucketArg,
        key: String,
        new_name: String,
    },
    /// Upload files into a prefix
    Put {
        #[command(flatten)]
        target: BucketArg,
        #[arg(long, default_value = "")]
        prefix: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Download an object
    Get {
        #[command(flatten)]
        target: BucketArg,
        key: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print an expiring share link
    Share {
        #[command(flatten)]
        target: BucketArg,
        key: String,
        #[arg(long, default_value_t = 3600)]
        ttl: u64,
    },
    /// Print the preview URL and detected kind of an object
    Preview {
        #[command(flatten)]
        target: BucketArg,
        key: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum AccountsCommand {
    /// Add an S3 or local-directory account
    Add(AddAccountArgs),
    /// List stored accounts
    List,
}

#[derive(Args, Debug)]
pub struct AddAccountArgs {
    #[arg(long)]
    pub name: String,
    /// Serve the account from this directory instead of S3
    #[arg(long, conflicts_with_all = ["access_key", "secret_key", "endpoint"])]
    pub local_path: Option<String>,
    #[arg(long, env = "CLOUDGLIDE_ACCESS_KEY")]
    pub access_key: Option<String>,
    #[arg(long, env = "CLOUDGLIDE_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,
    #[arg(long, default_value = "")]
    pub region: String,
    /// Custom S3-compatible endpoint
    #[arg(long)]
    pub endpoint: Option<String>,
}

#[derive(Args, Debug)]
pub struct AccountArg {
    /// Account name or id
    #[arg(short, long)]
    pub account: String,
}

#[derive(Args, Debug)]
pub struct BucketArg {
    #[command(flatten)]
    pub account: AccountArg,
    #[arg(short, long)]
    pub bucket: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SortColumn {
    Name,
    Size,
    Modified,
}

impl From<SortColumn> for SortKey {
    fn from(column: SortColumn) -> Self {
        match column {
            SortColumn::Name => SortKey::Name,
            SortColumn::Size => SortKey::Size,
            SortColumn::Modified => SortKey::LastModified,
        }
    }
}

impl Cli {
    fn settings(&self) -> AdapterSettings {
        AdapterSettings {
            preview_ttl: Duration::from_secs(self.preview_ttl.max(1)),
            ..AdapterSettings::default()
        }
    }

    fn open_vault(&self) -> Result<Vault> {
        let path = match &self.vault {
            Some(path) => path.clone(),
            None => vault_path().context("unable to resolve the home directory, pass --vault")?,
        };
        let passphrase = self
            .passphrase
            .as_deref()
            .context("a passphrase is required, set --passphrase or CLOUDGLIDE_PASSPHRASE")?;
        Vault::open_or_create(&path, passphrase)
            .with_context(|| format!("opening account vault {}", path.display()))
    }
}

/// Key without a trailing slash is a file, with one a folder.
fn entry_for_key(key: &str) -> StorageEntry {
    if key.ends_with('/') {
        StorageEntry::folder(key)
    } else {
        StorageEntry::file(key, 0, None)
    }
}

fn resolve_account<'a>(accounts: &'a [AccountInfo], wanted: &str) -> Result<&'a AccountInfo> {
    accounts
        .iter()
        .find(|account| account.id == wanted)
        .or_else(|| accounts.iter().find(|account| account.name == wanted))
        .ok_or_else(|| anyhow!("no account named `{wanted}`"))
}

/// Print pending notifications; an error-level one fails the command.
fn drain(session: &StorageSession) -> Result<()> {
    let mut failure = None;
    for Notification { level, message } in session.take_notifications() {
        match level {
            NotificationLevel::Error => {
                eprintln!("error: {message}");
                failure.get_or_insert(message);
            }
            NotificationLevel::Warning => eprintln!("warning: {message}"),
            NotificationLevel::Info | NotificationLevel::Success => eprintln!("{message}"),
        }
    }
    match failure {
        Some(message) => bail!(message),
        None => Ok(()),
    }
}

async fn open_account(cli: &Cli, account: &AccountArg) -> Result<(StorageSession, String)> {
    let session = StorageSession::new(cli.settings()).with_vault(cli.open_vault()?);
    let account_id = resolve_account(&session.snapshot().accounts, &account.account)?
        .id
        .clone();
    session.select_account(&account_id).await;
    drain(&session)?;
    Ok((session, account_id))
}

async fn open_bucket(cli: &Cli, target: &BucketArg) -> Result<StorageSession> {
    let (session, account_id) = open_account(cli, &target.account).await?;
    session.select_bucket(&account_id, &target.bucket).await;
    drain(&session)?;
    Ok(session)
}

async fn open_prefix(cli: &Cli, target: &BucketArg, prefix: &str) -> Result<StorageSession> {
    let session = open_bucket(cli, target).await?;
    if !prefix.is_empty() {
        session.navigate(prefix).await;
        drain(&session)?;
    }
    Ok(session)
}

fn print_entries(session: &StorageSession) {
    let snapshot = session.snapshot();
    for entry in &snapshot.entries {
        let modified = entry
            .last_modified
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let size = if entry.is_folder {
            "DIR".to_string()
        } else {
            format_file_size(entry.size)
        };
        println!("{:>10}  {:16}  {}", size, modified, entry.key);
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Command::Accounts(AccountsCommand::List) => {
            let vault = cli.open_vault()?;
            eprintln!(
                "{} account(s) in {}",
                vault.accounts().len(),
                vault.path().display()
            );
            for account in vault.accounts() {
                let kind = if account.is_local { "local" } else { "s3" };
                println!("{}  {:5}  {}", account.id, kind, account.name);
            }
        }
        Command::Accounts(AccountsCommand::Add(args)) => {
            let input = match &args.local_path {
                Some(path) => AccountInput {
                    name: args.name.clone(),
                    is_local: true,
                    local_path: Some(expand_user_path(path)),
                    ..AccountInput::default()
                },
                None => AccountInput {
                    name: args.name.clone(),
                    access_key: args.access_key.clone().unwrap_or_default(),
                    secret_key: args.secret_key.clone().unwrap_or_default(),
                    region: args.region.clone(),
                    endpoint: args.endpoint.clone(),
                    ..AccountInput::default()
                },
            };
            let session = StorageSession::new(cli.settings()).with_vault(cli.open_vault()?);
            let added = session.add_account(input).await;
            drain(&session)?;
            if let Some(account) = added {
                println!("{}", account.id);
            }
        }
        Command::Browse { path } => {
            let children = browse_directory(expand_user_path(path)).await?;
            for child in children {
                let marker = if child.is_directory { "/" } else { "" };
                println!("{}{marker}", child.name);
            }
        }
        Command::Buckets(account) => {
            let (session, account_id) = open_account(&cli, account).await?;
            let snapshot = session.snapshot();
            for bucket in snapshot.buckets.get(&account_id).into_iter().flatten() {
                let region = bucket.region.as_deref().unwrap_or("");
                println!("{}  {}", bucket.name, region);
            }
        }
        Command::Mb { account, name, region } => {
            let (session, _) = open_account(&cli, account).await?;
            session.create_bucket(name, region).await;
            drain(&session)?;
        }
        Command::Ls {
            target,
            prefix,
            search,
            sort,
            desc,
        } => {
            let session = open_prefix(&cli, target, prefix).await?;
            let key = SortKey::from(*sort);
            let direction = if *desc {
                SortDirection::Descending
            } else {
                SortDirection::Ascending
            };
            let mut state = session.snapshot().sort;
            while state.key != key || state.direction != direction {
                state = session.sort_by(key);
            }
            if let Some(query) = search {
                session.search(query).await;
            }
            drain(&session)?;
            print_entries(&session);
        }
        Command::Mkdir {
            target,
            prefix,
            name,
        } => {
            let session = open_prefix(&cli, target, prefix).await?;
            session.create_folder(name).await;
            drain(&session)?;
        }
        Command::Rm { target, keys } => {
            let session = open_bucket(&cli, target).await?;
            session.delete_entries(keys).await;
            drain(&session)?;
        }
        Command::Mv {
            target,
            key,
            new_name,
        } => {
            let session = open_bucket(&cli, target).await?;
            session.rename_entry(&entry_for_key(key), new_name).await;
            drain(&session)?;
        }
        Command::Put {
            target,
            prefix,
            files,
        } => {
            let session = open_prefix(&cli, target, prefix).await?;
            let mut items = Vec::with_capacity(files.len());
            for path in files {
                let name = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .with_context(|| format!("`{}` has no usable file name", path.display()))?
                    .to_string();
                let content = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
                items.push(UploadItem { name, content });
            }
            let report = session.upload(items).await;
            drain(&session)?;
            if let Some(report) = report {
                if !report.is_complete() {
                    bail!("{} of {} uploads failed", report.failed.len(), files.len());
                }
            }
        }
        Command::Get {
            target,
            key,
            output,
        } => {
            let session = open_bucket(&cli, target).await?;
            let entry = entry_for_key(key);
            let content = session.download(&entry).await;
            drain(&session)?;
            let content = content.context("download produced no content")?;
            let output = output
                .clone()
                .unwrap_or_else(|| PathBuf::from(entry.name()));
            tokio::fs::write(&output, content)
                .await
                .with_context(|| format!("writing {}", output.display()))?;
        }
        Command::Share { target, key, ttl } => {
            let session = open_bucket(&cli, target).await?;
            let link = session.share_link(&entry_for_key(key), *ttl).await;
            drain(&session)?;
            if let Some(link) = link {
                println!("{}", link.url);
                eprintln!("expires {}", link.expires_at.to_rfc3339());
            }
        }
        Command::Preview { target, key } => {
            let session = open_bucket(&cli, target).await?;
            let preview = session.request_preview_url(&entry_for_key(key)).await;
            drain(&session)?;
            if let Some(preview) = preview {
                println!("{}", serde_json::to_string_pretty(&preview)?);
            }
        }
    }
    Ok(())
}
