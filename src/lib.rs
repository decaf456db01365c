pub mod adapter;
pub mod cli;
mod config_paths;
pub mod error;
pub mod models;
pub mod naming;
pub mod preview;
pub mod session;
pub mod vault;

use clap::Parser;

pub use adapter::{
    create_storage_adapter, AdapterSettings, LocalAdapter, RemoteAdapter, ShareLinks,
    StorageAdapter,
};
pub use error::{SessionError, StorageError, StorageResult};
pub use models::{Account, AccountInfo, AccountInput, Bucket, ShareLink, StorageEntry};
pub use session::{SessionSnapshot, StorageSession, UploadItem, UploadReport};

/// Parse the command line and run the requested command.
pub async fn run() -> anyhow::Result<()> {
    cli::run(cli::Cli::parse()).await
}
