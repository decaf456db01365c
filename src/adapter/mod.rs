//! Backend-neutral storage contract.
//!
//! [`StorageAdapter`] is implemented by [`RemoteAdapter`] (S3 and compatible
//! endpoints) and [`LocalAdapter`] (a directory whose subdirectories are
//! buckets). [`create_storage_adapter`] is the only place that decides which
//! one an [`Account`] gets and assembles its construction parameters.

mod local;
mod remote;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};
use crate::models::{Account, Bucket, ShareLink, StorageEntry};

pub use local::{browse_directory, LocalAdapter};
pub use remote::RemoteAdapter;

pub const DEFAULT_REGION: &str = "us-east-1";
pub const MAX_SHARE_TTL_SECS: u64 = 604_800;

/// Knobs shared by every adapter built from one configuration.
#[derive(Clone, Debug)]
pub struct AdapterSettings {
    /// Lifetime of URLs handed out for previews and downloads.
    pub preview_ttl: Duration,
    pub default_region: String,
    /// Page size for list calls against paginated backends.
    pub list_page_size: i32,
    /// Upper bound on keys per bulk delete request.
    pub delete_batch_size: usize,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            preview_ttl: Duration::from_secs(15 * 60),
            default_region: DEFAULT_REGION.to_string(),
            list_page_size: 1000,
            delete_batch_size: 1000,
        }
    }
}

#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Human-readable backend tag used in log lines.
    fn kind(&self) -> &'static str;

    async fn list_buckets(&self) -> StorageResult<Vec<Bucket>>;

    async fn create_bucket(&self, name: &str, region: Option<&str>) -> StorageResult<Bucket>;

    /// Immediate children of `prefix`. Order is unspecified.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<StorageEntry>>;

    /// Delete `keys`; a key ending in `/` removes the folder and everything under it.
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StorageResult<()>;

    async fn upload_file(&self, bucket: &str, key: &str, content: Vec<u8>) -> StorageResult<()>;

    async fn download_object(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>>;

    async fn get_object_url(&self, bucket: &str, key: &str) -> StorageResult<String>;

    async fn create_folder(&self, bucket: &str, path: &str) -> StorageResult<()>;

    /// Move `old_key` to `new_key`. Backends without an atomic rename copy
    /// then delete and report [`StorageError::PartialFailure`] when the copy
    /// landed but the original could not be removed.
    async fn rename_object(&self, bucket: &str, old_key: &str, new_key: &str)
        -> StorageResult<()>;

    /// Expiring share links, when the backend can produce them.
    fn share_links(&self) -> Option<&dyn ShareLinks> {
        None
    }
}

#[async_trait]
pub trait ShareLinks: Send + Sync {
    async fn generate_shareable_link(
        &self,
        bucket: &str,
        key: &str,
        ttl_seconds: u64,
    ) -> StorageResult<ShareLink>;
}

pub fn create_storage_adapter(
    account: &Account,
    settings: &AdapterSettings,
) -> StorageResult<Arc<dyn StorageAdapter>> {
    if account.is_local {
        let root = account.local_path.as_ref().ok_or_else(|| {
            StorageError::invalid_name(&account.name, "local account has no root path")
        })?;
        let adapter = LocalAdapter::new(root)?;
        tracing::debug!(account = %account.id, root = %adapter.root().display(), "built local adapter");
        return Ok(Arc::new(adapter));
    }

    let adapter = RemoteAdapter::from_account(account, settings)?;
    tracing::debug!(account = %account.id, region = %adapter.region(), "built remote adapter");
    Ok(Arc::new(adapter))
}
