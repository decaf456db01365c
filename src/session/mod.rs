//! Navigation state and the intents that mutate it.
//!
//! [`StorageSession`] is the only writer of [`SessionState`]. Every intent
//! catches adapter failures at its own boundary, turns them into a
//! [`Notification`] and leaves the state as it was; callers only learn
//! whether the intent succeeded. The presentation layer reads
//! [`SessionSnapshot`]s.
//!
//! Listings are tagged with a sequence number taken before the adapter call.
//! A response whose tag is no longer the latest is dropped, so a slow
//! navigation can never overwrite the result of a newer one.

mod state;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::adapter::{browse_directory, create_storage_adapter, AdapterSettings, StorageAdapter};
use crate::error::{SessionError, StorageError, StorageResult};
use crate::models::{last_path_component, parent_prefix, Account, AccountInput, ShareLink, StorageEntry};
use crate::naming::{join_prefix_key, normalize_prefix, validate_bucket_name, validate_entry_name};
use crate::preview::{code_language, file_kind, PreviewTarget};
use crate::vault::Vault;

pub use state::{
    breadcrumbs, filter_entries, sort_entries, Notification, NotificationLevel, Phase,
    SessionSnapshot, SortDirection, SortKey, SortState,
};
use state::SessionState;

/// Builds the adapter for an account. Swappable so the session can be driven
/// against any backend.
pub type AdapterFactory =
    Arc<dyn Fn(&Account, &AdapterSettings) -> StorageResult<Arc<dyn StorageAdapter>> + Send + Sync>;

/// One file handed to the upload intent.
#[derive(Clone, Debug)]
pub struct UploadItem {
    pub name: String,
    pub content: Vec<u8>,
}

/// Per-file outcome of a batch upload.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counts an adapter call as in flight until dropped.
struct LoadingGuard<'a> {
    state: &'a Mutex<SessionState>,
}

impl<'a> LoadingGuard<'a> {
    fn enter(state: &'a Mutex<SessionState>) -> Self {
        lock(state).in_flight += 1;
        Self { state }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut state = lock(self.state);
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

/// Bucket and prefix that an intent operates on, captured up front.
struct OpenBucket {
    adapter: Arc<dyn StorageAdapter>,
    bucket: String,
    prefix: String,
}

pub struct StorageSession {
    settings: AdapterSettings,
    factory: AdapterFactory,
    state: Mutex<SessionState>,
    adapters: Mutex<HashMap<String, Arc<dyn StorageAdapter>>>,
    vault: Option<Mutex<Vault>>,
    fetch_seq: AtomicU64,
}

impl StorageSession {
    pub fn new(settings: AdapterSettings) -> Self {
        let factory: AdapterFactory = Arc::new(create_storage_adapter);
        Self::with_factory(settings, factory)
    }

    pub fn with_factory(settings: AdapterSettings, factory: AdapterFactory) -> Self {
        Self {
            settings,
            factory,
            state: Mutex::new(SessionState::default()),
            adapters: Mutex::new(HashMap::new()),
            vault: None,
            fetch_seq: AtomicU64::new(0),
        }
    }

    /// Load the vault's accounts and persist future additions into it.
    pub fn with_vault(mut self, vault: Vault) -> Self {
        lock(&self.state).accounts = vault.accounts().to_vec();
        self.vault = Some(Mutex::new(vault));
        self
    }

    /// Seed accounts without persistence.
    pub fn with_accounts(self, accounts: Vec<Account>) -> Self {
        lock(&self.state).accounts.extend(accounts);
        self
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        lock(&self.state).snapshot()
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.state).in_flight > 0
    }

    /// Hand pending notifications to the presentation layer.
    pub fn take_notifications(&self) -> Vec<Notification> {
        std::mem::take(&mut lock(&self.state).notifications)
    }

    fn notify(&self, level: NotificationLevel, message: impl Into<String>) {
        lock(&self.state).notify(level, message);
    }

    /// Report the outcome of an intent; errors never escape the session.
    fn settle<T>(&self, action: &str, result: Result<T, SessionError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(action, error = %err, "intent failed");
                if err.is_partial() {
                    self.notify(NotificationLevel::Warning, err.user_message());
                } else {
                    self.notify(
                        NotificationLevel::Error,
                        format!("Failed to {action}. {}", err.user_message()),
                    );
                }
                None
            }
        }
    }

    fn adapter_for(&self, account_id: &str) -> Result<Arc<dyn StorageAdapter>, SessionError> {
        if let Some(adapter) = lock(&self.adapters).get(account_id) {
            return Ok(adapter.clone());
        }

        let account = lock(&self.state)
            .accounts
            .iter()
            .find(|account| account.id == account_id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownAccount(account_id.to_string()))?;

        let adapter = (self.factory)(&account, &self.settings)?;
        lock(&self.adapters).insert(account_id.to_string(), adapter.clone());
        Ok(adapter)
    }

    fn active_account_adapter(&self) -> Result<(String, Arc<dyn StorageAdapter>), SessionError> {
        let account_id = lock(&self.state)
            .active_account
            .clone()
            .ok_or(SessionError::NoActiveAccount)?;
        let adapter = self.adapter_for(&account_id)?;
        Ok((account_id, adapter))
    }

    fn open_bucket(&self) -> Result<OpenBucket, SessionError> {
        let (account_id, bucket, prefix) = {
            let state = lock(&self.state);
            let account_id = state
                .active_account
                .clone()
                .ok_or(SessionError::NoActiveAccount)?;
            let bucket = state
                .active_bucket
                .clone()
                .ok_or(SessionError::NoActiveBucket)?;
            (account_id, bucket, state.prefix.clone())
        };
        Ok(OpenBucket {
            adapter: self.adapter_for(&account_id)?,
            bucket,
            prefix,
        })
    }

    /// Invalidate every listing still in flight.
    fn bump_fetch_seq(&self) -> u64 {
        self.fetch_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Fetch `prefix` and install it unless a newer fetch was issued meanwhile.
    async fn load_entries(
        &self,
        adapter: &dyn StorageAdapter,
        bucket: &str,
        prefix: String,
    ) -> Result<(), SessionError> {
        let ticket = self.bump_fetch_seq();
        debug!(bucket, prefix = %prefix, ticket, backend = adapter.kind(), "listing objects");
        let listed = adapter.list_objects(bucket, &prefix).await;

        let mut state = lock(&self.state);
        // Superseded fetches are dropped whether they succeeded or failed.
        if self.fetch_seq.load(Ordering::SeqCst) != ticket {
            debug!(bucket, prefix = %prefix, ticket, failed = listed.is_err(), "discarding stale listing");
            return Ok(());
        }
        if state.active_bucket.as_deref() != Some(bucket) {
            return Ok(());
        }
        state.apply_listing(bucket, prefix, listed?);
        Ok(())
    }

    async fn load_buckets(&self, account_id: &str) -> Result<(), SessionError> {
        let adapter = self.adapter_for(account_id)?;
        let buckets = adapter.list_buckets().await?;
        debug!(account = account_id, count = buckets.len(), "loaded buckets");
        lock(&self.state)
            .buckets
            .insert(account_id.to_string(), buckets);
        Ok(())
    }

    /// After a partial failure the backend changed in ways we cannot predict;
    /// refetch so the view reflects it, then hand the original error back.
    async fn resync_after(&self, open: &OpenBucket, err: StorageError) -> SessionError {
        if err.is_partial() {
            if let Err(refresh_err) = self
                .load_entries(open.adapter.as_ref(), &open.bucket, open.prefix.clone())
                .await
            {
                warn!(error = %refresh_err, "refresh after partial failure failed");
            }
        }
        err.into()
    }

    async fn try_add_account(&self, input: AccountInput) -> Result<Account, SessionError> {
        if input.is_local {
            let root = input.local_path.as_ref().ok_or_else(|| {
                StorageError::invalid_name(&input.name, "choose a local directory")
            })?;
            browse_directory(root).await?;
        }

        let account = Account::from_input(input);
        let adapter = (self.factory)(&account, &self.settings)?;

        if let Some(vault) = &self.vault {
            lock(vault).add(account.clone())?;
        }
        lock(&self.adapters).insert(account.id.clone(), adapter);
        lock(&self.state).accounts.push(account.clone());
        Ok(account)
    }

    /// Register an account, persist it when a vault is attached and select it.
    pub async fn add_account(&self, input: AccountInput) -> Option<Account> {
        let result = self.try_add_account(input).await;
        let account = self.settle("add account", result)?;
        info!(account = %account.id, local = account.is_local, "account added");
        self.notify(
            NotificationLevel::Success,
            format!("Account \"{}\" added successfully", account.name),
        );
        self.select_account(&account.id).await;
        Some(account)
    }

    async fn try_select_account(&self, account_id: &str) -> Result<(), SessionError> {
        {
            let mut state = lock(&self.state);
            if !state.accounts.iter().any(|account| account.id == account_id) {
                return Err(SessionError::UnknownAccount(account_id.to_string()));
            }
            state.active_account = Some(account_id.to_string());
            state.active_bucket = None;
            state.clear_listing();
        }
        self.bump_fetch_seq();
        info!(account = account_id, "account selected");
        self.load_buckets(account_id).await
    }

    pub async fn select_account(&self, account_id: &str) -> bool {
        let _loading = LoadingGuard::enter(&self.state);
        let result = self.try_select_account(account_id).await;
        self.settle("load buckets", result).is_some()
    }

    async fn try_select_bucket(&self, account_id: &str, bucket: &str) -> Result<(), SessionError> {
        let adapter = self.adapter_for(account_id)?;
        {
            let mut state = lock(&self.state);
            state.active_account = Some(account_id.to_string());
            state.active_bucket = Some(bucket.to_string());
            state.clear_listing();
            state.breadcrumbs = breadcrumbs(bucket, "");
        }
        info!(account = account_id, bucket, "bucket opened");
        self.load_entries(adapter.as_ref(), bucket, String::new()).await
    }

    pub async fn select_bucket(&self, account_id: &str, bucket: &str) -> bool {
        let _loading = LoadingGuard::enter(&self.state);
        let result = self.try_select_bucket(account_id, bucket).await;
        self.settle("load files", result).is_some()
    }

    async fn try_navigate(&self, prefix: &str) -> Result<(), SessionError> {
        let open = self.open_bucket()?;
        self.load_entries(open.adapter.as_ref(), &open.bucket, normalize_prefix(prefix))
            .await
    }

    pub async fn navigate(&self, prefix: &str) -> bool {
        let _loading = LoadingGuard::enter(&self.state);
        let result = self.try_navigate(prefix).await;
        self.settle("load files", result).is_some()
    }

    pub async fn enter_folder(&self, entry: &StorageEntry) -> bool {
        if !entry.is_folder {
            let result: Result<(), SessionError> = Err(SessionError::NotAFolder(entry.key.clone()));
            return self.settle("open folder", result).is_some();
        }
        let prefix = {
            let state = lock(&self.state);
            format!("{}{}/", state.prefix, last_path_component(&entry.key))
        };
        self.navigate(&prefix).await
    }

    pub async fn navigate_up(&self) -> bool {
        let parent = {
            let state = lock(&self.state);
            parent_prefix(&state.prefix).to_string()
        };
        self.navigate(&parent).await
    }

    pub async fn refresh(&self) -> bool {
        let prefix = lock(&self.state).prefix.clone();
        self.navigate(&prefix).await
    }

    /// Filter the loaded level by name. An empty query restores it from the
    /// backend. Descendants of the current prefix are never searched.
    pub async fn search(&self, query: &str) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return self.refresh().await;
        }

        let result = {
            let mut state = lock(&self.state);
            if state.active_bucket.is_none() {
                Err(SessionError::NoActiveBucket)
            } else {
                state.visible = filter_entries(&state.loaded, query);
                state.search = Some(query.to_string());
                state.retain_selection();
                let found = state.visible.len();
                state.notify(
                    NotificationLevel::Info,
                    format!("Found {found} results for \"{query}\""),
                );
                Ok(())
            }
        };
        self.settle("search", result).is_some()
    }

    async fn try_create_bucket(&self, name: &str, region: &str) -> Result<(), SessionError> {
        validate_bucket_name(name)?;
        let (account_id, adapter) = self.active_account_adapter()?;
        let region = Some(region.trim()).filter(|value| !value.is_empty());
        let created = adapter.create_bucket(name, region).await?;

        if let Err(err) = self.load_buckets(&account_id).await {
            warn!(error = %err, "bucket list refresh failed, appending locally");
            lock(&self.state)
                .buckets
                .entry(account_id)
                .or_default()
                .push(created);
        }
        Ok(())
    }

    pub async fn create_bucket(&self, name: &str, region: &str) -> bool {
        let _loading = LoadingGuard::enter(&self.state);
        let result = self.try_create_bucket(name, region).await;
        let done = self.settle("create bucket", result).is_some();
        if done {
            self.notify(
                NotificationLevel::Success,
                format!("Bucket \"{name}\" created successfully"),
            );
        }
        done
    }

    async fn try_create_folder(&self, name: &str) -> Result<(), SessionError> {
        validate_entry_name(name)?;
        let open = self.open_bucket()?;
        let path = format!("{}{}/", open.prefix, name.trim());
        open.adapter.create_folder(&open.bucket, &path).await?;
        self.load_entries(open.adapter.as_ref(), &open.bucket, open.prefix.clone())
            .await
    }

    pub async fn create_folder(&self, name: &str) -> bool {
        let _loading = LoadingGuard::enter(&self.state);
        let result = self.try_create_folder(name).await;
        let done = self.settle("create folder", result).is_some();
        if done {
            self.notify(
                NotificationLevel::Success,
                format!("Folder \"{}\" created successfully", name.trim()),
            );
        }
        done
    }

    async fn try_rename_entry(&self, entry: &StorageEntry, new_name: &str) -> Result<(), SessionError> {
        validate_entry_name(new_name)?;
        let open = self.open_bucket()?;
        let mut new_key = join_prefix_key(parent_prefix(&entry.key), new_name.trim());
        if entry.is_folder {
            new_key.push('/');
        }
        if new_key == entry.key {
            return Ok(());
        }

        if let Err(err) = open
            .adapter
            .rename_object(&open.bucket, &entry.key, &new_key)
            .await
        {
            return Err(self.resync_after(&open, err).await);
        }
        self.load_entries(open.adapter.as_ref(), &open.bucket, open.prefix.clone())
            .await
    }

    pub async fn rename_entry(&self, entry: &StorageEntry, new_name: &str) -> bool {
        let _loading = LoadingGuard::enter(&self.state);
        let result = self.try_rename_entry(entry, new_name).await;
        let done = self.settle("rename", result).is_some();
        if done {
            self.notify(NotificationLevel::Success, "Renamed successfully");
        }
        done
    }

    async fn try_delete_entries(&self, keys: &[String]) -> Result<(), SessionError> {
        let open = self.open_bucket()?;
        info!(bucket = %open.bucket, count = keys.len(), "deleting entries");
        if let Err(err) = open.adapter.delete_objects(&open.bucket, keys).await {
            return Err(self.resync_after(&open, err).await);
        }
        lock(&self.state).remove_keys(keys);
        Ok(())
    }

    /// Delete `keys`. Folder keys take their descendants with them.
    pub async fn delete_entries(&self, keys: &[String]) -> bool {
        if keys.is_empty() {
            return true;
        }
        let _loading = LoadingGuard::enter(&self.state);
        let result = self.try_delete_entries(keys).await;
        let done = self.settle("delete items", result).is_some();
        if done {
            self.notify(
                NotificationLevel::Success,
                format!("{} item(s) deleted successfully", keys.len()),
            );
        }
        done
    }

    /// Upload every item into the current prefix concurrently and report per file.
    pub async fn upload(&self, files: Vec<UploadItem>) -> Option<UploadReport> {
        if files.is_empty() {
            return Some(UploadReport::default());
        }
        let _loading = LoadingGuard::enter(&self.state);
        let open = self.settle("upload files", self.open_bucket())?;

        let uploads = files.into_iter().map(|file| {
            let key = join_prefix_key(&open.prefix, &file.name);
            let adapter = open.adapter.clone();
            let bucket = open.bucket.clone();
            async move {
                let outcome = adapter.upload_file(&bucket, &key, file.content).await;
                (file.name, outcome)
            }
        });

        let mut report = UploadReport::default();
        for (name, outcome) in join_all(uploads).await {
            match outcome {
                Ok(()) => report.succeeded.push(name),
                Err(err) => {
                    warn!(file = %name, error = %err, "upload failed");
                    report.failed.push((name, err.user_message()));
                }
            }
        }

        if report.failed.is_empty() {
            self.notify(
                NotificationLevel::Success,
                format!("{} file(s) uploaded successfully", report.succeeded.len()),
            );
        } else if report.succeeded.is_empty() {
            self.notify(
                NotificationLevel::Error,
                format!("Failed to upload {} file(s)", report.failed.len()),
            );
        } else {
            let failed: Vec<&str> = report.failed.iter().map(|(name, _)| name.as_str()).collect();
            self.notify(
                NotificationLevel::Warning,
                format!(
                    "Uploaded {} file(s); failed: {}",
                    report.succeeded.len(),
                    failed.join(", ")
                ),
            );
        }

        if !report.succeeded.is_empty() {
            let refreshed = self
                .load_entries(open.adapter.as_ref(), &open.bucket, open.prefix.clone())
                .await;
            self.settle("load files", refreshed);
        }
        Some(report)
    }

    async fn try_download(&self, entry: &StorageEntry) -> Result<Vec<u8>, SessionError> {
        if entry.is_folder {
            return Err(StorageError::invalid_name(&entry.key, "folders cannot be downloaded").into());
        }
        let open = self.open_bucket()?;
        Ok(open.adapter.download_object(&open.bucket, &entry.key).await?)
    }

    pub async fn download(&self, entry: &StorageEntry) -> Option<Vec<u8>> {
        let _loading = LoadingGuard::enter(&self.state);
        let result = self.try_download(entry).await;
        let content = self.settle("download file", result)?;
        self.notify(
            NotificationLevel::Success,
            format!("Downloaded {} successfully", entry.name()),
        );
        Some(content)
    }

    async fn try_preview_url(&self, entry: &StorageEntry) -> Result<PreviewTarget, SessionError> {
        if entry.is_folder {
            return Err(StorageError::invalid_name(&entry.key, "folders have no preview").into());
        }
        let open = self.open_bucket()?;
        let url = open.adapter.get_object_url(&open.bucket, &entry.key).await?;
        Ok(PreviewTarget {
            key: entry.key.clone(),
            url,
            kind: file_kind(entry.name()),
            language: code_language(entry.name()),
        })
    }

    pub async fn request_preview_url(&self, entry: &StorageEntry) -> Option<PreviewTarget> {
        let _loading = LoadingGuard::enter(&self.state);
        let result = self.try_preview_url(entry).await;
        self.settle("generate preview", result)
    }

    /// Expiring link for `entry`; `None` with an info notice when the backend
    /// cannot share.
    pub async fn share_link(&self, entry: &StorageEntry, ttl_seconds: u64) -> Option<ShareLink> {
        let _loading = LoadingGuard::enter(&self.state);
        let open = self.settle("share", self.open_bucket())?;
        let Some(links) = open.adapter.share_links() else {
            self.notify(
                NotificationLevel::Info,
                "Sharing links are not supported for this account",
            );
            return None;
        };
        let result = links
            .generate_shareable_link(&open.bucket, &entry.key, ttl_seconds)
            .await
            .map_err(SessionError::from);
        self.settle("generate share link", result)
    }

    pub fn toggle_selection(&self, key: &str) {
        let mut state = lock(&self.state);
        if state.selection.remove(key) {
            return;
        }
        if state.visible.iter().any(|entry| entry.key == key) {
            state.selection.insert(key.to_string());
        }
    }

    pub fn select_all(&self) {
        let mut state = lock(&self.state);
        let keys: Vec<String> = state.visible.iter().map(|entry| entry.key.clone()).collect();
        state.selection.extend(keys);
    }

    pub fn clear_selection(&self) {
        lock(&self.state).selection.clear();
    }

    pub fn sort_by(&self, key: SortKey) -> SortState {
        let mut state = lock(&self.state);
        state.sort = state.sort.toggle(key);
        state.sort
    }
}
