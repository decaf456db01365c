#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use cloudglide_lib::adapter::{AdapterSettings, ShareLinks, StorageAdapter};
use cloudglide_lib::error::{StorageError, StorageResult};
use cloudglide_lib::models::{Account, AccountInput, Bucket, ShareLink, StorageEntry};
use cloudglide_lib::session::{AdapterFactory, StorageSession};

type Objects = BTreeMap<String, Vec<u8>>;

/// In-memory backend with knobs for latency and injected failures.
#[derive(Default)]
pub struct MemoryAdapter {
    buckets: Mutex<BTreeMap<String, Objects>>,
    list_delays: Mutex<HashMap<String, Duration>>,
    fail_lists: Mutex<bool>,
    failing_uploads: Mutex<HashSet<String>>,
    partial_renames: Mutex<bool>,
    sharing: bool,
}

impl MemoryAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_sharing() -> Arc<Self> {
        Arc::new(Self {
            sharing: true,
            ..Self::default()
        })
    }

    pub fn add_bucket(&self, name: &str) {
        self.buckets
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default();
    }

    pub fn put(&self, bucket: &str, key: &str, content: &[u8]) {
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), content.to_vec());
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn delay_listing(&self, prefix: &str, delay: Duration) {
        self.list_delays
            .lock()
            .unwrap()
            .insert(prefix.to_string(), delay);
    }

    pub fn fail_listings(&self, fail: bool) {
        *self.fail_lists.lock().unwrap() = fail;
    }

    pub fn fail_upload_of(&self, key: &str) {
        self.failing_uploads.lock().unwrap().insert(key.to_string());
    }

    pub fn leave_originals_on_rename(&self) {
        *self.partial_renames.lock().unwrap() = true;
    }

    fn with_bucket<T>(
        &self,
        bucket: &str,
        f: impl FnOnce(&mut Objects) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut buckets = self.buckets.lock().unwrap();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::bucket_not_found(bucket))?;
        f(objects)
    }
}

fn stamp() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn list_buckets(&self) -> StorageResult<Vec<Bucket>> {
        Ok(self
            .buckets
            .lock()
            .unwrap()
            .keys()
            .map(|name| Bucket {
                name: name.clone(),
                created_at: Some(stamp()),
                region: None,
                is_local: false,
            })
            .collect())
    }

    async fn create_bucket(&self, name: &str, region: Option<&str>) -> StorageResult<Bucket> {
        let mut buckets = self.buckets.lock().unwrap();
        if buckets.contains_key(name) {
            return Err(StorageError::NameConflict(name.to_string()));
        }
        buckets.insert(name.to_string(), Objects::new());
        Ok(Bucket {
            name: name.to_string(),
            created_at: Some(stamp()),
            region: region.map(str::to_string),
            is_local: false,
        })
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<StorageEntry>> {
        let delay = self.list_delays.lock().unwrap().get(prefix).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_lists.lock().unwrap() {
            return Err(StorageError::Unavailable("listing disabled".into()));
        }

        self.with_bucket(bucket, |objects| {
            let mut folders = BTreeSet::new();
            let mut files = Vec::new();
            for (key, content) in objects.range(prefix.to_string()..) {
                let Some(rest) = key.strip_prefix(prefix) else {
                    break;
                };
                if rest.is_empty() {
                    continue;
                }
                match rest.find('/') {
                    Some(pos) => {
                        folders.insert(format!("{prefix}{}", &rest[..=pos]));
                    }
                    None => files.push(StorageEntry::file(
                        key.clone(),
                        content.len() as u64,
                        Some(stamp()),
                    )),
                }
            }
            let mut entries: Vec<StorageEntry> =
                folders.into_iter().map(StorageEntry::folder).collect();
            entries.extend(files);
            Ok(entries)
        })
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StorageResult<()> {
        self.with_bucket(bucket, |objects| {
            for key in keys {
                if key.ends_with('/') {
                    objects.retain(|existing, _| !existing.starts_with(key.as_str()));
                } else {
                    objects.remove(key);
                }
            }
            Ok(())
        })
    }

    async fn upload_file(&self, bucket: &str, key: &str, content: Vec<u8>) -> StorageResult<()> {
        if self.failing_uploads.lock().unwrap().contains(key) {
            return Err(StorageError::Unavailable(format!("upload of {key} refused")));
        }
        self.with_bucket(bucket, |objects| {
            objects.insert(key.to_string(), content);
            Ok(())
        })
    }

    async fn download_object(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        self.with_bucket(bucket, |objects| {
            objects
                .get(key)
                .cloned()
                .ok_or_else(|| StorageError::object_not_found(bucket, key))
        })
    }

    async fn get_object_url(&self, bucket: &str, key: &str) -> StorageResult<String> {
        Ok(format!("memory://{bucket}/{key}"))
    }

    async fn create_folder(&self, bucket: &str, path: &str) -> StorageResult<()> {
        self.with_bucket(bucket, |objects| {
            objects.insert(path.to_string(), Vec::new());
            Ok(())
        })
    }

    async fn rename_object(&self, bucket: &str, old_key: &str, new_key: &str) -> StorageResult<()> {
        let keep_original = *self.partial_renames.lock().unwrap();
        self.with_bucket(bucket, |objects| {
            let taken = objects.contains_key(new_key)
                || (new_key.ends_with('/') && objects.keys().any(|key| key.starts_with(new_key)));
            if taken {
                return Err(StorageError::NameConflict(new_key.to_string()));
            }
            let moved: Vec<String> = objects
                .keys()
                .filter(|key| {
                    key.as_str() == old_key || (old_key.ends_with('/') && key.starts_with(old_key))
                })
                .cloned()
                .collect();
            if moved.is_empty() {
                return Err(StorageError::object_not_found(bucket, old_key));
            }
            for key in moved {
                let content = objects[&key].clone();
                let target = format!("{new_key}{}", &key[old_key.len()..]);
                objects.insert(target, content);
                if !keep_original {
                    objects.remove(&key);
                }
            }
            if keep_original {
                return Err(StorageError::partial("Rename", "copy landed, original kept"));
            }
            Ok(())
        })
    }

    fn share_links(&self) -> Option<&dyn ShareLinks> {
        if self.sharing {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl ShareLinks for MemoryAdapter {
    async fn generate_shareable_link(
        &self,
        bucket: &str,
        key: &str,
        ttl_seconds: u64,
    ) -> StorageResult<ShareLink> {
        Ok(ShareLink {
            url: format!("memory://{bucket}/{key}?ttl={ttl_seconds}"),
            expires_at: Utc::now() + chrono::Duration::seconds(ttl_seconds as i64),
            key: key.to_string(),
        })
    }
}

pub fn memory_account() -> Account {
    Account::from_input(AccountInput {
        name: "memory".into(),
        access_key: "test".into(),
        secret_key: "test".into(),
        region: "us-east-1".into(),
        ..AccountInput::default()
    })
}

/// Session whose every account is served by `adapter`.
pub fn session_over(adapter: &Arc<MemoryAdapter>) -> (StorageSession, String) {
    let shared: Arc<dyn StorageAdapter> = adapter.clone();
    let factory: AdapterFactory = Arc::new(
        move |_: &Account, _: &AdapterSettings| -> StorageResult<Arc<dyn StorageAdapter>> {
            Ok(shared.clone())
        },
    );
    let account = memory_account();
    let id = account.id.clone();
    let session = StorageSession::with_factory(AdapterSettings::default(), factory)
        .with_accounts(vec![account]);
    (session, id)
}

/// Session already inside `bucket` at its root.
pub async fn open_session(adapter: &Arc<MemoryAdapter>, bucket: &str) -> StorageSession {
    let (session, id) = session_over(adapter);
    assert!(session.select_account(&id).await);
    assert!(session.select_bucket(&id, bucket).await);
    session.take_notifications();
    session
}
