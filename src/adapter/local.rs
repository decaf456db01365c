//! Filesystem-backed adapter: every subdirectory of the root is a bucket and
//! object keys map onto relative paths inside it.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use super::StorageAdapter;
use crate::error::{StorageError, StorageResult};
use crate::models::{Bucket, DirectoryChild, StorageEntry};
use crate::naming::{ensure_key_safe, normalize_prefix, sanitize_relative_path, validate_bucket_name};

#[derive(Debug, Clone)]
pub struct LocalAdapter {
    root: PathBuf,
}

impl LocalAdapter {
    /// Open `root`, which must be an existing directory.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let display = root.as_ref().display().to_string();
        let root = std::fs::canonicalize(root.as_ref())
            .map_err(|err| StorageError::from_io(err, &display, None))?;
        if !root.is_dir() {
            return Err(StorageError::invalid_name(display, "local root is not a directory"));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_root(&self, bucket: &str) -> StorageResult<PathBuf> {
        let relative = sanitize_relative_path(bucket)
            .filter(|path| path.components().count() == 1)
            .ok_or_else(|| StorageError::invalid_name(bucket, "invalid bucket directory"))?;
        Ok(self.root.join(relative))
    }

    async fn existing_bucket_root(&self, bucket: &str) -> StorageResult<PathBuf> {
        let path = self.bucket_root(bucket)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Ok(path),
            Ok(_) => Err(StorageError::bucket_not_found(bucket)),
            Err(err) => Err(StorageError::from_io(err, bucket, None)),
        }
    }

    fn object_path(&self, bucket_root: &Path, key: &str) -> StorageResult<PathBuf> {
        ensure_key_safe(key)?;
        let relative = sanitize_relative_path(key)
            .ok_or_else(|| StorageError::invalid_name(key, "key escapes bucket directory"))?;
        let path = bucket_root.join(relative);
        if path == bucket_root {
            return Err(StorageError::invalid_name(key, "key names the bucket itself"));
        }
        Ok(path)
    }

    async fn delete_one(&self, bucket: &str, bucket_root: &Path, key: &str) -> StorageResult<()> {
        let path = self.object_path(bucket_root, key)?;
        let result = if key.ends_with('/') {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        result.map_err(|err| StorageError::from_io(err, bucket, Some(key)))?;
        debug!("removed {}", path.display());
        Ok(())
    }
}

fn to_utc(time: io::Result<SystemTime>) -> Option<DateTime<Utc>> {
    time.ok().map(DateTime::<Utc>::from)
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Enumerate the immediate children of a host directory.
pub async fn browse_directory(path: impl AsRef<Path>) -> StorageResult<Vec<DirectoryChild>> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let mut reader = fs::read_dir(path)
        .await
        .map_err(|err| StorageError::from_io(err, &display, None))?;

    let mut children = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|err| StorageError::from_io(err, &display, None))?
    {
        let is_directory = entry
            .file_type()
            .await
            .map(|kind| kind.is_dir())
            .unwrap_or(false);
        children.push(DirectoryChild {
            name: entry.file_name().to_string_lossy().to_string(),
            is_directory,
        });
    }
    children.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(children)
}

#[async_trait]
impl StorageAdapter for LocalAdapter {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn list_buckets(&self) -> StorageResult<Vec<Bucket>> {
        let root = self.root.display().to_string();
        let mut reader = fs::read_dir(&self.root)
            .await
            .map_err(|err| StorageError::from_io(err, &root, None))?;

        let mut buckets = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|err| StorageError::from_io(err, &root, None))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if is_hidden(&name) {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_dir() {
                continue;
            }
            buckets.push(Bucket {
                name,
                created_at: to_utc(meta.created()).or_else(|| to_utc(meta.modified())),
                region: None,
                is_local: true,
            });
        }
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    async fn create_bucket(&self, name: &str, _region: Option<&str>) -> StorageResult<Bucket> {
        validate_bucket_name(name)?;
        let path = self.bucket_root(name)?;
        fs::create_dir(&path).await.map_err(|err| match err.kind() {
            io::ErrorKind::AlreadyExists => StorageError::NameConflict(name.to_string()),
            _ => StorageError::from_io(err, name, None),
        })?;
        debug!("created bucket directory {}", path.display());

        Ok(Bucket {
            name: name.to_string(),
            created_at: Some(Utc::now()),
            region: None,
            is_local: true,
        })
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<StorageEntry>> {
        let bucket_root = self.existing_bucket_root(bucket).await?;
        let prefix = normalize_prefix(prefix);
        let dir = if prefix.is_empty() {
            bucket_root
        } else {
            self.object_path(&bucket_root, &prefix)?
        };

        let mut reader = fs::read_dir(&dir)
            .await
            .map_err(|err| StorageError::from_io(err, bucket, Some(&prefix)))?;

        let mut entries = Vec::new();
        while let Some(child) = reader
            .next_entry()
            .await
            .map_err(|err| StorageError::from_io(err, bucket, Some(&prefix)))?
        {
            let name = child.file_name().to_string_lossy().to_string();
            // Skips in-flight upload temp files as well as dotfiles.
            if is_hidden(&name) {
                continue;
            }
            let Ok(meta) = child.metadata().await else {
                continue;
            };

            let mut entry = if meta.is_dir() {
                let mut folder = StorageEntry::folder(format!("{prefix}{name}"));
                folder.last_modified = to_utc(meta.modified());
                folder
            } else {
                StorageEntry::file(format!("{prefix}{name}"), meta.len(), to_utc(meta.modified()))
            };
            entry.is_local = true;
            entries.push(entry);
        }

        Ok(entries)
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StorageResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let bucket_root = self.existing_bucket_root(bucket).await?;

        let mut failures: Vec<(String, StorageError)> = Vec::new();
        for key in keys {
            if let Err(err) = self.delete_one(bucket, &bucket_root, key).await {
                failures.push((key.clone(), err));
            }
        }

        if failures.is_empty() {
            return Ok(());
        }
        if failures.len() == keys.len() {
            let (_, first) = failures.swap_remove(0);
            return Err(first);
        }
        let detail = failures
            .iter()
            .map(|(key, err)| format!("{key}: {err}"))
            .collect::<Vec<_>>()
            .join("; ");
        Err(StorageError::partial("Delete", detail))
    }

    async fn upload_file(&self, bucket: &str, key: &str, content: Vec<u8>) -> StorageResult<()> {
        let bucket_root = self.existing_bucket_root(bucket).await?;
        let path = self.object_path(&bucket_root, key)?;
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| StorageError::invalid_name(key, "object path has no parent"))?;
        let io_err = |err: io::Error| StorageError::from_io(err, bucket, Some(key));

        fs::create_dir_all(&parent).await.map_err(io_err)?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let written: io::Result<()> = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(&content).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &path).await
        }
        .await;

        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(io_err(err));
        }
        debug!(bytes = content.len(), "wrote {}", path.display());
        Ok(())
    }

    async fn download_object(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        let bucket_root = self.existing_bucket_root(bucket).await?;
        let path = self.object_path(&bucket_root, key)?;
        fs::read(&path)
            .await
            .map_err(|err| StorageError::from_io(err, bucket, Some(key)))
    }

    async fn get_object_url(&self, bucket: &str, key: &str) -> StorageResult<String> {
        let bucket_root = self.existing_bucket_root(bucket).await?;
        let path = self.object_path(&bucket_root, key)?;
        if fs::metadata(&path).await.is_err() {
            return Err(StorageError::object_not_found(bucket, key));
        }
        Url::from_file_path(&path)
            .map(|url| url.to_string())
            .map_err(|_| StorageError::invalid_name(key, "path cannot be expressed as a URL"))
    }

    async fn create_folder(&self, bucket: &str, path: &str) -> StorageResult<()> {
        let bucket_root = self.existing_bucket_root(bucket).await?;
        let key = normalize_prefix(path);
        let dir = self.object_path(&bucket_root, &key)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|err| StorageError::from_io(err, bucket, Some(&key)))
    }

    async fn rename_object(
        &self,
        bucket: &str,
        old_key: &str,
        new_key: &str,
    ) -> StorageResult<()> {
        let bucket_root = self.existing_bucket_root(bucket).await?;
        let from = self.object_path(&bucket_root, old_key)?;
        let to = self.object_path(&bucket_root, new_key)?;

        if fs::metadata(&from).await.is_err() {
            return Err(StorageError::object_not_found(bucket, old_key));
        }
        if fs::metadata(&to).await.is_ok() {
            return Err(StorageError::NameConflict(new_key.to_string()));
        }
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| StorageError::from_io(err, bucket, Some(new_key)))?;
        }
        fs::rename(&from, &to)
            .await
            .map_err(|err| StorageError::from_io(err, bucket, Some(old_key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn adapter_with_bucket(name: &str) -> (TempDir, LocalAdapter) {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalAdapter::new(dir.path()).unwrap();
        adapter.create_bucket(name, None).await.unwrap();
        (dir, adapter)
    }

    fn keys(entries: &[StorageEntry]) -> Vec<String> {
        let mut keys: Vec<String> = entries.iter().map(|e| e.key.clone()).collect();
        keys.sort();
        keys
    }

    #[tokio::test]
    async fn buckets_are_top_level_directories() {
        let (dir, adapter) = adapter_with_bucket("photos").await;
        std::fs::write(dir.path().join("stray.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join(".hidden")).unwrap();

        let buckets = adapter.list_buckets().await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].name, "photos");
        assert!(buckets[0].is_local);
    }

    #[tokio::test]
    async fn create_bucket_enforces_policy_and_uniqueness() {
        let (_dir, adapter) = adapter_with_bucket("my-bucket").await;
        assert!(matches!(
            adapter.create_bucket("my-bucket", None).await,
            Err(StorageError::NameConflict(_))
        ));
        assert!(matches!(
            adapter.create_bucket("My Bucket", None).await,
            Err(StorageError::InvalidName { .. })
        ));
    }

    #[tokio::test]
    async fn listing_returns_immediate_children_only() {
        let (_dir, adapter) = adapter_with_bucket("data").await;
        adapter
            .upload_file("data", "docs/2024/deep.txt", b"deep".to_vec())
            .await
            .unwrap();
        adapter
            .upload_file("data", "docs/readme.md", b"hi".to_vec())
            .await
            .unwrap();
        adapter.upload_file("data", "top.txt", b"t".to_vec()).await.unwrap();

        let root = adapter.list_objects("data", "").await.unwrap();
        assert_eq!(keys(&root), vec!["docs/", "top.txt"]);
        assert!(root.iter().all(|e| e.is_local));

        let docs = adapter.list_objects("data", "docs/").await.unwrap();
        assert_eq!(keys(&docs), vec!["docs/2024/", "docs/readme.md"]);
        let readme = docs.iter().find(|e| e.key == "docs/readme.md").unwrap();
        assert_eq!(readme.size, 2);
        assert!(!readme.is_folder);
        let folder = docs.iter().find(|e| e.is_folder).unwrap();
        assert_eq!(folder.size, 0);
    }

    #[tokio::test]
    async fn upload_overwrites_and_download_round_trips() {
        let (_dir, adapter) = adapter_with_bucket("data").await;
        adapter.upload_file("data", "a.txt", b"one".to_vec()).await.unwrap();
        adapter.upload_file("data", "a.txt", b"two".to_vec()).await.unwrap();
        assert_eq!(adapter.download_object("data", "a.txt").await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn download_of_missing_key_is_not_found() {
        let (_dir, adapter) = adapter_with_bucket("data").await;
        assert!(matches!(
            adapter.download_object("data", "nope.txt").await,
            Err(StorageError::NotFound { key: Some(_), .. })
        ));
        assert!(matches!(
            adapter.list_objects("missing", "").await,
            Err(StorageError::NotFound { key: None, .. })
        ));
    }

    #[tokio::test]
    async fn folder_delete_cascades_and_partial_failures_are_reported() {
        let (_dir, adapter) = adapter_with_bucket("data").await;
        adapter.create_folder("data", "logs").await.unwrap();
        adapter.upload_file("data", "logs/1.log", b"1".to_vec()).await.unwrap();
        adapter.upload_file("data", "keep.txt", b"k".to_vec()).await.unwrap();

        adapter
            .delete_objects("data", &["logs/".to_string()])
            .await
            .unwrap();
        assert_eq!(keys(&adapter.list_objects("data", "").await.unwrap()), vec!["keep.txt"]);

        let err = adapter
            .delete_objects("data", &["keep.txt".to_string(), "ghost.txt".to_string()])
            .await
            .unwrap_err();
        assert!(err.is_partial());
        assert!(adapter.list_objects("data", "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rename_moves_files_and_folders() {
        let (_dir, adapter) = adapter_with_bucket("data").await;
        adapter.upload_file("data", "old.txt", b"x".to_vec()).await.unwrap();
        adapter.upload_file("data", "dir/inner.txt", b"y".to_vec()).await.unwrap();
        adapter.upload_file("data", "taken.txt", b"z".to_vec()).await.unwrap();

        adapter.rename_object("data", "old.txt", "new.txt").await.unwrap();
        adapter.rename_object("data", "dir/", "moved/").await.unwrap();
        assert_eq!(
            keys(&adapter.list_objects("data", "").await.unwrap()),
            vec!["moved/", "new.txt", "taken.txt"]
        );
        assert_eq!(adapter.download_object("data", "moved/inner.txt").await.unwrap(), b"y");

        assert!(matches!(
            adapter.rename_object("data", "new.txt", "taken.txt").await,
            Err(StorageError::NameConflict(_))
        ));
        adapter.create_folder("data", "other").await.unwrap();
        assert!(matches!(
            adapter.rename_object("data", "moved/", "other/").await,
            Err(StorageError::NameConflict(_))
        ));
        assert_eq!(adapter.download_object("data", "moved/inner.txt").await.unwrap(), b"y");
    }

    #[tokio::test]
    async fn object_urls_are_file_urls() {
        let (_dir, adapter) = adapter_with_bucket("data").await;
        adapter.upload_file("data", "pic.png", b"png".to_vec()).await.unwrap();
        let url = adapter.get_object_url("data", "pic.png").await.unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("/data/pic.png"));
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let (_dir, adapter) = adapter_with_bucket("data").await;
        assert!(matches!(
            adapter.upload_file("data", "../escape.txt", b"x".to_vec()).await,
            Err(StorageError::InvalidName { .. })
        ));
    }

    #[tokio::test]
    async fn deleting_dot_key_leaves_bucket_intact() {
        let (_dir, adapter) = adapter_with_bucket("data").await;
        adapter.upload_file("data", "keep.txt", b"k".to_vec()).await.unwrap();
        adapter.upload_file("data", "docs/a.txt", b"a".to_vec()).await.unwrap();

        for key in ["./", "docs/./", "docs//"] {
            let result = adapter.delete_objects("data", &[key.to_string()]).await;
            assert!(
                matches!(result, Err(StorageError::InvalidName { .. })),
                "{key} should be refused"
            );
        }
        assert_eq!(
            keys(&adapter.list_objects("data", "").await.unwrap()),
            vec!["docs/", "keep.txt"]
        );
        assert_eq!(
            keys(&adapter.list_objects("data", "docs/").await.unwrap()),
            vec!["docs/a.txt"]
        );
    }

    #[tokio::test]
    async fn browse_lists_children_with_directory_flag() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("file.bin"), b"1").unwrap();

        let children = browse_directory(dir.path()).await.unwrap();
        assert_eq!(
            children,
            vec![
                DirectoryChild { name: "file.bin".into(), is_directory: false },
                DirectoryChild { name: "sub".into(), is_directory: true },
            ]
        );
    }
}
