use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A connection to one storage backend.
///
/// When `is_local` is set the credentials and region are never read; the
/// account is served from `local_path` instead.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub name: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub endpoint: Option<String>,
    #[serde(default)]
    pub is_local: bool,
    pub local_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

/// Payload of the add-account intent.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInput {
    pub name: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub region: String,
    pub endpoint: Option<String>,
    #[serde(default)]
    pub is_local: bool,
    pub local_path: Option<PathBuf>,
}

impl Account {
    pub fn from_input(input: AccountInput) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            access_key: input.access_key,
            secret_key: input.secret_key,
            region: input.region,
            endpoint: input.endpoint,
            is_local: input.is_local,
            local_path: input.local_path,
            created_at: Utc::now(),
        }
    }

    pub fn local(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self::from_input(AccountInput {
            name: name.into(),
            is_local: true,
            local_path: Some(root.into()),
            ..AccountInput::default()
        })
    }
}

/// Account as shown to the presentation layer, without credentials.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub id: String,
    pub name: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub is_local: bool,
    pub local_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl From<&Account> for AccountInfo {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            name: account.name.clone(),
            region: account.region.clone(),
            endpoint: account.endpoint.clone(),
            is_local: account.is_local,
            local_path: account.local_path.clone(),
            created_at: account.created_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub region: Option<String>,
    #[serde(default)]
    pub is_local: bool,
}

/// A file or folder returned by a listing. Folder keys end in `/`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageEntry {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub is_folder: bool,
    pub storage_class: Option<String>,
    #[serde(default)]
    pub is_local: bool,
    pub content_hash: Option<String>,
}

impl StorageEntry {
    pub fn file(key: impl Into<String>, size: u64, last_modified: Option<DateTime<Utc>>) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified,
            is_folder: false,
            storage_class: None,
            is_local: false,
            content_hash: None,
        }
    }

    pub fn folder(key: impl Into<String>) -> Self {
        let mut key = key.into();
        if !key.ends_with('/') {
            key.push('/');
        }
        Self {
            key,
            size: 0,
            last_modified: None,
            is_folder: true,
            storage_class: None,
            is_local: false,
            content_hash: None,
        }
    }

    /// Last non-empty path component, without the folder slash.
    pub fn name(&self) -> &str {
        last_path_component(&self.key)
    }

    /// Prefix that contains this entry, empty at the bucket root.
    pub fn parent_prefix(&self) -> &str {
        parent_prefix(&self.key)
    }
}

pub fn last_path_component(key: &str) -> &str {
    key.trim_end_matches('/').rsplit('/').next().unwrap_or_default()
}

pub fn parent_prefix(key: &str) -> &str {
    let trimmed = key.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(pos) => &key[..=pos],
        None => "",
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct BreadcrumbSegment {
    pub name: String,
    pub path: String,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShareLink {
    pub url: String,
    pub expires_at: DateTime<Utc>,
    pub key: String,
}

/// Immediate child of a host directory, as enumerated by the host bridge.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryChild {
    pub name: String,
    pub is_directory: bool,
}
