use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::models::{Account, AccountInfo, BreadcrumbSegment, Bucket, StorageEntry};

#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    #[default]
    Name,
    Size,
    LastModified,
}

#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq)]
pub struct SortState {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl SortState {
    /// Same key flips the direction, a new key starts ascending.
    pub fn toggle(self, key: SortKey) -> Self {
        if self.key == key {
            let direction = match self.direction {
                SortDirection::Ascending => SortDirection::Descending,
                SortDirection::Descending => SortDirection::Ascending,
            };
            Self { key, direction }
        } else {
            Self {
                key,
                direction: SortDirection::Ascending,
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

/// Where the session is in account -> bucket -> prefix navigation.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Idle,
    AccountSelected,
    BucketOpen,
}

#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub accounts: Vec<Account>,
    pub buckets: HashMap<String, Vec<Bucket>>,
    pub active_account: Option<String>,
    pub active_bucket: Option<String>,
    pub prefix: String,
    /// Result of the last successful fetch for `prefix`.
    pub loaded: Vec<StorageEntry>,
    /// What is shown; differs from `loaded` only while a search is applied.
    pub visible: Vec<StorageEntry>,
    pub search: Option<String>,
    pub breadcrumbs: Vec<BreadcrumbSegment>,
    pub selection: BTreeSet<String>,
    pub sort: SortState,
    pub in_flight: usize,
    pub notifications: Vec<Notification>,
}

impl SessionState {
    pub fn phase(&self) -> Phase {
        match (&self.active_account, &self.active_bucket) {
            (None, _) => Phase::Idle,
            (Some(_), None) => Phase::AccountSelected,
            (Some(_), Some(_)) => Phase::BucketOpen,
        }
    }

    pub fn clear_listing(&mut self) {
        self.prefix.clear();
        self.loaded.clear();
        self.visible.clear();
        self.search = None;
        self.breadcrumbs.clear();
        self.selection.clear();
    }

    /// Install a freshly fetched listing for `prefix`.
    pub fn apply_listing(&mut self, bucket: &str, prefix: String, entries: Vec<StorageEntry>) {
        self.breadcrumbs = breadcrumbs(bucket, &prefix);
        self.prefix = prefix;
        self.visible = entries.clone();
        self.loaded = entries;
        self.search = None;
        self.retain_selection();
    }

    pub fn remove_keys(&mut self, keys: &[String]) {
        self.loaded.retain(|entry| !keys.contains(&entry.key));
        self.visible.retain(|entry| !keys.contains(&entry.key));
        self.retain_selection();
    }

    /// Drop selected keys that are no longer visible.
    pub fn retain_selection(&mut self) {
        let visible = &self.visible;
        self.selection
            .retain(|key| visible.iter().any(|entry| &entry.key == key));
    }

    pub fn notify(&mut self, level: NotificationLevel, message: impl Into<String>) {
        self.notifications.push(Notification {
            level,
            message: message.into(),
        });
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let mut entries = self.visible.clone();
        sort_entries(&mut entries, self.sort);
        SessionSnapshot {
            phase: self.phase(),
            accounts: self.accounts.iter().map(AccountInfo::from).collect(),
            buckets: self.buckets.clone(),
            active_account: self.active_account.clone(),
            active_bucket: self.active_bucket.clone(),
            prefix: self.prefix.clone(),
            entries,
            breadcrumbs: self.breadcrumbs.clone(),
            selection: self.selection.iter().cloned().collect(),
            sort: self.sort,
            search: self.search.clone(),
            is_loading: self.in_flight > 0,
        }
    }
}

/// Read-only view handed to the presentation layer.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub accounts: Vec<AccountInfo>,
    pub buckets: HashMap<String, Vec<Bucket>>,
    pub active_account: Option<String>,
    pub active_bucket: Option<String>,
    pub prefix: String,
    /// Visible entries, already sorted for display.
    pub entries: Vec<StorageEntry>,
    pub breadcrumbs: Vec<BreadcrumbSegment>,
    pub selection: Vec<String>,
    pub sort: SortState,
    pub search: Option<String>,
    pub is_loading: bool,
}

impl SessionSnapshot {
    pub fn entry_keys(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.key.as_str()).collect()
    }
}

/// Bucket root first, then one segment per non-empty component of `prefix`.
pub fn breadcrumbs(bucket: &str, prefix: &str) -> Vec<BreadcrumbSegment> {
    let mut segments = vec![BreadcrumbSegment {
        name: bucket.to_string(),
        path: String::new(),
    }];

    let mut accumulated = String::new();
    for part in prefix.split('/').filter(|part| !part.is_empty()) {
        accumulated.push_str(part);
        accumulated.push('/');
        segments.push(BreadcrumbSegment {
            name: part.to_string(),
            path: accumulated.clone(),
        });
    }
    segments
}

/// Folders always precede files; `sort` orders within each group.
pub fn sort_entries(entries: &mut [StorageEntry], sort: SortState) {
    entries.sort_by(|a, b| {
        b.is_folder.cmp(&a.is_folder).then_with(|| {
            let ordering = match sort.key {
                SortKey::Name => a.key.cmp(&b.key),
                SortKey::Size => a.size.cmp(&b.size),
                SortKey::LastModified => a.last_modified.cmp(&b.last_modified),
            };
            match sort.direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        })
    });
}

/// Case-insensitive substring match on entry names. Only the given level is
/// inspected, descendants are never searched.
pub fn filter_entries(entries: &[StorageEntry], query: &str) -> Vec<StorageEntry> {
    let needle = query.to_lowercase();
    entries
        .iter()
        .filter(|entry| entry.name().to_lowercase().contains(&needle))
        .cloned()
        .collect()
}
