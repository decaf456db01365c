use std::path::{Component, Path, PathBuf};

use crate::error::{StorageError, StorageResult};

const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const MAX_OBJECT_KEY_LEN: usize = 1024;

/// Check `name` against the bucket naming policy:
/// 3-63 chars of `[a-z0-9.-]`, alphanumeric at both ends, no `..`.
pub fn validate_bucket_name(name: &str) -> StorageResult<()> {
    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return Err(StorageError::invalid_name(
            name,
            "must be between 3 and 63 characters",
        ));
    }

    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return Err(StorageError::invalid_name(
            name,
            "allowed characters are lowercase letters, digits, dots, and hyphens",
        ));
    }

    let alphanumeric = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !alphanumeric(name.chars().next()) || !alphanumeric(name.chars().last()) {
        return Err(StorageError::invalid_name(
            name,
            "must start and end with a lowercase letter or digit",
        ));
    }

    if name.contains("..") {
        return Err(StorageError::invalid_name(
            name,
            "cannot contain consecutive periods",
        ));
    }

    Ok(())
}

/// Validate a single path segment typed by the user (folder or rename target).
pub fn validate_entry_name(name: &str) -> StorageResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(StorageError::invalid_name(name, "name cannot be empty"));
    }
    if trimmed.contains('/') || trimmed.contains('\\') {
        return Err(StorageError::invalid_name(
            name,
            "name cannot contain path separators",
        ));
    }
    if trimmed == "." || trimmed == ".." {
        return Err(StorageError::invalid_name(name, "reserved name"));
    }
    Ok(())
}

/// Basic key validation for backends that map keys onto paths.
pub fn ensure_key_safe(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
        return Err(StorageError::invalid_name(key, "invalid object key length"));
    }
    if key.starts_with('/') {
        return Err(StorageError::invalid_name(key, "key cannot be absolute"));
    }
    if key
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
    {
        return Err(StorageError::invalid_name(
            key,
            "key contains control characters",
        ));
    }
    // Only a folder key's trailing slash may leave an empty segment.
    let body = key.strip_suffix('/').unwrap_or(key);
    if body
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StorageError::invalid_name(
            key,
            "key cannot contain empty, `.` or `..` segments",
        ));
    }
    Ok(())
}

/// Empty stays empty; anything else ends in exactly one `/`.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_start_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

/// Key for `name` inside the folder `prefix`.
pub fn join_prefix_key(prefix: &str, key: &str) -> String {
    format!("{}{}", normalize_prefix(prefix), key)
}

/// Map an object key onto a relative path, refusing anything that would
/// escape the bucket directory.
pub fn sanitize_relative_path(relative_path: &str) -> Option<PathBuf> {
    let candidate = Path::new(relative_path.trim_end_matches('/'));
    if candidate.is_absolute() {
        return None;
    }
    if candidate
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(candidate.to_path_buf())
}
