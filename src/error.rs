use std::io;

use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use thiserror::Error;

/// Typed failures raised by storage adapters.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{}", not_found_message(.bucket, .key.as_deref()))]
    NotFound { bucket: String, key: Option<String> },
    #[error("`{0}` already exists")]
    NameConflict(String),
    #[error("name `{name}` invalid: {reason}")]
    InvalidName { name: String, reason: String },
    #[error("access denied: {0}")]
    Unauthorized(String),
    #[error("{operation} partially failed: {detail}")]
    PartialFailure { operation: String, detail: String },
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend rejected request ({code}): {message}")]
    Backend { code: String, message: String },
}

pub type StorageResult<T> = Result<T, StorageError>;

fn not_found_message(bucket: &str, key: Option<&str>) -> String {
    match key {
        Some(key) => format!("object `{key}` not found in bucket `{bucket}`"),
        None => format!("bucket `{bucket}` not found"),
    }
}

impl StorageError {
    pub fn bucket_not_found(bucket: impl Into<String>) -> Self {
        Self::NotFound {
            bucket: bucket.into(),
            key: None,
        }
    }

    pub fn object_not_found(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            bucket: bucket.into(),
            key: Some(key.into()),
        }
    }

    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn partial(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::PartialFailure {
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, Self::PartialFailure { .. })
    }

    /// Short text suitable for a toast.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { key: Some(key), .. } => format!("\"{key}\" no longer exists"),
            Self::NotFound { bucket, key: None } => format!("Bucket \"{bucket}\" not found"),
            Self::NameConflict(name) => format!("\"{name}\" already exists"),
            Self::InvalidName { reason, .. } => format!("Invalid name: {reason}"),
            Self::Unauthorized(_) => "Credentials were rejected by the storage backend".to_string(),
            Self::PartialFailure { operation, .. } => {
                format!("{operation} only partly completed, please verify the current contents")
            }
            Self::Unavailable(_) => "Storage backend is unreachable".to_string(),
            Self::Backend { message, .. } => message.clone(),
        }
    }

    /// Classify an `io::Error` raised while touching `bucket`/`key` on disk.
    pub fn from_io(err: io::Error, bucket: &str, key: Option<&str>) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound {
                bucket: bucket.to_string(),
                key: key.map(str::to_string),
            },
            io::ErrorKind::PermissionDenied => Self::Unauthorized(err.to_string()),
            io::ErrorKind::AlreadyExists => {
                Self::NameConflict(key.unwrap_or(bucket).to_string())
            }
            _ => Self::Unavailable(err.to_string()),
        }
    }

    /// Classify an S3 SDK failure by transport kind and service error code.
    pub fn from_sdk<E, R>(err: SdkError<E, R>, bucket: &str, key: Option<&str>) -> Self
    where
        E: ProvideErrorMetadata,
    {
        if matches!(err, SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)) {
            return Self::Unavailable(err.to_string());
        }

        let code = err.code().unwrap_or("Unknown").to_string();
        let message = err
            .message()
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        classify_service_code(code, message, bucket, key)
    }
}

fn classify_service_code(
    code: String,
    message: String,
    bucket: &str,
    key: Option<&str>,
) -> StorageError {
    match code.as_str() {
        "NoSuchKey" | "NotFound" => match key {
            Some(key) => StorageError::object_not_found(bucket, key),
            None => StorageError::bucket_not_found(bucket),
        },
        "NoSuchBucket" => StorageError::bucket_not_found(bucket),
        "BucketAlreadyExists" | "BucketAlreadyOwnedByYou" => {
            StorageError::NameConflict(bucket.to_string())
        }
        "InvalidBucketName" => StorageError::invalid_name(bucket, message),
        "AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "ExpiredToken" => {
            StorageError::Unauthorized(message)
        }
        _ => StorageError::Backend { code, message },
    }
}

/// Misuse of the session that never reaches an adapter.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("account `{0}` not found")]
    UnknownAccount(String),
    #[error("no account selected")]
    NoActiveAccount,
    #[error("no bucket open")]
    NoActiveBucket,
    #[error("`{0}` is not a folder")]
    NotAFolder(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Vault(#[from] crate::vault::VaultError),
}

impl SessionError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Storage(err) => err.user_message(),
            Self::Vault(err) => format!("Account store error: {err}"),
            Self::UnknownAccount(_) => "Account not found".to_string(),
            Self::NoActiveAccount => "Please select an account first".to_string(),
            Self::NoActiveBucket => "Please select a bucket first".to_string(),
            Self::NotAFolder(key) => format!("\"{key}\" is not a folder"),
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, Self::Storage(err) if err.is_partial())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_onto_taxonomy() {
        let missing = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert!(matches!(
            StorageError::from_io(missing, "b", Some("k")),
            StorageError::NotFound { key: Some(ref k), .. } if k == "k"
        ));

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(
            StorageError::from_io(denied, "b", None),
            StorageError::Unauthorized(_)
        ));

        let exists = io::Error::new(io::ErrorKind::AlreadyExists, "dup");
        assert!(matches!(
            StorageError::from_io(exists, "b", Some("k")),
            StorageError::NameConflict(ref n) if n == "k"
        ));
    }

    #[test]
    fn service_codes_are_classified() {
        let err = classify_service_code("NoSuchKey".into(), "x".into(), "b", Some("a.txt"));
        assert!(matches!(err, StorageError::NotFound { key: Some(_), .. }));

        let err = classify_service_code("BucketAlreadyOwnedByYou".into(), "x".into(), "b", None);
        assert!(matches!(err, StorageError::NameConflict(_)));

        let err = classify_service_code("SignatureDoesNotMatch".into(), "x".into(), "b", None);
        assert!(matches!(err, StorageError::Unauthorized(_)));

        let err = classify_service_code("SlowDown".into(), "busy".into(), "b", None);
        assert!(matches!(err, StorageError::Backend { ref code, .. } if code == "SlowDown"));
    }

    #[test]
    fn partial_failure_message_prompts_verification() {
        let err = StorageError::partial("Rename", "original kept");
        assert!(err.is_partial());
        assert!(err.user_message().contains("verify"));
    }
}
