//! Encrypted account store.
//!
//! Accounts (including their secret keys) are serialized to JSON and sealed
//! with AES-256-GCM under a key derived from the user's passphrase with
//! PBKDF2-HMAC-SHA512. The file on disk only holds the salt, the IV and the
//! ciphertext, all base64 encoded.

use std::fs;
use std::path::{Path, PathBuf};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use thiserror::Error;

use crate::models::Account;

const CURRENT_VAULT_VERSION: u8 = 1;
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;
const KEY_BYTES: usize = 32;
const SALT_BYTES: usize = 32;
const IV_BYTES: usize = 12;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault already exists at {0}")]
    AlreadyExists(PathBuf),
    #[error("no vault at {0}")]
    Missing(PathBuf),
    #[error("invalid passphrase")]
    InvalidPassphrase,
    #[error("vault file is corrupt: {0}")]
    Corrupt(String),
    #[error("unsupported vault version {0}")]
    UnsupportedVersion(u8),
    #[error("vault encryption failed")]
    Encryption,
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VaultFile {
    version: u8,
    iterations: u32,
    salt: String,
    iv: String,
    data: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct VaultData {
    accounts: Vec<Account>,
}

/// An unlocked vault. Dropping it forgets the derived key.
pub struct Vault {
    path: PathBuf,
    key: [u8; KEY_BYTES],
    salt: Vec<u8>,
    iterations: u32,
    data: VaultData,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("path", &self.path)
            .field("accounts", &self.data.accounts.len())
            .finish_non_exhaustive()
    }
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

fn decode_base64(input: &str) -> Result<Vec<u8>, VaultError> {
    BASE64
        .decode(input)
        .map_err(|err| VaultError::Corrupt(format!("invalid base64 payload: {err}")))
}

fn derive_key(passphrase: &str, salt: &[u8], iterations: u32) -> [u8; KEY_BYTES] {
    let mut key = [0u8; KEY_BYTES];
    pbkdf2_hmac::<Sha512>(passphrase.as_bytes(), salt, iterations, &mut key);
    key
}

fn encrypt_payload(key: &[u8; KEY_BYTES], plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), VaultError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| VaultError::Encryption)?;
    let iv = random_bytes::<IV_BYTES>();
    let nonce = Nonce::from_slice(&iv);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| VaultError::Encryption)?;

    Ok((iv.to_vec(), ciphertext))
}

fn decrypt_payload(key: &[u8; KEY_BYTES], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, VaultError> {
    if iv.len() != IV_BYTES {
        return Err(VaultError::Corrupt("invalid IV length".to_string()));
    }

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| VaultError::Encryption)?;
    let nonce = Nonce::from_slice(iv);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| VaultError::InvalidPassphrase)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> VaultError + '_ {
    move |source| VaultError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl Vault {
    pub fn create(path: impl Into<PathBuf>, passphrase: &str) -> Result<Self, VaultError> {
        Self::create_with_iterations(path, passphrase, DEFAULT_PBKDF2_ITERATIONS)
    }

    pub fn create_with_iterations(
        path: impl Into<PathBuf>,
        passphrase: &str,
        iterations: u32,
    ) -> Result<Self, VaultError> {
        let path = path.into();
        if path.exists() {
            return Err(VaultError::AlreadyExists(path));
        }

        let salt = random_bytes::<SALT_BYTES>().to_vec();
        let vault = Self {
            key: derive_key(passphrase, &salt, iterations),
            path,
            salt,
            iterations,
            data: VaultData::default(),
        };
        vault.save()?;
        tracing::info!(path = %vault.path.display(), "created account vault");
        Ok(vault)
    }

    pub fn unlock(path: impl Into<PathBuf>, passphrase: &str) -> Result<Self, VaultError> {
        let path = path.into();
        if !path.exists() {
            return Err(VaultError::Missing(path));
        }

        let raw = fs::read_to_string(&path).map_err(io_error(&path))?;
        let file: VaultFile = serde_json::from_str(&raw)
            .map_err(|err| VaultError::Corrupt(format!("invalid vault JSON: {err}")))?;
        if file.version != CURRENT_VAULT_VERSION {
            return Err(VaultError::UnsupportedVersion(file.version));
        }

        let salt = decode_base64(&file.salt)?;
        let iv = decode_base64(&file.iv)?;
        let ciphertext = decode_base64(&file.data)?;
        let key = derive_key(passphrase, &salt, file.iterations);
        let plaintext = decrypt_payload(&key, &iv, &ciphertext)?;
        let data: VaultData = serde_json::from_slice(&plaintext)
            .map_err(|err| VaultError::Corrupt(format!("invalid decrypted payload: {err}")))?;

        tracing::debug!(accounts = data.accounts.len(), "unlocked account vault");
        Ok(Self {
            path,
            key,
            salt,
            iterations: file.iterations,
            data,
        })
    }

    /// Unlock `path` if it exists, otherwise create a fresh vault there.
    pub fn open_or_create(path: impl Into<PathBuf>, passphrase: &str) -> Result<Self, VaultError> {
        let path = path.into();
        if path.exists() {
            Self::unlock(path, passphrase)
        } else {
            Self::create(path, passphrase)
        }
    }

    /// File the vault is sealed into.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn accounts(&self) -> &[Account] {
        &self.data.accounts
    }

    /// Append and persist.
    pub fn add(&mut self, account: Account) -> Result<(), VaultError> {
        self.data.accounts.push(account);
        self.save()
    }

    pub fn save(&self) -> Result<(), VaultError> {
        let plaintext = serde_json::to_vec(&self.data)
            .map_err(|err| VaultError::Corrupt(format!("failed to serialize accounts: {err}")))?;
        let (iv, ciphertext) = encrypt_payload(&self.key, &plaintext)?;

        let file = VaultFile {
            version: CURRENT_VAULT_VERSION,
            iterations: self.iterations,
            salt: BASE64.encode(&self.salt),
            iv: BASE64.encode(&iv),
            data: BASE64.encode(&ciphertext),
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        let serialized = serde_json::to_string_pretty(&file)
            .map_err(|err| VaultError::Corrupt(format!("failed to serialize vault: {err}")))?;
        fs::write(&self.path, serialized).map_err(io_error(&self.path))
    }
}
