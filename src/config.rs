//! Lockbox configuration management

use crate::crypto::KeyLength;
use crate::error::{Error, Result};
use crate::transport::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main Lockbox configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockboxConfig {
    /// Local storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Synchronization configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Encryption configuration
    #[serde(default)]
    pub crypto: CryptoConfig,
}

impl LockboxConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reject settings the vault cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.storage.log_file.as_os_str().is_empty() {
            return Err(Error::Config("storage.log_file must not be empty".to_string()));
        }
        if self.storage.log_path() == self.storage.blob_path() {
            return Err(Error::Config(
                "storage.log_file and storage.blob_dir must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// Local storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory for vault data
    pub data_dir: PathBuf,

    /// Encrypted record log, relative to `data_dir` unless absolute
    pub log_file: PathBuf,

    /// Encrypted blob directory, relative to `data_dir` unless absolute
    pub blob_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = dirs_next::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lockbox");

        Self {
            data_dir: base,
            log_file: PathBuf::from("records.log"),
            blob_dir: PathBuf::from("blobs"),
        }
    }
}

impl StorageConfig {
    /// Storage rooted at `data_dir` with default file names
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Resolved path of the record log
    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(&self.log_file)
    }

    /// Resolved path of the blob directory
    pub fn blob_path(&self) -> PathBuf {
        self.data_dir.join(&self.blob_dir)
    }
}

/// Synchronization configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Bearer token presented to the sync server
    pub token: Option<String>,

    /// Server-side retry schedule for transient storage failures
    pub retry: RetryPolicy,
}

/// Encryption configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// AES key length derived from the passphrase
    pub key_length: KeyLength,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::StorageErrorKind;

    #[test]
    fn test_default_config() {
        let config = LockboxConfig::default();
        assert!(config.storage.data_dir.ends_with("lockbox"));
        assert_eq!(config.storage.log_path(), config.storage.data_dir.join("records.log"));
        assert_eq!(config.storage.blob_path(), config.storage.data_dir.join("blobs"));
        assert_eq!(config.crypto.key_length, KeyLength::Aes256);
        assert!(config.sync.token.is_none());
        assert_eq!(config.sync.retry.delays_ms, vec![1000, 3000, 5000]);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = LockboxConfig::from_toml(
            r#"
            [storage]
            data_dir = "/tmp/vault"

            [crypto]
            key_length = "aes128"
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.log_path(), PathBuf::from("/tmp/vault/records.log"));
        assert_eq!(config.crypto.key_length, KeyLength::Aes128);
        assert_eq!(config.sync.retry, RetryPolicy::default());
    }

    #[test]
    fn test_absolute_paths_override_data_dir() {
        let mut storage = StorageConfig::in_dir("/data");
        storage.blob_dir = PathBuf::from("/elsewhere/blobs");
        assert_eq!(storage.blob_path(), PathBuf::from("/elsewhere/blobs"));
    }

    #[test]
    fn test_sync_section() {
        let config = LockboxConfig::from_toml(
            r#"
            [sync]
            token = "abc"

            [sync.retry]
            delays_ms = [10]
            retryable = ["connection"]
            "#,
        )
        .unwrap();
        assert_eq!(config.sync.token.as_deref(), Some("abc"));
        assert_eq!(config.sync.retry.delays_ms, vec![10]);
        assert_eq!(config.sync.retry.retryable, vec![StorageErrorKind::Connection]);
    }

    #[test]
    fn test_rejects_colliding_paths() {
        let err = LockboxConfig::from_toml(
            r#"
            [storage]
            log_file = "same"
            blob_dir = "same"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(matches!(
            LockboxConfig::from_toml("storage = 3"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = LockboxConfig::default();
        let rendered = config.to_toml().unwrap();
        let parsed = LockboxConfig::from_toml(&rendered).unwrap();
        assert_eq!(parsed.storage.data_dir, config.storage.data_dir);
        assert_eq!(parsed.crypto.key_length, config.crypto.key_length);
    }
}
