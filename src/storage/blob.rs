//! Content-addressed store for encrypted binary attachments
//!
//! Directory layout:
//! ```text
//! <data_dir>/blobs/
//! ├── 9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08
//! └── ...
//! ```
//!
//! Each file is named by the [`ContentKey`] of its *decrypted* bytes and holds
//! the base64 ciphertext. The directory is dedicated to blobs: only files whose
//! name parses as a content key are treated as blobs, anything else (including
//! in-flight `.tmp` files) is left alone by the sweep.
//!
//! Writes go through a temporary file that is synced and renamed into place,
//! so a blob is either absent or complete.

use crate::crypto::{content_hash, Cipher, ContentKey};
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Behavior when a blob with the same key already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMode {
    /// Same content already saved; leave the file untouched
    #[default]
    KeepExisting,
    /// Re-encrypt and replace the file
    Overwrite,
}

/// Encrypted blob directory
#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
    cipher: Arc<Cipher>,
}

impl BlobStore {
    /// Open (and create if needed) the blob directory
    pub fn open(dir: impl Into<PathBuf>, cipher: Arc<Cipher>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, cipher })
    }

    /// Blob directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the blob file for `key`
    pub fn path_for(&self, key: &ContentKey) -> PathBuf {
        self.dir.join(key.as_str())
    }

    /// Whether a blob for `key` is on disk
    pub fn contains(&self, key: &ContentKey) -> bool {
        self.path_for(key).is_file()
    }

    /// Encrypt and store `bytes`, deduplicating by content
    pub fn save(&self, bytes: &[u8]) -> Result<ContentKey> {
        self.save_with(bytes, SaveMode::KeepExisting)
    }

    /// Encrypt and store `bytes` with an explicit overwrite policy
    pub fn save_with(&self, bytes: &[u8], mode: SaveMode) -> Result<ContentKey> {
        let key = content_hash(bytes);
        if mode == SaveMode::KeepExisting && self.contains(&key) {
            tracing::debug!("Blob {} already stored", key);
            return Ok(key);
        }

        let ciphertext = self.cipher.encrypt(bytes)?;
        self.write_atomic(&key, ciphertext.as_bytes())?;
        tracing::debug!("Saved blob {} ({} bytes)", key, bytes.len());
        Ok(key)
    }

    /// Load and decrypt a blob, verifying its content hash
    pub fn load(&self, key: &ContentKey) -> Result<Vec<u8>> {
        let ciphertext = self.export(key)?;
        let bytes = self.cipher.decrypt(&ciphertext)?;

        if content_hash(&bytes) != *key {
            tracing::error!("Blob {} failed integrity check", key);
            return Err(Error::Integrity(format!("hash sum is not equal for blob {}", key)));
        }
        Ok(bytes)
    }

    /// Stored ciphertext of a blob, as sent to the server
    pub fn export(&self, key: &ContentKey) -> Result<String> {
        Ok(fs::read_to_string(self.path_for(key))?)
    }

    /// Store ciphertext received from the server.
    ///
    /// The ciphertext is decrypted and hashed first; it is written only if it
    /// matches `key`. An existing blob is kept.
    pub fn import(&self, key: &ContentKey, ciphertext: &str) -> Result<()> {
        if self.contains(key) {
            return Ok(());
        }

        let bytes = self.cipher.decrypt(ciphertext)?;
        if content_hash(&bytes) != *key {
            return Err(Error::Integrity(format!(
                "hash sum is not equal for pulled blob {}",
                key
            )));
        }

        self.write_atomic(key, ciphertext.as_bytes())
    }

    /// Delete a blob, returning whether it existed
    pub fn remove(&self, key: &ContentKey) -> Result<bool> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Content keys of every blob on disk
    pub fn keys(&self) -> Result<BTreeSet<ContentKey>> {
        let mut keys = BTreeSet::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            match name.to_str().map(ContentKey::parse) {
                Some(Ok(key)) => {
                    keys.insert(key);
                }
                _ => tracing::debug!("Ignoring non-blob file {:?}", name),
            }
        }
        Ok(keys)
    }

    /// Delete every blob not referenced by `live`, returning how many were removed
    pub fn reconcile(&self, live: &BTreeSet<ContentKey>) -> Result<usize> {
        let mut removed = 0;
        for key in self.keys()? {
            if live.contains(&key) {
                continue;
            }
            if self.remove(&key)? {
                tracing::debug!("Removed orphaned blob {}", key);
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!("Reclaimed {} orphaned blobs", removed);
        }
        Ok(removed)
    }

    fn write_atomic(&self, key: &ContentKey, contents: &[u8]) -> Result<()> {
        let target = self.path_for(key);
        let tmp = self.dir.join(format!("{}.tmp", key));

        let mut file = File::create(&tmp)?;
        file.write_all(contents)?;
        file.flush()?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &target)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyLength;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use tempfile::TempDir;

    fn make_store(dir: &TempDir, passphrase: &str) -> BlobStore {
        let cipher = Arc::new(Cipher::new(passphrase, KeyLength::Aes256));
        BlobStore::open(dir.path().join("blobs"), cipher).unwrap()
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir, "pw");

        let key = store.save(b"attachment bytes").unwrap();
        assert_eq!(key, content_hash(b"attachment bytes"));
        assert!(store.contains(&key));
        assert_eq!(store.load(&key).unwrap(), b"attachment bytes");

        let on_disk = fs::read(store.path_for(&key)).unwrap();
        assert!(!on_disk.windows(10).any(|w| w == b"attachment"));
    }

    #[test]
    fn test_empty_payload() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir, "pw");
        let key = store.save(b"").unwrap();
        assert!(store.load(&key).unwrap().is_empty());
    }

    #[test]
    fn test_save_dedups_unless_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir, "pw");
        let key = store.save(b"same").unwrap();
        let first = store.export(&key).unwrap();

        store.save(b"same").unwrap();
        assert_eq!(store.export(&key).unwrap(), first);

        store.save_with(b"same", SaveMode::Overwrite).unwrap();
        assert_ne!(store.export(&key).unwrap(), first);
        assert_eq!(store.load(&key).unwrap(), b"same");
    }

    #[test]
    fn test_tampered_blob_fails_hash_check() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir, "pw");
        let key = store.save(b"a document that must not change").unwrap();

        let mut raw = STANDARD.decode(store.export(&key).unwrap()).unwrap();
        raw[20] ^= 0xff;
        fs::write(store.path_for(&key), STANDARD.encode(raw)).unwrap();

        let err = store.load(&key).unwrap_err();
        assert!(err.is_integrity());
        assert!(err.to_string().contains("hash sum is not equal"));
    }

    #[test]
    fn test_wrong_passphrase_fails_hash_check() {
        let dir = TempDir::new().unwrap();
        let key = make_store(&dir, "right").save(b"secret file").unwrap();
        assert!(make_store(&dir, "wrong").load(&key).is_err());
    }

    #[test]
    fn test_import_verifies_before_writing() {
        let source_dir = TempDir::new().unwrap();
        let target_dir = TempDir::new().unwrap();
        let source = make_store(&source_dir, "pw");
        let target = make_store(&target_dir, "pw");

        let key = source.save(b"shared").unwrap();
        let ciphertext = source.export(&key).unwrap();
        target.import(&key, &ciphertext).unwrap();
        assert_eq!(target.load(&key).unwrap(), b"shared");

        let other_key = content_hash(b"something else");
        let err = target.import(&other_key, &ciphertext).unwrap_err();
        assert!(err.is_integrity());
        assert!(!target.contains(&other_key));
    }

    #[test]
    fn test_reconcile_removes_orphans() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir, "pw");
        let live = store.save(b"live").unwrap();
        let orphan = store.save(b"orphan").unwrap();
        fs::write(store.dir().join("notes.txt"), "not a blob").unwrap();

        let removed = store.reconcile(&BTreeSet::from([live.clone()])).unwrap();
        assert_eq!(removed, 1);
        assert!(store.contains(&live));
        assert!(!store.contains(&orphan));
        assert!(store.dir().join("notes.txt").exists());
    }

    #[test]
    fn test_remove_missing() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir, "pw");
        assert!(!store.remove(&content_hash(b"never saved")).unwrap());
    }
}
