//! Passphrase key derivation
//!
//! The vault key is derived from the user's passphrase with SHA-256. When the
//! requested AES key is longer than one digest the running digest is re-hashed
//! and appended until enough bytes are available, then truncated.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES key length selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyLength {
    /// AES-128
    Aes128,
    /// AES-192
    Aes192,
    /// AES-256
    #[default]
    Aes256,
}

impl KeyLength {
    /// Key size in bytes
    pub fn bytes(self) -> usize {
        match self {
            KeyLength::Aes128 => 16,
            KeyLength::Aes192 => 24,
            KeyLength::Aes256 => 32,
        }
    }
}

impl TryFrom<usize> for KeyLength {
    type Error = Error;

    fn try_from(len: usize) -> Result<Self> {
        match len {
            16 => Ok(KeyLength::Aes128),
            24 => Ok(KeyLength::Aes192),
            32 => Ok(KeyLength::Aes256),
            other => Err(Error::Crypto(format!(
                "unsupported key length {}, expected 16, 24 or 32",
                other
            ))),
        }
    }
}

/// Symmetric key derived from a passphrase.
///
/// Zeroized on drop so the unlocked key does not outlive the session.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Key length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the key has no bytes
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SecretKey").field(&"[REDACTED]").finish()
    }
}

/// Derive a key of exactly `length` bytes from `passphrase`.
pub fn derive_key(passphrase: &str, length: KeyLength) -> SecretKey {
    let want = length.bytes();
    let mut key = Sha256::digest(passphrase.as_bytes()).to_vec();

    while key.len() < want {
        let next = Sha256::digest(&key);
        key.extend_from_slice(&next);
    }

    key.truncate(want);
    SecretKey(key)
}
