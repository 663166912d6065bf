//! Content hashing for binary attachments
//!
//! A [`ContentKey`] is the lowercase hex SHA-256 of the *decrypted* bytes. It
//! names the encrypted blob on disk and doubles as its integrity check.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hex digits in a content key
pub const CONTENT_KEY_LEN: usize = 64;

/// Hex SHA-256 fingerprint of a byte payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentKey(String);

impl ContentKey {
    /// Parse a key, accepting only 64 lowercase hex characters
    pub fn parse(value: &str) -> Result<Self> {
        let valid = value.len() == CONTENT_KEY_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(Error::InvalidRecord(format!(
                "invalid content key: {:?}",
                value
            )));
        }
        Ok(Self(value.to_string()))
    }

    /// Borrow the hex string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ContentKey> for String {
    fn from(key: ContentKey) -> Self {
        key.0
    }
}

/// Hash a payload into its content key
pub fn content_hash(bytes: &[u8]) -> ContentKey {
    ContentKey(hex::encode(Sha256::digest(bytes)))
}
