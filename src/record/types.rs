//! Vault record types
//!
//! A [`Record`] is the plaintext, in-memory form of a vault entry. It is never
//! written to disk or sent over the wire directly; [`StorageRecord`] is the
//! encrypted form used for both.

use crate::crypto::ContentKey;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Free-form record tags
pub type Metadata = BTreeMap<String, String>;

/// Login/password pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub login: String,
    pub password: String,
}

/// Payment card details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankCard {
    pub number: String,
    pub holder: String,
    /// Expiry as written on the card, e.g. `12/29`
    pub expiry: String,
    pub cvv: String,
}

/// Free text note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextNote {
    pub text: String,
}

/// Reference to an encrypted attachment in the blob store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryRef {
    /// Original filename shown to the user
    pub display_name: String,
    /// Content hash of the decrypted bytes, also the blob filename
    pub content_key: ContentKey,
}

/// Record payload. Exactly one variant, so tag and content always agree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record_type", rename_all = "snake_case")]
pub enum Payload {
    Credential(Credential),
    BankCard(BankCard),
    Text(TextNote),
    Binary(BinaryRef),
}

impl Payload {
    /// Shorthand for a text payload
    pub fn text(text: impl Into<String>) -> Self {
        Payload::Text(TextNote { text: text.into() })
    }

    /// Shorthand for a credential payload
    pub fn credential(login: impl Into<String>, password: impl Into<String>) -> Self {
        Payload::Credential(Credential {
            login: login.into(),
            password: password.into(),
        })
    }

    /// The type tag of this payload
    pub fn record_type(&self) -> RecordType {
        match self {
            Payload::Credential(_) => RecordType::Credential,
            Payload::BankCard(_) => RecordType::BankCard,
            Payload::Text(_) => RecordType::Text,
            Payload::Binary(_) => RecordType::Binary,
        }
    }

    /// Content key, if this is a binary reference
    pub fn content_key(&self) -> Option<&ContentKey> {
        match self {
            Payload::Binary(binary) => Some(&binary.content_key),
            _ => None,
        }
    }
}

/// Record type tag.
///
/// `Any` and `Undefined` only appear in queries and parsing; no stored record
/// carries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Undefined,
    Any,
    Credential,
    BankCard,
    Text,
    Binary,
}

impl RecordType {
    /// True if a record of type `other` satisfies this query tag
    pub fn accepts(self, other: RecordType) -> bool {
        self == RecordType::Any || self == other
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordType::Undefined => "undefined",
            RecordType::Any => "any",
            RecordType::Credential => "credential",
            RecordType::BankCard => "bank_card",
            RecordType::Text => "text",
            RecordType::Binary => "binary",
        };
        f.pad(name)
    }
}

impl FromStr for RecordType {
    type Err = std::convert::Infallible;

    /// Unknown names parse as `Undefined`, which matches nothing.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "any" | "all" => RecordType::Any,
            "credential" | "credentials" | "login" => RecordType::Credential,
            "bank_card" | "card" | "bankcard" => RecordType::BankCard,
            "text" | "note" => RecordType::Text,
            "binary" | "file" => RecordType::Binary,
            _ => RecordType::Undefined,
        })
    }
}

/// A vault entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    /// Negative: local and unconfirmed. Non-negative: assigned by the server.
    pub id: i64,
    pub payload: Payload,
    pub metadata: Metadata,
    /// Tombstone flag
    pub deleted: bool,
    /// Last-write marker for conflict resolution, millisecond precision
    pub updated_at: DateTime<Utc>,
    /// Random tag fixed when the record is first added. It survives
    /// re-keying, so an upload whose acknowledgement was lost can be matched
    /// to the server copy it produced. Empty for records that predate it.
    pub origin: String,
}

impl Record {
    /// Create a record with no id yet; the store assigns one on `add`.
    pub fn new(payload: Payload) -> Self {
        Self {
            id: 0,
            payload,
            metadata: Metadata::new(),
            deleted: false,
            updated_at: now(),
            origin: String::new(),
        }
    }

    /// Attach a metadata tag
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replace all metadata
    pub fn with_metadata_map(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// The record's type tag
    pub fn record_type(&self) -> RecordType {
        self.payload.record_type()
    }

    /// True if the server has not confirmed this record yet
    pub fn is_local(&self) -> bool {
        self.id < 0
    }

    /// Advance `updated_at`, strictly increasing even within one millisecond
    pub fn touch(&mut self) {
        let now = now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::milliseconds(1)
        };
    }
}

/// Encrypted representation of a [`Record`], used on disk and on the wire.
///
/// `data` is `base64(IV || AES-CBC(json(payload, metadata)))`.
#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
pub struct StorageRecord {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(string, tag = "2")]
    pub data: String,
    #[prost(bool, tag = "3")]
    pub deleted: bool,
    /// Unix milliseconds
    #[prost(int64, tag = "4")]
    pub updated_at: i64,
    /// See [`Record::origin`]
    #[prost(string, tag = "5")]
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub origin: String,
}

impl StorageRecord {
    /// `updated_at` as a timestamp
    pub fn updated_at(&self) -> DateTime<Utc> {
        from_millis(self.updated_at)
    }
}

/// Fresh random origin tag, 128 bits as lowercase hex
pub fn new_origin() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

/// Current time truncated to milliseconds, the resolution kept on the wire
pub fn now() -> DateTime<Utc> {
    from_millis(Utc::now().timestamp_millis())
}

/// Convert Unix milliseconds, clamping out-of-range values to the epoch
pub fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
