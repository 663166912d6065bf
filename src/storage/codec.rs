//! Record sealing: `Record` <-> `StorageRecord`
//!
//! The payload and metadata are serialized to JSON and encrypted together;
//! id, tombstone flag, timestamp and origin tag stay in the clear so the server can upsert
//! and the reconciler can compare without the passphrase.

use crate::crypto::Cipher;
use crate::error::{Error, Result};
use crate::record::{from_millis, Metadata, Payload, Record, StorageRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Serialize)]
struct SealedContent<'a> {
    payload: &'a Payload,
    metadata: &'a Metadata,
}

#[derive(Deserialize)]
struct OpenedContent {
    payload: Payload,
    #[serde(default)]
    metadata: Metadata,
}

/// Encrypts and decrypts record contents with the session cipher
#[derive(Debug, Clone)]
pub struct RecordCodec {
    cipher: Arc<Cipher>,
}

impl RecordCodec {
    /// Create a codec sharing the session cipher
    pub fn new(cipher: Arc<Cipher>) -> Self {
        Self { cipher }
    }

    /// The underlying cipher
    pub fn cipher(&self) -> &Cipher {
        &self.cipher
    }

    /// Encrypt a record into its storage form
    pub fn seal(&self, record: &Record) -> Result<StorageRecord> {
        let content = serde_json::to_vec(&SealedContent {
            payload: &record.payload,
            metadata: &record.metadata,
        })?;

        Ok(StorageRecord {
            id: record.id,
            data: self.cipher.encrypt(&content)?,
            deleted: record.deleted,
            updated_at: record.updated_at.timestamp_millis(),
            origin: record.origin.clone(),
        })
    }

    /// Decrypt a storage record back into a plaintext record
    pub fn open(&self, stored: &StorageRecord) -> Result<Record> {
        let plaintext = self.cipher.decrypt(&stored.data)?;
        let content: OpenedContent = serde_json::from_slice(&plaintext).map_err(|e| {
            Error::InvalidRecord(format!("record {} does not decode: {}", stored.id, e))
        })?;

        Ok(Record {
            id: stored.id,
            payload: content.payload,
            metadata: content.metadata,
            deleted: stored.deleted,
            updated_at: from_millis(stored.updated_at),
            origin: stored.origin.clone(),
        })
    }
}
