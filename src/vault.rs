//! Vault session
//!
//! Ties the pieces of an unlocked vault together:
//!
//! ```text
//! passphrase ─▶ Cipher ─┬─▶ RecordCodec ─▶ EncryptedLog  (<data_dir>/records.log)
//!                       └─▶ BlobStore                     (<data_dir>/blobs/)
//!                                 ▲
//!                 RecordStore ────┘ binary records reference blobs by ContentKey
//! ```
//!
//! Every mutation is written through to the log before the call returns:
//! additions and updates are appended, and the log is compacted whenever a
//! local record is removed outright so it cannot come back on restore.
//! Methods that mutate take `&mut self`, which keeps the agent single-writer;
//! [`Vault::sync`] holds that borrow for the whole exchange.

use crate::config::LockboxConfig;
use crate::crypto::{Cipher, ContentKey};
use crate::error::{Error, Result};
use crate::record::{
    BankCard, BinaryRef, DeleteOutcome, Metadata, Payload, Query, Record, RecordStore, RecordType,
};
use crate::storage::{BlobStore, EncryptedLog, RecordCodec};
use crate::sync::{MergeReport, Reconciler, RecordFailure, SyncClient};
use crate::transport::{BinaryChunk, SyncService};
use std::sync::Arc;

/// A pulled blob that could not be stored
#[derive(Debug)]
pub struct BlobFailure {
    pub content_key: String,
    pub error: Error,
}

/// Outcome of one synchronization round
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Blobs received from the server and stored locally
    pub blobs_pulled: usize,
    /// Blobs rejected on import
    pub blob_failures: Vec<BlobFailure>,
    /// Result of folding the server snapshot into the local store
    pub merge: MergeReport,
    /// Blobs uploaded
    pub blobs_pushed: usize,
    /// Records uploaded
    pub records_pushed: usize,
    /// Local records moved to server ids
    pub rekeyed: usize,
    /// Acknowledged mappings that could not be applied
    pub ack_failures: Vec<RecordFailure>,
    /// Orphaned blobs removed after the round
    pub blobs_reclaimed: usize,
}

impl SyncReport {
    /// True when nothing was skipped
    pub fn is_clean(&self) -> bool {
        self.blob_failures.is_empty() && self.merge.is_clean() && self.ack_failures.is_empty()
    }
}

/// An unlocked vault
pub struct Vault {
    codec: RecordCodec,
    log: EncryptedLog,
    blobs: BlobStore,
    store: RecordStore,
}

impl Vault {
    /// Whether a vault already exists at the configured location
    pub fn exists(config: &LockboxConfig) -> bool {
        config.storage.log_path().is_file()
    }

    /// Unlock the vault, or establish a new one if none exists.
    ///
    /// Fails with [`Error::InvalidPassphrase`] when the log has content but
    /// not a single line decrypts.
    pub fn open(config: &LockboxConfig, passphrase: &str) -> Result<Self> {
        config.validate()?;
        let cipher = Arc::new(Cipher::new(passphrase, config.crypto.key_length));
        let codec = RecordCodec::new(cipher.clone());
        let log = EncryptedLog::open(config.storage.log_path(), codec.clone());

        let restored = log.restore()?;
        if restored.nothing_decoded() {
            tracing::warn!(
                "None of the {} log lines in {} could be decrypted",
                restored.lines,
                log.path().display()
            );
            return Err(Error::InvalidPassphrase);
        }

        let blobs = BlobStore::open(config.storage.blob_path(), cipher)?;
        let store = RecordStore::from_records(restored.records);
        tracing::info!(
            "Vault opened at {} with {} records",
            config.storage.data_dir.display(),
            store.len()
        );

        Ok(Self {
            codec,
            log,
            blobs,
            store,
        })
    }

    /// In-memory record store
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Blob store
    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Add a record, returning its local id
    pub fn add(&mut self, record: Record) -> Result<i64> {
        let id = self.store.add(record);
        self.append(id)?;
        Ok(id)
    }

    /// Add a login/password pair
    pub fn add_credential(
        &mut self,
        login: impl Into<String>,
        password: impl Into<String>,
        metadata: Metadata,
    ) -> Result<i64> {
        self.add(Record::new(Payload::credential(login, password)).with_metadata_map(metadata))
    }

    /// Add a payment card
    pub fn add_bank_card(&mut self, card: BankCard, metadata: Metadata) -> Result<i64> {
        self.add(Record::new(Payload::BankCard(card)).with_metadata_map(metadata))
    }

    /// Add a text note
    pub fn add_text(&mut self, text: impl Into<String>, metadata: Metadata) -> Result<i64> {
        self.add(Record::new(Payload::text(text)).with_metadata_map(metadata))
    }

    /// Encrypt `bytes` into the blob store and add a record referencing it.
    ///
    /// The blob is written first, so a stored binary record always has its
    /// blob on disk.
    pub fn add_file(
        &mut self,
        display_name: impl Into<String>,
        bytes: &[u8],
        metadata: Metadata,
    ) -> Result<i64> {
        let content_key = self.blobs.save(bytes)?;
        let payload = Payload::Binary(BinaryRef {
            display_name: display_name.into(),
            content_key,
        });
        self.add(Record::new(payload).with_metadata_map(metadata))
    }

    /// Swap the contents of a binary record.
    ///
    /// The new blob is saved and the record updated before the previous blob
    /// is removed, and it is only removed if no other live record uses it.
    pub fn replace_file(
        &mut self,
        id: i64,
        display_name: impl Into<String>,
        bytes: &[u8],
    ) -> Result<()> {
        let mut record = self.get(id)?.clone();
        let previous = binary_ref(&record)?.content_key.clone();

        let content_key = self.blobs.save(bytes)?;
        record.payload = Payload::Binary(BinaryRef {
            display_name: display_name.into(),
            content_key: content_key.clone(),
        });
        self.update(record)?;

        if previous != content_key {
            self.release_blob(&previous)?;
        }
        Ok(())
    }

    /// Decrypt the attachment of a binary record
    pub fn read_file(&self, id: i64) -> Result<(String, Vec<u8>)> {
        let binary = binary_ref(self.get(id)?)?;
        let bytes = self.blobs.load(&binary.content_key)?;
        Ok((binary.display_name.clone(), bytes))
    }

    /// A live record by id
    pub fn get(&self, id: i64) -> Result<&Record> {
        self.store
            .get(id)
            .filter(|r| !r.deleted)
            .ok_or(Error::NotFound(id))
    }

    /// Live records of one type
    pub fn list(&self, record_type: RecordType) -> Vec<&Record> {
        self.store.list(record_type)
    }

    /// Live records matching a query
    pub fn query(&self, query: &Query) -> Vec<&Record> {
        self.store.query(query)
    }

    /// Replace a record's contents and refresh its timestamp
    pub fn update(&mut self, record: Record) -> Result<()> {
        let id = record.id;
        self.store.update(record)?;
        self.append(id)
    }

    /// Delete a record; local records vanish, synced ones become tombstones
    pub fn delete(&mut self, id: i64) -> Result<DeleteOutcome> {
        let content_key = self
            .store
            .get(id)
            .and_then(|r| r.payload.content_key().cloned());

        let outcome = self.store.delete(id);
        match outcome {
            DeleteOutcome::Removed => {
                self.save()?;
            }
            DeleteOutcome::Tombstoned => self.append(id)?,
            DeleteOutcome::Missing => {
                tracing::debug!("Delete of missing record {} ignored", id);
                return Ok(outcome);
            }
        }

        if let Some(key) = content_key {
            self.release_blob(&key)?;
        }
        Ok(outcome)
    }

    /// Rewrite the log from the current store
    pub fn save(&self) -> Result<usize> {
        self.log.persist(self.store.get_all())
    }

    /// Move every synced record back to a local id, keeping origin tags, so
    /// the next sync can run against a server that never saw these ids
    pub fn detach(&mut self) -> Result<usize> {
        let moved = self.store.detach();
        if moved > 0 {
            self.save()?;
        }
        Ok(moved)
    }

    /// Remove blobs no live record references
    pub fn collect_garbage(&self) -> Result<usize> {
        self.blobs.reconcile(&self.store.binary_keys())
    }

    /// Run one synchronization round against the server.
    ///
    /// Blobs are pulled before records so that pulled binary records find
    /// their attachments, and pushed before records for the same reason on
    /// the other side. Per-item failures are collected in the report; only
    /// transport and local I/O failures abort the round. The merged state is
    /// persisted before anything is uploaded, and a record whose upload was
    /// stored but never acknowledged is matched by its origin tag on the next
    /// round instead of being uploaded twice.
    pub async fn sync<S: SyncService>(&mut self, client: &SyncClient<S>) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        for chunk in client.pull_binaries().await? {
            let imported = ContentKey::parse(&chunk.content_key)
                .and_then(|key| self.blobs.import(&key, &chunk.data));
            match imported {
                Ok(()) => report.blobs_pulled += 1,
                Err(error) => {
                    tracing::warn!("Rejected pulled blob {}: {}", chunk.content_key, error);
                    report.blob_failures.push(BlobFailure {
                        content_key: chunk.content_key,
                        error,
                    });
                }
            }
        }

        let remote = client.pull_records().await?;
        report.merge = Reconciler::merge(&mut self.store, remote, &self.codec);
        // Merged state is on disk before any upload starts
        self.save()?;

        let mut chunks = Vec::new();
        for key in self.store.binary_keys() {
            if !self.blobs.contains(&key) {
                tracing::warn!("Blob {} is referenced but missing locally", key);
                continue;
            }
            chunks.push(BinaryChunk {
                content_key: key.to_string(),
                data: self.blobs.export(&key)?,
            });
        }
        report.blobs_pushed = chunks.len();
        client.push_binaries(chunks).await?;

        // Synced records first, then local ones in creation order (-1, -2, …)
        // so server ids follow the order records were added.
        let mut outgoing = self.store.get_all();
        outgoing.sort_by_key(|r| (r.is_local(), r.id.unsigned_abs()));
        let sealed = outgoing
            .into_iter()
            .map(|r| self.codec.seal(r))
            .collect::<Result<Vec<_>>>()?;
        report.records_pushed = sealed.len();
        let ack = client.push_records(sealed).await?;

        report.ack_failures = Reconciler::apply_ack(&mut self.store, &ack);
        report.rekeyed = ack.mappings.len() - report.ack_failures.len();

        self.save()?;
        report.blobs_reclaimed = self.collect_garbage()?;

        tracing::info!(
            "Sync complete: {} records pushed, {} re-keyed, {} adopted, {} merged in, {} blobs reclaimed",
            report.records_pushed,
            report.rekeyed,
            report.merge.adopted.len(),
            report.merge.updated.len() + report.merge.inserted.len(),
            report.blobs_reclaimed
        );
        Ok(report)
    }

    fn append(&self, id: i64) -> Result<()> {
        let record = self.store.get(id).ok_or(Error::NotFound(id))?;
        self.log.append(record)
    }

    fn release_blob(&self, key: &ContentKey) -> Result<()> {
        if !self.store.binary_keys().contains(key) {
            self.blobs.remove(key)?;
        }
        Ok(())
    }
}

fn binary_ref(record: &Record) -> Result<&BinaryRef> {
    match &record.payload {
        Payload::Binary(binary) => Ok(binary),
        other => Err(Error::InvalidRecord(format!(
            "record {} is {}, not binary",
            record.id,
            other.record_type()
        ))),
    }
}
