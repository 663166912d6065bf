//! Server-side persistence collaborators
//!
//! The sync server stores opaque encrypted records and blobs behind two narrow
//! traits. Production deployments back them with a relational database and an
//! object store; the in-memory implementations here serve tests and the local
//! single-process server. Every call is scoped by the authenticated [`UserId`].

use super::auth::UserId;
use super::proto::BinaryChunk;
use crate::record::StorageRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tokio::sync::RwLock;

/// Category of a storage failure, used to decide whether to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageErrorKind {
    /// Connection refused, reset or dropped
    Connection,
    /// Backend temporarily unavailable (failover, overload)
    Unavailable,
    /// Constraint violation
    Conflict,
    /// Anything else
    Internal,
}

/// Failure reported by a repository
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<StorageError> for tonic::Status {
    fn from(err: StorageError) -> Self {
        match err.kind {
            StorageErrorKind::Connection | StorageErrorKind::Unavailable => {
                tonic::Status::unavailable(err.to_string())
            }
            StorageErrorKind::Conflict => tonic::Status::aborted(err.to_string()),
            StorageErrorKind::Internal => tonic::Status::internal(err.to_string()),
        }
    }
}

/// Result type for repository calls
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Encrypted record persistence
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Insert or replace the record with the same `(user, id)`
    async fn upsert(&self, user: &UserId, record: StorageRecord) -> StorageResult<()>;

    /// Store a record under a freshly assigned non-negative id and return it.
    /// Allocation and insert happen atomically. A record whose non-empty
    /// `origin` is already stored for the user overwrites that copy and gets
    /// its id back, so repeating an upload does not duplicate it.
    async fn insert_new(&self, user: &UserId, record: StorageRecord) -> StorageResult<i64>;

    /// Every record of the user, tombstones included
    async fn list(&self, user: &UserId) -> StorageResult<Vec<StorageRecord>>;
}

/// Encrypted blob persistence
#[async_trait]
pub trait BinaryRepository: Send + Sync {
    /// Insert or replace the blob with the same `(user, content_key)`
    async fn put(&self, user: &UserId, chunk: BinaryChunk) -> StorageResult<()>;

    /// Every blob of the user
    async fn list(&self, user: &UserId) -> StorageResult<Vec<BinaryChunk>>;
}

/// Injected failures for exercising retry paths
#[derive(Debug, Default)]
struct FailureInjector {
    pending: Mutex<Vec<StorageErrorKind>>,
}

impl FailureInjector {
    fn push(&self, kind: StorageErrorKind, times: usize) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.extend(std::iter::repeat(kind).take(times));
        }
    }

    fn check(&self) -> StorageResult<()> {
        let next = self.pending.lock().ok().and_then(|mut p| p.pop());
        match next {
            Some(kind) => Err(StorageError::new(kind, "injected failure")),
            None => Ok(()),
        }
    }
}

/// In-memory record repository
#[derive(Debug, Default)]
pub struct MemoryRecordRepository {
    records: RwLock<HashMap<UserId, BTreeMap<i64, StorageRecord>>>,
    failures: FailureInjector,
}

impl MemoryRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` calls fail with `kind`
    pub fn fail_next(&self, kind: StorageErrorKind, times: usize) {
        self.failures.push(kind, times);
    }
}

#[async_trait]
impl RecordRepository for MemoryRecordRepository {
    async fn upsert(&self, user: &UserId, record: StorageRecord) -> StorageResult<()> {
        self.failures.check()?;
        if record.id < 0 {
            return Err(StorageError::new(
                StorageErrorKind::Conflict,
                format!("cannot upsert local id {}", record.id),
            ));
        }
        self.records
            .write()
            .await
            .entry(user.clone())
            .or_default()
            .insert(record.id, record);
        Ok(())
    }

    async fn insert_new(&self, user: &UserId, mut record: StorageRecord) -> StorageResult<i64> {
        self.failures.check()?;
        let mut all = self.records.write().await;
        let records = all.entry(user.clone()).or_default();

        if !record.origin.is_empty() {
            let existing = records
                .values()
                .find(|r| r.origin == record.origin)
                .map(|r| r.id);
            if let Some(id) = existing {
                record.id = id;
                records.insert(id, record);
                return Ok(id);
            }
        }

        let id = records
            .keys()
            .next_back()
            .map(|max| max + 1)
            .unwrap_or(0)
            .max(0);
        record.id = id;
        records.insert(id, record);
        Ok(id)
    }

    async fn list(&self, user: &UserId) -> StorageResult<Vec<StorageRecord>> {
        self.failures.check()?;
        Ok(self
            .records
            .read()
            .await
            .get(user)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }
}

/// In-memory blob repository
#[derive(Debug, Default)]
pub struct MemoryBinaryRepository {
    blobs: RwLock<HashMap<UserId, BTreeMap<String, BinaryChunk>>>,
    failures: FailureInjector,
}

impl MemoryBinaryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` calls fail with `kind`
    pub fn fail_next(&self, kind: StorageErrorKind, times: usize) {
        self.failures.push(kind, times);
    }
}

#[async_trait]
impl BinaryRepository for MemoryBinaryRepository {
    async fn put(&self, user: &UserId, chunk: BinaryChunk) -> StorageResult<()> {
        self.failures.check()?;
        self.blobs
            .write()
            .await
            .entry(user.clone())
            .or_default()
            .insert(chunk.content_key.clone(), chunk);
        Ok(())
    }

    async fn list(&self, user: &UserId) -> StorageResult<Vec<BinaryChunk>> {
        self.failures.check()?;
        Ok(self
            .blobs
            .read()
            .await
            .get(user)
            .map(|blobs| blobs.values().cloned().collect())
            .unwrap_or_default())
    }
}
