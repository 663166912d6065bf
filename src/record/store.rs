//! In-memory record store for the running agent session
//!
//! The store is the authoritative record set while the vault is unlocked. It
//! owns identity allocation: records created locally get negative ids from an
//! [`IdAllocator`] seeded from the most negative id already present. Records
//! confirmed by the server keep their non-negative ids and never consume the
//! allocator.
//!
//! The store is single-writer: mutation goes through `&mut self`.

use super::query::Query;
use super::types::{new_origin, Record, RecordType};
use crate::crypto::ContentKey;
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Hands out decreasing negative ids for local records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdAllocator {
    next: i64,
}

impl IdAllocator {
    /// Allocator continuing below `lowest` (the most negative id in use)
    pub fn after(lowest: i64) -> Self {
        Self {
            next: lowest.min(0) - 1,
        }
    }

    /// Next id to be handed out, without consuming it
    pub fn peek(&self) -> i64 {
        self.next
    }

    /// Consume and return the next id
    pub fn allocate(&mut self) -> i64 {
        let id = self.next;
        self.next -= 1;
        id
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::after(0)
    }
}

/// What `delete` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Local-only record physically removed
    Removed,
    /// Synced record marked deleted so the deletion propagates
    Tombstoned,
    /// No record with that id; nothing to do
    Missing,
}

/// Volatile record collection keyed by id
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: BTreeMap<i64, Record>,
    ids: IdAllocator,
}

impl RecordStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from restored records, seeding the allocator from them
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let records: BTreeMap<i64, Record> = records.into_iter().map(|r| (r.id, r)).collect();
        let lowest = records.keys().next().copied().unwrap_or(0);
        Self {
            records,
            ids: IdAllocator::after(lowest),
        }
    }

    /// Next local id that `add` will assign
    pub fn next_local_id(&self) -> i64 {
        self.ids.peek()
    }

    /// Number of records, tombstones included
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert a new local record, returning its assigned id
    pub fn add(&mut self, mut record: Record) -> i64 {
        let mut id = self.ids.allocate();
        while self.records.contains_key(&id) {
            id = self.ids.allocate();
        }

        record.id = id;
        record.origin = new_origin();
        record.touch();
        tracing::debug!(id, record_type = %record.record_type(), "Added record");
        self.records.insert(id, record);
        id
    }

    /// Insert several new local records, returning their ids in order
    pub fn add_many(&mut self, records: impl IntoIterator<Item = Record>) -> Vec<i64> {
        records.into_iter().map(|r| self.add(r)).collect()
    }

    /// Insert a record that already has a server-assigned id.
    ///
    /// Used for records pulled from the server, tombstones included.
    pub fn insert_remote(&mut self, record: Record) -> Result<()> {
        if record.id < 0 {
            return Err(Error::InvalidRecord(format!(
                "remote record carries local id {}",
                record.id
            )));
        }
        self.records.insert(record.id, record);
        Ok(())
    }

    /// Retrieve a record by id, tombstones included
    pub fn get(&self, id: i64) -> Option<&Record> {
        self.records.get(&id)
    }

    /// All records ordered by id, tombstones included
    pub fn get_all(&self) -> Vec<&Record> {
        self.records.values().collect()
    }

    /// Live records matching `query`
    pub fn query(&self, query: &Query) -> Vec<&Record> {
        self.records.values().filter(|r| query.matches(r)).collect()
    }

    /// Live records of one type, no metadata filters
    pub fn list(&self, record_type: RecordType) -> Vec<&Record> {
        self.query(&Query::new(record_type))
    }

    /// Replace the record with the same id and refresh `updated_at`.
    ///
    /// The stored origin tag is kept whatever the caller passes.
    pub fn update(&mut self, mut record: Record) -> Result<()> {
        let existing = self
            .records
            .get_mut(&record.id)
            .ok_or(Error::NotFound(record.id))?;
        record.origin = existing.origin.clone();

        // Never step backwards, even if the caller passes a stale copy.
        if existing.updated_at > record.updated_at {
            record.updated_at = existing.updated_at;
        }
        record.touch();
        *existing = record;
        Ok(())
    }

    /// Overwrite a record verbatim, keeping the caller's `updated_at`.
    ///
    /// Used when a newer remote copy wins reconciliation.
    pub fn replace(&mut self, record: Record) -> Result<()> {
        let existing = self
            .records
            .get_mut(&record.id)
            .ok_or(Error::NotFound(record.id))?;
        *existing = record;
        Ok(())
    }

    /// Delete a record.
    ///
    /// Local-only records (negative id) are removed outright. Synced records
    /// become tombstones so the deletion reaches other agents. A missing id or
    /// an existing tombstone is a no-op and leaves `updated_at` alone.
    pub fn delete(&mut self, id: i64) -> DeleteOutcome {
        if id < 0 {
            return match self.records.remove(&id) {
                Some(_) => DeleteOutcome::Removed,
                None => DeleteOutcome::Missing,
            };
        }

        match self.records.get_mut(&id) {
            Some(record) if record.deleted => DeleteOutcome::Missing,
            Some(record) => {
                record.deleted = true;
                record.touch();
                DeleteOutcome::Tombstoned
            }
            None => DeleteOutcome::Missing,
        }
    }

    /// Move a local record to the id the server assigned it
    pub fn rekey(&mut self, local_id: i64, server_id: i64) -> Result<()> {
        if server_id < 0 {
            return Err(Error::InvalidRecord(format!(
                "server id {} is negative",
                server_id
            )));
        }
        let mut record = self
            .records
            .remove(&local_id)
            .ok_or(Error::NotFound(local_id))?;
        record.id = server_id;
        if self.records.insert(server_id, record).is_some() {
            tracing::warn!(local_id, server_id, "Re-keyed record replaced an existing one");
        }
        Ok(())
    }

    /// Local record carrying `origin`, if any
    pub fn local_with_origin(&self, origin: &str) -> Option<i64> {
        if origin.is_empty() {
            return None;
        }
        self.records
            .values()
            .find(|r| r.is_local() && r.origin == origin)
            .map(|r| r.id)
    }

    /// Move every synced record back to a fresh local id.
    ///
    /// Used before syncing against a server that did not assign the current
    /// ids. Origin tags are kept (records without one get a new tag) so the
    /// new server and the other agents can still match them. Returns the
    /// number of records moved.
    pub fn detach(&mut self) -> usize {
        let synced: Vec<i64> = self.records.range(0..).map(|(id, _)| *id).collect();
        for id in &synced {
            if let Some(mut record) = self.records.remove(id) {
                if record.origin.is_empty() {
                    record.origin = new_origin();
                }
                let mut local = self.ids.allocate();
                while self.records.contains_key(&local) {
                    local = self.ids.allocate();
                }
                record.id = local;
                self.records.insert(local, record);
            }
        }
        tracing::debug!(count = synced.len(), "Detached synced records");
        synced.len()
    }

    /// Content keys referenced by live binary records
    pub fn binary_keys(&self) -> BTreeSet<ContentKey> {
        self.records
            .values()
            .filter(|r| !r.deleted)
            .filter_map(|r| r.payload.content_key().cloned())
            .collect()
    }
}
