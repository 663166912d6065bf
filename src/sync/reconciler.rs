//! Last-writer-wins reconciliation of local and remote record sets
//!
//! ```text
//! pass 0: local id + remote origin match ──▶ adopt the server id
//! pass 1: local ∩ remote   remote newer ──▶ overwrite local
//!                          otherwise    ──▶ keep local (uploaded on push)
//! pass 2: remote \ seen    decrypt + insert with the server id (tombstones too)
//! ```
//!
//! Pass 0 covers uploads whose acknowledgement never arrived: the server kept
//! the record under a new id, and the agent still holds it under its local id.
//!
//! A record that fails to decrypt is reported and skipped; the rest of the
//! merge continues. Callers hold `&mut RecordStore` for the whole merge, so no
//! local mutation can interleave.

use crate::error::Error;
use crate::record::{RecordStore, StorageRecord};
use crate::storage::RecordCodec;
use crate::transport::PushAck;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A record that could not be applied
#[derive(Debug)]
pub struct RecordFailure {
    pub id: i64,
    pub error: Error,
}

/// What a merge changed
#[derive(Debug, Default)]
pub struct MergeReport {
    /// Server ids taken over by local records whose upload was not acknowledged
    pub adopted: Vec<i64>,
    /// Local records overwritten by a newer remote copy
    pub updated: Vec<i64>,
    /// Remote records the store did not have
    pub inserted: Vec<i64>,
    /// Local records that stayed authoritative
    pub kept_local: Vec<i64>,
    /// Records skipped because they could not be decoded or applied
    pub failures: Vec<RecordFailure>,
}

impl MergeReport {
    /// True when every remote record was applied or deliberately ignored
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Two-pass merge and post-push re-keying
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler;

impl Reconciler {
    /// Merge a remote snapshot into the local store
    pub fn merge(
        store: &mut RecordStore,
        remote: Vec<StorageRecord>,
        codec: &RecordCodec,
    ) -> MergeReport {
        let mut report = MergeReport::default();
        let remote: BTreeMap<i64, StorageRecord> = remote.into_iter().map(|r| (r.id, r)).collect();
        let mut seen = BTreeSet::new();

        // Pass 0: our own unacknowledged uploads.
        let unconfirmed: HashMap<String, i64> = store
            .get_all()
            .iter()
            .filter(|r| r.is_local() && !r.origin.is_empty())
            .map(|r| (r.origin.clone(), r.id))
            .collect();
        for (id, theirs) in &remote {
            if store.get(*id).is_some() {
                continue;
            }
            let Some(&local_id) = unconfirmed.get(&theirs.origin) else {
                continue;
            };
            match store.rekey(local_id, *id) {
                Ok(()) => {
                    tracing::debug!(local_id, server_id = *id, "Adopted server id");
                    report.adopted.push(*id);
                }
                Err(error) => report.failures.push(RecordFailure { id: *id, error }),
            }
        }

        // Pass 1: records both sides know about.
        let local: Vec<(i64, i64)> = store
            .get_all()
            .iter()
            .map(|r| (r.id, r.updated_at.timestamp_millis()))
            .collect();

        for (id, local_updated) in local {
            let Some(theirs) = remote.get(&id) else {
                continue;
            };
            seen.insert(id);

            if theirs.updated_at <= local_updated {
                report.kept_local.push(id);
                continue;
            }

            match codec.open(theirs).and_then(|record| store.replace(record)) {
                Ok(()) => report.updated.push(id),
                Err(error) => {
                    tracing::warn!("Keeping local record {}: remote copy unusable: {}", id, error);
                    report.failures.push(RecordFailure { id, error });
                }
            }
        }

        // Pass 2: records only the server has.
        for (id, theirs) in remote.iter().filter(|(id, _)| !seen.contains(*id)) {
            match codec.open(theirs).and_then(|record| store.insert_remote(record)) {
                Ok(()) => report.inserted.push(*id),
                Err(error) => {
                    tracing::warn!("Skipping remote record {}: {}", id, error);
                    report.failures.push(RecordFailure { id: *id, error });
                }
            }
        }

        tracing::info!(
            "Merged remote snapshot: {} adopted, {} updated, {} inserted, {} kept local, {} failed",
            report.adopted.len(),
            report.updated.len(),
            report.inserted.len(),
            report.kept_local.len(),
            report.failures.len()
        );
        report
    }

    /// Re-key local records to the ids the server assigned on push
    pub fn apply_ack(store: &mut RecordStore, ack: &PushAck) -> Vec<RecordFailure> {
        let mut failures = Vec::new();
        for mapping in &ack.mappings {
            if let Err(error) = store.rekey(mapping.local_id, mapping.server_id) {
                tracing::warn!(
                    "Could not re-key {} to {}: {}",
                    mapping.local_id,
                    mapping.server_id,
                    error
                );
                failures.push(RecordFailure {
                    id: mapping.local_id,
                    error,
                });
            }
        }
        failures
    }
}
