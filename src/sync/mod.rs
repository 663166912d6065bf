//! Agent-side synchronization
//!
//! [`SyncClient`] moves encrypted records and blobs over a
//! [`SyncService`](crate::transport::SyncService); [`Reconciler`] folds the
//! pulled snapshot into the local store and applies the server's re-keying.

mod client;
mod reconciler;

pub use client::SyncClient;
pub use reconciler::{MergeReport, Reconciler, RecordFailure};
