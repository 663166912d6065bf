//! Sync service contract
//!
//! Shaped like a tonic-generated service: requests carry metadata (the bearer
//! token), streaming bodies are boxed streams of `Result<_, Status>`, and
//! failures are `Status`. A gRPC adapter only has to forward calls; the
//! in-process [`SyncServer`](super::SyncServer) implements the trait directly.

use super::proto::{BinaryChunk, Empty, PushAck};
use crate::record::StorageRecord;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tonic::{Request, Response, Status};

/// Stream of encrypted records
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<StorageRecord, Status>> + Send + 'static>>;

/// Stream of encrypted blobs
pub type BinaryStream = Pin<Box<dyn Stream<Item = Result<BinaryChunk, Status>> + Send + 'static>>;

/// Agent <-> server synchronization RPCs
#[async_trait]
pub trait SyncService: Send + Sync + 'static {
    /// Upload records; the server upserts by `(user, id)` and re-keys
    /// negative ids, reporting them in the acknowledgement
    async fn push(&self, request: Request<RecordStream>) -> Result<Response<PushAck>, Status>;

    /// Download every record of the caller, tombstones included
    async fn pull(&self, request: Request<Empty>) -> Result<Response<RecordStream>, Status>;

    /// Upload encrypted blobs
    async fn push_binary(&self, request: Request<BinaryStream>)
        -> Result<Response<Empty>, Status>;

    /// Download every blob of the caller
    async fn pull_binary(&self, request: Request<Empty>)
        -> Result<Response<BinaryStream>, Status>;
}

#[async_trait]
impl<T: SyncService> SyncService for Arc<T> {
    async fn push(&self, request: Request<RecordStream>) -> Result<Response<PushAck>, Status> {
        (**self).push(request).await
    }

    async fn pull(&self, request: Request<Empty>) -> Result<Response<RecordStream>, Status> {
        (**self).pull(request).await
    }

    async fn push_binary(
        &self,
        request: Request<BinaryStream>,
    ) -> Result<Response<Empty>, Status> {
        (**self).push_binary(request).await
    }

    async fn pull_binary(
        &self,
        request: Request<Empty>,
    ) -> Result<Response<BinaryStream>, Status> {
        (**self).pull_binary(request).await
    }
}
