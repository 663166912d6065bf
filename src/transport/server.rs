//! Sync server
//!
//! Authenticates each call, then reads and writes opaque encrypted records and
//! blobs through the repositories, scoped to the caller. Records pushed with a
//! local (negative) id are stored under a fresh server id and the mapping is
//! echoed back so the agent can re-key. Each record is applied whole; a
//! cancelled push leaves the records received so far in place, and uploading
//! one of them again reuses its id through the record's origin tag.

use super::auth::{authenticate, bearer_token, TokenResolver};
use super::proto::{BinaryChunk, Empty, IdMapping, PushAck};
use super::repository::{BinaryRepository, RecordRepository};
use super::retry::RetryPolicy;
use super::service::{BinaryStream, RecordStream, SyncService};
use crate::crypto::ContentKey;
use async_trait::async_trait;
use futures::StreamExt;
use tonic::{Request, Response, Status};

/// Sync service over pluggable persistence
pub struct SyncServer<R, B, A> {
    records: R,
    binaries: B,
    auth: A,
    retry: RetryPolicy,
}

impl<R, B, A> SyncServer<R, B, A>
where
    R: RecordRepository,
    B: BinaryRepository,
    A: TokenResolver,
{
    /// Create a server with the default retry policy
    pub fn new(records: R, binaries: B, auth: A) -> Self {
        Self {
            records,
            binaries,
            auth,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Record repository, for inspection
    pub fn records(&self) -> &R {
        &self.records
    }

    /// Binary repository, for inspection
    pub fn binaries(&self) -> &B {
        &self.binaries
    }
}

#[async_trait]
impl<R, B, A> SyncService for SyncServer<R, B, A>
where
    R: RecordRepository + 'static,
    B: BinaryRepository + 'static,
    A: TokenResolver + 'static,
{
    async fn push(&self, request: Request<RecordStream>) -> Result<Response<PushAck>, Status> {
        let token = bearer_token(request.metadata())?;
        let user = authenticate(&self.auth, &token).await?;
        let mut stream = request.into_inner();
        let mut ack = PushAck::default();

        let records = &self.records;
        let user_ref = &user;

        while let Some(message) = stream.next().await {
            let record = message?;

            if record.id < 0 {
                let local_id = record.id;
                let server_id = self
                    .retry
                    .run("insert record", move || {
                        records.insert_new(user_ref, record.clone())
                    })
                    .await?;
                ack.mappings.push(IdMapping {
                    local_id,
                    server_id,
                });
            } else {
                self.retry
                    .run("upsert record", move || records.upsert(user_ref, record.clone()))
                    .await?;
            }
            ack.accepted += 1;
        }

        tracing::info!(
            "Push from {}: {} records stored, {} re-keyed",
            user,
            ack.accepted,
            ack.mappings.len()
        );
        Ok(Response::new(ack))
    }

    async fn pull(&self, request: Request<Empty>) -> Result<Response<RecordStream>, Status> {
        let token = bearer_token(request.metadata())?;
        let user = authenticate(&self.auth, &token).await?;
        let records = &self.records;
        let user_ref = &user;

        let all = self
            .retry
            .run("list records", move || records.list(user_ref))
            .await?;
        tracing::info!("Pull by {}: {} records", user, all.len());

        let stream: RecordStream = Box::pin(tokio_stream::iter(all.into_iter().map(Ok)));
        Ok(Response::new(stream))
    }

    async fn push_binary(
        &self,
        request: Request<BinaryStream>,
    ) -> Result<Response<Empty>, Status> {
        let token = bearer_token(request.metadata())?;
        let user = authenticate(&self.auth, &token).await?;
        let mut stream = request.into_inner();
        let binaries = &self.binaries;
        let user_ref = &user;
        let mut stored = 0usize;

        while let Some(message) = stream.next().await {
            let chunk: BinaryChunk = message?;
            ContentKey::parse(&chunk.content_key)
                .map_err(|e| Status::invalid_argument(e.to_string()))?;

            self.retry
                .run("put binary", move || binaries.put(user_ref, chunk.clone()))
                .await?;
            stored += 1;
        }

        tracing::info!("Binary push from {}: {} blobs stored", user, stored);
        Ok(Response::new(Empty {}))
    }

    async fn pull_binary(
        &self,
        request: Request<Empty>,
    ) -> Result<Response<BinaryStream>, Status> {
        let token = bearer_token(request.metadata())?;
        let user = authenticate(&self.auth, &token).await?;
        let binaries = &self.binaries;
        let user_ref = &user;

        let all = self
            .retry
            .run("list binaries", move || binaries.list(user_ref))
            .await?;
        tracing::info!("Binary pull by {}: {} blobs", user, all.len());

        let stream = async_stream::stream! {
            for chunk in all {
                yield Ok(chunk);
            }
        };
        Ok(Response::new(Box::pin(stream) as BinaryStream))
    }
}
