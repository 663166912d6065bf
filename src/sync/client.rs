//! Agent side of the sync RPCs

use crate::error::Result;
use crate::record::StorageRecord;
use crate::transport::{
    with_bearer, BinaryChunk, BinaryStream, Empty, PushAck, RecordStream, SyncService,
};
use futures::TryStreamExt;

/// Calls a [`SyncService`] on behalf of one user
pub struct SyncClient<S> {
    service: S,
    token: String,
}

impl<S: SyncService> SyncClient<S> {
    /// Create a client presenting `token` on every call
    pub fn new(service: S, token: impl Into<String>) -> Self {
        Self {
            service,
            token: token.into(),
        }
    }

    /// Underlying service
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Download every record of this user, tombstones included
    pub async fn pull_records(&self) -> Result<Vec<StorageRecord>> {
        let request = with_bearer(Empty {}, &self.token)?;
        let records: Vec<StorageRecord> = self
            .service
            .pull(request)
            .await?
            .into_inner()
            .try_collect()
            .await?;
        tracing::debug!("Pulled {} records", records.len());
        Ok(records)
    }

    /// Upload records, returning the server's acknowledgement
    pub async fn push_records(&self, records: Vec<StorageRecord>) -> Result<PushAck> {
        let count = records.len();
        let stream = async_stream::stream! {
            for record in records {
                yield Ok(record);
            }
        };
        let request = with_bearer(Box::pin(stream) as RecordStream, &self.token)?;
        let ack = self.service.push(request).await?.into_inner();
        tracing::debug!(
            "Pushed {} records, server accepted {} ({} re-keyed)",
            count,
            ack.accepted,
            ack.mappings.len()
        );
        Ok(ack)
    }

    /// Download every blob of this user
    pub async fn pull_binaries(&self) -> Result<Vec<BinaryChunk>> {
        let request = with_bearer(Empty {}, &self.token)?;
        let chunks: Vec<BinaryChunk> = self
            .service
            .pull_binary(request)
            .await?
            .into_inner()
            .try_collect()
            .await?;
        tracing::debug!("Pulled {} blobs", chunks.len());
        Ok(chunks)
    }

    /// Upload blobs
    pub async fn push_binaries(&self, chunks: Vec<BinaryChunk>) -> Result<()> {
        let count = chunks.len();
        let stream = async_stream::stream! {
            for chunk in chunks {
                yield Ok(chunk);
            }
        };
        let request = with_bearer(Box::pin(stream) as BinaryStream, &self.token)?;
        self.service.push_binary(request).await?;
        tracing::debug!("Pushed {} blobs", count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::transport::{
        MemoryBinaryRepository, MemoryRecordRepository, StaticTokens, SyncServer, UserId,
    };
    use std::sync::Arc;

    type Server = SyncServer<MemoryRecordRepository, MemoryBinaryRepository, StaticTokens>;

    fn server() -> Arc<Server> {
        Arc::new(SyncServer::new(
            MemoryRecordRepository::new(),
            MemoryBinaryRepository::new(),
            StaticTokens::new().with_token("secret", UserId::new("u1")),
        ))
    }

    #[tokio::test]
    async fn test_push_then_pull() {
        let client = SyncClient::new(server(), "secret");
        let ack = client
            .push_records(vec![StorageRecord {
                id: -1,
                data: "opaque".to_string(),
                deleted: false,
                updated_at: 42,
                origin: String::new(),
            }])
            .await
            .unwrap();
        assert_eq!(ack.mappings.len(), 1);

        let pulled = client.pull_records().await.unwrap();
        assert_eq!(pulled.len(), 1);
        assert_eq!(pulled[0].id, ack.mappings[0].server_id);
        assert_eq!(pulled[0].updated_at, 42);
    }

    #[tokio::test]
    async fn test_bad_token_is_transport_error() {
        let client = SyncClient::new(server(), "wrong");
        let err = client.pull_records().await.unwrap_err();
        match err {
            Error::Transport(status) => assert_eq!(status.code(), tonic::Code::Unauthenticated),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_binary_push() {
        let client = SyncClient::new(server(), "secret");
        client.push_binaries(Vec::new()).await.unwrap();
        assert!(client.pull_binaries().await.unwrap().is_empty());
    }
}
