#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use lockbox::config::{LockboxConfig, StorageConfig};
use lockbox::sync::SyncClient;
use lockbox::transport::{
    BinaryStream, Empty, MemoryBinaryRepository, MemoryRecordRepository, PushAck, RecordRepository,
    RecordStream, RetryPolicy, StaticTokens, SyncServer, SyncService, UserId,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tonic::{Request, Response, Status};

pub type TestServer = SyncServer<MemoryRecordRepository, MemoryBinaryRepository, StaticTokens>;

pub const ALICE_LAPTOP: &str = "alice-laptop-token";
pub const ALICE_PHONE: &str = "alice-phone-token";
pub const BOB: &str = "bob-token";

pub fn vault_config(dir: &Path) -> LockboxConfig {
    LockboxConfig {
        storage: StorageConfig::in_dir(dir),
        ..LockboxConfig::default()
    }
}

/// In-memory server where both of Alice's tokens map to the same user
pub fn create_test_server() -> Arc<TestServer> {
    let tokens = StaticTokens::new()
        .with_token(ALICE_LAPTOP, UserId::new("alice"))
        .with_token(ALICE_PHONE, UserId::new("alice"))
        .with_token(BOB, UserId::new("bob"));

    Arc::new(
        SyncServer::new(
            MemoryRecordRepository::new(),
            MemoryBinaryRepository::new(),
            tokens,
        )
        .with_retry(RetryPolicy {
            delays_ms: vec![1, 1, 1],
            ..RetryPolicy::default()
        }),
    )
}

pub fn client(server: &Arc<TestServer>, token: &str) -> SyncClient<Arc<TestServer>> {
    SyncClient::new(server.clone(), token)
}

/// Wraps a service and breaks selected calls the way a dropped connection would
pub struct FlakyService<S> {
    inner: S,
    cut_push_after: Mutex<Option<usize>>,
    fail_binary_push: AtomicBool,
}

impl<S: SyncService> FlakyService<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cut_push_after: Mutex::new(None),
            fail_binary_push: AtomicBool::new(false),
        }
    }

    /// Deliver only the first `n` records of the next push, then drop the
    /// connection before the acknowledgement reaches the agent
    pub fn cut_next_push_after(self, n: usize) -> Self {
        *self.cut_push_after.lock().unwrap() = Some(n);
        self
    }

    /// Reject the next blob upload as unavailable
    pub fn fail_next_binary_push(self) -> Self {
        self.fail_binary_push.store(true, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl<S: SyncService> SyncService for FlakyService<S> {
    async fn push(&self, request: Request<RecordStream>) -> Result<Response<PushAck>, Status> {
        let cut = self.cut_push_after.lock().unwrap().take();
        let Some(n) = cut else {
            return self.inner.push(request).await;
        };

        let (metadata, extensions, stream) = request.into_parts();
        let truncated: RecordStream = Box::pin(stream.take(n));
        self.inner
            .push(Request::from_parts(metadata, extensions, truncated))
            .await?;
        Err(Status::cancelled("connection reset during push"))
    }

    async fn pull(&self, request: Request<Empty>) -> Result<Response<RecordStream>, Status> {
        self.inner.pull(request).await
    }

    async fn push_binary(
        &self,
        request: Request<BinaryStream>,
    ) -> Result<Response<Empty>, Status> {
        if self.fail_binary_push.swap(false, Ordering::SeqCst) {
            return Err(Status::unavailable("blob store offline"));
        }
        self.inner.push_binary(request).await
    }

    async fn pull_binary(
        &self,
        request: Request<Empty>,
    ) -> Result<Response<BinaryStream>, Status> {
        self.inner.pull_binary(request).await
    }
}

pub fn flaky_client(
    flaky: FlakyService<Arc<TestServer>>,
    token: &str,
) -> SyncClient<FlakyService<Arc<TestServer>>> {
    SyncClient::new(flaky, token)
}

/// Records the server holds for a user, tombstones included
pub async fn server_records(server: &Arc<TestServer>, user: &str) -> usize {
    server
        .records()
        .list(&UserId::new(user))
        .await
        .unwrap()
        .len()
}
