//! Sync transport boundary
//!
//! Wire messages, the streaming service contract, bearer authentication and
//! the server that persists encrypted records per user.
//!
//! ```text
//! Agent (SyncClient) ──push/pull──▶ SyncService ──▶ SyncServer
//!                                                     ├─ TokenResolver   (bearer → UserId)
//!                                                     ├─ RecordRepository (upsert by user+id)
//!                                                     └─ BinaryRepository (put by user+key)
//! ```

mod auth;
mod proto;
mod repository;
mod retry;
mod server;
mod service;

pub use auth::{
    authenticate, bearer_token, with_bearer, StaticTokens, TokenResolver, UserId, AUTHORIZATION,
};
pub use proto::{BinaryChunk, Empty, IdMapping, PushAck};
pub use repository::{
    BinaryRepository, MemoryBinaryRepository, MemoryRecordRepository, RecordRepository,
    StorageError, StorageErrorKind, StorageResult,
};
pub use retry::RetryPolicy;
pub use server::SyncServer;
pub use service::{BinaryStream, RecordStream, SyncService};
