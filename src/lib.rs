//! Lockbox - Encrypted personal secrets vault with multi-agent sync
//!
//! Lockbox keeps credentials, bank cards, text notes and files in a local
//! vault encrypted at rest, and reconciles it with a sync server so the same
//! vault can be used from several agents, including while offline.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────── Agent ────────────────────────────────┐
//! │                                                                        │
//! │   CLI ──▶ Vault ──┬──▶ RecordStore (ids: -1, -2, … until synced)       │
//! │                   │         │                                          │
//! │                   │         ▼                                          │
//! │                   ├──▶ RecordCodec ──▶ EncryptedLog  records.log       │
//! │                   │    (AES-CBC, SHA-256 key)                          │
//! │                   ├──▶ BlobStore  blobs/<sha256 of plaintext>          │
//! │                   │                                                    │
//! │                   └──▶ SyncClient + Reconciler (last writer wins)      │
//! └─────────────────────────────────┬──────────────────────────────────────┘
//!                                   │ push / pull / push_binary / pull_binary
//!                                   │ authorization: Bearer <token>
//! ┌─────────────────────────────────▼──────────────────────────────────────┐
//! │  SyncServer ──▶ TokenResolver ──▶ UserId                               │
//! │            ──▶ RecordRepository / BinaryRepository (opaque ciphertext) │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The server never sees plaintext: records travel as [`record::StorageRecord`]
//! with only the id, tombstone flag and timestamp in the clear.
//!
//! ## Modules
//!
//! - [`crypto`]: key derivation, AES-CBC cipher, content hashing
//! - [`record`]: record model, in-memory store, queries
//! - [`storage`]: encrypted log, blob store, record codec
//! - [`sync`]: sync client and last-writer-wins reconciler
//! - [`transport`]: wire messages, service contract, server, retry
//! - [`vault`]: the unlocked vault session
//! - [`config`]: configuration management

pub mod config;
pub mod crypto;
pub mod error;
#[cfg(feature = "hardening")]
pub mod hardening;
pub mod record;
pub mod storage;
pub mod sync;
pub mod transport;
pub mod vault;

pub use config::LockboxConfig;
pub use error::{Error, Result};
pub use vault::{SyncReport, Vault};
