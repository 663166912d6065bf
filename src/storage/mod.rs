//! Local persistence: encrypted record log and binary blob store

mod blob;
mod codec;
mod log;

pub use blob::{BlobStore, SaveMode};
pub use codec::RecordCodec;
pub use log::{EncryptedLog, LogRestore};
