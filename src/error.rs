//! Lockbox error types

use thiserror::Error;

/// Lockbox error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cryptographic error (bad encoding, invalid key material)
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Data-integrity error. Never retried: corrupt bytes stay corrupt.
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// No record with this id
    #[error("record not found: {0}")]
    NotFound(i64),

    /// Record failed validation
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The passphrase does not open the existing log
    #[error("Invalid passphrase: no record in the log could be decrypted")]
    InvalidPassphrase,

    /// Server-side persistence error
    #[error("Storage error: {0}")]
    Storage(#[from] crate::transport::StorageError),

    /// Sync transport error
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::Status),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// True for failures caused by corrupt or tampered bytes
    pub fn is_integrity(&self) -> bool {
        matches!(self, Error::Integrity(_))
    }
}

/// Result type alias for Lockbox operations
pub type Result<T> = std::result::Result<T, Error>;
