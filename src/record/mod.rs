//! Vault records: plaintext model, encrypted form and the session store

mod query;
mod store;
mod types;

pub use query::{Query, ANY_KEY};
pub use store::{DeleteOutcome, IdAllocator, RecordStore};
pub use types::{
    from_millis, new_origin, now, BankCard, BinaryRef, Credential, Metadata, Payload, Record,
    RecordType, StorageRecord, TextNote,
};
