//! Record filtering by type and metadata

use super::types::{Metadata, Record, RecordType};

/// Filter key that matches any metadata value regardless of its key
pub const ANY_KEY: &str = "any";

/// Selection criteria for [`RecordStore::query`](super::RecordStore::query).
///
/// Filters are conjunctive. A filter under [`ANY_KEY`] is satisfied when any
/// metadata value equals it; every other filter needs an exact key/value match.
/// Deleted records never match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub record_type: RecordType,
    pub filters: Metadata,
}

impl Query {
    /// Match every live record of `record_type`
    pub fn new(record_type: RecordType) -> Self {
        Self {
            record_type,
            filters: Metadata::new(),
        }
    }

    /// Add a metadata filter
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Add a filter on any metadata value
    pub fn any_value(self, value: impl Into<String>) -> Self {
        self.filter(ANY_KEY, value)
    }

    /// Whether `record` satisfies this query
    pub fn matches(&self, record: &Record) -> bool {
        if record.deleted || !self.record_type.accepts(record.record_type()) {
            return false;
        }

        self.filters.iter().all(|(key, value)| {
            if key == ANY_KEY {
                record.metadata.values().any(|v| v == value)
            } else {
                record.metadata.get(key) == Some(value)
            }
        })
    }
}
