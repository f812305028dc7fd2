//! # RecordHub Store Module
//!
//! The broker reaches its backing record store through the [`RecordStore`]
//! trait: keyed `get`, full `scan_all`, and `put` overwriting by `id`.
//!
//! Stores keep records in their own attribute encoding ([`AttributeMap`]),
//! where numbers are carried as canonical decimal text rather than as JSON
//! numbers. Converting between wire JSON and that encoding happens here, at
//! the connector boundary, never in the dispatcher.
//!
//! ## Implementations
//!
//! - [`MemoryRecordStore`] - DashMap-backed, process lifetime only
//! - [`FileRecordStore`] - a JSON document rewritten on every `put`

pub mod encoding;
pub mod file;
pub mod memory;

pub use encoding::{AttributeMap, AttributeValue};
pub use file::FileRecordStore;
pub use memory::MemoryRecordStore;

use crate::protocol::Record;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The record cannot be stored as given
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// The store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Keyed record store reached by the broker.
///
/// Calls are synchronous; the dispatcher runs them on the blocking pool.
pub trait RecordStore: Send + Sync {
    /// Fetch the record with the given id, `None` if absent.
    fn get(&self, id: &str) -> Result<Option<Record>, StoreError>;

    /// Every record currently held, in no particular order.
    fn scan_all(&self) -> Result<Vec<Record>, StoreError>;

    /// Store `record`, replacing any record with the same id, and return the
    /// record as the store now holds it (numeric fields normalized).
    fn put(&self, record: &Record) -> Result<Record, StoreError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}
