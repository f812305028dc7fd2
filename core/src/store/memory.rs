use dashmap::DashMap;
use tracing::trace;

use super::encoding::{decode_record, encode_record, AttributeMap};
use super::{RecordStore, StoreError};
use crate::protocol::Record;

/// In-memory record store using DashMap for fine-grained locking
///
/// Records with different ids never contend; a `put` replaces the whole
/// record for its id.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: DashMap<String, AttributeMap>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordStore for MemoryRecordStore {
    fn get(&self, id: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.records.get(id).map(|entry| decode_record(entry.value())))
    }

    fn scan_all(&self) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .records
            .iter()
            .map(|entry| decode_record(entry.value()))
            .collect())
    }

    fn put(&self, record: &Record) -> Result<Record, StoreError> {
        let (id, encoded) = encode_record(record)?;
        let stored = decode_record(&encoded);
        trace!(id = %id, "storing record in memory");
        self.records.insert(id, encoded);
        Ok(stored)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
