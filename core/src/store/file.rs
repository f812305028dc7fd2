use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::encoding::{decode_record, encode_record, AttributeMap};
use super::{RecordStore, StoreError};
use crate::protocol::Record;

/// Record store persisted as a single JSON document.
///
/// The whole table is rewritten through a temporary file and an atomic rename
/// on every `put`, while the write lock is held, so the file on disk always
/// matches a state the store actually had.
#[derive(Debug)]
pub struct FileRecordStore {
    path: PathBuf,
    records: RwLock<BTreeMap<String, AttributeMap>>,
}

impl FileRecordStore {
    /// Open the store at `path`, loading existing records if the file exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let records = if path.exists() {
            let content = fs::read(&path)?;
            if content.iter().all(u8::is_ascii_whitespace) {
                BTreeMap::new()
            } else {
                serde_json::from_slice(&content)?
            }
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            BTreeMap::new()
        };

        info!(path = %path.display(), records = records.len(), "opened file record store");
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, records: &BTreeMap<String, AttributeMap>) -> Result<(), StoreError> {
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            serde_json::to_writer_pretty(&mut file, records)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        debug!(path = %self.path.display(), records = records.len(), "persisted record store");
        Ok(())
    }
}

impl RecordStore for FileRecordStore {
    fn get(&self, id: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.records.read().get(id).map(decode_record))
    }

    fn scan_all(&self) -> Result<Vec<Record>, StoreError> {
        Ok(self.records.read().values().map(decode_record).collect())
    }

    fn put(&self, record: &Record) -> Result<Record, StoreError> {
        let (id, encoded) = encode_record(record)?;
        let stored = decode_record(&encoded);

        let mut records = self.records.write();
        let previous = records.insert(id.clone(), encoded);
        if let Err(e) = self.persist(&records) {
            // Keep memory and disk in step when the write fails.
            match previous {
                Some(previous) => records.insert(id, previous),
                None => records.remove(&id),
            };
            return Err(e);
        }
        Ok(stored)
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRecordStore::open(dir.path().join("records.json")).unwrap();
        assert!(store.scan_all().unwrap().is_empty());
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("records.json");

        {
            let store = FileRecordStore::open(&path).unwrap();
            store
                .put(&record(json!({"id": "42", "name": "Acme", "cp": 1425})))
                .unwrap();
        }

        let reopened = FileRecordStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("42").unwrap(),
            Some(record(json!({"id": "42", "name": "Acme", "cp": 1425})))
        );
    }

    #[test]
    fn test_numbers_are_persisted_as_decimals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        let store = FileRecordStore::open(&path).unwrap();
        store.put(&record(json!({"id": "1", "price": 10.50}))).unwrap();

        let on_disk: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk["1"]["price"], json!({"N": "10.5"}));
    }

    #[test]
    fn test_put_without_id_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRecordStore::open(dir.path().join("records.json")).unwrap();

        assert!(store.put(&record(json!({"name": "nameless"}))).is_err());
        assert!(store.scan_all().unwrap().is_empty());
    }
}
