//! # RecordHub Audit Module
//!
//! One immutable [`AuditRecord`] is appended for every handled action, failed
//! ones included once they got far enough to be logged. Appends are
//! fire-and-forget: the broker never reads the trail back.
//!
//! - [`JsonlAuditSink`] - JSON lines appended to a file by a background writer
//! - [`TracingAuditSink`] - one structured `tracing` event per record
//! - [`MemoryAuditSink`] - kept in process, for tests and embedding

pub mod jsonl;

pub use jsonl::JsonlAuditSink;

use chrono::Local;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::protocol::Action;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit writer has shut down")]
    Closed,

    #[error("audit queue is full ({0} pending records)")]
    Backlogged(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Immutable log entry describing one handled action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Fresh id of this log entry
    pub record_id: String,
    pub client_id: String,
    /// Fresh per call
    pub session_id: String,
    /// Local time, `%Y-%m-%d %H:%M:%S`
    pub timestamp: String,
    pub action: String,
    /// Record id touched by `get`/`set`, empty otherwise
    pub extra: String,
}

impl AuditRecord {
    pub fn new(client_id: &str, action: &Action, extra: impl Into<String>) -> Self {
        Self {
            record_id: Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            session_id: Uuid::new_v4().to_string(),
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            action: action.to_string(),
            extra: extra.into(),
        }
    }
}

/// Append-only destination for audit records.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: AuditRecord) -> Result<(), AuditError>;
}

/// Emits every audit record as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        info!(
            target: "recordhub::audit",
            record_id = %record.record_id,
            client_id = %record.client_id,
            session_id = %record.session_id,
            timestamp = %record.timestamp,
            action = %record.action,
            extra = %record.extra,
            "audit"
        );
        Ok(())
    }
}

/// Keeps audit records in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record appended so far, oldest first.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        self.records.lock().push(record);
        Ok(())
    }
}
