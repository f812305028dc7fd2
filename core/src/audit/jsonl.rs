use crossbeam::channel::{self, Sender, TrySendError};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use tracing::{debug, error, info};

use super::{AuditError, AuditRecord, AuditSink};

/// Pending records allowed before `append` reports a backlog.
const AUDIT_QUEUE_CAPACITY: usize = 10_000;

/// Appends audit records to a JSON-lines file.
///
/// `append` only enqueues; a dedicated writer thread drains the bounded queue
/// and flushes after every burst. Dropping the sink closes the queue and
/// waits for the writer to finish what is already queued.
pub struct JsonlAuditSink {
    path: PathBuf,
    tx: Option<Sender<AuditRecord>>,
    writer: Option<JoinHandle<()>>,
}

impl JsonlAuditSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let (tx, rx) = channel::bounded::<AuditRecord>(AUDIT_QUEUE_CAPACITY);
        let writer_path = path.clone();
        let writer = std::thread::Builder::new()
            .name("recordhub-audit".to_string())
            .spawn(move || Self::writer_loop(rx, file, writer_path))?;

        info!(path = %path.display(), "audit log opened");
        Ok(Self {
            path,
            tx: Some(tx),
            writer: Some(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer_loop(rx: channel::Receiver<AuditRecord>, file: File, path: PathBuf) {
        let mut out = BufWriter::new(file);
        while let Ok(first) = rx.recv() {
            let mut written = 0usize;
            for record in std::iter::once(first).chain(rx.try_iter()) {
                if let Err(e) = Self::write_line(&mut out, &record) {
                    error!(path = %path.display(), "failed to write audit record: {}", e);
                } else {
                    written += 1;
                }
            }
            if let Err(e) = out.flush() {
                error!(path = %path.display(), "failed to flush audit log: {}", e);
            }
            debug!(written, "audit records flushed");
        }
        debug!(path = %path.display(), "audit writer stopped");
    }

    fn write_line(out: &mut impl Write, record: &AuditRecord) -> std::io::Result<()> {
        serde_json::to_writer(&mut *out, record)?;
        out.write_all(b"\n")
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        let tx = self.tx.as_ref().ok_or(AuditError::Closed)?;
        tx.try_send(record).map_err(|e| match e {
            TrySendError::Full(_) => AuditError::Backlogged(tx.len()),
            TrySendError::Disconnected(_) => AuditError::Closed,
        })
    }
}

impl Drop for JsonlAuditSink {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                error!(path = %self.path.display(), "audit writer panicked");
            }
        }
    }
}
