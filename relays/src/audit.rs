//! Chunk audit logging.
//!
//! Every monitor process owns one audit log: a CSV file reset at startup and
//! appended with one record per forwarded chunk. Appends go through a bounded
//! queue drained by a single writer task so the relay hot path never blocks
//! on disk. Records that cannot be queued are dropped and counted; an audit
//! failure never interrupts relaying.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, warn};

use crate::types::{ChunkRecord, TargetId, AUDIT_HEADER};
use crate::{RelayError, RelayResult};

/// Default capacity of the append queue between copiers and the writer task.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct AuditCounters {
    records_written: AtomicU64,
    records_dropped: AtomicU64,
    write_errors: AtomicU64,
}

/// Point-in-time snapshot of audit log activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditStats {
    pub records_written: u64,
    pub records_dropped: u64,
    pub write_errors: u64,
    pub next_sequence: u64,
}

/// Handle to the shared chunk audit log.
///
/// Clones share the sequence counter and the append queue; every connection
/// pair gets one handle. When the last handle drops, the writer task drains
/// the queue and exits.
#[derive(Debug, Clone)]
pub struct ChunkAuditLog {
    target: TargetId,
    sequence: Arc<AtomicU64>,
    tx: mpsc::Sender<ChunkRecord>,
    counters: Arc<AuditCounters>,
}

impl ChunkAuditLog {
    /// Reset the log file and start the writer task.
    ///
    /// The existing file is deleted, recreated, and the header written before
    /// this returns, so callers can rely on a known-empty log before
    /// accepting any traffic.
    pub async fn create(path: &Path, target: TargetId) -> RelayResult<Self> {
        Self::create_with_capacity(path, target, DEFAULT_QUEUE_CAPACITY).await
    }

    /// Same as [`create`](Self::create) with an explicit queue capacity.
    pub async fn create_with_capacity(
        path: &Path,
        target: TargetId,
        capacity: usize,
    ) -> RelayResult<Self> {
        reset_log_file(path).map_err(|source| RelayError::AuditInit {
            path: path.to_path_buf(),
            source,
        })?;

        let file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(path)
            .await
            .map_err(|source| RelayError::AuditInit {
                path: path.to_path_buf(),
                source,
            })?;

        let (tx, rx) = mpsc::channel(capacity);
        let counters = Arc::new(AuditCounters::default());
        tokio::spawn(run_writer(file, rx, Arc::clone(&counters)));

        debug!("Audit log {} reset for {}", path.display(), target);
        Ok(Self {
            target,
            sequence: Arc::new(AtomicU64::new(1)),
            tx,
            counters,
        })
    }

    /// Record one forwarded chunk.
    ///
    /// Never blocks: the record is queued for the writer task and dropped
    /// with a diagnostic counter if the queue is full. The sequence number is
    /// taken before queueing, so the first record always carries 1.
    pub fn record(&self, bytes: usize) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let record = ChunkRecord {
            target: self.target,
            sequence,
            bytes: bytes as u64,
        };

        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                self.note_dropped(record, "Audit queue full");
            }
            Err(TrySendError::Closed(record)) => {
                self.note_dropped(record, "Audit writer stopped");
            }
        }
    }

    /// Identity label stamped on every record.
    pub fn target(&self) -> TargetId {
        self.target
    }

    /// Current counters and sequence position.
    pub fn stats(&self) -> AuditStats {
        AuditStats {
            records_written: self.counters.records_written.load(Ordering::Relaxed),
            records_dropped: self.counters.records_dropped.load(Ordering::Relaxed),
            write_errors: self.counters.write_errors.load(Ordering::Relaxed),
            next_sequence: self.sequence.load(Ordering::Relaxed),
        }
    }

    fn note_dropped(&self, record: ChunkRecord, reason: &str) {
        let dropped = self.counters.records_dropped.fetch_add(1, Ordering::Relaxed) + 1;
        if dropped == 1 || dropped % 1000 == 0 {
            warn!(
                "{}, dropped record {} ({} dropped so far)",
                reason, record.sequence, dropped
            );
        }
    }
}

/// Delete any previous log and write a fresh one holding only the header.
fn reset_log_file(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }

    let mut file = std::fs::File::create(path)?;
    writeln!(file, "{}", AUDIT_HEADER)?;
    Ok(())
}

/// Single writer: drains the queue and appends one CSV line per record.
async fn run_writer<W>(mut sink: W, mut rx: mpsc::Receiver<ChunkRecord>, counters: Arc<AuditCounters>)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(record) = rx.recv().await {
        match append_line(&mut sink, &record).await {
            Ok(()) => {
                counters.records_written.fetch_add(1, Ordering::Relaxed);
                debug!("Audit record {} appended ({} bytes)", record.sequence, record.bytes);
            }
            Err(err) => {
                let errors = counters.write_errors.fetch_add(1, Ordering::Relaxed) + 1;
                error!(
                    "Failed to append audit record {}: {} ({} errors so far)",
                    record.sequence, err, errors
                );
            }
        }
    }
}

async fn append_line<W>(sink: &mut W, record: &ChunkRecord) -> std::io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let line = format!("{}\n", record.to_csv_line());
    sink.write_all(line.as_bytes()).await?;
    sink.flush().await
}
