//! Write-ahead log of index mutations

use super::frame::{encode_frame, Frames};
use super::index::{Index, IndexEntry};
use super::{QueueError, QueueResult};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalOp {
    Add,
    Pop,
}

/// One index mutation
///
/// `epoch` ties the record to the snapshot it applies on top of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalRecord {
    pub epoch: u64,
    pub op: WalOp,
    pub host: String,
    pub id: String,
    #[serde(default)]
    pub position: u64,
    #[serde(default)]
    pub size: u64,
}

impl WalRecord {
    pub fn add(epoch: u64, host: &str, entry: &IndexEntry) -> Self {
        Self {
            epoch,
            op: WalOp::Add,
            host: host.to_string(),
            id: entry.id.clone(),
            position: entry.position,
            size: entry.size,
        }
    }

    pub fn pop(epoch: u64, host: &str, id: &str) -> Self {
        Self {
            epoch,
            op: WalOp::Pop,
            host: host.to_string(),
            id: id.to_string(),
            position: 0,
            size: 0,
        }
    }

    /// Appends the framed record to a write buffer
    pub fn encode_into(&self, out: &mut Vec<u8>) -> QueueResult<()> {
        let payload =
            serde_json::to_vec(self).map_err(|e| QueueError::Codec(e.to_string()))?;
        encode_frame(&payload, out)?;
        Ok(())
    }
}

/// Append-only WAL file
pub struct Wal {
    file: File,
}

impl Wal {
    pub fn open(path: &Path) -> QueueResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }

    /// Writes pre-encoded records; the caller maps failures to durability errors
    pub fn append(&mut self, encoded: &[u8]) -> std::io::Result<()> {
        self.file.write_all(encoded)
    }

    /// Empties the WAL after a snapshot
    pub fn truncate(&mut self) -> std::io::Result<()> {
        self.file.set_len(0)?;
        self.file.sync_all()
    }

    /// Handle for the background syncer
    pub fn try_clone_file(&self) -> std::io::Result<File> {
        self.file.try_clone()
    }
}

/// Summary of a replay
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub applied: usize,
    pub skipped_stale: usize,
    pub torn_tail: Option<u64>,
}

/// Replays the WAL at `path` on top of `index`
///
/// Records from an older epoch are already contained in the snapshot and are
/// skipped. A trailing incomplete record is discarded. Any complete record
/// that cannot be decoded or applied aborts recovery with
/// [`QueueError::CorruptWal`].
pub fn replay(path: &Path, index: &mut Index, epoch: u64) -> QueueResult<ReplayReport> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ReplayReport::default()),
        Err(e) => return Err(e.into()),
    };

    let mut report = ReplayReport::default();
    let mut frames = Frames::new(&bytes);

    for (offset, payload) in frames.by_ref() {
        let record: WalRecord =
            serde_json::from_slice(payload).map_err(|e| QueueError::CorruptWal {
                offset,
                reason: e.to_string(),
            })?;

        if record.epoch < epoch {
            report.skipped_stale += 1;
            continue;
        }
        if record.epoch > epoch {
            return Err(QueueError::CorruptWal {
                offset,
                reason: format!(
                    "record epoch {} is newer than snapshot epoch {}",
                    record.epoch, epoch
                ),
            });
        }

        match record.op {
            WalOp::Add => index.push(
                &record.host,
                IndexEntry {
                    id: record.id,
                    position: record.position,
                    size: record.size,
                },
            ),
            WalOp::Pop => {
                if index.pop(&record.host, &record.id).is_none() {
                    return Err(QueueError::CorruptWal {
                        offset,
                        reason: format!(
                            "pop of unknown entry {} for host {}",
                            record.id, record.host
                        ),
                    });
                }
            }
        }
        report.applied += 1;
    }

    report.torn_tail = frames.torn_tail();
    if let Some(offset) = report.torn_tail {
        warn!(offset, "Discarding torn trailing WAL record");
    }
    debug!(
        applied = report.applied,
        skipped = report.skipped_stale,
        "Replayed WAL"
    );

    Ok(report)
}
