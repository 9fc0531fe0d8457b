use super::{ArchiveError, ArchiveResult, ExchangeRecord, RecordWriter};
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Drains bodies and remembers record headers in memory
#[derive(Debug, Default)]
pub struct NullRecordWriter {
    records: Mutex<Vec<ExchangeRecord>>,
    closed: AtomicBool,
}

impl NullRecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records written so far, in write order
    pub fn records(&self) -> Vec<ExchangeRecord> {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// URLs of the records written so far
    pub fn urls(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.url).collect()
    }
}

impl RecordWriter for NullRecordWriter {
    fn write(&self, record: &ExchangeRecord, body: &mut dyn Read) -> ArchiveResult<u64> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ArchiveError::Closed);
        }
        let length = io::copy(body, &mut io::sink())?;
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(record.clone());
        Ok(length)
    }

    fn backlog(&self) -> usize {
        0
    }

    fn close(&self) -> ArchiveResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
