use super::{ArchiveError, ArchiveResult, ExchangeRecord, RecordWriter};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

pub const RECORDS_DIR: &str = "warcs";

/// Header file contents: the exchange plus its payload summary
#[derive(Serialize)]
struct StoredRecord<'a> {
    #[serde(flatten)]
    record: &'a ExchangeRecord,
    payload_digest: String,
    payload_length: u64,
}

/// Writes each exchange as `<id>.json` plus `<id>.body`
pub struct FileRecordWriter {
    dir: PathBuf,
    in_flight: AtomicUsize,
    closed: AtomicBool,
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Hashes everything written through it
struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl FileRecordWriter {
    /// Creates the writer, creating `<job_dir>/warcs` if needed
    pub fn new(job_dir: &Path) -> ArchiveResult<Self> {
        let dir = job_dir.join(RECORDS_DIR);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            in_flight: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl RecordWriter for FileRecordWriter {
    fn write(&self, record: &ExchangeRecord, body: &mut dyn Read) -> ArchiveResult<u64> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ArchiveError::Closed);
        }
        let _guard = InFlight::enter(&self.in_flight);

        let body_path = self.dir.join(format!("{}.body", record.id));
        let mut out = HashingWriter {
            inner: BufWriter::new(File::create(&body_path)?),
            hasher: Sha256::new(),
        };
        let length = io::copy(body, &mut out)?;
        out.flush()?;
        let digest = hex::encode(out.hasher.finalize());

        let stored = StoredRecord {
            record,
            payload_digest: format!("sha256:{}", digest),
            payload_length: length,
        };
        let header_path = self.dir.join(format!("{}.json", record.id));
        let tmp_path = self.dir.join(format!("{}.json.tmp", record.id));
        fs::write(&tmp_path, serde_json::to_vec_pretty(&stored)?)?;
        fs::rename(&tmp_path, &header_path)?;

        debug!(url = %record.url, id = %record.id, bytes = length, "Wrote record");
        Ok(length)
    }

    fn backlog(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    fn close(&self) -> ArchiveResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
