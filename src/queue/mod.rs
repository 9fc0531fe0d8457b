//! Persistent Grouped Queue
//!
//! A durable, multi-producer/multi-consumer queue that is FIFO within a host
//! and round-robin across hosts. Files under the job directory:
//!
//! - `queue`: append-only data file of length-prefixed encoded items
//! - `index` (+ `index.1`, `index.2`): snapshots of the in-memory index
//! - `index_wal`: append-only log of index mutations since the last snapshot
//! - `queue.meta`: config hash, host cursor and creation time
//! - `queue.stats`: statistics written at close and consumed at open
//!
//! Locking order is I/O (data file + WAL) before the index; statistics have
//! their own lock and are never taken while holding the others.

mod dumper;
mod frame;
mod handover;
mod index;
mod meta;
mod snapshot;
mod stats;
mod syncer;
mod wal;

pub use index::IndexEntry;
pub use meta::QueueMeta;
pub use stats::QueueStats;

use crate::config::JobConfig;
use crate::item::{decode_item, encode_item, CodecError, Item};
use dumper::Dumper;
use frame::{decode_frame, encode_frame};
use handover::{Handoff, Handover};
use index::Index;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use syncer::Syncer;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wal::{Wal, WalRecord};

const DATA_FILE: &str = "queue";
const WAL_FILE: &str = "index_wal";

/// Queue errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue is closed")]
    Closed,

    #[error("Queue is empty")]
    Empty,

    #[error("Dequeue is frozen")]
    DequeueFrozen,

    #[error("Durability failure: {0}")]
    Durability(std::io::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Corrupt WAL at offset {offset}: {reason}")]
    CorruptWal { offset: u64, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl QueueError {
    /// Returns true if the queue cannot be used after this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Closed | Self::Durability(_) | Self::CorruptWal { .. }
        )
    }
}

impl From<CodecError> for QueueError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e.to_string())
    }
}

/// Result type alias for queue operations
pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// Queue tuning knobs
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Wait for the fsync before an enqueue returns
    pub use_commit: bool,
    /// Enable the single-slot handover fast path
    pub use_handover: bool,
    pub dump_interval: Duration,
    pub sync_max_wait: Duration,
    /// Hash of the configuration, recorded in `queue.meta`
    pub config_hash: Option<String>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            use_commit: true,
            use_handover: false,
            dump_interval: Duration::from_secs(60),
            sync_max_wait: Duration::from_millis(50),
            config_hash: None,
        }
    }
}

impl QueueOptions {
    pub fn from_job(job: &JobConfig, config_hash: Option<String>) -> Self {
        Self {
            use_commit: job.use_commit,
            use_handover: job.use_handover,
            dump_interval: Duration::from_secs(job.wal_dump_interval_secs),
            sync_max_wait: Duration::from_millis(job.wal_sync_max_wait_ms),
            config_hash,
        }
    }
}

struct QueueFiles {
    data: File,
    data_len: u64,
    wal: Wal,
    epoch: u64,
}

struct Shared {
    dir: PathBuf,
    io: Mutex<QueueFiles>,
    index: RwLock<Index>,
    stats: Mutex<QueueStats>,
    meta: Mutex<QueueMeta>,
    closed: Arc<AtomicBool>,
    closing: AtomicBool,
    frozen: AtomicBool,
    available: Notify,
    handover: Option<Handover>,
    syncer: Syncer,
    use_commit: bool,
}

/// Durable FIFO-per-host queue with round-robin fairness across hosts
///
/// # Example
///
/// ```no_run
/// use sumi_archiver::queue::{PersistentGroupedQueue, QueueOptions};
/// use sumi_archiver::Item;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let queue = PersistentGroupedQueue::open(Path::new("jobs/demo"), QueueOptions::default())?;
/// queue.enqueue(vec![Item::seed("http://a.example/")?]).await?;
/// let item = queue.dequeue()?;
/// queue.close()?;
/// # Ok(())
/// # }
/// ```
pub struct PersistentGroupedQueue {
    shared: Arc<Shared>,
    dumper: Mutex<Option<Dumper>>,
}

impl PersistentGroupedQueue {
    /// Opens the queue of a job directory, recovering from a crash if needed
    ///
    /// Recovery loads the latest snapshot, replays the WAL on top of it and
    /// immediately writes a fresh snapshot, leaving the WAL empty.
    ///
    /// # Returns
    ///
    /// * `Ok(PersistentGroupedQueue)` - The queue, ready for use
    /// * `Err(QueueError::CorruptWal)` - A complete WAL record could not be applied
    /// * `Err(QueueError)` - The job files could not be opened
    pub fn open(dir: &Path, options: QueueOptions) -> QueueResult<Self> {
        std::fs::create_dir_all(dir)?;

        let snapshot = snapshot::load(dir);
        let epoch = snapshot.epoch;
        let mut index = Index::from_snapshot(snapshot);
        let report = wal::replay(&dir.join(WAL_FILE), &mut index, epoch)?;

        let data = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(dir.join(DATA_FILE))?;
        let data_len = data.metadata()?.len();
        let wal = Wal::open(&dir.join(WAL_FILE))?;

        let stats_path = dir.join(stats::STATS_FILE);
        let mut stats = match QueueStats::load(&stats_path) {
            Ok(Some(stats)) => {
                if let Err(e) = std::fs::remove_file(&stats_path) {
                    warn!(error = %e, "Failed to remove consumed queue stats");
                }
                stats
            }
            Ok(None) => QueueStats::default(),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable queue stats");
                QueueStats::default()
            }
        };
        stats.reset_elements(index.host_counts());

        let meta = match QueueMeta::load(&dir.join(meta::META_FILE)) {
            Some(mut meta) => {
                if options.config_hash.is_some() && meta.config_hash != options.config_hash {
                    warn!("Configuration changed since this job was created");
                    meta.config_hash = options.config_hash.clone();
                }
                meta
            }
            None => QueueMeta::new(options.config_hash.clone()),
        };

        let closed = Arc::new(AtomicBool::new(false));
        let syncer = Syncer::spawn(
            data.try_clone()?,
            wal.try_clone_file()?,
            options.sync_max_wait,
            Arc::clone(&closed),
        )?;

        let elements = index.len();
        let hosts = index.host_count();

        let shared = Arc::new(Shared {
            dir: dir.to_path_buf(),
            io: Mutex::new(QueueFiles {
                data,
                data_len,
                wal,
                epoch,
            }),
            index: RwLock::new(index),
            stats: Mutex::new(stats),
            meta: Mutex::new(meta),
            closed,
            closing: AtomicBool::new(false),
            frozen: AtomicBool::new(false),
            available: Notify::new(),
            handover: options.use_handover.then(Handover::new),
            syncer,
            use_commit: options.use_commit,
        });

        shared.dump()?;

        info!(
            elements,
            hosts,
            replayed = report.applied,
            torn_tail = report.torn_tail.is_some(),
            "Opened queue"
        );

        let dump_shared = Arc::clone(&shared);
        let dumper = Dumper::spawn(options.dump_interval, move || {
            if dump_shared.closed.load(Ordering::Acquire) {
                return false;
            }
            match dump_shared.dump() {
                Ok(()) => true,
                Err(e) => {
                    error!(error = %e, "Queue snapshot failed, closing queue");
                    dump_shared.closed.store(true, Ordering::Release);
                    false
                }
            }
        })?;

        Ok(Self {
            shared,
            dumper: Mutex::new(Some(dumper)),
        })
    }

    /// Appends items to their host buckets
    ///
    /// Returns once the items are durable, unless commit waiting is disabled.
    /// Within a host, items are dequeued in the order they were appended.
    /// With the handover enabled, the first item of a batch that lands in an
    /// empty queue is also handed to a waiting dequeuer after it is durable.
    pub async fn enqueue(&self, items: Vec<Item>) -> QueueResult<()> {
        self.shared.check_open()?;
        if items.is_empty() {
            return Ok(());
        }

        let was_empty = self.shared.handover.is_some() && self.shared.index_read().is_empty();

        let seq = self.shared.append(&items)?;
        if self.shared.use_commit {
            self.shared.syncer.wait_for(seq).await?;
        }

        if let (true, Some(handover)) = (was_empty, &self.shared.handover) {
            if let Some(host) = items[0].host() {
                let handoff = Handoff {
                    host,
                    item: items[0].clone(),
                };
                if handover.offer(handoff) {
                    debug!("Handed item over to a waiting dequeuer");
                }
            }
        }
        self.shared.available.notify_waiters();
        Ok(())
    }

    /// Removes and returns the next item in round-robin host order
    ///
    /// # Returns
    ///
    /// * `Ok(Item)` - The head item of the next host
    /// * `Err(QueueError::Empty)` - No host has items
    /// * `Err(QueueError::DequeueFrozen)` - Dequeue has been frozen for shutdown
    /// * `Err(QueueError::Closed)` - The queue is closed
    pub fn dequeue(&self) -> QueueResult<Item> {
        self.shared.check_open()?;
        if self.shared.frozen.load(Ordering::Acquire) {
            return Err(QueueError::DequeueFrozen);
        }

        if let Some(handoff) = self.shared.handover.as_ref().and_then(Handover::take) {
            if let Some(item) = self.shared.claim(handoff)? {
                return Ok(item);
            }
        }

        self.shared.pop()
    }

    /// Dequeues, waiting for an item to become available
    ///
    /// Returns `Ok(None)` when `cancel` fires first.
    pub async fn dequeue_wait(&self, cancel: &CancellationToken) -> QueueResult<Option<Item>> {
        let _waiter = self.shared.handover.as_ref().map(Handover::waiter);

        loop {
            let notified = self.shared.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.dequeue() {
                Ok(item) => return Ok(Some(item)),
                Err(QueueError::Empty) => {}
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = &mut notified => {}
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
        }
    }

    /// Stops issuing items while still accepting enqueues
    pub fn freeze_dequeue(&self) {
        self.shared.frozen.store(true, Ordering::Release);
        self.shared.available.notify_waiters();
    }

    pub fn is_dequeue_frozen(&self) -> bool {
        self.shared.frozen.load(Ordering::Acquire)
    }

    /// Closes the queue
    ///
    /// A handoff left in the slot is dropped (its item is still indexed),
    /// the files are fsynced, a final snapshot is written and statistics are
    /// persisted. Closing twice is a no-op.
    pub fn close(&self) -> QueueResult<()> {
        if self.shared.closing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(handover) = &self.shared.handover {
            handover.take();
        }

        self.shared.closed.store(true, Ordering::Release);
        self.shared.available.notify_waiters();

        let dumper = self.dumper.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(mut dumper) = dumper {
            dumper.stop();
        }
        self.shared.syncer.shutdown();

        let dumped = self.shared.dump();

        let stats = self.stats();
        if let Err(e) = stats.save(&self.shared.dir.join(stats::STATS_FILE)) {
            warn!(error = %e, "Failed to persist queue stats");
        }

        info!(
            elements = stats.total_elements,
            hosts = stats.unique_hosts,
            "Closed queue"
        );
        dumped
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Number of queued items
    ///
    /// A handed-over item stays indexed until it is claimed, so it is
    /// counted here exactly once.
    pub fn len(&self) -> usize {
        self.shared.index_read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of hosts with queued items
    pub fn host_count(&self) -> usize {
        self.shared.index_read().host_count()
    }

    pub fn stats(&self) -> QueueStats {
        self.shared
            .stats
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn meta(&self) -> QueueMeta {
        self.shared
            .meta
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Writes a snapshot now and truncates the WAL
    pub fn dump(&self) -> QueueResult<()> {
        self.shared.dump()
    }
}

impl Shared {
    fn lock_io(&self) -> MutexGuard<'_, QueueFiles> {
        self.io.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn index_read(&self) -> RwLockReadGuard<'_, Index> {
        self.index.read().unwrap_or_else(|p| p.into_inner())
    }

    fn index_write(&self) -> RwLockWriteGuard<'_, Index> {
        self.index.write().unwrap_or_else(|p| p.into_inner())
    }

    fn check_open(&self) -> QueueResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(QueueError::Closed)
        } else {
            Ok(())
        }
    }

    /// Marks the queue closed after a write failure
    fn fail(&self, e: std::io::Error) -> QueueError {
        error!(error = %e, "Queue write failed, closing queue");
        self.closed.store(true, Ordering::Release);
        QueueError::Durability(e)
    }

    /// Appends items to the data file and the WAL, then to the index
    ///
    /// Returns the commit sequence number covering these writes.
    fn append(&self, items: &[Item]) -> QueueResult<u64> {
        let mut io = self.lock_io();
        self.check_open()?;

        let mut data_buf = Vec::new();
        let mut wal_buf = Vec::new();
        let mut added = Vec::with_capacity(items.len());
        let mut position = io.data_len;

        for item in items {
            let host = item
                .host()
                .ok_or_else(|| QueueError::Codec(format!("item URL has no host: {}", item.url)))?;
            let payload = encode_item(item)?;
            let size = encode_frame(&payload, &mut data_buf)?;
            let entry = IndexEntry {
                id: item.id.clone(),
                position,
                size,
            };
            WalRecord::add(io.epoch, &host, &entry).encode_into(&mut wal_buf)?;
            position += size;
            added.push((host, entry));
        }

        io.data.write_all(&data_buf).map_err(|e| self.fail(e))?;
        io.data_len = position;
        io.wal.append(&wal_buf).map_err(|e| self.fail(e))?;

        {
            let mut index = self.index_write();
            for (host, entry) in &added {
                index.push(host, entry.clone());
            }
        }
        let seq = self.syncer.mark_written();
        drop(io);

        let mut stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());
        for (host, _) in &added {
            stats.record_enqueue(host);
        }

        Ok(seq)
    }

    /// Pops the index entry of a handed-over item
    ///
    /// The entry must still be the head of its host, so per-host order is
    /// kept. Returns `None` when a regular dequeue already took it.
    fn claim(&self, handoff: Handoff) -> QueueResult<Option<Item>> {
        let mut io = self.lock_io();
        self.check_open()?;

        let id = handoff.item.id.as_str();
        if !self.index_read().is_head(&handoff.host, id) {
            return Ok(None);
        }

        let mut wal_buf = Vec::new();
        WalRecord::pop(io.epoch, &handoff.host, id).encode_into(&mut wal_buf)?;
        io.wal.append(&wal_buf).map_err(|e| self.fail(e))?;
        self.index_write().pop(&handoff.host, id);
        self.syncer.mark_written();
        drop(io);

        self.stats
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .record_dequeue(&handoff.host);

        Ok(Some(handoff.item))
    }

    /// Pops the next entry and loads its item from the data file
    ///
    /// An entry whose bytes cannot be read or decoded is still removed so
    /// that it cannot block its host; the error is returned to the caller.
    fn pop(&self) -> QueueResult<Item> {
        let mut io = self.lock_io();
        self.check_open()?;

        let (host, entry) = match self.index_read().peek_next() {
            Some((host, entry)) => (host.to_string(), entry.clone()),
            None => return Err(QueueError::Empty),
        };

        let loaded = read_record(&mut io.data, &entry);

        let mut wal_buf = Vec::new();
        WalRecord::pop(io.epoch, &host, &entry.id).encode_into(&mut wal_buf)?;
        io.wal.append(&wal_buf).map_err(|e| self.fail(e))?;
        self.index_write().pop(&host, &entry.id);
        self.syncer.mark_written();
        drop(io);

        self.stats
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .record_dequeue(&host);

        if let Err(e) = &loaded {
            warn!(host = %host, id = %entry.id, error = %e, "Dropped unreadable queue entry");
        }
        loaded
    }

    /// Snapshots the index, rotates older snapshots and truncates the WAL
    ///
    /// When the queue is empty the data file is truncated as well.
    fn dump(&self) -> QueueResult<()> {
        let mut io = self.lock_io();
        io.data.sync_data().map_err(|e| self.fail(e))?;

        let next_epoch = io.epoch + 1;
        let (snapshot, empty, cursor) = {
            let index = self.index_read();
            (
                index.to_snapshot(next_epoch),
                index.is_empty(),
                index.front_host().map(str::to_string),
            )
        };

        snapshot::write(&self.dir, &snapshot).map_err(|e| match e {
            QueueError::Io(e) => self.fail(e),
            other => other,
        })?;
        io.epoch = next_epoch;
        io.wal.truncate().map_err(|e| self.fail(e))?;

        if empty && io.data_len > 0 {
            io.data.set_len(0).map_err(|e| self.fail(e))?;
            io.data_len = 0;
        }
        drop(io);

        let mut meta = self.meta.lock().unwrap_or_else(|p| p.into_inner());
        meta.host_cursor = cursor;
        if let Err(e) = meta.save(&self.dir.join(meta::META_FILE)) {
            warn!(error = %e, "Failed to write queue metadata");
        }

        debug!(epoch = next_epoch, elements = snapshot.hosts.len(), "Wrote queue snapshot");
        Ok(())
    }
}

fn read_record(data: &mut File, entry: &IndexEntry) -> QueueResult<Item> {
    let mut buf = vec![0u8; entry.size as usize];
    data.seek(SeekFrom::Start(entry.position))?;
    data.read_exact(&mut buf)?;
    let payload = decode_frame(&buf)?;
    Ok(decode_item(payload)?)
}

/// Read-only view of a job's queue, for reporting
#[derive(Debug, Clone)]
pub struct QueueInspection {
    pub elements: usize,
    pub hosts: usize,
    pub meta: Option<QueueMeta>,
    pub stats: Option<QueueStats>,
}

/// Inspects a job's queue files without opening or modifying them
pub fn inspect(dir: &Path) -> QueueResult<QueueInspection> {
    let snapshot = snapshot::load(dir);
    let epoch = snapshot.epoch;
    let mut index = Index::from_snapshot(snapshot);
    wal::replay(&dir.join(WAL_FILE), &mut index, epoch)?;

    Ok(QueueInspection {
        elements: index.len(),
        hosts: index.host_count(),
        meta: QueueMeta::load(&dir.join(meta::META_FILE)),
        stats: QueueStats::load(&dir.join(stats::STATS_FILE))?,
    })
}
