//! Background fsync of the data file and the WAL
//!
//! Writers bump a commit sequence number after appending; the syncer thread
//! fsyncs the data file then the WAL and publishes the highest sequence
//! number known durable on a watch channel. Enqueuers that need durability
//! await their sequence number there.

use super::{QueueError, QueueResult};
use std::fs::File;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStatus {
    pub synced: u64,
    pub failed: bool,
}

#[derive(Default)]
struct Flags {
    pending: bool,
    shutdown: bool,
}

struct SyncShared {
    flags: Mutex<Flags>,
    cv: Condvar,
    written: AtomicU64,
}

pub struct Syncer {
    shared: Arc<SyncShared>,
    status: watch::Receiver<CommitStatus>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Syncer {
    /// Starts the syncer thread
    ///
    /// # Arguments
    ///
    /// * `data` - Handle on the queue data file
    /// * `wal` - Handle on the WAL file
    /// * `max_wait` - Longest time written bytes stay unsynced when nobody asks
    /// * `closed` - Set when an fsync fails; the queue is unusable from then on
    pub fn spawn(
        data: File,
        wal: File,
        max_wait: Duration,
        closed: Arc<AtomicBool>,
    ) -> QueueResult<Self> {
        let shared = Arc::new(SyncShared {
            flags: Mutex::new(Flags::default()),
            cv: Condvar::new(),
            written: AtomicU64::new(0),
        });
        let (tx, rx) = watch::channel(CommitStatus::default());

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("queue-syncer".to_string())
            .spawn(move || sync_loop(thread_shared, data, wal, max_wait, tx, closed))?;

        Ok(Self {
            shared,
            status: rx,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Assigns the next commit sequence number to writes that just completed
    ///
    /// Must be called while the writer still holds the queue's I/O lock so
    /// that sequence order matches file order.
    pub fn mark_written(&self) -> u64 {
        self.shared.written.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Asks the syncer to fsync as soon as possible
    pub fn request(&self) {
        let mut flags = self.shared.flags.lock().unwrap_or_else(|p| p.into_inner());
        flags.pending = true;
        self.shared.cv.notify_one();
    }

    /// Waits until `seq` is durable
    pub async fn wait_for(&self, seq: u64) -> QueueResult<()> {
        self.request();
        let mut rx = self.status.clone();
        let waited = rx
            .wait_for(|s| s.synced >= seq || s.failed)
            .await
            .map(|status| *status);
        let status = match waited {
            Ok(status) => status,
            Err(_) => *rx.borrow(),
        };

        if status.failed {
            return Err(QueueError::Durability(std::io::Error::new(
                std::io::ErrorKind::Other,
                "WAL fsync failed",
            )));
        }
        if status.synced < seq {
            return Err(QueueError::Closed);
        }
        Ok(())
    }

    /// Performs a final fsync and stops the thread
    pub fn shutdown(&self) {
        {
            let mut flags = self.shared.flags.lock().unwrap_or_else(|p| p.into_inner());
            flags.shutdown = true;
            self.shared.cv.notify_one();
        }
        let handle = self.handle.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Queue syncer thread panicked");
            }
        }
    }
}

impl Drop for Syncer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn sync_loop(
    shared: Arc<SyncShared>,
    data: File,
    wal: File,
    max_wait: Duration,
    tx: watch::Sender<CommitStatus>,
    closed: Arc<AtomicBool>,
) {
    let mut synced = 0u64;

    loop {
        let shutdown = {
            let mut flags = shared.flags.lock().unwrap_or_else(|p| p.into_inner());
            if !flags.pending && !flags.shutdown {
                flags = shared
                    .cv
                    .wait_timeout(flags, max_wait)
                    .map(|(guard, _)| guard)
                    .unwrap_or_else(|p| p.into_inner().0);
            }
            flags.pending = false;
            flags.shutdown
        };

        let target = shared.written.load(Ordering::Acquire);
        if target > synced {
            match data.sync_data().and_then(|_| wal.sync_data()) {
                Ok(()) => {
                    synced = target;
                    tx.send_replace(CommitStatus {
                        synced,
                        failed: false,
                    });
                }
                Err(e) => {
                    error!(error = %e, "Queue fsync failed, closing queue");
                    closed.store(true, Ordering::Release);
                    tx.send_replace(CommitStatus {
                        synced,
                        failed: true,
                    });
                    return;
                }
            }
        }

        if shutdown {
            debug!(synced, "Queue syncer stopped");
            return;
        }
    }
}
