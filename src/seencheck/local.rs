//! SQLite-backed seencheck

use super::{Seencheck, SeencheckResult};
use crate::item::{Item, ItemKind};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS seen (
    fingerprint INTEGER PRIMARY KEY,
    kind TEXT NOT NULL
);
"#;

/// Persistent seencheck stored in `<job_dir>/seencheck/seencheck.db`
///
/// The connection sits behind a mutex; `INSERT OR IGNORE` under that mutex
/// is the test-and-set.
pub struct SqliteSeencheck {
    conn: Mutex<Connection>,
    count: AtomicU64,
}

impl SqliteSeencheck {
    /// Opens (or creates) the seencheck store of a job
    ///
    /// # Arguments
    ///
    /// * `job_dir` - The job directory; the store lives in its `seencheck/` subdirectory
    pub fn open(job_dir: &Path) -> SeencheckResult<Self> {
        let dir = job_dir.join("seencheck");
        std::fs::create_dir_all(&dir)?;
        let conn = Connection::open(dir.join("seencheck.db"))?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        Self::with_connection(conn)
    }

    /// Creates an in-memory store (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> SeencheckResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> SeencheckResult<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM seen", [], |row| row.get(0))?;
        debug!(seen = count, "Opened seencheck store");

        Ok(Self {
            conn: Mutex::new(conn),
            count: AtomicU64::new(count as u64),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Fingerprints are stored as their two's-complement `i64` bit pattern
fn to_key(fingerprint: u64) -> i64 {
    fingerprint as i64
}

#[async_trait]
impl Seencheck for SqliteSeencheck {
    async fn check_and_mark(
        &self,
        fingerprint: u64,
        _url: &str,
        kind: ItemKind,
    ) -> SeencheckResult<bool> {
        let conn = self.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO seen (fingerprint, kind) VALUES (?1, ?2)",
            params![to_key(fingerprint), kind.to_db_string()],
        )?;

        if inserted == 0 {
            return Ok(true);
        }
        self.count.fetch_add(1, Ordering::Relaxed);
        Ok(false)
    }

    async fn filter_new(&self, items: Vec<Item>) -> SeencheckResult<Vec<Item>> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut fresh = Vec::with_capacity(items.len());
        let mut marked = 0u64;

        {
            let mut stmt =
                tx.prepare_cached("INSERT OR IGNORE INTO seen (fingerprint, kind) VALUES (?1, ?2)")?;
            for item in items {
                if item.bypass_seencheck {
                    fresh.push(item);
                    continue;
                }
                if stmt.execute(params![to_key(item.fingerprint), item.kind.to_db_string()])? > 0 {
                    marked += 1;
                    fresh.push(item);
                }
            }
        }

        tx.commit()?;
        self.count.fetch_add(marked, Ordering::Relaxed);
        Ok(fresh)
    }

    fn seen_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
