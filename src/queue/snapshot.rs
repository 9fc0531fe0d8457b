//! Index snapshots and their rotation
//!
//! The live snapshot is `index`; the two previous generations are kept as
//! `index.1` and `index.2`. A new snapshot is written to `index.tmp`,
//! fsynced, then rotated into place.

use super::index::IndexSnapshot;
use super::QueueResult;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const INDEX_FILE: &str = "index";
const TMP_FILE: &str = "index.tmp";

fn generation(dir: &Path, n: usize) -> PathBuf {
    dir.join(format!("{}.{}", INDEX_FILE, n))
}

fn read_snapshot(path: &Path) -> Option<IndexSnapshot> {
    let bytes = fs::read(path).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable index snapshot");
            None
        }
    }
}

/// Loads the most recent complete snapshot
///
/// Tries `index`, then a complete `index.tmp` (a crash during rotation can
/// leave the new snapshot only there), then `index.1`. Returns an empty
/// snapshot for a fresh job.
pub fn load(dir: &Path) -> IndexSnapshot {
    let candidates = [dir.join(INDEX_FILE), dir.join(TMP_FILE), generation(dir, 1)];
    for path in &candidates {
        if let Some(snapshot) = read_snapshot(path) {
            debug!(path = %path.display(), epoch = snapshot.epoch, "Loaded index snapshot");
            return snapshot;
        }
    }
    IndexSnapshot::default()
}

/// Writes a snapshot and rotates the previous generations
///
/// `index.2` is unlinked, `index.1` becomes `index.2`, `index` becomes
/// `index.1` and the new snapshot becomes `index`.
pub fn write(dir: &Path, snapshot: &IndexSnapshot) -> QueueResult<()> {
    let tmp = dir.join(TMP_FILE);
    let bytes = serde_json::to_vec(snapshot)
        .map_err(|e| super::QueueError::Codec(e.to_string()))?;

    {
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }

    let live = dir.join(INDEX_FILE);
    let first = generation(dir, 1);
    let second = generation(dir, 2);

    remove_if_exists(&second)?;
    if first.exists() {
        fs::rename(&first, &second)?;
    }
    if live.exists() {
        fs::rename(&live, &first)?;
    }
    fs::rename(&tmp, &live)?;
    sync_dir(dir)?;

    Ok(())
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
