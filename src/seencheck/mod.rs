//! Seencheck: the deduplication gate
//!
//! Every URL is scheduled at most once per job. The gate is a persisted
//! test-and-set over URL fingerprints: of any number of concurrent callers
//! marking the same fingerprint, exactly one observes "not seen".
//!
//! Two implementations exist: [`SqliteSeencheck`], a local store under the
//! job directory, and [`RemoteSeencheck`], which asks the orchestrator and
//! degrades to "not seen" when the orchestrator cannot be reached.

mod local;
mod remote;

pub use local::SqliteSeencheck;
pub use remote::RemoteSeencheck;

use crate::item::{Item, ItemKind};
use async_trait::async_trait;
use thiserror::Error;

/// Seencheck errors
#[derive(Debug, Error)]
pub enum SeencheckError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for seencheck operations
pub type SeencheckResult<T> = std::result::Result<T, SeencheckError>;

/// Deduplication gate shared by all workers
#[async_trait]
pub trait Seencheck: Send + Sync {
    /// Atomically tests and marks a fingerprint
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The fingerprint was already marked
    /// * `Ok(false)` - The fingerprint is new and is now marked
    async fn check_and_mark(
        &self,
        fingerprint: u64,
        url: &str,
        kind: ItemKind,
    ) -> SeencheckResult<bool>;

    /// Marks a batch of items and returns those that were not seen before
    ///
    /// Items flagged `bypass_seencheck` are always returned. Input order is
    /// preserved, and a fingerprint repeated within the batch is returned once.
    async fn filter_new(&self, items: Vec<Item>) -> SeencheckResult<Vec<Item>>;

    /// Number of fingerprints known to be seen
    fn seen_count(&self) -> u64;
}
