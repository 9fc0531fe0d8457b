use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Aggregate crawl counters, shared by every worker
#[derive(Debug, Default)]
pub struct CrawlCounters {
    crawled: AtomicU64,
    skipped: AtomicU64,
    archived: AtomicU64,
    discarded: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    redirects: AtomicU64,
    outlinks: AtomicU64,
    assets: AtomicU64,
    bytes: AtomicU64,
}

/// Point-in-time copy of [`CrawlCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub crawled: u64,
    /// Dequeued items acknowledged without a fetch (out of scope)
    pub skipped: u64,
    pub archived: u64,
    pub discarded: u64,
    pub failed: u64,
    pub retried: u64,
    pub redirects: u64,
    pub outlinks: u64,
    pub assets: u64,
    pub bytes: u64,
}

macro_rules! counter {
    ($incr:ident, $add:ident, $field:ident) => {
        pub fn $incr(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }

        pub fn $add(&self, n: u64) {
            self.$field.fetch_add(n, Ordering::Relaxed);
        }
    };
}

impl CrawlCounters {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(incr_crawled, add_crawled, crawled);
    counter!(incr_skipped, add_skipped, skipped);
    counter!(incr_archived, add_archived, archived);
    counter!(incr_discarded, add_discarded, discarded);
    counter!(incr_failed, add_failed, failed);
    counter!(incr_retried, add_retried, retried);
    counter!(incr_redirects, add_redirects, redirects);
    counter!(incr_outlinks, add_outlinks, outlinks);
    counter!(incr_assets, add_assets, assets);
    counter!(incr_bytes, add_bytes, bytes);

    pub fn crawled(&self) -> u64 {
        self.crawled.load(Ordering::Relaxed)
    }

    /// Items taken off the queue and acknowledged, fetched or not
    pub fn processed(&self) -> u64 {
        self.crawled() + self.skipped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            crawled: self.crawled.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            archived: self.archived.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            redirects: self.redirects.load(Ordering::Relaxed),
            outlinks: self.outlinks.load(Ordering::Relaxed),
            assets: self.assets.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let counters = CrawlCounters::new();
        counters.incr_crawled();
        counters.incr_crawled();
        counters.add_bytes(512);
        counters.add_outlinks(3);

        let snap = counters.snapshot();
        assert_eq!(snap.crawled, 2);
        assert_eq!(snap.bytes, 512);
        assert_eq!(snap.outlinks, 3);
        assert_eq!(snap.failed, 0);
        assert_eq!(counters.crawled(), 2);
    }

    #[test]
    fn test_processed_counts_skips() {
        let counters = CrawlCounters::new();
        counters.incr_skipped();
        assert_eq!(counters.crawled(), 0);
        assert_eq!(counters.processed(), 1);

        counters.incr_crawled();
        assert_eq!(counters.processed(), 2);
        assert_eq!(counters.snapshot().skipped, 1);
    }
}
