//! Seeding and scheduling of new items
//!
//! Seeds come from the command line, from a seed file, or from the
//! orchestrator. Seeds and discovered items alike go through the scope
//! filter and the seencheck before they reach the queue.

use crate::item::Item;
use crate::orchestrator::Orchestrator;
use crate::queue::PersistentGroupedQueue;
use crate::seencheck::Seencheck;
use crate::url::UrlFilter;
use crate::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Interval between two orchestrator pulls when the queue is full enough
const FEED_INTERVAL: Duration = Duration::from_secs(1);

/// Counts of what happened to a batch of seeds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub read: usize,
    pub invalid: usize,
    pub out_of_scope: usize,
    pub duplicates: usize,
    pub enqueued: usize,
}

/// Filters, deduplicates and enqueues items
#[derive(Clone)]
pub struct Seeder {
    queue: Arc<PersistentGroupedQueue>,
    seencheck: Option<Arc<dyn Seencheck>>,
    filter: UrlFilter,
}

impl Seeder {
    pub fn new(
        queue: Arc<PersistentGroupedQueue>,
        seencheck: Option<Arc<dyn Seencheck>>,
        filter: UrlFilter,
    ) -> Self {
        Self {
            queue,
            seencheck,
            filter,
        }
    }

    /// Marks items in the seencheck and enqueues the new ones
    ///
    /// The seencheck is a test-and-set, so two workers discovering the same
    /// URL concurrently cannot both enqueue it.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of items enqueued
    /// * `Err(SumiError)` - The seencheck or the queue failed
    pub async fn enqueue_new(&self, items: Vec<Item>) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        let fresh = self.filter_new(items).await?;
        let count = fresh.len();
        self.queue.enqueue(fresh).await?;
        Ok(count)
    }

    /// Marks items in the seencheck and returns the new ones
    pub async fn filter_new(&self, items: Vec<Item>) -> Result<Vec<Item>> {
        match &self.seencheck {
            Some(seencheck) if !items.is_empty() => Ok(seencheck.filter_new(items).await?),
            _ => Ok(items),
        }
    }

    pub fn filter(&self) -> &UrlFilter {
        &self.filter
    }

    /// Seeds raw URLs
    pub async fn seed_urls<S: AsRef<str>>(&self, urls: &[S]) -> Result<SeedReport> {
        let mut report = SeedReport::default();
        let mut items = Vec::with_capacity(urls.len());

        for raw in urls {
            let raw = raw.as_ref().trim();
            report.read += 1;
            let item = match Item::seed(raw) {
                Ok(item) => item,
                Err(e) => {
                    warn!(url = %raw, error = %e, "Skipping invalid seed");
                    report.invalid += 1;
                    continue;
                }
            };
            let verdict = match item.parsed_url() {
                Ok(url) => self.filter.check(&url),
                Err(_) => {
                    report.invalid += 1;
                    continue;
                }
            };
            if !verdict.is_allowed() {
                debug!(url = %item.url, reason = verdict.as_str(), "Seed out of scope");
                report.out_of_scope += 1;
                continue;
            }
            items.push(item);
        }

        let candidates = items.len();
        report.enqueued = self.enqueue_new(items).await?;
        report.duplicates = candidates - report.enqueued;

        info!(
            read = report.read,
            enqueued = report.enqueued,
            invalid = report.invalid,
            out_of_scope = report.out_of_scope,
            duplicates = report.duplicates,
            "Seeded queue"
        );
        Ok(report)
    }

    /// Seeds every URL of a file, one per line
    ///
    /// Blank lines and lines starting with `#` are ignored.
    pub async fn seed_file(&self, path: &Path) -> Result<SeedReport> {
        let content = tokio::fs::read_to_string(path).await?;
        let urls: Vec<&str> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect();
        info!(path = %path.display(), count = urls.len(), "Loaded seed file");
        self.seed_urls(&urls).await
    }

    /// Keeps the queue fed from the orchestrator until cancelled
    ///
    /// A batch is pulled whenever fewer than `low_water` items are queued.
    /// Pulled items were already deduplicated by the orchestrator.
    pub fn spawn_orchestrator_feed(
        &self,
        orchestrator: Arc<dyn Orchestrator>,
        low_water: usize,
        batch_size: usize,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        tokio::spawn(async move {
            loop {
                if queue.len() < low_water {
                    match orchestrator.pull(batch_size).await {
                        Ok(items) if !items.is_empty() => {
                            let count = items.len();
                            if let Err(e) = queue.enqueue(items).await {
                                warn!(error = %e, "Failed to enqueue orchestrator batch");
                                if e.is_fatal() {
                                    break;
                                }
                            } else {
                                debug!(count, "Pulled orchestrator batch");
                            }
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Orchestrator pull failed"),
                    }
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(FEED_INTERVAL) => {}
                }
            }
            debug!("Orchestrator feed stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScopeConfig;
    use crate::queue::QueueOptions;
    use crate::seencheck::SqliteSeencheck;
    use tempfile::TempDir;

    fn create_test_seeder(dir: &Path, scope: &ScopeConfig) -> (Seeder, Arc<PersistentGroupedQueue>) {
        let queue = Arc::new(
            PersistentGroupedQueue::open(dir, QueueOptions::default()).unwrap(),
        );
        let seencheck: Arc<dyn Seencheck> = Arc::new(SqliteSeencheck::open_in_memory().unwrap());
        let seeder = Seeder::new(
            Arc::clone(&queue),
            Some(seencheck),
            UrlFilter::from_scope(scope),
        );
        (seeder, queue)
    }

    #[tokio::test]
    async fn test_seed_urls_report() {
        let dir = TempDir::new().unwrap();
        let scope = ScopeConfig {
            excluded_hosts: vec!["blocked.example".to_string()],
            ..Default::default()
        };
        let (seeder, queue) = create_test_seeder(dir.path(), &scope);

        let report = seeder
            .seed_urls(&[
                "http://a.example/",
                "http://a.example/#frag",
                "not a url",
                "http://blocked.example/",
                "http://b.example/page",
            ])
            .await
            .unwrap();

        assert_eq!(
            report,
            SeedReport {
                read: 5,
                invalid: 1,
                out_of_scope: 1,
                duplicates: 1,
                enqueued: 2,
            }
        );
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_seed_file_skips_comments() {
        let dir = TempDir::new().unwrap();
        let (seeder, queue) = create_test_seeder(dir.path(), &ScopeConfig::default());
        let path = dir.path().join("seeds.txt");
        std::fs::write(&path, "# seeds\nhttp://a.example/\n\n  http://b.example/  \n").unwrap();

        let report = seeder.seed_file(&path).await.unwrap();
        assert_eq!(report.read, 2);
        assert_eq!(report.enqueued, 2);
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_enqueue_new_deduplicates_across_calls() {
        let dir = TempDir::new().unwrap();
        let (seeder, queue) = create_test_seeder(dir.path(), &ScopeConfig::default());

        let first = Item::seed("http://a.example/x").unwrap();
        let again = Item::seed("http://a.example/x").unwrap();
        assert_eq!(seeder.enqueue_new(vec![first]).await.unwrap(), 1);
        assert_eq!(seeder.enqueue_new(vec![again]).await.unwrap(), 0);
        assert_eq!(queue.len(), 1);
    }
}
