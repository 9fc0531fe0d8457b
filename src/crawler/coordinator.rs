//! Crawler coordinator - crawl lifecycle
//!
//! This module wires the crawl together and drives it to completion:
//! - Opening the queue, seencheck, record writer and HTTP clients
//! - Spawning workers and the background tasks (watchdog, resource
//!   monitor, finish detector, progress reporter, rate-limit cleanup)
//! - Graceful shutdown on finish, on Ctrl-C, or on a fatal error

use super::client::HttpClients;
use super::fetcher::{Fetcher, FetcherSettings};
use super::pause::{PauseGate, PauseReason};
use super::seeder::Seeder;
use super::worker::{run_worker, spawn_watchdog, WorkerContext, WorkerReport, WorkerState, WorkerStatus};
use crate::archive::{FileRecordWriter, RecordWriter};
use crate::config::Config;
use crate::extractor::Extractor;
use crate::orchestrator::Orchestrator;
use crate::output::{print_statistics, spawn_reporter, CounterSnapshot, CrawlCounters};
use crate::queue::{PersistentGroupedQueue, QueueOptions};
use crate::ratelimit::RateLimiter;
use crate::seencheck::{RemoteSeencheck, Seencheck, SqliteSeencheck};
use crate::sitespecific::HookRegistry;
use crate::url::UrlFilter;
use crate::{Result, SumiError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Interval between two finish checks
const FINISH_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Interval between two disk-space and writer-backlog checks
const MONITOR_INTERVAL: Duration = Duration::from_secs(5);

/// Time given to cancelled workers before they are detached
const CANCEL_GRACE: Duration = Duration::from_secs(5);

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Where the crawl gets its URLs from
#[derive(Debug, Clone)]
pub enum Seeds {
    Urls(Vec<String>),
    File(PathBuf),
    /// Pull URLs from the configured orchestrator
    Orchestrator,
}

/// Optional collaborators of a crawl
#[derive(Default)]
pub struct CrawlOptions {
    /// SHA-256 of the configuration file, recorded in the queue metadata
    pub config_hash: Option<String>,
    /// Remote orchestrator; replaces the local seencheck when set
    pub orchestrator: Option<Arc<dyn Orchestrator>>,
    /// Record writer; defaults to a [`FileRecordWriter`] in the job directory
    pub writer: Option<Arc<dyn RecordWriter>>,
}

/// What a finished crawl reports
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub counters: CounterSnapshot,
    pub elapsed: Duration,
    /// Workers still running when the stop timeout expired
    pub detached_workers: usize,
    pub hung_workers: usize,
}

/// Handle to stop a running crawl
#[derive(Debug, Clone)]
pub struct StopHandle {
    stopping: CancellationToken,
    cancel: CancellationToken,
}

impl StopHandle {
    /// Lets workers finish their current item, then stops
    pub fn stop(&self) {
        self.stopping.cancel();
    }

    /// Aborts in-flight fetches as well
    pub fn abort(&self) {
        self.stopping.cancel();
        self.cancel.cancel();
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.is_cancelled()
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    ctx: Arc<WorkerContext>,
    writer: Arc<dyn RecordWriter>,
    limiter: Arc<RateLimiter>,
    workers: Vec<Arc<WorkerStatus>>,
    stopping: CancellationToken,
    cancel: CancellationToken,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// Opens (or recovers) the job's queue and seencheck. Nothing is fetched
    /// until [`Coordinator::run`] is called.
    ///
    /// # Arguments
    ///
    /// * `config` - The crawl configuration
    /// * `options` - Configuration hash and optional collaborators
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(SumiError)` - Failed to initialize
    pub fn new(config: Config, options: CrawlOptions) -> Result<Self> {
        let job_dir = config.job_dir();
        std::fs::create_dir_all(&job_dir)?;
        info!(job = %config.job.job_name, dir = %job_dir.display(), "Opening job");

        let queue = Arc::new(PersistentGroupedQueue::open(
            &job_dir,
            QueueOptions::from_job(&config.job, options.config_hash.clone()),
        )?);
        if !queue.is_empty() {
            info!(queued = queue.len(), hosts = queue.host_count(), "Resuming queued items");
        }

        let seencheck: Option<Arc<dyn Seencheck>> = match (&options.orchestrator, config.job.use_seencheck) {
            (Some(orchestrator), _) => Some(Arc::new(RemoteSeencheck::new(Arc::clone(orchestrator)))),
            (None, true) => Some(Arc::new(SqliteSeencheck::open(&job_dir)?)),
            (None, false) => None,
        };

        let writer: Arc<dyn RecordWriter> = match options.writer {
            Some(writer) => writer,
            None => Arc::new(FileRecordWriter::new(&job_dir)?),
        };

        let hooks = Arc::new(HookRegistry::default());
        let counters = Arc::new(CrawlCounters::new());
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        let mut fetcher = Fetcher::new(
            FetcherSettings::from_config(&config),
            HttpClients::from_config(&config)?,
            Arc::clone(&limiter),
            Arc::clone(&writer),
            Arc::clone(&hooks),
        )
        .with_counters(Arc::clone(&counters));
        if let Some(seencheck) = &seencheck {
            fetcher = fetcher.with_seencheck(Arc::clone(seencheck));
        }

        let seeder = Seeder::new(
            Arc::clone(&queue),
            seencheck,
            UrlFilter::from_scope(&config.scope),
        );

        let ctx = Arc::new(WorkerContext {
            queue,
            seeder,
            fetcher: Arc::new(fetcher),
            extractor: Arc::new(Extractor::from_config(&config, hooks)),
            counters,
            pause: Arc::new(PauseGate::new()),
            send_back_on_429: config
                .orchestrator
                .as_ref()
                .map_or(false, |o| o.send_back_on_429),
            orchestrator: options.orchestrator,
            active: Arc::new(AtomicUsize::new(0)),
            max_concurrent_assets: config.crawler.max_concurrent_assets,
        });

        let workers = (0..config.job.workers.max(1))
            .map(|id| Arc::new(WorkerStatus::new(id)))
            .collect();

        Ok(Self {
            config: Arc::new(config),
            ctx,
            writer,
            limiter,
            workers,
            stopping: CancellationToken::new(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn seeder(&self) -> &Seeder {
        &self.ctx.seeder
    }

    pub fn queue(&self) -> &Arc<PersistentGroupedQueue> {
        &self.ctx.queue
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn counters(&self) -> &Arc<CrawlCounters> {
        &self.ctx.counters
    }

    pub fn pause_gate(&self) -> &Arc<PauseGate> {
        &self.ctx.pause
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stopping: self.stopping.clone(),
            cancel: self.cancel.clone(),
        }
    }

    pub fn worker_reports(&self) -> Vec<WorkerReport> {
        self.workers.iter().map(|w| w.report()).collect()
    }

    /// Loads the given seeds into the queue
    pub async fn seed(&self, seeds: &Seeds) -> Result<()> {
        match seeds {
            Seeds::Urls(urls) => {
                self.ctx.seeder.seed_urls(urls).await?;
            }
            Seeds::File(path) => {
                self.ctx.seeder.seed_file(path).await?;
            }
            Seeds::Orchestrator => {}
        }
        Ok(())
    }

    /// Runs the crawl until it finishes or is stopped
    ///
    /// Without an orchestrator, the crawl finishes once no worker is busy,
    /// the queue is empty, and at least one item was crawled or skipped.
    pub async fn run(self) -> Result<CrawlSummary> {
        let started = Instant::now();
        let background = CancellationToken::new();
        let limiter_cancel = CancellationToken::new();
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        info!(
            workers = self.workers.len(),
            queued = self.ctx.queue.len(),
            orchestrator = self.ctx.orchestrator.is_some(),
            "Starting crawl"
        );

        tasks.push(self.limiter.spawn_cleanup(limiter_cancel.clone()));
        tasks.push(spawn_reporter(
            Arc::clone(&self.ctx.counters),
            Arc::clone(&self.ctx.queue),
            Arc::clone(&self.ctx.active),
            background.clone(),
        ));
        tasks.push(spawn_watchdog(
            self.workers.clone(),
            Duration::from_secs(self.config.job.hung_worker_threshold_secs),
            background.clone(),
        ));
        tasks.push(self.spawn_monitor(background.clone()));
        tasks.push(self.spawn_signal_handler(background.clone()));

        match (&self.ctx.orchestrator, &self.config.orchestrator) {
            (Some(orchestrator), Some(settings)) => {
                tasks.push(self.ctx.seeder.spawn_orchestrator_feed(
                    Arc::clone(orchestrator),
                    self.workers.len(),
                    settings.batch_size,
                    background.clone(),
                ));
            }
            (Some(orchestrator), None) => {
                tasks.push(self.ctx.seeder.spawn_orchestrator_feed(
                    Arc::clone(orchestrator),
                    self.workers.len(),
                    self.workers.len().max(1) * 10,
                    background.clone(),
                ));
            }
            (None, _) => {
                if self.ctx.queue.is_empty() {
                    warn!("Nothing to crawl: the queue is empty");
                    self.stopping.cancel();
                }
                tasks.push(self.spawn_finish_detector(background.clone()));
            }
        }

        let mut pool = JoinSet::new();
        for status in &self.workers {
            pool.spawn(run_worker(
                Arc::clone(&self.ctx),
                Arc::clone(status),
                self.stopping.clone(),
                self.cancel.clone(),
            ));
        }

        let mut fatal: Option<SumiError> = None;
        let mut detached = 0;

        // Workers only exit once stopping fires, or on a fatal error
        self.stopping.cancelled().await;
        info!("Stopping crawl");
        self.ctx.queue.freeze_dequeue();

        let stop_timeout = Duration::from_secs(self.config.job.stop_timeout_secs);
        let drained = tokio::time::timeout(stop_timeout, join_workers(&mut pool, &mut fatal)).await;
        if drained.is_err() {
            warn!(remaining = pool.len(), "Workers did not stop in time, cancelling fetches");
            self.cancel.cancel();
            let cancelled =
                tokio::time::timeout(CANCEL_GRACE, join_workers(&mut pool, &mut fatal)).await;
            if cancelled.is_err() {
                detached = pool.len();
                for report in self.worker_reports() {
                    if report.state != WorkerState::Stopped {
                        warn!(
                            worker = report.id,
                            state = report.state.as_str(),
                            url = report.current_url.as_deref().unwrap_or(""),
                            "Detaching worker"
                        );
                    }
                }
                pool.detach_all();
            }
        }

        let hung_workers = self
            .workers
            .iter()
            .filter(|w| w.state() == WorkerState::Hung)
            .count();

        limiter_cancel.cancel();
        background.cancel();
        for task in tasks {
            if let Err(e) = task.await {
                debug!(error = %e, "Background task ended abnormally");
            }
        }

        if let Err(e) = self.ctx.queue.close() {
            error!(error = %e, "Failed to close queue");
            fatal.get_or_insert(e.into());
        }
        if let Err(e) = self.writer.close() {
            warn!(error = %e, "Failed to close record writer");
        }

        let summary = CrawlSummary {
            counters: self.ctx.counters.snapshot(),
            elapsed: started.elapsed(),
            detached_workers: detached,
            hung_workers,
        };
        info!(
            crawled = summary.counters.crawled,
            archived = summary.counters.archived,
            failed = summary.counters.failed,
            elapsed_secs = summary.elapsed.as_secs(),
            detached = summary.detached_workers,
            "Crawl stopped"
        );

        match fatal {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Pauses the crawl on low disk space or a large writer backlog
    fn spawn_monitor(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let job_dir = self.config.job_dir();
        let min_space = (self.config.job.min_space_required_gib * GIB) as u64;
        let backlog_factor = self.config.job.writer_backlog_factor;
        let pause = Arc::clone(&self.ctx.pause);
        let active = Arc::clone(&self.ctx.active);
        let writer = Arc::clone(&self.writer);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(MONITOR_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        check_disk_space(&job_dir, min_space, &pause);

                        let limit = backlog_factor * active.load(Ordering::Acquire).max(1);
                        if backlog_factor > 0 && writer.backlog() > limit {
                            pause.pause(PauseReason::WriterBacklog);
                        } else {
                            pause.resume(PauseReason::WriterBacklog);
                        }
                    }
                }
            }
        })
    }

    /// Stops the crawl once it has run out of work
    ///
    /// The condition must hold on two consecutive checks, so an item just
    /// dequeued but not yet counted as active does not end the crawl.
    fn spawn_finish_detector(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);
        let stopping = self.stopping.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(FINISH_CHECK_INTERVAL);
            let mut idle_checks = 0;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let done = ctx.active.load(Ordering::Acquire) == 0
                            && ctx.queue.is_empty()
                            && ctx.counters.processed() >= 1;
                        idle_checks = if done { idle_checks + 1 } else { 0 };
                        if idle_checks >= 2 {
                            info!(crawled = ctx.counters.crawled(), "Crawl finished");
                            stopping.cancel();
                            break;
                        }
                    }
                }
            }
        })
    }

    /// First Ctrl-C stops gracefully, the second aborts in-flight fetches
    fn spawn_signal_handler(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let handle = self.stop_handle();
        tokio::spawn(async move {
            let mut interrupts = 0;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    signal = tokio::signal::ctrl_c() => {
                        if let Err(e) = signal {
                            warn!(error = %e, "Cannot listen for Ctrl-C");
                            break;
                        }
                        interrupts += 1;
                        if interrupts == 1 {
                            info!("Interrupt received, finishing current items (Ctrl-C again to abort)");
                            handle.stop();
                        } else {
                            warn!("Second interrupt received, aborting fetches");
                            handle.abort();
                            break;
                        }
                    }
                }
            }
        })
    }
}

async fn join_workers(pool: &mut JoinSet<Result<()>>, fatal: &mut Option<SumiError>) {
    while let Some(joined) = pool.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                fatal.get_or_insert(e);
            }
            Err(e) if e.is_panic() => {
                error!(error = %e, "Worker panicked");
                fatal.get_or_insert(SumiError::Aborted("worker panicked".to_string()));
            }
            Err(e) => debug!(error = %e, "Worker task cancelled"),
        }
    }
}

fn check_disk_space(job_dir: &Path, min_space: u64, pause: &PauseGate) {
    if min_space == 0 {
        return;
    }
    match fs2::available_space(job_dir) {
        Ok(available) if available < min_space => {
            if pause.pause(PauseReason::DiskSpace) {
                warn!(
                    available_gib = available as f64 / GIB,
                    "Low disk space on job directory"
                );
            }
        }
        Ok(_) => {
            pause.resume(PauseReason::DiskSpace);
        }
        Err(e) => debug!(error = %e, "Cannot read free disk space"),
    }
}

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the job directory (resuming any queued items)
/// 2. Load the seeds
/// 3. Crawl until finished or interrupted
/// 4. Print the crawl statistics
///
/// # Arguments
///
/// * `config` - The crawl configuration
/// * `seeds` - Where to take the URLs from
/// * `options` - Configuration hash and optional collaborators
///
/// # Example
///
/// ```no_run
/// use sumi_archiver::config::load_config_with_hash;
/// use sumi_archiver::crawler::{run_crawl, CrawlOptions, Seeds};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("job.toml"))?;
/// let options = CrawlOptions {
///     config_hash: Some(hash),
///     ..Default::default()
/// };
/// run_crawl(config, Seeds::Urls(vec!["https://example.com/".into()]), options).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config, seeds: Seeds, options: CrawlOptions) -> Result<CrawlSummary> {
    let coordinator = Coordinator::new(config, options)?;
    coordinator.seed(&seeds).await?;
    let summary = coordinator.run().await?;
    print_statistics(&summary.counters, summary.elapsed);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::NullRecordWriter;
    use super::super::worker::process_item;
    use crate::item::Item;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.job.job_dir = Some(dir.path().to_path_buf());
        config.job.min_space_required_gib = 0.0;
        config.job.stop_timeout_secs = 1;
        config
    }

    fn null_options() -> CrawlOptions {
        CrawlOptions {
            writer: Some(Arc::new(NullRecordWriter::new())),
            ..Default::default()
        }
    }

    #[test]
    fn test_disk_space_pauses_and_resumes() {
        let dir = TempDir::new().unwrap();
        let gate = PauseGate::new();

        check_disk_space(dir.path(), u64::MAX, &gate);
        assert!(gate.is_paused_for(PauseReason::DiskSpace));

        check_disk_space(dir.path(), 1, &gate);
        assert!(!gate.is_paused());
    }

    #[test]
    fn test_disk_check_disabled_at_zero() {
        let dir = TempDir::new().unwrap();
        let gate = PauseGate::new();
        check_disk_space(dir.path(), 0, &gate);
        assert!(!gate.is_paused());
    }

    #[tokio::test]
    async fn test_new_creates_job_layout() {
        let dir = TempDir::new().unwrap();
        let coordinator = Coordinator::new(create_test_config(&dir), CrawlOptions::default()).unwrap();

        assert!(dir.path().join("queue").is_file());
        assert!(dir.path().join("index_wal").is_file());
        assert!(dir.path().join("warcs").is_dir());
        assert!(dir.path().join("seencheck").join("seencheck.db").exists());
        assert_eq!(coordinator.worker_reports().len(), 1);
    }

    #[tokio::test]
    async fn test_run_with_empty_queue_stops_at_once() {
        let dir = TempDir::new().unwrap();
        let coordinator = Coordinator::new(create_test_config(&dir), null_options()).unwrap();

        let summary = tokio::time::timeout(Duration::from_secs(10), coordinator.run())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.counters.crawled, 0);
        assert_eq!(summary.detached_workers, 0);
    }

    #[tokio::test]
    async fn test_stop_handle_ends_crawl() {
        let dir = TempDir::new().unwrap();
        let coordinator = Coordinator::new(create_test_config(&dir), null_options()).unwrap();
        // An unroutable seed keeps the queue non-empty until it is fetched
        coordinator
            .seed(&Seeds::Urls(vec!["http://10.255.255.1/".to_string()]))
            .await
            .unwrap();

        let stop = coordinator.stop_handle();
        let run = tokio::spawn(coordinator.run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop.stop();
        assert!(stop.is_stopping());

        let summary = tokio::time::timeout(Duration::from_secs(15), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(summary.counters.crawled <= 1);
        assert_eq!(summary.detached_workers, 0);
    }

    #[tokio::test]
    async fn test_only_out_of_scope_items_still_finish() {
        let dir = TempDir::new().unwrap();
        let mut config = create_test_config(&dir);
        config.scope.excluded_hosts = vec!["x.example".to_string()];
        let coordinator = Coordinator::new(config, null_options()).unwrap();
        // Queued directly, as a resumed job would hold it after a scope change
        coordinator
            .queue()
            .enqueue(vec![Item::seed("http://x.example/").unwrap()])
            .await
            .unwrap();

        let summary = tokio::time::timeout(Duration::from_secs(10), coordinator.run())
            .await
            .expect("crawl did not finish in time")
            .unwrap();
        assert_eq!(summary.counters.skipped, 1);
        assert_eq!(summary.counters.crawled, 0);
    }

    #[tokio::test]
    async fn test_parent_counts_its_children() {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                format!(
                    r#"<html><body>
                    <a href="{0}/a">A</a>
                    <a href="{0}/b">B</a>
                    <a href="{0}/c">C</a>
                    <a href="{0}/a">A again</a>
                    <img src="/logo.png">
                    </body></html>"#,
                    base
                )
                .into_bytes(),
                "text/html",
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/logo.png"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut config = create_test_config(&dir);
        config.crawler.max_hops = 1;
        let coordinator = Coordinator::new(config, null_options()).unwrap();

        let parent = Item::seed(&format!("{}/", base)).unwrap();
        let status = WorkerStatus::new(0);
        let finished = process_item(&coordinator.ctx, &status, parent, &CancellationToken::new())
            .await
            .unwrap();

        // Three distinct outlinks queued plus one asset fetched
        assert_eq!(finished.locally_crawled, 4);
        assert_eq!(coordinator.queue().len(), 3);
        assert_eq!(coordinator.counters().snapshot().outlinks, 3);

        // Children already seen do not count again
        let again = Item::seed(&format!("{}/", base)).unwrap();
        let finished = process_item(&coordinator.ctx, &status, again, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(finished.locally_crawled, 0);
    }
}
