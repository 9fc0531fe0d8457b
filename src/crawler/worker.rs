//! Crawl workers
//!
//! Each worker loops over: dequeue, scope check, fetch, extract, schedule
//! outlinks, fetch assets. Workers share a [`WorkerContext`] and report
//! their activity through a [`WorkerStatus`] read by the watchdog.

use super::fetcher::{FetchOutcome, Fetcher};
use super::pause::PauseGate;
use super::seeder::Seeder;
use crate::extractor::{Discoveries, Extractor};
use crate::item::Item;
use crate::orchestrator::Orchestrator;
use crate::output::CrawlCounters;
use crate::queue::{PersistentGroupedQueue, QueueError};
use crate::{Result, SumiError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a worker is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Working,
    Paused,
    Hung,
    Stopped,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Working => "working",
            Self::Paused => "paused",
            Self::Hung => "hung",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug)]
struct StatusInner {
    state: WorkerState,
    current_url: Option<String>,
    last_activity: Instant,
}

/// Observable state of one worker
#[derive(Debug)]
pub struct WorkerStatus {
    pub id: usize,
    inner: Mutex<StatusInner>,
}

/// Copy of a worker's status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub id: usize,
    pub state: WorkerState,
    pub current_url: Option<String>,
    pub idle_for: Duration,
}

impl WorkerStatus {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            inner: Mutex::new(StatusInner {
                state: WorkerState::Idle,
                current_url: None,
                last_activity: Instant::now(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StatusInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set(&self, state: WorkerState, current_url: Option<&str>) {
        let mut inner = self.lock();
        inner.state = state;
        inner.current_url = current_url.map(str::to_string);
        inner.last_activity = Instant::now();
    }

    /// Records progress without changing the state
    pub fn touch(&self) {
        let mut inner = self.lock();
        inner.last_activity = Instant::now();
        if inner.state == WorkerState::Hung {
            inner.state = WorkerState::Working;
        }
    }

    pub fn state(&self) -> WorkerState {
        self.lock().state
    }

    pub fn report(&self) -> WorkerReport {
        let inner = self.lock();
        WorkerReport {
            id: self.id,
            state: inner.state,
            current_url: inner.current_url.clone(),
            idle_for: inner.last_activity.elapsed(),
        }
    }

    /// Marks the worker hung if it has been working on one item too long
    ///
    /// Returns true when the worker was just marked.
    pub fn mark_if_hung(&self, threshold: Duration, now: Instant) -> bool {
        let mut inner = self.lock();
        let stale = now.saturating_duration_since(inner.last_activity) > threshold;
        if inner.state == WorkerState::Working && stale {
            inner.state = WorkerState::Hung;
            return true;
        }
        false
    }
}

/// Everything a worker needs, shared by all workers
pub struct WorkerContext {
    pub queue: Arc<PersistentGroupedQueue>,
    pub seeder: Seeder,
    pub fetcher: Arc<Fetcher>,
    pub extractor: Arc<Extractor>,
    pub counters: Arc<CrawlCounters>,
    pub pause: Arc<PauseGate>,
    pub orchestrator: Option<Arc<dyn Orchestrator>>,
    pub active: Arc<AtomicUsize>,
    pub max_concurrent_assets: usize,
    pub send_back_on_429: bool,
}

/// Decrements the active-worker count when dropped
struct ActiveGuard<'a>(&'a AtomicUsize);

impl<'a> ActiveGuard<'a> {
    fn enter(active: &'a AtomicUsize) -> Self {
        active.fetch_add(1, Ordering::AcqRel);
        Self(active)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Runs one worker until `stopping` fires or the queue stops issuing items
///
/// `stopping` ends the loop between items; `cancel` aborts the item in
/// flight. Returns an error only for failures that end the crawl.
pub async fn run_worker(
    ctx: Arc<WorkerContext>,
    status: Arc<WorkerStatus>,
    stopping: CancellationToken,
    cancel: CancellationToken,
) -> Result<()> {
    debug!(worker = status.id, "Worker started");

    let result = loop {
        if stopping.is_cancelled() {
            break Ok(());
        }
        if ctx.pause.is_paused() {
            status.set(WorkerState::Paused, None);
            if !ctx.pause.wait_unpaused(&stopping).await {
                break Ok(());
            }
        }
        status.set(WorkerState::Idle, None);

        let item = match ctx.queue.dequeue_wait(&stopping).await {
            Ok(Some(item)) => item,
            Ok(None) | Err(QueueError::DequeueFrozen) | Err(QueueError::Closed) => break Ok(()),
            Err(e) if e.is_fatal() => {
                error!(worker = status.id, error = %e, "Queue failure, stopping crawl");
                stopping.cancel();
                break Err(SumiError::from(e));
            }
            Err(e) => {
                warn!(worker = status.id, error = %e, "Skipping unreadable queue entry");
                continue;
            }
        };

        if let Err(e) = process_item(&ctx, &status, item, &cancel).await {
            if e.is_fatal() {
                error!(worker = status.id, error = %e, "Fatal error, stopping crawl");
                stopping.cancel();
                break Err(e);
            }
            warn!(worker = status.id, error = %e, "Failed to schedule discovered items");
        }
    };

    status.set(WorkerState::Stopped, None);
    debug!(worker = status.id, "Worker stopped");
    result
}

/// Fetches one item and schedules what it leads to
///
/// Returns the item with `locally_crawled` raised by the number of
/// children it led to: outlinks queued (or reported to the orchestrator)
/// and assets fetched.
pub async fn process_item(
    ctx: &WorkerContext,
    status: &WorkerStatus,
    mut item: Item,
    cancel: &CancellationToken,
) -> Result<Item> {
    let allowed = item
        .host()
        .map_or(false, |host| ctx.seeder.filter().host_allowed(&host));
    if !allowed {
        debug!(url = %item.url, "Skipping out-of-scope item");
        ctx.counters.incr_skipped();
        report_finished(ctx, &item).await;
        return Ok(item);
    }

    let _active = ActiveGuard::enter(&ctx.active);
    status.set(WorkerState::Working, Some(&item.url));

    let started = Instant::now();
    let outcome = ctx.fetcher.fetch(&item, cancel).await;
    let elapsed = started.elapsed();
    status.touch();

    let mut sent_back = false;
    let result = match &outcome {
        FetchOutcome::Archived(response) => {
            let discoveries = ctx.extractor.extract(&response.item, &response.view());
            schedule_children(ctx, status, discoveries, cancel)
                .await
                .map(|children| item.locally_crawled += children)
        }
        FetchOutcome::RetriedOut(e) if e.status_code() == Some(429) && ctx.send_back_on_429 => {
            if let Some(orchestrator) = &ctx.orchestrator {
                match orchestrator.send_back(std::slice::from_ref(&item)).await {
                    Ok(()) => sent_back = true,
                    Err(e) => warn!(url = %item.url, error = %e, "Failed to send item back"),
                }
            }
            Ok(())
        }
        _ => Ok(()),
    };
    record_outcome(ctx, &item, &outcome, elapsed);

    if !sent_back && !outcome.is_cancelled() {
        report_finished(ctx, &item).await;
    }
    result.map(|()| item)
}

async fn report_finished(ctx: &WorkerContext, item: &Item) {
    if let Some(orchestrator) = &ctx.orchestrator {
        if let Err(e) = orchestrator.mark_finished(std::slice::from_ref(item)).await {
            warn!(url = %item.url, error = %e, "Failed to report finished item");
        }
    }
}

/// Schedules outlinks and fetches new assets, returning how many children
/// were queued or fetched
async fn schedule_children(
    ctx: &WorkerContext,
    status: &WorkerStatus,
    discoveries: Discoveries,
    cancel: &CancellationToken,
) -> Result<u64> {
    let mut children = schedule_outlinks(ctx, discoveries.outlinks).await?;
    if !discoveries.assets.is_empty() {
        let assets = ctx.seeder.filter_new(discoveries.assets).await?;
        children += fetch_assets(ctx, status, assets, cancel).await;
    }
    Ok(children)
}

/// Sends outlinks to the orchestrator, or through the seencheck to the queue
async fn schedule_outlinks(ctx: &WorkerContext, outlinks: Vec<Item>) -> Result<u64> {
    if outlinks.is_empty() {
        return Ok(0);
    }
    let scheduled = match &ctx.orchestrator {
        Some(orchestrator) => {
            let count = outlinks.len();
            match orchestrator.discovered(&outlinks).await {
                Ok(()) => count as u64,
                Err(e) => {
                    warn!(error = %e, count, "Failed to report discovered outlinks");
                    0
                }
            }
        }
        None => ctx.seeder.enqueue_new(outlinks).await? as u64,
    };
    ctx.counters.add_outlinks(scheduled);
    Ok(scheduled)
}

/// Fetches assets concurrently, at most `max_concurrent_assets` at a time
///
/// Assets are archived but not extracted further. Returns how many were
/// fetched to completion.
async fn fetch_assets(
    ctx: &WorkerContext,
    status: &WorkerStatus,
    assets: Vec<Item>,
    cancel: &CancellationToken,
) -> u64 {
    let semaphore = Arc::new(Semaphore::new(ctx.max_concurrent_assets.max(1)));
    let mut tasks = JoinSet::new();
    ctx.counters.add_assets(assets.len() as u64);

    for asset in assets {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        let fetcher = Arc::clone(&ctx.fetcher);
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let started = Instant::now();
            let outcome = fetcher.fetch(&asset, &cancel).await;
            (asset, outcome, started.elapsed())
        });
    }

    let mut fetched = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((asset, outcome, elapsed)) => {
                if !outcome.is_cancelled() {
                    fetched += 1;
                }
                record_outcome(ctx, &asset, &outcome, elapsed);
                status.touch();
            }
            Err(e) => error!(error = %e, "Asset fetch task failed"),
        }
    }
    fetched
}

/// Updates counters and emits the per-item event
pub fn record_outcome(ctx: &WorkerContext, item: &Item, outcome: &FetchOutcome, elapsed: Duration) {
    let counters = &ctx.counters;
    if !outcome.is_cancelled() {
        counters.incr_crawled();
    }

    let (reason, retries) = match outcome {
        FetchOutcome::Archived(response) => {
            counters.incr_archived();
            let reason = response.redirect_stop.as_ref().map_or("ok", |e| e.reason());
            (reason, response.retries)
        }
        FetchOutcome::Discarded(reason) => {
            counters.incr_discarded();
            (reason.as_str(), 0)
        }
        FetchOutcome::RetriedOut(e) => {
            counters.incr_failed();
            (e.reason(), ctx.fetcher.settings().max_retry)
        }
        FetchOutcome::Fatal(e) => {
            if !outcome.is_cancelled() {
                counters.incr_failed();
                debug!(url = %item.url, error = %e, "Fetch failed");
            }
            (e.reason(), 0)
        }
    };

    info!(
        url = %item.url,
        parent_url = item.parent_url.as_deref().unwrap_or(""),
        hop = item.hop,
        kind = %item.kind,
        outcome = outcome.label(),
        status_code = outcome.status_code().unwrap_or(0),
        reason,
        retries,
        locally_crawled = item.locally_crawled,
        elapsed_ms = elapsed.as_millis() as u64,
        "Crawled"
    );
}

/// Periodically marks workers stuck on one item for longer than `threshold`
pub fn spawn_watchdog(
    workers: Vec<Arc<WorkerStatus>>,
    threshold: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let period = (threshold / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let now = Instant::now();
                    for worker in &workers {
                        if worker.mark_if_hung(threshold, now) {
                            let report = worker.report();
                            warn!(
                                worker = report.id,
                                url = report.current_url.as_deref().unwrap_or(""),
                                idle_secs = report.idle_for.as_secs(),
                                "Worker appears hung"
                            );
                        }
                    }
                }
            }
        }
    })
}
