//! Crawl and queue statistics reporting
//!
//! This module prints the end-of-crawl summary, the queue statistics of a
//! job directory, and runs the periodic progress reporter.

use super::counters::{CounterSnapshot, CrawlCounters};
use crate::queue::{PersistentGroupedQueue, QueueInspection};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Interval between two progress lines
pub const REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Prints the crawl counters to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The counters to display
/// * `elapsed` - Wall-clock duration of the crawl
pub fn print_statistics(stats: &CounterSnapshot, elapsed: Duration) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  URLs crawled: {}", stats.crawled);
    println!("  URLs skipped (out of scope): {}", stats.skipped);
    println!("  Responses archived: {}", stats.archived);
    println!("  Responses discarded: {}", stats.discarded);
    println!("  Failures: {}", stats.failed);
    println!("  Retries: {}", stats.retried);
    println!("  Redirects followed: {}", stats.redirects);
    println!();

    println!("Discovered:");
    println!("  Outlinks: {}", stats.outlinks);
    println!("  Assets: {}", stats.assets);
    println!();

    let secs = elapsed.as_secs_f64();
    println!("Throughput:");
    println!("  Bytes archived: {}", stats.bytes);
    println!("  Duration: {:.1}s", secs);
    println!(
        "  Average rate: {:.2} URI/s",
        if secs > 0.0 { stats.crawled as f64 / secs } else { 0.0 }
    );
}

/// Prints what a job directory's queue files hold
pub fn print_queue_statistics(inspection: &QueueInspection) {
    println!("=== Queue Statistics ===\n");

    println!("Queue:");
    println!("  Queued items: {}", inspection.elements);
    println!("  Hosts with items: {}", inspection.hosts);
    if let Some(meta) = &inspection.meta {
        println!("  Created: {}", meta.created_at.to_rfc3339());
        if let Some(cursor) = &meta.host_cursor {
            println!("  Next host: {}", cursor);
        }
        if let Some(hash) = &meta.config_hash {
            println!("  Config hash: {}", hash);
        }
    }
    println!();

    let Some(stats) = &inspection.stats else {
        println!("No statistics recorded (the last run did not close cleanly)");
        return;
    };

    println!("Last run:");
    println!("  Enqueued: {}", stats.enqueued_count);
    println!("  Dequeued: {}", stats.dequeued_count);
    if let Some(t) = stats.first_enqueue_time {
        println!("  First enqueue: {}", t.to_rfc3339());
    }
    if let Some(t) = stats.last_dequeue_time {
        println!("  Last dequeue: {}", t.to_rfc3339());
    }
    println!();

    let top = stats.top_hosts(10);
    if !top.is_empty() {
        println!("Top Hosts:");
        for (host, count) in top {
            println!("  - {}: {}", host, count);
        }
        println!();
    }
}

/// Logs crawl progress every [`REPORT_INTERVAL`] until cancelled
pub fn spawn_reporter(
    counters: Arc<CrawlCounters>,
    queue: Arc<PersistentGroupedQueue>,
    active_workers: Arc<AtomicUsize>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REPORT_INTERVAL);
        interval.tick().await;
        let mut last_crawled = counters.crawled();
        let mut last_tick = Instant::now();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let crawled = counters.crawled();
                    let secs = last_tick.elapsed().as_secs_f64();
                    let rate = if secs > 0.0 {
                        (crawled - last_crawled) as f64 / secs
                    } else {
                        0.0
                    };
                    info!(
                        crawled,
                        queued = queue.len(),
                        hosts = queue.host_count(),
                        active = active_workers.load(Ordering::Relaxed),
                        uri_per_sec = (rate * 100.0).round() / 100.0,
                        "Progress"
                    );
                    last_crawled = crawled;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
