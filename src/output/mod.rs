//! Output module for crawl counters and statistics
//!
//! This module handles:
//! - Aggregate counters updated by every worker
//! - The periodic progress reporter
//! - End-of-crawl and queue statistics summaries

mod counters;
pub mod stats;

pub use counters::{CounterSnapshot, CrawlCounters};
pub use stats::{print_queue_statistics, print_statistics, spawn_reporter};
