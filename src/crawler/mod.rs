//! Crawler module for fetching and archiving
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retries, redirects and discard rules
//! - Archiving every exchange through a record writer
//! - Seeding and scheduling of discovered items
//! - The worker pool and overall crawl coordination

mod body;
mod client;
mod coordinator;
mod discard;
mod fetcher;
mod pause;
mod seeder;
mod worker;

pub use body::SpooledBody;
pub use client::HttpClients;
pub use coordinator::{run_crawl, Coordinator, CrawlOptions, CrawlSummary, Seeds, StopHandle};
pub use discard::{DiscardPolicy, DiscardReason};
pub use fetcher::{FetchError, FetchOutcome, FetchedResponse, Fetcher, FetcherSettings};
pub use pause::{PauseGate, PauseReason};
pub use seeder::{SeedReport, Seeder};
pub use worker::{WorkerReport, WorkerState, WorkerStatus};
