//! Remote orchestrator client
//!
//! When a crawl is coordinated by an external service, that service supplies
//! the URLs to crawl, receives discovered and finished URLs, and answers
//! seencheck queries. This module defines the minimal interface the crawler
//! consumes and an HTTP/JSON implementation of it.

mod hq;

pub use hq::HqClient;

use crate::item::{Item, ItemKind};
use async_trait::async_trait;
use thiserror::Error;

/// Orchestrator errors
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Orchestrator request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Orchestrator returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid orchestrator response: {0}")]
    InvalidResponse(String),
}

/// Result type alias for orchestrator operations
pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;

/// A URL submitted to the orchestrator's seencheck
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeencheckQuery {
    pub url: String,
    pub kind: ItemKind,
}

/// Interface to an external crawl coordinator
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Pulls up to `batch` items to crawl
    async fn pull(&self, batch: usize) -> OrchestratorResult<Vec<Item>>;

    /// Returns items that could not be crawled so another crawler can take them
    async fn send_back(&self, items: &[Item]) -> OrchestratorResult<()>;

    /// Reports items whose processing is complete
    async fn mark_finished(&self, items: &[Item]) -> OrchestratorResult<()>;

    /// Reports newly discovered items
    async fn discovered(&self, items: &[Item]) -> OrchestratorResult<()>;

    /// Returns the subset of the queried URLs the orchestrator has not seen
    async fn seencheck(&self, urls: &[SeencheckQuery]) -> OrchestratorResult<Vec<String>>;
}
