//! Sumi-Archiver: a durable web archival crawler
//!
//! This crate fetches URLs, hands every HTTP exchange to an archival-record
//! writer, and discovers further URLs by parsing the response bodies. Work is
//! scheduled through a crash-safe queue grouped by host, with per-host
//! adaptive rate limiting and a persistent seencheck.

pub mod archive;
pub mod config;
pub mod crawler;
pub mod extractor;
pub mod item;
pub mod orchestrator;
pub mod output;
pub mod queue;
pub mod ratelimit;
pub mod seencheck;
pub mod sitespecific;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Archiver operations
#[derive(Debug, Error)]
pub enum SumiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Queue error: {0}")]
    Queue(#[from] queue::QueueError),

    #[error("Seencheck error: {0}")]
    Seencheck(#[from] seencheck::SeencheckError),

    #[error("Archive error: {0}")]
    Archive(#[from] archive::ArchiveError),

    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] orchestrator::OrchestratorError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Item codec error: {0}")]
    Codec(#[from] item::CodecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crawl aborted: {0}")]
    Aborted(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid host pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

impl SumiError {
    /// Returns true if this error means the crawl cannot continue
    ///
    /// Durability failures and a closed queue are fatal; everything else is
    /// scoped to a single item.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Queue(e) => e.is_fatal(),
            Self::Aborted(_) => true,
            _ => false,
        }
    }
}

/// Result type alias for Sumi-Archiver operations
pub type Result<T> = std::result::Result<T, SumiError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use item::{Item, ItemKind};
pub use queue::PersistentGroupedQueue;
pub use url::{fingerprint, normalize_url, registrable_domain, UrlFilter};
