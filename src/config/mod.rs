//! Configuration module for Sumi-Archiver
//!
//! This module handles loading, parsing, and validating TOML job configuration files.
//! Every key has a default, so an empty file is a valid configuration.
//!
//! # Example
//!
//! ```no_run
//! use sumi_archiver::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("job.toml")).unwrap();
//! println!("Crawling with {} workers", config.job.workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, JobConfig, OrchestratorConfig, ProxyConfig, RateLimitSettings,
    ScopeConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
