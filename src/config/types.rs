use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Sumi-Archiver
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub job: JobConfig,
    pub crawler: CrawlerConfig,
    pub scope: ScopeConfig,
    #[serde(rename = "rate-limit")]
    pub rate_limit: RateLimitSettings,
    pub proxy: ProxyConfig,
    pub orchestrator: Option<OrchestratorConfig>,
}

impl Config {
    /// Directory holding the queue, seencheck, records and logs of this job
    pub fn job_dir(&self) -> PathBuf {
        self.job
            .job_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("jobs").join(&self.job.job_name))
    }
}

/// Job-level settings: identity, worker count, queue durability
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Name of the job, used for the default job directory
    #[serde(rename = "job-name")]
    pub job_name: String,

    /// Explicit job directory (defaults to `jobs/<job-name>`)
    #[serde(rename = "job-dir")]
    pub job_dir: Option<PathBuf>,

    /// Number of crawl workers
    pub workers: usize,

    /// Pause the crawl when free space on the job directory drops below this
    #[serde(rename = "min-space-required-gib")]
    pub min_space_required_gib: f64,

    /// Deduplicate URLs through the persistent seencheck
    #[serde(rename = "use-seencheck")]
    pub use_seencheck: bool,

    /// Hand items directly to idle dequeuers when the queue is empty
    #[serde(rename = "use-handover")]
    pub use_handover: bool,

    /// Wait for the WAL fsync before acknowledging an enqueue
    #[serde(rename = "use-commit")]
    pub use_commit: bool,

    /// Seconds between two index snapshots
    #[serde(rename = "wal-dump-interval-secs")]
    pub wal_dump_interval_secs: u64,

    /// Maximum time the WAL syncer waits before an fsync (milliseconds)
    #[serde(rename = "wal-sync-max-wait-ms")]
    pub wal_sync_max_wait_ms: u64,

    /// A worker inactive for longer than this is reported as hung
    #[serde(rename = "hung-worker-threshold-secs")]
    pub hung_worker_threshold_secs: u64,

    /// Pause when the record writer backlog exceeds this many records per active worker
    #[serde(rename = "writer-backlog-factor")]
    pub writer_backlog_factor: usize,

    /// Grace period for workers to finish their current item on shutdown
    #[serde(rename = "stop-timeout-secs")]
    pub stop_timeout_secs: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            job_name: "default".to_string(),
            job_dir: None,
            workers: 1,
            min_space_required_gib: 20.0,
            use_seencheck: true,
            use_handover: false,
            use_commit: true,
            wal_dump_interval_secs: 60,
            wal_sync_max_wait_ms: 50,
            hung_worker_threshold_secs: 300,
            writer_backlog_factor: 8,
            stop_timeout_secs: 60,
        }
    }
}

/// Fetch and extraction behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// User-Agent header sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Maximum number of assets fetched concurrently for one item
    #[serde(rename = "max-concurrent-assets")]
    pub max_concurrent_assets: usize,

    /// Maximum hop distance from a seed
    #[serde(rename = "max-hops")]
    pub max_hops: u64,

    /// Maximum number of retries per request
    #[serde(rename = "max-retry")]
    pub max_retry: u32,

    /// Maximum number of redirects followed per item
    #[serde(rename = "max-redirect")]
    pub max_redirect: u64,

    /// Overall request timeout (seconds)
    #[serde(rename = "http-timeout")]
    pub http_timeout: u64,

    /// Deadline for every body read (seconds)
    #[serde(rename = "read-timeout-secs")]
    pub read_timeout_secs: u64,

    /// Base delay between retries (milliseconds), multiplied by the retry number
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    /// Do not extract nor fetch page assets
    #[serde(rename = "disable-assets-capture")]
    pub disable_assets_capture: bool,

    /// Follow `<link rel="alternate">` targets
    #[serde(rename = "capture-alternate-pages")]
    pub capture_alternate_pages: bool,

    /// HTML tag names ignored during extraction
    #[serde(rename = "disabled-html-tags")]
    pub disabled_html_tags: Vec<String>,

    /// Treat seeds as domains: same-domain outlinks stay at hop 0
    #[serde(rename = "domains-crawl")]
    pub domains_crawl: bool,

    /// Responses larger than this are discarded (MiB, 0 disables)
    #[serde(rename = "max-content-length-mib")]
    pub max_content_length_mib: u64,

    /// Status codes whose responses are discarded instead of archived
    #[serde(rename = "warc-discard-status")]
    pub warc_discard_status: Vec<u16>,

    /// Bytes of a response body kept in memory before spilling to disk
    #[serde(rename = "spool-memory-bytes")]
    pub spool_memory_bytes: usize,

    /// Validate TLS certificates
    #[serde(rename = "verify-tls")]
    pub verify_tls: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("Sumi-Archiver/{}", env!("CARGO_PKG_VERSION")),
            max_concurrent_assets: 8,
            max_hops: 0,
            max_retry: 5,
            max_redirect: 20,
            http_timeout: 30,
            read_timeout_secs: 15,
            retry_delay_ms: 2000,
            disable_assets_capture: false,
            capture_alternate_pages: false,
            disabled_html_tags: Vec::new(),
            domains_crawl: false,
            max_content_length_mib: 0,
            warc_discard_status: Vec::new(),
            spool_memory_bytes: 2 * 1024 * 1024,
            verify_tls: false,
        }
    }
}

impl CrawlerConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Content-length ceiling in bytes, if any
    pub fn max_content_length(&self) -> Option<u64> {
        (self.max_content_length_mib > 0).then(|| self.max_content_length_mib * 1024 * 1024)
    }
}

/// URL inclusion and exclusion rules
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Hosts never crawled (exact or `*.example.com`)
    #[serde(rename = "excluded-hosts")]
    pub excluded_hosts: Vec<String>,

    /// When non-empty, only these hosts are crawled
    #[serde(rename = "included-hosts")]
    pub included_hosts: Vec<String>,

    /// URLs containing any of these substrings are dropped
    #[serde(rename = "excluded-strings")]
    pub excluded_strings: Vec<String>,

    /// When non-empty, only URLs containing one of these substrings are kept
    #[serde(rename = "included-strings")]
    pub included_strings: Vec<String>,
}

/// Per-host token bucket settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Bucket capacity (burst size)
    pub capacity: f64,

    /// Ideal refill rate (tokens per second)
    #[serde(rename = "refill-rate")]
    pub refill_rate: f64,

    /// Lower bound of the refill rate under back-pressure
    #[serde(rename = "min-refill-rate")]
    pub min_refill_rate: f64,

    /// Fraction of the gap to the ideal rate recovered per success
    #[serde(rename = "recovery-factor")]
    pub recovery_factor: f64,

    /// First penalty window after a throttling status (milliseconds)
    #[serde(rename = "base-penalty-ms")]
    pub base_penalty_ms: u64,

    /// Longest penalty window (milliseconds)
    #[serde(rename = "max-penalty-ms")]
    pub max_penalty_ms: u64,

    /// Seconds between two idle-bucket sweeps
    #[serde(rename = "cleanup-frequency")]
    pub cleanup_frequency: u64,

    /// Buckets idle for longer than this are dropped (seconds)
    #[serde(rename = "idle-threshold-secs")]
    pub idle_threshold_secs: u64,

    /// Maximum number of live buckets
    #[serde(rename = "max-buckets")]
    pub max_buckets: usize,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            capacity: 10.0,
            refill_rate: 1.0,
            min_refill_rate: 0.05,
            recovery_factor: 0.1,
            base_penalty_ms: 2000,
            max_penalty_ms: 120_000,
            cleanup_frequency: 300,
            idle_threshold_secs: 600,
            max_buckets: 10_000,
        }
    }
}

/// Optional HTTP proxy
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Proxy URL (`http://` or `https://`)
    pub url: Option<String>,

    /// Hosts that bypass the proxy
    pub bypass: Vec<String>,
}

/// Remote orchestrator connection
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Base URL of the orchestrator API
    pub url: String,

    /// Project the crawl belongs to
    pub project: String,

    #[serde(default)]
    pub key: String,

    #[serde(default)]
    pub secret: String,

    /// Number of URLs pulled per request
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Return terminally rate-limited items to the orchestrator
    #[serde(rename = "send-back-on-429", default)]
    pub send_back_on_429: bool,
}

fn default_batch_size() -> usize {
    100
}
