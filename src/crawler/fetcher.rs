//! HTTP fetcher implementation
//!
//! This module handles every request the crawler makes, including:
//! - Per-host rate limiting before each attempt
//! - Retry logic for transient failures
//! - Manual redirect chasing, with a seencheck on every target
//! - Discard hooks on headers and body size
//! - Handing each exchange to the record writer
//!
//! # Retry Logic
//!
//! | Condition | Action |
//! |-----------|--------|
//! | HTTP 429 | Retry, `retry_delay * n` between attempts |
//! | HTTP 5xx, 408, 425 | Retry, `retry_delay * n` between attempts |
//! | Challenge page | Retry, `retry_delay * n` between attempts |
//! | Transport error | Retry, unless "no such host" or "unsupported protocol" |
//! | Read timeout | Retry |
//! | Other discard reasons | Terminal |
//! | Cancellation | Terminal, never retried |

use super::body::SpooledBody;
use super::client::HttpClients;
use super::discard::{DiscardPolicy, DiscardReason};
use crate::archive::{ArchiveError, ExchangeRecord, RecordWriter};
use crate::config::Config;
use crate::extractor::{is_post_processable, ResponseView};
use crate::item::Item;
use crate::output::CrawlCounters;
use crate::ratelimit::RateLimiter;
use crate::seencheck::Seencheck;
use crate::sitespecific::HookRegistry;
use crate::url::{extract_host, resolve_url};
use crate::UrlError;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, LOCATION, REFERER, USER_AGENT};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Errors that end a fetch attempt
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Transport error: {message}")]
    Transport { message: String, retryable: bool },

    #[error("Rate limited (HTTP 429)")]
    RateLimited,

    #[error("Bad status: HTTP {0}")]
    BadStatus(u16),

    #[error("Discarded: {0}")]
    Discarded(DiscardReason),

    #[error("Redirect not followed: {0}")]
    RedirectLoop(String),

    #[error("Redirect target already seen: {0}")]
    AlreadySeen(String),

    #[error("Fetch cancelled")]
    Cancelled,

    #[error("Timed out reading the response")]
    Timeout,

    #[error("Record writer error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Invalid URL: {0}")]
    Url(#[from] UrlError),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { retryable, .. } => *retryable,
            Self::RateLimited | Self::BadStatus(_) | Self::Timeout => true,
            Self::Discarded(reason) => reason.is_retryable(),
            _ => false,
        }
    }

    /// Short machine-readable reason, used in the per-item log event
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::RateLimited => "rate_limited",
            Self::BadStatus(_) => "bad_status",
            Self::Discarded(reason) => reason.as_str(),
            Self::RedirectLoop(_) => "redirect_loop",
            Self::AlreadySeen(_) => "already_seen",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::Archive(_) => "archive",
            Self::Url(_) => "invalid_url",
        }
    }

    /// Status code that caused the error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::RateLimited => Some(429),
            Self::BadStatus(status) => Some(*status),
            Self::Discarded(DiscardReason::Status(status)) => Some(*status),
            _ => None,
        }
    }

    /// Classifies a reqwest error
    ///
    /// DNS failures and unsupported schemes are not worth retrying.
    fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::Timeout;
        }
        let message = error_chain(&error);
        let lower = message.to_lowercase();
        let fatal = lower.contains("no such host")
            || lower.contains("failed to lookup address")
            || lower.contains("name or service not known")
            || lower.contains("unsupported protocol")
            || lower.contains("url scheme is not allowed")
            || error.is_builder();
        Self::Transport {
            message,
            retryable: !fatal,
        }
    }
}

fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// A response that was archived and may be handed to the extractor
#[derive(Debug)]
pub struct FetchedResponse {
    /// The item that was finally fetched, after redirects
    pub item: Item,
    pub url: Url,
    pub status: u16,
    pub headers: HeaderMap,
    /// Body bytes, kept only for post-processable content types
    pub body: Option<Vec<u8>>,
    /// Bytes handed to the record writer over the whole redirect chain
    pub bytes: u64,
    /// Retries over the whole redirect chain
    pub retries: u32,
    /// Why a redirect in the last response was not followed
    pub redirect_stop: Option<FetchError>,
}

impl FetchedResponse {
    pub fn view(&self) -> ResponseView<'_> {
        ResponseView {
            url: &self.url,
            status: self.status,
            headers: &self.headers,
            body: self.body.as_deref(),
        }
    }
}

/// Result of [`Fetcher::fetch`]
#[derive(Debug)]
pub enum FetchOutcome {
    Archived(FetchedResponse),
    Discarded(DiscardReason),
    /// Every attempt failed with a retryable error
    RetriedOut(FetchError),
    Fatal(FetchError),
}

impl FetchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Archived(_) => "archived",
            Self::Discarded(_) => "discarded",
            Self::RetriedOut(_) => "retried_out",
            Self::Fatal(_) => "fatal",
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Archived(response) => Some(response.status),
            Self::Discarded(DiscardReason::Status(status)) => Some(*status),
            Self::Discarded(_) => None,
            Self::RetriedOut(e) | Self::Fatal(e) => e.status_code(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Fatal(FetchError::Cancelled))
    }
}

/// Fetch behavior taken from the configuration
#[derive(Debug, Clone)]
pub struct FetcherSettings {
    pub user_agent: String,
    pub max_retry: u32,
    pub max_redirect: u64,
    pub retry_delay: Duration,
    pub read_timeout: Duration,
    pub spool_memory_bytes: usize,
    /// Directory receiving spooled bodies
    pub temp_dir: PathBuf,
    pub discard: DiscardPolicy,
}

impl FetcherSettings {
    pub fn from_config(config: &Config) -> Self {
        let crawler = &config.crawler;
        Self {
            user_agent: crawler.user_agent.clone(),
            max_retry: crawler.max_retry,
            max_redirect: crawler.max_redirect,
            retry_delay: crawler.retry_delay(),
            read_timeout: crawler.read_timeout(),
            spool_memory_bytes: crawler.spool_memory_bytes,
            temp_dir: config.job_dir().join("temp"),
            discard: DiscardPolicy::from_config(crawler),
        }
    }
}

/// One archived request/response
struct Exchange {
    status: u16,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
    bytes: u64,
}

/// How a request ended after its retries
enum Attempted {
    Done(Exchange),
    Failed { error: FetchError, exhausted: bool },
}

/// Issues requests for items and archives the responses
pub struct Fetcher {
    settings: FetcherSettings,
    clients: HttpClients,
    limiter: Arc<RateLimiter>,
    writer: Arc<dyn RecordWriter>,
    hooks: Arc<HookRegistry>,
    seencheck: Option<Arc<dyn Seencheck>>,
    counters: Arc<CrawlCounters>,
}

impl Fetcher {
    pub fn new(
        settings: FetcherSettings,
        clients: HttpClients,
        limiter: Arc<RateLimiter>,
        writer: Arc<dyn RecordWriter>,
        hooks: Arc<HookRegistry>,
    ) -> Self {
        Self {
            settings,
            clients,
            limiter,
            writer,
            hooks,
            seencheck: None,
            counters: Arc::new(CrawlCounters::new()),
        }
    }

    /// Checks redirect targets against `seencheck`
    pub fn with_seencheck(mut self, seencheck: Arc<dyn Seencheck>) -> Self {
        self.seencheck = Some(seencheck);
        self
    }

    pub fn with_counters(mut self, counters: Arc<CrawlCounters>) -> Self {
        self.counters = counters;
        self
    }

    pub fn settings(&self) -> &FetcherSettings {
        &self.settings
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Fetches an item, following redirects
    ///
    /// Every response in the redirect chain is handed to the record writer.
    /// The returned response is the last one of the chain.
    pub async fn fetch(&self, item: &Item, cancel: &CancellationToken) -> FetchOutcome {
        let mut current = item.clone();
        let mut url = match current.parsed_url() {
            Ok(url) => url,
            Err(e) => return FetchOutcome::Fatal(e.into()),
        };
        if let Some(rewritten) = self.hooks.rewrite_url(&url) {
            debug!(from = %url, to = %rewritten, "Site hook rewrote URL");
            url = rewritten;
        }

        let mut bytes = 0;
        let mut retries = 0;

        loop {
            let (attempted, attempt_retries) = self.request(&current, &url, cancel).await;
            retries += attempt_retries;

            let exchange = match attempted {
                Attempted::Done(exchange) => exchange,
                Attempted::Failed {
                    error,
                    exhausted: true,
                } => return FetchOutcome::RetriedOut(error),
                Attempted::Failed {
                    error: FetchError::Discarded(reason),
                    ..
                } => return FetchOutcome::Discarded(reason),
                Attempted::Failed { error, .. } => return FetchOutcome::Fatal(error),
            };
            bytes += exchange.bytes;

            let location = exchange
                .headers
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .filter(|_| (300..400).contains(&exchange.status));

            let redirect_stop = match location {
                None => None,
                Some(location) => match self.next_hop(&current, &url, location).await {
                    Ok(next) => {
                        debug!(from = %url, to = %next.url, depth = next.redirect_depth, "Following redirect");
                        self.counters.incr_redirects();
                        url = match next.parsed_url() {
                            Ok(url) => url,
                            Err(e) => return FetchOutcome::Fatal(e.into()),
                        };
                        current = next;
                        continue;
                    }
                    Err(stop) => Some(stop),
                },
            };

            return FetchOutcome::Archived(FetchedResponse {
                item: current,
                url,
                status: exchange.status,
                headers: exchange.headers,
                body: exchange.body,
                bytes,
                retries,
                redirect_stop,
            });
        }
    }

    /// Validates a redirect and builds the item for its target
    async fn next_hop(&self, current: &Item, url: &Url, location: &str) -> Result<Item, FetchError> {
        let target = resolve_url(url, location)?;
        if &target == url {
            return Err(FetchError::RedirectLoop(format!("{} redirects to itself", url)));
        }
        if current.redirect_depth >= self.settings.max_redirect {
            return Err(FetchError::RedirectLoop(format!(
                "{} redirects after {} hops",
                url, current.redirect_depth
            )));
        }

        let next = current.redirected(&target);
        if let Some(seencheck) = &self.seencheck {
            if !next.bypass_seencheck {
                match seencheck
                    .check_and_mark(next.fingerprint, &next.url, next.kind)
                    .await
                {
                    Ok(true) => return Err(FetchError::AlreadySeen(next.url)),
                    Ok(false) => {}
                    Err(e) => warn!(url = %next.url, error = %e, "Seencheck failed, following redirect"),
                }
            }
        }
        Ok(next)
    }

    /// Runs one request with the retry policy
    ///
    /// Returns how the request ended and the number of retries made.
    async fn request(&self, item: &Item, url: &Url, cancel: &CancellationToken) -> (Attempted, u32) {
        let Some(host) = extract_host(url) else {
            let error = FetchError::Url(UrlError::MissingHost);
            return (Attempted::Failed { error, exhausted: false }, 0);
        };

        let mut retries = 0;
        loop {
            if !self.limiter.wait(&host, cancel).await {
                let error = FetchError::Cancelled;
                return (Attempted::Failed { error, exhausted: false }, retries);
            }

            let error = match self.attempt(item, url, &host, cancel).await {
                Ok(exchange) => return (Attempted::Done(exchange), retries),
                Err(e) => e,
            };

            if !error.is_retryable() {
                return (Attempted::Failed { error, exhausted: false }, retries);
            }
            if retries >= self.settings.max_retry {
                return (Attempted::Failed { error, exhausted: true }, retries);
            }

            retries += 1;
            self.counters.incr_retried();
            let delay = self.settings.retry_delay.saturating_mul(retries);
            debug!(url = %url, error = %error, retry = retries, delay_ms = delay.as_millis() as u64, "Retrying");

            tokio::select! {
                _ = cancel.cancelled() => {
                    let error = FetchError::Cancelled;
                    return (Attempted::Failed { error, exhausted: false }, retries);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn request_headers(&self, item: &Item, url: &Url) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(ua) = HeaderValue::from_str(&self.settings.user_agent) {
            headers.insert(USER_AGENT, ua);
        }
        if let Some(parent) = item.parent_url.as_deref() {
            if let Ok(referer) = HeaderValue::from_str(parent) {
                headers.insert(REFERER, referer);
            }
        }
        self.hooks.prepare_request(url, &mut headers);
        headers
    }

    /// Sends a single request and archives its response
    async fn attempt(
        &self,
        item: &Item,
        url: &Url,
        host: &str,
        cancel: &CancellationToken,
    ) -> Result<Exchange, FetchError> {
        let request_headers = self.request_headers(item, url);
        let send = self
            .clients
            .for_host(host)
            .get(url.clone())
            .headers(request_headers.clone())
            .send();

        let mut response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = send => result.map_err(FetchError::from_transport)?,
        };

        let status = response.status().as_u16();
        self.limiter.on_response(host, status);

        match status {
            429 => return Err(FetchError::RateLimited),
            408 | 425 => return Err(FetchError::BadStatus(status)),
            s if s >= 500 => return Err(FetchError::BadStatus(status)),
            _ => {}
        }

        let headers = response.headers().clone();
        if let Some(reason) = self.settings.discard.check(status, &headers) {
            return Err(FetchError::Discarded(reason));
        }

        let mut body = SpooledBody::new(self.settings.spool_memory_bytes, &self.settings.temp_dir);
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                chunk = tokio::time::timeout(self.settings.read_timeout, response.chunk()) => chunk,
            };
            let chunk = match chunk {
                Err(_) => return Err(FetchError::Timeout),
                Ok(Err(e)) => return Err(FetchError::from_transport(e)),
                Ok(Ok(None)) => break,
                Ok(Ok(Some(chunk))) => chunk,
            };
            body.write_chunk(&chunk).map_err(ArchiveError::from)?;
            if let Some(reason) = self.settings.discard.check_length(body.len()) {
                return Err(FetchError::Discarded(reason));
            }
        }

        let record = ExchangeRecord::new(&item.id, url.as_str(), status, &request_headers, &headers);
        let keep_body = is_post_processable(
            headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
        );
        let writer = Arc::clone(&self.writer);

        let (written, kept) = tokio::task::spawn_blocking(move || {
            let written = match body.reader() {
                Ok(mut reader) => writer.write(&record, &mut *reader),
                Err(e) => Err(e.into()),
            };
            let kept = match keep_body {
                true => body.to_bytes().ok(),
                false => None,
            };
            (written, kept)
        })
        .await
        .map_err(|e| {
            ArchiveError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })?;

        let bytes = written?;
        self.counters.add_bytes(bytes);

        Ok(Exchange {
            status,
            headers,
            body: kept,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::NullRecordWriter;
    use crate::config::RateLimitSettings;
    use crate::seencheck::SqliteSeencheck;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct TestFetcher {
        fetcher: Fetcher,
        writer: Arc<NullRecordWriter>,
        _dir: TempDir,
    }

    fn create_test_fetcher(max_retry: u32, max_redirect: u64) -> TestFetcher {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.job.job_dir = Some(dir.path().to_path_buf());
        config.crawler.max_retry = max_retry;
        config.crawler.max_redirect = max_redirect;
        config.crawler.retry_delay_ms = 10;
        config.crawler.warc_discard_status = vec![404];

        let mut limits = RateLimitSettings::default();
        limits.capacity = 100.0;
        limits.refill_rate = 100.0;
        limits.base_penalty_ms = 10;

        let writer = Arc::new(NullRecordWriter::new());
        let fetcher = Fetcher::new(
            FetcherSettings::from_config(&config),
            HttpClients::from_config(&config).unwrap(),
            Arc::new(RateLimiter::new(&limits)),
            writer.clone(),
            Arc::new(HookRegistry::empty()),
        );
        TestFetcher {
            fetcher,
            writer,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_fetch_html_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<a href=\"/b\">b</a>", "text/html"),
            )
            .mount(&server)
            .await;

        let t = create_test_fetcher(0, 5);
        let item = Item::seed(&format!("{}/", server.uri())).unwrap();
        let outcome = t.fetcher.fetch(&item, &CancellationToken::new()).await;

        let FetchOutcome::Archived(response) = outcome else {
            panic!("expected archived response, got {:?}", outcome);
        };
        assert_eq!(response.status, 200);
        assert_eq!(response.body.as_deref(), Some(&b"<a href=\"/b\">b</a>"[..]));
        assert_eq!(response.bytes, 18);
        assert_eq!(t.writer.records().len(), 1);
    }

    #[tokio::test]
    async fn test_binary_body_is_archived_not_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(vec![0u8; 64], "image/png"),
            )
            .mount(&server)
            .await;

        let t = create_test_fetcher(0, 5);
        let item = Item::seed(&format!("{}/img.png", server.uri())).unwrap();
        let FetchOutcome::Archived(response) = t.fetcher.fetch(&item, &CancellationToken::new()).await
        else {
            panic!("expected archived response");
        };
        assert!(response.body.is_none());
        assert_eq!(response.bytes, 64);
    }

    #[tokio::test]
    async fn test_max_retry_zero_does_not_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let t = create_test_fetcher(0, 5);
        let item = Item::seed(&format!("{}/", server.uri())).unwrap();
        let outcome = t.fetcher.fetch(&item, &CancellationToken::new()).await;
        assert!(matches!(
            outcome,
            FetchOutcome::RetriedOut(FetchError::BadStatus(503))
        ));
        assert!(t.writer.records().is_empty());
    }

    #[tokio::test]
    async fn test_retries_until_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let t = create_test_fetcher(2, 5);
        let item = Item::seed(&format!("{}/", server.uri())).unwrap();
        let outcome = t.fetcher.fetch(&item, &CancellationToken::new()).await;
        assert!(matches!(outcome, FetchOutcome::RetriedOut(_)));
    }

    #[tokio::test]
    async fn test_discard_status_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let t = create_test_fetcher(3, 5);
        let item = Item::seed(&format!("{}/missing", server.uri())).unwrap();
        let outcome = t.fetcher.fetch(&item, &CancellationToken::new()).await;
        assert!(matches!(
            outcome,
            FetchOutcome::Discarded(DiscardReason::Status(404))
        ));
        assert!(t.writer.records().is_empty());
    }

    #[tokio::test]
    async fn test_max_redirect_zero_records_without_following() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/x"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/y"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/y"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let t = create_test_fetcher(0, 0);
        let item = Item::seed(&format!("{}/x", server.uri())).unwrap();
        let FetchOutcome::Archived(response) = t.fetcher.fetch(&item, &CancellationToken::new()).await
        else {
            panic!("expected archived response");
        };
        assert_eq!(response.status, 302);
        assert!(matches!(
            response.redirect_stop,
            Some(FetchError::RedirectLoop(_))
        ));
        assert_eq!(t.writer.records().len(), 1);
    }

    #[tokio::test]
    async fn test_self_redirect_stops() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/loop"))
            .expect(1)
            .mount(&server)
            .await;

        let t = create_test_fetcher(0, 10);
        let item = Item::seed(&format!("{}/loop", server.uri())).unwrap();
        let FetchOutcome::Archived(response) = t.fetcher.fetch(&item, &CancellationToken::new()).await
        else {
            panic!("expected archived response");
        };
        assert!(matches!(
            response.redirect_stop,
            Some(FetchError::RedirectLoop(_))
        ));
    }

    #[tokio::test]
    async fn test_redirect_to_seen_target_is_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/a"))
            .mount(&server)
            .await;

        let seencheck = Arc::new(SqliteSeencheck::open_in_memory().unwrap());
        let seen = Item::seed(&format!("{}/a", server.uri())).unwrap();
        seencheck
            .check_and_mark(seen.fingerprint, &seen.url, seen.kind)
            .await
            .unwrap();

        let t = create_test_fetcher(0, 10);
        let fetcher = t.fetcher.with_seencheck(seencheck);
        let item = Item::seed(&format!("{}/b", server.uri())).unwrap();
        let FetchOutcome::Archived(response) = fetcher.fetch(&item, &CancellationToken::new()).await
        else {
            panic!("expected archived response");
        };
        assert!(matches!(
            response.redirect_stop,
            Some(FetchError::AlreadySeen(_))
        ));
        assert_eq!(t.writer.records().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_fetch_is_fatal() {
        let t = create_test_fetcher(3, 5);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let item = Item::seed("http://127.0.0.1:9/").unwrap();
        let outcome = t.fetcher.fetch(&item, &cancel).await;
        assert!(outcome.is_cancelled());
    }

    #[test]
    fn test_error_retryability() {
        assert!(FetchError::RateLimited.is_retryable());
        assert!(FetchError::BadStatus(502).is_retryable());
        assert!(FetchError::Timeout.is_retryable());
        assert!(!FetchError::Cancelled.is_retryable());
        assert!(!FetchError::AlreadySeen("x".into()).is_retryable());
        assert!(FetchError::Discarded(DiscardReason::Challenge("cloudflare")).is_retryable());
        assert!(!FetchError::Discarded(DiscardReason::TooLarge(1)).is_retryable());
        assert!(!FetchError::Transport {
            message: "no such host".into(),
            retryable: false
        }
        .is_retryable());
    }
}
