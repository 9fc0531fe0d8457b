//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! crawl cycle end-to-end against a temporary job directory.

use std::sync::Arc;
use std::time::{Duration, Instant};
use sumi_archiver::archive::NullRecordWriter;
use sumi_archiver::config::Config;
use sumi_archiver::crawler::{Coordinator, CrawlOptions, CrawlSummary, Seeds};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Upper bound for a single test crawl
const CRAWL_DEADLINE: Duration = Duration::from_secs(60);

/// Creates a test configuration rooted in the given job directory
fn create_test_config(job_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.job.job_name = "test".to_string();
    config.job.job_dir = Some(job_dir.path().to_path_buf());
    config.job.workers = 1;
    config.job.min_space_required_gib = 0.0;
    config.job.stop_timeout_secs = 5;
    config.crawler.max_hops = 1;
    config.crawler.max_retry = 3;
    config.crawler.retry_delay_ms = 10;
    config.crawler.http_timeout = 5;
    config.crawler.read_timeout_secs = 5;
    config
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/html")
}

/// Builds a coordinator that archives into memory
fn create_coordinator(config: Config) -> (Coordinator, Arc<NullRecordWriter>) {
    let writer = Arc::new(NullRecordWriter::new());
    let options = CrawlOptions {
        writer: Some(writer.clone()),
        ..Default::default()
    };
    let coordinator = Coordinator::new(config, options).unwrap();
    (coordinator, writer)
}

async fn crawl(coordinator: Coordinator, seeds: Seeds) -> CrawlSummary {
    coordinator.seed(&seeds).await.unwrap();
    tokio::time::timeout(CRAWL_DEADLINE, coordinator.run())
        .await
        .expect("crawl did not finish in time")
        .unwrap()
}

fn seed(server: &MockServer, path: &str) -> Seeds {
    Seeds::Urls(vec![format!("{}{}", server.uri(), path)])
}

#[tokio::test]
async fn test_seed_with_outlink_and_asset() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(format!(
            r#"<html><body>
            <a href="{}/page1">Page 1</a>
            <img src="/logo.png">
            </body></html>"#,
            base
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(html(r#"<a href="/page2">beyond max hops</a>"#.to_string()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (coordinator, writer) = create_coordinator(create_test_config(&dir));
    let summary = crawl(coordinator, seed(&server, "/")).await;

    let mut urls = writer.urls();
    urls.sort();
    assert_eq!(
        urls,
        vec![
            format!("{}/", base),
            format!("{}/logo.png", base),
            format!("{}/page1", base),
        ]
    );
    assert_eq!(summary.counters.archived, 3);
    assert_eq!(summary.counters.outlinks, 1);
    assert_eq!(summary.counters.assets, 1);
    assert_eq!(summary.detached_workers, 0);
}

#[tokio::test]
async fn test_redirect_chain_is_followed() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/b"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html("<p>final</p>".to_string()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (coordinator, writer) = create_coordinator(create_test_config(&dir));
    let summary = crawl(coordinator, seed(&server, "/a")).await;

    let records = writer.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].url, format!("{}/a", base));
    assert_eq!(records[0].status, 301);
    assert_eq!(records[1].url, format!("{}/b", base));
    assert_eq!(records[1].status, 200);
    assert_eq!(summary.counters.redirects, 1);
}

#[tokio::test]
async fn test_redirect_to_seen_url_is_not_refetched() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(format!(
            r#"<a href="{0}/a">a</a><a href="{0}/c">c</a>"#,
            base
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html("<p>a</p>".to_string()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/c"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/a"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (coordinator, writer) = create_coordinator(create_test_config(&dir));
    crawl(coordinator, seed(&server, "/")).await;

    let urls = writer.urls();
    let a = format!("{}/a", base);
    assert_eq!(urls.iter().filter(|u| **u == a).count(), 1);
    assert!(urls.contains(&format!("{}/c", base)));
}

#[tokio::test]
async fn test_too_many_requests_then_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<p>ok</p>".to_string()))
        .with_priority(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (coordinator, writer) = create_coordinator(create_test_config(&dir));
    let limiter = Arc::clone(coordinator.limiter());
    coordinator.seed(&seed(&server, "/")).await.unwrap();

    let probe = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        limiter.snapshot("127.0.0.1")
    });

    let started = Instant::now();
    let summary = tokio::time::timeout(CRAWL_DEADLINE, coordinator.run())
        .await
        .unwrap()
        .unwrap();
    let fetched_after = started.elapsed();

    let snapshot = probe.await.unwrap().expect("bucket for the mock host");
    assert!(snapshot.failures >= 1);
    assert!(snapshot.tokens < 1.0);
    assert!(snapshot.penalty_remaining.is_some());

    assert!(fetched_after >= Duration::from_secs(2));
    assert_eq!(summary.counters.retried, 1);
    let records = writer.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, 200);
}

#[tokio::test]
async fn test_sitemap_urls_become_outlinks() {
    let server = MockServer::start().await;
    let base = server.uri();

    let sitemap = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
        <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
            <url><loc>{0}/p1</loc></url>
            <url><loc>{0}/p2</loc></url>
        </urlset>"#,
        base
    );
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sitemap.into_bytes(), "application/xml"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/p1"))
        .respond_with(html("<p>1</p>".to_string()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/p2"))
        .respond_with(html("<p>2</p>".to_string()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (coordinator, writer) = create_coordinator(create_test_config(&dir));
    let summary = crawl(coordinator, seed(&server, "/sitemap.xml")).await;

    assert_eq!(writer.records().len(), 3);
    assert_eq!(summary.counters.outlinks, 2);
    assert_eq!(summary.counters.assets, 0);
}

#[tokio::test]
async fn test_resumed_job_crawls_leftover_queue() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/left"))
        .respond_with(html("<p>left</p>".to_string()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    {
        let (coordinator, _) = create_coordinator(create_test_config(&dir));
        coordinator.seed(&seed(&server, "/left")).await.unwrap();
        // Dropped before running: the item stays in the queue
    }

    let (coordinator, writer) = create_coordinator(create_test_config(&dir));
    assert_eq!(coordinator.queue().len(), 1);
    let summary = crawl(coordinator, Seeds::Urls(Vec::new())).await;

    assert_eq!(writer.urls(), vec![format!("{}/left", server.uri())]);
    assert_eq!(summary.counters.crawled, 1);
}
