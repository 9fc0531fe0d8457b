//! Crash-recovery tests for the persistent grouped queue

use std::collections::HashMap;
use std::time::Duration;
use sumi_archiver::queue::{QueueError, QueueOptions};
use sumi_archiver::{Item, PersistentGroupedQueue};
use tempfile::TempDir;

const HOSTS: [&str; 3] = ["alpha.example", "beta.example", "gamma.example"];

fn create_test_options() -> QueueOptions {
    QueueOptions {
        dump_interval: Duration::from_secs(3600),
        sync_max_wait: Duration::from_millis(5),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_unclean_shutdown_loses_nothing() {
    let dir = TempDir::new().unwrap();
    let mut expected: HashMap<String, Vec<String>> = HashMap::new();

    {
        let queue = PersistentGroupedQueue::open(dir.path(), create_test_options()).unwrap();
        for batch in 0..10 {
            let items: Vec<Item> = (0..100)
                .map(|i| {
                    let n = batch * 100 + i;
                    let host = HOSTS[n % HOSTS.len()];
                    let url = format!("http://{}/page/{}", host, n);
                    expected.entry(host.to_string()).or_default().push(url.clone());
                    Item::seed(&url).unwrap()
                })
                .collect();
            queue.enqueue(items).await.unwrap();
        }
        assert_eq!(queue.len(), 1000);
        // Dropped without close: recovery relies on the WAL alone
    }

    let queue = PersistentGroupedQueue::open(dir.path(), create_test_options()).unwrap();
    assert_eq!(queue.len(), 1000);
    assert_eq!(queue.host_count(), 3);
    assert_eq!(
        std::fs::metadata(dir.path().join("index_wal")).unwrap().len(),
        0
    );

    let mut dequeued: HashMap<String, Vec<String>> = HashMap::new();
    loop {
        match queue.dequeue() {
            Ok(item) => {
                let host = item.host().unwrap();
                dequeued.entry(host).or_default().push(item.url);
            }
            Err(QueueError::Empty) => break,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(dequeued.values().map(Vec::len).sum::<usize>(), 1000);
    for host in HOSTS {
        assert_eq!(dequeued[host], expected[host], "per-host order of {}", host);
    }
    queue.close().unwrap();
}

#[tokio::test]
async fn test_clean_close_persists_stats() {
    let dir = TempDir::new().unwrap();
    {
        let queue = PersistentGroupedQueue::open(dir.path(), create_test_options()).unwrap();
        queue
            .enqueue(vec![
                Item::seed("http://alpha.example/1").unwrap(),
                Item::seed("http://beta.example/1").unwrap(),
            ])
            .await
            .unwrap();
        queue.dequeue().unwrap();
        queue.close().unwrap();
    }

    let inspection = sumi_archiver::queue::inspect(dir.path()).unwrap();
    assert_eq!(inspection.elements, 1);
    assert_eq!(inspection.hosts, 1);
    let stats = inspection.stats.expect("stats written at close");
    assert_eq!(stats.enqueued_count, 2);
    assert_eq!(stats.dequeued_count, 1);
    assert!(inspection.meta.is_some());
}
