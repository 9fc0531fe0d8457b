//! Queue statistics
//!
//! Kept under their own lock, separate from the data path. Persisted to
//! `queue.stats` at close and consumed (then deleted) at the next open.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const STATS_FILE: &str = "queue.stats";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_elements: u64,
    pub unique_hosts: u64,
    pub elements_per_host: BTreeMap<String, u64>,
    pub enqueued_count: u64,
    pub dequeued_count: u64,
    pub first_enqueue_time: Option<DateTime<Utc>>,
    pub last_enqueue_time: Option<DateTime<Utc>>,
    pub first_dequeue_time: Option<DateTime<Utc>>,
    pub last_dequeue_time: Option<DateTime<Utc>>,
}

impl QueueStats {
    pub(crate) fn record_enqueue(&mut self, host: &str) {
        let now = Utc::now();
        let count = self.elements_per_host.entry(host.to_string()).or_insert(0);
        if *count == 0 {
            self.unique_hosts += 1;
        }
        *count += 1;
        self.total_elements += 1;
        self.enqueued_count += 1;
        self.first_enqueue_time.get_or_insert(now);
        self.last_enqueue_time = Some(now);
    }

    pub(crate) fn record_dequeue(&mut self, host: &str) {
        let now = Utc::now();
        if let Some(count) = self.elements_per_host.get_mut(host) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.elements_per_host.remove(host);
                self.unique_hosts = self.unique_hosts.saturating_sub(1);
            }
        }
        self.total_elements = self.total_elements.saturating_sub(1);
        self.dequeued_count += 1;
        self.first_dequeue_time.get_or_insert(now);
        self.last_dequeue_time = Some(now);
    }

    /// Replaces the element counters with the recovered index contents
    ///
    /// Lifetime counters and timestamps are kept.
    pub(crate) fn reset_elements<'a>(&mut self, hosts: impl Iterator<Item = (&'a str, usize)>) {
        self.elements_per_host = hosts
            .map(|(host, count)| (host.to_string(), count as u64))
            .collect();
        self.unique_hosts = self.elements_per_host.len() as u64;
        self.total_elements = self.elements_per_host.values().sum();
    }

    /// Reads persisted stats, if the file exists
    pub fn load(path: &Path) -> std::io::Result<Option<Self>> {
        match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, bytes)
    }

    /// The `n` hosts with the most queued elements
    pub fn top_hosts(&self, n: usize) -> Vec<(&str, u64)> {
        let mut hosts: Vec<(&str, u64)> = self
            .elements_per_host
            .iter()
            .map(|(h, c)| (h.as_str(), *c))
            .collect();
        hosts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        hosts.truncate(n);
        hosts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_enqueue_dequeue_counters() {
        let mut stats = QueueStats::default();
        stats.record_enqueue("a");
        stats.record_enqueue("a");
        stats.record_enqueue("b");
        assert_eq!(stats.total_elements, 3);
        assert_eq!(stats.unique_hosts, 2);

        stats.record_dequeue("b");
        assert_eq!(stats.unique_hosts, 1);
        assert_eq!(stats.elements_per_host.get("a"), Some(&2));
        assert_eq!(stats.enqueued_count, 3);
        assert_eq!(stats.dequeued_count, 1);
        assert!(stats.first_dequeue_time.is_some());
        assert!(stats.first_enqueue_time <= stats.last_enqueue_time);
    }

    #[test]
    fn test_reset_elements() {
        let mut stats = QueueStats::default();
        stats.record_enqueue("gone");
        stats.reset_elements(vec![("a", 2usize), ("b", 1)].into_iter());
        assert_eq!(stats.total_elements, 3);
        assert_eq!(stats.unique_hosts, 2);
        assert_eq!(stats.enqueued_count, 1);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(STATS_FILE);
        assert!(QueueStats::load(&path).unwrap().is_none());

        let mut stats = QueueStats::default();
        stats.record_enqueue("a");
        stats.save(&path).unwrap();
        assert_eq!(QueueStats::load(&path).unwrap(), Some(stats));
    }

    #[test]
    fn test_top_hosts() {
        let mut stats = QueueStats::default();
        for _ in 0..3 {
            stats.record_enqueue("big");
        }
        stats.record_enqueue("small");
        stats.record_enqueue("also-small");
        assert_eq!(stats.top_hosts(2), vec![("big", 3), ("also-small", 1)]);
    }
}
