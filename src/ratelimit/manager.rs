use super::bucket::{BucketConfig, BucketSnapshot, TokenBucket};
use crate::config::RateLimitSettings;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Interval between two token checks while waiting
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Per-host rate limiter
///
/// Owns one [`TokenBucket`] per host. Lookups take the map lock only long
/// enough to clone the bucket handle; bucket state has its own lock.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Arc<TokenBucket>>>,
    config: BucketConfig,
    max_buckets: usize,
    idle_threshold: Duration,
    cleanup_frequency: Duration,
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            config: BucketConfig::from(settings),
            max_buckets: settings.max_buckets.max(1),
            idle_threshold: Duration::from_secs(settings.idle_threshold_secs),
            cleanup_frequency: Duration::from_secs(settings.cleanup_frequency.max(1)),
        }
    }

    /// Returns the bucket of a host, creating it if needed
    ///
    /// Creating a bucket when the map is full evicts the least frequently
    /// used one first.
    pub fn bucket(&self, host: &str) -> Arc<TokenBucket> {
        let mut buckets = self.buckets.lock().unwrap_or_else(|p| p.into_inner());

        if let Some(bucket) = buckets.get(host) {
            bucket.touch();
            return Arc::clone(bucket);
        }

        if buckets.len() >= self.max_buckets {
            let victim = buckets
                .iter()
                .min_by_key(|(_, bucket)| bucket.usage())
                .map(|(host, _)| host.clone());
            if let Some(victim) = victim {
                debug!(host = %victim, "Evicting least used rate-limit bucket");
                buckets.remove(&victim);
            }
        }

        let bucket = Arc::new(TokenBucket::new(self.config.clone()));
        bucket.touch();
        buckets.insert(host.to_string(), Arc::clone(&bucket));
        bucket
    }

    /// Blocks until a token is granted for `host`
    ///
    /// # Returns
    ///
    /// * `true` - A token was taken
    /// * `false` - `cancel` fired first
    pub async fn wait(&self, host: &str, cancel: &CancellationToken) -> bool {
        let bucket = self.bucket(host);
        loop {
            if bucket.try_acquire() {
                return true;
            }
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
    }

    /// Feeds a response status back into the host's bucket
    pub fn on_response(&self, host: &str, status: u16) {
        let bucket = {
            let buckets = self.buckets.lock().unwrap_or_else(|p| p.into_inner());
            buckets.get(host).cloned()
        };
        match bucket {
            Some(bucket) => bucket.on_status(status),
            None => self.bucket(host).on_status(status),
        }
    }

    pub fn snapshot(&self, host: &str) -> Option<BucketSnapshot> {
        let bucket = self
            .buckets
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(host)
            .cloned();
        bucket.map(|bucket| bucket.snapshot())
    }

    pub fn len(&self) -> usize {
        self.buckets.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops buckets not accessed within the idle threshold
    ///
    /// Bucket state locks are never taken here. Returns the number of
    /// buckets removed.
    pub fn cleanup_idle(&self, now: Instant) -> usize {
        let mut buckets = self.buckets.lock().unwrap_or_else(|p| p.into_inner());
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            now.saturating_duration_since(bucket.last_access()) <= self.idle_threshold
        });
        before - buckets.len()
    }

    pub fn clear(&self) {
        self.buckets.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    /// Starts the idle-bucket sweeper
    ///
    /// When `cancel` fires the task stops and every bucket is released.
    pub fn spawn_cleanup(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(limiter.cleanup_frequency);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = limiter.cleanup_idle(Instant::now());
                        if removed > 0 {
                            debug!(removed, remaining = limiter.len(), "Removed idle rate-limit buckets");
                        }
                    }
                }
            }
            limiter.clear();
            info!("Rate limiter stopped");
        })
    }
}
