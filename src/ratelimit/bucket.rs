use crate::config::RateLimitSettings;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Parameters shared by every bucket of a limiter
#[derive(Debug, Clone, PartialEq)]
pub struct BucketConfig {
    pub capacity: f64,
    pub ideal_rate: f64,
    pub min_rate: f64,
    pub recovery_factor: f64,
    pub base_penalty: Duration,
    pub max_penalty: Duration,
}

impl From<&RateLimitSettings> for BucketConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            capacity: settings.capacity,
            ideal_rate: settings.refill_rate,
            min_rate: settings.min_refill_rate.min(settings.refill_rate),
            recovery_factor: settings.recovery_factor,
            base_penalty: Duration::from_millis(settings.base_penalty_ms),
            max_penalty: Duration::from_millis(settings.max_penalty_ms),
        }
    }
}

/// How a response status feeds back into a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx and 3xx
    Success,
    /// 429, 403, 408, 425: the server asks us to back off
    Throttled,
    /// 5xx
    ServerError,
    /// Anything else, no adaptation
    Neutral,
}

impl StatusClass {
    pub fn of(status: u16) -> Self {
        match status {
            429 | 403 | 408 | 425 => Self::Throttled,
            s if s >= 500 => Self::ServerError,
            200..=399 => Self::Success,
            _ => Self::Neutral,
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    rate: f64,
    last_refill: Instant,
    penalty_until: Option<Instant>,
    failures: u32,
}

/// Point-in-time view of a bucket
#[derive(Debug, Clone, PartialEq)]
pub struct BucketSnapshot {
    pub tokens: f64,
    pub refill_rate: f64,
    pub failures: u32,
    pub penalty_remaining: Option<Duration>,
}

/// Adaptive token bucket for a single host
///
/// Tokens refill continuously at the current rate, except while a penalty
/// window is in effect. Throttling statuses open a penalty window that grows
/// exponentially with consecutive failures; server errors halve the refill
/// rate per consecutive failure. Successes move the rate back toward the
/// ideal rate.
#[derive(Debug)]
pub struct TokenBucket {
    config: BucketConfig,
    state: Mutex<BucketState>,
    usage: AtomicU64,
    created: Instant,
    /// Nanoseconds from `created` to the last access, readable without the state lock
    last_access: AtomicU64,
}

impl TokenBucket {
    pub fn new(config: BucketConfig) -> Self {
        Self::new_at(config, Instant::now())
    }

    pub fn new_at(config: BucketConfig, now: Instant) -> Self {
        let state = BucketState {
            tokens: config.capacity,
            rate: config.ideal_rate,
            last_refill: now,
            penalty_until: None,
            failures: 0,
        };
        Self {
            config,
            state: Mutex::new(state),
            usage: AtomicU64::new(0),
            created: now,
            last_access: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let from = match state.penalty_until {
            Some(until) if until > state.last_refill => until,
            _ => state.last_refill,
        };
        if now > from {
            let elapsed = now.duration_since(from).as_secs_f64();
            state.tokens = (state.tokens + elapsed * state.rate).min(self.config.capacity);
        }
        state.last_refill = state.last_refill.max(now);
    }

    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Takes one token if available
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        self.mark_access(now);
        let mut state = self.lock();
        self.refill(&mut state, now);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn on_status(&self, status: u16) {
        self.on_status_at(status, Instant::now())
    }

    /// Adapts the bucket to a response status observed at `now`
    pub fn on_status_at(&self, status: u16, now: Instant) {
        self.mark_access(now);
        let mut state = self.lock();

        match StatusClass::of(status) {
            StatusClass::Throttled => {
                self.refill(&mut state, now);
                state.failures = state.failures.saturating_add(1);
                let factor = 2u32.saturating_pow(state.failures - 1);
                let penalty = self
                    .config
                    .base_penalty
                    .saturating_mul(factor)
                    .min(self.config.max_penalty);
                state.penalty_until = Some(now + penalty);
                state.tokens = 0.0;
            }
            StatusClass::ServerError => {
                self.refill(&mut state, now);
                state.failures = state.failures.saturating_add(1);
                let exponent = i32::try_from(state.failures).unwrap_or(i32::MAX);
                state.rate = (state.rate * 0.5f64.powi(exponent)).max(self.config.min_rate);
                state.tokens = 0.0;
            }
            StatusClass::Success => {
                if matches!(state.penalty_until, Some(until) if until > now) {
                    return;
                }
                self.refill(&mut state, now);
                state.penalty_until = None;
                let gap = self.config.ideal_rate - state.rate;
                state.rate = (state.rate + self.config.recovery_factor * gap)
                    .clamp(self.config.min_rate, self.config.ideal_rate);
                state.failures = state.failures.saturating_sub(1);
            }
            StatusClass::Neutral => {}
        }
    }

    pub fn snapshot(&self) -> BucketSnapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> BucketSnapshot {
        let state = self.lock();
        BucketSnapshot {
            tokens: state.tokens,
            refill_rate: state.rate,
            failures: state.failures,
            penalty_remaining: state
                .penalty_until
                .and_then(|until| until.checked_duration_since(now))
                .filter(|d| !d.is_zero()),
        }
    }

    /// Number of lookups through the manager, for LFU eviction
    pub fn usage(&self) -> u64 {
        self.usage.load(Ordering::Relaxed)
    }

    pub(crate) fn touch(&self) {
        self.usage.fetch_add(1, Ordering::Relaxed);
    }

    fn mark_access(&self, now: Instant) {
        let offset = now.saturating_duration_since(self.created).as_nanos();
        self.last_access
            .store(u64::try_from(offset).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    pub fn last_access(&self) -> Instant {
        self.created + Duration::from_nanos(self.last_access.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> BucketConfig {
        BucketConfig {
            capacity: 2.0,
            ideal_rate: 1.0,
            min_rate: 0.05,
            recovery_factor: 0.5,
            base_penalty: Duration::from_secs(2),
            max_penalty: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_status_classes() {
        assert_eq!(StatusClass::of(200), StatusClass::Success);
        assert_eq!(StatusClass::of(301), StatusClass::Success);
        assert_eq!(StatusClass::of(429), StatusClass::Throttled);
        assert_eq!(StatusClass::of(403), StatusClass::Throttled);
        assert_eq!(StatusClass::of(408), StatusClass::Throttled);
        assert_eq!(StatusClass::of(425), StatusClass::Throttled);
        assert_eq!(StatusClass::of(503), StatusClass::ServerError);
        assert_eq!(StatusClass::of(404), StatusClass::Neutral);
    }

    #[test]
    fn test_burst_then_refill() {
        let t0 = Instant::now();
        let bucket = TokenBucket::new_at(create_test_config(), t0);

        assert!(bucket.try_acquire_at(t0));
        assert!(bucket.try_acquire_at(t0));
        assert!(!bucket.try_acquire_at(t0));

        assert!(!bucket.try_acquire_at(t0 + Duration::from_millis(500)));
        assert!(bucket.try_acquire_at(t0 + Duration::from_millis(1000)));

        // Never exceeds capacity
        let later = t0 + Duration::from_secs(100);
        assert!(bucket.snapshot_at(later).tokens <= 2.0);
        bucket.try_acquire_at(later);
        assert!((bucket.snapshot_at(later).tokens - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_throttle_penalty_grows_and_caps() {
        let t0 = Instant::now();
        let bucket = TokenBucket::new_at(create_test_config(), t0);

        bucket.on_status_at(429, t0);
        let snap = bucket.snapshot_at(t0);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.tokens, 0.0);
        assert_eq!(snap.penalty_remaining, Some(Duration::from_secs(2)));

        bucket.on_status_at(429, t0);
        assert_eq!(
            bucket.snapshot_at(t0).penalty_remaining,
            Some(Duration::from_secs(4))
        );

        for _ in 0..5 {
            bucket.on_status_at(403, t0);
        }
        assert_eq!(
            bucket.snapshot_at(t0).penalty_remaining,
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_no_refill_during_penalty() {
        let t0 = Instant::now();
        let bucket = TokenBucket::new_at(create_test_config(), t0);
        bucket.on_status_at(429, t0);

        assert!(!bucket.try_acquire_at(t0 + Duration::from_millis(1900)));
        // Refill resumes at the end of the window: one token takes one second
        assert!(!bucket.try_acquire_at(t0 + Duration::from_millis(2500)));
        assert!(bucket.try_acquire_at(t0 + Duration::from_millis(3000)));
    }

    #[test]
    fn test_server_errors_slow_down_and_clamp() {
        let t0 = Instant::now();
        let bucket = TokenBucket::new_at(create_test_config(), t0);

        bucket.on_status_at(500, t0);
        assert!((bucket.snapshot_at(t0).refill_rate - 0.5).abs() < 1e-9);
        bucket.on_status_at(502, t0);
        assert!((bucket.snapshot_at(t0).refill_rate - 0.125).abs() < 1e-9);
        bucket.on_status_at(503, t0);
        assert!((bucket.snapshot_at(t0).refill_rate - 0.05).abs() < 1e-9);
        assert_eq!(bucket.snapshot_at(t0).tokens, 0.0);
    }

    #[test]
    fn test_success_recovers_toward_ideal() {
        let t0 = Instant::now();
        let bucket = TokenBucket::new_at(create_test_config(), t0);
        bucket.on_status_at(500, t0);
        bucket.on_status_at(200, t0);

        let snap = bucket.snapshot_at(t0);
        assert!((snap.refill_rate - 0.75).abs() < 1e-9);
        assert_eq!(snap.failures, 0);

        for _ in 0..100 {
            bucket.on_status_at(200, t0);
        }
        let snap = bucket.snapshot_at(t0);
        assert!(snap.refill_rate <= 1.0);
        assert!(snap.refill_rate >= 0.05);
    }

    #[test]
    fn test_success_ignored_during_penalty() {
        let t0 = Instant::now();
        let bucket = TokenBucket::new_at(create_test_config(), t0);
        bucket.on_status_at(429, t0);
        bucket.on_status_at(200, t0 + Duration::from_secs(1));
        assert_eq!(bucket.snapshot_at(t0).failures, 1);

        bucket.on_status_at(200, t0 + Duration::from_secs(3));
        let snap = bucket.snapshot_at(t0 + Duration::from_secs(3));
        assert_eq!(snap.failures, 0);
        assert!(snap.penalty_remaining.is_none());
    }

    #[test]
    fn test_neutral_status_changes_nothing() {
        let t0 = Instant::now();
        let bucket = TokenBucket::new_at(create_test_config(), t0);
        let before = bucket.snapshot_at(t0);
        bucket.on_status_at(404, t0);
        assert_eq!(bucket.snapshot_at(t0), before);
    }

    #[test]
    fn test_last_access_readable_while_state_locked() {
        let t0 = Instant::now();
        let bucket = TokenBucket::new_at(create_test_config(), t0);
        assert_eq!(bucket.last_access(), t0);

        bucket.try_acquire_at(t0 + Duration::from_secs(3));
        let _state = bucket.lock();
        assert_eq!(bucket.last_access(), t0 + Duration::from_secs(3));
    }
}
