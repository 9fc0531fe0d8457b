//! Per-host adaptive rate limiting
//!
//! Each host gets a token bucket that slows down on throttling and server
//! errors and recovers on success. The [`RateLimiter`] owns the buckets,
//! bounds their number with LFU eviction and sweeps idle ones.

mod bucket;
mod manager;

pub use bucket::{BucketConfig, BucketSnapshot, StatusClass, TokenBucket};
pub use manager::RateLimiter;
