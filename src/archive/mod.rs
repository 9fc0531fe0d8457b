//! Archival record writer interface
//!
//! The fetcher hands every HTTP exchange to a [`RecordWriter`]. The writer
//! owns the body stream from that point on and must consume it fully.
//!
//! Two writers are provided:
//! - [`FileRecordWriter`] stores each exchange under `<job>/warcs/` as a
//!   JSON header file plus the raw body, with a SHA-256 payload digest
//! - [`NullRecordWriter`] drains bodies and keeps the headers in memory,
//!   for tests and dry runs

mod file;
mod null;

pub use file::FileRecordWriter;
pub use null::NullRecordWriter;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::io::Read;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while writing records
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record writer is closed")]
    Closed,
}

/// Result type for archive operations
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// One request/response pair, without its body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRecord {
    /// Record identifier, also the file stem under `warcs/`
    pub id: String,

    /// ID of the item the request was made for
    pub item_id: String,

    pub url: String,
    pub method: String,
    pub status: u16,
    pub request_headers: Vec<(String, String)>,
    pub response_headers: Vec<(String, String)>,
    pub fetched_at: DateTime<Utc>,
}

impl ExchangeRecord {
    pub fn new(
        item_id: &str,
        url: &str,
        status: u16,
        request_headers: &HeaderMap,
        response_headers: &HeaderMap,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            item_id: item_id.to_string(),
            url: url.to_string(),
            method: "GET".to_string(),
            status,
            request_headers: header_pairs(request_headers),
            response_headers: header_pairs(response_headers),
            fetched_at: Utc::now(),
        }
    }
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Consumer of HTTP exchanges
///
/// `write` is blocking; async callers run it on the blocking pool.
pub trait RecordWriter: Send + Sync {
    /// Writes one exchange, consuming `body` to its end
    ///
    /// # Returns
    ///
    /// * `Ok(u64)` - Number of body bytes written
    /// * `Err(ArchiveError)` - The record could not be written
    fn write(&self, record: &ExchangeRecord, body: &mut dyn Read) -> ArchiveResult<u64>;

    /// Number of records currently being written
    fn backlog(&self) -> usize;

    /// Rejects further writes
    fn close(&self) -> ArchiveResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, CONTENT_TYPE, USER_AGENT};

    #[test]
    fn test_record_headers() {
        let mut req = HeaderMap::new();
        req.insert(USER_AGENT, HeaderValue::from_static("test"));
        let mut resp = HeaderMap::new();
        resp.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));

        let record = ExchangeRecord::new("item-1", "http://a.example/", 200, &req, &resp);
        assert_eq!(record.method, "GET");
        assert_eq!(
            record.request_headers,
            vec![("user-agent".to_string(), "test".to_string())]
        );
        assert_eq!(
            record.response_headers,
            vec![("content-type".to_string(), "text/html".to_string())]
        );
        assert!(!record.id.is_empty());
    }
}
