//! Discard hooks
//!
//! A response may be dropped instead of archived. Challenge pages are
//! retried like bad statuses; the other reasons are terminal.

use crate::config::CrawlerConfig;
use reqwest::header::{HeaderMap, CONTENT_LENGTH};
use std::fmt;

/// Why a response was not archived
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    /// Bot-challenge page served by the named vendor
    Challenge(&'static str),
    /// Status listed in `warc-discard-status`
    Status(u16),
    /// Body longer than `max-content-length-mib`
    TooLarge(u64),
}

impl DiscardReason {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Challenge(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Challenge(_) => "challenge",
            Self::Status(_) => "discard_status",
            Self::TooLarge(_) => "too_large",
        }
    }
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Challenge(vendor) => write!(f, "{} challenge page", vendor),
            Self::Status(status) => write!(f, "discarded status {}", status),
            Self::TooLarge(len) => write!(f, "content length {} over limit", len),
        }
    }
}

/// Decides from headers and body size whether a response is discarded
#[derive(Debug, Clone, Default)]
pub struct DiscardPolicy {
    discard_status: Vec<u16>,
    max_content_length: Option<u64>,
}

impl DiscardPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            discard_status: config.warc_discard_status.clone(),
            max_content_length: config.max_content_length(),
        }
    }

    /// Checks the status line and headers, before the body is read
    pub fn check(&self, status: u16, headers: &HeaderMap) -> Option<DiscardReason> {
        if let Some(vendor) = challenge_vendor(status, headers) {
            return Some(DiscardReason::Challenge(vendor));
        }
        if self.discard_status.contains(&status) {
            return Some(DiscardReason::Status(status));
        }
        let declared = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        declared.and_then(|len| self.check_length(len))
    }

    /// Checks a body length; a length equal to the ceiling is accepted
    pub fn check_length(&self, len: u64) -> Option<DiscardReason> {
        match self.max_content_length {
            Some(max) if len > max => Some(DiscardReason::TooLarge(len)),
            _ => None,
        }
    }
}

fn header_is(headers: &HeaderMap, name: &str, values: &[&str]) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| values.iter().any(|x| v.eq_ignore_ascii_case(x)))
}

fn challenge_vendor(status: u16, headers: &HeaderMap) -> Option<&'static str> {
    if header_is(headers, "cf-mitigated", &["challenge"]) {
        return Some("cloudflare");
    }
    if header_is(headers, "x-amzn-waf-action", &["challenge", "captcha"]) {
        return Some("aws-waf");
    }
    if status == 403 && headers.contains_key("x-datadome") {
        return Some("datadome");
    }
    None
}
