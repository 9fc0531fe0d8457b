//! URL handling module for Sumi-Archiver
//!
//! This module provides URL normalization, fingerprinting, host extraction,
//! registrable-domain computation, wildcard matching and the scope filter
//! applied to every discovered URL.

mod domain;
mod matcher;
mod normalize;

use crate::config::ScopeConfig;
use url::Url;

// Re-export main functions
pub use domain::{extract_host, registrable_domain, same_registrable_domain};
pub use matcher::{matches_any, matches_wildcard};
pub use normalize::{fingerprint, fingerprint_str, normalize_url, resolve_url};

/// Outcome of running a URL through the scope filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterVerdict {
    /// URL is in scope
    Allowed,
    /// Host matches an excluded-host pattern
    ExcludedHost,
    /// URL contains an excluded substring
    ExcludedString,
    /// Included hosts are configured and the host matches none of them
    NotIncludedHost,
    /// Included substrings are configured and the URL contains none of them
    NotIncludedString,
    /// URL has no host
    NoHost,
}

impl FilterVerdict {
    /// Returns true if the URL should be crawled
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::ExcludedHost => "excluded_host",
            Self::ExcludedString => "excluded_string",
            Self::NotIncludedHost => "not_included_host",
            Self::NotIncludedString => "not_included_string",
            Self::NoHost => "no_host",
        }
    }
}

/// Inclusion and exclusion rules applied to discovered and dequeued URLs
///
/// Checks run in this order:
/// 1. Excluded hosts
/// 2. Excluded substrings
/// 3. Included hosts (only when configured)
/// 4. Included substrings (only when configured)
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    excluded_hosts: Vec<String>,
    included_hosts: Vec<String>,
    excluded_strings: Vec<String>,
    included_strings: Vec<String>,
}

impl UrlFilter {
    /// Builds a filter from the `[scope]` section of the configuration
    pub fn from_scope(scope: &ScopeConfig) -> Self {
        Self {
            excluded_hosts: lowercase_all(&scope.excluded_hosts),
            included_hosts: lowercase_all(&scope.included_hosts),
            excluded_strings: scope.excluded_strings.clone(),
            included_strings: scope.included_strings.clone(),
        }
    }

    /// Classifies a URL against the filter
    ///
    /// # Examples
    ///
    /// ```
    /// use sumi_archiver::config::ScopeConfig;
    /// use sumi_archiver::url::{FilterVerdict, UrlFilter};
    /// use url::Url;
    ///
    /// let scope = ScopeConfig {
    ///     excluded_hosts: vec!["*.ads.example".to_string()],
    ///     ..Default::default()
    /// };
    /// let filter = UrlFilter::from_scope(&scope);
    /// let url = Url::parse("http://cdn.ads.example/x.js").unwrap();
    /// assert_eq!(filter.check(&url), FilterVerdict::ExcludedHost);
    /// ```
    pub fn check(&self, url: &Url) -> FilterVerdict {
        let host = match extract_host(url) {
            Some(host) => host,
            None => return FilterVerdict::NoHost,
        };

        if matches_any(&self.excluded_hosts, &host) {
            return FilterVerdict::ExcludedHost;
        }

        let url_str = url.as_str();
        if self.excluded_strings.iter().any(|s| url_str.contains(s.as_str())) {
            return FilterVerdict::ExcludedString;
        }

        if !self.included_hosts.is_empty() && !matches_any(&self.included_hosts, &host) {
            return FilterVerdict::NotIncludedHost;
        }

        if !self.included_strings.is_empty()
            && !self.included_strings.iter().any(|s| url_str.contains(s.as_str()))
        {
            return FilterVerdict::NotIncludedString;
        }

        FilterVerdict::Allowed
    }

    /// Returns true if the URL passes every rule
    pub fn allows(&self, url: &Url) -> bool {
        self.check(url).is_allowed()
    }

    /// Host-only part of the filter, used by workers on dequeue
    pub fn host_allowed(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        if matches_any(&self.excluded_hosts, &host) {
            return false;
        }
        self.included_hosts.is_empty() || matches_any(&self.included_hosts, &host)
    }
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.to_lowercase()).collect()
}
