/// Checks if a host matches a wildcard pattern
///
/// This function supports two types of patterns:
/// 1. Exact match: "example.com" matches only "example.com"
/// 2. Wildcard match: "*.example.com" matches:
///    - "example.com" (the bare domain)
///    - "blog.example.com" (single subdomain)
///    - "api.v2.example.com" (nested subdomains)
///
/// # Examples
///
/// ```
/// use sumi_archiver::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "example.com"));
/// assert!(!matches_wildcard("example.com", "other.com"));
///
/// assert!(matches_wildcard("*.example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "api.v2.example.com"));
/// assert!(!matches_wildcard("*.example.com", "example.org"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base
            || (candidate.len() > base.len()
                && candidate.ends_with(base)
                && candidate.as_bytes()[candidate.len() - base.len() - 1] == b'.')
    } else {
        candidate == pattern
    }
}

/// Returns true if the host matches any of the patterns
pub fn matches_any<S: AsRef<str>>(patterns: &[S], candidate: &str) -> bool {
    patterns
        .iter()
        .any(|pattern| matches_wildcard(pattern.as_ref(), candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(matches_wildcard("example.com", "example.com"));
        assert!(matches_wildcard("blog.example.com", "blog.example.com"));
    }

    #[test]
    fn test_exact_no_match() {
        assert!(!matches_wildcard("example.com", "other.com"));
        assert!(!matches_wildcard("example.com", "blog.example.com"));
        assert!(!matches_wildcard("blog.example.com", "example.com"));
    }

    #[test]
    fn test_wildcard_matches_bare_domain() {
        assert!(matches_wildcard("*.example.com", "example.com"));
    }

    #[test]
    fn test_wildcard_matches_nested_subdomains() {
        assert!(matches_wildcard("*.example.com", "blog.example.com"));
        assert!(matches_wildcard("*.example.com", "deep.nested.sub.example.com"));
    }

    #[test]
    fn test_wildcard_no_match_partial() {
        assert!(!matches_wildcard("*.example.com", "myexample.com"));
        assert!(!matches_wildcard("*.example.com", "example.com.org"));
        assert!(!matches_wildcard("*.example.com", ""));
    }

    #[test]
    fn test_matches_any() {
        let patterns = vec!["*.ads.example".to_string(), "tracker.example".to_string()];
        assert!(matches_any(&patterns, "cdn.ads.example"));
        assert!(matches_any(&patterns, "tracker.example"));
        assert!(!matches_any(&patterns, "www.tracker.example"));
        assert!(!matches_any::<String>(&[], "anything.example"));
    }
}
