use crate::UrlError;
use sha2::{Digest, Sha256};
use url::Url;

/// Schemes that never lead to a fetchable resource
const IGNORED_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:", "about:", "blob:"];

/// Normalizes a URL according to Sumi-Archiver's normalization rules
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject schemes other than `http` and `https`
/// 3. Require a host; the host is lowercased and punycoded, IPv6 literals keep their brackets
/// 4. Percent-encode path and query (handled by the parser)
/// 5. Strip the fragment
///
/// Normalization is idempotent: `normalize(normalize(u)) == normalize(u)`.
///
/// # Examples
///
/// ```
/// use sumi_archiver::url::normalize_url;
///
/// let url = normalize_url("http://WWW.Example.COM/a b#top").unwrap();
/// assert_eq!(url.as_str(), "http://www.example.com/a%20b");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_parsed(url)
}

/// Resolves a (possibly relative) reference against a base URL and normalizes it
///
/// Returns an error for empty references, fragment-only references and
/// references using a non-fetchable scheme such as `javascript:` or `mailto:`.
pub fn resolve_url(base: &Url, href: &str) -> Result<Url, UrlError> {
    let href = href.trim();

    if href.is_empty() {
        return Err(UrlError::Malformed("empty reference".to_string()));
    }

    if href.starts_with('#') {
        return Err(UrlError::Malformed("fragment-only reference".to_string()));
    }

    let lowered = href.to_ascii_lowercase();
    if let Some(scheme) = IGNORED_SCHEMES.iter().find(|s| lowered.starts_with(*s)) {
        return Err(UrlError::InvalidScheme(scheme.trim_end_matches(':').to_string()));
    }

    let url = base
        .join(href)
        .map_err(|e| UrlError::Parse(format!("{}: {}", href, e)))?;
    normalize_parsed(url)
}

fn normalize_parsed(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::MissingHost),
    }

    url.set_fragment(None);
    Ok(url)
}

/// Computes the 64-bit fingerprint of a normalized URL
///
/// The fingerprint is the first eight bytes (big endian) of the SHA-256 of
/// the URL string.
pub fn fingerprint(url: &Url) -> u64 {
    fingerprint_str(url.as_str())
}

/// Computes the fingerprint of an already-normalized URL string
pub fn fingerprint_str(url: &str) -> u64 {
    let digest = Sha256::digest(url.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fragment() {
        let result = normalize_url("https://example.com/page#section").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_lowercase_host_keeps_path_case() {
        let result = normalize_url("https://EXAMPLE.COM/Page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/Page");
    }

    #[test]
    fn test_http_is_kept() {
        let result = normalize_url("http://a.example").unwrap();
        assert_eq!(result.as_str(), "http://a.example/");
    }

    #[test]
    fn test_punycode_host() {
        let result = normalize_url("http://bücher.example/katalog").unwrap();
        assert_eq!(result.as_str(), "http://xn--bcher-kva.example/katalog");
    }

    #[test]
    fn test_ipv6_brackets_preserved() {
        let result = normalize_url("http://[::1]:8080/x").unwrap();
        assert_eq!(result.host_str(), Some("[::1]"));
        assert_eq!(result.as_str(), "http://[::1]:8080/x");
    }

    #[test]
    fn test_percent_encoding() {
        let result = normalize_url("https://example.com/a b?q=c d").unwrap();
        assert_eq!(result.as_str(), "https://example.com/a%20b?q=c%20d");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize_url("ftp://example.com/page");
        assert!(matches!(result.unwrap_err(), UrlError::InvalidScheme(_)));
    }

    #[test]
    fn test_malformed_url() {
        assert!(normalize_url("not a url").is_err());
    }

    #[test]
    fn test_idempotence() {
        let inputs = [
            "http://WWW.Example.COM/a b#top",
            "https://example.com/%7Efoo/./bar/../baz?x=1&y=%41",
            "http://bücher.example/ä?ö=ü",
            "http://[::1]/path",
            "https://example.com/?q=a|b",
        ];
        for input in inputs {
            let once = normalize_url(input).unwrap();
            let twice = normalize_url(once.as_str()).unwrap();
            assert_eq!(once, twice, "normalization is not idempotent for {}", input);
        }
    }

    #[test]
    fn test_resolve_relative() {
        let base = Url::parse("http://a.example/dir/page.html").unwrap();
        assert_eq!(
            resolve_url(&base, "/b").unwrap().as_str(),
            "http://a.example/b"
        );
        assert_eq!(
            resolve_url(&base, "other.html#frag").unwrap().as_str(),
            "http://a.example/dir/other.html"
        );
        assert_eq!(
            resolve_url(&base, "//cdn.example/x.js").unwrap().as_str(),
            "http://cdn.example/x.js"
        );
    }

    #[test]
    fn test_resolve_rejects_special_references() {
        let base = Url::parse("http://a.example/").unwrap();
        assert!(resolve_url(&base, "").is_err());
        assert!(resolve_url(&base, "#top").is_err());
        assert!(resolve_url(&base, "javascript:void(0)").is_err());
        assert!(resolve_url(&base, "MAILTO:someone@example.com").is_err());
        assert!(resolve_url(&base, "data:image/png;base64,AAAA").is_err());
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = normalize_url("http://a.example/x").unwrap();
        let b = normalize_url("http://A.EXAMPLE/x#frag").unwrap();
        let c = normalize_url("http://a.example/y").unwrap();
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&c));
        assert_eq!(fingerprint(&a), fingerprint_str("http://a.example/x"));
    }
}
