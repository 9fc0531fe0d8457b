//! RFC 5988 `Link` response headers

use crate::url::resolve_url;
use url::Url;

/// Parses every target of a `Link` header value
///
/// `<https://a.example/2>; rel="next", </style.css>; rel="preload"` yields
/// both URLs, resolved against `base`.
pub fn parse_link_header(value: &str, base: &Url) -> Vec<Url> {
    let mut urls = Vec::new();
    let mut rest = value;

    while let Some(open) = rest.find('<') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('>') else {
            break;
        };
        if let Ok(url) = resolve_url(base, after[..close].trim()) {
            urls.push(url);
        }
        rest = &after[close + 1..];
    }

    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiple_links() {
        let base = Url::parse("http://a.example/page").unwrap();
        let urls: Vec<String> = parse_link_header(
            r#"<https://a.example/2>; rel="next", </style.css>; rel="preload"; as="style""#,
            &base,
        )
        .into_iter()
        .map(|u| u.to_string())
        .collect();
        assert_eq!(urls, vec!["https://a.example/2", "http://a.example/style.css"]);
    }

    #[test]
    fn test_malformed() {
        let base = Url::parse("http://a.example/").unwrap();
        assert!(parse_link_header("no brackets here", &base).is_empty());
        assert!(parse_link_header("<unterminated", &base).is_empty());
    }
}
