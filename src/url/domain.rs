use std::net::IpAddr;
use url::Url;

/// Second-level suffixes shared by unrelated owners
///
/// When the last two labels of a host are one of these, the full host is
/// used as the registrable domain instead.
const SHARED_SUFFIXES: &[&str] = &[
    "blogspot.com",
    "wordpress.com",
    "tumblr.com",
    "github.io",
    "gitlab.io",
    "herokuapp.com",
    "netlify.app",
    "vercel.app",
    "pages.dev",
    "web.app",
    "firebaseapp.com",
    "appspot.com",
    "azurewebsites.net",
    "cloudfront.net",
    "amazonaws.com",
    "substack.com",
    "wixsite.com",
    "weebly.com",
    "neocities.org",
    "co.uk",
    "org.uk",
    "ac.uk",
    "gov.uk",
    "com.au",
    "net.au",
    "org.au",
    "co.jp",
    "ne.jp",
    "or.jp",
    "com.br",
    "com.cn",
    "co.nz",
    "co.in",
    "co.za",
];

/// Extracts the host from a URL
///
/// The host is already lowercased by the URL parser. IPv6 literals keep their brackets.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_archiver::url::extract_host;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_host(&url), Some("example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the registrable domain of a host
///
/// This is the last two labels of the host, except for IP addresses and
/// shared-hosting suffixes, where the full host is returned.
///
/// # Examples
///
/// ```
/// use sumi_archiver::url::registrable_domain;
///
/// assert_eq!(registrable_domain("news.example.com"), "example.com");
/// assert_eq!(registrable_domain("alice.github.io"), "alice.github.io");
/// ```
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_lowercase();

    if host.starts_with('[') || host.parse::<IpAddr>().is_ok() {
        return host;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host;
    }

    let last_two = labels[labels.len() - 2..].join(".");
    if SHARED_SUFFIXES.contains(&last_two.as_str()) {
        host
    } else {
        last_two
    }
}

/// Returns true if both hosts share the same registrable domain
pub fn same_registrable_domain(a: &str, b: &str) -> bool {
    registrable_domain(a) == registrable_domain(b)
}
