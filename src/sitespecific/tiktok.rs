use super::{host_is, SiteHook};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use url::Url;

/// TikTok serves an empty shell to clients that do not look like a browser
pub struct TiktokHook;

impl SiteHook for TiktokHook {
    fn name(&self) -> &'static str {
        "tiktok"
    }

    fn matches(&self, url: &Url) -> bool {
        host_is(url, "tiktok.com")
    }

    fn prepare_request(&self, _url: &Url, headers: &mut HeaderMap) {
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
        headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
        headers.insert("sec-fetch-site", HeaderValue::from_static("none"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_headers() {
        let url = Url::parse("https://www.tiktok.com/@user/video/1").unwrap();
        assert!(TiktokHook.matches(&url));
        let mut headers = HeaderMap::new();
        TiktokHook.prepare_request(&url, &mut headers);
        assert!(headers.get(ACCEPT).unwrap().to_str().unwrap().starts_with("text/html"));
        assert_eq!(headers.get("sec-fetch-mode").unwrap(), "navigate");
    }
}
