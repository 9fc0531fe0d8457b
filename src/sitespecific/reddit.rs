use super::{host_is, SiteHook};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use url::Url;

/// Passes the age gate of NSFW communities
pub struct RedditHook;

const OVER18: &str = "over18=1";

impl SiteHook for RedditHook {
    fn name(&self) -> &'static str {
        "reddit"
    }

    fn matches(&self, url: &Url) -> bool {
        host_is(url, "reddit.com")
    }

    fn prepare_request(&self, _url: &Url, headers: &mut HeaderMap) {
        let cookie = match headers.get(COOKIE).and_then(|v| v.to_str().ok()) {
            Some(existing) if existing.contains(OVER18) => return,
            Some(existing) if !existing.is_empty() => format!("{}; {}", existing, OVER18),
            _ => OVER18.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            headers.insert(COOKIE, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adds_cookie() {
        let url = Url::parse("https://www.reddit.com/r/pics").unwrap();
        let mut headers = HeaderMap::new();
        RedditHook.prepare_request(&url, &mut headers);
        assert_eq!(headers.get(COOKIE).unwrap(), "over18=1");

        headers.insert(COOKIE, HeaderValue::from_static("session=abc"));
        RedditHook.prepare_request(&url, &mut headers);
        assert_eq!(headers.get(COOKIE).unwrap(), "session=abc; over18=1");

        RedditHook.prepare_request(&url, &mut headers);
        assert_eq!(headers.get(COOKIE).unwrap(), "session=abc; over18=1");
    }
}
