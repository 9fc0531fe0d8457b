use super::{host_is, ExtraActions, SiteHook};
use crate::extractor::ResponseView;
use crate::url::normalize_url;
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Extracts the episode media from Libsyn player pages
///
/// Player pages embed the download URL in their configuration script,
/// usually JSON-escaped.
pub struct LibsynHook;

fn media_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"https?:(?:\\?/){2}(?:traffic|hwcdn|media)\.libsyn\.com(?:\\?/[^"'\s<>\\]*)+"#)
            .ok()
    })
    .as_ref()
}

fn media_urls(body: &str) -> Vec<Url> {
    let Some(re) = media_regex() else {
        return Vec::new();
    };
    let mut urls: Vec<Url> = Vec::new();
    for m in re.find_iter(body) {
        let unescaped = m.as_str().replace("\\/", "/");
        if let Ok(url) = normalize_url(&unescaped) {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    urls
}

impl SiteHook for LibsynHook {
    fn name(&self) -> &'static str {
        "libsyn"
    }

    fn matches(&self, url: &Url) -> bool {
        host_is(url, "libsyn.com")
    }

    fn transform_response(&self, response: &ResponseView<'_>) -> ExtraActions {
        let assets = response
            .body_text()
            .map(|text| media_urls(&text))
            .unwrap_or_default();
        ExtraActions {
            assets,
            ..Default::default()
        }
    }
}
