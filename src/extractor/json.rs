use crate::url::normalize_url;
use serde_json::Value;
use url::Url;

/// Walks a JSON document and returns every string that is an absolute URL
///
/// Invalid JSON yields no URLs.
pub fn extract_json_urls(body: &[u8]) -> Vec<Url> {
    match serde_json::from_slice::<Value>(body) {
        Ok(value) => {
            let mut urls = Vec::new();
            walk(&value, &mut urls);
            urls
        }
        Err(_) => Vec::new(),
    }
}

/// Same as [`extract_json_urls`] for JSON embedded in a page
pub fn extract_json_urls_str(text: &str) -> Vec<Url> {
    extract_json_urls(text.trim().as_bytes())
}

fn walk(value: &Value, urls: &mut Vec<Url>) {
    match value {
        Value::String(s) => {
            if looks_absolute(s) {
                if let Ok(url) = normalize_url(s) {
                    urls.push(url);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| walk(v, urls)),
        Value::Object(map) => map.values().for_each(|v| walk(v, urls)),
        _ => {}
    }
}

fn looks_absolute(s: &str) -> bool {
    let s = s.trim_start();
    let prefix = |n: usize, scheme: &str| s.get(..n).map_or(false, |p| p.eq_ignore_ascii_case(scheme));
    s.len() > 8 && (prefix(7, "http://") || prefix(8, "https://"))
}
