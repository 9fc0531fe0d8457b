//! `url(...)` and `@import` references in stylesheets and inline styles

use regex::Regex;
use std::sync::OnceLock;

fn url_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)url\(\s*['"]?([^'")]*?)['"]?\s*\)"#).ok())
        .as_ref()
}

fn import_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)@import\s+['"]([^'"]+)['"]"#).ok())
        .as_ref()
}

fn viewport_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^-?\d+(\.\d+)?(vh|vw|vmin|vmax|dvh|svh|lvh)$").ok())
        .as_ref()
}

/// Rejects captured values that are CSS tokens rather than references
fn is_css_token(value: &str) -> bool {
    value.is_empty()
        || value.starts_with("--")
        || value.starts_with("var(")
        || value.starts_with("calc(")
        || value.ends_with('%')
        || viewport_regex().map_or(false, |re| re.is_match(value))
}

/// Extracts the raw references of a stylesheet or a `style` attribute
///
/// Values are returned unresolved and in document order.
pub fn extract_css_urls(css: &str) -> Vec<String> {
    let mut urls = Vec::new();

    if let Some(re) = url_regex() {
        for caps in re.captures_iter(css) {
            if let Some(m) = caps.get(1) {
                let value = m.as_str().trim();
                if !is_css_token(value) {
                    urls.push(value.to_string());
                }
            }
        }
    }

    if let Some(re) = import_regex() {
        for caps in re.captures_iter(css) {
            if let Some(m) = caps.get(1) {
                urls.push(m.as_str().trim().to_string());
            }
        }
    }

    urls
}
