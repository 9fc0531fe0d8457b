//! HTML link and asset extraction
//!
//! # Extraction Rules
//!
//! **Outlinks:**
//! - `<a href>` and `<area href>`
//! - `<link rel="alternate" href>` when alternate pages are captured
//!
//! **Assets:**
//! - `src` of `iframe`, `frame`, `img`, `video`, `audio`, `source`, `track`,
//!   `embed` and `script`; `data` of `object`; `poster` of `video`
//! - `img/@data-src`, `img/@data-lazy-src`, any `@data-preview`
//! - first token of every `srcset`/`data-srcset` candidate
//! - `url(...)` in `style` attributes and `<style>` blocks
//! - `<link href>` other than `rel="alternate"`
//! - `<meta href>` and URL-like tokens of `<meta content>`
//! - absolute URLs in `<script type="application/json">` bodies
//!
//! `<base href>` overrides the response URL for relative resolution.

use super::css::extract_css_urls;
use super::json::extract_json_urls_str;
use crate::url::resolve_url;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use url::Url;

/// Options for a single HTML extraction
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlOptions<'a> {
    pub capture_alternate_pages: bool,
    /// Tag names skipped entirely
    pub disabled_tags: &'a [String],
}

/// References found in a page, resolved against the effective base
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HtmlLinks {
    pub outlinks: Vec<Url>,
    pub assets: Vec<Url>,
}

fn base_selector() -> Option<&'static Selector> {
    static SEL: OnceLock<Option<Selector>> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("base[href]").ok()).as_ref()
}

fn url_token_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s"'<>]+"#).ok())
        .as_ref()
}

/// Parses an HTML document and collects its outlinks and assets
///
/// # Arguments
///
/// * `html` - The page body
/// * `page_url` - URL the page was fetched from
/// * `options` - Alternate-page capture and disabled tags
///
/// # Example
///
/// ```
/// use sumi_archiver::extractor::{extract_html, HtmlOptions};
/// use url::Url;
///
/// let page = Url::parse("http://a.example/").unwrap();
/// let links = extract_html(r#"<a href="/b">b</a><img src="x.png">"#, &page, &HtmlOptions::default());
/// assert_eq!(links.outlinks[0].as_str(), "http://a.example/b");
/// assert_eq!(links.assets[0].as_str(), "http://a.example/x.png");
/// ```
pub fn extract_html(html: &str, page_url: &Url, options: &HtmlOptions<'_>) -> HtmlLinks {
    let document = Html::parse_document(html);
    let base = effective_base(&document, page_url);

    let mut collector = Collector {
        base: &base,
        links: HtmlLinks::default(),
    };

    for node in document.root_element().descendants() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };
        let name = element.value().name();
        if options
            .disabled_tags
            .iter()
            .any(|tag| tag.eq_ignore_ascii_case(name))
        {
            continue;
        }
        collector.visit(element, name, options);
    }

    collector.links
}

fn effective_base(document: &Html, page_url: &Url) -> Url {
    base_selector()
        .and_then(|sel| document.select(sel).next())
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| resolve_url(page_url, href).ok())
        .unwrap_or_else(|| page_url.clone())
}

struct Collector<'a> {
    base: &'a Url,
    links: HtmlLinks,
}

impl Collector<'_> {
    fn outlink(&mut self, href: &str) {
        if let Ok(url) = resolve_url(self.base, href) {
            self.links.outlinks.push(url);
        }
    }

    fn asset(&mut self, href: &str) {
        if let Ok(url) = resolve_url(self.base, href) {
            self.links.assets.push(url);
        }
    }

    fn asset_attr(&mut self, element: ElementRef<'_>, attr: &str) {
        if let Some(value) = element.value().attr(attr) {
            self.asset(value);
        }
    }

    fn srcset(&mut self, value: &str) {
        for candidate in value.split(',') {
            if let Some(first) = candidate.split_whitespace().next() {
                self.asset(first);
            }
        }
    }

    fn visit(&mut self, element: ElementRef<'_>, name: &str, options: &HtmlOptions<'_>) {
        match name {
            "a" | "area" => {
                if let Some(href) = element.value().attr("href") {
                    self.outlink(href);
                }
            }
            "iframe" | "frame" | "audio" | "source" | "track" | "embed" => {
                self.asset_attr(element, "src");
            }
            "img" => {
                self.asset_attr(element, "src");
                self.asset_attr(element, "data-src");
                self.asset_attr(element, "data-lazy-src");
            }
            "video" => {
                self.asset_attr(element, "src");
                self.asset_attr(element, "poster");
            }
            "object" => self.asset_attr(element, "data"),
            "link" => {
                if let Some(href) = element.value().attr("href") {
                    let alternate = element
                        .value()
                        .attr("rel")
                        .map_or(false, |rel| {
                            rel.split_whitespace()
                                .any(|r| r.eq_ignore_ascii_case("alternate"))
                        });
                    if !alternate {
                        self.asset(href);
                    } else if options.capture_alternate_pages {
                        self.outlink(href);
                    }
                }
            }
            "meta" => {
                self.asset_attr(element, "href");
                if let Some(content) = element.value().attr("content") {
                    if let Some(re) = url_token_regex() {
                        for token in re.find_iter(content) {
                            self.asset(token.as_str());
                        }
                    }
                }
            }
            "script" => {
                self.asset_attr(element, "src");
                let is_json = element
                    .value()
                    .attr("type")
                    .map_or(false, |t| t.to_ascii_lowercase().contains("json"));
                if is_json {
                    let text: String = element.text().collect();
                    self.links.assets.extend(extract_json_urls_str(&text));
                }
            }
            "style" => {
                let text: String = element.text().collect();
                for value in extract_css_urls(&text) {
                    self.asset(&value);
                }
            }
            _ => {}
        }

        if let Some(style) = element.value().attr("style") {
            for value in extract_css_urls(style) {
                self.asset(&value);
            }
        }
        self.asset_attr(element, "data-preview");
        if let Some(srcset) = element.value().attr("srcset") {
            self.srcset(srcset);
        }
        if let Some(srcset) = element.value().attr("data-srcset") {
            self.srcset(srcset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("http://a.example/dir/page.html").unwrap()
    }

    fn strs(urls: &[Url]) -> Vec<&str> {
        urls.iter().map(Url::as_str).collect()
    }

    #[test]
    fn test_anchor_outlinks() {
        let html = r##"<body>
            <a href="/b">b</a>
            <a href="c.html#top">c</a>
            <a href="#local">skip</a>
            <a href="mailto:me@a.example">skip</a>
            <a href="javascript:void(0)">skip</a>
        </body>"##;
        let links = extract_html(html, &page(), &HtmlOptions::default());
        assert_eq!(
            strs(&links.outlinks),
            vec!["http://a.example/b", "http://a.example/dir/c.html"]
        );
        assert!(links.assets.is_empty());
    }

    #[test]
    fn test_base_href_override() {
        let html = r#"<head><base href="http://cdn.example/root/"></head><body><a href="x">x</a><img src="i.png"></body>"#;
        let links = extract_html(html, &page(), &HtmlOptions::default());
        assert_eq!(strs(&links.outlinks), vec!["http://cdn.example/root/x"]);
        assert_eq!(strs(&links.assets), vec!["http://cdn.example/root/i.png"]);
    }

    #[test]
    fn test_media_and_lazy_assets() {
        let html = r#"<body>
            <img src="a.png" data-src="b.png" data-lazy-src="c.png" srcset="d.png 1x, e.png 2x">
            <picture><source data-srcset="f.webp 100w, g.webp 200w"></picture>
            <video src="v.mp4" poster="p.jpg"></video>
            <audio src="s.mp3"></audio>
            <div data-preview="/prev.gif" style="background: url('bg.jpg')"></div>
            <script src="/app.js"></script>
            <iframe src="http://embed.example/frame"></iframe>
        </body>"#;
        let links = extract_html(html, &page(), &HtmlOptions::default());
        let assets = strs(&links.assets);
        for expected in [
            "http://a.example/dir/a.png",
            "http://a.example/dir/b.png",
            "http://a.example/dir/c.png",
            "http://a.example/dir/d.png",
            "http://a.example/dir/e.png",
            "http://a.example/dir/f.webp",
            "http://a.example/dir/g.webp",
            "http://a.example/dir/v.mp4",
            "http://a.example/dir/p.jpg",
            "http://a.example/dir/s.mp3",
            "http://a.example/prev.gif",
            "http://a.example/dir/bg.jpg",
            "http://a.example/app.js",
            "http://embed.example/frame",
        ] {
            assert!(assets.contains(&expected), "missing {}", expected);
        }
        assert!(links.outlinks.is_empty());
    }

    #[test]
    fn test_link_alternate() {
        let html = r#"<head>
            <link rel="stylesheet" href="/style.css">
            <link rel="alternate" hreflang="fr" href="/fr/">
        </head>"#;
        let links = extract_html(html, &page(), &HtmlOptions::default());
        assert_eq!(strs(&links.assets), vec!["http://a.example/style.css"]);
        assert!(links.outlinks.is_empty());

        let options = HtmlOptions {
            capture_alternate_pages: true,
            ..Default::default()
        };
        let links = extract_html(html, &page(), &options);
        assert_eq!(strs(&links.outlinks), vec!["http://a.example/fr/"]);
    }

    #[test]
    fn test_meta_style_and_json_script() {
        let html = r#"<head>
            <meta property="og:image" content="https://img.example/og.png">
            <meta name="description" content="just words, 100% text">
            <style>.hero { background-image: url(/hero.jpg); width: calc(100% - 2px); }</style>
            <script type="application/json">{"media": {"url": "https://media.example/v.mp4"}}</script>
        </head>"#;
        let links = extract_html(html, &page(), &HtmlOptions::default());
        let assets = strs(&links.assets);
        assert!(assets.contains(&"https://img.example/og.png"));
        assert!(assets.contains(&"http://a.example/hero.jpg"));
        assert!(assets.contains(&"https://media.example/v.mp4"));
        assert_eq!(assets.len(), 3);
    }

    #[test]
    fn test_disabled_tags() {
        let html = r#"<body><img src="a.png"><a href="/b">b</a></body>"#;
        let disabled = vec!["img".to_string()];
        let options = HtmlOptions {
            disabled_tags: &disabled,
            ..Default::default()
        };
        let links = extract_html(html, &page(), &options);
        assert!(links.assets.is_empty());
        assert_eq!(links.outlinks.len(), 1);
    }
}
