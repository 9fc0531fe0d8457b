//! Extractor module for outlink and asset discovery
//!
//! This module turns a fetched response into two disjoint sets of URLs:
//! - Outlinks: candidates to crawl as new seeds, with hop accounting
//! - Assets: resources needed to render the page, at the parent's hop
//!
//! Body parsing depends on the content category (HTML, XML and sitemaps,
//! S3 listings, JSON, M3U8 playlists, CSS). `Link` headers are always read,
//! and site-specific hooks may add URLs or replace body parsing.

mod css;
mod html;
mod json;
mod link_header;
mod m3u8;
mod s3;
mod scope;
mod xml;

pub use css::extract_css_urls;
pub use html::{extract_html, HtmlLinks, HtmlOptions};
pub use json::extract_json_urls;
pub use link_header::parse_link_header;
pub use m3u8::{extract_playlist_urls, is_playlist};
pub use s3::{extract_s3_urls, is_s3_server, S3Links};
pub use scope::{finalize, outlink_hop, Discoveries, HopPolicy};
pub use xml::{extract_xml_urls, XmlLinks};

use crate::config::Config;
use crate::item::Item;
use crate::sitespecific::HookRegistry;
use crate::url::UrlFilter;
use reqwest::header::{HeaderMap, CONTENT_TYPE, LINK, SERVER};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Borrowed view of a response, shared by the extractor and site hooks
#[derive(Debug, Clone, Copy)]
pub struct ResponseView<'a> {
    /// Final URL of the request
    pub url: &'a Url,
    pub status: u16,
    pub headers: &'a HeaderMap,
    /// Spooled body, when the content type is post-processable
    pub body: Option<&'a [u8]>,
}

impl<'a> ResponseView<'a> {
    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Lowercased MIME type without parameters
    pub fn content_type(&self) -> Option<String> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(mime_essence)
    }

    pub fn body_text(&self) -> Option<Cow<'a, str>> {
        self.body.map(String::from_utf8_lossy)
    }
}

fn mime_essence(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Returns true if a body with this content type is kept for extraction
///
/// Covers `text/*`, JSON, XML, PDF and HLS playlists.
pub fn is_post_processable(content_type: Option<&str>) -> bool {
    let Some(ct) = content_type.map(mime_essence) else {
        return false;
    };
    ct.starts_with("text/")
        || ct == "application/pdf"
        || ct.contains("json")
        || ct.contains("xml")
        || ct.contains("mpegurl")
}

/// How a response body is parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentCategory {
    Html,
    Xml,
    S3Listing,
    Json,
    M3u8,
    Css,
    Other,
}

impl ContentCategory {
    /// Classifies a response from its headers and the start of its body
    pub fn of(response: &ResponseView<'_>) -> Self {
        let ct = response.content_type().unwrap_or_default();
        let body = response.body.unwrap_or_default();

        if ct.contains("mpegurl") || is_playlist(body) {
            return Self::M3u8;
        }
        if ct.contains("html") {
            return Self::Html;
        }
        let xml_prolog = body
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .map_or(false, |start| body[start..].starts_with(b"<?xml"));
        if ct.contains("xml") || xml_prolog {
            let s3 = response.header(SERVER.as_str()).map_or(false, is_s3_server);
            return if s3 { Self::S3Listing } else { Self::Xml };
        }
        if ct.contains("json") {
            return Self::Json;
        }
        if ct == "text/css" {
            return Self::Css;
        }
        Self::Other
    }
}

/// Raw URLs found in a response, before scope and hop rules
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub outlinks: Vec<Url>,
    pub assets: Vec<Url>,
}

/// Extraction settings taken from the crawler configuration
#[derive(Debug, Clone)]
pub struct ExtractorOptions {
    pub capture_alternate_pages: bool,
    pub disabled_html_tags: Vec<String>,
    pub policy: HopPolicy,
}

impl ExtractorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            capture_alternate_pages: config.crawler.capture_alternate_pages,
            disabled_html_tags: config.crawler.disabled_html_tags.clone(),
            policy: HopPolicy {
                domains_crawl: config.crawler.domains_crawl,
                max_hops: config.crawler.max_hops,
                capture_assets: !config.crawler.disable_assets_capture,
            },
        }
    }
}

/// Turns responses into outlink and asset items
pub struct Extractor {
    options: ExtractorOptions,
    filter: UrlFilter,
    hooks: Arc<HookRegistry>,
}

impl Extractor {
    pub fn new(options: ExtractorOptions, filter: UrlFilter, hooks: Arc<HookRegistry>) -> Self {
        Self {
            options,
            filter,
            hooks,
        }
    }

    pub fn from_config(config: &Config, hooks: Arc<HookRegistry>) -> Self {
        Self::new(
            ExtractorOptions::from_config(config),
            UrlFilter::from_scope(&config.scope),
            hooks,
        )
    }

    /// Extracts the items to schedule after fetching `parent`
    pub fn extract(&self, parent: &Item, response: &ResponseView<'_>) -> Discoveries {
        let extracted = self.extract_urls(response);
        let raw = extracted.outlinks.len() + extracted.assets.len();
        let discoveries = finalize(parent, extracted, &self.filter, &self.options.policy);
        debug!(
            url = %parent.url,
            raw,
            outlinks = discoveries.outlinks.len(),
            assets = discoveries.assets.len(),
            "Extracted URLs"
        );
        discoveries
    }

    /// Collects raw URLs from headers, body and site hooks
    pub fn extract_urls(&self, response: &ResponseView<'_>) -> Extracted {
        let mut extracted = Extracted::default();

        for value in response.headers.get_all(LINK) {
            if let Ok(value) = value.to_str() {
                extracted
                    .outlinks
                    .extend(parse_link_header(value, response.url));
            }
        }

        let extra = self.hooks.transform_response(response);
        if !extra.replace_extraction {
            self.extract_body(response, &mut extracted);
        }
        extracted.outlinks.extend(extra.outlinks);
        extracted.assets.extend(extra.assets);

        extracted
    }

    fn extract_body(&self, response: &ResponseView<'_>, extracted: &mut Extracted) {
        let Some(body) = response.body else {
            return;
        };

        match ContentCategory::of(response) {
            ContentCategory::Html => {
                let text = String::from_utf8_lossy(body);
                let options = HtmlOptions {
                    capture_alternate_pages: self.options.capture_alternate_pages,
                    disabled_tags: &self.options.disabled_html_tags,
                };
                let links = extract_html(&text, response.url, &options);
                extracted.outlinks.extend(links.outlinks);
                extracted.assets.extend(links.assets);
            }
            ContentCategory::S3Listing => match extract_s3_urls(body, response.url) {
                Some(links) => {
                    extracted.assets.extend(links.files);
                    extracted.outlinks.extend(links.listings);
                }
                None => extract_xml(body, response.url, extracted),
            },
            ContentCategory::Xml => extract_xml(body, response.url, extracted),
            ContentCategory::Json => extracted.assets.extend(extract_json_urls(body)),
            ContentCategory::M3u8 => {
                let text = String::from_utf8_lossy(body);
                extracted
                    .assets
                    .extend(extract_playlist_urls(&text, response.url));
            }
            ContentCategory::Css => {
                let text = String::from_utf8_lossy(body);
                for value in extract_css_urls(&text) {
                    if let Ok(url) = crate::url::resolve_url(response.url, &value) {
                        extracted.assets.push(url);
                    }
                }
            }
            ContentCategory::Other => {}
        }
    }
}

fn extract_xml(body: &[u8], url: &Url, extracted: &mut Extracted) {
    let links = extract_xml_urls(body, url);
    if links.sitemap {
        extracted.outlinks.extend(links.urls);
    } else {
        extracted.assets.extend(links.urls);
    }
}
