//! Generic XML and sitemaps
//!
//! Every text leaf that is an absolute URL is collected. Whether those URLs
//! are crawled as outlinks or fetched as assets depends on whether the
//! document looks like a sitemap.

use crate::url::normalize_url;
use quick_xml::events::Event;
use quick_xml::Reader;
use url::Url;

/// URLs found in an XML document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlLinks {
    pub urls: Vec<Url>,
    /// True if the document or its URL mentions "sitemap"
    pub sitemap: bool,
}

/// Collects the URL leaves of an XML document
///
/// Parsing stops at the first syntax error; leaves seen before it are kept.
pub fn extract_xml_urls(body: &[u8], url: &Url) -> XmlLinks {
    let mut links = XmlLinks {
        urls: Vec::new(),
        sitemap: url.path().to_ascii_lowercase().contains("sitemap"),
    };

    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if contains_sitemap(e.local_name().as_ref()) {
                    links.sitemap = true;
                }
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref().starts_with(b"xmlns") && contains_sitemap(&attr.value) {
                        links.sitemap = true;
                    }
                }
            }
            Ok(Event::Text(text)) => {
                if let Ok(value) = text.unescape() {
                    push_leaf(&value, &mut links.urls);
                }
            }
            Ok(Event::CData(data)) => {
                if let Ok(value) = std::str::from_utf8(&data) {
                    push_leaf(value, &mut links.urls);
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    links
}

fn contains_sitemap(bytes: &[u8]) -> bool {
    bytes
        .windows(7)
        .any(|w| w.eq_ignore_ascii_case(b"sitemap"))
}

fn push_leaf(value: &str, urls: &mut Vec<Url>) {
    let value = value.trim();
    if value.starts_with("http://") || value.starts_with("https://") {
        if let Ok(url) = normalize_url(value) {
            urls.push(url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sitemap_urlset() {
        let body = br#"<?xml version="1.0" encoding="UTF-8"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc>http://s.example/a</loc><lastmod>2024-01-01</lastmod></url>
              <url><loc> http://s.example/b?x=1&amp;y=2 </loc></url>
            </urlset>"#;
        let url = Url::parse("http://s.example/feed.xml").unwrap();
        let links = extract_xml_urls(body, &url);
        assert!(links.sitemap);
        let urls: Vec<&str> = links.urls.iter().map(Url::as_str).collect();
        assert_eq!(urls, vec!["http://s.example/a", "http://s.example/b?x=1&y=2"]);
    }

    #[test]
    fn test_sitemap_index_by_element_name() {
        let body = br#"<sitemapindex><sitemap><loc><![CDATA[http://s.example/s1.xml]]></loc></sitemap></sitemapindex>"#;
        let url = Url::parse("http://s.example/index.xml").unwrap();
        let links = extract_xml_urls(body, &url);
        assert!(links.sitemap);
        assert_eq!(links.urls.len(), 1);
    }

    #[test]
    fn test_plain_xml_is_not_sitemap() {
        let body = br#"<feed><entry><link>https://f.example/post/1</link><title>hi</title></entry></feed>"#;
        let url = Url::parse("http://f.example/atom.xml").unwrap();
        let links = extract_xml_urls(body, &url);
        assert!(!links.sitemap);
        assert_eq!(links.urls.len(), 1);
    }

    #[test]
    fn test_sitemap_by_url_path() {
        let url = Url::parse("http://s.example/sitemap.xml").unwrap();
        let links = extract_xml_urls(b"<urlset><url><loc>http://s.example/x</loc></url></urlset>", &url);
        assert!(links.sitemap);
    }
}
