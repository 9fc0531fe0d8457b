//! HLS playlists
//!
//! Media playlists list segment URIs, master playlists list variant stream
//! URIs. Both are plain lines that are not tags or comments; URIs carried in
//! tag attributes (`#EXT-X-KEY`, `#EXT-X-MAP`, `#EXT-X-MEDIA`) are collected
//! too.

use crate::url::resolve_url;
use url::Url;

/// Returns true if the body starts like an M3U playlist
pub fn is_playlist(body: &[u8]) -> bool {
    let start = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body);
    start.starts_with(b"#EXTM3U")
}

pub fn extract_playlist_urls(body: &str, base: &Url) -> Vec<Url> {
    let mut urls = Vec::new();

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(tag) = line.strip_prefix('#') {
            if let Some(uri) = uri_attribute(tag) {
                if let Ok(url) = resolve_url(base, uri) {
                    urls.push(url);
                }
            }
            continue;
        }
        if let Ok(url) = resolve_url(base, line) {
            urls.push(url);
        }
    }

    urls
}

fn uri_attribute(tag: &str) -> Option<&str> {
    let start = tag.find("URI=\"")? + 5;
    let rest = &tag[start..];
    let end = rest.find('"')?;
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://v.example/live/index.m3u8").unwrap()
    }

    #[test]
    fn test_media_playlist() {
        let body = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:9.0,\nseg0.ts\n#EXTINF:9.0,\nhttp://cdn.example/seg1.ts\n#EXT-X-ENDLIST\n";
        assert!(is_playlist(body.as_bytes()));
        let urls: Vec<String> = extract_playlist_urls(body, &base())
            .into_iter()
            .map(|u| u.to_string())
            .collect();
        assert_eq!(
            urls,
            vec!["http://v.example/live/seg0.ts", "http://cdn.example/seg1.ts"]
        );
    }

    #[test]
    fn test_master_playlist_and_key_uri() {
        let body = "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n#EXT-X-STREAM-INF:BANDWIDTH=1280000\nlow/index.m3u8\n#EXT-X-STREAM-INF:BANDWIDTH=2560000\nhigh/index.m3u8\n";
        let urls: Vec<String> = extract_playlist_urls(body, &base())
            .into_iter()
            .map(|u| u.to_string())
            .collect();
        assert_eq!(
            urls,
            vec![
                "http://v.example/live/key.bin",
                "http://v.example/live/low/index.m3u8",
                "http://v.example/live/high/index.m3u8",
            ]
        );
    }

    #[test]
    fn test_not_a_playlist() {
        assert!(!is_playlist(b"<html></html>"));
    }
}
