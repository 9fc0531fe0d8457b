//! S3-compatible bucket listings
//!
//! A `ListBucketResult` is turned into the URLs of its objects, the URLs of
//! its sub-prefix listings and, when the listing is truncated, the URL of
//! the next page (continuation token for V2 listings, marker otherwise).

use quick_xml::events::Event;
use quick_xml::Reader;
use url::Url;

/// `Server` header values of S3-compatible object stores
const S3_SERVERS: &[&str] = &["amazons3", "minio", "uploadserver", "ceph", "rgw"];

/// Returns true if the `Server` header names an S3-compatible store
pub fn is_s3_server(server: &str) -> bool {
    let server = server.to_ascii_lowercase();
    S3_SERVERS.iter().any(|s| server.contains(s))
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Listing {
    is_bucket_listing: bool,
    keys: Vec<String>,
    prefixes: Vec<String>,
    truncated: bool,
    next_marker: Option<String>,
    next_continuation_token: Option<String>,
}

/// URLs derived from one listing page
#[derive(Debug, Default, Clone, PartialEq)]
pub struct S3Links {
    /// Object URLs
    pub files: Vec<Url>,
    /// Sub-prefix listings and the next page
    pub listings: Vec<Url>,
}

fn parse_listing(body: &[u8]) -> Listing {
    let mut listing = Listing::default();
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if path.is_empty() && name == "ListBucketResult" {
                    listing.is_bucket_listing = true;
                }
                path.push(name);
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(text)) => {
                let value = text.unescape().map(|v| v.into_owned()).unwrap_or_default();
                let parent = path.len().checked_sub(2).and_then(|i| path.get(i));
                match (parent.map(String::as_str), path.last().map(String::as_str)) {
                    (Some("Contents"), Some("Key")) => listing.keys.push(value),
                    (Some("CommonPrefixes"), Some("Prefix")) => listing.prefixes.push(value),
                    (Some("ListBucketResult"), Some("IsTruncated")) => {
                        listing.truncated = value.eq_ignore_ascii_case("true")
                    }
                    (Some("ListBucketResult"), Some("NextMarker")) => {
                        listing.next_marker = Some(value)
                    }
                    (Some("ListBucketResult"), Some("NextContinuationToken")) => {
                        listing.next_continuation_token = Some(value)
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    listing
}

/// Builds the follow-up URLs of a bucket listing fetched from `url`
///
/// Returns `None` if the body is not a bucket listing.
pub fn extract_s3_urls(body: &[u8], url: &Url) -> Option<S3Links> {
    let listing = parse_listing(body);
    if !listing.is_bucket_listing {
        return None;
    }

    let mut links = S3Links::default();
    let mut bucket_root = url.clone();
    bucket_root.set_query(None);
    let root_path = if bucket_root.path().ends_with('/') {
        bucket_root.path().to_string()
    } else {
        format!("{}/", bucket_root.path())
    };

    for key in &listing.keys {
        if key.ends_with('/') {
            continue;
        }
        let mut file = bucket_root.clone();
        file.set_path(&format!("{}{}", root_path, key));
        links.files.push(file);
    }

    let delimiter = query_value(url, "delimiter").unwrap_or_else(|| "/".to_string());
    for prefix in &listing.prefixes {
        let mut sub = bucket_root.clone();
        sub.query_pairs_mut()
            .append_pair("prefix", prefix)
            .append_pair("delimiter", &delimiter);
        links.listings.push(sub);
    }

    if listing.truncated {
        let mut next = bucket_root.clone();
        {
            let mut pairs = next.query_pairs_mut();
            let v2 = listing.next_continuation_token.is_some()
                || query_value(url, "list-type").as_deref() == Some("2");
            if v2 {
                pairs.append_pair("list-type", "2");
            }
            for key in ["prefix", "delimiter"] {
                if let Some(value) = query_value(url, key) {
                    pairs.append_pair(key, &value);
                }
            }
            match (&listing.next_continuation_token, &listing.next_marker) {
                (Some(token), _) => {
                    pairs.append_pair("continuation-token", token);
                }
                (None, Some(marker)) => {
                    pairs.append_pair("marker", marker);
                }
                (None, None) => {
                    // V1 listings without a delimiter omit NextMarker: the last key is the marker
                    if let Some(last) = listing.keys.last() {
                        pairs.append_pair("marker", last);
                    }
                }
            }
        }
        if next.query().map_or(false, |q| q.contains("marker") || q.contains("continuation-token")) {
            links.listings.push(next);
        }
    }

    Some(links)
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}
