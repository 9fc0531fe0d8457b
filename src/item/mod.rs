//! Crawl items
//!
//! An [`Item`] is a unit of work flowing through the queue. Children carry a
//! data-only snapshot of their parent (URL and ID) rather than a reference,
//! so an item's lifetime never depends on the item that discovered it.

mod codec;

pub use codec::{decode_item, encode_item, CodecError};

use crate::url::{extract_host, fingerprint, normalize_url};
use crate::UrlError;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;
use uuid::Uuid;

/// Whether an item is a page to crawl or a resource needed to render one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// A user-supplied starting URL or a discovered outlink
    #[default]
    Seed,
    /// A resource discovered while parsing a page
    Asset,
}

impl ItemKind {
    /// Converts the kind to its persisted string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::Asset => "asset",
        }
    }

    /// Parses a kind from its persisted string representation
    ///
    /// Returns None if the string doesn't match any known kind.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "seed" => Some(Self::Seed),
            "asset" => Some(Self::Asset),
            _ => None,
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// A unit of crawl work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Stable identifier, a UUIDv4 when not supplied
    #[serde(default = "new_item_id")]
    pub id: String,

    /// Absolute, normalized URL
    pub url: String,

    /// URL of the page this item was discovered on
    #[serde(default)]
    pub parent_url: Option<String>,

    /// ID of the item this one was derived from
    #[serde(default)]
    pub parent_id: Option<String>,

    /// Distance in crawl steps from the nearest seed
    #[serde(default)]
    pub hop: u64,

    #[serde(default)]
    pub kind: ItemKind,

    /// 64-bit fingerprint of the normalized URL
    #[serde(default)]
    pub fingerprint: u64,

    /// Number of redirects followed to reach this item
    #[serde(default)]
    pub redirect_depth: u64,

    /// Number of children discovered and enqueued from this item
    #[serde(default)]
    pub locally_crawled: u64,

    /// Skip the seencheck when this item is scheduled
    #[serde(default)]
    pub bypass_seencheck: bool,

    /// Registrable domain of the seed this item descends from
    #[serde(default)]
    pub seed_domain: Option<String>,
}

fn new_item_id() -> String {
    Uuid::new_v4().to_string()
}

impl Item {
    /// Creates an item for an already-normalized URL
    pub fn new(url: &Url, kind: ItemKind, hop: u64) -> Self {
        Self {
            id: new_item_id(),
            url: url.as_str().to_string(),
            parent_url: None,
            parent_id: None,
            hop,
            kind,
            fingerprint: fingerprint(url),
            redirect_depth: 0,
            locally_crawled: 0,
            bypass_seencheck: false,
            seed_domain: extract_host(url).map(|h| crate::url::registrable_domain(&h)),
        }
    }

    /// Creates a seed item from user input, normalizing the URL
    ///
    /// # Arguments
    ///
    /// * `raw` - URL as supplied on the command line, in a seed file or by the orchestrator
    ///
    /// # Returns
    ///
    /// * `Ok(Item)` - A hop-0 seed item
    /// * `Err(UrlError)` - The URL could not be normalized
    pub fn seed(raw: &str) -> Result<Self, UrlError> {
        let url = normalize_url(raw)?;
        Ok(Self::new(&url, ItemKind::Seed, 0))
    }

    /// Creates an item discovered on this item's page
    ///
    /// The child records this item's URL and ID and inherits its seed domain.
    pub fn child(&self, url: &Url, kind: ItemKind, hop: u64) -> Self {
        let mut child = Self::new(url, kind, hop);
        child.parent_url = Some(self.url.clone());
        child.parent_id = Some(self.id.clone());
        child.seed_domain = self.seed_domain.clone();
        child
    }

    /// Creates the item for a redirect target
    ///
    /// Kind, hop and seed domain are kept; the redirect depth is incremented.
    pub fn redirected(&self, target: &Url) -> Self {
        let mut next = self.child(target, self.kind, self.hop);
        next.redirect_depth = self.redirect_depth + 1;
        next.bypass_seencheck = self.bypass_seencheck;
        next
    }

    /// Parses the item's URL
    pub fn parsed_url(&self) -> Result<Url, UrlError> {
        Url::parse(&self.url).map_err(|e| UrlError::Parse(format!("{}: {}", self.url, e)))
    }

    /// Host the item is grouped under in the queue
    pub fn host(&self) -> Option<String> {
        Url::parse(&self.url).ok().and_then(|u| extract_host(&u))
    }

    pub fn is_seed(&self) -> bool {
        self.kind == ItemKind::Seed
    }

    pub fn is_asset(&self) -> bool {
        self.kind == ItemKind::Asset
    }
}
