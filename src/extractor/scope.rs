//! Scope filtering, deduplication and hop accounting of discovered URLs

use super::Extracted;
use crate::item::{Item, ItemKind};
use crate::url::{registrable_domain, UrlFilter};
use std::collections::HashSet;
use tracing::trace;

/// Rules deciding which discovered URLs become items, and at which hop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HopPolicy {
    /// Same-domain outlinks stay at hop 0
    pub domains_crawl: bool,
    pub max_hops: u64,
    pub capture_assets: bool,
}

/// Items derived from one response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Discoveries {
    pub outlinks: Vec<Item>,
    pub assets: Vec<Item>,
}

impl Discoveries {
    pub fn is_empty(&self) -> bool {
        self.outlinks.is_empty() && self.assets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.outlinks.len() + self.assets.len()
    }
}

/// Hop of an outlink discovered on `parent`
pub fn outlink_hop(parent: &Item, host: &str, policy: &HopPolicy) -> u64 {
    if policy.domains_crawl {
        let seed_domain = parent
            .seed_domain
            .clone()
            .or_else(|| parent.host().map(|h| registrable_domain(&h)));
        if seed_domain.as_deref() == Some(registrable_domain(host).as_str()) {
            return 0;
        }
    }
    parent.hop + 1
}

/// Turns raw extraction results into items
///
/// Assets and outlinks are each deduplicated by URL string and kept
/// disjoint, a URL found as both being kept as an asset. The parent's own
/// URL and anything the filter rejects are dropped, as are outlinks beyond
/// the maximum hop count.
pub fn finalize(
    parent: &Item,
    extracted: Extracted,
    filter: &UrlFilter,
    policy: &HopPolicy,
) -> Discoveries {
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(parent.url.clone());
    let mut discoveries = Discoveries::default();

    if policy.capture_assets {
        for url in extracted.assets {
            if !seen.insert(url.as_str().to_string()) {
                continue;
            }
            let verdict = filter.check(&url);
            if !verdict.is_allowed() {
                trace!(url = %url, reason = verdict.as_str(), "Asset out of scope");
                continue;
            }
            discoveries
                .assets
                .push(parent.child(&url, ItemKind::Asset, parent.hop));
        }
    }

    for url in extracted.outlinks {
        if !seen.insert(url.as_str().to_string()) {
            continue;
        }
        let verdict = filter.check(&url);
        if !verdict.is_allowed() {
            trace!(url = %url, reason = verdict.as_str(), "Outlink out of scope");
            continue;
        }
        let Some(host) = url.host_str() else {
            continue;
        };
        let hop = outlink_hop(parent, host, policy);
        if hop > policy.max_hops {
            continue;
        }
        discoveries
            .outlinks
            .push(parent.child(&url, ItemKind::Seed, hop));
    }

    discoveries
}
