//! Orchestrator-backed seencheck

use super::{Seencheck, SeencheckResult};
use crate::item::{Item, ItemKind};
use crate::orchestrator::{Orchestrator, SeencheckQuery};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Seencheck answered by the orchestrator
///
/// Orchestrator failures are treated as "not seen": a URL may be crawled
/// twice, but the crawl never blocks on the orchestrator.
pub struct RemoteSeencheck {
    orchestrator: Arc<dyn Orchestrator>,
    seen: AtomicU64,
}

impl RemoteSeencheck {
    pub fn new(orchestrator: Arc<dyn Orchestrator>) -> Self {
        Self {
            orchestrator,
            seen: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Seencheck for RemoteSeencheck {
    async fn check_and_mark(
        &self,
        _fingerprint: u64,
        url: &str,
        kind: ItemKind,
    ) -> SeencheckResult<bool> {
        let query = SeencheckQuery {
            url: url.to_string(),
            kind,
        };

        match self.orchestrator.seencheck(std::slice::from_ref(&query)).await {
            Ok(unseen) => {
                let seen = !unseen.iter().any(|u| u == url);
                if seen {
                    self.seen.fetch_add(1, Ordering::Relaxed);
                }
                Ok(seen)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Remote seencheck failed, treating URL as not seen");
                Ok(false)
            }
        }
    }

    async fn filter_new(&self, items: Vec<Item>) -> SeencheckResult<Vec<Item>> {
        let queries: Vec<SeencheckQuery> = items
            .iter()
            .filter(|item| !item.bypass_seencheck)
            .map(|item| SeencheckQuery {
                url: item.url.clone(),
                kind: item.kind,
            })
            .collect();

        if queries.is_empty() {
            return Ok(items);
        }

        let unseen: HashSet<String> = match self.orchestrator.seencheck(&queries).await {
            Ok(unseen) => unseen.into_iter().collect(),
            Err(e) => {
                warn!(count = queries.len(), error = %e, "Remote seencheck failed, treating batch as not seen");
                return Ok(items);
            }
        };

        let mut returned = HashSet::new();
        let mut fresh = Vec::with_capacity(items.len());
        for item in items {
            if item.bypass_seencheck {
                fresh.push(item);
            } else if unseen.contains(&item.url) && returned.insert(item.url.clone()) {
                fresh.push(item);
            } else {
                self.seen.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(fresh)
    }

    fn seen_count(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }
}
