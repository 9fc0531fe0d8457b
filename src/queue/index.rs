//! In-memory queue index
//!
//! Maps each host to the FIFO of its entries and keeps the rotating order of
//! non-empty hosts used for round-robin dequeue.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Location of an encoded item in the data file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub position: u64,
    pub size: u64,
}

/// Entries of one host, as stored in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntries {
    pub host: String,
    pub entries: Vec<IndexEntry>,
}

/// Serialized form of the index
///
/// `epoch` identifies the WAL generation that continues from this snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub epoch: u64,
    pub hosts: Vec<HostEntries>,
}

#[derive(Debug, Default)]
pub struct Index {
    hosts: HashMap<String, VecDeque<IndexEntry>>,
    order: VecDeque<String>,
    len: usize,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry to a host's FIFO
    ///
    /// A host that was empty joins the back of the rotation.
    pub fn push(&mut self, host: &str, entry: IndexEntry) {
        match self.hosts.get_mut(host) {
            Some(entries) => entries.push_back(entry),
            None => {
                self.hosts
                    .insert(host.to_string(), VecDeque::from([entry]));
                self.order.push_back(host.to_string());
            }
        }
        self.len += 1;
    }

    /// Host and head entry that the next dequeue would take
    pub fn peek_next(&self) -> Option<(&str, &IndexEntry)> {
        let host = self.order.front()?;
        let entry = self.hosts.get(host)?.front()?;
        Some((host.as_str(), entry))
    }

    /// Removes the entry `id` from `host` and rotates the host
    ///
    /// The host moves to the back of the rotation if it still has entries and
    /// leaves the rotation otherwise; the relative order of the other hosts is
    /// unchanged.
    pub fn pop(&mut self, host: &str, id: &str) -> Option<IndexEntry> {
        let entries = self.hosts.get_mut(host)?;
        let at = if entries.front().map(|e| e.id.as_str()) == Some(id) {
            0
        } else {
            entries.iter().position(|e| e.id == id)?
        };
        let entry = entries.remove(at)?;
        let now_empty = entries.is_empty();
        self.len -= 1;

        if self.order.front().map(String::as_str) == Some(host) {
            self.order.pop_front();
        } else if let Some(pos) = self.order.iter().position(|h| h == host) {
            self.order.remove(pos);
        }

        if now_empty {
            self.hosts.remove(host);
        } else {
            self.order.push_back(host.to_string());
        }

        Some(entry)
    }

    /// Removes and returns the next entry in round-robin order
    pub fn pop_next(&mut self) -> Option<(String, IndexEntry)> {
        let (host, id) = {
            let (host, entry) = self.peek_next()?;
            (host.to_string(), entry.id.clone())
        };
        let entry = self.pop(&host, &id)?;
        Some((host, entry))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of non-empty hosts
    pub fn host_count(&self) -> usize {
        self.order.len()
    }

    /// True if `id` is the next entry of `host`
    pub fn is_head(&self, host: &str, id: &str) -> bool {
        self.hosts
            .get(host)
            .and_then(VecDeque::front)
            .map_or(false, |e| e.id == id)
    }

    pub fn host_len(&self, host: &str) -> usize {
        self.hosts.get(host).map_or(0, VecDeque::len)
    }

    /// Host at the head of the rotation
    pub fn front_host(&self) -> Option<&str> {
        self.order.front().map(String::as_str)
    }

    /// Element count of every non-empty host
    pub fn host_counts(&self) -> impl Iterator<Item = (&str, usize)> {
        self.hosts.iter().map(|(h, e)| (h.as_str(), e.len()))
    }

    pub fn to_snapshot(&self, epoch: u64) -> IndexSnapshot {
        let hosts = self
            .order
            .iter()
            .filter_map(|host| {
                self.hosts.get(host).map(|entries| HostEntries {
                    host: host.clone(),
                    entries: entries.iter().cloned().collect(),
                })
            })
            .collect();
        IndexSnapshot { epoch, hosts }
    }

    pub fn from_snapshot(snapshot: IndexSnapshot) -> Self {
        let mut index = Self::new();
        for HostEntries { host, entries } in snapshot.hosts {
            for entry in entries {
                index.push(&host, entry);
            }
        }
        index
    }
}
