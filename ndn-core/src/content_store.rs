//! In-memory content store answering Interests by longest prefix.
//!
//! Every Data is filed under each prefix of its name, so the deepest bucket
//! along an Interest name already holds every candidate that could satisfy
//! it. Buckets are keyed by implicit digest, which lets several Data share a
//! name.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use log::debug;

use crate::lpm::SyncTrie;
use crate::name::{Component, Name};
use crate::packets::{Data, Interest};
use crate::selectors::{next_component, ChildSelector};
use crate::tlv::TlvError;

#[derive(Debug, Clone)]
struct Entry {
    data: Arc<Data>,
    arrival: Instant,
}

type Bucket = HashMap<[u8; 32], Entry>;

/// A surviving candidate keyed by the component that follows the Interest name
type Candidate<'a> = (Component, &'a [u8; 32], &'a Entry);

/// Thread-safe Data cache. Share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct ContentStore {
    trie: SyncTrie<Bucket>,
}

impl ContentStore {
    /// An empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `data`, returning its implicit digest. Data with an empty name
    /// cannot be filed under any prefix and is rejected.
    pub fn add(&self, data: Data) -> Result<[u8; 32], TlvError> {
        self.add_at(data, Instant::now())
    }

    /// [`ContentStore::add`] with an explicit arrival time
    pub fn add_at(&self, data: Data, arrival: Instant) -> Result<[u8; 32], TlvError> {
        if data.name.is_empty() {
            return Err(TlvError::Malformed("Data name is empty".to_string()));
        }
        let digest = data.implicit_digest()?;
        let entry = Entry {
            data: Arc::new(data),
            arrival,
        };

        self.trie.update_all(&entry.data.name.components, |_, bucket| {
            let mut bucket = bucket.unwrap_or_default();
            bucket.insert(digest, entry.clone());
            Some(bucket)
        });

        debug!("Cached {} ({})", entry.data.name, hex_prefix(&digest));
        Ok(digest)
    }

    /// Best Data for `interest`, judging freshness against the current time
    pub fn get(&self, interest: &Interest) -> Option<Arc<Data>> {
        self.get_at(interest, Instant::now())
    }

    /// [`ContentStore::get`] judging freshness against `now`
    pub fn get_at(&self, interest: &Interest, now: Instant) -> Option<Arc<Data>> {
        let found = self.trie.match_longest(&interest.name.components, |bucket| {
            let candidates = bucket?
                .iter()
                .filter(|(digest, entry)| {
                    interest.matches_data(&entry.data, digest, entry.arrival, now)
                })
                .map(|(digest, entry)| {
                    (next_component(&interest.name, &entry.data.name, digest), digest, entry)
                });

            let best = match interest.child_selector() {
                ChildSelector::Leftmost => candidates.min_by(child_order),
                ChildSelector::Rightmost => candidates.max_by(child_order),
            };
            best.map(|(_, _, entry)| Arc::clone(&entry.data))
        });

        match &found {
            Some(data) => debug!("Cache hit for {}: {}", interest.name, data.name),
            None => debug!("Cache miss for {}", interest.name),
        }
        found
    }

    /// Drop one Data from every bucket it was filed under
    pub fn remove(&self, name: &Name, digest: &[u8; 32]) -> bool {
        let mut removed = false;
        self.trie.update_all(&name.components, |_, bucket| {
            let mut bucket = bucket?;
            removed |= bucket.remove(digest).is_some();
            Some(bucket)
        });
        removed
    }

    /// Drop every Data whose freshness period has elapsed by `now`. Data
    /// without a freshness period is kept. Returns the number of Data dropped.
    pub fn evict_stale(&self, now: Instant) -> usize {
        let mut evicted = HashSet::new();
        self.trie.visit(|_, mut bucket| {
            bucket.retain(|digest, entry| {
                let keep = match entry.data.freshness_period() {
                    Some(_) => entry.data.is_fresh(entry.arrival, now),
                    None => true,
                };
                if !keep {
                    evicted.insert(*digest);
                }
                keep
            });
            Some(bucket)
        });

        if !evicted.is_empty() {
            debug!("Evicted {} stale entries", evicted.len());
        }
        evicted.len()
    }

    /// Number of distinct Data held
    pub fn len(&self) -> usize {
        let mut count = 0;
        self.trie.for_each(|prefix, bucket| {
            count += bucket
                .values()
                .filter(|entry| entry.data.name.len() == prefix.len())
                .count();
        });
        count
    }

    pub fn is_empty(&self) -> bool {
        self.trie.is_empty()
    }

    /// Drop every Data
    pub fn clear(&self) {
        self.trie.clear();
    }
}

/// Next component first, then the whole name, then the digest between Data
/// that share a name
fn child_order(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    a.0.cmp(&b.0)
        .then_with(|| a.2.data.name.cmp(&b.2.data.name))
        .then_with(|| a.1.cmp(b.1))
}

fn hex_prefix(digest: &[u8; 32]) -> String {
    digest[..4].iter().map(|b| format!("{:02x}", b)).collect()
}
