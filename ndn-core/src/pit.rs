//! Pending Interest Table.
//!
//! Entries are filed at the exact Interest name and keyed by the delivery
//! channel the Interest arrived on, so a channel re-expressing the same
//! Interest refreshes its entry instead of adding a second one.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::time::{Duration, Instant};

use log::debug;

use crate::lpm::SyncTrie;
use crate::name::Name;
use crate::packets::{Data, Interest};
use crate::tlv::TlvError;

/// Lifetime applied to Interests that carry none
pub const DEFAULT_INTEREST_LIFETIME: Duration = Duration::from_millis(4000);

/// What the PIT remembers about one pending Interest
#[derive(Debug, Clone)]
pub struct PitRecord {
    pub interest: Interest,
    pub expires_at: Instant,
}

/// Pending Interests keyed by name, then by delivery channel `C`
#[derive(Debug)]
pub struct Pit<C> {
    trie: SyncTrie<HashMap<C, PitRecord>>,
    default_lifetime: Duration,
}

impl<C> Default for Pit<C> {
    fn default() -> Self {
        Self {
            trie: SyncTrie::default(),
            default_lifetime: DEFAULT_INTEREST_LIFETIME,
        }
    }
}

impl<C: Eq + Hash + Clone> Pit<C> {
    /// An empty PIT using [`DEFAULT_INTEREST_LIFETIME`]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty PIT applying `default_lifetime` to Interests without one
    pub fn with_default_lifetime(default_lifetime: Duration) -> Self {
        Self {
            trie: SyncTrie::new(),
            default_lifetime,
        }
    }

    /// Record that `channel` is waiting for `interest`. Returns false if the
    /// channel already had an entry at this name, which is refreshed.
    pub fn insert(&self, interest: &Interest, channel: C) -> bool {
        self.insert_at(interest, channel, Instant::now())
    }

    pub fn insert_at(&self, interest: &Interest, channel: C, now: Instant) -> bool {
        let lifetime = interest.interest_lifetime.unwrap_or(self.default_lifetime);
        let record = PitRecord {
            interest: interest.clone(),
            expires_at: now + lifetime,
        };

        let mut added = false;
        self.trie.modify(&interest.name.components, |bucket| {
            let mut bucket = bucket.unwrap_or_default();
            added = bucket.insert(channel, record).is_none();
            Some(bucket)
        });

        debug!(
            "PIT {} {} (lifetime {:?})",
            if added { "added" } else { "refreshed" },
            interest.name,
            lifetime
        );
        added
    }

    /// Channels waiting at the longest recorded prefix of `name`
    pub fn lookup(&self, name: &Name) -> Vec<C> {
        self.trie.match_longest(&name.components, |bucket| {
            bucket
                .map(|bucket| bucket.keys().cloned().collect())
                .unwrap_or_default()
        })
    }

    /// Deliver `data`: every unexpired entry whose Interest it satisfies is
    /// removed and its channel returned once.
    pub fn satisfy(&self, data: &Data) -> Result<Vec<C>, TlvError> {
        self.satisfy_at(data, Instant::now())
    }

    pub fn satisfy_at(&self, data: &Data, now: Instant) -> Result<Vec<C>, TlvError> {
        let digest = data.implicit_digest()?;
        let mut seen = HashSet::new();
        let mut delivered = Vec::new();

        let mut deliver = |bucket: Option<HashMap<C, PitRecord>>| {
            let mut bucket = bucket?;
            bucket.retain(|channel, record| {
                let matched = record.expires_at > now
                    && record.interest.matches_data(data, &digest, now, now);
                if matched && seen.insert(channel.clone()) {
                    delivered.push(channel.clone());
                }
                !matched
            });
            Some(bucket)
        };
        self.trie.update_all(&data.name.components, |_, bucket| deliver(bucket));
        // Interests for the empty name sit at the root, which update_all skips
        self.trie.modify(&[], deliver);

        debug!("PIT satisfied {} channel(s) for {}", delivered.len(), data.name);
        Ok(delivered)
    }

    /// Withdraw `channel`'s entry at exactly `name`
    pub fn remove(&self, name: &Name, channel: &C) -> bool {
        let mut removed = false;
        self.trie.modify(&name.components, |bucket| {
            let mut bucket = bucket?;
            removed = bucket.remove(channel).is_some();
            Some(bucket)
        });
        removed
    }

    /// Drop entries whose lifetime has run out, returning how many
    pub fn evict_expired(&self, now: Instant) -> usize {
        let mut expired = 0;
        self.trie.visit(|_, mut bucket| {
            let before = bucket.len();
            bucket.retain(|_, record| record.expires_at > now);
            expired += before - bucket.len();
            Some(bucket)
        });

        if expired > 0 {
            debug!("PIT expired {} entries", expired);
        }
        expired
    }

    /// Total number of pending entries
    pub fn len(&self) -> usize {
        let mut count = 0;
        self.trie.for_each(|_, bucket| count += bucket.len());
        count
    }

    pub fn is_empty(&self) -> bool {
        self.trie.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exclude::Exclude;
    use crate::name::Component;
    use crate::selectors::Selectors;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    fn interest(uri: &str) -> Interest {
        Interest::new(name(uri))
    }

    #[test]
    fn test_insert_is_exact_and_lookup_is_longest() {
        let pit = Pit::new();
        assert!(pit.insert(&interest("/a/b"), 1u32));
        assert!(pit.insert(&interest("/a/b"), 2u32));
        assert!(!pit.insert(&interest("/a/b"), 1u32));
        assert_eq!(pit.len(), 2);

        let mut channels = pit.lookup(&name("/a/b/c"));
        channels.sort();
        assert_eq!(channels, vec![1, 2]);
        assert!(pit.lookup(&name("/a")).is_empty());
    }

    #[test]
    fn test_satisfy_delivers_and_removes() {
        crate::init_test_logging();
        let pit = Pit::new();
        pit.insert(&interest("/a"), "face-a");
        pit.insert(&interest("/a/b"), "face-b");
        pit.insert(&interest("/a/b"), "face-a");
        pit.insert(&interest("/x"), "face-x");

        let data = Data::new(name("/a/b/c"), vec![1]);
        let mut delivered = pit.satisfy(&data).unwrap();
        delivered.sort();
        assert_eq!(delivered, vec!["face-a", "face-b"]);
        assert_eq!(pit.len(), 1);
        assert!(pit.satisfy(&data).unwrap().is_empty());
    }

    #[test]
    fn test_empty_name_interest_is_satisfied() {
        let pit = Pit::new();
        pit.insert(&interest("/"), 1);
        pit.insert(&interest("/a"), 2);
        assert_eq!(pit.lookup(&name("/a/b")), vec![2]);
        assert_eq!(pit.lookup(&name("/z")), vec![1]);

        let mut delivered = pit.satisfy(&Data::new(name("/a/b"), vec![])).unwrap();
        delivered.sort();
        assert_eq!(delivered, vec![1, 2]);
        assert!(pit.is_empty());
    }

    #[test]
    fn test_satisfy_applies_selectors() {
        let pit = Pit::new();
        let exclude = Exclude::from_components(&[Some(Component::from("b"))]).unwrap();
        let picky = interest("/a").with_selectors(Selectors::new().with_exclude(exclude));
        pit.insert(&picky, 1);
        pit.insert(&interest("/a").with_must_be_fresh(true), 2);

        // excluded component and no freshness period
        assert!(pit.satisfy(&Data::new(name("/a/b"), vec![])).unwrap().is_empty());
        assert_eq!(pit.len(), 2);

        let fresh = Data::new(name("/a/c"), vec![]).with_freshness_period(Duration::from_secs(1));
        let mut delivered = pit.satisfy(&fresh).unwrap();
        delivered.sort();
        assert_eq!(delivered, vec![1, 2]);
        assert!(pit.is_empty());
    }

    #[test]
    fn test_expiry() {
        let pit = Pit::with_default_lifetime(Duration::from_millis(100));
        let now = Instant::now();
        pit.insert_at(&interest("/short"), 1, now);
        pit.insert_at(
            &interest("/long").with_lifetime(Duration::from_secs(10)),
            2,
            now,
        );

        // expired entries are not delivered
        let later = now + Duration::from_secs(1);
        assert!(pit
            .satisfy_at(&Data::new(name("/short"), vec![]), later)
            .unwrap()
            .is_empty());

        assert_eq!(pit.evict_expired(later), 1);
        assert_eq!(pit.len(), 1);
        assert_eq!(pit.lookup(&name("/long")), vec![2]);
    }

    #[test]
    fn test_remove() {
        let pit = Pit::new();
        pit.insert(&interest("/a"), 7);
        assert!(!pit.remove(&name("/a/b"), &7));
        assert!(!pit.remove(&name("/a"), &8));
        assert!(pit.remove(&name("/a"), &7));
        assert!(pit.is_empty());
    }
}
