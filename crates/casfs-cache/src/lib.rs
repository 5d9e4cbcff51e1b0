//! # casfs-cache
//!
//! Directory cache (§4.3): directories are immutable and expensive to
//! decode, so the cache holds an identity map from digest to a weak
//! reference, backed by a bounded ring buffer of strong references that
//! keeps recently-used entries alive without preventing eviction.
//!
//! Callers that hold onto an `Arc<Directory>` keep it alive regardless of
//! the ring buffer; the cache never forces retention beyond what its ring
//! buffer or external holders choose.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Weak};

use casfs_codec::Directory;
use tracing::trace;

const DEFAULT_RING_SIZE: usize = 32;

/// A weak-plus-strong two-tier cache keyed by directory digest.
pub struct DirectoryCache<K: Eq + Hash + Clone> {
    weak: HashMap<K, Weak<Directory>>,
    ring: VecDeque<Arc<Directory>>,
    ring_capacity: usize,
}

impl<K: Eq + Hash + Clone> DirectoryCache<K> {
    pub fn new() -> Self {
        DirectoryCache {
            weak: HashMap::new(),
            ring: VecDeque::with_capacity(DEFAULT_RING_SIZE),
            ring_capacity: DEFAULT_RING_SIZE,
        }
    }

    pub fn with_capacity(ring_capacity: usize) -> Self {
        DirectoryCache {
            weak: HashMap::new(),
            ring: VecDeque::with_capacity(ring_capacity),
            ring_capacity,
        }
    }

    /// Returns the cached directory if a live reference (weak or in the
    /// ring) still exists.
    pub fn get(&mut self, key: &K) -> Option<Arc<Directory>> {
        match self.weak.get(key) {
            Some(weak) => match weak.upgrade() {
                Some(strong) => Some(strong),
                None => {
                    self.weak.remove(key);
                    None
                }
            },
            None => None,
        }
    }

    /// Insert a decoded directory, returning the `Arc` callers should hold.
    /// Weak-inserts into the identity map and strong-inserts into the ring,
    /// evicting the oldest ring slot once capacity is reached.
    pub fn put(&mut self, key: K, dir: Directory) -> Arc<Directory> {
        let arc = Arc::new(dir);
        self.weak.insert(key, Arc::downgrade(&arc));
        if self.ring_capacity > 0 {
            if self.ring.len() >= self.ring_capacity {
                self.ring.pop_front();
            }
            self.ring.push_back(arc.clone());
        }
        self.prune_dead();
        arc
    }

    /// Drop every strong reference and identity-map entry. Directories kept
    /// alive by external `Arc` holders remain valid but are no longer
    /// reachable through the cache.
    pub fn clear(&mut self) {
        self.weak.clear();
        self.ring.clear();
    }

    /// Resize the strong-reference ring. Shrinking drops the oldest entries
    /// immediately; their weak entries survive until garbage-collected by
    /// the next `get`/`put`.
    pub fn size(&mut self, n: usize) {
        self.ring_capacity = n;
        while self.ring.len() > n {
            self.ring.pop_front();
        }
    }

    pub fn ring_len(&self) -> usize {
        self.ring.len()
    }

    pub fn weak_len(&self) -> usize {
        self.weak.len()
    }

    /// Opportunistically drop weak-map entries whose referent is gone.
    /// Not required for correctness (`get` already self-heals), but keeps
    /// the map from growing without bound across long-lived caches.
    fn prune_dead(&mut self) {
        if self.weak.len() > self.ring_capacity.max(DEFAULT_RING_SIZE) * 4 {
            self.weak.retain(|_, w| w.strong_count() > 0);
            trace!(remaining = self.weak.len(), "pruned dead weak cache entries");
        }
    }
}

impl<K: Eq + Hash + Clone> Default for DirectoryCache<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casfs_codec::{DirEnt, EntryKind, RawName};

    fn empty_dir() -> Directory {
        Directory::new(Default::default(), vec![])
    }

    fn dir_with_entry(name: &str) -> Directory {
        Directory::new(
            Default::default(),
            vec![DirEnt::bare(RawName::from_str(name), EntryKind::File, None)],
        )
    }

    #[test]
    fn put_then_get_returns_same_directory() {
        let mut cache: DirectoryCache<String> = DirectoryCache::new();
        let arc = cache.put("digest-a".to_string(), dir_with_entry("x"));
        let got = cache.get(&"digest-a".to_string()).unwrap();
        assert!(Arc::ptr_eq(&arc, &got));
    }

    #[test]
    fn get_missing_returns_none() {
        let mut cache: DirectoryCache<String> = DirectoryCache::new();
        assert!(cache.get(&"absent".to_string()).is_none());
    }

    #[test]
    fn eviction_from_ring_does_not_kill_externally_held_arc() {
        let mut cache: DirectoryCache<String> = DirectoryCache::with_capacity(1);
        let held = cache.put("a".to_string(), empty_dir());
        // Second insert evicts "a" from the ring, but `held` keeps it alive.
        cache.put("b".to_string(), empty_dir());
        assert!(cache.get(&"a".to_string()).is_some());
        drop(held);
    }

    #[test]
    fn weak_entry_expires_once_all_strong_refs_drop() {
        let mut cache: DirectoryCache<String> = DirectoryCache::with_capacity(1);
        cache.put("a".to_string(), empty_dir());
        // Evict "a" from the ring (its only strong holder) by inserting more
        // than capacity allows, then nothing should keep it alive.
        cache.put("b".to_string(), empty_dir());
        cache.put("c".to_string(), empty_dir());
        assert!(cache.get(&"a".to_string()).is_none());
    }

    #[test]
    fn clear_drops_all_entries() {
        let mut cache: DirectoryCache<String> = DirectoryCache::new();
        let held = cache.put("a".to_string(), empty_dir());
        cache.clear();
        assert!(cache.get(&"a".to_string()).is_none());
        assert_eq!(cache.ring_len(), 0);
        drop(held);
    }

    #[test]
    fn size_shrinks_ring_capacity() {
        let mut cache: DirectoryCache<String> = DirectoryCache::with_capacity(4);
        for i in 0..4 {
            cache.put(i.to_string(), empty_dir());
        }
        assert_eq!(cache.ring_len(), 4);
        cache.size(2);
        assert_eq!(cache.ring_len(), 2);
    }
}
