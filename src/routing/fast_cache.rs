//! Memoizes single `(from, to, flags)` answers in front of the table lookups.
//!
//! Fixed-capacity arena of entries, each linked into its hash bin and into
//! a global age list. A hit moves the entry to the front of both; an insert
//! into a full cache evicts the globally oldest entry.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use super::Route;
use crate::world::TravelFlags;

const NIL: u32 = u32::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct QueryKey {
    from: u32,
    to: u32,
    flags: TravelFlags,
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    key: QueryKey,
    result: Option<Route>,
    bin_prev: u32,
    bin_next: u32,
    age_prev: u32,
    age_next: u32,
}

#[derive(Debug, Clone)]
pub struct FastRoutingResultsCache {
    entries: Vec<Entry>,
    capacity: usize,
    bins: Vec<u32>,
    /// Most recently used.
    newest: u32,
    /// Next eviction victim.
    oldest: u32,
    hits: u64,
    misses: u64,
}

impl FastRoutingResultsCache {
    pub fn new(capacity: usize, num_bins: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            bins: vec![NIL; num_bins.max(1)],
            newest: NIL,
            oldest: NIL,
            hits: 0,
            misses: 0,
        }
    }

    fn bin_of(&self, key: &QueryKey) -> usize {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        (hasher.finish() % self.bins.len() as u64) as usize
    }

    /// `Some(result)` on a hit; the inner `None` is a cached "no route".
    pub fn get(&mut self, from: u32, to: u32, flags: TravelFlags) -> Option<Option<Route>> {
        let key = QueryKey { from, to, flags };
        let bin = self.bin_of(&key);
        let mut index = self.bins[bin];
        while index != NIL {
            let entry = &self.entries[index as usize];
            if entry.key == key {
                let result = entry.result;
                self.unlink_bin(index, bin);
                self.link_bin_front(index, bin);
                self.unlink_age(index);
                self.link_age_newest(index);
                self.hits += 1;
                return Some(result);
            }
            index = entry.bin_next;
        }
        self.misses += 1;
        None
    }

    pub fn insert(&mut self, from: u32, to: u32, flags: TravelFlags, result: Option<Route>) {
        let key = QueryKey { from, to, flags };
        let bin = self.bin_of(&key);

        let index = if self.entries.len() < self.capacity {
            self.entries.push(Entry { key, result, bin_prev: NIL, bin_next: NIL, age_prev: NIL, age_next: NIL });
            (self.entries.len() - 1) as u32
        } else {
            let victim = self.oldest;
            let victim_bin = self.bin_of(&self.entries[victim as usize].key);
            self.unlink_bin(victim, victim_bin);
            self.unlink_age(victim);
            let entry = &mut self.entries[victim as usize];
            entry.key = key;
            entry.result = result;
            victim
        };
        self.link_bin_front(index, bin);
        self.link_age_newest(index);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.bins.iter_mut().for_each(|b| *b = NIL);
        self.newest = NIL;
        self.oldest = NIL;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    fn unlink_bin(&mut self, index: u32, bin: usize) {
        let Entry { bin_prev, bin_next, .. } = self.entries[index as usize];
        if bin_prev != NIL {
            self.entries[bin_prev as usize].bin_next = bin_next;
        } else {
            self.bins[bin] = bin_next;
        }
        if bin_next != NIL {
            self.entries[bin_next as usize].bin_prev = bin_prev;
        }
    }

    fn link_bin_front(&mut self, index: u32, bin: usize) {
        let head = self.bins[bin];
        {
            let entry = &mut self.entries[index as usize];
            entry.bin_prev = NIL;
            entry.bin_next = head;
        }
        if head != NIL {
            self.entries[head as usize].bin_prev = index;
        }
        self.bins[bin] = index;
    }

    fn unlink_age(&mut self, index: u32) {
        let Entry { age_prev, age_next, .. } = self.entries[index as usize];
        if age_prev != NIL {
            self.entries[age_prev as usize].age_next = age_next;
        } else {
            self.oldest = age_next;
        }
        if age_next != NIL {
            self.entries[age_next as usize].age_prev = age_prev;
        } else {
            self.newest = age_prev;
        }
    }

    /// Age list runs from `oldest` via `age_next` to `newest`.
    fn link_age_newest(&mut self, index: u32) {
        let newest = self.newest;
        {
            let entry = &mut self.entries[index as usize];
            entry.age_prev = newest;
            entry.age_next = NIL;
        }
        if newest != NIL {
            self.entries[newest as usize].age_next = index;
        } else {
            self.oldest = index;
        }
        self.newest = index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(time: u32) -> Option<Route> {
        Some(Route { reach_num: time, travel_time: time })
    }

    #[test]
    fn test_hit_returns_cached_result() {
        let mut cache = FastRoutingResultsCache::new(8, 4);
        assert!(cache.get(1, 2, TravelFlags::ALLOWED).is_none());
        cache.insert(1, 2, TravelFlags::ALLOWED, route(30));
        assert_eq!(cache.get(1, 2, TravelFlags::ALLOWED), Some(route(30)));
        assert!(cache.get(1, 2, TravelFlags::PREFERRED).is_none(), "flags are part of the key");
        assert!(cache.get(2, 1, TravelFlags::ALLOWED).is_none(), "queries are directed");
    }

    #[test]
    fn test_negative_results_are_cached() {
        let mut cache = FastRoutingResultsCache::new(8, 4);
        cache.insert(3, 4, TravelFlags::ALLOWED, None);
        assert_eq!(cache.get(3, 4, TravelFlags::ALLOWED), Some(None));
    }

    #[test]
    fn test_full_cache_evicts_least_recently_used() {
        let mut cache = FastRoutingResultsCache::new(3, 2);
        cache.insert(1, 10, TravelFlags::ALLOWED, route(1));
        cache.insert(2, 10, TravelFlags::ALLOWED, route(2));
        cache.insert(3, 10, TravelFlags::ALLOWED, route(3));
        // Touch the oldest so the second entry becomes the victim.
        assert!(cache.get(1, 10, TravelFlags::ALLOWED).is_some());
        cache.insert(4, 10, TravelFlags::ALLOWED, route(4));

        assert_eq!(cache.len(), 3);
        assert!(cache.get(2, 10, TravelFlags::ALLOWED).is_none(), "LRU entry must be evicted");
        assert_eq!(cache.get(1, 10, TravelFlags::ALLOWED), Some(route(1)));
        assert_eq!(cache.get(3, 10, TravelFlags::ALLOWED), Some(route(3)));
        assert_eq!(cache.get(4, 10, TravelFlags::ALLOWED), Some(route(4)));
    }

    #[test]
    fn test_single_bin_chains_stay_consistent_under_churn() {
        let mut cache = FastRoutingResultsCache::new(16, 1);
        for i in 0..200u32 {
            cache.insert(i, i + 1, TravelFlags::ALLOWED, route(i));
            assert_eq!(cache.get(i, i + 1, TravelFlags::ALLOWED), Some(route(i)));
        }
        assert_eq!(cache.len(), 16);
        assert!(cache.get(183, 184, TravelFlags::ALLOWED).is_none());
        for i in 184..200u32 {
            assert_eq!(cache.get(i, i + 1, TravelFlags::ALLOWED), Some(route(i)), "entry {i} must survive");
        }
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut cache = FastRoutingResultsCache::new(4, 4);
        cache.insert(1, 2, TravelFlags::ALLOWED, route(5));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get(1, 2, TravelFlags::ALLOWED).is_none());
    }
}
