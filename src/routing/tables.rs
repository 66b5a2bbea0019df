//! Routing tables and the byte-budgeted LRU arena holding them.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::world::TravelFlags;

const NIL: u32 = u32::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TableKind {
    /// Times from every area of `cluster` to the goal area.
    Area,
    /// Times from every portal to the goal area.
    Portal,
}

/// Identity of a table. `cluster` is the cluster the table was computed in
/// (for portal tables, the goal's cluster).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TableKey {
    pub kind: TableKind,
    pub cluster: u32,
    pub goal_area: u32,
    pub flags: TravelFlags,
}

impl TableKey {
    pub fn area(cluster: u32, goal_area: u32, flags: TravelFlags) -> Self {
        Self { kind: TableKind::Area, cluster, goal_area, flags }
    }

    pub fn portal(cluster: u32, goal_area: u32, flags: TravelFlags) -> Self {
        Self { kind: TableKind::Portal, cluster, goal_area, flags }
    }
}

/// Immutable once built; shared between caches through `Arc`.
///
/// Entry `i` is the time from cluster area (or portal) `i` to the goal and the
/// reachability to take first. A time of 0 means unreachable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingTable {
    pub travel_times: Box<[u32]>,
    pub reachabilities: Box<[u32]>,
}

impl RoutingTable {
    pub fn new(len: usize) -> Self {
        Self { travel_times: vec![0; len].into_boxed_slice(), reachabilities: vec![0; len].into_boxed_slice() }
    }

    pub fn len(&self) -> usize {
        self.travel_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.travel_times.is_empty()
    }

    /// Approximate heap footprint, charged against the cache budget.
    pub fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.len() * (std::mem::size_of::<u32>() * 2)
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<(u32, u32)> {
        match self.travel_times.get(index) {
            Some(&time) if time != 0 => Some((time, self.reachabilities[index])),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Slot {
    key: TableKey,
    table: Arc<RoutingTable>,
    bytes: usize,
    age_prev: u32,
    age_next: u32,
    chain_prev: u32,
    chain_next: u32,
}

/// Chains group tables that are invalidated together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Chain {
    Cluster(u32),
    Portals,
}

impl Chain {
    fn of(key: &TableKey) -> Self {
        match key.kind {
            TableKind::Area => Chain::Cluster(key.cluster),
            TableKind::Portal => Chain::Portals,
        }
    }
}

/// Arena of tables linked into a global age list (oldest evicted first) and
/// into per-cluster chains.
#[derive(Debug)]
pub struct TableCache {
    slots: Vec<Option<Slot>>,
    free: Vec<u32>,
    index: FxHashMap<TableKey, u32>,
    chains: FxHashMap<Chain, u32>,
    oldest: u32,
    newest: u32,
    bytes_used: usize,
    byte_budget: usize,
    evictions: u64,
}

impl TableCache {
    pub fn new(byte_budget: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: FxHashMap::default(),
            chains: FxHashMap::default(),
            oldest: NIL,
            newest: NIL,
            bytes_used: 0,
            byte_budget,
            evictions: 0,
        }
    }

    /// Look a table up and mark it as recently used.
    pub fn get(&mut self, key: &TableKey) -> Option<Arc<RoutingTable>> {
        let slot = *self.index.get(key)?;
        self.unlink_age(slot);
        self.link_age_newest(slot);
        self.slot(slot).map(|s| Arc::clone(&s.table))
    }

    /// Look a table up without touching the age list.
    pub fn peek(&self, key: &TableKey) -> Option<&Arc<RoutingTable>> {
        let slot = *self.index.get(key)?;
        self.slot(slot).map(|s| &s.table)
    }

    pub fn contains(&self, key: &TableKey) -> bool {
        self.index.contains_key(key)
    }

    /// Store a table, evicting the oldest ones until it fits the budget.
    /// A table larger than the whole budget is still stored, alone.
    pub fn insert(&mut self, key: TableKey, table: Arc<RoutingTable>) {
        if let Some(&existing) = self.index.get(&key) {
            self.remove_slot(existing);
        }
        let bytes = table.byte_size();
        while self.bytes_used + bytes > self.byte_budget && self.oldest != NIL {
            let victim = self.oldest;
            self.remove_slot(victim);
            self.evictions += 1;
        }

        let slot = Slot { key, table, bytes, age_prev: NIL, age_next: NIL, chain_prev: NIL, chain_next: NIL };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(slot);
                index
            }
            None => {
                self.slots.push(Some(slot));
                (self.slots.len() - 1) as u32
            }
        };
        self.index.insert(key, index);
        self.bytes_used += bytes;
        self.link_age_newest(index);
        self.link_chain(index, Chain::of(&key));
    }

    /// Drop every area table computed in `cluster`.
    pub fn remove_cluster(&mut self, cluster: u32) -> usize {
        self.remove_chain(Chain::Cluster(cluster))
    }

    pub fn remove_portal_tables(&mut self) -> usize {
        self.remove_chain(Chain::Portals)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.chains.clear();
        self.oldest = NIL;
        self.newest = NIL;
        self.bytes_used = 0;
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Keys from oldest to newest.
    pub fn keys_by_age(&self) -> Vec<TableKey> {
        let mut keys = Vec::with_capacity(self.len());
        let mut index = self.oldest;
        while let Some(slot) = self.slot(index) {
            keys.push(slot.key);
            index = slot.age_next;
        }
        keys
    }

    fn slot(&self, index: u32) -> Option<&Slot> {
        self.slots.get(index as usize).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, index: u32) -> Option<&mut Slot> {
        self.slots.get_mut(index as usize).and_then(Option::as_mut)
    }

    fn remove_chain(&mut self, chain: Chain) -> usize {
        let mut removed = 0;
        while let Some(&head) = self.chains.get(&chain) {
            self.remove_slot(head);
            removed += 1;
        }
        removed
    }

    fn remove_slot(&mut self, index: u32) {
        let Some((key, bytes)) = self.slot(index).map(|s| (s.key, s.bytes)) else {
            return;
        };
        self.unlink_age(index);
        self.unlink_chain(index, Chain::of(&key));
        self.index.remove(&key);
        self.bytes_used -= bytes;
        self.slots[index as usize] = None;
        self.free.push(index);
    }

    fn unlink_age(&mut self, index: u32) {
        let Some((prev, next)) = self.slot(index).map(|s| (s.age_prev, s.age_next)) else {
            return;
        };
        match self.slot_mut(prev) {
            Some(p) => p.age_next = next,
            None => self.oldest = next,
        }
        match self.slot_mut(next) {
            Some(n) => n.age_prev = prev,
            None => self.newest = prev,
        }
    }

    fn link_age_newest(&mut self, index: u32) {
        let newest = self.newest;
        if let Some(slot) = self.slot_mut(index) {
            slot.age_prev = newest;
            slot.age_next = NIL;
        }
        match self.slot_mut(newest) {
            Some(n) => n.age_next = index,
            None => self.oldest = index,
        }
        self.newest = index;
    }

    fn link_chain(&mut self, index: u32, chain: Chain) {
        let head = self.chains.get(&chain).copied().unwrap_or(NIL);
        if let Some(slot) = self.slot_mut(index) {
            slot.chain_prev = NIL;
            slot.chain_next = head;
        }
        if let Some(h) = self.slot_mut(head) {
            h.chain_prev = index;
        }
        self.chains.insert(chain, index);
    }

    fn unlink_chain(&mut self, index: u32, chain: Chain) {
        let Some((prev, next)) = self.slot(index).map(|s| (s.chain_prev, s.chain_next)) else {
            return;
        };
        if let Some(n) = self.slot_mut(next) {
            n.chain_prev = prev;
        }
        match self.slot_mut(prev) {
            Some(p) => p.chain_next = next,
            None => {
                if next == NIL {
                    self.chains.remove(&chain);
                } else {
                    self.chains.insert(chain, next);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(len: usize) -> Arc<RoutingTable> {
        Arc::new(RoutingTable::new(len))
    }

    fn key(cluster: u32, goal: u32) -> TableKey {
        TableKey::area(cluster, goal, TravelFlags::ALLOWED)
    }

    #[test]
    fn test_budget_evicts_oldest_first() {
        let size = table(10).byte_size();
        let mut cache = TableCache::new(size * 3);
        cache.insert(key(1, 1), table(10));
        cache.insert(key(1, 2), table(10));
        cache.insert(key(2, 3), table(10));
        assert!(cache.get(&key(1, 1)).is_some(), "touch the oldest table");
        cache.insert(key(2, 4), table(10));

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&key(1, 2)), "least recently used table must go");
        assert_eq!(cache.keys_by_age(), vec![key(2, 3), key(1, 1), key(2, 4)]);
        assert!(cache.bytes_used() <= size * 3);
        assert_eq!(cache.evictions(), 1);
    }

    #[test]
    fn test_remove_cluster_only_touches_that_cluster() {
        let mut cache = TableCache::new(usize::MAX);
        cache.insert(key(1, 1), table(4));
        cache.insert(key(1, 2), table(4));
        cache.insert(key(2, 3), table(4));
        cache.insert(TableKey::portal(1, 9, TravelFlags::ALLOWED), table(4));

        assert_eq!(cache.remove_cluster(1), 2);
        assert!(cache.contains(&key(2, 3)));
        assert!(cache.contains(&TableKey::portal(1, 9, TravelFlags::ALLOWED)));
        assert_eq!(cache.remove_portal_tables(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.keys_by_age(), vec![key(2, 3)]);
    }

    #[test]
    fn test_freed_slots_are_reused() {
        let mut cache = TableCache::new(usize::MAX);
        for goal in 0..8 {
            cache.insert(key(1, goal), table(2));
        }
        cache.remove_cluster(1);
        for goal in 0..8 {
            cache.insert(key(3, goal), table(2));
        }
        assert_eq!(cache.slots.len(), 8, "arena must not grow while free slots exist");
        assert_eq!(cache.remove_cluster(3), 8);
        assert!(cache.is_empty());
        assert_eq!(cache.bytes_used(), 0);
    }

    #[test]
    fn test_oversized_table_is_kept_alone() {
        let mut cache = TableCache::new(16);
        cache.insert(key(1, 1), table(1));
        cache.insert(key(1, 2), table(1000));
        assert_eq!(cache.len(), 1);
        assert!(cache.peek(&key(1, 2)).is_some());
    }

    #[test]
    fn test_shared_table_outlives_eviction() {
        let mut cache = TableCache::new(table(4).byte_size());
        let shared = table(4);
        cache.insert(key(1, 1), Arc::clone(&shared));
        cache.insert(key(1, 2), table(4));
        assert!(!cache.contains(&key(1, 1)));
        assert_eq!(Arc::strong_count(&shared), 1, "evicted slot must release its handle");
    }
}
