//! Per-instance route cache with its own set of blocked areas.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use bevy::prelude::*;
use fixedbitset::FixedBitSet;
use rustc_hash::FxHasher;

use super::compute::{compute_area_table, compute_portal_table};
use super::disable::{AreaListRequest, DisableZoneRequest};
use super::fast_cache::FastRoutingResultsCache;
use super::tables::{RoutingTable, TableCache, TableKey};
use super::Route;
use crate::elements_mask::ElementsMask;
use crate::world::{TravelFlags, TravelType, World};
use crate::NavConfig;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RouteCacheStats {
    pub tables: usize,
    pub table_bytes: usize,
    pub evictions: u64,
    pub area_tables_computed: u64,
    pub portal_tables_computed: u64,
    pub tables_shared: u64,
    pub queries: u64,
    pub fast_hits: u64,
    pub fast_misses: u64,
}

/// Route tables and query results for one blocked-areas state.
///
/// Tables are computed on demand and dropped when the areas they depend on
/// change state. Before computing a table the cache asks its [`Siblings`] for
/// one computed under the exact same blocked areas.
pub struct RouteCache {
    tables: TableCache,
    fast: FastRoutingResultsCache,
    disabled: FixedBitSet,
    old_disabled: FixedBitSet,
    /// Hash of the disabled set, used to skip siblings cheaply.
    digest: u64,
    short_fall_height: f32,
    area_tables_computed: u64,
    portal_tables_computed: u64,
    tables_shared: u64,
    queries: u64,
}

impl RouteCache {
    pub fn new(world: &World, config: &NavConfig) -> Self {
        let disabled = FixedBitSet::with_capacity(world.num_areas());
        Self {
            tables: TableCache::new(config.route_cache_bytes),
            fast: FastRoutingResultsCache::new(config.fast_cache_capacity, config.fast_cache_bins),
            old_disabled: disabled.clone(),
            digest: digest_of(&disabled),
            disabled,
            short_fall_height: config.short_fall_height,
            area_tables_computed: 0,
            portal_tables_computed: 0,
            tables_shared: 0,
            queries: 0,
        }
    }

    pub fn digest(&self) -> u64 {
        self.digest
    }

    pub fn is_area_disabled(&self, area: u32) -> bool {
        self.disabled.contains(area as usize)
    }

    pub fn has_disabled_areas(&self) -> bool {
        !self.disabled.is_clear()
    }

    pub fn disabled_areas(&self) -> impl Iterator<Item = u32> + '_ {
        self.disabled.ones().map(|a| a as u32)
    }

    fn same_disabled_state(&self, other: &RouteCache) -> bool {
        self.digest == other.digest && self.disabled.symmetric_difference(&other.disabled).next().is_none()
    }

    pub fn stats(&self) -> RouteCacheStats {
        RouteCacheStats {
            tables: self.tables.len(),
            table_bytes: self.tables.bytes_used(),
            evictions: self.tables.evictions(),
            area_tables_computed: self.area_tables_computed,
            portal_tables_computed: self.portal_tables_computed,
            tables_shared: self.tables_shared,
            queries: self.queries,
            fast_hits: self.fast.hits(),
            fast_misses: self.fast.misses(),
        }
    }

    /// Drop every table and cached answer, keeping the blocked areas.
    pub fn clear(&mut self) {
        self.tables.clear();
        self.fast.clear();
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Best route from `from` to `to` using only the movement `flags` allow.
    ///
    /// `None` means the goal cannot be reached. Invalid areas and flags
    /// without any traversal bit are caller bugs: they assert in debug builds
    /// and report no route otherwise.
    pub fn find_route(
        &mut self,
        world: &World,
        mask: &mut ElementsMask,
        siblings: &Siblings<'_>,
        from: u32,
        to: u32,
        flags: TravelFlags,
    ) -> Option<Route> {
        let valid = world.is_valid_area(from) && world.is_valid_area(to) && flags.is_usable();
        debug_assert!(valid, "invalid route query {from} -> {to} with flags {:#x}", flags.0);
        if !valid {
            return None;
        }
        if from == to {
            return Some(Route::TRIVIAL);
        }
        // Areas without a cluster have no routing tables.
        if world.area_cluster(from) == 0 || world.area_cluster(to) == 0 {
            return None;
        }
        self.queries += 1;
        crate::profile_log!(self.queries, "[PERF] Route cache after {} queries: {:?}", self.queries, self.stats());
        if let Some(cached) = self.fast.get(from, to, flags) {
            return cached;
        }
        let route = self.route_to_goal(world, mask, siblings, from, to, flags);
        self.fast.insert(from, to, flags, route);
        route
    }

    fn route_to_goal(
        &mut self,
        world: &World,
        mask: &mut ElementsMask,
        siblings: &Siblings<'_>,
        from: u32,
        to: u32,
        flags: TravelFlags,
    ) -> Option<Route> {
        let from_settings = world.settings(from);
        let to_settings = world.settings(to);
        let mut start_cluster = world.area_cluster(from);
        let mut goal_cluster = world.area_cluster(to);

        // A portal belongs to both clusters it separates.
        if from_settings.is_portal() && world.portal(from_settings.cluster.unsigned_abs()).touches(goal_cluster) {
            start_cluster = goal_cluster;
        }
        if to_settings.is_portal() && world.portal(to_settings.cluster.unsigned_abs()).touches(start_cluster) {
            goal_cluster = start_cluster;
        }

        if start_cluster > 0 && start_cluster == goal_cluster {
            let table = self.area_table(world, mask, siblings, goal_cluster, to, flags);
            let route = world
                .cluster_area_index(goal_cluster, from)
                .and_then(|index| table.get(index as usize))
                .map(|(travel_time, reach_num)| Route { reach_num, travel_time });
            if route.is_some() {
                return route;
            }
        }

        let portal_table = self.portal_table(world, mask, siblings, to, flags);

        if from_settings.is_portal() {
            let portal_num = from_settings.cluster.unsigned_abs();
            return portal_table
                .get(portal_num as usize)
                .map(|(travel_time, reach_num)| Route { reach_num, travel_time });
        }

        let start_cluster = world.area_cluster(from);
        let start_index = world.cluster_area_index(start_cluster, from)? as usize;
        let mut best: Option<Route> = None;
        for &portal_num in world.cluster_portals(start_cluster) {
            let Some((portal_time, _)) = portal_table.get(portal_num as usize) else {
                continue;
            };
            let portal_area = world.portal(portal_num).area;
            let table = self.area_table(world, mask, siblings, start_cluster, portal_area, flags);
            let Some((to_portal, reach_num)) = table.get(start_index) else {
                continue;
            };
            let travel_time = portal_time + to_portal + world.portal_max_travel_time(portal_num);
            if best.is_none_or(|b| travel_time < b.travel_time) {
                best = Some(Route { reach_num, travel_time });
            }
        }
        best
    }

    /// Time to walk from `from` to `to` without jumping, riding or falling
    /// further than the short-fall height, following the route hop by hop.
    pub fn travel_time_walking_or_falling_short(
        &mut self,
        world: &World,
        mask: &mut ElementsMask,
        siblings: &Siblings<'_>,
        from: u32,
        to: u32,
    ) -> Option<u32> {
        if from == to {
            return world.is_valid_area(from).then_some(0);
        }
        let mut area = from;
        let mut entry = world.area(from).center;
        let mut total = 0u32;
        for _ in 1..world.num_areas() {
            let route = self.find_route(world, mask, siblings, area, to, TravelFlags::WALK_OR_FALL)?;
            let reach = world.reachability(route.reach_num);
            match reach.kind() {
                Some(TravelType::Walk) => {}
                Some(TravelType::WalkOffLedge) if reach.start.z - reach.end.z <= self.short_fall_height => {}
                _ => return None,
            }
            total += world.area_travel_time(area, entry, reach.start) + reach.travel_time as u32;
            area = reach.area;
            entry = reach.end;
            if area == to {
                return Some(total);
            }
        }
        warn!("[ROUTE CACHE] Walking route {} -> {} did not converge", from, to);
        None
    }

    // ------------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------------

    fn shared_or_computed(
        &mut self,
        siblings: &Siblings<'_>,
        key: TableKey,
        compute: impl FnOnce(&mut Self) -> RoutingTable,
    ) -> Arc<RoutingTable> {
        if let Some(table) = self.tables.get(&key) {
            return table;
        }
        if let Some(table) = siblings.find_table(self, &key) {
            self.tables_shared += 1;
            self.tables.insert(key, Arc::clone(&table));
            return table;
        }
        let table = Arc::new(compute(self));
        self.tables.insert(key, Arc::clone(&table));
        table
    }

    fn area_table(
        &mut self,
        world: &World,
        mask: &mut ElementsMask,
        siblings: &Siblings<'_>,
        cluster: u32,
        goal_area: u32,
        flags: TravelFlags,
    ) -> Arc<RoutingTable> {
        let key = TableKey::area(cluster, goal_area, flags);
        self.shared_or_computed(siblings, key, |cache| {
            cache.area_tables_computed += 1;
            compute_area_table(world, mask, &cache.disabled, cluster, goal_area, flags)
        })
    }

    fn portal_table(
        &mut self,
        world: &World,
        mask: &mut ElementsMask,
        siblings: &Siblings<'_>,
        goal_area: u32,
        flags: TravelFlags,
    ) -> Arc<RoutingTable> {
        let key = TableKey::portal(world.area_cluster(goal_area), goal_area, flags);
        self.shared_or_computed(siblings, key, |cache| {
            cache.portal_tables_computed += 1;
            compute_portal_table(world, goal_area, &mut |cluster, area| {
                cache.area_table(world, mask, siblings, cluster, area, flags)
            })
        })
    }

    // ------------------------------------------------------------------------
    // Blocked areas
    // ------------------------------------------------------------------------

    /// Replace the blocked areas with the union of all `requests`.
    ///
    /// Only tables depending on areas whose state flipped are dropped: the
    /// area tables of their clusters (both clusters for a portal) and every
    /// portal table. Returns whether anything changed.
    pub fn set_disabled_zones(&mut self, world: &World, requests: &[&dyn DisableZoneRequest]) -> bool {
        std::mem::swap(&mut self.old_disabled, &mut self.disabled);
        self.disabled.clear();
        self.disabled.grow(world.num_areas());

        let mut areas = Vec::new();
        for request in requests {
            areas.clear();
            request.disabled_areas(world, &mut areas);
            for &area in &areas {
                if world.is_valid_area(area) {
                    self.disabled.insert(area as usize);
                } else {
                    debug!("[ROUTE CACHE] Ignoring invalid disabled area {}", area);
                }
            }
        }

        let changed: Vec<u32> = self.disabled.symmetric_difference(&self.old_disabled).map(|a| a as u32).collect();
        if changed.is_empty() {
            return false;
        }

        let mut dropped = 0;
        for &area in &changed {
            let settings = world.settings(area);
            if settings.is_portal() {
                let portal = world.portal(settings.cluster.unsigned_abs());
                dropped += self.tables.remove_cluster(portal.front_cluster);
                dropped += self.tables.remove_cluster(portal.back_cluster);
            } else {
                dropped += self.tables.remove_cluster(settings.cluster as u32);
            }
        }
        dropped += self.tables.remove_portal_tables();
        self.fast.clear();
        self.digest = digest_of(&self.disabled);

        debug!(
            "[ROUTE CACHE] {} areas changed state, {} now disabled, dropped {} tables",
            changed.len(),
            self.disabled.count_ones(..),
            dropped
        );
        true
    }

    /// Convenience over [`set_disabled_zones`](Self::set_disabled_zones) for a plain area list.
    pub fn set_disabled_areas(&mut self, world: &World, areas: &[u32]) -> bool {
        let request = AreaListRequest::new(areas.iter().copied());
        self.set_disabled_zones(world, &[&request])
    }
}

fn digest_of(disabled: &FixedBitSet) -> u64 {
    let mut hasher = FxHasher::default();
    for area in disabled.ones() {
        area.hash(&mut hasher);
    }
    hasher.finish()
}

// ============================================================================
// SHARING
// ============================================================================

/// Read-only view of the other caches of a pool, used to borrow their tables.
#[derive(Clone, Copy)]
pub struct Siblings<'a> {
    before: &'a [Option<RouteCache>],
    after: &'a [Option<RouteCache>],
}

impl Siblings<'static> {
    /// No siblings: every table is computed locally.
    pub fn none() -> Self {
        Siblings { before: &[], after: &[] }
    }
}

impl Siblings<'_> {
    fn iter(&self) -> impl Iterator<Item = &RouteCache> + '_ {
        self.before.iter().chain(self.after.iter()).flatten()
    }

    fn find_table(&self, cache: &RouteCache, key: &TableKey) -> Option<Arc<RoutingTable>> {
        self.iter()
            .filter(|sibling| sibling.same_disabled_state(cache))
            .find_map(|sibling| sibling.tables.peek(key).map(Arc::clone))
    }
}

/// All route caches of one world. Slot 0 is the shared cache with no blocked
/// areas; agents get the other slots.
pub struct RouteCachePool {
    caches: Vec<Option<RouteCache>>,
}

impl RouteCachePool {
    pub fn new(shared: RouteCache) -> Self {
        Self { caches: vec![Some(shared)] }
    }

    /// Store a cache and return its slot. Freed slots are reused.
    pub fn add(&mut self, cache: RouteCache) -> usize {
        match self.caches.iter().skip(1).position(Option::is_none) {
            Some(free) => {
                self.caches[free + 1] = Some(cache);
                free + 1
            }
            None => {
                self.caches.push(Some(cache));
                self.caches.len() - 1
            }
        }
    }

    /// Release an agent slot. The shared slot cannot be removed.
    pub fn remove(&mut self, slot: usize) -> Option<RouteCache> {
        if slot == 0 {
            return None;
        }
        self.caches.get_mut(slot).and_then(Option::take)
    }

    pub fn get(&self, slot: usize) -> Option<&RouteCache> {
        self.caches.get(slot).and_then(Option::as_ref)
    }

    /// The cache in `slot` together with a view of every other cache.
    pub fn split(&mut self, slot: usize) -> Option<(&mut RouteCache, Siblings<'_>)> {
        if slot >= self.caches.len() {
            return None;
        }
        let (before, rest) = self.caches.split_at_mut(slot);
        let (this, after) = rest.split_first_mut()?;
        let cache = this.as_mut()?;
        Some((cache, Siblings { before: &*before, after: &*after }))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RouteCache> {
        self.caches.iter_mut().flatten()
    }

    /// Number of live caches, including the shared one.
    pub fn len(&self) -> usize {
        self.caches.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
