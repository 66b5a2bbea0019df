//! Precomputed routes between every pair of areas for the two standard
//! travel profiles, plus the walking-or-short-fall time.
//!
//! Built once from a live [`RouteCache`] with no blocked areas and read-only
//! afterwards. Every lookup returns exactly what the live cache would.

mod persist;
pub mod scan;

#[cfg(test)]
mod tests;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::elements_mask::ElementsMask;
use crate::profiling::profile;
use crate::routing::{Route, RouteCache, Siblings};
use crate::world::{TravelFlags, World};
use crate::NavConfig;

pub use persist::{STATIC_ROUTES_EXTENSION, STATIC_ROUTES_TAG, STATIC_ROUTES_VERSION};

/// Reachable goals of one source area.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Span {
    offset: u32,
    /// Padded to a multiple of [`scan::LANES`].
    len: u32,
    /// Bounds of the goal numbers in the span; `min > max` when empty.
    min_area: u16,
    max_area: u16,
}

impl Span {
    const EMPTY: Span = Span { offset: 0, len: 0, min_area: 1, max_area: 0 };

    fn range(&self) -> std::ops::Range<usize> {
        self.offset as usize..(self.offset + self.len) as usize
    }
}

/// One profile: per-source spans over flat goal/reach/time columns.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct RouteSpans {
    spans: Vec<Span>,
    /// Goal area per entry, 0 in padding lanes.
    goals: Vec<u16>,
    reach: Vec<u32>,
    times: Vec<u32>,
}

impl RouteSpans {
    fn with_sources(num_areas: usize) -> Self {
        Self { spans: vec![Span::EMPTY; num_areas], ..Default::default() }
    }

    /// Append the span of `source`. `entries` must be sorted by goal.
    fn push_span(&mut self, source: u32, entries: &[(u16, u32, u32)]) {
        let Some((&(first, ..), &(last, ..))) = entries.first().zip(entries.last()) else {
            return;
        };
        let offset = self.goals.len() as u32;
        for &(goal, reach, time) in entries {
            self.goals.push(goal);
            self.reach.push(reach);
            self.times.push(time);
        }
        let padded = entries.len().div_ceil(scan::LANES) * scan::LANES;
        self.goals.resize(offset as usize + padded, 0);
        self.reach.resize(offset as usize + padded, 0);
        self.times.resize(offset as usize + padded, 0);
        self.spans[source as usize] = Span { offset, len: padded as u32, min_area: first, max_area: last };
    }

    fn lookup(&self, from: u32, to: u32) -> Option<(u32, u32)> {
        let span = self.spans.get(from as usize)?;
        let goal = u16::try_from(to).ok()?;
        if goal < span.min_area || goal > span.max_area {
            return None;
        }
        let range = span.range();
        let lane = scan::find(&self.goals[range.clone()], goal)?;
        let index = range.start + lane;
        Some((self.reach[index], self.times[index]))
    }

    fn num_entries(&self) -> usize {
        self.goals.iter().filter(|&&g| g != 0).count()
    }

    /// Structural checks for tables read from disk.
    fn is_consistent(&self, num_areas: usize) -> bool {
        let columns = self.goals.len();
        self.spans.len() == num_areas
            && self.reach.len() == columns
            && self.times.len() == columns
            && self.spans.iter().all(|span| {
                span.len as usize % scan::LANES == 0 && (span.offset + span.len) as usize <= columns
            })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRouteTable {
    num_areas: u32,
    preferred: RouteSpans,
    allowed: RouteSpans,
    /// Reach columns are unused here.
    walking: RouteSpans,
}

impl StaticRouteTable {
    /// Query every ordered pair of areas through a fresh cache with no
    /// blocked areas.
    #[profile(100)]
    pub fn compute(world: &World, config: &NavConfig, mask: &mut ElementsMask) -> StaticRouteTable {
        let num_areas = world.num_areas();
        info!("[STATIC ROUTES] Computing routes between {} areas", num_areas.saturating_sub(1));
        let mut cache = RouteCache::new(world, config);
        let siblings = Siblings::none();

        let mut preferred: Vec<Vec<(u16, u32, u32)>> = vec![Vec::new(); num_areas];
        let mut allowed: Vec<Vec<(u16, u32, u32)>> = vec![Vec::new(); num_areas];
        let mut walking: Vec<Vec<(u16, u32, u32)>> = vec![Vec::new(); num_areas];

        // Goal-major order keeps each goal's tables hot while all sources query them.
        for to in 1..num_areas as u32 {
            for from in (1..num_areas as u32).filter(|&from| from != to) {
                if let Some(route) = cache.find_route(world, mask, &siblings, from, to, TravelFlags::PREFERRED) {
                    preferred[from as usize].push((to as u16, route.reach_num, route.travel_time));
                }
                if let Some(route) = cache.find_route(world, mask, &siblings, from, to, TravelFlags::ALLOWED) {
                    allowed[from as usize].push((to as u16, route.reach_num, route.travel_time));
                }
                if let Some(time) = cache.travel_time_walking_or_falling_short(world, mask, &siblings, from, to) {
                    walking[from as usize].push((to as u16, 0, time));
                }
            }
        }

        let pack = |rows: Vec<Vec<(u16, u32, u32)>>| {
            let mut spans = RouteSpans::with_sources(num_areas);
            for (from, row) in rows.iter().enumerate() {
                spans.push_span(from as u32, row);
            }
            spans
        };
        let table = StaticRouteTable {
            num_areas: num_areas as u32,
            preferred: pack(preferred),
            allowed: pack(allowed),
            walking: pack(walking),
        };
        let stats = cache.stats();
        info!(
            "[STATIC ROUTES] {} preferred, {} allowed, {} walking routes ({} area tables, {} portal tables)",
            table.preferred.num_entries(),
            table.allowed.num_entries(),
            table.walking.num_entries(),
            stats.area_tables_computed,
            stats.portal_tables_computed
        );
        table
    }

    /// Area slots covered, including the dummy area 0.
    pub fn num_areas(&self) -> usize {
        self.num_areas as usize
    }

    pub fn preferred_route_from_to(&self, from: u32, to: u32) -> Option<Route> {
        self.route(&self.preferred, from, to)
    }

    pub fn allowed_route_from_to(&self, from: u32, to: u32) -> Option<Route> {
        self.route(&self.allowed, from, to)
    }

    pub fn travel_time_walking_or_falling_short(&self, from: u32, to: u32) -> Option<u32> {
        if from == to {
            return self.is_valid_area(from).then_some(0);
        }
        self.walking.lookup(from, to).map(|(_, time)| time)
    }

    /// Route for one of the two stored profiles; `None` for any other flags.
    pub fn route_for_flags(&self, from: u32, to: u32, flags: TravelFlags) -> Option<Option<Route>> {
        match flags {
            TravelFlags::PREFERRED => Some(self.preferred_route_from_to(from, to)),
            TravelFlags::ALLOWED => Some(self.allowed_route_from_to(from, to)),
            _ => None,
        }
    }

    fn route(&self, spans: &RouteSpans, from: u32, to: u32) -> Option<Route> {
        if from == to {
            return self.is_valid_area(from).then_some(Route::TRIVIAL);
        }
        spans.lookup(from, to).map(|(reach_num, travel_time)| Route { reach_num, travel_time })
    }

    fn is_valid_area(&self, area: u32) -> bool {
        area > 0 && area < self.num_areas
    }

    fn is_consistent(&self) -> bool {
        let n = self.num_areas as usize;
        self.preferred.is_consistent(n) && self.allowed.is_consistent(n) && self.walking.is_consistent(n)
    }
}
