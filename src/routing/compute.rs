//! Label-correcting relaxation that fills routing tables.
//!
//! Both table kinds are computed backwards from the goal: a FIFO of areas
//! whose time improved is drained, and every reachability entering a dequeued
//! area is tried as the last hop of a better route. An area may be queued
//! again when a later update lowers its time.

use std::collections::VecDeque;

use bevy::prelude::*;
use fixedbitset::FixedBitSet;

use super::tables::RoutingTable;
use crate::elements_mask::ElementsMask;
use crate::profiling::profile;
use crate::world::{TravelFlags, World};

/// Times from every area of `cluster` to `goal_area`.
///
/// Areas outside the cluster, disabled areas and areas whose contents the
/// flags forbid never get a time; the goal itself always gets 1.
#[profile(5)]
pub(super) fn compute_area_table(
    world: &World,
    mask: &mut ElementsMask,
    disabled: &FixedBitSet,
    cluster: u32,
    goal_area: u32,
    flags: TravelFlags,
) -> RoutingTable {
    let num_cluster_areas = world.cluster(cluster).num_areas as usize;
    let mut table = RoutingTable::new(num_cluster_areas);
    let Some(goal_index) = world.cluster_area_index(cluster, goal_area) else {
        debug_assert!(false, "goal area {goal_area} is not part of cluster {cluster}");
        return table;
    };

    let mut times = vec![0u32; num_cluster_areas];
    let mut reach = vec![0u32; num_cluster_areas];
    // Point inside each area where its best route leaves it.
    let mut exits = vec![Vec3::ZERO; num_cluster_areas];
    times[goal_index as usize] = 1;
    exits[goal_index as usize] = world.area(goal_area).center;

    let mut scratch = mask.flood_scratch();
    scratch.visited.set(goal_area as usize);
    scratch.queue.push_back(goal_area as u16);

    while let Some(current) = scratch.queue.pop_front() {
        let current = current as u32;
        scratch.visited.unset(current as usize);
        let Some(current_index) = world.cluster_area_index(cluster, current) else {
            continue;
        };
        let current_time = times[current_index as usize];
        let current_exit = exits[current_index as usize];

        for link in world.reversed_reachabilities(current) {
            let predecessor = link.from_area;
            let step = world.reachability(link.reach_num);
            if !flags.contains(TravelFlags::for_reachability(step.travel_type))
                || disabled.contains(predecessor as usize)
                || !flags.contains(world.area_content_travel_flags(predecessor))
            {
                continue;
            }
            let Some(index) = world.cluster_area_index(cluster, predecessor) else {
                continue;
            };
            let index = index as usize;
            let time = current_time
                + world.area_travel_time(current, current_exit, step.end)
                + step.travel_time as u32;
            if times[index] == 0 || time < times[index] {
                times[index] = time;
                reach[index] = link.reach_num;
                exits[index] = step.start;
                if !scratch.visited.test_and_set(predecessor as usize) {
                    scratch.queue.push_back(predecessor as u16);
                }
            }
        }
    }

    table.travel_times = times.into_boxed_slice();
    table.reachabilities = reach.into_boxed_slice();
    table
}

/// One pending portal-table update: `area` was reached in `cluster` at `time`.
struct PortalUpdate {
    cluster: u32,
    area: u32,
    time: u32,
}

/// Times from every portal to `goal_area`, crossing clusters through the
/// per-cluster area tables supplied by `area_table`.
#[profile(5)]
pub(super) fn compute_portal_table(
    world: &World,
    goal_area: u32,
    area_table: &mut dyn FnMut(u32, u32) -> std::sync::Arc<RoutingTable>,
) -> RoutingTable {
    let mut table = RoutingTable::new(world.num_portals());
    let mut times = vec![0u32; world.num_portals()];
    let mut reach = vec![0u32; world.num_portals()];
    let mut updates = VecDeque::new();

    let goal_settings = world.settings(goal_area);
    if goal_settings.is_portal() {
        let portal_num = goal_settings.cluster.unsigned_abs();
        let portal = world.portal(portal_num);
        times[portal_num as usize] = 1;
        updates.push_back(PortalUpdate { cluster: portal.front_cluster, area: goal_area, time: 1 });
        updates.push_back(PortalUpdate { cluster: portal.back_cluster, area: goal_area, time: 1 });
    } else {
        updates.push_back(PortalUpdate { cluster: world.area_cluster(goal_area), area: goal_area, time: 1 });
    }

    while let Some(update) = updates.pop_front() {
        let cluster_table = area_table(update.cluster, update.area);
        for &portal_num in world.cluster_portals(update.cluster) {
            let portal = world.portal(portal_num);
            if portal.area == update.area {
                continue;
            }
            let Some(index) = world.cluster_area_index(update.cluster, portal.area) else {
                continue;
            };
            let Some((time, first_reach)) = cluster_table.get(index as usize) else {
                continue;
            };
            let time = time + update.time;
            let slot = portal_num as usize;
            if times[slot] == 0 || time < times[slot] {
                times[slot] = time;
                reach[slot] = first_reach;
                updates.push_back(PortalUpdate {
                    cluster: portal.other_cluster(update.cluster),
                    area: portal.area,
                    time: time + world.portal_max_travel_time(portal_num),
                });
            }
        }
    }

    debug!(
        "[ROUTE CACHE] Portal table for area {}: {} of {} portals reach it",
        goal_area,
        times.iter().skip(1).filter(|&&t| t != 0).count(),
        world.num_portals().saturating_sub(1)
    );
    table.travel_times = times.into_boxed_slice();
    table.reachabilities = reach.into_boxed_slice();
    table
}
