//! Floor and stairs clustering: groups of grounded areas connected by plain
//! walking, independent of the cluster/portal partition used for routing.

use bevy::prelude::*;

use super::travel::TravelType;
use super::types::{AreaFlags, Reachability};
use super::World;
use crate::elements_mask::{ElementsMask, FloodScratch};
use crate::profiling::profile;
use crate::NavConfig;

/// Area to cluster assignment. Cluster 0 means "none".
#[derive(Clone, Debug, Default)]
pub struct ClusterMembership {
    area_cluster: Vec<u16>,
    /// Index 0 is unused.
    cluster_areas: Vec<Vec<u16>>,
}

impl ClusterMembership {
    fn new(num_areas: usize) -> Self {
        Self { area_cluster: vec![0; num_areas], cluster_areas: vec![Vec::new()] }
    }

    fn push_cluster(&mut self, areas: Vec<u16>) -> u16 {
        let id = self.cluster_areas.len() as u16;
        for &area in &areas {
            self.area_cluster[area as usize] = id;
        }
        self.cluster_areas.push(areas);
        id
    }

    pub fn cluster_of(&self, area: u32) -> u16 {
        self.area_cluster.get(area as usize).copied().unwrap_or(0)
    }

    /// Areas of `cluster`; empty for 0 or unknown clusters.
    pub fn areas(&self, cluster: u16) -> &[u16] {
        match cluster {
            0 => &[],
            c => self.cluster_areas.get(c as usize).map(Vec::as_slice).unwrap_or(&[]),
        }
    }

    pub fn num_clusters(&self) -> usize {
        self.cluster_areas.len() - 1
    }
}

fn floor_height(world: &World, area: u32) -> f32 {
    world.area(area).bounds.mins.z
}

fn is_clusterable(world: &World, area: u32) -> bool {
    let flags = world.settings(area).flags;
    flags.contains(AreaFlags::GROUNDED) && !flags.contains(AreaFlags::JUNK)
}

fn is_floor_link(world: &World, from: u32, reach: &Reachability, config: &NavConfig) -> bool {
    reach.kind() == Some(TravelType::Walk)
        && is_clusterable(world, reach.area)
        && (floor_height(world, reach.area) - floor_height(world, from)).abs() <= config.floor_cluster_height_tolerance
}

fn is_stairs_link(world: &World, from: u32, reach: &Reachability, config: &NavConfig) -> bool {
    let step = (floor_height(world, reach.area) - floor_height(world, from)).abs();
    matches!(reach.kind(), Some(TravelType::Walk) | Some(TravelType::BarrierJump))
        && is_clusterable(world, reach.area)
        && step >= config.stairs_step_min
        && step <= config.stairs_step_max
}

/// Undirected flood over the links accepted by `accept`, starting at `seed`.
fn flood(
    world: &World,
    seed: u32,
    scratch: &mut FloodScratch<'_>,
    accept: &dyn Fn(u32, &Reachability) -> bool,
) -> Vec<u16> {
    let mut members = Vec::new();
    scratch.visited.set(seed as usize);
    scratch.queue.push_back(seed as u16);
    while let Some(area) = scratch.queue.pop_front() {
        let area = area as u32;
        members.push(area as u16);
        for (_, reach) in world.area_reachabilities(area) {
            if accept(area, reach) && !scratch.visited.test_and_set(reach.area as usize) {
                scratch.queue.push_back(reach.area as u16);
            }
        }
        for link in world.reversed_reachabilities(area) {
            let reach = world.reachability(link.reach_num);
            if accept(link.from_area, reach)
                && is_clusterable(world, link.from_area)
                && !scratch.visited.test_and_set(link.from_area as usize)
            {
                scratch.queue.push_back(link.from_area as u16);
            }
        }
    }
    members
}

#[profile(10)]
pub(super) fn compute_floor_clusters(world: &World, config: &NavConfig, mask: &mut ElementsMask) -> ClusterMembership {
    let mut membership = ClusterMembership::new(world.num_areas());
    let mut scratch = mask.flood_scratch();
    let accept = |from: u32, reach: &Reachability| is_floor_link(world, from, reach, config);
    let mut rejected = 0;

    for seed in 1..world.num_areas() as u32 {
        if !is_clusterable(world, seed) || scratch.visited.is_set(seed as usize) {
            continue;
        }
        let mut members = flood(world, seed, &mut scratch, &accept);
        if members.len() < config.min_floor_cluster_size {
            rejected += 1;
            continue;
        }
        members.sort_unstable();
        membership.push_cluster(members);
    }

    if rejected > 0 {
        debug!("[FLOOR CLUSTERS] {} candidate floor clusters below the minimal size", rejected);
    }
    info!("[FLOOR CLUSTERS] {} floor clusters", membership.num_clusters());
    membership
}

/// Stairs clusters are flights of areas whose floors differ by one step.
/// A candidate is kept only if, ordered by floor height, every area is
/// strictly higher than the previous one and directly linked to it.
#[profile(10)]
pub(super) fn compute_stairs_clusters(world: &World, config: &NavConfig, mask: &mut ElementsMask) -> ClusterMembership {
    let mut membership = ClusterMembership::new(world.num_areas());
    let mut scratch = mask.flood_scratch();
    let accept = |from: u32, reach: &Reachability| is_stairs_link(world, from, reach, config);

    for seed in 1..world.num_areas() as u32 {
        if !is_clusterable(world, seed) || scratch.visited.is_set(seed as usize) {
            continue;
        }
        let has_step = world.area_reachabilities(seed).any(|(_, r)| accept(seed, r));
        if !has_step {
            continue;
        }
        let mut members = flood(world, seed, &mut scratch, &accept);
        if members.len() < config.min_stairs_cluster_size {
            continue;
        }

        members.sort_by(|&a, &b| floor_height(world, a as u32).total_cmp(&floor_height(world, b as u32)));

        let monotonic = members.windows(2).all(|pair| {
            let (lower, upper) = (pair[0] as u32, pair[1] as u32);
            floor_height(world, upper) > floor_height(world, lower)
                && (steps_to(world, lower, upper, config) || steps_to(world, upper, lower, config))
        });
        if !monotonic {
            warn!(
                "[FLOOR CLUSTERS] Rejected non-monotonic stairs cluster of {} areas seeded at area {}",
                members.len(),
                seed
            );
            continue;
        }
        membership.push_cluster(members);
    }

    info!("[FLOOR CLUSTERS] {} stairs clusters", membership.num_clusters());
    membership
}

fn steps_to(world: &World, from: u32, to: u32, config: &NavConfig) -> bool {
    world
        .area_reachabilities(from)
        .any(|(_, reach)| reach.area == to && is_stairs_link(world, from, reach, config))
}
