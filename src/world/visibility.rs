//! Sparse area-to-area visibility and the floor-cluster table reduced from it.
//! Both are cached on disk, keyed by the world checksum.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::types::AreaFlags;
use super::World;
use crate::cache_file::{read_cache_file, write_cache_file, CacheTag};
use crate::collision::CollisionWorld;
use crate::elements_mask::ElementsMask;
use crate::profiling::profile;
use crate::NavConfig;

const AREA_VIS_TAG: CacheTag = *b"AREAVIS\0";
const AREA_VIS_VERSION: u32 = 1;
const AREA_VIS_EXTENSION: &str = "areavis";

const FLOOR_VIS_TAG: CacheTag = *b"FLOORVIS";
const FLOOR_VIS_VERSION: u32 = 1;
const FLOOR_VIS_EXTENSION: &str = "floorvis";

/// Symmetric visibility as sorted per-area lists in one flat buffer.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AreaVisibility {
    /// Row of area `n` is `visible[offsets[n]..offsets[n + 1]]`.
    offsets: Vec<u32>,
    visible: Vec<u16>,
}

impl AreaVisibility {
    fn from_rows(rows: Vec<Vec<u16>>) -> Self {
        let mut offsets = Vec::with_capacity(rows.len() + 1);
        let mut visible = Vec::with_capacity(rows.iter().map(Vec::len).sum());
        offsets.push(0);
        for row in rows {
            visible.extend_from_slice(&row);
            offsets.push(visible.len() as u32);
        }
        Self { offsets, visible }
    }

    pub fn row(&self, area: u32) -> &[u16] {
        let area = area as usize;
        if area + 1 >= self.offsets.len() {
            return &[];
        }
        &self.visible[self.offsets[area] as usize..self.offsets[area + 1] as usize]
    }

    pub fn is_visible(&self, a: u32, b: u32) -> bool {
        u16::try_from(b).is_ok_and(|b| self.row(a).binary_search(&b).is_ok())
    }

    pub fn num_pairs(&self) -> usize {
        self.visible.len() / 2
    }

    fn matches(&self, num_areas: usize) -> bool {
        self.offsets.len() == num_areas + 1 && self.offsets.last().copied() == Some(self.visible.len() as u32)
    }
}

/// Dense bit matrix over floor clusters.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FloorClusterVisibility {
    num_clusters: u32,
    words: Vec<u64>,
}

impl FloorClusterVisibility {
    fn new(num_clusters: usize) -> Self {
        // Row/column 0 stays empty so cluster numbers index directly.
        let side = num_clusters + 1;
        Self { num_clusters: num_clusters as u32, words: vec![0; (side * side).div_ceil(64)] }
    }

    fn bit(&self, a: u16, b: u16) -> usize {
        a as usize * (self.num_clusters as usize + 1) + b as usize
    }

    fn set(&mut self, a: u16, b: u16) {
        let bit = self.bit(a, b);
        self.words[bit / 64] |= 1 << (bit % 64);
    }

    pub fn is_visible(&self, a: u16, b: u16) -> bool {
        if a == 0 || b == 0 || a as u32 > self.num_clusters || b as u32 > self.num_clusters {
            return false;
        }
        let bit = self.bit(a, b);
        self.words[bit / 64] & (1 << (bit % 64)) != 0
    }
}

/// Junk areas, including unreachable ones, see nothing.
fn is_candidate(world: &World, area: u32) -> bool {
    !world.settings(area).flags.contains(AreaFlags::JUNK)
}

/// Two areas see each other if they share a PVS cluster and at least one of
/// the rays between their centers, raised by the configured heights above
/// each floor, is unobstructed.
fn areas_see_each_other(world: &World, a: u32, b: u32, config: &NavConfig, collision: &dyn CollisionWorld) -> bool {
    let (area_a, area_b) = (world.area(a), world.area(b));
    if !collision.in_pvs(area_a.center, area_b.center) {
        return false;
    }
    config.visibility_ray_heights.iter().any(|&height| {
        let start = area_a.center.with_z(area_a.bounds.mins.z + height);
        let end = area_b.center.with_z(area_b.bounds.mins.z + height);
        collision.trace_ray(start, end) >= 1.0
    })
}

#[profile(50)]
pub(super) fn compute_area_visibility(world: &World, config: &NavConfig, collision: &dyn CollisionWorld) -> AreaVisibility {
    let num_areas = world.num_areas();
    let candidates: Vec<u32> = (1..num_areas as u32).filter(|&a| is_candidate(world, a)).collect();
    let mut rows = vec![Vec::new(); num_areas];
    for (i, &a) in candidates.iter().enumerate() {
        for &b in &candidates[i + 1..] {
            if areas_see_each_other(world, a, b, config, collision) {
                rows[a as usize].push(b as u16);
                rows[b as usize].push(a as u16);
            }
        }
    }
    AreaVisibility::from_rows(rows)
}

pub(super) fn load_or_compute_area_visibility(
    world: &World,
    config: &NavConfig,
    collision: &dyn CollisionWorld,
) -> AreaVisibility {
    let path = config.cache_path(world.map_name(), AREA_VIS_EXTENSION);
    if let Some(path) = &path {
        let cached: Option<AreaVisibility> = read_cache_file(path, &AREA_VIS_TAG, AREA_VIS_VERSION, world.checksum());
        match cached {
            Some(vis) if vis.matches(world.num_areas()) => return vis,
            Some(_) => warn!("[VISIBILITY] Area visibility cache {} has the wrong area count", path.display()),
            None => {}
        }
    }

    let vis = compute_area_visibility(world, config, collision);
    info!("[VISIBILITY] {} visible area pairs", vis.num_pairs());
    if let (Some(path), true) = (&path, config.write_cache_files) {
        if let Err(e) = write_cache_file(path, &AREA_VIS_TAG, AREA_VIS_VERSION, world.checksum(), &vis) {
            warn!("[VISIBILITY] Could not write {}: {}", path.display(), e);
        }
    }
    vis
}

/// Floor cluster A sees floor cluster B if any area of A sees any area of B.
pub(super) fn compute_floor_cluster_visibility(world: &World, mask: &mut ElementsMask) -> FloorClusterVisibility {
    let num_clusters = world.floor_clusters().num_clusters();
    let mut table = FloorClusterVisibility::new(num_clusters);
    for cluster in 1..=num_clusters as u16 {
        // Cluster numbers never exceed the area count, so the area bits fit them.
        let mut seen = mask.clear_areas();
        for &area in world.floor_cluster_areas(cluster) {
            for &other in world.visible_areas(area as u32) {
                let other_cluster = world.floor_cluster(other as u32);
                if other_cluster != 0 {
                    seen.set(other_cluster as usize);
                }
            }
        }
        seen.set(cluster as usize);
        let visible: Vec<usize> = seen.ones().collect();
        for other in visible {
            table.set(cluster, other as u16);
        }
    }
    table
}

pub(super) fn load_or_compute_floor_cluster_visibility(
    world: &World,
    config: &NavConfig,
    mask: &mut ElementsMask,
) -> FloorClusterVisibility {
    let num_clusters = world.floor_clusters().num_clusters() as u32;
    let path = config.cache_path(world.map_name(), FLOOR_VIS_EXTENSION);
    if let Some(path) = &path {
        let cached: Option<FloorClusterVisibility> =
            read_cache_file(path, &FLOOR_VIS_TAG, FLOOR_VIS_VERSION, world.checksum());
        match cached {
            Some(vis) if vis.num_clusters == num_clusters => return vis,
            Some(_) => warn!("[VISIBILITY] Floor cluster visibility cache {} has the wrong cluster count", path.display()),
            None => {}
        }
    }

    let vis = compute_floor_cluster_visibility(world, mask);
    if let (Some(path), true) = (&path, config.write_cache_files) {
        if let Err(e) = write_cache_file(path, &FLOOR_VIS_TAG, FLOOR_VIS_VERSION, world.checksum(), &vis) {
            warn!("[VISIBILITY] Could not write {}: {}", path.display(), e);
        }
    }
    vis
}
