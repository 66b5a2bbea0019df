//! Static navigation graph of one map and the spatial data derived from it.

mod area_flags;
mod bsp;
pub mod builder;
pub mod file;
mod floor_clusters;
mod grid;
mod travel;
mod types;
mod visibility;

#[cfg(test)]
mod tests;

// ============================================================================
// PUBLIC API
// ============================================================================

pub use builder::WorldBuilder;
pub use file::{content_checksum, WorldData};
pub use floor_clusters::ClusterMembership;
pub use travel::{TravelFlags, TravelType};
pub use types::{
    Area, AreaContents, AreaFlags, AreaSettings, BBox, BspNode, Cluster, Edge, Face, FaceFlags, Plane, Portal,
    Reachability, PRESENCE_CROUCH, PRESENCE_NORMAL,
};
pub use visibility::{AreaVisibility, FloorClusterVisibility};

use bevy::prelude::*;
use std::path::Path;

use crate::collision::CollisionWorld;
use crate::elements_mask::ElementsMask;
use crate::profiling::profile;
use crate::{NavConfig, Result};
use grid::AreaGrid;

/// A reachability entering an area, seen from the area it enters.
#[derive(Clone, Copy, Debug)]
pub struct ReversedLink {
    pub from_area: u32,
    pub reach_num: u32,
}

const DISTANCE_FACTOR_CROUCH: f32 = 1.3;
const DISTANCE_FACTOR_SWIM: f32 = 1.0;
const DISTANCE_FACTOR_WALK: f32 = 0.33;

pub struct World {
    map_name: String,
    checksum: String,
    data: WorldData,
    /// CSR layout: links entering area `n` are `reversed[reversed_offsets[n]..reversed_offsets[n + 1]]`.
    reversed_offsets: Vec<u32>,
    reversed: Vec<ReversedLink>,
    portal_max_travel_times: Vec<u32>,
    grid: AreaGrid,
    inner_bounds: Vec<BBox>,
    floor_clusters: ClusterMembership,
    stairs_clusters: ClusterMembership,
    visibility: AreaVisibility,
    floor_cluster_visibility: FloorClusterVisibility,
}

impl World {
    /// Load a world file and derive everything the queries need.
    ///
    /// Visibility tables are read from the cache directory when a matching
    /// file exists there, and computed (then written back) otherwise.
    #[profile(50)]
    pub fn load(
        path: impl AsRef<Path>,
        map_name: &str,
        config: &NavConfig,
        collision: &dyn CollisionWorld,
        mask: &mut ElementsMask,
    ) -> Result<World> {
        let path = path.as_ref();
        info!("[AAS LOAD] Loading {} from {}", map_name, path.display());
        let (data, checksum) = match file::load_world_data(path) {
            Ok(loaded) => loaded,
            Err(e) => {
                error!("[AAS LOAD] Failed to load {}: {}", path.display(), e);
                return Err(e);
            }
        };
        Ok(Self::from_data(data, checksum, map_name, config, collision, mask))
    }

    /// Build a world from already parsed data.
    pub fn from_data(
        mut data: WorldData,
        checksum: String,
        map_name: &str,
        config: &NavConfig,
        collision: &dyn CollisionWorld,
        mask: &mut ElementsMask,
    ) -> World {
        mask.ensure_capacity(data.areas.len(), data.faces.len());
        for settings in &mut data.area_settings {
            settings.flags.0 &= !AreaFlags::DERIVED_MASK;
        }

        let (reversed_offsets, reversed) = build_reversed_links(&data);
        let grid = AreaGrid::build(&data, config.grid_cell_size);

        let mut world = World {
            map_name: map_name.to_string(),
            checksum,
            data,
            reversed_offsets,
            reversed,
            portal_max_travel_times: Vec::new(),
            grid,
            inner_bounds: Vec::new(),
            floor_clusters: ClusterMembership::default(),
            stairs_clusters: ClusterMembership::default(),
            visibility: AreaVisibility::default(),
            floor_cluster_visibility: FloorClusterVisibility::default(),
        };

        world.portal_max_travel_times = world.compute_portal_max_travel_times();
        world.inner_bounds = area_flags::compute_inner_bounds(&world);
        let derived = area_flags::compute_derived_flags(&world, config, collision, mask);
        for (settings, flags) in world.data.area_settings.iter_mut().zip(derived) {
            settings.flags.insert(flags);
        }

        world.floor_clusters = floor_clusters::compute_floor_clusters(&world, config, mask);
        world.stairs_clusters = floor_clusters::compute_stairs_clusters(&world, config, mask);
        world.visibility = visibility::load_or_compute_area_visibility(&world, config, collision);
        world.floor_cluster_visibility = visibility::load_or_compute_floor_cluster_visibility(&world, config, mask);

        info!(
            "[AAS LOAD] {}: {} areas, {} reachabilities, {} clusters, {} portals, {} floor clusters, {} stairs clusters",
            world.map_name,
            world.num_areas() - 1,
            world.data.reachabilities.len() - 1,
            world.data.clusters.len() - 1,
            world.data.portals.len() - 1,
            world.floor_clusters.num_clusters(),
            world.stairs_clusters.num_clusters(),
        );
        world
    }

    /// Write the graph back into the world file format.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<String> {
        file::save_world_data(path, &self.data)
    }

    // ------------------------------------------------------------------------
    // Raw graph
    // ------------------------------------------------------------------------

    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    /// Checksum of the world file bytes; every cache file is keyed on it.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn data(&self) -> &WorldData {
        &self.data
    }

    /// Number of area slots including the dummy area 0.
    #[inline]
    pub fn num_areas(&self) -> usize {
        self.data.areas.len()
    }

    #[inline]
    pub fn is_valid_area(&self, area: u32) -> bool {
        area > 0 && (area as usize) < self.data.areas.len()
    }

    #[inline]
    pub fn area(&self, area: u32) -> &Area {
        &self.data.areas[area as usize]
    }

    #[inline]
    pub fn settings(&self, area: u32) -> &AreaSettings {
        &self.data.area_settings[area as usize]
    }

    #[inline]
    pub fn reachability(&self, reach_num: u32) -> &Reachability {
        &self.data.reachabilities[reach_num as usize]
    }

    /// Outgoing reachabilities of `area` with their global numbers.
    pub fn area_reachabilities(&self, area: u32) -> impl Iterator<Item = (u32, &Reachability)> + '_ {
        let range = self.settings(area).reach_range();
        let first = range.start as u32;
        self.data.reachabilities[range].iter().enumerate().map(move |(i, r)| (first + i as u32, r))
    }

    /// Reachabilities entering `area`.
    pub fn reversed_reachabilities(&self, area: u32) -> &[ReversedLink] {
        let start = self.reversed_offsets[area as usize] as usize;
        let end = self.reversed_offsets[area as usize + 1] as usize;
        &self.reversed[start..end]
    }

    #[inline]
    pub fn portal(&self, portal: u32) -> &Portal {
        &self.data.portals[portal as usize]
    }

    #[inline]
    pub fn cluster(&self, cluster: u32) -> &Cluster {
        &self.data.clusters[cluster as usize]
    }

    pub fn num_clusters(&self) -> usize {
        self.data.clusters.len()
    }

    pub fn num_portals(&self) -> usize {
        self.data.portals.len()
    }

    /// Portal numbers bordering `cluster`.
    pub fn cluster_portals(&self, cluster: u32) -> &[u32] {
        &self.data.portal_index[self.cluster(cluster).portal_range()]
    }

    /// The cluster an area belongs to, 0 for none. Portal areas report their
    /// front cluster.
    pub fn area_cluster(&self, area: u32) -> u32 {
        let cluster = self.settings(area).cluster;
        match cluster {
            0 => 0,
            c if c > 0 => c as u32,
            c => self.portal(c.unsigned_abs()).front_cluster,
        }
    }

    /// Index of `area` inside `cluster`, or `None` if the area is not part of it.
    /// Areas left outside every cluster belong to none.
    pub fn cluster_area_index(&self, cluster: u32, area: u32) -> Option<u32> {
        let settings = self.settings(area);
        if cluster == 0 || settings.cluster == 0 {
            return None;
        }
        if settings.cluster > 0 {
            return (settings.cluster as u32 == cluster).then_some(settings.cluster_area_num);
        }
        let portal = self.portal((-settings.cluster) as u32);
        if portal.front_cluster == cluster {
            Some(portal.cluster_area_num[0])
        } else if portal.back_cluster == cluster {
            Some(portal.cluster_area_num[1])
        } else {
            None
        }
    }

    // ------------------------------------------------------------------------
    // Travel times
    // ------------------------------------------------------------------------

    pub fn area_is_crouch_only(&self, area: u32) -> bool {
        self.settings(area).presence_type & PRESENCE_NORMAL == 0
    }

    pub fn area_is_liquid(&self, area: u32) -> bool {
        self.settings(area).contents.intersects(AreaContents::WATER | AreaContents::SLIME | AreaContents::LAVA)
    }

    /// Time to cross `area` from `start` to `end`, in hundredths of a second.
    pub fn area_travel_time(&self, area: u32, start: Vec3, end: Vec3) -> u32 {
        let mut dist = start.distance(end);
        if self.area_is_crouch_only(area) {
            dist *= DISTANCE_FACTOR_CROUCH;
        } else if self.area_is_liquid(area) {
            dist *= DISTANCE_FACTOR_SWIM;
        } else {
            dist *= DISTANCE_FACTOR_WALK;
        }
        (dist as u32).max(1)
    }

    /// Largest in-area time between any entry point and any exit point of a portal.
    pub fn portal_max_travel_time(&self, portal: u32) -> u32 {
        self.portal_max_travel_times[portal as usize]
    }

    pub fn portal_max_travel_times(&self) -> &[u32] {
        &self.portal_max_travel_times
    }

    fn compute_portal_max_travel_times(&self) -> Vec<u32> {
        let mut times = vec![0u32; self.data.portals.len()];
        for (portal_num, portal) in self.data.portals.iter().enumerate().skip(1) {
            let mut max_time = 0;
            for link in self.reversed_reachabilities(portal.area) {
                let entry = self.reachability(link.reach_num).end;
                for (_, exit) in self.area_reachabilities(portal.area) {
                    max_time = max_time.max(self.area_travel_time(portal.area, entry, exit.start));
                }
            }
            times[portal_num] = max_time;
        }
        times
    }

    /// Travel flags an agent needs to be inside `area`.
    pub fn area_content_travel_flags(&self, area: u32) -> TravelFlags {
        TravelFlags::for_contents(self.settings(area).contents)
    }

    // ------------------------------------------------------------------------
    // Derived data
    // ------------------------------------------------------------------------

    pub fn area_flags(&self, area: u32) -> AreaFlags {
        self.settings(area).flags
    }

    pub fn area_inner_bounds(&self, area: u32) -> &BBox {
        &self.inner_bounds[area as usize]
    }

    pub fn is_in_area_interior(&self, point: Vec3, area: u32) -> bool {
        self.is_valid_area(area) && self.inner_bounds[area as usize].contains(point)
    }

    /// Floor cluster of `area`, 0 if it belongs to none.
    pub fn floor_cluster(&self, area: u32) -> u16 {
        self.floor_clusters.cluster_of(area)
    }

    pub fn stairs_cluster(&self, area: u32) -> u16 {
        self.stairs_clusters.cluster_of(area)
    }

    pub fn floor_cluster_areas(&self, cluster: u16) -> &[u16] {
        self.floor_clusters.areas(cluster)
    }

    pub fn stairs_cluster_areas(&self, cluster: u16) -> &[u16] {
        self.stairs_clusters.areas(cluster)
    }

    pub fn floor_clusters(&self) -> &ClusterMembership {
        &self.floor_clusters
    }

    pub fn stairs_clusters(&self) -> &ClusterMembership {
        &self.stairs_clusters
    }

    pub fn areas_visible(&self, a: u32, b: u32) -> bool {
        a == b || self.visibility.is_visible(a, b)
    }

    /// Areas visible from `area`, sorted.
    pub fn visible_areas(&self, area: u32) -> &[u16] {
        self.visibility.row(area)
    }

    pub fn floor_clusters_visible(&self, a: u16, b: u16) -> bool {
        self.floor_cluster_visibility.is_visible(a, b)
    }

    /// All vertices on the boundary faces of `area`. Shared corners repeat.
    pub fn area_vertices(&self, area: u32) -> impl Iterator<Item = Vec3> + '_ {
        let area = self.area(area);
        let first = area.first_face as usize;
        self.data.face_index[first..first + area.num_faces as usize].iter().flat_map(move |&f| {
            let face = &self.data.faces[f.unsigned_abs() as usize];
            let first_edge = face.first_edge as usize;
            self.data.edge_index[first_edge..first_edge + face.num_edges as usize]
                .iter()
                .flat_map(move |&e| self.data.edges[e.unsigned_abs() as usize].v)
                .map(move |v| self.data.vertices[v as usize])
        })
    }

    /// Boundary faces of `area` with the normal pointing out of the area. Areas
    /// listed with a positive face number are in front of the face plane.
    pub fn area_faces(&self, area: u32) -> impl Iterator<Item = (u32, &Face, Vec3)> + '_ {
        let area = self.area(area);
        let first = area.first_face as usize;
        self.data.face_index[first..first + area.num_faces as usize].iter().map(move |&f| {
            let face_num = f.unsigned_abs();
            let face = &self.data.faces[face_num as usize];
            let normal = self.data.planes[face.plane as usize].normal;
            (face_num, face, if f < 0 { normal } else { -normal })
        })
    }
}

fn build_reversed_links(data: &WorldData) -> (Vec<u32>, Vec<ReversedLink>) {
    let num_areas = data.areas.len();
    let mut counts = vec![0u32; num_areas + 1];
    for settings in &data.area_settings {
        for reach in &data.reachabilities[settings.reach_range()] {
            counts[reach.area as usize + 1] += 1;
        }
    }
    for i in 1..counts.len() {
        counts[i] += counts[i - 1];
    }
    let offsets = counts.clone();
    let mut cursor = counts;
    let mut links = vec![ReversedLink { from_area: 0, reach_num: 0 }; offsets[num_areas] as usize];
    for (from_area, settings) in data.area_settings.iter().enumerate() {
        for reach_num in settings.reach_range() {
            let target = data.reachabilities[reach_num].area as usize;
            let slot = &mut cursor[target];
            links[*slot as usize] = ReversedLink { from_area: from_area as u32, reach_num: reach_num as u32 };
            *slot += 1;
        }
    }
    (offsets, links)
}
