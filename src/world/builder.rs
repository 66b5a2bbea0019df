//! Builds world files from axis-aligned boxes and explicit links.
//!
//! Every area is a box. The builder generates the face geometry, a BSP
//! whose leaves are exactly the boxes, and the cluster/portal partition:
//! areas marked as portals split the remaining areas into clusters by
//! flood fill over reachabilities.

use bevy::prelude::*;
use rustc_hash::FxHashMap;

use super::bsp::ROOT_NODE;
use super::file::{content_checksum, world_data_to_bytes, WorldData};
use super::travel::TravelType;
use super::types::*;
use super::World;
use crate::collision::{CollisionWorld, OpenSpace};
use crate::elements_mask::ElementsMask;
use crate::{NavConfig, NavError, Result};

/// Half-open range used while partitioning space for the BSP.
const HUGE: f32 = 1.0e9;
const TOUCH_EPSILON: f32 = 0.01;

#[derive(Clone, Debug)]
struct AreaSpec {
    bounds: BBox,
    contents: AreaContents,
    flags: AreaFlags,
    presence: i32,
    portal: bool,
}

#[derive(Clone, Debug)]
struct LinkSpec {
    from: u32,
    to: u32,
    travel_type: u32,
    travel_time: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct WorldBuilder {
    areas: Vec<AreaSpec>,
    links: Vec<LinkSpec>,
}

fn base_travel_time(kind: Option<TravelType>) -> u16 {
    use TravelType::*;
    match kind {
        Some(Walk) | Some(Crouch) | Some(Swim) => 1,
        Some(BarrierJump) | Some(WalkOffLedge) | Some(WaterJump) => 10,
        Some(Ladder) => 15,
        Some(JumpPad) => 20,
        Some(Jump) => 25,
        Some(RampJump) | Some(StrafeJump) => 40,
        Some(Teleport) => 5,
        Some(Elevator) | Some(FuncBob) => 50,
        Some(DoubleJump) => 60,
        Some(GrappleHook) => 150,
        Some(RocketJump) | Some(BfgJump) => 200,
        Some(Invalid) | None => 100,
    }
}

impl WorldBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a grounded box area. Areas are numbered from 1 in insertion order.
    pub fn add_area(&mut self, mins: Vec3, maxs: Vec3) -> u32 {
        self.areas.push(AreaSpec {
            bounds: BBox::new(mins, maxs),
            contents: AreaContents::default(),
            flags: AreaFlags::GROUNDED,
            presence: PRESENCE_NORMAL,
            portal: false,
        });
        self.areas.len() as u32
    }

    /// `count` boxes of `size` laid out along +X from `origin`, connected by
    /// walking in both directions. Returns the new area numbers.
    pub fn add_corridor(&mut self, origin: Vec3, size: Vec3, count: usize) -> Vec<u32> {
        let mut areas = Vec::with_capacity(count);
        for i in 0..count {
            let mins = origin + Vec3::new(size.x * i as f32, 0.0, 0.0);
            let area = self.add_area(mins, mins + size);
            if let Some(&previous) = areas.last() {
                self.connect(previous, area, TravelType::Walk);
            }
            areas.push(area);
        }
        areas
    }

    fn spec_mut(&mut self, area: u32) -> &mut AreaSpec {
        &mut self.areas[area as usize - 1]
    }

    pub fn set_flags(&mut self, area: u32, flags: AreaFlags) -> &mut Self {
        self.spec_mut(area).flags = flags;
        self
    }

    pub fn set_contents(&mut self, area: u32, contents: AreaContents) -> &mut Self {
        self.spec_mut(area).contents = contents;
        self
    }

    pub fn set_presence(&mut self, area: u32, presence: i32) -> &mut Self {
        self.spec_mut(area).presence = presence;
        self
    }

    /// Make `area` a cluster portal. It must end up touching exactly two clusters.
    pub fn mark_portal(&mut self, area: u32) -> &mut Self {
        let spec = self.spec_mut(area);
        spec.portal = true;
        spec.contents.insert(AreaContents::CLUSTER_PORTAL);
        self
    }

    /// One-way reachability with a travel time derived from its type and length.
    pub fn link(&mut self, from: u32, to: u32, kind: TravelType) -> &mut Self {
        self.links.push(LinkSpec { from, to, travel_type: kind as u32, travel_time: None });
        self
    }

    pub fn link_with_time(&mut self, from: u32, to: u32, kind: TravelType, travel_time: u16) -> &mut Self {
        self.links.push(LinkSpec { from, to, travel_type: kind as u32, travel_time: Some(travel_time) });
        self
    }

    /// Reachability with a raw travel type, team bits included.
    pub fn link_raw(&mut self, from: u32, to: u32, travel_type: u32, travel_time: u16) -> &mut Self {
        self.links.push(LinkSpec { from, to, travel_type, travel_time: Some(travel_time) });
        self
    }

    /// Reachabilities in both directions.
    pub fn connect(&mut self, a: u32, b: u32, kind: TravelType) -> &mut Self {
        self.link(a, b, kind);
        self.link(b, a, kind)
    }

    pub fn num_areas(&self) -> usize {
        self.areas.len()
    }

    pub fn build(&self) -> Result<WorldData> {
        if self.areas.len() >= u16::MAX as usize {
            return Err(NavError::BadLump { lump: "areas", reason: format!("{} areas", self.areas.len()) });
        }
        for link in &self.links {
            for area in [link.from, link.to] {
                if area == 0 || area as usize > self.areas.len() {
                    return Err(NavError::InvalidIndex { what: "link area", index: area as i64, count: self.areas.len() + 1 });
                }
            }
        }

        let mut data = WorldData {
            bsp_checksum: self.areas.len() as i32,
            vertices: vec![Vec3::ZERO],
            planes: vec![Plane::default()],
            edges: vec![Edge::default()],
            edge_index: vec![0],
            faces: vec![Face::default()],
            face_index: vec![0],
            areas: vec![Area::default()],
            area_settings: vec![AreaSettings::default()],
            reachabilities: vec![Reachability::default()],
            nodes: vec![BspNode::default()],
            portals: vec![Portal::default()],
            portal_index: Vec::new(),
            clusters: vec![Cluster::default()],
        };

        let area_faces = self.build_geometry(&mut data);
        self.build_reachabilities(&mut data, &area_faces);
        self.build_bsp(&mut data);
        self.build_clusters(&mut data)?;
        Ok(data)
    }

    /// Build and load the world with an open collision model.
    pub fn build_world(&self, config: &NavConfig) -> Result<World> {
        self.build_world_with(config, &OpenSpace)
    }

    pub fn build_world_with(&self, config: &NavConfig, collision: &dyn CollisionWorld) -> Result<World> {
        let data = self.build()?;
        let checksum = content_checksum(&world_data_to_bytes(&data)?);
        let mut mask = ElementsMask::new(data.areas.len(), data.faces.len());
        Ok(World::from_data(data, checksum, "builder", config, collision, &mut mask))
    }

    /// Six faces per box. Returns, per area, the face number for each
    /// (axis, side) pair: `faces[area][axis * 2 + side]`.
    fn build_geometry(&self, data: &mut WorldData) -> Vec<[u32; 6]> {
        let mut area_faces = vec![[0u32; 6]];
        for (i, spec) in self.areas.iter().enumerate() {
            let area_num = i as u32 + 1;
            let (mins, maxs) = (spec.bounds.mins, spec.bounds.maxs);

            let first_vertex = data.vertices.len() as u32;
            for corner in 0..8u32 {
                data.vertices.push(Vec3::new(
                    if corner & 1 != 0 { maxs.x } else { mins.x },
                    if corner & 2 != 0 { maxs.y } else { mins.y },
                    if corner & 4 != 0 { maxs.z } else { mins.z },
                ));
            }
            let mut edge_of: FxHashMap<(u32, u32), u32> = FxHashMap::default();
            for corner in 0..8u32 {
                for bit in 0..3 {
                    if corner & (1 << bit) == 0 {
                        let other = corner | (1 << bit);
                        edge_of.insert((corner, other), data.edges.len() as u32);
                        data.edges.push(Edge { v: [first_vertex + corner, first_vertex + other] });
                    }
                }
            }

            let first_face_index = data.face_index.len() as u32;
            let mut faces = [0u32; 6];
            for axis in 0..3usize {
                for side in 0..2u32 {
                    let mut normal = Vec3::ZERO;
                    normal[axis] = if side == 1 { 1.0 } else { -1.0 };
                    let point = if side == 1 { maxs } else { mins };
                    let plane = data.planes.len() as u32;
                    data.planes.push(Plane { normal, dist: normal.dot(point), kind: axis as i32 });

                    let first_edge = data.edge_index.len() as u32;
                    for (&(a, b), &edge) in edge_of.iter() {
                        let on_face = |c: u32| (c >> axis) & 1 == side;
                        if on_face(a) && on_face(b) {
                            data.edge_index.push(edge as i32);
                        }
                    }
                    let num_edges = data.edge_index.len() as u32 - first_edge;

                    let mut flags = FaceFlags::SOLID;
                    if axis == 2 && side == 0 && spec.flags.contains(AreaFlags::GROUNDED) {
                        flags.insert(FaceFlags::GROUND);
                    }
                    let face_num = data.faces.len() as u32;
                    data.faces.push(Face { plane, flags, num_edges, first_edge, front_area: 0, back_area: area_num });
                    // The box lies behind its outward-facing planes.
                    data.face_index.push(-(face_num as i32));
                    faces[axis * 2 + side as usize] = face_num;
                }
            }
            // Edge order above follows hash iteration; sort each face's edges for determinism.
            for face_num in faces {
                let face = data.faces[face_num as usize];
                let range = face.first_edge as usize..(face.first_edge + face.num_edges) as usize;
                data.edge_index[range].sort_unstable();
            }

            data.areas.push(Area {
                num: area_num,
                num_faces: 6,
                first_face: first_face_index,
                bounds: spec.bounds,
                center: spec.bounds.center(),
            });
            area_faces.push(faces);
        }
        area_faces
    }

    fn build_reachabilities(&self, data: &mut WorldData, area_faces: &[[u32; 6]]) {
        let mut by_area: Vec<Vec<&LinkSpec>> = vec![Vec::new(); self.areas.len() + 1];
        for link in &self.links {
            by_area[link.from as usize].push(link);
        }

        data.area_settings = Vec::with_capacity(self.areas.len() + 1);
        data.area_settings.push(AreaSettings::default());
        for (i, spec) in self.areas.iter().enumerate() {
            let area_num = i + 1;
            let first_reach = data.reachabilities.len() as u32;
            for link in &by_area[area_num] {
                let from = &self.areas[link.from as usize - 1].bounds;
                let to = &self.areas[link.to as usize - 1].bounds;
                let start = to.center().clamp(from.mins, from.maxs).with_z(from.mins.z);
                let end = start.clamp(to.mins, to.maxs).with_z(to.mins.z);
                let kind = TravelType::from_raw(link.travel_type & super::travel::TRAVELTYPE_MASK);
                let travel_time = link
                    .travel_time
                    .unwrap_or_else(|| base_travel_time(kind) + (start.distance(end) * 0.33) as u16);
                let face = touching_face(from, to)
                    .map(|slot| area_faces[area_num][slot] as i32)
                    .unwrap_or(0);
                data.reachabilities.push(Reachability {
                    area: link.to,
                    face,
                    edge: 0,
                    start,
                    end,
                    travel_type: link.travel_type,
                    travel_time,
                });
            }
            data.area_settings.push(AreaSettings {
                contents: spec.contents,
                flags: spec.flags,
                presence_type: spec.presence,
                cluster: 0,
                cluster_area_num: 0,
                num_reach: data.reachabilities.len() as u32 - first_reach,
                first_reach,
            });
        }
    }

    fn build_bsp(&self, data: &mut WorldData) {
        let all: Vec<u32> = (1..=self.areas.len() as u32).collect();
        let region = BBox::new(Vec3::splat(-HUGE), Vec3::splat(HUGE));
        let root = self.build_node(data, &all, region);
        // Keep the root at index 1 even for degenerate worlds.
        if root <= 0 {
            let plane = data.planes.len() as u32;
            data.planes.push(Plane { normal: Vec3::Z, dist: HUGE, kind: 2 });
            data.nodes.push(BspNode { plane, children: [0, root] });
        }
        debug_assert!(data.nodes.len() > ROOT_NODE as usize);
    }

    fn build_node(&self, data: &mut WorldData, set: &[u32], region: BBox) -> i32 {
        if set.is_empty() {
            return 0;
        }
        let Some((axis, value)) = self.choose_split(set, &region) else {
            return -(set[0] as i32);
        };

        let node = data.nodes.len();
        let mut normal = Vec3::ZERO;
        normal[axis] = 1.0;
        let plane = data.planes.len() as u32;
        data.planes.push(Plane { normal, dist: value, kind: axis as i32 });
        data.nodes.push(BspNode { plane, children: [0, 0] });

        let bounds = |a: &u32| self.areas[*a as usize - 1].bounds;
        let front: Vec<u32> = set.iter().copied().filter(|a| bounds(a).maxs[axis] > value).collect();
        let back: Vec<u32> = set.iter().copied().filter(|a| bounds(a).mins[axis] < value).collect();
        let mut front_region = region;
        front_region.mins[axis] = value;
        let mut back_region = region;
        back_region.maxs[axis] = value;

        let front_child = self.build_node(data, &front, front_region);
        let back_child = self.build_node(data, &back, back_region);
        data.nodes[node].children = [front_child, back_child];
        node as i32
    }

    /// Median of the box planes strictly inside the region, on the axis
    /// offering the most of them.
    fn choose_split(&self, set: &[u32], region: &BBox) -> Option<(usize, f32)> {
        let mut best: Option<(usize, Vec<f32>)> = None;
        for axis in 0..3 {
            let mut values: Vec<f32> = set
                .iter()
                .flat_map(|&a| {
                    let b = self.areas[a as usize - 1].bounds;
                    [b.mins[axis], b.maxs[axis]]
                })
                .filter(|&v| v > region.mins[axis] && v < region.maxs[axis])
                .collect();
            values.sort_by(f32::total_cmp);
            values.dedup();
            if !values.is_empty() && best.as_ref().is_none_or(|(_, b)| values.len() > b.len()) {
                best = Some((axis, values));
            }
        }
        best.map(|(axis, values)| (axis, values[values.len() / 2]))
    }

    fn build_clusters(&self, data: &mut WorldData) -> Result<()> {
        let num_areas = self.areas.len() + 1;
        let is_portal = |area: usize| area > 0 && self.areas[area - 1].portal;

        // Undirected adjacency over reachabilities.
        let mut neighbours: Vec<Vec<u32>> = vec![Vec::new(); num_areas];
        for (from, settings) in data.area_settings.iter().enumerate().skip(1) {
            for reach in &data.reachabilities[settings.reach_range()] {
                neighbours[from].push(reach.area);
                neighbours[reach.area as usize].push(from as u32);
            }
        }

        let mut cluster_of = vec![0u32; num_areas];
        let mut cluster_members: Vec<Vec<u32>> = vec![Vec::new()];
        for seed in 1..num_areas {
            if is_portal(seed) || cluster_of[seed] != 0 {
                continue;
            }
            let cluster = cluster_members.len() as u32;
            let mut members = vec![seed as u32];
            cluster_of[seed] = cluster;
            let mut next = 0;
            while next < members.len() {
                let area = members[next] as usize;
                next += 1;
                for &other in &neighbours[area] {
                    let other = other as usize;
                    if !is_portal(other) && cluster_of[other] == 0 {
                        cluster_of[other] = cluster;
                        members.push(other as u32);
                    }
                }
            }
            cluster_members.push(members);
        }

        for area in (1..num_areas).filter(|&a| is_portal(a)) {
            let mut touched: Vec<u32> = neighbours[area]
                .iter()
                .map(|&n| cluster_of[n as usize])
                .filter(|&c| c != 0)
                .collect();
            touched.sort_unstable();
            touched.dedup();
            if touched.len() != 2 {
                return Err(NavError::BadLump {
                    lump: "portals",
                    reason: format!("portal area {} touches {} clusters, expected 2", area, touched.len()),
                });
            }
            let portal_num = data.portals.len() as u32;
            data.portals.push(Portal {
                area: area as u32,
                front_cluster: touched[0],
                back_cluster: touched[1],
                cluster_area_num: [0, 0],
            });
            data.area_settings[area].cluster = -(portal_num as i32);
            cluster_members[touched[0] as usize].push(area as u32);
            cluster_members[touched[1] as usize].push(area as u32);
        }

        data.portal_index.push(0);
        for (cluster_num, members) in cluster_members.iter_mut().enumerate().skip(1) {
            // Areas with reachabilities come first inside a cluster.
            members.sort_by_key(|&a| (data.area_settings[a as usize].num_reach == 0, a));
            let num_reach_areas = members.iter().filter(|&&a| data.area_settings[a as usize].num_reach > 0).count();

            let first_portal = data.portal_index.len() as u32;
            for (index, &area) in members.iter().enumerate() {
                let settings = &mut data.area_settings[area as usize];
                if settings.cluster < 0 {
                    let portal_num = (-settings.cluster) as usize;
                    let portal = &mut data.portals[portal_num];
                    let side = if portal.front_cluster == cluster_num as u32 { 0 } else { 1 };
                    portal.cluster_area_num[side] = index as u32;
                    if side == 0 {
                        settings.cluster_area_num = index as u32;
                    }
                    data.portal_index.push(portal_num as u32);
                } else {
                    settings.cluster = cluster_num as i32;
                    settings.cluster_area_num = index as u32;
                }
            }

            data.clusters.push(Cluster {
                num_areas: members.len() as u32,
                num_reach_areas: num_reach_areas as u32,
                num_portals: data.portal_index.len() as u32 - first_portal,
                first_portal,
            });
        }
        Ok(())
    }
}

/// Slot (`axis * 2 + side`) of the face of `from` that `to` lies against.
fn touching_face(from: &BBox, to: &BBox) -> Option<usize> {
    (0..3).find_map(|axis| {
        if (to.mins[axis] - from.maxs[axis]).abs() < TOUCH_EPSILON {
            Some(axis * 2 + 1)
        } else if (to.maxs[axis] - from.mins[axis]).abs() < TOUCH_EPSILON {
            Some(axis * 2)
        } else {
            None
        }
    })
}
