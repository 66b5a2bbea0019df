//! Binary world file: a fixed header followed by thirteen fixed-record lumps.
//!
//! ```text
//! u32 magic ('EAAS')  u32 version  i32 bsp checksum
//! 13 x (u32 offset, u32 length)
//! lump bytes, each lump XOR-obfuscated with (index * 119)
//! ```
//! Index 0 of every indexed lump is a dummy entry; area, reachability,
//! portal and cluster number 0 means "none".

use bevy::prelude::*;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use fixedbitset::FixedBitSet;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use super::bsp::ROOT_NODE;
use super::types::*;
use crate::{NavError, Result};

/// 'EAAS' in little-endian.
pub const AAS_MAGIC: u32 = 0x5341_4145;
pub const AAS_VERSION: u32 = 5;

const HEADER_SIZE: usize = 12 + LUMP_COUNT * 8;
const LUMP_COUNT: usize = 13;

#[repr(usize)]
#[derive(Clone, Copy, Debug)]
enum Lump {
    Vertices,
    Planes,
    Edges,
    EdgeIndex,
    Faces,
    FaceIndex,
    Areas,
    AreaSettings,
    Reachabilities,
    Nodes,
    Portals,
    PortalIndex,
    Clusters,
}

impl Lump {
    const ALL: [Lump; LUMP_COUNT] = [
        Lump::Vertices,
        Lump::Planes,
        Lump::Edges,
        Lump::EdgeIndex,
        Lump::Faces,
        Lump::FaceIndex,
        Lump::Areas,
        Lump::AreaSettings,
        Lump::Reachabilities,
        Lump::Nodes,
        Lump::Portals,
        Lump::PortalIndex,
        Lump::Clusters,
    ];

    fn name(self) -> &'static str {
        match self {
            Lump::Vertices => "vertices",
            Lump::Planes => "planes",
            Lump::Edges => "edges",
            Lump::EdgeIndex => "edge index",
            Lump::Faces => "faces",
            Lump::FaceIndex => "face index",
            Lump::Areas => "areas",
            Lump::AreaSettings => "area settings",
            Lump::Reachabilities => "reachabilities",
            Lump::Nodes => "nodes",
            Lump::Portals => "portals",
            Lump::PortalIndex => "portal index",
            Lump::Clusters => "clusters",
        }
    }

    fn record_size(self) -> usize {
        match self {
            Lump::Vertices => 12,
            Lump::Planes => 20,
            Lump::Edges => 8,
            Lump::EdgeIndex => 4,
            Lump::Faces => 24,
            Lump::FaceIndex => 4,
            Lump::Areas => 48,
            Lump::AreaSettings => 28,
            Lump::Reachabilities => 44,
            Lump::Nodes => 12,
            Lump::Portals => 20,
            Lump::PortalIndex => 4,
            Lump::Clusters => 16,
        }
    }
}

/// Raw graph as stored in the world file.
#[derive(Clone, Debug, Default)]
pub struct WorldData {
    pub bsp_checksum: i32,
    pub vertices: Vec<Vec3>,
    pub planes: Vec<Plane>,
    pub edges: Vec<Edge>,
    /// Signed edge numbers; negative means the edge is walked backwards.
    pub edge_index: Vec<i32>,
    pub faces: Vec<Face>,
    /// Signed face numbers; negative means the area is behind the face.
    pub face_index: Vec<i32>,
    pub areas: Vec<Area>,
    pub area_settings: Vec<AreaSettings>,
    pub reachabilities: Vec<Reachability>,
    pub nodes: Vec<BspNode>,
    pub portals: Vec<Portal>,
    pub portal_index: Vec<u32>,
    pub clusters: Vec<Cluster>,
}

/// Deterministic obfuscation shared by the reader and the writer.
fn xor_lump(bytes: &mut [u8]) {
    for (i, b) in bytes.iter_mut().enumerate() {
        *b ^= (i as u32).wrapping_mul(119) as u8;
    }
}

/// Content checksum of the raw file bytes, used to key cache files.
pub fn content_checksum(bytes: &[u8]) -> String {
    let mut crc = flate2::Crc::new();
    crc.update(bytes);
    format!("{:08x}-{:x}", crc.sum(), bytes.len())
}

fn read_vec3<R: Read>(r: &mut R) -> std::io::Result<Vec3> {
    Ok(Vec3::new(
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
    ))
}

fn write_vec3<W: Write>(w: &mut W, v: Vec3) -> std::io::Result<()> {
    w.write_f32::<LittleEndian>(v.x)?;
    w.write_f32::<LittleEndian>(v.y)?;
    w.write_f32::<LittleEndian>(v.z)
}

fn non_negative(lump: Lump, value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| NavError::BadLump {
        lump: lump.name(),
        reason: format!("negative count or index {value}"),
    })
}

/// Load and validate a world file. Returns the data and the content checksum.
pub fn load_world_data(path: impl AsRef<Path>) -> Result<(WorldData, String)> {
    let bytes = std::fs::read(path.as_ref())?;
    let checksum = content_checksum(&bytes);
    let data = parse_world_data(&bytes)?;
    Ok((data, checksum))
}

pub fn parse_world_data(bytes: &[u8]) -> Result<WorldData> {
    if bytes.len() < HEADER_SIZE {
        return Err(NavError::BadLump {
            lump: "header",
            reason: format!("file is {} bytes, header needs {}", bytes.len(), HEADER_SIZE),
        });
    }

    let mut header = Cursor::new(bytes);
    let magic = header.read_u32::<LittleEndian>()?;
    if magic != AAS_MAGIC {
        return Err(NavError::BadMagic(magic));
    }
    let version = header.read_u32::<LittleEndian>()?;
    if version != AAS_VERSION {
        return Err(NavError::UnsupportedVersion { found: version, expected: AAS_VERSION });
    }
    let bsp_checksum = header.read_i32::<LittleEndian>()?;

    let mut lumps: Vec<Vec<u8>> = Vec::with_capacity(LUMP_COUNT);
    for lump in Lump::ALL {
        let offset = header.read_u32::<LittleEndian>()? as usize;
        let length = header.read_u32::<LittleEndian>()? as usize;
        let end = offset.checked_add(length).filter(|&end| end <= bytes.len());
        let Some(end) = end else {
            return Err(NavError::BadLump {
                lump: lump.name(),
                reason: format!("range {}+{} exceeds file size {}", offset, length, bytes.len()),
            });
        };
        if length % lump.record_size() != 0 {
            return Err(NavError::BadLump {
                lump: lump.name(),
                reason: format!("length {} is not a multiple of {}", length, lump.record_size()),
            });
        }
        let mut data = bytes[offset..end].to_vec();
        xor_lump(&mut data);
        lumps.push(data);
    }

    let mut data = WorldData { bsp_checksum, ..Default::default() };

    data.vertices = read_records(&lumps, Lump::Vertices, |r| read_vec3(r))?;
    data.planes = read_records(&lumps, Lump::Planes, |r| {
        Ok(Plane {
            normal: read_vec3(r)?,
            dist: r.read_f32::<LittleEndian>()?,
            kind: r.read_i32::<LittleEndian>()?,
        })
    })?;
    data.edges = read_records(&lumps, Lump::Edges, |r| {
        Ok(Edge { v: [r.read_u32::<LittleEndian>()?, r.read_u32::<LittleEndian>()?] })
    })?;
    data.edge_index = read_records(&lumps, Lump::EdgeIndex, |r| r.read_i32::<LittleEndian>())?;
    data.faces = read_records(&lumps, Lump::Faces, |r| {
        Ok(Face {
            plane: r.read_u32::<LittleEndian>()?,
            flags: FaceFlags(r.read_u32::<LittleEndian>()?),
            num_edges: r.read_u32::<LittleEndian>()?,
            first_edge: r.read_u32::<LittleEndian>()?,
            front_area: r.read_u32::<LittleEndian>()?,
            back_area: r.read_u32::<LittleEndian>()?,
        })
    })?;
    data.face_index = read_records(&lumps, Lump::FaceIndex, |r| r.read_i32::<LittleEndian>())?;
    data.areas = read_records(&lumps, Lump::Areas, |r| {
        let num = r.read_u32::<LittleEndian>()?;
        let num_faces = r.read_u32::<LittleEndian>()?;
        let first_face = r.read_u32::<LittleEndian>()?;
        let mins = read_vec3(r)?;
        let maxs = read_vec3(r)?;
        let center = read_vec3(r)?;
        Ok(Area { num, num_faces, first_face, bounds: BBox::new(mins, maxs), center })
    })?;
    data.area_settings = read_records(&lumps, Lump::AreaSettings, |r| {
        Ok(AreaSettings {
            contents: AreaContents(r.read_u32::<LittleEndian>()?),
            flags: AreaFlags(r.read_u32::<LittleEndian>()? & !AreaFlags::DERIVED_MASK),
            presence_type: r.read_i32::<LittleEndian>()?,
            cluster: r.read_i32::<LittleEndian>()?,
            cluster_area_num: r.read_u32::<LittleEndian>()?,
            num_reach: r.read_u32::<LittleEndian>()?,
            first_reach: r.read_u32::<LittleEndian>()?,
        })
    })?;
    data.reachabilities = read_records(&lumps, Lump::Reachabilities, |r| {
        let area = r.read_u32::<LittleEndian>()?;
        let face = r.read_i32::<LittleEndian>()?;
        let edge = r.read_i32::<LittleEndian>()?;
        let start = read_vec3(r)?;
        let end = read_vec3(r)?;
        let travel_type = r.read_u32::<LittleEndian>()?;
        let travel_time = r.read_u16::<LittleEndian>()?;
        let _pad = r.read_u16::<LittleEndian>()?;
        Ok(Reachability { area, face, edge, start, end, travel_type, travel_time })
    })?;
    data.nodes = read_records(&lumps, Lump::Nodes, |r| {
        Ok(BspNode {
            plane: r.read_u32::<LittleEndian>()?,
            children: [r.read_i32::<LittleEndian>()?, r.read_i32::<LittleEndian>()?],
        })
    })?;
    data.portals = read_records(&lumps, Lump::Portals, |r| {
        Ok(Portal {
            area: r.read_u32::<LittleEndian>()?,
            front_cluster: r.read_u32::<LittleEndian>()?,
            back_cluster: r.read_u32::<LittleEndian>()?,
            cluster_area_num: [r.read_u32::<LittleEndian>()?, r.read_u32::<LittleEndian>()?],
        })
    })?;
    data.portal_index = read_records(&lumps, Lump::PortalIndex, |r| {
        let value = r.read_i32::<LittleEndian>()?;
        Ok(value.max(-1) as u32)
    })?;
    data.clusters = read_records(&lumps, Lump::Clusters, |r| {
        Ok(Cluster {
            num_areas: r.read_u32::<LittleEndian>()?,
            num_reach_areas: r.read_u32::<LittleEndian>()?,
            num_portals: r.read_u32::<LittleEndian>()?,
            first_portal: r.read_u32::<LittleEndian>()?,
        })
    })?;

    validate(&data)?;
    Ok(data)
}

fn read_records<T>(
    lumps: &[Vec<u8>],
    lump: Lump,
    mut read_one: impl FnMut(&mut Cursor<&[u8]>) -> std::io::Result<T>,
) -> Result<Vec<T>> {
    let bytes = lumps[lump as usize].as_slice();
    let count = bytes.len() / lump.record_size();
    let mut cursor = Cursor::new(bytes);
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(read_one(&mut cursor)?);
    }
    Ok(out)
}

fn check_index(what: &'static str, index: i64, count: usize) -> Result<()> {
    if index < 0 || index as usize >= count {
        return Err(NavError::InvalidIndex { what, index, count });
    }
    Ok(())
}

fn check_range(lump: Lump, first: u32, num: u32, len: usize) -> Result<()> {
    let end = first as u64 + num as u64;
    if end > len as u64 {
        return Err(NavError::BadLump {
            lump: lump.name(),
            reason: format!("span {first}+{num} exceeds {len} entries"),
        });
    }
    Ok(())
}

/// Structural checks. Everything the router and the BSP walks index blindly
/// is verified here once.
fn validate(data: &WorldData) -> Result<()> {
    for (lump, len) in [
        (Lump::Areas, data.areas.len()),
        (Lump::AreaSettings, data.area_settings.len()),
        (Lump::Nodes, data.nodes.len()),
        (Lump::Clusters, data.clusters.len()),
        (Lump::Reachabilities, data.reachabilities.len()),
        (Lump::Portals, data.portals.len()),
    ] {
        if len == 0 {
            return Err(NavError::BadLump { lump: lump.name(), reason: "missing dummy entry 0".into() });
        }
    }
    if data.areas.len() != data.area_settings.len() {
        return Err(NavError::BadLump {
            lump: Lump::AreaSettings.name(),
            reason: format!("{} settings for {} areas", data.area_settings.len(), data.areas.len()),
        });
    }
    if data.areas.len() > u16::MAX as usize {
        return Err(NavError::BadLump {
            lump: Lump::Areas.name(),
            reason: format!("{} areas exceed the supported maximum", data.areas.len()),
        });
    }

    let num_areas = data.areas.len();
    for edge in &data.edges {
        for &v in &edge.v {
            check_index("edge vertex", v as i64, data.vertices.len())?;
        }
    }
    for &e in &data.edge_index {
        check_index("edge", (e as i64).abs(), data.edges.len())?;
    }
    for face in &data.faces {
        check_index("face plane", face.plane as i64, data.planes.len())?;
        check_range(Lump::EdgeIndex, face.first_edge, face.num_edges, data.edge_index.len())?;
        check_index("face front area", face.front_area as i64, num_areas)?;
        check_index("face back area", face.back_area as i64, num_areas)?;
    }
    for &f in &data.face_index {
        check_index("face", (f as i64).abs(), data.faces.len())?;
    }
    for area in &data.areas {
        check_range(Lump::FaceIndex, area.first_face, area.num_faces, data.face_index.len())?;
    }
    for settings in &data.area_settings {
        check_range(Lump::Reachabilities, settings.first_reach, settings.num_reach, data.reachabilities.len())?;
        if settings.cluster > 0 {
            check_index("area cluster", settings.cluster as i64, data.clusters.len())?;
            let cluster = &data.clusters[settings.cluster as usize];
            check_index("area cluster index", settings.cluster_area_num as i64, cluster.num_areas as usize)?;
        } else if settings.cluster < 0 {
            check_index("area portal", -(settings.cluster as i64), data.portals.len())?;
        }
    }
    for reach in data.reachabilities.iter().skip(1) {
        check_index("reachability target area", reach.area as i64, num_areas)?;
        if reach.area == 0 {
            return Err(NavError::InvalidIndex { what: "reachability target area", index: 0, count: num_areas });
        }
    }
    for node in &data.nodes {
        check_index("node plane", node.plane as i64, data.planes.len())?;
        for &child in &node.children {
            if child > 0 {
                check_index("node child", child as i64, data.nodes.len())?;
            } else if child < 0 {
                check_index("leaf area", -(child as i64), num_areas)?;
            }
        }
    }
    check_bsp_is_tree(data)?;
    for (portal_num, portal) in data.portals.iter().enumerate() {
        check_index("portal front cluster", portal.front_cluster as i64, data.clusters.len())?;
        check_index("portal back cluster", portal.back_cluster as i64, data.clusters.len())?;
        if portal_num == 0 {
            continue;
        }
        check_index("portal area", portal.area as i64, num_areas)?;
        for (side, cluster) in [portal.front_cluster, portal.back_cluster].into_iter().enumerate() {
            if cluster == 0 {
                return Err(NavError::InvalidIndex { what: "portal cluster", index: 0, count: data.clusters.len() });
            }
            check_index(
                "portal cluster index",
                portal.cluster_area_num[side] as i64,
                data.clusters[cluster as usize].num_areas as usize,
            )?;
        }
    }
    for &p in &data.portal_index {
        check_index("portal", p as i64, data.portals.len())?;
    }
    for cluster in &data.clusters {
        check_range(Lump::PortalIndex, cluster.first_portal, cluster.num_portals, data.portal_index.len())?;
        if cluster.num_reach_areas > cluster.num_areas {
            return Err(NavError::BadLump {
                lump: Lump::Clusters.name(),
                reason: format!("{} reachability areas out of {}", cluster.num_reach_areas, cluster.num_areas),
            });
        }
    }
    Ok(())
}

/// Every node below the root must be reached exactly once, otherwise the
/// descents loop or revisit subtrees.
fn check_bsp_is_tree(data: &WorldData) -> Result<()> {
    if data.nodes.len() <= ROOT_NODE as usize {
        return Ok(());
    }
    let mut seen = FixedBitSet::with_capacity(data.nodes.len());
    seen.insert(ROOT_NODE as usize);
    let mut stack = vec![ROOT_NODE as usize];
    while let Some(node) = stack.pop() {
        for &child in &data.nodes[node].children {
            if child <= 0 {
                continue;
            }
            if seen.put(child as usize) {
                return Err(NavError::BadLump {
                    lump: Lump::Nodes.name(),
                    reason: format!("node {child} is reached twice from the root"),
                });
            }
            stack.push(child as usize);
        }
    }
    Ok(())
}

/// Serialize world data into the on-disk layout.
pub fn world_data_to_bytes(data: &WorldData) -> Result<Vec<u8>> {
    let mut lumps: Vec<Vec<u8>> = vec![Vec::new(); LUMP_COUNT];

    {
        let w = &mut lumps[Lump::Vertices as usize];
        for &v in &data.vertices {
            write_vec3(w, v)?;
        }
    }
    {
        let w = &mut lumps[Lump::Planes as usize];
        for p in &data.planes {
            write_vec3(w, p.normal)?;
            w.write_f32::<LittleEndian>(p.dist)?;
            w.write_i32::<LittleEndian>(p.kind)?;
        }
    }
    {
        let w = &mut lumps[Lump::Edges as usize];
        for e in &data.edges {
            w.write_u32::<LittleEndian>(e.v[0])?;
            w.write_u32::<LittleEndian>(e.v[1])?;
        }
    }
    {
        let w = &mut lumps[Lump::EdgeIndex as usize];
        for &e in &data.edge_index {
            w.write_i32::<LittleEndian>(e)?;
        }
    }
    {
        let w = &mut lumps[Lump::Faces as usize];
        for f in &data.faces {
            w.write_u32::<LittleEndian>(f.plane)?;
            w.write_u32::<LittleEndian>(f.flags.0)?;
            w.write_u32::<LittleEndian>(f.num_edges)?;
            w.write_u32::<LittleEndian>(f.first_edge)?;
            w.write_u32::<LittleEndian>(f.front_area)?;
            w.write_u32::<LittleEndian>(f.back_area)?;
        }
    }
    {
        let w = &mut lumps[Lump::FaceIndex as usize];
        for &f in &data.face_index {
            w.write_i32::<LittleEndian>(f)?;
        }
    }
    {
        let w = &mut lumps[Lump::Areas as usize];
        for a in &data.areas {
            w.write_u32::<LittleEndian>(a.num)?;
            w.write_u32::<LittleEndian>(a.num_faces)?;
            w.write_u32::<LittleEndian>(a.first_face)?;
            write_vec3(w, a.bounds.mins)?;
            write_vec3(w, a.bounds.maxs)?;
            write_vec3(w, a.center)?;
        }
    }
    {
        let w = &mut lumps[Lump::AreaSettings as usize];
        for s in &data.area_settings {
            w.write_u32::<LittleEndian>(s.contents.0)?;
            w.write_u32::<LittleEndian>(s.flags.0 & !AreaFlags::DERIVED_MASK)?;
            w.write_i32::<LittleEndian>(s.presence_type)?;
            w.write_i32::<LittleEndian>(s.cluster)?;
            w.write_u32::<LittleEndian>(s.cluster_area_num)?;
            w.write_u32::<LittleEndian>(s.num_reach)?;
            w.write_u32::<LittleEndian>(s.first_reach)?;
        }
    }
    {
        let w = &mut lumps[Lump::Reachabilities as usize];
        for r in &data.reachabilities {
            w.write_u32::<LittleEndian>(r.area)?;
            w.write_i32::<LittleEndian>(r.face)?;
            w.write_i32::<LittleEndian>(r.edge)?;
            write_vec3(w, r.start)?;
            write_vec3(w, r.end)?;
            w.write_u32::<LittleEndian>(r.travel_type)?;
            w.write_u16::<LittleEndian>(r.travel_time)?;
            w.write_u16::<LittleEndian>(0)?;
        }
    }
    {
        let w = &mut lumps[Lump::Nodes as usize];
        for n in &data.nodes {
            w.write_u32::<LittleEndian>(n.plane)?;
            w.write_i32::<LittleEndian>(n.children[0])?;
            w.write_i32::<LittleEndian>(n.children[1])?;
        }
    }
    {
        let w = &mut lumps[Lump::Portals as usize];
        for p in &data.portals {
            w.write_u32::<LittleEndian>(p.area)?;
            w.write_u32::<LittleEndian>(p.front_cluster)?;
            w.write_u32::<LittleEndian>(p.back_cluster)?;
            w.write_u32::<LittleEndian>(p.cluster_area_num[0])?;
            w.write_u32::<LittleEndian>(p.cluster_area_num[1])?;
        }
    }
    {
        let w = &mut lumps[Lump::PortalIndex as usize];
        for &p in &data.portal_index {
            w.write_u32::<LittleEndian>(p)?;
        }
    }
    {
        let w = &mut lumps[Lump::Clusters as usize];
        for c in &data.clusters {
            w.write_u32::<LittleEndian>(c.num_areas)?;
            w.write_u32::<LittleEndian>(c.num_reach_areas)?;
            w.write_u32::<LittleEndian>(c.num_portals)?;
            w.write_u32::<LittleEndian>(c.first_portal)?;
        }
    }

    let mut out = Vec::with_capacity(HEADER_SIZE + lumps.iter().map(Vec::len).sum::<usize>());
    out.write_u32::<LittleEndian>(AAS_MAGIC)?;
    out.write_u32::<LittleEndian>(AAS_VERSION)?;
    out.write_i32::<LittleEndian>(data.bsp_checksum)?;
    let mut offset = HEADER_SIZE;
    for lump in &lumps {
        out.write_u32::<LittleEndian>(offset as u32)?;
        out.write_u32::<LittleEndian>(lump.len() as u32)?;
        offset += lump.len();
    }
    for mut lump in lumps {
        xor_lump(&mut lump);
        out.extend_from_slice(&lump);
    }
    Ok(out)
}

/// Write world data to `path`, returning the content checksum of the bytes written.
pub fn save_world_data(path: impl AsRef<Path>, data: &WorldData) -> Result<String> {
    let bytes = world_data_to_bytes(data)?;
    std::fs::write(path.as_ref(), &bytes)?;
    debug!("[AAS LOAD] Wrote {} bytes of world data to {}", bytes.len(), path.as_ref().display());
    Ok(content_checksum(&bytes))
}
