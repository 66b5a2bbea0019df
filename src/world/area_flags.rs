//! Area flags derived from face geometry, reachabilities and short traces,
//! plus the eroded inner bounds of every area.

use bevy::prelude::*;

use super::travel::TravelType;
use super::types::{AreaFlags, BBox, FaceFlags};
use super::World;
use crate::collision::CollisionWorld;
use crate::elements_mask::ElementsMask;
use crate::profiling::profile;
use crate::NavConfig;

/// Outward normals flatter than this count as walls.
const WALL_NORMAL_Z: f32 = 0.2;
/// Floors steeper than this (but still walkable) are inclined.
const FLAT_FLOOR_NORMAL_Z: f32 = 0.99;
const WALKABLE_FLOOR_NORMAL_Z: f32 = 0.7;

const SKIP_COLLISION_RADII: [(f32, AreaFlags); 3] = [
    (16.0, AreaFlags::SKIP_COLLISION_16),
    (32.0, AreaFlags::SKIP_COLLISION_32),
    (48.0, AreaFlags::SKIP_COLLISION_48),
];

/// Shrink every area box until no boundary vertex lies strictly inside it
/// in the horizontal plane. Boxes of box-shaped areas are unchanged.
pub(super) fn compute_inner_bounds(world: &World) -> Vec<BBox> {
    let mut bounds = Vec::with_capacity(world.num_areas());
    bounds.push(BBox::default());
    for area in 1..world.num_areas() as u32 {
        let mut inner = world.area(area).bounds;
        for v in world.area_vertices(area) {
            let inside = v.x > inner.mins.x && v.x < inner.maxs.x && v.y > inner.mins.y && v.y < inner.maxs.y;
            if !inside {
                continue;
            }
            // Move whichever side is closest to the vertex.
            let candidates = [
                (v.x - inner.mins.x, 0),
                (inner.maxs.x - v.x, 1),
                (v.y - inner.mins.y, 2),
                (inner.maxs.y - v.y, 3),
            ];
            let side = candidates
                .iter()
                .min_by(|a, b| a.0.total_cmp(&b.0))
                .map(|c| c.1)
                .unwrap_or(0);
            match side {
                0 => inner.mins.x = v.x,
                1 => inner.maxs.x = v.x,
                2 => inner.mins.y = v.y,
                _ => inner.maxs.y = v.y,
            }
        }
        bounds.push(inner);
    }
    bounds
}

#[profile(20)]
pub(super) fn compute_derived_flags(
    world: &World,
    config: &NavConfig,
    collision: &dyn CollisionWorld,
    mask: &mut ElementsMask,
) -> Vec<AreaFlags> {
    let num_areas = world.num_areas();
    let mut flags = vec![AreaFlags::default(); num_areas];

    // Faces some reachability passes through are openings, never walls.
    let crossed_faces = mask.clear_faces();
    for reach in world.data.reachabilities.iter().skip(1) {
        let face = reach.face.unsigned_abs() as usize;
        if face != 0 && face < crossed_faces.len() {
            crossed_faces.insert(face);
        }
    }

    for area in 1..num_areas as u32 {
        let settings = world.settings(area);
        let grounded = settings.flags.contains(AreaFlags::GROUNDED);
        let mut derived = AreaFlags::default();

        for (face_num, face, outward) in world.area_faces(area) {
            if face.flags.contains(FaceFlags::SOLID)
                && outward.z.abs() < WALL_NORMAL_Z
                && !crossed_faces.contains(face_num as usize)
            {
                derived.insert(AreaFlags::WALL);
            }
            if face.flags.contains(FaceFlags::GAP) {
                derived.insert(AreaFlags::LEDGE);
            }
            let up = -outward.z;
            if grounded && face.flags.contains(FaceFlags::GROUND) && up > WALKABLE_FLOOR_NORMAL_Z && up < FLAT_FLOOR_NORMAL_Z {
                derived.insert(AreaFlags::INCLINED_FLOOR);
            }
        }

        let mut max_drop = 0.0f32;
        for (_, reach) in world.area_reachabilities(area) {
            if reach.kind() == Some(TravelType::WalkOffLedge) {
                derived.insert(AreaFlags::LEDGE);
            }
            max_drop = max_drop.max(reach.start.z - reach.end.z);
        }
        if grounded && max_drop <= config.short_fall_height && !derived.contains(AreaFlags::LEDGE) {
            derived.insert(AreaFlags::NOFALL);
        }

        let size = world.area(area).bounds.size();
        let isolated = settings.num_reach == 0 && world.reversed_reachabilities(area).is_empty();
        if isolated || size.x <= 0.0 || size.y <= 0.0 || size.z <= 0.0 {
            derived.insert(AreaFlags::JUNK);
        }

        if grounded && !derived.contains(AreaFlags::JUNK) {
            derived.insert(skip_collision_flags(world, area, collision));
        }

        flags[area as usize] = derived;
    }

    let junk = flags.iter().filter(|f| f.contains(AreaFlags::JUNK)).count();
    let walls = flags.iter().filter(|f| f.contains(AreaFlags::WALL)).count();
    debug!("[AAS LOAD] Derived area flags: {} junk areas, {} wall areas", junk, walls);
    flags
}

/// Radii at which an agent standing in the interior can reach every inner
/// corner without touching solid geometry.
fn skip_collision_flags(world: &World, area: u32, collision: &dyn CollisionWorld) -> AreaFlags {
    let inner = world.area_inner_bounds(area);
    let floor = world.area(area).bounds.mins.z;
    let footprint = inner.size();
    let mut flags = AreaFlags::default();
    for (radius, flag) in SKIP_COLLISION_RADII {
        if footprint.x < 2.0 * radius || footprint.y < 2.0 * radius {
            break;
        }
        let z = floor + radius + 1.0;
        let center = Vec3::new(inner.center().x, inner.center().y, z);
        let half_extent = Vec3::new(radius, radius, radius);
        let corners = [
            Vec3::new(inner.mins.x + radius, inner.mins.y + radius, z),
            Vec3::new(inner.maxs.x - radius, inner.mins.y + radius, z),
            Vec3::new(inner.mins.x + radius, inner.maxs.y - radius, z),
            Vec3::new(inner.maxs.x - radius, inner.maxs.y - radius, z),
        ];
        if corners.iter().all(|&corner| collision.trace_box(center, corner, half_extent) >= 1.0) {
            flags.insert(flag);
        } else {
            break;
        }
    }
    flags
}
