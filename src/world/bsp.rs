//! BSP queries: point classification, segment traces and box overlap.

use bevy::prelude::*;
use smallvec::SmallVec;

use super::types::{BBox, Plane};
use super::World;

/// Node numbers are signed: > 0 node, < 0 minus an area, 0 solid.
pub(super) const ROOT_NODE: i32 = 1;

/// Relation of a box to a plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum BoxSide {
    Front,
    Back,
    Both,
}

/// A point on the plane goes to the back child, matching `descend`.
pub(super) fn box_on_plane_side(plane: &Plane, mins: Vec3, maxs: Vec3) -> BoxSide {
    let mut near = Vec3::ZERO;
    let mut far = Vec3::ZERO;
    for axis in 0..3 {
        if plane.normal[axis] >= 0.0 {
            near[axis] = mins[axis];
            far[axis] = maxs[axis];
        } else {
            near[axis] = maxs[axis];
            far[axis] = mins[axis];
        }
    }
    if plane.distance(near) > 0.0 {
        BoxSide::Front
    } else if plane.distance(far) <= 0.0 {
        BoxSide::Back
    } else {
        BoxSide::Both
    }
}

struct TraceSegment {
    start: Vec3,
    end: Vec3,
    node: i32,
}

impl World {
    /// Descend from `node` to the leaf containing `point`. Returns the area
    /// number, 0 for solid space.
    pub(super) fn descend(&self, mut node: i32, point: Vec3) -> u32 {
        while node > 0 {
            let bsp = &self.data.nodes[node as usize];
            let plane = &self.data.planes[bsp.plane as usize];
            node = if plane.distance(point) > 0.0 { bsp.children[0] } else { bsp.children[1] };
        }
        if node < 0 {
            node.unsigned_abs()
        } else {
            0
        }
    }

    /// Area containing `point`, 0 when the point is in solid space or
    /// outside the map.
    pub fn point_to_area(&self, point: Vec3) -> u32 {
        self.grid_lookup(point).unwrap_or_else(|| self.descend(ROOT_NODE, point))
    }

    /// Full BSP descent from the root, ignoring the grid.
    pub fn point_to_area_bsp(&self, point: Vec3) -> u32 {
        self.descend(ROOT_NODE, point)
    }

    /// Areas crossed by the segment `start -> end`, in order of traversal.
    /// Solid leaves are skipped; at most `max_areas` areas are returned.
    pub fn trace_areas(&self, start: Vec3, end: Vec3, max_areas: usize) -> Vec<u32> {
        let mut areas = Vec::new();
        if max_areas == 0 || self.data.nodes.len() <= 1 {
            return areas;
        }

        let mut stack: SmallVec<[TraceSegment; 32]> = SmallVec::new();
        stack.push(TraceSegment { start, end, node: ROOT_NODE });

        while let Some(segment) = stack.pop() {
            if segment.node < 0 {
                let area = segment.node.unsigned_abs();
                if areas.last() != Some(&area) {
                    areas.push(area);
                    if areas.len() >= max_areas {
                        break;
                    }
                }
                continue;
            }
            if segment.node == 0 {
                continue;
            }

            let bsp = &self.data.nodes[segment.node as usize];
            let plane = &self.data.planes[bsp.plane as usize];
            let front = plane.distance(segment.start);
            let back = plane.distance(segment.end);

            if front > 0.0 && back > 0.0 {
                stack.push(TraceSegment { node: bsp.children[0], ..segment });
                continue;
            }
            if front <= 0.0 && back <= 0.0 {
                stack.push(TraceSegment { node: bsp.children[1], ..segment });
                continue;
            }

            // The segment crosses the plane: visit the near half first.
            let frac = (front / (front - back)).clamp(0.0, 1.0);
            let mid = segment.start + (segment.end - segment.start) * frac;
            let (near, far) = if front > 0.0 {
                (bsp.children[0], bsp.children[1])
            } else {
                (bsp.children[1], bsp.children[0])
            };
            stack.push(TraceSegment { start: mid, end: segment.end, node: far });
            stack.push(TraceSegment { start: segment.start, end: mid, node: near });
        }
        areas
    }

    /// Every area whose leaf the box touches, at most `max_areas` of them.
    pub fn box_areas(&self, mins: Vec3, maxs: Vec3, max_areas: usize) -> Vec<u32> {
        let mut areas = Vec::new();
        if self.data.nodes.len() <= 1 {
            return areas;
        }
        let mut stack: SmallVec<[i32; 32]> = SmallVec::new();
        stack.push(ROOT_NODE);
        while let Some(node) = stack.pop() {
            if areas.len() >= max_areas {
                break;
            }
            if node < 0 {
                let area = node.unsigned_abs();
                if !areas.contains(&area) {
                    areas.push(area);
                }
                continue;
            }
            if node == 0 {
                continue;
            }
            let bsp = &self.data.nodes[node as usize];
            match box_on_plane_side(&self.data.planes[bsp.plane as usize], mins, maxs) {
                BoxSide::Front => stack.push(bsp.children[0]),
                BoxSide::Back => stack.push(bsp.children[1]),
                BoxSide::Both => {
                    stack.push(bsp.children[1]);
                    stack.push(bsp.children[0]);
                }
            }
        }
        areas
    }

    /// Like `box_areas`, for a box given by its bounds.
    pub fn bbox_areas(&self, bounds: &BBox, max_areas: usize) -> Vec<u32> {
        self.box_areas(bounds.mins, bounds.maxs, max_areas)
    }
}
