use bevy::prelude::*;

/// Solid-world collision model consulted while deriving area data.
///
/// Trace functions return the fraction of the segment travelled before
/// hitting something, `1.0` meaning unobstructed.
pub trait CollisionWorld {
    /// Whether `b` is in the potentially visible set of `a`.
    fn in_pvs(&self, a: Vec3, b: Vec3) -> bool;

    fn trace_ray(&self, start: Vec3, end: Vec3) -> f32;

    /// Sweep an axis-aligned box with the given half extents.
    fn trace_box(&self, start: Vec3, end: Vec3, half_extent: Vec3) -> f32;
}

/// Empty world: everything is visible and nothing is ever hit.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenSpace;

impl CollisionWorld for OpenSpace {
    fn in_pvs(&self, _a: Vec3, _b: Vec3) -> bool {
        true
    }

    fn trace_ray(&self, _start: Vec3, _end: Vec3) -> f32 {
        1.0
    }

    fn trace_box(&self, _start: Vec3, _end: Vec3, _half_extent: Vec3) -> f32 {
        1.0
    }
}

/// A set of solid boxes. Used for tooling and tests that need occluders.
#[derive(Clone, Debug, Default)]
pub struct SolidBoxes {
    pub boxes: Vec<crate::world::BBox>,
}

impl SolidBoxes {
    pub fn new(boxes: Vec<crate::world::BBox>) -> Self {
        Self { boxes }
    }

    /// Slab test of a segment against an expanded box; returns the entry fraction.
    fn segment_hit(start: Vec3, end: Vec3, mins: Vec3, maxs: Vec3) -> Option<f32> {
        let dir = end - start;
        let mut enter = 0.0f32;
        let mut exit = 1.0f32;
        for axis in 0..3 {
            let (s, d, lo, hi) = (start[axis], dir[axis], mins[axis], maxs[axis]);
            if d.abs() < f32::EPSILON {
                if s < lo || s > hi {
                    return None;
                }
                continue;
            }
            let mut t0 = (lo - s) / d;
            let mut t1 = (hi - s) / d;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            enter = enter.max(t0);
            exit = exit.min(t1);
            if enter > exit {
                return None;
            }
        }
        Some(enter)
    }
}

impl CollisionWorld for SolidBoxes {
    fn in_pvs(&self, _a: Vec3, _b: Vec3) -> bool {
        true
    }

    fn trace_ray(&self, start: Vec3, end: Vec3) -> f32 {
        self.trace_box(start, end, Vec3::ZERO)
    }

    fn trace_box(&self, start: Vec3, end: Vec3, half_extent: Vec3) -> f32 {
        self.boxes
            .iter()
            .filter_map(|b| Self::segment_hit(start, end, b.mins - half_extent, b.maxs + half_extent))
            .fold(1.0, f32::min)
    }
}
