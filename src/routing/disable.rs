//! Requests that temporarily block areas for one route cache.

use bevy::prelude::*;
use smallvec::SmallVec;

use crate::world::World;

/// Something that blocks a set of areas while it is active, such as a closed
/// door or a hazard zone. Requests are re-evaluated every time the disabled
/// zones of a cache are set.
pub trait DisableZoneRequest {
    /// Append the blocked area numbers to `out`. Invalid numbers are ignored.
    fn disabled_areas(&self, world: &World, out: &mut Vec<u32>);
}

/// Blocks an explicit list of areas.
#[derive(Clone, Debug, Default)]
pub struct AreaListRequest {
    pub areas: SmallVec<[u32; 8]>,
}

impl AreaListRequest {
    pub fn new(areas: impl IntoIterator<Item = u32>) -> Self {
        Self { areas: areas.into_iter().collect() }
    }
}

impl DisableZoneRequest for AreaListRequest {
    fn disabled_areas(&self, _world: &World, out: &mut Vec<u32>) {
        out.extend_from_slice(&self.areas);
    }
}

/// Blocks every area whose BSP leaves touch an axis-aligned box.
#[derive(Clone, Copy, Debug)]
pub struct BoxRequest {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub max_areas: usize,
}

impl BoxRequest {
    pub fn new(mins: Vec3, maxs: Vec3) -> Self {
        Self { mins, maxs, max_areas: 256 }
    }
}

impl DisableZoneRequest for BoxRequest {
    fn disabled_areas(&self, world: &World, out: &mut Vec<u32>) {
        out.extend(world.box_areas(self.mins, self.maxs, self.max_areas));
    }
}
