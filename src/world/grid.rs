//! Uniform grid over the world bounds caching the BSP descent per cell.

use bevy::prelude::*;

use super::bsp::{box_on_plane_side, BoxSide, ROOT_NODE};
use super::file::WorldData;

/// Cells beyond this are merged by growing the cell size.
const MAX_GRID_CELLS: usize = 1 << 20;
const CELL_EPSILON: f32 = 0.125;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum GridCell {
    /// The whole cell lies in solid space.
    Solid,
    /// The whole cell lies inside one area.
    Area(u32),
    /// The deepest node whose plane does not split the cell.
    Node(i32),
}

#[derive(Clone, Debug, Default)]
pub(super) struct AreaGrid {
    origin: Vec3,
    cell_size: f32,
    dims: UVec3,
    cells: Vec<GridCell>,
}

impl AreaGrid {
    pub(super) fn build(data: &WorldData, requested_cell_size: f32) -> Self {
        let mut areas = data.areas.iter().skip(1);
        let Some(first) = areas.next() else {
            return Self::default();
        };
        let (mut mins, mut maxs) = (first.bounds.mins, first.bounds.maxs);
        for area in areas {
            mins = mins.min(area.bounds.mins);
            maxs = maxs.max(area.bounds.maxs);
        }

        let extent = (maxs - mins).max(Vec3::ONE);
        let mut cell_size = requested_cell_size.max(1.0);
        let mut dims = (extent / cell_size).ceil().as_uvec3().max(UVec3::ONE);
        while (dims.x as usize) * (dims.y as usize) * (dims.z as usize) > MAX_GRID_CELLS {
            cell_size *= 2.0;
            dims = (extent / cell_size).ceil().as_uvec3().max(UVec3::ONE);
        }

        let mut grid = Self {
            origin: mins,
            cell_size,
            dims,
            cells: Vec::with_capacity((dims.x * dims.y * dims.z) as usize),
        };
        for z in 0..dims.z {
            for y in 0..dims.y {
                for x in 0..dims.x {
                    // Inflated so rounding in `cell_index` can never leave the box.
                    let cell_mins = grid.origin + UVec3::new(x, y, z).as_vec3() * cell_size - CELL_EPSILON;
                    let cell_maxs = cell_mins + Vec3::splat(cell_size + 2.0 * CELL_EPSILON);
                    grid.cells.push(classify_cell(data, cell_mins, cell_maxs));
                }
            }
        }
        grid
    }

    fn cell_index(&self, point: Vec3) -> Option<usize> {
        if self.cells.is_empty() {
            return None;
        }
        let local = (point - self.origin) / self.cell_size;
        if local.cmplt(Vec3::ZERO).any() {
            return None;
        }
        if local.cmpgt(self.dims.as_vec3()).any() {
            return None;
        }
        // Points on the far boundary belong to the last cell.
        let cell = local.floor().as_uvec3().min(self.dims - UVec3::ONE);
        Some(((cell.z * self.dims.y + cell.y) * self.dims.x + cell.x) as usize)
    }

    /// `None` outside the grid, where the caller descends from the root.
    pub(super) fn lookup_cell(&self, point: Vec3) -> Option<GridCell> {
        self.cell_index(point).map(|i| self.cells[i])
    }

    pub(super) fn num_cells(&self) -> usize {
        self.cells.len()
    }
}

impl super::World {
    /// Grid-accelerated leaf lookup used by `point_to_area`.
    pub(super) fn grid_lookup(&self, point: Vec3) -> Option<u32> {
        match self.grid.lookup_cell(point)? {
            GridCell::Solid => Some(0),
            GridCell::Area(area) => Some(area),
            GridCell::Node(node) => Some(self.descend(node, point)),
        }
    }
}

fn classify_cell(data: &WorldData, mins: Vec3, maxs: Vec3) -> GridCell {
    let mut node = ROOT_NODE;
    if data.nodes.len() <= 1 {
        return GridCell::Solid;
    }
    loop {
        if node < 0 {
            return GridCell::Area(node.unsigned_abs());
        }
        if node == 0 {
            return GridCell::Solid;
        }
        let bsp = &data.nodes[node as usize];
        match box_on_plane_side(&data.planes[bsp.plane as usize], mins, maxs) {
            BoxSide::Front => node = bsp.children[0],
            BoxSide::Back => node = bsp.children[1],
            BoxSide::Both => return GridCell::Node(node),
        }
    }
}
