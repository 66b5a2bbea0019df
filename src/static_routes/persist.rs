use std::path::Path;

use bevy::prelude::*;

use super::StaticRouteTable;
use crate::cache_file::{read_cache_file, write_cache_file, CacheTag};
use crate::world::World;
use crate::{NavConfig, Result};

pub const STATIC_ROUTES_TAG: CacheTag = *b"STATICRT";
pub const STATIC_ROUTES_VERSION: u32 = 1;
pub const STATIC_ROUTES_EXTENSION: &str = "routes";

impl StaticRouteTable {
    pub fn write(&self, path: impl AsRef<Path>, world: &World) -> Result<()> {
        write_cache_file(path, &STATIC_ROUTES_TAG, STATIC_ROUTES_VERSION, world.checksum(), self)
    }

    /// Read a table built for exactly this world, or `None`.
    pub fn read(path: impl AsRef<Path>, world: &World) -> Option<StaticRouteTable> {
        let path = path.as_ref();
        let table: StaticRouteTable =
            read_cache_file(path, &STATIC_ROUTES_TAG, STATIC_ROUTES_VERSION, world.checksum())?;
        if table.num_areas() != world.num_areas() {
            warn!(
                "[STATIC ROUTES] Discarding {}: built for {} areas, world has {}",
                path.display(),
                table.num_areas(),
                world.num_areas()
            );
            return None;
        }
        if !table.is_consistent() {
            warn!("[STATIC ROUTES] Discarding {}: inconsistent spans", path.display());
            return None;
        }
        Some(table)
    }

    /// Read the table from the cache directory if present.
    pub fn load_cached(world: &World, config: &NavConfig) -> Option<StaticRouteTable> {
        let path = config.cache_path(world.map_name(), STATIC_ROUTES_EXTENSION)?;
        Self::read(path, world)
    }

    /// Write the table into the cache directory. A no-op without one.
    pub fn save_cached(&self, world: &World, config: &NavConfig) -> Result<()> {
        match config.cache_path(world.map_name(), STATIC_ROUTES_EXTENSION) {
            Some(path) => self.write(path, world),
            None => Ok(()),
        }
    }
}
