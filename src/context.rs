//! The navigation state of one loaded map, exposed to the app as a resource.

use std::path::{Path, PathBuf};

use bevy::prelude::*;

use crate::collision::{CollisionWorld, OpenSpace};
use crate::elements_mask::ElementsMask;
use crate::routing::{DisableZoneRequest, Route, RouteCache, RouteCachePool, RouteCacheStats};
use crate::static_routes::StaticRouteTable;
use crate::world::{TravelFlags, World};
use crate::{NavConfig, Result};

/// Handle of a route cache inside a [`NavContext`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AgentId(u32);

impl AgentId {
    /// The cache with no blocked areas, usable by anyone.
    pub const SHARED: AgentId = AgentId(0);

    pub fn index(self) -> u32 {
        self.0
    }
}

/// World, scratch space, route caches and the optional precomputed table.
#[derive(Resource)]
pub struct NavContext {
    world: World,
    mask: ElementsMask,
    caches: RouteCachePool,
    static_routes: Option<StaticRouteTable>,
    config: NavConfig,
}

impl NavContext {
    pub fn load(
        path: impl AsRef<Path>,
        map_name: &str,
        config: NavConfig,
        collision: &dyn CollisionWorld,
    ) -> Result<Self> {
        let mut mask = ElementsMask::default();
        let world = World::load(path, map_name, &config, collision, &mut mask)?;
        Ok(Self::with_mask(world, mask, config))
    }

    pub fn from_world(world: World, config: NavConfig) -> Self {
        let mask = ElementsMask::new(world.num_areas(), world.data().faces.len());
        Self::with_mask(world, mask, config)
    }

    fn with_mask(world: World, mask: ElementsMask, config: NavConfig) -> Self {
        let shared = RouteCache::new(&world, &config);
        Self { world, mask, caches: RouteCachePool::new(shared), static_routes: None, config }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Agents
    // ------------------------------------------------------------------------

    /// Give an agent its own route cache so it can block areas privately.
    pub fn add_agent(&mut self) -> AgentId {
        let slot = self.caches.add(RouteCache::new(&self.world, &self.config));
        debug!("[NAV] Added route cache {}", slot);
        AgentId(slot as u32)
    }

    /// Free an agent's cache. The shared cache cannot be removed.
    pub fn remove_agent(&mut self, agent: AgentId) -> bool {
        self.caches.remove(agent.0 as usize).is_some()
    }

    pub fn num_route_caches(&self) -> usize {
        self.caches.len()
    }

    pub fn route_cache_stats(&self, agent: AgentId) -> Option<RouteCacheStats> {
        self.caches.get(agent.0 as usize).map(RouteCache::stats)
    }

    /// Block the union of `requests` for this agent only.
    pub fn set_disabled_zones(&mut self, agent: AgentId, requests: &[&dyn DisableZoneRequest]) -> bool {
        if agent == AgentId::SHARED {
            warn!("[NAV] The shared route cache cannot have disabled zones");
            return false;
        }
        let Some((cache, _)) = self.caches.split(agent.0 as usize) else {
            warn!("[NAV] Unknown agent {:?}", agent);
            return false;
        };
        cache.set_disabled_zones(&self.world, requests)
    }

    /// Whether the precomputed table can answer for this agent.
    fn static_table_for(&self, agent: AgentId) -> Option<&StaticRouteTable> {
        let table = self.static_routes.as_ref()?;
        let cache = self.caches.get(agent.0 as usize)?;
        (!cache.has_disabled_areas()).then_some(table)
    }

    // ------------------------------------------------------------------------
    // Routes
    // ------------------------------------------------------------------------

    pub fn find_route(&mut self, agent: AgentId, from: u32, to: u32, flags: TravelFlags) -> Option<Route> {
        if let Some(route) = self.static_table_for(agent).and_then(|t| t.route_for_flags(from, to, flags)) {
            return route;
        }
        let Some((cache, siblings)) = self.caches.split(agent.0 as usize) else {
            warn!("[NAV] Route query for unknown agent {:?}", agent);
            return None;
        };
        cache.find_route(&self.world, &mut self.mask, &siblings, from, to, flags)
    }

    pub fn preferred_route(&mut self, agent: AgentId, from: u32, to: u32) -> Option<Route> {
        self.find_route(agent, from, to, TravelFlags::PREFERRED)
    }

    pub fn allowed_route(&mut self, agent: AgentId, from: u32, to: u32) -> Option<Route> {
        self.find_route(agent, from, to, TravelFlags::ALLOWED)
    }

    pub fn travel_time_walking_or_falling_short(&mut self, agent: AgentId, from: u32, to: u32) -> Option<u32> {
        if let Some(table) = self.static_table_for(agent) {
            return table.travel_time_walking_or_falling_short(from, to);
        }
        let (cache, siblings) = self.caches.split(agent.0 as usize)?;
        cache.travel_time_walking_or_falling_short(&self.world, &mut self.mask, &siblings, from, to)
    }

    // ------------------------------------------------------------------------
    // Static routes
    // ------------------------------------------------------------------------

    pub fn static_routes(&self) -> Option<&StaticRouteTable> {
        self.static_routes.as_ref()
    }

    /// Install a precomputed table. Tables built for another area count are refused.
    pub fn set_static_routes(&mut self, table: StaticRouteTable) -> bool {
        if table.num_areas() != self.world.num_areas() {
            warn!(
                "[STATIC ROUTES] Refusing table for {} areas, world has {}",
                table.num_areas(),
                self.world.num_areas()
            );
            return false;
        }
        self.static_routes = Some(table);
        true
    }

    pub fn compute_static_routes(&mut self) -> &StaticRouteTable {
        let table = StaticRouteTable::compute(&self.world, &self.config, &mut self.mask);
        self.static_routes.insert(table)
    }

    /// Use the cached table when it matches this world, otherwise compute it
    /// and write it back when cache writing is enabled.
    pub fn load_or_compute_static_routes(&mut self) -> &StaticRouteTable {
        if let Some(table) = StaticRouteTable::load_cached(&self.world, &self.config) {
            return self.static_routes.insert(table);
        }
        let table = StaticRouteTable::compute(&self.world, &self.config, &mut self.mask);
        if self.config.write_cache_files {
            if let Err(e) = table.save_cached(&self.world, &self.config) {
                warn!("[STATIC ROUTES] Could not write static routes for {}: {}", self.world.map_name(), e);
            }
        }
        self.static_routes.insert(table)
    }

    // ------------------------------------------------------------------------
    // World queries
    // ------------------------------------------------------------------------

    pub fn point_to_area(&self, point: Vec3) -> u32 {
        self.world.point_to_area(point)
    }

    pub fn trace_areas(&self, start: Vec3, end: Vec3) -> Vec<u32> {
        self.world.trace_areas(start, end, self.config.max_trace_areas)
    }

    pub fn box_areas(&self, mins: Vec3, maxs: Vec3) -> Vec<u32> {
        self.world.box_areas(mins, maxs, self.config.max_trace_areas)
    }

    pub fn areas_visible(&self, a: u32, b: u32) -> bool {
        self.world.areas_visible(a, b)
    }

    pub fn is_in_area_interior(&self, point: Vec3, area: u32) -> bool {
        self.world.is_in_area_interior(point, area)
    }

    pub fn area_travel_time(&self, area: u32, start: Vec3, end: Vec3) -> u32 {
        self.world.area_travel_time(area, start, end)
    }
}

// ============================================================================
// PLUGIN
// ============================================================================

/// Loads a map's navigation data at startup and inserts [`NavContext`] and
/// [`NavConfig`]. On failure navigation stays disabled and nothing is inserted.
pub struct NavigationPlugin {
    pub map_name: String,
    pub world_path: PathBuf,
    pub config_path: Option<PathBuf>,
}

impl Plugin for NavigationPlugin {
    fn build(&self, app: &mut App) {
        let config = match &self.config_path {
            Some(path) => NavConfig::load_or_default(path),
            None => NavConfig::default(),
        };

        let mut context = match NavContext::load(&self.world_path, &self.map_name, config.clone(), &OpenSpace) {
            Ok(context) => context,
            Err(e) => {
                error!("[NAV] Navigation disabled for {}: {}", self.map_name, e);
                return;
            }
        };
        if let Some(table) = StaticRouteTable::load_cached(context.world(), &config) {
            context.set_static_routes(table);
        }
        info!(
            "[NAV] Navigation ready for {} (static routes: {})",
            self.map_name,
            context.static_routes().is_some()
        );
        app.insert_resource(config);
        app.insert_resource(context);
    }
}
