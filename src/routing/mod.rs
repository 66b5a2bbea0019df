//! Live route queries over the cluster/portal hierarchy.
//!
//! Every query goes through a [`RouteCache`]: the fast results cache first,
//! then lazily computed per-goal routing tables. Several caches can coexist
//! (one shared, one per agent with its own blocked areas) and borrow each
//! other's tables when their blocked-areas state is identical.

mod compute;
mod disable;
mod fast_cache;
mod route_cache;
mod tables;


// ============================================================================
// PUBLIC API
// ============================================================================

pub use disable::{AreaListRequest, BoxRequest, DisableZoneRequest};
pub use fast_cache::FastRoutingResultsCache;
pub use route_cache::{RouteCache, RouteCachePool, RouteCacheStats, Siblings};
pub use tables::{RoutingTable, TableCache, TableKey, TableKind};

use serde::{Deserialize, Serialize};

/// First step and total time of the best route between two areas.
///
/// `reach_num` is the global reachability number to take out of the start
/// area; 0 for the trivial route from an area to itself. `travel_time` is in
/// hundredths of a second.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    pub reach_num: u32,
    pub travel_time: u32,
}

impl Route {
    pub const TRIVIAL: Route = Route { reach_num: 0, travel_time: 0 };
}
