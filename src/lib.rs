//! Area-based bot navigation: world loading, area classification, cached
//! route queries and precomputed route tables.

pub mod cache_file;
pub mod collision;
pub mod config;
pub mod context;
pub mod elements_mask;
pub mod error;
pub mod profiling;
pub mod routing;
pub mod static_routes;
pub mod world;

pub use collision::{CollisionWorld, OpenSpace, SolidBoxes};
pub use config::NavConfig;
pub use context::{AgentId, NavContext, NavigationPlugin};
pub use elements_mask::ElementsMask;
pub use error::{NavError, Result};
pub use routing::{DisableZoneRequest, Route, RouteCache};
pub use static_routes::StaticRouteTable;
pub use world::{TravelFlags, TravelType, World};

/// Helpers for building synthetic worlds in tests and tools.
pub mod testing {
    use std::path::PathBuf;

    pub use crate::world::WorldBuilder;

    /// Fresh, empty directory under the system temp dir, unique per process.
    pub fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("aas_nav_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let _ = std::fs::create_dir_all(&dir);
        dir
    }
}

// ============================================================================
// Profiling Macros
// ============================================================================

/// Log a message every 1000th call of a counter when the `perf_stats`
/// feature is enabled. Without the feature the arguments are not evaluated.
///
/// # Example
/// ```ignore
/// profile_log!(self.queries, "[PERF] {:?}", self.stats());
/// ```
#[macro_export]
#[cfg(feature = "perf_stats")]
macro_rules! profile_log {
    ($counter:expr, $($arg:tt)*) => {
        if $counter % 1000 == 0 {
            bevy::prelude::info!($($arg)*);
        }
    };
}

#[macro_export]
#[cfg(not(feature = "perf_stats"))]
macro_rules! profile_log {
    ($counter:expr, $($arg:tt)*) => {};
}
