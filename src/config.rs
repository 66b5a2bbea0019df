use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Navigation settings loaded once per map. None of these change the meaning
/// of a route query; they only bound memory and precomputation work.
#[derive(Resource, Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct NavConfig {
    // Point classification
    pub grid_cell_size: f32,

    // Route caches
    pub route_cache_bytes: usize,
    pub fast_cache_capacity: usize,
    pub fast_cache_bins: usize,

    // Traces
    pub max_trace_areas: usize,
    /// Vertical offsets (above area floor) of the rays cast between two areas
    /// when building the visibility table.
    pub visibility_ray_heights: Vec<f32>,

    // Derived clustering
    pub short_fall_height: f32,
    pub floor_cluster_height_tolerance: f32,
    pub min_floor_cluster_size: usize,
    pub stairs_step_min: f32,
    pub stairs_step_max: f32,
    pub min_stairs_cluster_size: usize,

    // Cache files
    pub cache_dir: PathBuf,
    pub write_cache_files: bool,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            grid_cell_size: 64.0,
            route_cache_bytes: 4 * 1024 * 1024,
            fast_cache_capacity: 1024,
            fast_cache_bins: 4096,
            max_trace_areas: 256,
            visibility_ray_heights: vec![8.0, 32.0, 56.0],
            short_fall_height: 40.0,
            floor_cluster_height_tolerance: 24.0,
            min_floor_cluster_size: 2,
            stairs_step_min: 4.0,
            stairs_step_max: 24.0,
            min_stairs_cluster_size: 3,
            cache_dir: PathBuf::from("cache/aas"),
            write_cache_files: true,
        }
    }
}

impl NavConfig {
    /// Parse a RON config file.
    pub fn from_ron_str(contents: &str) -> crate::Result<Self> {
        ron::from_str::<NavConfig>(contents).map_err(|e| crate::NavError::Config(e.to_string()))
    }

    /// Load the config at `path`, falling back to defaults when the file is
    /// missing or malformed.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_ron_str(&contents) {
                Ok(config) => {
                    info!("[NAV] Loaded navigation config from {}", path.display());
                    config
                }
                Err(e) => {
                    error!("[NAV] Failed to parse navigation config {}: {}", path.display(), e);
                    error!("[NAV] Using default NavConfig");
                    Self::default()
                }
            },
            Err(e) => {
                warn!("[NAV] Navigation config {} not readable ({}), using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Cache files never write when the directory is empty.
    pub(crate) fn cache_path(&self, map_name: &str, extension: &str) -> Option<PathBuf> {
        if self.cache_dir.as_os_str().is_empty() {
            return None;
        }
        Some(self.cache_dir.join(format!("{map_name}.{extension}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_ron_uses_defaults_for_missing_fields() {
        let config = NavConfig::from_ron_str("(grid_cell_size: 32.0, fast_cache_capacity: 16)").unwrap();
        assert_eq!(config.grid_cell_size, 32.0);
        assert_eq!(config.fast_cache_capacity, 16);
        assert_eq!(config.fast_cache_bins, NavConfig::default().fast_cache_bins);
    }

    #[test]
    fn test_malformed_ron_is_an_error() {
        assert!(NavConfig::from_ron_str("(grid_cell_size: \"big\")").is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = NavConfig::load_or_default("/nonexistent/aas_nav.ron");
        assert_eq!(config.max_trace_areas, NavConfig::default().max_trace_areas);
    }

    #[test]
    fn test_empty_cache_dir_disables_cache_paths() {
        let config = NavConfig { cache_dir: PathBuf::new(), ..Default::default() };
        assert!(config.cache_path("q3dm1", "vis").is_none());
    }
}
