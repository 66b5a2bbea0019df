use std::path::{Path, PathBuf};

use aas_nav::testing::{scratch_dir, WorldBuilder};
use aas_nav::{AgentId, NavConfig, NavContext, NavError, NavigationPlugin, OpenSpace, TravelFlags};
use bevy::prelude::*;

const MAP: &str = "corridor";

fn test_config(dir: &Path) -> NavConfig {
    NavConfig { cache_dir: dir.to_path_buf(), write_cache_files: true, ..Default::default() }
}

/// Saves a ten-area corridor split by a portal and returns its path.
fn write_world(dir: &Path) -> PathBuf {
    let mut builder = WorldBuilder::new();
    builder.add_corridor(Vec3::ZERO, Vec3::splat(64.0), 10);
    builder.mark_portal(5);
    let world = builder
        .build_world(&NavConfig { cache_dir: PathBuf::new(), write_cache_files: false, ..Default::default() })
        .expect("corridor world");
    let path = dir.join(format!("{MAP}.aas"));
    world.save(&path).expect("save world");
    path
}

fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("nav.ron");
    let contents = format!("(cache_dir: {:?}, write_cache_files: true, grid_cell_size: 32.0)", dir.to_string_lossy());
    std::fs::write(&path, contents).expect("write config");
    path
}

#[test]
fn test_loaded_world_routes_like_built_world() {
    let dir = scratch_dir("plugin_world_file");
    let path = write_world(&dir);

    let mut nav = NavContext::load(&path, MAP, test_config(&dir), &OpenSpace).expect("load world");
    assert_eq!(nav.world().map_name(), MAP);
    assert_eq!(nav.world().num_areas(), 11);
    assert!(nav.allowed_route(AgentId::SHARED, 1, 10).is_some());
    assert!(dir.join(format!("{MAP}.areavis")).exists(), "visibility cached on load");
}

#[test]
fn test_missing_world_file_is_an_io_error() {
    let dir = scratch_dir("plugin_missing_world");
    let result = NavContext::load(dir.join("nowhere.aas"), MAP, test_config(&dir), &OpenSpace);
    assert!(matches!(result, Err(NavError::Io(_))));
}

#[test]
fn test_plugin_inserts_context_and_config() {
    let dir = scratch_dir("plugin_inserts");
    let world_path = write_world(&dir);
    let config_path = write_config(&dir);

    let mut app = App::new();
    app.add_plugins(NavigationPlugin { map_name: MAP.to_string(), world_path, config_path: Some(config_path) });

    let config = app.world().get_resource::<NavConfig>().expect("config inserted");
    assert_eq!(config.grid_cell_size, 32.0);
    assert_eq!(config.cache_dir, dir);

    let mut nav = app.world_mut().resource_mut::<NavContext>();
    assert!(nav.static_routes().is_none(), "nothing precomputed yet");
    assert!(nav.find_route(AgentId::SHARED, 2, 9, TravelFlags::PREFERRED).is_some());
}

#[test]
fn test_plugin_picks_up_precomputed_routes() {
    let dir = scratch_dir("plugin_precomputed");
    let world_path = write_world(&dir);
    let config_path = write_config(&dir);

    let mut precompute = NavContext::load(&world_path, MAP, NavConfig::load_or_default(&config_path), &OpenSpace)
        .expect("load world");
    let table = precompute.compute_static_routes().clone();
    table.save_cached(precompute.world(), precompute.config()).expect("save routes");

    let mut app = App::new();
    app.add_plugins(NavigationPlugin { map_name: MAP.to_string(), world_path, config_path: Some(config_path) });
    let nav = app.world().get_resource::<NavContext>().expect("context inserted");
    assert_eq!(nav.static_routes(), Some(&table));
}

#[test]
fn test_plugin_without_world_disables_navigation() {
    let dir = scratch_dir("plugin_no_world");
    let mut app = App::new();
    app.add_plugins(NavigationPlugin {
        map_name: MAP.to_string(),
        world_path: dir.join("missing.aas"),
        config_path: None,
    });
    assert!(app.world().get_resource::<NavContext>().is_none());
    assert!(app.world().get_resource::<NavConfig>().is_none());
}
