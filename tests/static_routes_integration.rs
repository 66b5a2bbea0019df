use std::path::PathBuf;

use aas_nav::routing::AreaListRequest;
use aas_nav::testing::{scratch_dir, WorldBuilder};
use aas_nav::{AgentId, NavConfig, NavContext, StaticRouteTable, TravelFlags, TravelType, World};
use bevy::prelude::*;

const AREA: Vec3 = Vec3::new(64.0, 64.0, 64.0);

fn test_config() -> NavConfig {
    NavConfig { cache_dir: PathBuf::new(), write_cache_files: false, ..Default::default() }
}

/// Two corridors joined at a portal, plus a roof that only a rocket jump
/// reaches and a drop into the far corridor. The roof is a second portal
/// between the same two clusters.
fn arena() -> World {
    let mut builder = WorldBuilder::new();
    let west = builder.add_corridor(Vec3::ZERO, AREA, 8);
    let east = builder.add_corridor(Vec3::new(512.0, 0.0, 0.0), AREA, 8);
    builder.connect(west[7], east[0], TravelType::Walk);
    builder.mark_portal(east[0]);
    let roof = builder.add_area(Vec3::new(0.0, 256.0, 300.0), Vec3::new(64.0, 320.0, 364.0));
    builder.link(west[1], roof, TravelType::RocketJump);
    builder.link(roof, east[6], TravelType::WalkOffLedge);
    builder.mark_portal(roof);
    builder.build_world(&test_config()).expect("arena world")
}

#[test]
fn test_static_table_matches_live_routing() {
    let mut live = NavContext::from_world(arena(), test_config());
    let mut precomputed = NavContext::from_world(arena(), test_config());
    precomputed.compute_static_routes();
    assert!(precomputed.static_routes().is_some());

    let n = live.world().num_areas() as u32;
    for from in 1..n {
        for to in 1..n {
            for flags in [TravelFlags::PREFERRED, TravelFlags::ALLOWED] {
                assert_eq!(
                    precomputed.find_route(AgentId::SHARED, from, to, flags),
                    live.find_route(AgentId::SHARED, from, to, flags),
                    "{from} -> {to} with {flags:?}"
                );
            }
            assert_eq!(
                precomputed.travel_time_walking_or_falling_short(AgentId::SHARED, from, to),
                live.travel_time_walking_or_falling_short(AgentId::SHARED, from, to),
                "walking {from} -> {to}"
            );
        }
    }
}

#[test]
fn test_roof_needs_preferred_profile() {
    let mut nav = NavContext::from_world(arena(), test_config());
    nav.compute_static_routes();
    let roof = nav.world().num_areas() as u32 - 1;
    assert!(nav.preferred_route(AgentId::SHARED, 1, roof).is_some());
    assert_eq!(nav.allowed_route(AgentId::SHARED, 1, roof), None);
    assert_eq!(nav.travel_time_walking_or_falling_short(AgentId::SHARED, 1, roof), None);
}

#[test]
fn test_agent_with_blocked_areas_ignores_static_table() {
    let mut nav = NavContext::from_world(arena(), test_config());
    nav.compute_static_routes();
    let agent = nav.add_agent();
    assert!(nav.allowed_route(agent, 1, 16).is_some(), "no blocked areas uses the table");

    let block = AreaListRequest::new([9]);
    nav.set_disabled_zones(agent, &[&block]);
    assert_eq!(nav.allowed_route(agent, 1, 16), None);
    assert!(nav.allowed_route(AgentId::SHARED, 1, 16).is_some());

    // The preferred profile still has the roof detour around the blocked portal.
    assert!(nav.preferred_route(agent, 1, 15).is_some());
}

#[test]
fn test_other_flags_fall_back_to_live_routing() {
    let mut nav = NavContext::from_world(arena(), test_config());
    nav.compute_static_routes();
    assert!(nav.find_route(AgentId::SHARED, 1, 8, TravelFlags::WALK_OR_FALL).is_some());
    assert_eq!(nav.route_cache_stats(AgentId::SHARED).map(|s| s.area_tables_computed > 0), Some(true));
}

#[test]
fn test_table_for_another_world_is_refused() {
    let mut nav = NavContext::from_world(arena(), test_config());
    let mut small = WorldBuilder::new();
    small.add_corridor(Vec3::ZERO, AREA, 3);
    let small_world = small.build_world(&test_config()).expect("small world");
    let mut mask = aas_nav::ElementsMask::new(small_world.num_areas(), small_world.data().faces.len());
    let foreign = StaticRouteTable::compute(&small_world, &test_config(), &mut mask);

    assert!(!nav.set_static_routes(foreign));
    assert!(nav.static_routes().is_none());
}

#[test]
fn test_load_or_compute_writes_and_reuses_cache() {
    let dir = scratch_dir("static_routes_integration");
    let config = NavConfig { cache_dir: dir.clone(), write_cache_files: true, ..test_config() };

    let mut first = NavContext::from_world(arena(), config.clone());
    let computed = first.load_or_compute_static_routes().clone();
    assert!(dir.join("builder.routes").exists());

    let mut second = NavContext::from_world(arena(), config);
    assert_eq!(second.load_or_compute_static_routes(), &computed);
    assert_eq!(
        second.route_cache_stats(AgentId::SHARED).map(|s| s.area_tables_computed),
        Some(0),
        "loaded table needs no routing"
    );
}
