use std::path::PathBuf;

use aas_nav::routing::{AreaListRequest, BoxRequest};
use aas_nav::testing::WorldBuilder;
use aas_nav::{AgentId, NavConfig, NavContext, Route, TravelFlags, World};
use bevy::prelude::*;

const AREA: Vec3 = Vec3::new(64.0, 64.0, 64.0);

fn test_config() -> NavConfig {
    NavConfig { cache_dir: PathBuf::new(), write_cache_files: false, ..Default::default() }
}

/// A straight corridor of `count` areas, optionally split into clusters.
fn long_corridor(count: usize, portals: &[u32]) -> World {
    let mut builder = WorldBuilder::new();
    builder.add_corridor(Vec3::ZERO, AREA, count);
    for &portal in portals {
        builder.mark_portal(portal);
    }
    builder.build_world(&test_config()).expect("corridor world")
}

fn center_of(area: u32) -> Vec3 {
    Vec3::new(64.0 * (area - 1) as f32 + 32.0, 32.0, 32.0)
}

#[test]
fn test_blocking_a_corridor_area_cuts_the_route() {
    let mut nav = NavContext::from_world(long_corridor(320, &[]), test_config());
    let agent = nav.add_agent();

    let open = nav.find_route(agent, 5, 300, TravelFlags::ALLOWED).expect("corridor is connected");
    assert!(open.travel_time > 0);

    let block = AreaListRequest::new([17]);
    assert!(nav.set_disabled_zones(agent, &[&block]));
    assert_eq!(nav.find_route(agent, 5, 300, TravelFlags::ALLOWED), None);
    assert!(nav.find_route(agent, 5, 16, TravelFlags::ALLOWED).is_some(), "same side stays reachable");

    assert!(nav.set_disabled_zones(agent, &[]));
    assert_eq!(nav.find_route(agent, 5, 300, TravelFlags::ALLOWED), Some(open));
}

#[test]
fn test_blocking_a_portal_cuts_the_route() {
    let mut nav = NavContext::from_world(long_corridor(320, &[17, 150]), test_config());
    assert_eq!(nav.world().num_clusters(), 4, "dummy cluster plus three real ones");
    let agent = nav.add_agent();

    let open = nav.find_route(agent, 5, 300, TravelFlags::ALLOWED).expect("clusters are connected");
    let block = AreaListRequest::new([17]);
    nav.set_disabled_zones(agent, &[&block]);
    assert_eq!(nav.find_route(agent, 5, 300, TravelFlags::ALLOWED), None);
    assert!(nav.find_route(agent, 20, 300, TravelFlags::ALLOWED).is_some());

    nav.set_disabled_zones(agent, &[]);
    assert_eq!(nav.find_route(agent, 5, 300, TravelFlags::ALLOWED), Some(open));
}

#[test]
fn test_blocked_areas_are_private_to_the_agent() {
    let mut nav = NavContext::from_world(long_corridor(40, &[]), test_config());
    let blocked = nav.add_agent();
    let free = nav.add_agent();

    let block = AreaListRequest::new([17]);
    nav.set_disabled_zones(blocked, &[&block]);

    assert_eq!(nav.find_route(blocked, 5, 30, TravelFlags::ALLOWED), None);
    assert!(nav.find_route(free, 5, 30, TravelFlags::ALLOWED).is_some());
    assert!(nav.find_route(AgentId::SHARED, 5, 30, TravelFlags::ALLOWED).is_some());
}

#[test]
fn test_shared_cache_refuses_disabled_zones() {
    let mut nav = NavContext::from_world(long_corridor(20, &[]), test_config());
    let block = AreaListRequest::new([10]);
    assert!(!nav.set_disabled_zones(AgentId::SHARED, &[&block]));
    assert!(nav.find_route(AgentId::SHARED, 1, 20, TravelFlags::ALLOWED).is_some());
}

#[test]
fn test_box_request_blocks_the_areas_it_touches() {
    let mut nav = NavContext::from_world(long_corridor(40, &[]), test_config());
    let agent = nav.add_agent();
    let center = center_of(17);
    let block = BoxRequest::new(center - Vec3::splat(8.0), center + Vec3::splat(8.0));
    nav.set_disabled_zones(agent, &[&block]);

    assert_eq!(nav.find_route(agent, 5, 30, TravelFlags::ALLOWED), None);
    assert!(nav.find_route(agent, 18, 30, TravelFlags::ALLOWED).is_some());
}

#[test]
fn test_removed_agent_slot_is_reused() {
    let mut nav = NavContext::from_world(long_corridor(10, &[]), test_config());
    let first = nav.add_agent();
    let second = nav.add_agent();
    assert_eq!(nav.num_route_caches(), 3);

    assert!(nav.remove_agent(first));
    assert!(!nav.remove_agent(AgentId::SHARED));
    assert_eq!(nav.find_route(first, 1, 10, TravelFlags::ALLOWED), None, "removed agents get no routes");

    let third = nav.add_agent();
    assert_eq!(third, first);
    assert_ne!(third, second);
    assert!(nav.find_route(third, 1, 10, TravelFlags::ALLOWED).is_some());
}

#[test]
fn test_route_travel_time_grows_with_distance() {
    let mut nav = NavContext::from_world(long_corridor(60, &[20, 40]), test_config());
    let near = nav.allowed_route(AgentId::SHARED, 50, 55).expect("near route");
    let far = nav.allowed_route(AgentId::SHARED, 5, 55).expect("far route");
    assert!(far.travel_time > near.travel_time);
    assert_eq!(nav.allowed_route(AgentId::SHARED, 55, 55), Some(Route::TRIVIAL));
}

#[test]
fn test_point_queries_through_context() {
    let nav = NavContext::from_world(long_corridor(10, &[]), test_config());
    assert_eq!(nav.point_to_area(center_of(4)), 4);
    assert_eq!(nav.point_to_area(Vec3::new(-50.0, 32.0, 32.0)), 0);
    assert_eq!(nav.trace_areas(center_of(2), center_of(5)), vec![2, 3, 4, 5]);
    assert!(nav.areas_visible(2, 9));
    assert!(nav.is_in_area_interior(center_of(3), 3));
}
