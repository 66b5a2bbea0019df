use std::path::PathBuf;

use bevy::prelude::*;

use super::*;
use crate::routing::RouteCache;
use crate::testing::scratch_dir;
use crate::world::World;
use crate::world::{TravelType, WorldBuilder};

fn test_config() -> NavConfig {
    NavConfig { cache_dir: PathBuf::new(), write_cache_files: false, ..Default::default() }
}

const BOX: Vec3 = Vec3::new(64.0, 64.0, 64.0);

/// Two clusters joined by a portal, a one-way ledge, a rocket jump only the
/// preferred profile may use, and an unreachable island.
fn mixed_world() -> World {
    let mut builder = WorldBuilder::new();
    let west = builder.add_corridor(Vec3::ZERO, BOX, 6);
    let east = builder.add_corridor(Vec3::new(384.0, 0.0, 0.0), BOX, 6);
    builder.connect(west[5], east[0], TravelType::Walk);
    builder.mark_portal(east[0]);

    let ledge = builder.add_area(Vec3::new(0.0, 64.0, 30.0), Vec3::new(64.0, 128.0, 94.0));
    builder.link(ledge, west[0], TravelType::WalkOffLedge);
    let roof = builder.add_area(Vec3::new(64.0, 64.0, 300.0), Vec3::new(128.0, 128.0, 364.0));
    builder.link(west[1], roof, TravelType::RocketJump).link(roof, west[1], TravelType::WalkOffLedge);
    builder.add_area(Vec3::new(0.0, 1000.0, 0.0), Vec3::new(64.0, 1064.0, 64.0));

    builder.build_world(&test_config()).expect("mixed world")
}

fn compute(world: &World) -> StaticRouteTable {
    let mut mask = ElementsMask::new(world.num_areas(), world.data().faces.len());
    StaticRouteTable::compute(world, &test_config(), &mut mask)
}

#[test]
fn test_table_matches_live_cache_for_every_pair() {
    let world = mixed_world();
    let table = compute(&world);
    let mut mask = ElementsMask::new(world.num_areas(), world.data().faces.len());
    let mut live = RouteCache::new(&world, &test_config());
    let siblings = Siblings::none();

    for from in 1..world.num_areas() as u32 {
        for to in 1..world.num_areas() as u32 {
            assert_eq!(
                table.preferred_route_from_to(from, to),
                live.find_route(&world, &mut mask, &siblings, from, to, TravelFlags::PREFERRED),
                "preferred {from} -> {to}"
            );
            assert_eq!(
                table.allowed_route_from_to(from, to),
                live.find_route(&world, &mut mask, &siblings, from, to, TravelFlags::ALLOWED),
                "allowed {from} -> {to}"
            );
            assert_eq!(
                table.travel_time_walking_or_falling_short(from, to),
                live.travel_time_walking_or_falling_short(&world, &mut mask, &siblings, from, to),
                "walking {from} -> {to}"
            );
        }
    }
}

#[test]
fn test_profiles_differ_where_expected() {
    let world = mixed_world();
    let table = compute(&world);
    let (west_1, roof, island) = (2, 14, 15);
    assert!(table.preferred_route_from_to(west_1, roof).is_some());
    assert_eq!(table.allowed_route_from_to(west_1, roof), None);
    assert_eq!(table.preferred_route_from_to(1, island), None);
    assert_eq!(table.route_for_flags(1, 2, TravelFlags::WALK), None, "only two profiles are stored");
    assert_eq!(table.route_for_flags(1, 1, TravelFlags::ALLOWED), Some(Some(Route::TRIVIAL)));
}

#[test]
fn test_spans_are_padded_and_bounded() {
    let world = mixed_world();
    let table = compute(&world);
    for spans in [&table.preferred, &table.allowed, &table.walking] {
        assert!(spans.is_consistent(world.num_areas()));
        for (source, span) in spans.spans.iter().enumerate() {
            let goals = &spans.goals[span.range()];
            let real: Vec<u16> = goals.iter().copied().filter(|&g| g != 0).collect();
            assert!(real.windows(2).all(|w| w[0] < w[1]), "goals of {source} sorted");
            if let (Some(&first), Some(&last)) = (real.first(), real.last()) {
                assert_eq!((span.min_area, span.max_area), (first, last));
            } else {
                assert_eq!(*span, Span::EMPTY);
            }
        }
    }
    // The island reaches nothing and nothing reaches it.
    assert_eq!(table.allowed.spans[15], Span::EMPTY);
}

#[test]
fn test_round_trip_through_file() {
    let world = mixed_world();
    let table = compute(&world);
    let path = scratch_dir("static_routes_round_trip").join("mixed.routes");

    table.write(&path, &world).expect("write table");
    let loaded = StaticRouteTable::read(&path, &world).expect("read table back");
    assert_eq!(loaded, table);
    assert_eq!(loaded.allowed_route_from_to(1, 12), table.allowed_route_from_to(1, 12));
}

#[test]
fn test_table_for_other_world_is_discarded() {
    let world = mixed_world();
    let table = compute(&world);
    let path = scratch_dir("static_routes_other_world").join("mixed.routes");
    table.write(&path, &world).unwrap();

    let mut builder = WorldBuilder::new();
    builder.add_corridor(Vec3::ZERO, BOX, 3);
    let other = builder.build_world(&test_config()).unwrap();
    assert!(StaticRouteTable::read(&path, &other).is_none());
}

#[test]
fn test_cache_dir_round_trip() {
    let world = mixed_world();
    let table = compute(&world);
    let config = NavConfig { cache_dir: scratch_dir("static_routes_cache_dir"), ..test_config() };
    assert!(StaticRouteTable::load_cached(&world, &config).is_none());
    table.save_cached(&world, &config).unwrap();
    assert_eq!(StaticRouteTable::load_cached(&world, &config), Some(table));

    // Without a cache directory nothing is written or read.
    compute(&world).save_cached(&world, &test_config()).unwrap();
    assert!(StaticRouteTable::load_cached(&world, &test_config()).is_none());
}
