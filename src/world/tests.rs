use std::path::PathBuf;

use bevy::prelude::*;

use super::*;
use crate::collision::SolidBoxes;
use crate::testing::scratch_dir;
use crate::world::World;

fn test_config() -> NavConfig {
    NavConfig { cache_dir: PathBuf::new(), write_cache_files: false, ..Default::default() }
}

const BOX: Vec3 = Vec3::new(64.0, 64.0, 64.0);

fn corridor(count: usize) -> World {
    let mut builder = WorldBuilder::new();
    builder.add_corridor(Vec3::ZERO, BOX, count);
    builder.build_world(&test_config()).expect("corridor world")
}

/// Two floors of 4x4 rooms of uneven sizes with a few holes, walk-linked to
/// their horizontal neighbours.
fn two_floors() -> World {
    let mut builder = WorldBuilder::new();
    let widths = [48.0, 80.0, 64.0, 100.0];
    for floor in 0..2 {
        let z = floor as f32 * 128.0;
        let mut grid = [[0u32; 4]; 4];
        let mut x = 0.0;
        for (i, w) in widths.iter().enumerate() {
            let mut y = 0.0;
            for (j, h) in widths.iter().rev().enumerate() {
                if (i + j + floor) % 5 != 4 {
                    grid[i][j] = builder.add_area(Vec3::new(x, y, z), Vec3::new(x + w, y + h, z + 96.0));
                }
                y += h;
            }
            x += w;
        }
        for i in 0..4 {
            for j in 0..4 {
                if grid[i][j] == 0 {
                    continue;
                }
                if i + 1 < 4 && grid[i + 1][j] != 0 {
                    builder.connect(grid[i][j], grid[i + 1][j], TravelType::Walk);
                }
                if j + 1 < 4 && grid[i][j + 1] != 0 {
                    builder.connect(grid[i][j], grid[i][j + 1], TravelType::Walk);
                }
            }
        }
    }
    builder.build_world(&test_config()).expect("two floor world")
}

#[test]
fn test_grid_and_bsp_agree_on_random_points() {
    let config = NavConfig { grid_cell_size: 32.0, ..test_config() };
    let mut builder = WorldBuilder::new();
    builder.add_corridor(Vec3::ZERO, BOX, 5);
    builder.add_corridor(Vec3::new(0.0, 64.0, 0.0), Vec3::new(40.0, 50.0, 64.0), 7);
    let world = builder.build_world(&config).unwrap();
    assert!(world.grid.num_cells() > 0);

    let mut rng = fastrand::Rng::with_seed(42);
    let mut hits = 0;
    for _ in 0..5000 {
        let p = Vec3::new(rng.f32() * 340.0 - 10.0, rng.f32() * 130.0 - 10.0, rng.f32() * 80.0 - 8.0);
        let area = world.point_to_area(p);
        assert_eq!(area, world.point_to_area_bsp(p), "grid and BSP disagree at {p}");
        if area != 0 {
            hits += 1;
            assert!(world.area(area).bounds.contains(p), "{p} is not inside area {area}");
        }
    }
    assert!(hits > 1000, "most samples land inside areas");
}

#[test]
fn test_grid_and_bsp_agree_on_uneven_rooms() {
    let world = two_floors();
    let mut rng = fastrand::Rng::with_seed(3);
    for _ in 0..5000 {
        let p = Vec3::new(rng.f32() * 300.0, rng.f32() * 300.0, rng.f32() * 230.0);
        assert_eq!(world.point_to_area(p), world.point_to_area_bsp(p), "at {p}");
    }
}

#[test]
fn test_points_outside_are_solid() {
    let world = corridor(3);
    assert_eq!(world.point_to_area(Vec3::new(-50.0, 32.0, 32.0)), 0);
    assert_eq!(world.point_to_area(Vec3::new(32.0, 500.0, 32.0)), 0);
    assert_eq!(world.point_to_area(Vec3::new(100.0, 32.0, 32.0)), 2);
}

#[test]
fn test_trace_areas_in_order() {
    let world = corridor(6);
    let start = Vec3::new(10.0, 32.0, 20.0);
    let end = Vec3::new(370.0, 32.0, 20.0);
    assert_eq!(world.trace_areas(start, end, 64), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(world.trace_areas(end, start, 64), vec![6, 5, 4, 3, 2, 1]);
    assert_eq!(world.trace_areas(start, end, 3), vec![1, 2, 3]);
    assert_eq!(world.trace_areas(start, start, 8), vec![1]);
}

#[test]
fn test_trace_areas_skips_solid_gaps() {
    let mut builder = WorldBuilder::new();
    builder.add_area(Vec3::ZERO, BOX);
    builder.add_area(Vec3::new(128.0, 0.0, 0.0), Vec3::new(192.0, 64.0, 64.0));
    let world = builder.build_world(&test_config()).unwrap();
    let areas = world.trace_areas(Vec3::new(10.0, 32.0, 32.0), Vec3::new(180.0, 32.0, 32.0), 8);
    assert_eq!(areas, vec![1, 2]);
}

#[test]
fn test_box_areas_finds_touched_leaves() {
    let world = corridor(6);
    let mut areas = world.box_areas(Vec3::new(100.0, 10.0, 10.0), Vec3::new(200.0, 20.0, 20.0), 16);
    areas.sort_unstable();
    assert_eq!(areas, vec![2, 3, 4]);
    assert_eq!(world.box_areas(Vec3::splat(-500.0), Vec3::splat(-400.0), 16), Vec::<u32>::new());
    assert_eq!(world.bbox_areas(&BBox::new(Vec3::ZERO, Vec3::splat(500.0)), 2).len(), 2);
}

#[test]
fn test_save_and_load_round_trip() {
    let world = two_floors();
    let path = scratch_dir("world_round_trip").join("floors.aas");
    let written = world.save(&path).expect("save world");

    let mut mask = ElementsMask::default();
    let loaded = World::load(&path, "floors", &test_config(), &crate::collision::OpenSpace, &mut mask).expect("reload");
    assert_eq!(loaded.checksum(), written);
    assert_eq!(loaded.map_name(), "floors");
    assert_eq!(loaded.num_areas(), world.num_areas());
    assert_eq!(loaded.data().reachabilities.len(), world.data().reachabilities.len());
    for area in 1..world.num_areas() as u32 {
        assert_eq!(loaded.area(area).bounds, world.area(area).bounds);
        assert_eq!(loaded.area_flags(area), world.area_flags(area), "derived flags of {area}");
        assert_eq!(loaded.floor_cluster(area), world.floor_cluster(area));
    }
    assert!(mask.num_areas() >= loaded.num_areas());
}

#[test]
fn test_missing_world_file_is_an_error() {
    let mut mask = ElementsMask::default();
    let result = World::load("/nonexistent/map.aas", "none", &test_config(), &crate::collision::OpenSpace, &mut mask);
    assert!(matches!(result, Err(crate::NavError::Io(_))));
}

#[test]
fn test_portal_areas_belong_to_both_clusters() {
    let mut builder = WorldBuilder::new();
    builder.add_corridor(Vec3::ZERO, BOX, 5);
    builder.mark_portal(3);
    let world = builder.build_world(&test_config()).unwrap();

    assert!(world.settings(3).is_portal());
    let portal = world.portal(world.settings(3).cluster.unsigned_abs());
    assert_eq!(world.area_cluster(3), portal.front_cluster);
    assert!(world.cluster_area_index(portal.front_cluster, 3).is_some());
    assert!(world.cluster_area_index(portal.back_cluster, 3).is_some());
    assert_eq!(world.cluster_area_index(world.area_cluster(5), 1), None);
    assert_eq!(world.cluster_portals(world.area_cluster(1)).len(), 1);
    assert!(world.portal_max_travel_time(1) > 0);
}

#[test]
fn test_reversed_links_mirror_reachabilities() {
    let world = two_floors();
    for area in 1..world.num_areas() as u32 {
        for (reach_num, reach) in world.area_reachabilities(area) {
            let entering = world.reversed_reachabilities(reach.area);
            assert!(entering.iter().any(|l| l.from_area == area && l.reach_num == reach_num));
        }
    }
}

#[test]
fn test_area_travel_time_factors() {
    let mut builder = WorldBuilder::new();
    let walk = builder.add_area(Vec3::ZERO, BOX);
    let crouch = builder.add_area(Vec3::new(64.0, 0.0, 0.0), Vec3::new(128.0, 64.0, 32.0));
    let water = builder.add_area(Vec3::new(128.0, 0.0, 0.0), Vec3::new(192.0, 64.0, 64.0));
    builder.set_presence(crouch, PRESENCE_CROUCH).set_contents(water, AreaContents::WATER);
    builder.connect(walk, crouch, TravelType::Crouch).connect(crouch, water, TravelType::Swim);
    let world = builder.build_world(&test_config()).unwrap();

    let (a, b) = (Vec3::ZERO, Vec3::new(100.0, 0.0, 0.0));
    assert!((32..=33).contains(&world.area_travel_time(walk, a, b)));
    assert!((129..=130).contains(&world.area_travel_time(crouch, a, b)));
    assert_eq!(world.area_travel_time(water, a, b), 100);
    assert_eq!(world.area_travel_time(walk, a, a), 1, "never zero");
    assert!(world.area_content_travel_flags(water).contains(TravelFlags::WATER));
    assert!(world.area_is_liquid(water));
    assert!(world.area_is_crouch_only(crouch));
}

#[test]
fn test_derived_flags() {
    let mut builder = WorldBuilder::new();
    let flat = builder.add_corridor(Vec3::ZERO, BOX, 3);
    let ledge = builder.add_area(Vec3::new(0.0, 64.0, 200.0), Vec3::new(64.0, 128.0, 264.0));
    builder.link(ledge, flat[0], TravelType::WalkOffLedge);
    let island = builder.add_area(Vec3::new(0.0, 900.0, 0.0), Vec3::new(64.0, 964.0, 64.0));
    let world = builder.build_world(&test_config()).unwrap();

    assert!(world.area_flags(flat[1]).contains(AreaFlags::NOFALL));
    assert!(world.area_flags(flat[1]).contains(AreaFlags::WALL), "side faces are solid");
    assert!(world.area_flags(flat[1]).contains(AreaFlags::SKIP_COLLISION_16));
    assert!(world.area_flags(ledge).contains(AreaFlags::LEDGE));
    assert!(!world.area_flags(ledge).contains(AreaFlags::NOFALL));
    assert!(world.area_flags(island).contains(AreaFlags::JUNK));
    assert!(world.area_flags(flat[0]).contains(AreaFlags::GROUNDED), "file flags survive");
}

#[test]
fn test_inner_bounds_of_boxes() {
    let world = corridor(2);
    assert_eq!(*world.area_inner_bounds(1), world.area(1).bounds);
    assert!(world.is_in_area_interior(Vec3::new(32.0, 32.0, 32.0), 1));
    assert!(!world.is_in_area_interior(Vec3::new(96.0, 32.0, 32.0), 1));
    assert!(!world.is_in_area_interior(Vec3::new(32.0, 32.0, 32.0), 0));
}

#[test]
fn test_flat_corridor_is_one_floor_cluster() {
    let world = corridor(5);
    let cluster = world.floor_cluster(1);
    assert_ne!(cluster, 0);
    assert_eq!(world.floor_cluster_areas(cluster), &[1, 2, 3, 4, 5]);
    assert_eq!(world.floor_clusters().num_clusters(), 1);
    assert_eq!(world.stairs_clusters().num_clusters(), 0, "no height steps");
}

#[test]
fn test_separate_floors_are_separate_clusters() {
    let world = two_floors();
    let ground = world.floor_cluster(1);
    let upper = world.floor_cluster(world.point_to_area(Vec3::new(20.0, 50.0, 150.0)));
    assert_ne!(ground, 0);
    assert_ne!(upper, 0);
    assert_ne!(ground, upper);
}

#[test]
fn test_stairs_cluster_is_monotonic() {
    let mut builder = WorldBuilder::new();
    let mut steps = Vec::new();
    for i in 0..4 {
        let z = i as f32 * 16.0;
        steps.push(builder.add_area(Vec3::new(i as f32 * 32.0, 0.0, z), Vec3::new((i + 1) as f32 * 32.0, 64.0, z + 64.0)));
    }
    for pair in steps.windows(2) {
        builder.connect(pair[0], pair[1], TravelType::Walk);
    }
    let world = builder.build_world(&test_config()).unwrap();

    let cluster = world.stairs_cluster(steps[0]);
    assert_ne!(cluster, 0);
    assert_eq!(world.stairs_cluster_areas(cluster), steps.iter().map(|&a| a as u16).collect::<Vec<_>>().as_slice());
}

#[test]
fn test_small_floor_clusters_are_rejected() {
    let config = NavConfig { min_floor_cluster_size: 3, ..test_config() };
    let mut builder = WorldBuilder::new();
    builder.add_corridor(Vec3::ZERO, BOX, 2);
    builder.add_corridor(Vec3::new(0.0, 500.0, 0.0), BOX, 3);
    let world = builder.build_world(&config).unwrap();
    assert_eq!(world.floor_cluster(1), 0);
    assert_ne!(world.floor_cluster(3), 0);
}

#[test]
fn test_open_space_sees_everything() {
    let world = corridor(4);
    for a in 1..5 {
        for b in 1..5 {
            assert!(world.areas_visible(a, b), "{a} sees {b}");
        }
    }
    assert_eq!(world.visible_areas(1), &[2, 3, 4]);
    let cluster = world.floor_cluster(1);
    assert!(world.floor_clusters_visible(cluster, cluster));
    assert!(!world.floor_clusters_visible(0, cluster));
}

#[test]
fn test_occluders_block_visibility() {
    let mut builder = WorldBuilder::new();
    builder.add_corridor(Vec3::ZERO, BOX, 3);
    let wall = BBox::new(Vec3::new(100.0, -10.0, -10.0), Vec3::new(104.0, 80.0, 200.0));
    let world = builder.build_world_with(&test_config(), &SolidBoxes::new(vec![wall])).unwrap();

    assert!(world.areas_visible(1, 2));
    assert!(!world.areas_visible(2, 3));
    assert!(!world.areas_visible(1, 3));
    assert!(world.areas_visible(3, 3));
}

#[test]
fn test_visibility_cache_is_written_and_reused() {
    let config = NavConfig { cache_dir: scratch_dir("world_vis_cache"), write_cache_files: true, ..test_config() };
    let mut builder = WorldBuilder::new();
    builder.add_corridor(Vec3::ZERO, BOX, 3);
    let wall = BBox::new(Vec3::new(100.0, -10.0, -10.0), Vec3::new(104.0, 80.0, 200.0));
    let first = builder.build_world_with(&config, &SolidBoxes::new(vec![wall])).unwrap();
    assert!(config.cache_dir.join("builder.areavis").exists());
    assert!(config.cache_dir.join("builder.floorvis").exists());

    // Same world bytes, no occluder: the cached table still applies.
    let second = builder.build_world(&config).unwrap();
    assert_eq!(second.checksum(), first.checksum());
    assert!(!second.areas_visible(1, 3), "visibility must come from the cache");
}
