use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use navtile_build::{
    BoundsConfig, BuildConfig, BuildError, BuildInput, BuildStage, GROUND_AREA, build_navmesh, plan_build,
    rebuild_tile,
};
use navtile_geom::{AreaDefinition, TriMesh, Vec3};
use navtile_mesh::extract_mesh_geometry;
use navtile_tile::{OffMeshLink, PolyType};

fn hundred_unit_config() -> BuildConfig {
    BuildConfig {
        cell_size: 0.3,
        tile_size: 168,
        bounds: Some(BoundsConfig { min: [0.0, 0.0, 0.0], max: [100.0, 10.0, 100.0] }),
        ..BuildConfig::default()
    }
}

#[test]
fn flat_level_fills_a_two_by_two_grid() {
    let input = BuildInput::new(TriMesh::quad_xz(0.0, 0.0, 100.0, 100.0, 0.0));
    let config = hundred_unit_config();
    let (plan, _) = plan_build(&input, &config).unwrap();
    assert_eq!((plan.tiles_x, plan.tiles_y), (2, 2));

    let (mesh, report) = build_navmesh(&input, &config, None).unwrap();
    assert_eq!(report.total_tiles, 4);
    assert_eq!(report.tiles_built, 4);
    assert_eq!(report.tiles_failed, 0);
    assert_eq!(mesh.tile_count(), 4);
    for ty in 0..2 {
        for tx in 0..2 {
            let tile = mesh.tile_at(tx, ty, 0).unwrap();
            assert!(tile.view.poly_count() > 0, "tile ({tx}, {ty})");
            assert!(tile.view.polys.iter().all(|p| p.area() == GROUND_AREA && p.flags == 1));
        }
    }

    let geom = extract_mesh_geometry(&mesh);
    assert!(!geom.is_empty());
    assert!(geom.verts.iter().all(|v| v[1].abs() < 0.5));
    assert!(geom.tris.iter().flatten().all(|&i| (i as usize) < geom.verts.len()));

    let hit = mesh.find_poly_at(Vec3::new(61.0, 0.1, 41.0), 1.0).unwrap();
    let (tile, _) = mesh.lookup_polygon(hit).unwrap();
    assert_eq!(tile.coord(), (1, 0, 0));
}

#[test]
fn parallel_build_matches_sequential() {
    let input = BuildInput::new(TriMesh::quad_xz(0.0, 0.0, 100.0, 100.0, 0.0));
    let sequential = build_navmesh(&input, &hundred_unit_config(), None).unwrap().0;
    let config = BuildConfig { worker_threads: 3, ..hundred_unit_config() };
    let parallel = build_navmesh(&input, &config, None).unwrap().0;
    let a: Vec<_> = sequential.tiles().map(|t| (t.tile_ref, t.bytes().to_vec())).collect();
    let b: Vec<_> = parallel.tiles().map(|t| (t.tile_ref, t.bytes().to_vec())).collect();
    assert_eq!(a, b);
}

fn area_config(radius_cells: i32) -> BuildConfig {
    BuildConfig {
        cell_size: 0.5,
        cell_height: 0.1,
        tile_size: 0,
        agent_radius: radius_cells as f32 * 0.5,
        edge_max_len: 0.0,
        ..BuildConfig::default()
    }
}

#[test]
fn area_marking_survives_erosion() {
    let input = BuildInput::new(TriMesh::quad_xz(0.0, 0.0, 20.0, 20.0, 0.0))
        .with_area(AreaDefinition::new(TriMesh::quad_xz(0.0, 0.0, 10.0, 20.0, 0.0), 5));
    for radius in 0..=3 {
        let (mesh, report) = build_navmesh(&input, &area_config(radius), None).unwrap();
        assert_eq!(report.tiles_built, 1);
        let tile = mesh.tile_at(0, 0, 0).unwrap();
        let codes: BTreeSet<u8> = tile.view.polys.iter().map(|p| p.area()).collect();
        assert_eq!(codes, BTreeSet::from([GROUND_AREA, 5]), "radius {radius}");
        let marked = tile.view.polys.iter().filter(|p| p.area() == 5).count();
        assert_eq!(marked, 1, "radius {radius}");
    }
}

#[test]
fn steep_geometry_reports_the_failing_stage() {
    // A wall leaning about 84 degrees.
    let wall = TriMesh::new(
        vec![[0.0, 0.0, 0.0], [0.0, 10.0, 1.0], [10.0, 10.0, 1.0], [10.0, 0.0, 0.0]],
        vec![[0, 1, 2], [0, 2, 3]],
    );
    let config = BuildConfig { tile_size: 0, ..BuildConfig::default() };
    let err = build_navmesh(&BuildInput::new(wall), &config, None).unwrap_err();
    assert!(
        matches!(err, BuildError::TileBuildFailure { stage: BuildStage::CompactHeightfield }),
        "{err}"
    );
}

#[test]
fn empty_input_is_a_configuration_error() {
    let err = build_navmesh(&BuildInput::default(), &BuildConfig::default(), None).unwrap_err();
    assert!(matches!(err, BuildError::InvalidConfiguration(_)));
}

#[test]
fn oversized_grids_fail_without_panicking() {
    let input = BuildInput::new(TriMesh::quad_xz(0.0, 0.0, 100.0, 100.0, 0.0));
    let config = BuildConfig {
        bounds: Some(BoundsConfig { min: [0.0, 0.0, 0.0], max: [1e9, 10.0, 1e9] }),
        ..BuildConfig::default()
    };
    let err = build_navmesh(&input, &config, None).unwrap_err();
    assert!(matches!(err, BuildError::InvalidConfiguration(_)), "{err}");

    // One enormous tile plans fine but cannot get a heightfield.
    let config = BuildConfig { tile_size: i32::MAX, ..hundred_unit_config() };
    let err = build_navmesh(&input, &config, None).unwrap_err();
    assert!(matches!(err, BuildError::TileBuildFailure { stage: BuildStage::Heightfield }), "{err}");
}

#[test]
fn cancelled_build_returns_partial_mesh() {
    let input = BuildInput::new(TriMesh::quad_xz(0.0, 0.0, 100.0, 100.0, 0.0));
    let cancel = Arc::new(AtomicBool::new(true));
    let (mesh, report) = build_navmesh(&input, &hundred_unit_config(), Some(cancel)).unwrap();
    assert!(report.cancelled);
    assert_eq!(report.tiles_built, 0);
    assert_eq!(mesh.tile_count(), 0);
}

#[test]
fn rebuild_replaces_one_tile() {
    let input = BuildInput::new(TriMesh::quad_xz(0.0, 0.0, 100.0, 100.0, 0.0));
    let config = hundred_unit_config();
    let (mut mesh, _) = build_navmesh(&input, &config, None).unwrap();
    let old = mesh.tile_ref_at(1, 1, 0).unwrap();
    let stale = mesh.poly_ref(old, 0);
    let untouched = mesh.tile_ref_at(0, 0, 0).unwrap();

    let new = rebuild_tile(&mut mesh, &input, &config, 1, 1).unwrap().unwrap();
    assert_ne!(new, old);
    assert_eq!(mesh.tile_count(), 4);
    assert!(!mesh.is_valid_poly_ref(stale));
    assert!(mesh.is_valid_poly_ref(mesh.poly_ref(new, 0)));
    assert_eq!(mesh.tile_ref_at(0, 0, 0), Some(untouched));

    assert!(rebuild_tile(&mut mesh, &input, &config, 2, 0).is_err());
}

#[test]
fn off_mesh_links_land_in_the_start_tile() {
    let mut input = BuildInput::new(TriMesh::quad_xz(0.0, 0.0, 100.0, 100.0, 0.0));
    input.off_mesh.push(OffMeshLink::new([70.0, 0.0, 20.0], [20.0, 0.0, 70.0], 0.6));
    let (mesh, _) = build_navmesh(&input, &hundred_unit_config(), None).unwrap();
    let with_link: Vec<_> = mesh.tiles().filter(|t| !t.view.off_mesh_cons.is_empty()).collect();
    assert_eq!(with_link.len(), 1);
    let tile = with_link[0];
    assert_eq!(tile.coord(), (1, 0, 0));
    let poly = &tile.view.polys[tile.view.off_mesh_cons[0].poly as usize];
    assert_eq!(poly.poly_type(), PolyType::OffMeshConnection);

    // Links carry no surface.
    let geom = navtile_mesh::extract_tile_geometry(&mesh, 1, 0);
    let ground = tile.view.ground_polys().iter().map(|p| usize::from(p.vert_count) - 2).sum::<usize>();
    assert_eq!(geom.tris.len(), ground);
}
