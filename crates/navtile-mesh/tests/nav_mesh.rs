use navtile_engine::{MESH_NULL_IDX, PolyMesh};
use navtile_geom::Vec3;
use navtile_mesh::{
    MeshError, NavMesh, NavMeshParams, PolyRef, ReferenceBudget, StorageMode, TileRef, extract_mesh_geometry,
    extract_tile_geometry,
};
use navtile_tile::{TileCreateParams, TilePayload, create_tile_data};
use proptest::prelude::*;

const N: u16 = MESH_NULL_IDX;
const TILE: f32 = 4.0;

// One square polygon covering tile (x, y) at height `y_level`, cs 0.5 ch 0.25.
fn square_tile(x: i32, y: i32, y_level: f32) -> TilePayload {
    let bmin = Vec3::new(x as f32 * TILE, 0.0, y as f32 * TILE);
    let bmax = Vec3::new(bmin.x + TILE, 8.0, bmin.z + TILE);
    let h = (y_level / 0.25) as u16;
    let pmesh = PolyMesh {
        verts: vec![[0, h, 0], [0, h, 8], [8, h, 8], [8, h, 0]],
        polys: vec![[0, 1, 2, 3, N, N]],
        neis: vec![[N; 6]],
        regs: vec![1],
        areas: vec![1],
        flags: vec![1],
        nvp: 6,
        bmin,
        bmax,
        cs: 0.5,
        ch: 0.25,
        border_size: 0,
    };
    payload_for(&pmesh, x, y)
}

fn payload_for(pmesh: &PolyMesh, x: i32, y: i32) -> TilePayload {
    create_tile_data(&TileCreateParams {
        pmesh,
        dmesh: None,
        off_mesh: &[],
        tile_x: x,
        tile_y: y,
        layer: 0,
        user_id: 0,
        walkable_height: 2.0,
        walkable_radius: 0.5,
        walkable_climb: 0.5,
        bmin: pmesh.bmin,
        bmax: pmesh.bmax,
    })
    .unwrap()
}

fn params(max_tiles: i32) -> NavMeshParams {
    let budget = ReferenceBudget::for_tile_count(max_tiles as u64);
    NavMeshParams::from_budget([0.0; 3], TILE, TILE, budget)
}

#[test]
fn add_and_look_up_tiles() {
    let mut mesh = NavMesh::new(params(4)).unwrap();
    let a = mesh.add_tile(square_tile(0, 0, 1.0)).unwrap();
    let b = mesh.add_tile(square_tile(1, 0, 1.0)).unwrap();
    assert_ne!(a, b);
    assert!(!a.is_null());
    assert_eq!(mesh.tile_count(), 2);
    assert_eq!(mesh.tile_ref_at(1, 0, 0), Some(b));
    assert_eq!(mesh.tile(a).unwrap().coord(), (0, 0, 0));
    assert!(mesh.tile_at(5, 5, 0).is_none());
    assert_eq!(mesh.storage_mode(), StorageMode::EngineOwned);

    let poly = mesh.poly_ref(b, 0);
    let (tile, p) = mesh.lookup_polygon(poly).unwrap();
    assert_eq!(tile.tile_ref, b);
    assert_eq!(p.vert_count, 4);
    assert!(!mesh.is_valid_poly_ref(mesh.poly_ref(b, 1)));
}

#[test]
fn occupied_coordinate_is_rejected() {
    let mut mesh = NavMesh::new(params(4)).unwrap();
    mesh.add_tile(square_tile(0, 0, 1.0)).unwrap();
    let err = mesh.add_tile(square_tile(0, 0, 1.0)).unwrap_err();
    assert!(matches!(err, MeshError::AlreadyOccupied { x: 0, y: 0, layer: 0 }));
}

#[test]
fn replace_is_idempotent_and_invalidates_old_refs() {
    let mut mesh = NavMesh::new(params(4)).unwrap();
    let first = mesh.add_or_replace_tile(0, 0, 0, square_tile(0, 0, 1.0)).unwrap();
    let stale = mesh.poly_ref(first, 0);
    let second = mesh.add_or_replace_tile(0, 0, 0, square_tile(0, 0, 1.0)).unwrap();
    assert_eq!(mesh.tile_count(), 1);
    assert_ne!(first, second);
    assert!(!mesh.is_valid_poly_ref(stale));
    assert!(mesh.is_valid_poly_ref(mesh.poly_ref(second, 0)));
    assert_eq!(mesh.tile(second).unwrap().bytes(), square_tile(0, 0, 1.0).as_bytes());
}

#[test]
fn replace_checks_coordinate_before_removing() {
    let mut mesh = NavMesh::new(params(4)).unwrap();
    let kept = mesh.add_tile(square_tile(0, 0, 1.0)).unwrap();
    let err = mesh.add_or_replace_tile(0, 0, 0, square_tile(1, 0, 1.0)).unwrap_err();
    assert!(matches!(err, MeshError::CoordinateMismatch { .. }));
    assert_eq!(mesh.tile_ref_at(0, 0, 0), Some(kept));

    let mut bytes = square_tile(0, 0, 1.0).as_bytes().to_vec();
    bytes[0] ^= 0xff;
    let err = mesh.add_or_replace_tile(0, 0, 0, TilePayload::from_bytes(&bytes)).unwrap_err();
    assert!(matches!(err, MeshError::CorruptPayload(_)));
    assert_eq!(mesh.tile_ref_at(0, 0, 0), Some(kept));
}

#[test]
fn capacity_is_enforced() {
    let mut mesh = NavMesh::new(params(2)).unwrap();
    mesh.add_tile(square_tile(0, 0, 1.0)).unwrap();
    mesh.add_tile(square_tile(1, 0, 1.0)).unwrap();
    let err = mesh.add_tile(square_tile(2, 0, 1.0)).unwrap_err();
    assert!(matches!(err, MeshError::CapacityExceeded { max_tiles: 2 }));
}

#[test]
fn polygon_budget_is_enforced() {
    let p = NavMeshParams { max_polys: 1, ..params(1) };
    let mut mesh = NavMesh::new(p).unwrap();
    let two = PolyMesh {
        verts: vec![[0, 4, 0], [0, 4, 8], [8, 4, 8], [8, 4, 0]],
        polys: vec![[0, 1, 2, N, N, N], [0, 2, 3, N, N, N]],
        neis: vec![[N; 6]; 2],
        regs: vec![1, 1],
        areas: vec![1, 1],
        flags: vec![1, 1],
        nvp: 6,
        bmin: Vec3::ZERO,
        bmax: Vec3::new(TILE, 8.0, TILE),
        cs: 0.5,
        ch: 0.25,
        border_size: 0,
    };
    let err = mesh.add_tile(payload_for(&two, 0, 0)).unwrap_err();
    assert!(matches!(err, MeshError::PolygonBudgetExceeded { polys: 2, max: 1 }));
}

#[test]
fn mapped_tiles_need_a_mapping() {
    let mut mesh = NavMesh::with_heap_storage(params(1)).unwrap();
    assert!(matches!(mesh.add_mapped_tile(0..4, None), Err(MeshError::StorageMismatch)));
}

#[test]
fn refs_can_be_restored_in_a_fresh_mesh() {
    let mut mesh = NavMesh::new(params(8)).unwrap();
    let refs: Vec<TileRef> = (0..3).map(|x| mesh.add_tile(square_tile(x, 0, 1.0)).unwrap()).collect();
    mesh.remove_tile(refs[1]).unwrap();
    let again = mesh.add_tile(square_tile(1, 0, 1.0)).unwrap();
    assert_ne!(again, refs[1]);

    let mut restored = NavMesh::with_heap_storage(*mesh.params()).unwrap();
    for tile in mesh.tiles() {
        let r = restored
            .add_tile_with_ref(TilePayload::from_bytes(tile.bytes()), tile.tile_ref)
            .unwrap();
        assert_eq!(r, tile.tile_ref);
    }
    assert_eq!(restored.tile_count(), 3);
    let poly = mesh.poly_ref(again, 0);
    assert!(restored.is_valid_poly_ref(poly));
    // Remaining free slots still hand out fresh refs.
    let extra = restored.add_tile(square_tile(5, 0, 1.0)).unwrap();
    assert!(restored.tiles().all(|t| t.tile_ref == extra || mesh.tile(t.tile_ref).is_some()));
}

#[test]
fn removed_ref_cannot_be_removed_twice() {
    let mut mesh = NavMesh::new(params(2)).unwrap();
    let r = mesh.add_tile(square_tile(0, 0, 1.0)).unwrap();
    assert!(mesh.remove_tile(r).unwrap().is_some());
    assert!(matches!(mesh.remove_tile(r), Err(MeshError::InvalidReference(_))));
    assert!(mesh.tile(r).is_none());
}

#[test]
fn find_poly_at_uses_surface_height() {
    let mut mesh = NavMesh::new(params(4)).unwrap();
    let t = mesh.add_tile(square_tile(1, 1, 2.0)).unwrap();
    assert_eq!(mesh.calc_tile_loc(Vec3::new(5.0, 0.0, 7.9)), (1, 1));
    let hit = mesh.find_poly_at(Vec3::new(6.0, 2.2, 6.0), 0.5);
    assert_eq!(hit, Some(mesh.poly_ref(t, 0)));
    assert_eq!(mesh.find_poly_at(Vec3::new(6.0, 5.0, 6.0), 0.5), None);
    assert_eq!(mesh.find_poly_at(Vec3::new(-1.0, 2.0, 6.0), 0.5), None);
}

#[test]
fn pentagon_extracts_as_fan() {
    let pentagon = PolyMesh {
        verts: vec![[0, 0, 0], [0, 0, 4], [3, 0, 6], [6, 0, 4], [6, 0, 0]],
        polys: vec![[0, 1, 2, 3, 4, N]],
        neis: vec![[N; 6]],
        regs: vec![1],
        areas: vec![1],
        flags: vec![1],
        nvp: 6,
        bmin: Vec3::ZERO,
        bmax: Vec3::new(TILE, 1.0, TILE),
        cs: 0.5,
        ch: 0.25,
        border_size: 0,
    };
    let mut mesh = NavMesh::new(params(4)).unwrap();
    mesh.add_tile(payload_for(&pentagon, 0, 0)).unwrap();
    mesh.add_tile(square_tile(1, 0, 0.0)).unwrap();

    let geom = extract_tile_geometry(&mesh, 0, 0);
    assert_eq!(geom.verts.len(), 5);
    assert_eq!(geom.tris, vec![[0, 1, 2], [0, 2, 3], [0, 3, 4]]);
    assert!(extract_tile_geometry(&mesh, 3, 3).is_empty());

    let all = extract_mesh_geometry(&mesh);
    assert_eq!(all.verts.len(), 9);
    assert_eq!(all.tris.len(), 5);
    assert_eq!(all.tris[3], [5, 6, 7]);
}

#[test]
fn null_ref_is_never_valid() {
    let mesh = NavMesh::new(params(1)).unwrap();
    assert!(!mesh.is_valid_poly_ref(PolyRef(0)));
}

proptest! {
    #[test]
    fn budget_splits_reference_bits(tiles in 1u64..100_000) {
        let b = ReferenceBudget::for_tile_count(tiles);
        prop_assert_eq!(b.tile_bits + b.poly_bits, 22);
        prop_assert!(b.tile_bits <= 14);
        if tiles <= 1 << 14 {
            prop_assert!(u64::from(b.max_tiles()) >= tiles);
            prop_assert!(b.tile_bits == 0 || u64::from(b.max_tiles() / 2) < tiles);
        }
        prop_assert!(b.salt_bits() >= 1);
    }

    #[test]
    fn refs_decode_to_their_parts(tiles in 1u64..20_000, salt in 1u32..1024, t in 0u32..16384, p in 0u32..256) {
        let b = ReferenceBudget::for_tile_count(tiles);
        let t = t % b.max_tiles();
        let p = p % b.max_polys_per_tile();
        let salt = (salt % ((1 << b.salt_bits()) - 1)) + 1;
        let r = b.encode(salt, t, p);
        prop_assert_eq!(b.decode(r.0), (salt, t, p));
        prop_assert!(!r.is_null());
    }
}
