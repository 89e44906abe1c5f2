use navtile_engine::{DetailMesh, MESH_NULL_IDX, PolyMesh};
use navtile_geom::Vec3;

use crate::layout::{OffMeshConnection, Poly, PolyDetail, PolyType, TileHeader};
use crate::view::align4;
use crate::{MAX_VERTS_PER_POLY, OFF_MESH_BIDIRECTIONAL, TILE_MAGIC, TILE_VERSION, TileDataError, TilePayload};

/// World-space jump link between two points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OffMeshLink {
    pub start: [f32; 3],
    pub end: [f32; 3],
    pub radius: f32,
    pub bidirectional: bool,
    pub area: u8,
    pub flags: u16,
    pub user_id: u32,
}

impl OffMeshLink {
    pub fn new(start: [f32; 3], end: [f32; 3], radius: f32) -> Self {
        Self {
            start,
            end,
            radius,
            bidirectional: true,
            area: 1,
            flags: 1,
            user_id: 0,
        }
    }
}

/// Input of [`create_tile_data`]. Agent dimensions are in world units; the
/// bounds are the tile's bounds without the border margin.
#[derive(Clone, Copy, Debug)]
pub struct TileCreateParams<'a> {
    pub pmesh: &'a PolyMesh,
    pub dmesh: Option<&'a DetailMesh>,
    pub off_mesh: &'a [OffMeshLink],
    pub tile_x: i32,
    pub tile_y: i32,
    pub layer: i32,
    pub user_id: u32,
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
    pub bmin: Vec3,
    pub bmax: Vec3,
}

fn starts_in_tile(link: &OffMeshLink, bmin: Vec3, bmax: Vec3) -> bool {
    let [x, _, z] = link.start;
    x >= bmin.x && x < bmax.x && z >= bmin.z && z < bmax.z
}

/// Serializes a polygon mesh (plus optional detail mesh and off-mesh links) into
/// a runtime tile payload.
pub fn create_tile_data(params: &TileCreateParams<'_>) -> Result<TilePayload, TileDataError> {
    let pmesh = params.pmesh;
    if pmesh.nvp > MAX_VERTS_PER_POLY {
        return Err(TileDataError::TooManyVerts { count: pmesh.nvp });
    }
    if pmesh.poly_count() == 0 {
        return Err(TileDataError::InvalidParams("polygon mesh is empty"));
    }
    if let Some(d) = params.dmesh {
        if d.meshes.len() != pmesh.poly_count() {
            return Err(TileDataError::InvalidParams("detail mesh does not match polygon mesh"));
        }
    }

    let links: Vec<&OffMeshLink> = params
        .off_mesh
        .iter()
        .filter(|l| starts_in_tile(l, params.bmin, params.bmax))
        .collect();
    let ground = pmesh.poly_count();
    let poly_count = ground + links.len();
    let vert_count = pmesh.verts.len() + links.len() * 2;
    if poly_count > usize::from(u16::MAX) || vert_count > usize::from(u16::MAX) {
        return Err(TileDataError::InvalidParams("too many polygons or vertices for one tile"));
    }

    let mut verts: Vec<[f32; 3]> = (0..pmesh.verts.len()).map(|v| pmesh.vert_world(v as u16)).collect();
    let mut polys = Vec::with_capacity(poly_count);
    for p in 0..ground {
        let mut poly = Poly::default();
        let mut n = 0;
        for (k, &v) in pmesh.polys[p].iter().enumerate() {
            if v == MESH_NULL_IDX {
                break;
            }
            poly.verts[k] = v;
            poly.neis[k] = match pmesh.neis[p][k] {
                MESH_NULL_IDX => 0,
                nei => nei + 1,
            };
            n += 1;
        }
        poly.vert_count = n as u8;
        poly.flags = pmesh.flags[p];
        poly.set_area(pmesh.areas[p]);
        poly.set_type(PolyType::Ground);
        polys.push(poly);
    }

    let mut off_mesh_cons = Vec::with_capacity(links.len());
    for (k, link) in links.iter().enumerate() {
        let base = verts.len() as u16;
        verts.push(link.start);
        verts.push(link.end);
        let mut poly = Poly::default();
        poly.verts[0] = base;
        poly.verts[1] = base + 1;
        poly.vert_count = 2;
        poly.flags = link.flags;
        poly.set_area(link.area);
        poly.set_type(PolyType::OffMeshConnection);
        polys.push(poly);

        let [sx, sy, sz] = link.start;
        let [ex, ey, ez] = link.end;
        off_mesh_cons.push(OffMeshConnection {
            pos: [sx, sy, sz, ex, ey, ez],
            rad: link.radius,
            poly: (ground + k) as u16,
            flags: if link.bidirectional { OFF_MESH_BIDIRECTIONAL } else { 0 },
            side: 0xff,
            user_id: link.user_id,
        });
    }

    let mut detail_meshes = Vec::with_capacity(ground);
    let mut detail_verts = Vec::new();
    let mut detail_tris = Vec::new();
    match params.dmesh {
        Some(dmesh) => {
            for (p, m) in dmesh.meshes.iter().enumerate() {
                let nv = usize::from(polys[p].vert_count);
                let [vb, vc, tb, tc] = m.map(|c| c as usize);
                if vc < nv || tc > usize::from(u8::MAX) || vc - nv > usize::from(u8::MAX) {
                    return Err(TileDataError::InvalidDetail { index: p });
                }
                let extra = dmesh.verts.get(vb + nv..vb + vc).ok_or(TileDataError::InvalidDetail { index: p })?;
                let tris = dmesh.tris.get(tb..tb + tc).ok_or(TileDataError::InvalidDetail { index: p })?;
                detail_meshes.push(PolyDetail {
                    vert_base: detail_verts.len() as u32,
                    tri_base: detail_tris.len() as u32,
                    vert_count: (vc - nv) as u8,
                    tri_count: tc as u8,
                    pad: [0; 2],
                });
                detail_verts.extend_from_slice(extra);
                detail_tris.extend_from_slice(tris);
            }
        }
        None => {
            for poly in &polys[..ground] {
                let nv = poly.vert_count;
                detail_meshes.push(PolyDetail {
                    vert_base: 0,
                    tri_base: detail_tris.len() as u32,
                    vert_count: 0,
                    tri_count: nv - 2,
                    pad: [0; 2],
                });
                detail_tris.extend((2..nv).map(|k| [0, k - 1, k, 0]));
            }
        }
    }

    let header = TileHeader {
        magic: TILE_MAGIC,
        version: TILE_VERSION,
        x: params.tile_x,
        y: params.tile_y,
        layer: params.layer,
        user_id: params.user_id,
        poly_count: poly_count as u32,
        vert_count: verts.len() as u32,
        detail_mesh_count: detail_meshes.len() as u32,
        detail_vert_count: detail_verts.len() as u32,
        detail_tri_count: detail_tris.len() as u32,
        off_mesh_con_count: off_mesh_cons.len() as u32,
        off_mesh_base: ground as u32,
        walkable_height: params.walkable_height,
        walkable_radius: params.walkable_radius,
        walkable_climb: params.walkable_climb,
        bmin: params.bmin.to_array(),
        bmax: params.bmax.to_array(),
    };

    let mut out = Vec::new();
    let mut push = |section: &[u8]| {
        out.extend_from_slice(section);
        out.resize(align4(out.len()), 0);
    };
    push(bytemuck::bytes_of(&header));
    push(bytemuck::cast_slice(&verts));
    push(bytemuck::cast_slice(&polys));
    push(bytemuck::cast_slice(&detail_meshes));
    push(bytemuck::cast_slice(&detail_verts));
    push(bytemuck::cast_slice(&detail_tris));
    push(bytemuck::cast_slice(&off_mesh_cons));

    log::trace!(
        "tile ({}, {}) data: {} polys, {} verts, {} off-mesh links, {} bytes",
        params.tile_x,
        params.tile_y,
        poly_count,
        verts.len(),
        off_mesh_cons.len(),
        out.len()
    );
    Ok(TilePayload::from_bytes(&out))
}
