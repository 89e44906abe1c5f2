use navtile_tile::TileView;

use crate::NavMesh;

/// Triangle soup recovered from tile polygons.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtractedGeometry {
    pub verts: Vec<[f32; 3]>,
    pub tris: Vec<[u32; 3]>,
}

impl ExtractedGeometry {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tris.is_empty()
    }

    fn append_view(&mut self, view: &TileView<'_>) {
        let base = self.verts.len() as u32;
        self.verts.extend_from_slice(view.verts);
        for poly in view.ground_polys() {
            let v = poly.vertex_indices();
            for j in 2..v.len() {
                self.tris
                    .push([base + u32::from(v[0]), base + u32::from(v[j - 1]), base + u32::from(v[j])]);
            }
        }
    }
}

/// Fan-triangulates the ground polygons of one tile. Off-mesh links carry no
/// surface and are skipped.
pub fn extract_view(view: &TileView<'_>) -> ExtractedGeometry {
    let mut out = ExtractedGeometry::default();
    out.append_view(view);
    out
}

/// Geometry of tile `(x, y)` on layer 0; empty when the tile is absent.
pub fn extract_tile_geometry(mesh: &NavMesh, x: i32, y: i32) -> ExtractedGeometry {
    mesh.tile_at(x, y, 0)
        .map(|t| extract_view(&t.view))
        .unwrap_or_default()
}

/// Geometry of every tile, concatenated in slot order.
pub fn extract_mesh_geometry(mesh: &NavMesh) -> ExtractedGeometry {
    let mut out = ExtractedGeometry::default();
    for tile in mesh.tiles() {
        out.append_view(&tile.view);
    }
    log::debug!(
        "extracted {} vertices and {} triangles from {} tiles",
        out.verts.len(),
        out.tris.len(),
        mesh.tile_count()
    );
    out
}
