use crate::compact::CompactHeightfield;
use crate::poly_mesh::PolyMesh;

/// Height detail per polygon. `meshes[p]` is `[vert_base, vert_count,
/// tri_base, tri_count]`; each polygon's own vertices come first in its
/// vertex range.
#[derive(Clone, Debug, Default)]
pub struct DetailMesh {
    pub meshes: Vec<[u32; 4]>,
    pub verts: Vec<[f32; 3]>,
    pub tris: Vec<[u8; 4]>,
}

impl DetailMesh {
    pub fn tri_count(&self) -> usize {
        self.tris.len()
    }
}

/// Triangulates every polygon of `pmesh`. With `sample_dist > 0`, a centre
/// vertex is added wherever the heightfield under the polygon centre deviates
/// from the polygon height by more than `sample_max_error`.
pub fn build_detail_mesh(
    pmesh: &PolyMesh,
    chf: &CompactHeightfield,
    sample_dist: f32,
    sample_max_error: f32,
) -> DetailMesh {
    let mut dmesh = DetailMesh::default();
    for p in 0..pmesh.poly_count() {
        let poly: Vec<[f32; 3]> = pmesh.poly_verts(p).map(|v| pmesh.vert_world(v)).collect();
        let n = poly.len();
        let vert_base = dmesh.verts.len() as u32;
        let tri_base = dmesh.tris.len() as u32;
        dmesh.verts.extend_from_slice(&poly);

        let centre = centroid(&poly);
        let sample = (sample_dist > 0.0)
            .then(|| sample_height(chf, pmesh.regs[p], centre))
            .flatten()
            .filter(|&h| (h - centre[1]).abs() > sample_max_error);

        match sample {
            Some(h) => {
                dmesh.verts.push([centre[0], h, centre[2]]);
                let c = n as u8;
                for k in 0..n {
                    dmesh.tris.push([c, k as u8, ((k + 1) % n) as u8, 0]);
                }
            }
            None => {
                for k in 2..n {
                    dmesh.tris.push([0, (k - 1) as u8, k as u8, 0]);
                }
            }
        }

        dmesh.meshes.push([
            vert_base,
            dmesh.verts.len() as u32 - vert_base,
            tri_base,
            dmesh.tris.len() as u32 - tri_base,
        ]);
    }
    log::trace!("detail mesh: {} verts, {} tris", dmesh.verts.len(), dmesh.tris.len());
    dmesh
}

fn centroid(poly: &[[f32; 3]]) -> [f32; 3] {
    let n = poly.len().max(1) as f32;
    let mut c = [0.0; 3];
    for v in poly {
        c[0] += v[0];
        c[1] += v[1];
        c[2] += v[2];
    }
    [c[0] / n, c[1] / n, c[2] / n]
}

// Floor of the span in `reg` under `pos` whose height is closest to `pos.y`.
fn sample_height(chf: &CompactHeightfield, reg: u16, pos: [f32; 3]) -> Option<f32> {
    let x = ((pos[0] - chf.bmin.x) / chf.cs).floor();
    let z = ((pos[2] - chf.bmin.z) / chf.cs).floor();
    if x < 0.0 || z < 0.0 || x as usize >= chf.width || z as usize >= chf.height {
        return None;
    }
    chf.column_spans(x as usize, z as usize)
        .filter(|&i| chf.spans[i].reg == reg)
        .map(|i| chf.bmin.y + f32::from(chf.spans[i].y) * chf.ch)
        .min_by(|a, b| (a - pos[1]).abs().total_cmp(&(b - pos[1]).abs()))
}
