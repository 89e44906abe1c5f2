use hashbrown::HashMap;
use navtile_geom::Vec3;

use crate::contour::ContourSet;
use crate::{EngineError, MAX_VERTS_PER_POLY, MESH_NULL_IDX};

// Vertices closer than this in `ch` units are welded.
const WELD_Y: i32 = 2;

/// Convex polygons in voxel coordinates. Unused slots hold `MESH_NULL_IDX`.
#[derive(Clone, Debug)]
pub struct PolyMesh {
    pub verts: Vec<[u16; 3]>,
    pub polys: Vec<[u16; MAX_VERTS_PER_POLY]>,
    pub neis: Vec<[u16; MAX_VERTS_PER_POLY]>,
    pub regs: Vec<u16>,
    pub areas: Vec<u8>,
    pub flags: Vec<u16>,
    pub nvp: usize,
    pub bmin: Vec3,
    pub bmax: Vec3,
    pub cs: f32,
    pub ch: f32,
    pub border_size: i32,
}

impl PolyMesh {
    #[inline]
    pub fn poly_count(&self) -> usize {
        self.polys.len()
    }

    /// Vertex indices of polygon `p`, without padding.
    pub fn poly_verts(&self, p: usize) -> impl Iterator<Item = u16> + '_ {
        self.polys[p].iter().copied().take_while(|&v| v != MESH_NULL_IDX)
    }

    pub fn vert_world(&self, v: u16) -> [f32; 3] {
        let [x, y, z] = self.verts[usize::from(v)];
        [
            self.bmin.x + f32::from(x) * self.cs,
            self.bmin.y + f32::from(y) * self.ch,
            self.bmin.z + f32::from(z) * self.cs,
        ]
    }
}

/// Welds contour vertices and emits polygons of at most `nvp` vertices.
pub fn build_poly_mesh(cset: &ContourSet, nvp: usize) -> Result<PolyMesh, EngineError> {
    if !(3..=MAX_VERTS_PER_POLY).contains(&nvp) {
        return Err(EngineError::InvalidParameter("vertices per polygon must be in 3..=6"));
    }
    let max = usize::from(MESH_NULL_IDX) - 1;
    let mut mesh = PolyMesh {
        verts: Vec::new(),
        polys: Vec::new(),
        neis: Vec::new(),
        regs: Vec::new(),
        areas: Vec::new(),
        flags: Vec::new(),
        nvp,
        bmin: cset.bmin,
        bmax: cset.bmax,
        cs: cset.cs,
        ch: cset.ch,
        border_size: cset.border_size,
    };
    let mut buckets: HashMap<(i32, i32), Vec<u16>> = HashMap::new();

    for contour in &cset.contours {
        if contour.verts.len() < 3 {
            continue;
        }
        let mut ids = Vec::with_capacity(contour.verts.len());
        for &[x, y, z] in &contour.verts {
            let bucket = buckets.entry((x, z)).or_default();
            let existing = bucket
                .iter()
                .copied()
                .find(|&v| (i32::from(mesh.verts[usize::from(v)][1]) - y).abs() <= WELD_Y);
            let id = match existing {
                Some(v) => v,
                None => {
                    if mesh.verts.len() >= max {
                        return Err(EngineError::TooManyVertices { max });
                    }
                    let clamp = |c: i32| c.clamp(0, i32::from(u16::MAX)) as u16;
                    mesh.verts.push([clamp(x), clamp(y), clamp(z)]);
                    let v = (mesh.verts.len() - 1) as u16;
                    bucket.push(v);
                    v
                }
            };
            ids.push(id);
        }
        ids.dedup();
        if ids.len() > 1 && ids.first() == ids.last() {
            ids.pop();
        }
        if ids.len() < 3 {
            continue;
        }

        // Outlines are convex, so a fan from the first vertex splits them.
        let mut start = 1;
        while start + 1 < ids.len() {
            let end = (start + nvp - 1).min(ids.len());
            let mut poly = [MESH_NULL_IDX; MAX_VERTS_PER_POLY];
            poly[0] = ids[0];
            poly[1..=end - start].copy_from_slice(&ids[start..end]);
            if mesh.polys.len() >= max {
                return Err(EngineError::TooManyPolygons { max });
            }
            mesh.polys.push(poly);
            mesh.regs.push(contour.reg);
            mesh.areas.push(contour.area);
            mesh.flags.push(0);
            start = end - 1;
        }
    }

    link_neighbours(&mut mesh);
    log::trace!("poly mesh: {} verts, {} polys", mesh.verts.len(), mesh.polys.len());
    Ok(mesh)
}

fn link_neighbours(mesh: &mut PolyMesh) {
    mesh.neis = vec![[MESH_NULL_IDX; MAX_VERTS_PER_POLY]; mesh.polys.len()];
    let mut edges: HashMap<(u16, u16), (usize, usize)> = HashMap::new();
    for p in 0..mesh.polys.len() {
        let verts: Vec<u16> = mesh.poly_verts(p).collect();
        let n = verts.len();
        for e in 0..n {
            let (a, b) = (verts[e], verts[(e + 1) % n]);
            let key = (a.min(b), a.max(b));
            match edges.remove(&key) {
                Some((q, qe)) => {
                    mesh.neis[p][e] = q as u16;
                    mesh.neis[q][qe] = p as u16;
                }
                None => {
                    edges.insert(key, (p, e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contour::Contour;

    fn rect(x0: i32, z0: i32, x1: i32, z1: i32, y: i32) -> Contour {
        Contour {
            verts: vec![[x0, y, z0], [x0, y, z1], [x1, y, z1], [x1, y, z0]],
            reg: 1,
            area: 63,
        }
    }

    fn cset(contours: Vec<Contour>) -> ContourSet {
        ContourSet {
            contours,
            bmin: Vec3::ZERO,
            bmax: Vec3::new(10.0, 10.0, 10.0),
            cs: 0.5,
            ch: 0.25,
            width: 20,
            height: 20,
            border_size: 0,
        }
    }

    #[test]
    fn adjacent_rectangles_share_edge() {
        let set = cset(vec![rect(0, 0, 4, 4, 2), rect(4, 0, 8, 4, 3)]);
        let mesh = build_poly_mesh(&set, 6).unwrap();
        assert_eq!(mesh.poly_count(), 2);
        assert_eq!(mesh.verts.len(), 6);
        assert_eq!(mesh.neis[0][2], 1);
        assert_eq!(mesh.neis[1][0], 0);
        assert_eq!(mesh.poly_verts(0).count(), 4);
    }

    #[test]
    fn triangles_when_cap_is_three() {
        let set = cset(vec![rect(0, 0, 4, 4, 0)]);
        let mesh = build_poly_mesh(&set, 3).unwrap();
        assert_eq!(mesh.poly_count(), 2);
        assert_eq!(mesh.polys[0][..3], [0, 1, 2]);
        assert_eq!(mesh.polys[1][..3], [0, 2, 3]);
        assert_eq!(mesh.neis[0][2], 1);
    }

    #[test]
    fn distant_heights_do_not_weld() {
        let set = cset(vec![rect(0, 0, 4, 4, 0), rect(4, 0, 8, 4, 20)]);
        let mesh = build_poly_mesh(&set, 6).unwrap();
        assert_eq!(mesh.verts.len(), 8);
        assert!(mesh.neis.iter().flatten().all(|&n| n == MESH_NULL_IDX));
    }

    #[test]
    fn world_positions() {
        let mesh = build_poly_mesh(&cset(vec![rect(2, 0, 4, 4, 4)]), 6).unwrap();
        assert_eq!(mesh.vert_world(0), [1.0, 1.0, 0.0]);
    }

    #[test]
    fn bad_cap_is_rejected() {
        assert!(build_poly_mesh(&cset(Vec::new()), 7).is_err());
    }
}
