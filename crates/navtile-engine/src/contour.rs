//! Region outlines as axis-aligned rectangles.
//!
//! Each region is covered greedily, row-major, by rectangles of connected spans.
//! A rectangle only grows over spans whose floor stays within the simplification
//! error of its seed span, and no side exceeds the maximum edge length.

use navtile_geom::Vec3;

use crate::compact::CompactHeightfield;

/// One simple outline in voxel coordinates, wound `(x0,z0) (x0,z1) (x1,z1) (x1,z0)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contour {
    /// `[x, y, z]` with `x`/`z` in cells and `y` in `ch` units.
    pub verts: Vec<[i32; 3]>,
    pub reg: u16,
    pub area: u8,
}

#[derive(Clone, Debug)]
pub struct ContourSet {
    pub contours: Vec<Contour>,
    /// Origin of the meshed area, already moved inside the border margin.
    pub bmin: Vec3,
    pub bmax: Vec3,
    pub cs: f32,
    pub ch: f32,
    pub width: usize,
    pub height: usize,
    pub border_size: i32,
}

/// Traces every region of `chf`. `max_error` is in cells, `max_edge_len` in
/// cells with 0 meaning unlimited.
pub fn build_contours(
    chf: &CompactHeightfield,
    border_size: i32,
    max_error: f32,
    max_edge_len: i32,
) -> ContourSet {
    let border = border_size.max(0);
    let tol_y = (max_error.max(0.0) * chf.cs / chf.ch).round() as i32;
    let max_len = if max_edge_len > 0 { max_edge_len as usize } else { usize::MAX };

    let mut covered = vec![false; chf.span_count()];
    let mut contours = Vec::new();

    for (x, z, i) in chf.iter_spans() {
        let reg = chf.spans[i].reg;
        if reg == 0 || covered[i] {
            continue;
        }
        let seed_y = i32::from(chf.spans[i].y);
        let accepts = |j: usize, covered: &[bool]| {
            chf.spans[j].reg == reg
                && !covered[j]
                && (i32::from(chf.spans[j].y) - seed_y).abs() <= tol_y
        };

        // First row: walk +x.
        let mut row = vec![i];
        let (mut cx, mut ci) = (x, i);
        while row.len() < max_len {
            match chf.neighbour(cx, z, ci, 2) {
                Some((nx, _, ni)) if accepts(ni, &covered) => {
                    row.push(ni);
                    cx = nx;
                    ci = ni;
                }
                _ => break,
            }
        }
        let w = row.len();

        // Further rows: the whole row must step +z and stay linked along +x.
        let mut rows = vec![row];
        'grow: while rows.len() < max_len {
            let prev = &rows[rows.len() - 1];
            let pz = z + rows.len() - 1;
            let mut next = Vec::with_capacity(w);
            for (k, &pi) in prev.iter().enumerate() {
                let Some((_, _, ni)) = chf.neighbour(x + k, pz, pi, 1) else { break 'grow };
                if !accepts(ni, &covered) {
                    break 'grow;
                }
                if let Some(&left) = next.last() {
                    if chf.neighbour(x + k - 1, pz + 1, left, 2).map(|(_, _, n)| n) != Some(ni) {
                        break 'grow;
                    }
                }
                next.push(ni);
            }
            rows.push(next);
        }
        let h = rows.len();
        for &j in rows.iter().flatten() {
            covered[j] = true;
        }

        let corner_y = |rx: usize, rz: usize| i32::from(chf.spans[rows[rz][rx]].y);
        let (x0, z0) = (x as i32 - border, z as i32 - border);
        let (x1, z1) = (x0 + w as i32, z0 + h as i32);
        contours.push(Contour {
            verts: vec![
                [x0, corner_y(0, 0), z0],
                [x0, corner_y(0, h - 1), z1],
                [x1, corner_y(w - 1, h - 1), z1],
                [x1, corner_y(w - 1, 0), z0],
            ],
            reg,
            area: chf.areas[i],
        });
    }

    let shift = border as f32 * chf.cs;
    let mut bmin = chf.bmin;
    let mut bmax = chf.bmax;
    bmin.x += shift;
    bmin.z += shift;
    bmax.x -= shift;
    bmax.z -= shift;
    log::trace!("traced {} contours", contours.len());
    ContourSet {
        contours,
        bmin,
        bmax,
        cs: chf.cs,
        ch: chf.ch,
        width: chf.width.saturating_sub(2 * border as usize),
        height: chf.height.saturating_sub(2 * border as usize),
        border_size: border,
    }
}
