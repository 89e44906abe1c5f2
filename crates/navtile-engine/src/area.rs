//! Erosion and area tagging on the compact heightfield.

use crate::compact::CompactHeightfield;
use crate::NULL_AREA;

/// Clears walkable spans closer than `radius` cells to an obstacle or to the
/// edge of the walkable surface.
pub fn erode_walkable_area(radius: i32, chf: &mut CompactHeightfield) {
    if radius <= 0 {
        return;
    }
    let n = chf.span_count();
    let mut dist = vec![0xffu8; n];

    for (x, z, i) in chf.iter_spans() {
        if chf.areas[i] == NULL_AREA {
            dist[i] = 0;
            continue;
        }
        let connected = (0..4)
            .filter_map(|dir| chf.neighbour(x, z, i, dir))
            .filter(|&(_, _, ni)| chf.areas[ni] != NULL_AREA)
            .count();
        if connected != 4 {
            dist[i] = 0;
        }
    }

    let relax = |dist: &mut [u8], i: usize, j: usize, cost: u8| {
        let nd = dist[j].saturating_add(cost);
        if nd < dist[i] {
            dist[i] = nd;
        }
    };

    // Forward pass: -x, -z and their diagonals.
    for z in 0..chf.height {
        for x in 0..chf.width {
            for i in chf.column_spans(x, z) {
                if let Some((ax, az, a)) = chf.neighbour(x, z, i, 0) {
                    relax(&mut dist, i, a, 2);
                    if let Some((_, _, aa)) = chf.neighbour(ax, az, a, 3) {
                        relax(&mut dist, i, aa, 3);
                    }
                }
                if let Some((ax, az, a)) = chf.neighbour(x, z, i, 3) {
                    relax(&mut dist, i, a, 2);
                    if let Some((_, _, aa)) = chf.neighbour(ax, az, a, 2) {
                        relax(&mut dist, i, aa, 3);
                    }
                }
            }
        }
    }

    // Backward pass: +x, +z and their diagonals.
    for z in (0..chf.height).rev() {
        for x in (0..chf.width).rev() {
            for i in chf.column_spans(x, z) {
                if let Some((ax, az, a)) = chf.neighbour(x, z, i, 2) {
                    relax(&mut dist, i, a, 2);
                    if let Some((_, _, aa)) = chf.neighbour(ax, az, a, 1) {
                        relax(&mut dist, i, aa, 3);
                    }
                }
                if let Some((ax, az, a)) = chf.neighbour(x, z, i, 1) {
                    relax(&mut dist, i, a, 2);
                    if let Some((_, _, aa)) = chf.neighbour(ax, az, a, 0) {
                        relax(&mut dist, i, aa, 3);
                    }
                }
            }
        }
    }

    let thr = (radius * 2).min(255) as u8;
    for (area, d) in chf.areas.iter_mut().zip(dist) {
        if d < thr {
            *area = NULL_AREA;
        }
    }
}

/// Crossing-number test on the XZ plane.
pub fn point_in_poly_xz(verts: &[[f32; 3]], p: [f32; 3]) -> bool {
    let mut inside = false;
    let mut j = verts.len().wrapping_sub(1);
    for (i, vi) in verts.iter().enumerate() {
        let vj = verts[j];
        if ((vi[2] > p[2]) != (vj[2] > p[2]))
            && (p[0] < (vj[0] - vi[0]) * (p[2] - vi[2]) / (vj[2] - vi[2]) + vi[0])
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Vertical slack used when marking area geometry into a heightfield that
/// spans `[min_y, max_y]`.
pub fn area_marking_tolerance(ch: f32, min_y: f32, max_y: f32) -> f32 {
    let base = ch * 10.0;
    let range = (max_y - min_y) * 0.05;
    let position = min_y.abs() * 0.001;
    let tol = base.max(range.max(position));
    if min_y > 100.0 { tol.max(1.0) } else { tol }
}

/// Tags every walkable span whose cell centre lies inside the convex polygon
/// `verts` and whose floor lies in `[hmin, hmax]`. Returns the number of spans
/// tagged.
pub fn mark_convex_poly_area(
    verts: &[[f32; 3]],
    hmin: f32,
    hmax: f32,
    area: u8,
    chf: &mut CompactHeightfield,
) -> usize {
    let Some(first) = verts.first() else { return 0 };
    let (mut min_x, mut max_x, mut min_z, mut max_z) = (first[0], first[0], first[2], first[2]);
    for v in &verts[1..] {
        min_x = min_x.min(v[0]);
        max_x = max_x.max(v[0]);
        min_z = min_z.min(v[2]);
        max_z = max_z.max(v[2]);
    }

    let (w, h) = (chf.width as i32, chf.height as i32);
    let x0 = ((min_x - chf.bmin.x) / chf.cs) as i32;
    let x1 = ((max_x - chf.bmin.x) / chf.cs) as i32;
    let z0 = ((min_z - chf.bmin.z) / chf.cs) as i32;
    let z1 = ((max_z - chf.bmin.z) / chf.cs) as i32;
    if x1 < 0 || z1 < 0 || x0 >= w || z0 >= h {
        return 0;
    }
    let ymin = ((hmin - chf.bmin.y) / chf.ch) as i32;
    let ymax = ((hmax - chf.bmin.y) / chf.ch) as i32;

    let mut marked = 0;
    for z in z0.max(0)..=z1.min(h - 1) {
        for x in x0.max(0)..=x1.min(w - 1) {
            for i in chf.column_spans(x as usize, z as usize) {
                if chf.areas[i] == NULL_AREA {
                    continue;
                }
                let y = i32::from(chf.spans[i].y);
                if y < ymin || y > ymax {
                    continue;
                }
                let p = [
                    chf.bmin.x + (x as f32 + 0.5) * chf.cs,
                    0.0,
                    chf.bmin.z + (z as f32 + 0.5) * chf.cs,
                ];
                if point_in_poly_xz(verts, p) {
                    chf.areas[i] = area;
                    marked += 1;
                }
            }
        }
    }
    marked
}
