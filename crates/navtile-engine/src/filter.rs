//! Span filters run between rasterization and compaction.

use navtile_geom::Vec3;

use crate::heightfield::{Heightfield, SPAN_MAX_HEIGHT};
use crate::{DIR_OFFSET_X, DIR_OFFSET_Z, NULL_AREA};

/// Sets `areas[i] = area` for every triangle whose slope is below
/// `walkable_slope_deg`. Other entries are left alone.
pub fn mark_walkable_triangles(
    walkable_slope_deg: f32,
    verts: &[[f32; 3]],
    tris: &[[u32; 3]],
    areas: &mut [u8],
    area: u8,
) {
    let thr = walkable_slope_deg.to_radians().cos();
    for (tri, slot) in tris.iter().zip(areas.iter_mut()) {
        let Some(v0) = verts.get(tri[0] as usize) else { continue };
        let Some(v1) = verts.get(tri[1] as usize) else { continue };
        let Some(v2) = verts.get(tri[2] as usize) else { continue };
        let v0 = Vec3::from(*v0);
        let n = (Vec3::from(*v1) - v0).cross(Vec3::from(*v2) - v0).normalized();
        if n.y > thr {
            *slot = area;
        }
    }
}

/// Lets the agent step onto a low obstacle: a non-walkable span whose top is
/// within `walkable_climb` of a walkable span below it inherits that area.
pub fn filter_low_hanging_walkable_obstacles(walkable_climb: i32, hf: &mut Heightfield) {
    for z in 0..hf.height {
        for x in 0..hf.width {
            let col = hf.column_mut(x, z);
            let mut prev_walkable = false;
            let mut prev_area = NULL_AREA;
            let mut prev_smax = 0i32;
            for span in col.iter_mut() {
                let walkable = span.area != NULL_AREA;
                if !walkable && prev_walkable && (i32::from(span.smax) - prev_smax).abs() <= walkable_climb
                {
                    span.area = prev_area;
                }
                prev_walkable = walkable;
                prev_area = span.area;
                prev_smax = i32::from(span.smax);
            }
        }
    }
}

/// Clears walkable spans that sit on a drop deeper than `walkable_climb`, or on
/// a slope too steep to stand on.
pub fn filter_ledge_spans(walkable_height: i32, walkable_climb: i32, hf: &mut Heightfield) {
    let max_height = i32::from(SPAN_MAX_HEIGHT);
    let (w, h) = (hf.width as i32, hf.height as i32);
    let mut clear = Vec::new();

    for z in 0..h {
        for x in 0..w {
            let col = hf.column(x as usize, z as usize);
            for (i, span) in col.iter().enumerate() {
                if span.area == NULL_AREA {
                    continue;
                }
                let bot = i32::from(span.smax);
                let top = col.get(i + 1).map_or(max_height, |s| i32::from(s.smin));

                let mut min_h = max_height;
                let mut acc_min = bot;
                let mut acc_max = bot;
                for dir in 0..4 {
                    let dx = x + DIR_OFFSET_X[dir];
                    let dz = z + DIR_OFFSET_Z[dir];
                    if dx < 0 || dz < 0 || dx >= w || dz >= h {
                        min_h = min_h.min(-walkable_climb - bot);
                        continue;
                    }
                    let ncol = hf.column(dx as usize, dz as usize);

                    // Gap from the column floor up to the first neighbour span.
                    let nbot = -walkable_climb;
                    let ntop = ncol.first().map_or(max_height, |s| i32::from(s.smin));
                    if top.min(ntop) - bot.max(nbot) > walkable_height {
                        min_h = min_h.min(nbot - bot);
                    }

                    for (j, ns) in ncol.iter().enumerate() {
                        let nbot = i32::from(ns.smax);
                        let ntop = ncol.get(j + 1).map_or(max_height, |s| i32::from(s.smin));
                        if top.min(ntop) - bot.max(nbot) > walkable_height {
                            min_h = min_h.min(nbot - bot);
                            if (nbot - bot).abs() <= walkable_climb {
                                acc_min = acc_min.min(nbot);
                                acc_max = acc_max.max(nbot);
                            }
                        }
                    }
                }

                if min_h < -walkable_climb || acc_max - acc_min > walkable_climb {
                    clear.push((x as usize, z as usize, i));
                }
            }
        }
    }

    for (x, z, i) in clear {
        hf.column_mut(x, z)[i].area = NULL_AREA;
    }
}

/// Clears walkable spans with less than `walkable_height` of free space above.
pub fn filter_walkable_low_height_spans(walkable_height: i32, hf: &mut Heightfield) {
    let max_height = i32::from(SPAN_MAX_HEIGHT);
    for z in 0..hf.height {
        for x in 0..hf.width {
            let col = hf.column_mut(x, z);
            for i in 0..col.len() {
                let bot = i32::from(col[i].smax);
                let top = col.get(i + 1).map_or(max_height, |s| i32::from(s.smin));
                if top - bot < walkable_height {
                    col[i].area = NULL_AREA;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WALKABLE_AREA;

    fn field(n: usize) -> Heightfield {
        Heightfield::new(n, n, Vec3::ZERO, Vec3::new(n as f32, 20.0, n as f32), 1.0, 1.0).unwrap()
    }

    fn floor(hf: &mut Heightfield, top: u16) {
        for z in 0..hf.height {
            for x in 0..hf.width {
                hf.add_span(x, z, 0, top, WALKABLE_AREA, 1);
            }
        }
    }

    #[test]
    fn steep_triangle_is_not_marked() {
        let verts = [[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 5.0, 1.0]];
        let tris = [[0, 1, 2], [0, 3, 2]];
        let mut areas = [NULL_AREA; 2];
        mark_walkable_triangles(45.0, &verts, &tris, &mut areas, WALKABLE_AREA);
        assert_eq!(areas, [WALKABLE_AREA, NULL_AREA]);
    }

    #[test]
    fn low_obstacle_becomes_walkable() {
        let mut hf = field(1);
        hf.add_span(0, 0, 0, 2, WALKABLE_AREA, 1);
        hf.add_span(0, 0, 4, 5, NULL_AREA, 1);
        filter_low_hanging_walkable_obstacles(3, &mut hf);
        assert_eq!(hf.column(0, 0)[1].area, WALKABLE_AREA);
    }

    #[test]
    fn low_ceiling_clears_span() {
        let mut hf = field(1);
        hf.add_span(0, 0, 0, 2, WALKABLE_AREA, 1);
        hf.add_span(0, 0, 4, 6, NULL_AREA, 1);
        filter_walkable_low_height_spans(3, &mut hf);
        assert_eq!(hf.column(0, 0)[0].area, NULL_AREA);
    }

    #[test]
    fn ledge_filter_clears_outer_ring_only() {
        let mut hf = field(5);
        floor(&mut hf, 2);
        filter_ledge_spans(4, 1, &mut hf);
        for z in 0..5 {
            for x in 0..5 {
                let edge = x == 0 || z == 0 || x == 4 || z == 4;
                let area = hf.column(x, z)[0].area;
                assert_eq!(area == NULL_AREA, edge, "cell ({x},{z})");
            }
        }
    }
}
