use navtile_geom::Vec3;

use crate::EngineError;

/// Highest span coordinate a heightfield column can hold.
pub const SPAN_MAX_HEIGHT: u16 = 0x1fff;

// Keeps a runaway tile size from allocating gigabytes of column headers.
const MAX_COLUMNS: usize = 1 << 24;

/// Solid interval `[smin, smax)` of one heightfield column, in `ch` units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub smin: u16,
    pub smax: u16,
    pub area: u8,
}

/// Column grid of solid spans. Spans in a column are sorted and disjoint.
#[derive(Clone, Debug)]
pub struct Heightfield {
    pub width: usize,
    pub height: usize,
    pub bmin: Vec3,
    pub bmax: Vec3,
    pub cs: f32,
    pub ch: f32,
    columns: Vec<Vec<Span>>,
}

impl Heightfield {
    pub fn new(
        width: usize,
        height: usize,
        bmin: Vec3,
        bmax: Vec3,
        cs: f32,
        ch: f32,
    ) -> Result<Self, EngineError> {
        if cs <= 0.0 || ch <= 0.0 {
            return Err(EngineError::InvalidParameter("cell size and height must be positive"));
        }
        let columns = width
            .checked_mul(height)
            .filter(|&n| n > 0 && n <= MAX_COLUMNS)
            .ok_or(EngineError::HeightfieldTooLarge { width, height })?;
        Ok(Self {
            width,
            height,
            bmin,
            bmax,
            cs,
            ch,
            columns: vec![Vec::new(); columns],
        })
    }

    #[inline]
    pub fn column(&self, x: usize, z: usize) -> &[Span] {
        &self.columns[x + z * self.width]
    }

    #[inline]
    pub(crate) fn column_mut(&mut self, x: usize, z: usize) -> &mut Vec<Span> {
        &mut self.columns[x + z * self.width]
    }

    pub fn span_count(&self) -> usize {
        self.columns.iter().map(Vec::len).sum()
    }

    /// Inserts a span, merging it with every span it overlaps. When the merged
    /// tops are within `flag_merge_threshold`, the higher area code wins.
    pub fn add_span(
        &mut self,
        x: usize,
        z: usize,
        smin: u16,
        smax: u16,
        area: u8,
        flag_merge_threshold: i32,
    ) {
        let col = self.column_mut(x, z);
        let mut new = Span { smin, smax, area };
        let mut i = 0;
        while i < col.len() {
            let cur = col[i];
            if cur.smin > new.smax {
                break;
            }
            if cur.smax < new.smin {
                i += 1;
                continue;
            }
            new.smin = new.smin.min(cur.smin);
            new.smax = new.smax.max(cur.smax);
            if (i32::from(new.smax) - i32::from(cur.smax)).abs() <= flag_merge_threshold {
                new.area = new.area.max(cur.area);
            }
            col.remove(i);
        }
        col.insert(i, new);
    }
}

/// Rasterizes triangles into `hf`. `areas[i]` is the area code of triangle `i`.
pub fn rasterize_triangles(
    hf: &mut Heightfield,
    verts: &[[f32; 3]],
    tris: &[[u32; 3]],
    areas: &[u8],
    flag_merge_threshold: i32,
) -> Result<(), EngineError> {
    if areas.len() != tris.len() {
        return Err(EngineError::InvalidParameter("one area code per triangle is required"));
    }
    let nverts = verts.len();
    for (index, (tri, &area)) in tris.iter().zip(areas).enumerate() {
        if tri.iter().any(|&v| v as usize >= nverts) {
            return Err(EngineError::InvalidTriangle { index });
        }
        let v0 = verts[tri[0] as usize];
        let v1 = verts[tri[1] as usize];
        let v2 = verts[tri[2] as usize];
        rasterize_tri(hf, [v0, v1, v2], area, flag_merge_threshold);
    }
    Ok(())
}

// Clip buffers: a triangle cut by four axis lines never exceeds 7 vertices.
type ClipBuf = [[f32; 3]; 12];

/// Splits `input` along `axis == offset`. Returns the vertex counts of the part
/// below the line (written to `below`) and above it (written to `above`).
fn divide_poly(
    input: &[[f32; 3]],
    offset: f32,
    axis: usize,
    below: &mut ClipBuf,
    above: &mut ClipBuf,
) -> (usize, usize) {
    let mut d = [0.0f32; 12];
    for (i, v) in input.iter().enumerate() {
        d[i] = offset - v[axis];
    }
    let (mut m, mut n) = (0usize, 0usize);
    let nin = input.len();
    let mut j = nin - 1;
    for i in 0..nin {
        let ina = d[j] >= 0.0;
        let inb = d[i] >= 0.0;
        if ina != inb {
            let s = d[j] / (d[j] - d[i]);
            let p = [
                input[j][0] + (input[i][0] - input[j][0]) * s,
                input[j][1] + (input[i][1] - input[j][1]) * s,
                input[j][2] + (input[i][2] - input[j][2]) * s,
            ];
            below[m] = p;
            above[n] = p;
            m += 1;
            n += 1;
            if d[i] > 0.0 {
                below[m] = input[i];
                m += 1;
            } else if d[i] < 0.0 {
                above[n] = input[i];
                n += 1;
            }
        } else {
            if d[i] >= 0.0 {
                below[m] = input[i];
                m += 1;
                if d[i] != 0.0 {
                    j = i;
                    continue;
                }
            }
            above[n] = input[i];
            n += 1;
        }
        j = i;
    }
    (m, n)
}

fn rasterize_tri(hf: &mut Heightfield, tri: [[f32; 3]; 3], area: u8, flag_merge_threshold: i32) {
    let (bmin, bmax, cs) = (hf.bmin, hf.bmax, hf.cs);
    let ics = 1.0 / hf.cs;
    let ich = 1.0 / hf.ch;
    let w = hf.width as i32;
    let h = hf.height as i32;
    let by = bmax.y - bmin.y;

    let mut tmin = Vec3::from(tri[0]);
    let mut tmax = tmin;
    for v in &tri[1..] {
        tmin = tmin.min(Vec3::from(*v));
        tmax = tmax.max(Vec3::from(*v));
    }
    if tmin.x > bmax.x || tmax.x < bmin.x || tmin.y > bmax.y || tmax.y < bmin.y {
        return;
    }
    if tmin.z > bmax.z || tmax.z < bmin.z {
        return;
    }

    let z0 = (((tmin.z - bmin.z) * ics) as i32).clamp(-1, h - 1);
    let z1 = (((tmax.z - bmin.z) * ics) as i32).clamp(0, h - 1);

    let mut rest: ClipBuf = [[0.0; 3]; 12];
    rest[..3].copy_from_slice(&tri);
    let mut n_rest = 3usize;

    for z in z0..=z1 {
        let cz = bmin.z + z as f32 * cs;
        let mut row: ClipBuf = [[0.0; 3]; 12];
        let mut next: ClipBuf = [[0.0; 3]; 12];
        let (n_row, n_next) = divide_poly(&rest[..n_rest], cz + cs, 2, &mut row, &mut next);
        rest = next;
        n_rest = n_next;
        if n_row < 3 || z < 0 {
            continue;
        }
        if n_rest < 3 {
            n_rest = 0;
        }

        let mut min_x = row[0][0];
        let mut max_x = row[0][0];
        for v in &row[1..n_row] {
            min_x = min_x.min(v[0]);
            max_x = max_x.max(v[0]);
        }
        let x0 = ((min_x - bmin.x) * ics) as i32;
        let x1 = ((max_x - bmin.x) * ics) as i32;
        if x1 < 0 || x0 >= w {
            continue;
        }
        let x0 = x0.clamp(-1, w - 1);
        let x1 = x1.clamp(0, w - 1);

        let mut n_row_rest = n_row;
        for x in x0..=x1 {
            let cx = bmin.x + x as f32 * cs;
            let mut cell: ClipBuf = [[0.0; 3]; 12];
            let mut row_next: ClipBuf = [[0.0; 3]; 12];
            let (n_cell, n_row_next) =
                divide_poly(&row[..n_row_rest], cx + cs, 0, &mut cell, &mut row_next);
            row = row_next;
            n_row_rest = n_row_next;
            if n_cell < 3 || x < 0 {
                continue;
            }
            if n_row_rest < 3 {
                n_row_rest = 0;
            }

            let mut smin = cell[0][1];
            let mut smax = cell[0][1];
            for v in &cell[1..n_cell] {
                smin = smin.min(v[1]);
                smax = smax.max(v[1]);
            }
            smin -= bmin.y;
            smax -= bmin.y;
            if smax < 0.0 || smin > by {
                continue;
            }
            let smin = smin.max(0.0);
            let smax = smax.min(by);

            let max_h = i32::from(SPAN_MAX_HEIGHT);
            let ismin = ((smin * ich).floor() as i32).clamp(0, max_h);
            let ismax = ((smax * ich).ceil() as i32).clamp(ismin + 1, max_h);
            hf.add_span(
                x as usize,
                z as usize,
                ismin as u16,
                ismax as u16,
                area,
                flag_merge_threshold,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(w: usize, h: usize) -> Heightfield {
        Heightfield::new(w, h, Vec3::ZERO, Vec3::new(w as f32, 10.0, h as f32), 1.0, 0.5).unwrap()
    }

    #[test]
    fn add_span_merges_overlaps() {
        let mut hf = field(1, 1);
        hf.add_span(0, 0, 0, 2, 1, 1);
        hf.add_span(0, 0, 6, 8, 1, 1);
        hf.add_span(0, 0, 1, 7, 5, 1);
        assert_eq!(hf.column(0, 0), &[Span { smin: 0, smax: 8, area: 5 }]);
    }

    #[test]
    fn add_span_keeps_disjoint_sorted() {
        let mut hf = field(1, 1);
        hf.add_span(0, 0, 10, 12, 1, 1);
        hf.add_span(0, 0, 0, 2, 1, 1);
        let col = hf.column(0, 0);
        assert_eq!(col.len(), 2);
        assert!(col[0].smax < col[1].smin);
    }

    #[test]
    fn merged_area_follows_higher_top() {
        let mut hf = field(1, 1);
        hf.add_span(0, 0, 0, 10, 0, 1);
        // Lower walkable span is swallowed; the top stays unwalkable.
        hf.add_span(0, 0, 0, 4, 63, 1);
        assert_eq!(hf.column(0, 0)[0].area, 0);
    }

    #[test]
    fn flat_quad_fills_every_column() {
        let mut hf = field(4, 4);
        let verts = [[0.0, 1.0, 0.0], [0.0, 1.0, 4.0], [4.0, 1.0, 4.0], [4.0, 1.0, 0.0]];
        let tris = [[0, 1, 2], [0, 2, 3]];
        rasterize_triangles(&mut hf, &verts, &tris, &[63, 63], 1).unwrap();
        for z in 0..4 {
            for x in 0..4 {
                let col = hf.column(x, z);
                assert_eq!(col.len(), 1, "column ({x},{z})");
                assert_eq!(col[0].smin, 2);
                assert_eq!(col[0].smax, 3);
                assert_eq!(col[0].area, 63);
            }
        }
    }

    #[test]
    fn out_of_range_triangle_is_rejected() {
        let mut hf = field(2, 2);
        let err = rasterize_triangles(&mut hf, &[[0.0; 3]], &[[0, 1, 2]], &[63], 1).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTriangle { index: 0 }));
    }

    #[test]
    fn oversized_heightfield_fails() {
        let err = Heightfield::new(1 << 13, 1 << 13, Vec3::ZERO, Vec3::UP, 1.0, 1.0).unwrap_err();
        assert!(matches!(err, EngineError::HeightfieldTooLarge { .. }));
    }
}
