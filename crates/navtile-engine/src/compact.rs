use navtile_geom::Vec3;

use crate::heightfield::{Heightfield, SPAN_MAX_HEIGHT};
use crate::{DIR_OFFSET_X, DIR_OFFSET_Z, NULL_AREA};

/// Marker for a missing neighbour link.
pub const NOT_CONNECTED: u8 = 0xff;

/// Range of spans stored for one column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompactCell {
    pub index: u32,
    pub count: u8,
}

/// Open space above a solid span.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompactSpan {
    /// Floor height in `ch` units.
    pub y: u16,
    /// Clearance above the floor.
    pub h: u16,
    pub reg: u16,
    /// Per direction, the neighbour's layer index in its column.
    pub con: [u8; 4],
}

impl CompactSpan {
    #[inline]
    pub fn connection(&self, dir: usize) -> Option<usize> {
        let c = self.con[dir];
        (c != NOT_CONNECTED).then_some(usize::from(c))
    }
}

/// Walkable spans only, with neighbour connectivity.
#[derive(Clone, Debug)]
pub struct CompactHeightfield {
    pub width: usize,
    pub height: usize,
    pub walkable_height: i32,
    pub walkable_climb: i32,
    pub bmin: Vec3,
    pub bmax: Vec3,
    pub cs: f32,
    pub ch: f32,
    pub cells: Vec<CompactCell>,
    pub spans: Vec<CompactSpan>,
    pub areas: Vec<u8>,
}

impl CompactHeightfield {
    pub fn build(walkable_height: i32, walkable_climb: i32, hf: &Heightfield) -> Self {
        let (w, h) = (hf.width, hf.height);
        let max_height = i32::from(SPAN_MAX_HEIGHT);
        let span_count = (0..h)
            .flat_map(|z| (0..w).map(move |x| (x, z)))
            .map(|(x, z)| hf.column(x, z).iter().filter(|s| s.area != NULL_AREA).count())
            .sum();

        let mut bmax = hf.bmax;
        bmax.y += walkable_height as f32 * hf.ch;
        let mut chf = CompactHeightfield {
            width: w,
            height: h,
            walkable_height,
            walkable_climb,
            bmin: hf.bmin,
            bmax,
            cs: hf.cs,
            ch: hf.ch,
            cells: vec![CompactCell::default(); w * h],
            spans: Vec::with_capacity(span_count),
            areas: Vec::with_capacity(span_count),
        };

        for z in 0..h {
            for x in 0..w {
                let col = hf.column(x, z);
                let cell = &mut chf.cells[x + z * w];
                cell.index = chf.spans.len() as u32;
                for (i, s) in col.iter().enumerate() {
                    if s.area == NULL_AREA {
                        continue;
                    }
                    // Columns deeper than the connection index range drop the excess.
                    if cell.count == NOT_CONNECTED - 1 {
                        break;
                    }
                    let bot = i32::from(s.smax);
                    let top = col.get(i + 1).map_or(max_height, |n| i32::from(n.smin));
                    chf.spans.push(CompactSpan {
                        y: bot.clamp(0, 0xffff) as u16,
                        h: (top - bot).clamp(0, 0xffff) as u16,
                        reg: 0,
                        con: [NOT_CONNECTED; 4],
                    });
                    chf.areas.push(s.area);
                    cell.count += 1;
                }
            }
        }

        chf.connect();
        chf
    }

    fn connect(&mut self) {
        let (w, h) = (self.width as i32, self.height as i32);
        for z in 0..h {
            for x in 0..w {
                let cell = self.cells[(x + z * w) as usize];
                for i in cell.index as usize..(cell.index as usize + usize::from(cell.count)) {
                    let s = self.spans[i];
                    for dir in 0..4 {
                        let nx = x + DIR_OFFSET_X[dir];
                        let nz = z + DIR_OFFSET_Z[dir];
                        if nx < 0 || nz < 0 || nx >= w || nz >= h {
                            continue;
                        }
                        let nc = self.cells[(nx + nz * w) as usize];
                        for k in 0..usize::from(nc.count) {
                            let ns = self.spans[nc.index as usize + k];
                            let bot = i32::from(s.y).max(i32::from(ns.y));
                            let top = (i32::from(s.y) + i32::from(s.h))
                                .min(i32::from(ns.y) + i32::from(ns.h));
                            if top - bot >= self.walkable_height
                                && (i32::from(ns.y) - i32::from(s.y)).abs() <= self.walkable_climb
                            {
                                self.spans[i].con[dir] = k as u8;
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    #[inline]
    pub fn span_count(&self) -> usize {
        self.spans.len()
    }

    #[inline]
    pub fn cell(&self, x: usize, z: usize) -> CompactCell {
        self.cells[x + z * self.width]
    }

    /// Global span indices of column `(x, z)`.
    #[inline]
    pub fn column_spans(&self, x: usize, z: usize) -> std::ops::Range<usize> {
        let c = self.cell(x, z);
        c.index as usize..c.index as usize + usize::from(c.count)
    }

    /// Global index of the span connected to `i` (at `(x, z)`) in direction `dir`.
    #[inline]
    pub fn neighbour(&self, x: usize, z: usize, i: usize, dir: usize) -> Option<(usize, usize, usize)> {
        let layer = self.spans[i].connection(dir)?;
        let nx = (x as i32 + DIR_OFFSET_X[dir]) as usize;
        let nz = (z as i32 + DIR_OFFSET_Z[dir]) as usize;
        Some((nx, nz, self.cell(nx, nz).index as usize + layer))
    }

    /// Iterates `(x, z, span_index)` over every span.
    pub fn iter_spans(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        (0..self.height).flat_map(move |z| {
            (0..self.width).flat_map(move |x| self.column_spans(x, z).map(move |i| (x, z, i)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WALKABLE_AREA;

    fn stepped_field() -> Heightfield {
        let mut hf =
            Heightfield::new(3, 1, Vec3::ZERO, Vec3::new(3.0, 10.0, 1.0), 1.0, 1.0).unwrap();
        hf.add_span(0, 0, 0, 2, WALKABLE_AREA, 1);
        hf.add_span(1, 0, 0, 3, WALKABLE_AREA, 1);
        hf.add_span(2, 0, 0, 8, WALKABLE_AREA, 1);
        hf
    }

    #[test]
    fn climbable_steps_connect() {
        let chf = CompactHeightfield::build(2, 1, &stepped_field());
        assert_eq!(chf.span_count(), 3);
        // Step of one cell connects, step of five does not.
        assert_eq!(chf.spans[0].connection(2), Some(0));
        assert_eq!(chf.spans[1].connection(0), Some(0));
        assert_eq!(chf.spans[1].connection(2), None);
        assert_eq!(chf.neighbour(0, 0, 0, 2), Some((1, 0, 1)));
    }

    #[test]
    fn null_spans_are_skipped() {
        let mut hf = stepped_field();
        hf.add_span(1, 0, 5, 6, NULL_AREA, 0);
        let chf = CompactHeightfield::build(2, 1, &hf);
        assert_eq!(chf.span_count(), 3);
        // The null span above column 1 still caps its clearance.
        assert_eq!(chf.spans[1].h, 2);
    }

    #[test]
    fn bounds_grow_by_walkable_height() {
        let chf = CompactHeightfield::build(4, 1, &stepped_field());
        assert_eq!(chf.bmax.y, 14.0);
        assert_eq!(chf.iter_spans().count(), 3);
    }
}
