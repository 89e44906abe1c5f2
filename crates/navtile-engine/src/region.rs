//! Region partitioning of the compact heightfield.

use std::collections::VecDeque;

use hashbrown::{HashMap, HashSet};

use crate::compact::CompactHeightfield;
use crate::{EngineError, NULL_AREA};

const MAX_REGIONS: usize = 0xfffe;

/// How walkable spans are grouped before contour tracing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionStyle {
    /// Flood fill of connected spans with the same area code.
    #[default]
    Watershed,
    /// Row sweep; regions grow monotonically along +z.
    Monotone,
    /// Flood fill that never stacks two spans of one region in a column.
    Layer,
}

/// Assigns `CompactSpan::reg` for every span. Spans inside the `border_size`
/// margin and spans with the null area get region 0. Returns the number of
/// regions; ids run `1..=count`.
pub fn partition_regions(
    chf: &mut CompactHeightfield,
    style: PartitionStyle,
    border_size: i32,
    min_region_area: i32,
    merge_region_area: i32,
) -> Result<u16, EngineError> {
    for s in &mut chf.spans {
        s.reg = 0;
    }
    let border = border_size.max(0) as usize;
    let in_border = |x: usize, z: usize, chf: &CompactHeightfield| {
        x < border || z < border || x + border >= chf.width || z + border >= chf.height
    };

    let mut reg = vec![0u32; chf.span_count()];
    let count = match style {
        PartitionStyle::Watershed => flood_regions(chf, &in_border, &mut reg, false),
        PartitionStyle::Layer => flood_regions(chf, &in_border, &mut reg, true),
        PartitionStyle::Monotone => sweep_regions(chf, &in_border, &mut reg),
    };

    let mut info = region_info(chf, &in_border, &reg, count);
    drop_small_regions(&mut reg, &mut info, min_region_area.max(0) as usize);
    merge_small_regions(&mut reg, &mut info, merge_region_area.max(0) as usize);

    // Compact the surviving ids to 1..=n in first-seen order.
    let mut remap: HashMap<u32, u16> = HashMap::new();
    for r in reg.iter().copied().filter(|&r| r != 0) {
        if !remap.contains_key(&r) {
            if remap.len() >= MAX_REGIONS {
                return Err(EngineError::TooManyRegions { max: MAX_REGIONS });
            }
            let id = remap.len() as u16 + 1;
            remap.insert(r, id);
        }
    }
    for (s, r) in chf.spans.iter_mut().zip(&reg) {
        s.reg = remap.get(r).copied().unwrap_or(0);
    }
    log::trace!("partitioned {} spans into {} regions ({style:?})", reg.len(), remap.len());
    Ok(remap.len() as u16)
}

fn flood_regions(
    chf: &CompactHeightfield,
    in_border: &dyn Fn(usize, usize, &CompactHeightfield) -> bool,
    reg: &mut [u32],
    one_per_column: bool,
) -> u32 {
    let mut next = 0u32;
    let mut claimed = vec![0u32; chf.width * chf.height];
    let mut queue = VecDeque::new();

    for (x, z, i) in chf.iter_spans() {
        if reg[i] != 0 || chf.areas[i] == NULL_AREA || in_border(x, z, chf) {
            continue;
        }
        next += 1;
        let area = chf.areas[i];
        reg[i] = next;
        claimed[x + z * chf.width] = next;
        queue.push_back((x, z, i));
        while let Some((cx, cz, ci)) = queue.pop_front() {
            for dir in 0..4 {
                let Some((nx, nz, ni)) = chf.neighbour(cx, cz, ci, dir) else { continue };
                if reg[ni] != 0 || chf.areas[ni] != area || in_border(nx, nz, chf) {
                    continue;
                }
                let cell = nx + nz * chf.width;
                if one_per_column && claimed[cell] == next {
                    continue;
                }
                claimed[cell] = next;
                reg[ni] = next;
                queue.push_back((nx, nz, ni));
            }
        }
    }
    next
}

fn sweep_regions(
    chf: &CompactHeightfield,
    in_border: &dyn Fn(usize, usize, &CompactHeightfield) -> bool,
    reg: &mut [u32],
) -> u32 {
    let mut next = 0u32;
    for z in 0..chf.height {
        // Row-local runs, each with the region it may continue from -z.
        let mut runs: Vec<Run> = Vec::new();
        let mut run_of: HashMap<usize, usize> = HashMap::new();
        for x in 0..chf.width {
            if in_border(x, z, chf) {
                continue;
            }
            for i in chf.column_spans(x, z) {
                let area = chf.areas[i];
                if area == NULL_AREA {
                    continue;
                }
                let left = chf
                    .neighbour(x, z, i, 0)
                    .filter(|&(nx, nz, ni)| !in_border(nx, nz, chf) && chf.areas[ni] == area)
                    .and_then(|(_, _, ni)| run_of.get(&ni).copied());
                let run = match left {
                    Some(r) => r,
                    None => {
                        runs.push(Run { below: None, unique: true });
                        runs.len() - 1
                    }
                };
                run_of.insert(i, run);

                if let Some((nx, nz, ni)) = chf.neighbour(x, z, i, 3) {
                    if !in_border(nx, nz, chf) && chf.areas[ni] == area && reg[ni] != 0 {
                        let r = &mut runs[run];
                        match r.below {
                            None if r.unique => r.below = Some(reg[ni]),
                            Some(b) if b != reg[ni] => r.unique = false,
                            _ => {}
                        }
                    }
                }
            }
        }

        // A region below may be continued by one run only.
        let mut claims: HashMap<u32, usize> = HashMap::new();
        for r in runs.iter().filter(|r| r.unique) {
            if let Some(b) = r.below {
                *claims.entry(b).or_default() += 1;
            }
        }
        let ids: Vec<u32> = runs
            .iter()
            .map(|r| match r.below {
                Some(b) if r.unique && claims.get(&b) == Some(&1) => b,
                _ => {
                    next += 1;
                    next
                }
            })
            .collect();
        for (i, run) in run_of {
            reg[i] = ids[run];
        }
    }
    next
}

struct Run {
    below: Option<u32>,
    unique: bool,
}

#[derive(Default)]
struct RegionInfo {
    size: usize,
    area: u8,
    touches_border: bool,
    neighbours: HashSet<u32>,
}

fn region_info(
    chf: &CompactHeightfield,
    in_border: &dyn Fn(usize, usize, &CompactHeightfield) -> bool,
    reg: &[u32],
    count: u32,
) -> Vec<RegionInfo> {
    let mut info: Vec<RegionInfo> = (0..=count).map(|_| RegionInfo::default()).collect();
    for (x, z, i) in chf.iter_spans() {
        let r = reg[i];
        if r == 0 {
            continue;
        }
        let ri = &mut info[r as usize];
        ri.size += 1;
        ri.area = chf.areas[i];
        for dir in 0..4 {
            match chf.neighbour(x, z, i, dir) {
                Some((nx, nz, _)) if in_border(nx, nz, chf) => ri.touches_border = true,
                Some((_, _, ni)) if reg[ni] != 0 && reg[ni] != r => {
                    ri.neighbours.insert(reg[ni]);
                }
                _ => {}
            }
        }
    }
    info
}

fn drop_small_regions(reg: &mut [u32], info: &mut [RegionInfo], min_area: usize) {
    let dropped: HashSet<u32> = info
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, ri)| ri.size > 0 && ri.size < min_area && !ri.touches_border)
        .map(|(r, _)| r as u32)
        .collect();
    if dropped.is_empty() {
        return;
    }
    for r in reg.iter_mut() {
        if dropped.contains(r) {
            *r = 0;
        }
    }
    for (r, ri) in info.iter_mut().enumerate() {
        if dropped.contains(&(r as u32)) {
            ri.size = 0;
            ri.neighbours.clear();
        } else {
            ri.neighbours.retain(|n| !dropped.contains(n));
        }
    }
}

fn merge_small_regions(reg: &mut [u32], info: &mut [RegionInfo], merge_area: usize) {
    // Union-find over region ids; `target[r] == r` for roots.
    let mut target: Vec<u32> = (0..info.len() as u32).collect();
    fn root(target: &mut [u32], mut r: u32) -> u32 {
        while target[r as usize] != r {
            let up = target[target[r as usize] as usize];
            target[r as usize] = up;
            r = up;
        }
        r
    }

    loop {
        let mut merged = false;
        for r in 1..info.len() {
            let r = r as u32;
            if root(&mut target, r) != r {
                continue;
            }
            let ri = &info[r as usize];
            if ri.size == 0 || ri.size >= merge_area {
                continue;
            }
            let area = ri.area;
            let neighbours: Vec<u32> = ri.neighbours.iter().copied().collect();
            let mut best: Option<(usize, u32)> = None;
            for n in neighbours {
                let n = root(&mut target, n);
                if n == r || info[n as usize].area != area || info[n as usize].size == 0 {
                    continue;
                }
                let key = (info[n as usize].size, n);
                if best.is_none_or(|b| key < b) {
                    best = Some(key);
                }
            }
            let Some((_, into)) = best else { continue };

            target[r as usize] = into;
            let moved = std::mem::take(&mut info[r as usize]);
            let dst = &mut info[into as usize];
            dst.size += moved.size;
            dst.touches_border |= moved.touches_border;
            dst.neighbours.extend(moved.neighbours.into_iter().filter(|&n| n != into));
            dst.neighbours.remove(&r);
            merged = true;
        }
        if !merged {
            break;
        }
    }

    for r in reg.iter_mut().filter(|r| **r != 0) {
        *r = root(&mut target, *r);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightfield::Heightfield;
    use crate::WALKABLE_AREA;
    use navtile_geom::Vec3;

    fn flat(w: usize, h: usize) -> CompactHeightfield {
        let mut hf =
            Heightfield::new(w, h, Vec3::ZERO, Vec3::new(w as f32, 10.0, h as f32), 1.0, 1.0).unwrap();
        for z in 0..h {
            for x in 0..w {
                hf.add_span(x, z, 0, 1, WALKABLE_AREA, 1);
            }
        }
        CompactHeightfield::build(2, 1, &hf)
    }

    fn region_at(chf: &CompactHeightfield, x: usize, z: usize) -> u16 {
        chf.spans[chf.column_spans(x, z).start].reg
    }

    #[test]
    fn flat_field_is_one_region() {
        for style in [PartitionStyle::Watershed, PartitionStyle::Monotone, PartitionStyle::Layer] {
            let mut chf = flat(6, 6);
            let n = partition_regions(&mut chf, style, 0, 0, 0).unwrap();
            assert_eq!(n, 1, "{style:?}");
            assert!(chf.spans.iter().all(|s| s.reg == 1));
        }
    }

    #[test]
    fn border_spans_get_no_region() {
        let mut chf = flat(8, 8);
        partition_regions(&mut chf, PartitionStyle::Watershed, 2, 0, 0).unwrap();
        assert_eq!(region_at(&chf, 1, 4), 0);
        assert_eq!(region_at(&chf, 6, 4), 0);
        assert_eq!(region_at(&chf, 4, 4), 1);
    }

    #[test]
    fn area_codes_split_regions() {
        let mut chf = flat(6, 6);
        for (x, _, i) in chf.iter_spans().collect::<Vec<_>>() {
            if x >= 3 {
                chf.areas[i] = 5;
            }
        }
        let n = partition_regions(&mut chf, PartitionStyle::Watershed, 0, 0, 100).unwrap();
        assert_eq!(n, 2);
        assert_ne!(region_at(&chf, 0, 0), region_at(&chf, 5, 0));
    }

    #[test]
    fn small_island_is_dropped() {
        let mut chf = flat(6, 6);
        // A 2x2 island cut off by a null ring.
        for (x, z, i) in chf.iter_spans().collect::<Vec<_>>() {
            if x == 2 || z == 2 {
                chf.areas[i] = NULL_AREA;
            }
        }
        let n = partition_regions(&mut chf, PartitionStyle::Watershed, 0, 5, 0).unwrap();
        assert_eq!(region_at(&chf, 0, 0), 0);
        assert!(n >= 1);
        assert_ne!(region_at(&chf, 4, 4), 0);
    }

    #[test]
    fn monotone_splits_around_hole() {
        let mut chf = flat(5, 5);
        for (x, z, i) in chf.iter_spans().collect::<Vec<_>>() {
            if x == 2 && z == 2 {
                chf.areas[i] = NULL_AREA;
            }
        }
        let n = partition_regions(&mut chf, PartitionStyle::Monotone, 0, 0, 0).unwrap();
        assert!(n >= 2);
        // Every region is still a connected set of walkable spans.
        assert!(chf.iter_spans().all(|(_, _, i)| (chf.areas[i] == NULL_AREA) == (chf.spans[i].reg == 0)));
    }

    #[test]
    fn small_regions_merge_into_neighbours() {
        let mut chf = flat(6, 6);
        for (x, z, i) in chf.iter_spans().collect::<Vec<_>>() {
            if x == 2 && z == 2 {
                chf.areas[i] = NULL_AREA;
            }
        }
        let n = partition_regions(&mut chf, PartitionStyle::Monotone, 0, 0, 100).unwrap();
        assert_eq!(n, 1);
    }
}
