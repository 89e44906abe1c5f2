use std::ops::Range;

use hashbrown::HashMap;
use memmap2::MmapMut;
use navtile_engine::point_in_poly_xz;
use navtile_geom::Vec3;
use navtile_tile::{Poly, TilePayload, TileView};

use crate::refs::{PolyRef, ReferenceBudget, TileRef};
use crate::MeshError;

/// Placement and capacity of a multi-tile mesh.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NavMeshParams {
    pub origin: [f32; 3],
    pub tile_width: f32,
    pub tile_height: f32,
    pub max_tiles: i32,
    pub max_polys: i32,
}

impl NavMeshParams {
    pub fn from_budget(origin: [f32; 3], tile_width: f32, tile_height: f32, budget: ReferenceBudget) -> Self {
        Self {
            origin,
            tile_width,
            tile_height,
            max_tiles: budget.max_tiles() as i32,
            max_polys: budget.max_polys_per_tile() as i32,
        }
    }
}

/// Who owns tile bytes. Fixed for the lifetime of a mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageMode {
    /// Payloads produced by a build.
    EngineOwned,
    /// Payloads copied out of a container.
    HeapOwned,
    /// Tiles are ranges of one memory-mapped container.
    Mapped,
}

enum Storage {
    EngineOwned,
    HeapOwned,
    Mapped(MmapMut),
}

enum TileData {
    Owned(TilePayload),
    Mapped(Range<usize>),
}

struct Slot {
    salt: u32,
    coord: (i32, i32, i32),
    data: Option<TileData>,
    next_free: Option<usize>,
}

/// One occupied tile.
#[derive(Clone, Copy, Debug)]
pub struct MeshTile<'a> {
    pub tile_ref: TileRef,
    pub view: TileView<'a>,
    bytes: &'a [u8],
}

impl<'a> MeshTile<'a> {
    /// Raw payload bytes, as written to a container.
    #[inline]
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    #[inline]
    pub fn coord(&self) -> (i32, i32, i32) {
        let h = self.view.header;
        (h.x, h.y, h.layer)
    }
}

/// Tiles addressed by grid coordinate and by salted reference.
pub struct NavMesh {
    params: NavMeshParams,
    budget: ReferenceBudget,
    storage: Storage,
    slots: Vec<Slot>,
    free_head: Option<usize>,
    lookup: HashMap<(i32, i32, i32), usize>,
}

impl std::fmt::Debug for NavMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavMesh")
            .field("params", &self.params)
            .field("storage", &self.storage_mode())
            .field("tiles", &self.tile_count())
            .finish()
    }
}

impl NavMesh {
    /// Empty mesh for tiles produced by a build.
    pub fn new(params: NavMeshParams) -> Result<Self, MeshError> {
        Self::init(params, Storage::EngineOwned)
    }

    /// Empty mesh for tiles copied out of a container.
    pub fn with_heap_storage(params: NavMeshParams) -> Result<Self, MeshError> {
        Self::init(params, Storage::HeapOwned)
    }

    /// Empty mesh whose tiles live in `map`. The mapping is released when the
    /// mesh is dropped.
    pub fn with_mapping(params: NavMeshParams, map: MmapMut) -> Result<Self, MeshError> {
        Self::init(params, Storage::Mapped(map))
    }

    fn init(params: NavMeshParams, storage: Storage) -> Result<Self, MeshError> {
        if !params.origin.iter().all(|c| c.is_finite()) {
            return Err(MeshError::InvalidParams("origin must be finite"));
        }
        if !(params.tile_width > 0.0 && params.tile_height > 0.0) {
            return Err(MeshError::InvalidParams("tile dimensions must be positive"));
        }
        if params.max_tiles <= 0 || params.max_polys <= 0 {
            return Err(MeshError::InvalidParams("tile and polygon capacity must be positive"));
        }
        let budget = ReferenceBudget::from_capacity(params.max_tiles as u32, params.max_polys as u32)?;
        let n = params.max_tiles as usize;
        let slots = (0..n)
            .map(|i| Slot {
                salt: 1,
                coord: (0, 0, 0),
                data: None,
                next_free: (i + 1 < n).then_some(i + 1),
            })
            .collect();
        Ok(Self {
            params,
            budget,
            storage,
            slots,
            free_head: (n > 0).then_some(0),
            lookup: HashMap::new(),
        })
    }

    #[inline]
    pub fn params(&self) -> &NavMeshParams {
        &self.params
    }

    #[inline]
    pub fn budget(&self) -> ReferenceBudget {
        self.budget
    }

    pub fn storage_mode(&self) -> StorageMode {
        match self.storage {
            Storage::EngineOwned => StorageMode::EngineOwned,
            Storage::HeapOwned => StorageMode::HeapOwned,
            Storage::Mapped(_) => StorageMode::Mapped,
        }
    }

    #[inline]
    pub fn tile_count(&self) -> usize {
        self.lookup.len()
    }

    #[inline]
    pub fn max_tiles(&self) -> usize {
        self.slots.len()
    }

    fn data_bytes<'a>(&'a self, data: &'a TileData) -> &'a [u8] {
        match (data, &self.storage) {
            (TileData::Owned(p), _) => p.as_bytes(),
            (TileData::Mapped(r), Storage::Mapped(map)) => map.get(r.clone()).unwrap_or(&[]),
            (TileData::Mapped(_), _) => &[],
        }
    }

    fn tile_in_slot(&self, index: usize) -> Option<MeshTile<'_>> {
        let slot = self.slots.get(index)?;
        let bytes = self.data_bytes(slot.data.as_ref()?);
        let view = TileView::sections(bytes).ok()?;
        Some(MeshTile {
            tile_ref: self.budget.tile_ref(slot.salt, index as u32),
            view,
            bytes,
        })
    }

    /// Checks a payload and returns its coordinate.
    fn check_payload(&self, bytes: &[u8]) -> Result<(i32, i32, i32), MeshError> {
        let view = TileView::parse(bytes)?;
        let max = self.budget.max_polys_per_tile();
        if view.poly_count() > max as usize {
            return Err(MeshError::PolygonBudgetExceeded { polys: view.poly_count(), max });
        }
        let h = view.header;
        Ok((h.x, h.y, h.layer))
    }

    fn check_owned(&self) -> Result<(), MeshError> {
        match self.storage {
            Storage::Mapped(_) => Err(MeshError::StorageMismatch),
            _ => Ok(()),
        }
    }

    /// Takes a slot out of the free list: the head, or the slot `last_ref`
    /// names.
    fn claim_slot(&mut self, last_ref: Option<TileRef>) -> Result<usize, MeshError> {
        let Some(r) = last_ref else {
            let index = self.free_head.ok_or(MeshError::CapacityExceeded {
                max_tiles: self.slots.len() as u32,
            })?;
            self.free_head = self.slots[index].next_free.take();
            return Ok(index);
        };

        let (salt, tile, poly) = self.budget.decode(r.0);
        let index = tile as usize;
        if r.is_null() || !self.budget.fits(r.0) || salt == 0 || poly != 0 || index >= self.slots.len() {
            return Err(MeshError::InvalidReference(r.0));
        }
        if self.slots[index].data.is_some() {
            return Err(MeshError::InvalidReference(r.0));
        }
        let mut prev: Option<usize> = None;
        let mut cur = self.free_head;
        while let Some(i) = cur {
            if i == index {
                let next = self.slots[i].next_free.take();
                match prev {
                    Some(p) => self.slots[p].next_free = next,
                    None => self.free_head = next,
                }
                break;
            }
            prev = cur;
            cur = self.slots[i].next_free;
        }
        self.slots[index].salt = salt;
        Ok(index)
    }

    fn insert(
        &mut self,
        coord: (i32, i32, i32),
        data: TileData,
        last_ref: Option<TileRef>,
    ) -> Result<TileRef, MeshError> {
        if self.lookup.contains_key(&coord) {
            return Err(MeshError::AlreadyOccupied { x: coord.0, y: coord.1, layer: coord.2 });
        }
        let index = self.claim_slot(last_ref)?;
        let slot = &mut self.slots[index];
        slot.coord = coord;
        slot.data = Some(data);
        let tile_ref = self.budget.tile_ref(slot.salt, index as u32);
        self.lookup.insert(coord, index);
        log::debug!("added tile {coord:?} in slot {index} as {:#x}", tile_ref.0);
        Ok(tile_ref)
    }

    /// Adds a payload at the coordinate in its header. Fails if that
    /// coordinate is occupied.
    pub fn add_tile(&mut self, payload: TilePayload) -> Result<TileRef, MeshError> {
        self.check_owned()?;
        let coord = self.check_payload(payload.as_bytes())?;
        self.insert(coord, TileData::Owned(payload), None)
    }

    /// Adds a payload in the slot and generation named by `last_ref`, so
    /// references minted before an export stay valid.
    pub fn add_tile_with_ref(&mut self, payload: TilePayload, last_ref: TileRef) -> Result<TileRef, MeshError> {
        self.check_owned()?;
        let coord = self.check_payload(payload.as_bytes())?;
        self.insert(coord, TileData::Owned(payload), Some(last_ref))
    }

    /// Puts `payload` at `(x, y, layer)`, removing any tile already there.
    /// The payload is fully checked before the old tile is touched.
    pub fn add_or_replace_tile(
        &mut self,
        x: i32,
        y: i32,
        layer: i32,
        payload: TilePayload,
    ) -> Result<TileRef, MeshError> {
        self.check_owned()?;
        let found = self.check_payload(payload.as_bytes())?;
        let expected = (x, y, layer);
        if found != expected {
            return Err(MeshError::CoordinateMismatch { expected, found });
        }
        if let Some(old) = self.tile_ref_at(x, y, layer) {
            self.remove_tile(old)?;
        }
        self.insert(expected, TileData::Owned(payload), None)
    }

    /// Adds the tile stored at `range` of the mapped container.
    pub fn add_mapped_tile(&mut self, range: Range<usize>, last_ref: Option<TileRef>) -> Result<TileRef, MeshError> {
        let Storage::Mapped(map) = &self.storage else {
            return Err(MeshError::StorageMismatch);
        };
        let bytes = map
            .get(range.clone())
            .ok_or(MeshError::InvalidParams("tile range lies outside the mapping"))?;
        let coord = self.check_payload(bytes)?;
        self.insert(coord, TileData::Mapped(range), last_ref)
    }

    /// Frees the tile `tile_ref` names and invalidates every reference into it.
    /// Returns the payload for owned storage.
    pub fn remove_tile(&mut self, tile_ref: TileRef) -> Result<Option<TilePayload>, MeshError> {
        let index = self
            .resolve(tile_ref.0)
            .ok_or(MeshError::InvalidReference(tile_ref.0))?;
        let next_salt = self.budget.next_salt(self.slots[index].salt);
        let slot = &mut self.slots[index];
        let data = slot.data.take();
        self.lookup.remove(&slot.coord);
        slot.salt = next_salt;
        slot.next_free = self.free_head;
        self.free_head = Some(index);
        log::debug!("removed tile {:?} from slot {index}", slot.coord);
        Ok(match data {
            Some(TileData::Owned(p)) => Some(p),
            _ => None,
        })
    }

    /// Slot index of the live tile a reference points into.
    fn resolve(&self, r: u64) -> Option<usize> {
        if r == 0 || !self.budget.fits(r) {
            return None;
        }
        let (salt, tile, _) = self.budget.decode(r);
        let slot = self.slots.get(tile as usize)?;
        (slot.data.is_some() && slot.salt == salt).then_some(tile as usize)
    }

    pub fn tile_ref_at(&self, x: i32, y: i32, layer: i32) -> Option<TileRef> {
        let &index = self.lookup.get(&(x, y, layer))?;
        Some(self.budget.tile_ref(self.slots[index].salt, index as u32))
    }

    pub fn tile_at(&self, x: i32, y: i32, layer: i32) -> Option<MeshTile<'_>> {
        let &index = self.lookup.get(&(x, y, layer))?;
        self.tile_in_slot(index)
    }

    pub fn tile(&self, tile_ref: TileRef) -> Option<MeshTile<'_>> {
        let (_, _, poly) = self.budget.decode(tile_ref.0);
        if poly != 0 {
            return None;
        }
        self.tile_in_slot(self.resolve(tile_ref.0)?)
    }

    /// Occupied tiles in slot order.
    pub fn tiles(&self) -> impl Iterator<Item = MeshTile<'_>> + '_ {
        (0..self.slots.len()).filter_map(move |i| self.tile_in_slot(i))
    }

    /// Reference of polygon `index` in the tile `tile_ref`.
    #[inline]
    pub fn poly_ref(&self, tile_ref: TileRef, index: u32) -> PolyRef {
        let (salt, tile, _) = self.budget.decode(tile_ref.0);
        self.budget.encode(salt, tile, index)
    }

    /// The polygon `r` names, or `None` once its tile was removed or replaced.
    pub fn lookup_polygon(&self, r: PolyRef) -> Option<(MeshTile<'_>, &Poly)> {
        let tile = self.tile_in_slot(self.resolve(r.0)?)?;
        let (_, _, poly) = self.budget.decode(r.0);
        let p = tile.view.polys.get(poly as usize)?;
        Some((tile, p))
    }

    #[inline]
    pub fn is_valid_poly_ref(&self, r: PolyRef) -> bool {
        self.lookup_polygon(r).is_some()
    }

    /// Tile grid cell containing `pos`.
    pub fn calc_tile_loc(&self, pos: Vec3) -> (i32, i32) {
        let o = self.params.origin;
        (
            ((pos.x - o[0]) / self.params.tile_width).floor() as i32,
            ((pos.z - o[2]) / self.params.tile_height).floor() as i32,
        )
    }

    pub fn tile_at_position(&self, pos: Vec3) -> Option<MeshTile<'_>> {
        let (x, y) = self.calc_tile_loc(pos);
        self.tile_at(x, y, 0)
    }

    /// Ground polygon under `pos` whose surface is closest to `pos.y`, if
    /// within `max_dy`.
    pub fn find_poly_at(&self, pos: Vec3, max_dy: f32) -> Option<PolyRef> {
        let tile = self.tile_at_position(pos)?;
        let view = tile.view;
        let p = pos.to_array();
        let mut best: Option<(f32, usize)> = None;
        for (i, poly) in view.ground_polys().iter().enumerate() {
            let verts: Vec<[f32; 3]> = (0..usize::from(poly.vert_count)).map(|k| view.poly_vertex(poly, k)).collect();
            if !point_in_poly_xz(&verts, p) {
                continue;
            }
            let h = view
                .detail_triangles(i)
                .find_map(|t| height_on_triangle(&t, p))
                .unwrap_or_else(|| verts.iter().map(|v| v[1]).sum::<f32>() / verts.len() as f32);
            let dy = (h - pos.y).abs();
            if dy <= max_dy && best.is_none_or(|(d, _)| dy < d) {
                best = Some((dy, i));
            }
        }
        best.map(|(_, i)| self.poly_ref(tile.tile_ref, i as u32))
    }
}

/// Height of triangle `t` at `p` on the XZ plane, if `p` lies inside it.
fn height_on_triangle(t: &[[f32; 3]; 3], p: [f32; 3]) -> Option<f32> {
    let [a, b, c] = *t;
    let v0 = [c[0] - a[0], c[2] - a[2]];
    let v1 = [b[0] - a[0], b[2] - a[2]];
    let v2 = [p[0] - a[0], p[2] - a[2]];
    let denom = v0[0] * v1[1] - v0[1] * v1[0];
    if denom.abs() < 1e-12 {
        return None;
    }
    let u = (v1[1] * v2[0] - v1[0] * v2[1]) / denom;
    let v = (v0[0] * v2[1] - v0[1] * v2[0]) / denom;
    const EPS: f32 = 1e-4;
    (u >= -EPS && v >= -EPS && u + v <= 1.0 + EPS).then(|| a[1] + (c[1] - a[1]) * u + (b[1] - a[1]) * v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_height_interpolates() {
        let t = [[0.0, 0.0, 0.0], [0.0, 2.0, 2.0], [2.0, 4.0, 0.0]];
        let h = height_on_triangle(&t, [1.0, 0.0, 0.5]).unwrap();
        assert!((h - 2.5).abs() < 1e-5);
        assert!(height_on_triangle(&t, [2.0, 0.0, 2.0]).is_none());
    }

    #[test]
    fn params_validation() {
        let ok = NavMeshParams { origin: [0.0; 3], tile_width: 1.0, tile_height: 1.0, max_tiles: 4, max_polys: 64 };
        assert!(NavMesh::new(ok).is_ok());
        assert!(NavMesh::new(NavMeshParams { tile_width: 0.0, ..ok }).is_err());
        assert!(NavMesh::new(NavMeshParams { max_tiles: 0, ..ok }).is_err());
        assert!(NavMesh::new(NavMeshParams { origin: [f32::NAN, 0.0, 0.0], ..ok }).is_err());
        assert!(NavMesh::new(NavMeshParams { max_polys: 1 << 21, ..ok }).is_err());
    }
}
