use bytemuck::Pod;

use crate::layout::{OffMeshConnection, Poly, PolyDetail, PolyType, TileHeader};
use crate::{MAX_VERTS_PER_POLY, TILE_MAGIC, TILE_VERSION, TileDataError};

/// Validated, borrowed sections of one tile payload.
#[derive(Clone, Copy, Debug)]
pub struct TileView<'a> {
    pub header: &'a TileHeader,
    pub verts: &'a [[f32; 3]],
    pub polys: &'a [Poly],
    pub detail_meshes: &'a [PolyDetail],
    pub detail_verts: &'a [[f32; 3]],
    pub detail_tris: &'a [[u8; 4]],
    pub off_mesh_cons: &'a [OffMeshConnection],
}

#[inline]
pub(crate) const fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// Byte size of each section for the counts in `h`, in layout order.
pub(crate) fn section_sizes(h: &TileHeader) -> Option<[usize; 7]> {
    let n = |c: u32, size: usize| (c as usize).checked_mul(size).map(align4);
    Some([
        size_of::<TileHeader>(),
        n(h.vert_count, 12)?,
        n(h.poly_count, size_of::<Poly>())?,
        n(h.detail_mesh_count, size_of::<PolyDetail>())?,
        n(h.detail_vert_count, 12)?,
        n(h.detail_tri_count, 4)?,
        n(h.off_mesh_con_count, size_of::<OffMeshConnection>())?,
    ])
}

struct Cursor<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> Cursor<'a> {
    fn take<T: Pod>(&mut self, count: u32) -> Result<&'a [T], TileDataError> {
        let len = count as usize * size_of::<T>();
        let section = self.bytes.get(self.at..self.at + len).ok_or(TileDataError::Truncated {
            needed: self.at + len,
            actual: self.bytes.len(),
        })?;
        self.at = align4(self.at + len);
        bytemuck::try_cast_slice(section).map_err(|_| TileDataError::Misaligned)
    }
}

impl<'a> TileView<'a> {
    /// Borrows and fully validates a payload.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, TileDataError> {
        let view = Self::sections(bytes)?;
        view.validate()?;
        Ok(view)
    }

    /// Borrows the sections of a payload that already passed [`TileView::parse`],
    /// checking only the header and section sizes.
    pub fn sections(bytes: &'a [u8]) -> Result<Self, TileDataError> {
        if bytes.as_ptr() as usize % 4 != 0 {
            return Err(TileDataError::Misaligned);
        }
        let header_len = size_of::<TileHeader>();
        let head = bytes.get(..header_len).ok_or(TileDataError::Truncated {
            needed: header_len,
            actual: bytes.len(),
        })?;
        let header: &TileHeader =
            bytemuck::try_from_bytes(head).map_err(|_| TileDataError::Misaligned)?;
        if header.magic != TILE_MAGIC {
            return Err(TileDataError::BadMagic(header.magic));
        }
        if header.version != TILE_VERSION {
            return Err(TileDataError::BadVersion(header.version));
        }
        let expected = section_sizes(header)
            .and_then(|s| s.iter().try_fold(0usize, |acc, &n| acc.checked_add(n)))
            .ok_or(TileDataError::InvalidParams("section sizes overflow"))?;
        if bytes.len() < expected {
            return Err(TileDataError::Truncated { needed: expected, actual: bytes.len() });
        }
        if bytes.len() != expected {
            return Err(TileDataError::SizeMismatch { expected, actual: bytes.len() });
        }

        let mut cur = Cursor { bytes, at: header_len };
        let view = TileView {
            header,
            verts: cur.take(header.vert_count)?,
            polys: cur.take(header.poly_count)?,
            detail_meshes: cur.take(header.detail_mesh_count)?,
            detail_verts: cur.take(header.detail_vert_count)?,
            detail_tris: cur.take(header.detail_tri_count)?,
            off_mesh_cons: cur.take(header.off_mesh_con_count)?,
        };
        Ok(view)
    }

    fn validate(&self) -> Result<(), TileDataError> {
        let h = self.header;
        let base = h.off_mesh_base as usize;
        if base > self.polys.len() || base + self.off_mesh_cons.len() != self.polys.len() {
            return Err(TileDataError::InvalidParams("off-mesh polygons do not follow ground polygons"));
        }
        if self.detail_meshes.len() != base {
            return Err(TileDataError::InvalidParams("detail mesh count differs from ground polygon count"));
        }

        for (index, p) in self.polys.iter().enumerate() {
            let vc = usize::from(p.vert_count);
            let min = match p.poly_type() {
                PolyType::Ground => 3,
                PolyType::OffMeshConnection => 2,
            };
            let ground = index < base;
            let bad = vc < min
                || vc > MAX_VERTS_PER_POLY
                || ground != (p.poly_type() == PolyType::Ground)
                || p.vertex_indices().iter().any(|&v| usize::from(v) >= self.verts.len())
                || p.neis.iter().any(|&n| usize::from(n) > self.polys.len());
            if bad {
                return Err(TileDataError::InvalidPolygon { index });
            }
        }

        for (index, (pd, p)) in self.detail_meshes.iter().zip(self.polys).enumerate() {
            let verts_end = pd.vert_base as usize + usize::from(pd.vert_count);
            let tris_end = pd.tri_base as usize + usize::from(pd.tri_count);
            let local = usize::from(p.vert_count) + usize::from(pd.vert_count);
            let ok = verts_end <= self.detail_verts.len()
                && tris_end <= self.detail_tris.len()
                && self.detail_tris[pd.tri_base as usize..tris_end]
                    .iter()
                    .all(|t| t[..3].iter().all(|&i| usize::from(i) < local));
            if !ok {
                return Err(TileDataError::InvalidDetail { index });
            }
        }

        for (k, con) in self.off_mesh_cons.iter().enumerate() {
            if usize::from(con.poly) != base + k {
                return Err(TileDataError::InvalidPolygon { index: base + k });
            }
        }
        Ok(())
    }

    #[inline]
    pub fn poly_count(&self) -> usize {
        self.polys.len()
    }

    #[inline]
    pub fn ground_polys(&self) -> &'a [Poly] {
        &self.polys[..self.header.off_mesh_base as usize]
    }

    /// World position of vertex `k` of `poly`.
    #[inline]
    pub fn poly_vertex(&self, poly: &Poly, k: usize) -> [f32; 3] {
        self.verts[usize::from(poly.verts[k])]
    }

    /// Detail triangles of ground polygon `p` as world positions.
    pub fn detail_triangles(&self, p: usize) -> impl Iterator<Item = [[f32; 3]; 3]> + '_ {
        let poly = &self.polys[p];
        let pd = self.detail_meshes[p];
        let nv = usize::from(poly.vert_count);
        let tris = &self.detail_tris[pd.tri_base as usize..pd.tri_base as usize + usize::from(pd.tri_count)];
        tris.iter().map(move |t| {
            let at = |i: u8| {
                let i = usize::from(i);
                if i < nv {
                    self.poly_vertex(poly, i)
                } else {
                    self.detail_verts[pd.vert_base as usize + i - nv]
                }
            };
            [at(t[0]), at(t[1]), at(t[2])]
        })
    }
}
