use bytemuck::{Pod, Zeroable};

use crate::MAX_VERTS_PER_POLY;

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct TileHeader {
    pub magic: u32,
    pub version: u32,
    pub x: i32,
    pub y: i32,
    pub layer: i32,
    pub user_id: u32,
    pub poly_count: u32,
    pub vert_count: u32,
    pub detail_mesh_count: u32,
    pub detail_vert_count: u32,
    pub detail_tri_count: u32,
    pub off_mesh_con_count: u32,
    /// Index of the first off-mesh polygon; ground polygons come before it.
    pub off_mesh_base: u32,
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolyType {
    Ground,
    OffMeshConnection,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Poly {
    pub verts: [u16; MAX_VERTS_PER_POLY],
    /// 0 for no neighbour, otherwise neighbour index + 1.
    pub neis: [u16; MAX_VERTS_PER_POLY],
    pub flags: u16,
    pub vert_count: u8,
    /// Area code in the low 6 bits, [`PolyType`] in the top 2.
    pub area_and_type: u8,
}

impl Poly {
    #[inline]
    pub fn area(&self) -> u8 {
        self.area_and_type & 0x3f
    }

    #[inline]
    pub fn set_area(&mut self, area: u8) {
        self.area_and_type = (self.area_and_type & 0xc0) | (area & 0x3f);
    }

    #[inline]
    pub fn poly_type(&self) -> PolyType {
        if self.area_and_type >> 6 == 1 { PolyType::OffMeshConnection } else { PolyType::Ground }
    }

    #[inline]
    pub fn set_type(&mut self, t: PolyType) {
        let bits = match t {
            PolyType::Ground => 0,
            PolyType::OffMeshConnection => 1,
        };
        self.area_and_type = (self.area_and_type & 0x3f) | (bits << 6);
    }

    #[inline]
    pub fn vertex_indices(&self) -> &[u16] {
        &self.verts[..usize::from(self.vert_count).min(MAX_VERTS_PER_POLY)]
    }

    /// Neighbour polygon across edge `e`.
    #[inline]
    pub fn neighbour(&self, e: usize) -> Option<usize> {
        match self.neis[e] {
            0 => None,
            n => Some(usize::from(n) - 1),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct PolyDetail {
    /// First vertex in the detail vertex section; the polygon's own vertices
    /// are not repeated there.
    pub vert_base: u32,
    pub tri_base: u32,
    pub vert_count: u8,
    pub tri_count: u8,
    pub pad: [u8; 2],
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct OffMeshConnection {
    /// Start then end point.
    pub pos: [f32; 6],
    pub rad: f32,
    /// Index of the connection's polygon within the tile.
    pub poly: u16,
    pub flags: u8,
    /// Tile side of the end point; 0xff when it lies in this tile.
    pub side: u8,
    pub user_id: u32,
}
