//! Binary container for multi-tile meshes.
//!
//! Layout, little-endian:
//!
//! ```text
//! u32 magic 'MSET' | u32 version | i32 tile_count
//! f32 origin[3] | f32 tile_width | f32 tile_height | i32 max_tiles | i32 max_polys
//! tile_count x { u64 tile_ref | i32 size | size bytes of tile data }
//! ```
//!
//! Tile data is stored as produced by the tile writer. Records keep the
//! reference each tile had at export, so polygon references saved earlier
//! resolve after a reload.

mod container;

pub use container::{
    ContainerHeader, export, import_bytes, load_from_path, map_from_path, read_header, save_to_path,
};

/// `'MSET'`.
pub const SET_MAGIC: u32 = 0x4D53_4554;
pub const SET_VERSION: u32 = 1;
/// Bytes before the first tile record.
pub const HEADER_SIZE: usize = 40;
/// Bytes of a record before its tile data.
pub const RECORD_HEADER_SIZE: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("not a mesh container (magic {magic:#010x}, version {version})")]
    FormatMismatch { magic: u32, version: u32 },
    #[error("corrupt container: {0}")]
    CorruptPayload(String),
    #[error(transparent)]
    Mesh(#[from] navtile_mesh::MeshError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
