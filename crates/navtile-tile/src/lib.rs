//! Runtime tile payloads.
//!
//! A payload is one contiguous, native-endian byte buffer: a [`TileHeader`]
//! followed by vertex, polygon, detail and off-mesh sections, each starting on a
//! 4-byte boundary. [`TileView`] borrows the sections in place.

mod create;
mod layout;
mod payload;
mod view;

pub use create::{OffMeshLink, TileCreateParams, create_tile_data};
pub use layout::{OffMeshConnection, Poly, PolyDetail, PolyType, TileHeader};
pub use payload::TilePayload;
pub use view::TileView;

pub use navtile_engine::MAX_VERTS_PER_POLY;

/// `'NAVT'`.
pub const TILE_MAGIC: u32 = u32::from_be_bytes(*b"NAVT");
pub const TILE_VERSION: u32 = 1;

/// Off-mesh connection usable in both directions.
pub const OFF_MESH_BIDIRECTIONAL: u8 = 1;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TileDataError {
    #[error("bad tile magic {0:#010x}")]
    BadMagic(u32),
    #[error("unsupported tile version {0}")]
    BadVersion(u32),
    #[error("tile data truncated: need {needed} bytes, have {actual}")]
    Truncated { needed: usize, actual: usize },
    #[error("tile data is {actual} bytes but its sections need {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("tile data is not 4-byte aligned")]
    Misaligned,
    #[error("polygon {index} is malformed")]
    InvalidPolygon { index: usize },
    #[error("detail mesh of polygon {index} is malformed")]
    InvalidDetail { index: usize },
    #[error("polygons of {count} vertices exceed the tile limit")]
    TooManyVerts { count: usize },
    #[error("invalid tile parameters: {0}")]
    InvalidParams(&'static str),
}
