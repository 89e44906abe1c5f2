//! Multi-tile navigation mesh: reference budget, tile assembly and geometry
//! extraction.
#![forbid(unsafe_code)]

mod extract;
mod mesh;
mod refs;

pub use extract::{ExtractedGeometry, extract_mesh_geometry, extract_tile_geometry, extract_view};
pub use mesh::{MeshTile, NavMesh, NavMeshParams, StorageMode};
pub use refs::{MAX_TILE_BITS, PolyRef, REF_BITS, ReferenceBudget, TileRef};

use navtile_tile::TileDataError;

#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("invalid mesh parameters: {0}")]
    InvalidParams(&'static str),
    #[error("all {max_tiles} tile slots are in use")]
    CapacityExceeded { max_tiles: u32 },
    #[error("tile has {polys} polygons but the budget allows {max}")]
    PolygonBudgetExceeded { polys: usize, max: u32 },
    #[error("corrupt tile payload: {0}")]
    CorruptPayload(#[from] TileDataError),
    #[error("tile slot ({x}, {y}, layer {layer}) is already occupied")]
    AlreadyOccupied { x: i32, y: i32, layer: i32 },
    #[error("tile storage does not match the mesh storage mode")]
    StorageMismatch,
    #[error("reference {0:#x} does not name a live tile")]
    InvalidReference(u64),
    #[error("payload is for tile {found:?} but was added at {expected:?}")]
    CoordinateMismatch {
        expected: (i32, i32, i32),
        found: (i32, i32, i32),
    },
}
