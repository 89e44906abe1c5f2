//! Per-tile voxelization and polygon meshing.
//!
//! The pipeline runs heightfield -> compact heightfield -> regions ->
//! contours -> polygon mesh -> detail mesh, one tile at a time. Every stage
//! works in voxel coordinates relative to the heightfield origin.
#![forbid(unsafe_code)]

mod area;
mod compact;
mod contour;
mod detail;
mod filter;
mod heightfield;
mod poly_mesh;
mod region;

pub use area::{area_marking_tolerance, erode_walkable_area, mark_convex_poly_area, point_in_poly_xz};
pub use compact::{CompactCell, CompactHeightfield, CompactSpan, NOT_CONNECTED};
pub use contour::{Contour, ContourSet, build_contours};
pub use detail::{DetailMesh, build_detail_mesh};
pub use filter::{
    filter_ledge_spans, filter_low_hanging_walkable_obstacles, filter_walkable_low_height_spans,
    mark_walkable_triangles,
};
pub use heightfield::{Heightfield, SPAN_MAX_HEIGHT, Span, rasterize_triangles};
pub use poly_mesh::{PolyMesh, build_poly_mesh};
pub use region::{PartitionStyle, partition_regions};

/// Area code of unwalkable spans and polygons.
pub const NULL_AREA: u8 = 0;
/// Generic walkable area assigned during rasterization.
pub const WALKABLE_AREA: u8 = 63;
/// Unused slot in polygon vertex and neighbour arrays.
pub const MESH_NULL_IDX: u16 = 0xffff;
/// Largest polygon the runtime tile format can store.
pub const MAX_VERTS_PER_POLY: usize = 6;

// Neighbour offsets per direction: -x, +z, +x, -z.
pub(crate) const DIR_OFFSET_X: [i32; 4] = [-1, 0, 1, 0];
pub(crate) const DIR_OFFSET_Z: [i32; 4] = [0, 1, 0, -1];

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("heightfield of {width}x{height} columns exceeds the allocation limit")]
    HeightfieldTooLarge { width: usize, height: usize },
    #[error("triangle {index} references a vertex outside the vertex array")]
    InvalidTriangle { index: usize },
    #[error("polygon mesh needs more than {max} vertices")]
    TooManyVertices { max: usize },
    #[error("polygon mesh needs more than {max} polygons")]
    TooManyPolygons { max: usize },
    #[error("region partition produced more than {max} regions")]
    TooManyRegions { max: usize },
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
}
