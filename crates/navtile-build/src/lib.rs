//! Tiled build pipeline: configuration, grid planning, per-tile meshing and
//! assembly into a multi-tile mesh.
#![forbid(unsafe_code)]

mod build;
mod config;
mod grid;
mod tile_builder;

pub use build::{BuildReport, build_bounds, build_navmesh, plan_build, rebuild_tile};
pub use config::{BoundsConfig, BuildConfig, FilterConfig, RasterConfig, load_config_from_path};
pub use grid::{GridPlan, MAX_GRID_CELLS, plan_grid};
pub use tile_builder::{
    BuildInput, BuildStage, GROUND_AREA, TileBuildError, TileOutcome, WALKABLE_FLAG, build_tile,
};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("allocation failed: {0}")]
    AllocationFailure(String),
    #[error("no tile was built; last stage to fail or come up empty: {stage}")]
    TileBuildFailure { stage: BuildStage },
    #[error(transparent)]
    Tile(#[from] TileBuildError),
    #[error(transparent)]
    Mesh(#[from] navtile_mesh::MeshError),
}
