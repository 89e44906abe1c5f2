use std::path::Path;

use navtile_engine::PartitionStyle;
use navtile_geom::{Aabb, Vec3};
use serde::Deserialize;

use crate::BuildError;

/// User-facing build settings, in world units unless noted.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct BuildConfig {
    #[serde(default = "default_cell_size")]
    pub cell_size: f32,
    #[serde(default = "default_cell_height")]
    pub cell_height: f32,
    /// Tile edge in cells; 0 builds one tile over the whole grid.
    #[serde(default = "default_tile_size")]
    pub tile_size: i32,
    #[serde(default = "default_agent_height")]
    pub agent_height: f32,
    #[serde(default = "default_agent_radius")]
    pub agent_radius: f32,
    #[serde(default = "default_agent_max_climb")]
    pub agent_max_climb: f32,
    /// Degrees.
    #[serde(default = "default_agent_max_slope")]
    pub agent_max_slope: f32,
    /// Cells per side.
    #[serde(default = "default_region_min_size")]
    pub region_min_size: i32,
    #[serde(default = "default_region_merge_size")]
    pub region_merge_size: i32,
    #[serde(default = "default_edge_max_len")]
    pub edge_max_len: f32,
    #[serde(default = "default_edge_max_error")]
    pub edge_max_error: f32,
    #[serde(default = "default_verts_per_poly")]
    pub verts_per_poly: usize,
    #[serde(default = "default_detail_sample_dist")]
    pub detail_sample_dist: f32,
    #[serde(default = "default_detail_sample_max_error")]
    pub detail_sample_max_error: f32,
    #[serde(default)]
    pub partition: PartitionStyle,
    #[serde(default)]
    pub filters: FilterConfig,
    /// Replaces the bounds derived from the input geometry.
    #[serde(default)]
    pub bounds: Option<BoundsConfig>,
    /// 0 builds tiles on the calling thread.
    #[serde(default)]
    pub worker_threads: usize,
}

fn default_cell_size() -> f32 {
    0.3
}

fn default_cell_height() -> f32 {
    0.2
}

fn default_tile_size() -> i32 {
    48
}

fn default_agent_height() -> f32 {
    2.0
}

fn default_agent_radius() -> f32 {
    0.6
}

fn default_agent_max_climb() -> f32 {
    0.9
}

fn default_agent_max_slope() -> f32 {
    45.0
}

fn default_region_min_size() -> i32 {
    8
}

fn default_region_merge_size() -> i32 {
    20
}

fn default_edge_max_len() -> f32 {
    12.0
}

fn default_edge_max_error() -> f32 {
    1.3
}

fn default_verts_per_poly() -> usize {
    6
}

fn default_detail_sample_dist() -> f32 {
    6.0
}

fn default_detail_sample_max_error() -> f32 {
    1.0
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            cell_size: default_cell_size(),
            cell_height: default_cell_height(),
            tile_size: default_tile_size(),
            agent_height: default_agent_height(),
            agent_radius: default_agent_radius(),
            agent_max_climb: default_agent_max_climb(),
            agent_max_slope: default_agent_max_slope(),
            region_min_size: default_region_min_size(),
            region_merge_size: default_region_merge_size(),
            edge_max_len: default_edge_max_len(),
            edge_max_error: default_edge_max_error(),
            verts_per_poly: default_verts_per_poly(),
            detail_sample_dist: default_detail_sample_dist(),
            detail_sample_max_error: default_detail_sample_max_error(),
            partition: PartitionStyle::default(),
            filters: FilterConfig::default(),
            bounds: None,
            worker_threads: 0,
        }
    }
}

/// Heightfield filters applied after rasterization.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub struct FilterConfig {
    #[serde(default = "enabled")]
    pub low_hanging_obstacles: bool,
    #[serde(default = "enabled")]
    pub ledge_spans: bool,
    #[serde(default = "enabled")]
    pub walkable_low_height_spans: bool,
}

fn enabled() -> bool {
    true
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self { low_hanging_obstacles: true, ledge_spans: true, walkable_low_height_spans: true }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub struct BoundsConfig {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl From<BoundsConfig> for Aabb {
    fn from(b: BoundsConfig) -> Self {
        Aabb::new(Vec3::from_array(b.min), Vec3::from_array(b.max))
    }
}

/// Settings converted to voxel units, computed once per build.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterConfig {
    pub cs: f32,
    pub ch: f32,
    pub walkable_slope: f32,
    pub walkable_height: i32,
    pub walkable_climb: i32,
    pub walkable_radius: i32,
    pub max_edge_len: i32,
    pub max_simplification_error: f32,
    pub min_region_area: i32,
    pub merge_region_area: i32,
    pub max_verts_per_poly: usize,
    pub detail_sample_dist: f32,
    pub detail_sample_max_error: f32,
    /// Cells added around each tile on X and Z.
    pub border_size: i32,
}

impl BuildConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, BuildError> {
        let cfg: BuildConfig =
            toml::from_str(s).map_err(|e| BuildError::InvalidConfiguration(format!("parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        let bad = |msg: &str| Err(BuildError::InvalidConfiguration(msg.to_string()));
        if !(self.cell_size > 0.0 && self.cell_height > 0.0) {
            return bad("cell size and cell height must be positive");
        }
        if self.tile_size < 0 {
            return bad("tile size must not be negative");
        }
        if !(3..=navtile_engine::MAX_VERTS_PER_POLY).contains(&self.verts_per_poly) {
            return bad("verts_per_poly must be in 3..=6");
        }
        let agent = [self.agent_height, self.agent_radius, self.agent_max_climb];
        if agent.iter().any(|v| !(*v >= 0.0)) {
            return bad("agent dimensions must not be negative");
        }
        if !(0.0..=90.0).contains(&self.agent_max_slope) {
            return bad("agent_max_slope must be within 0..=90 degrees");
        }
        if self.region_min_size < 0 || self.region_merge_size < 0 {
            return bad("region sizes must not be negative");
        }
        if let Some(b) = self.bounds {
            if Aabb::from(b).is_degenerate() {
                return bad("bounds override must have max > min on every axis");
            }
        }
        Ok(())
    }

    /// Validates and converts to voxel units.
    pub fn raster(&self) -> Result<RasterConfig, BuildError> {
        self.validate()?;
        let (cs, ch) = (self.cell_size, self.cell_height);
        let walkable_radius = (self.agent_radius / cs).ceil() as i32;
        Ok(RasterConfig {
            cs,
            ch,
            walkable_slope: self.agent_max_slope,
            walkable_height: (self.agent_height / ch).ceil() as i32,
            walkable_climb: (self.agent_max_climb / ch).floor() as i32,
            walkable_radius,
            max_edge_len: (self.edge_max_len / cs) as i32,
            max_simplification_error: self.edge_max_error,
            min_region_area: self.region_min_size * self.region_min_size,
            merge_region_area: self.region_merge_size * self.region_merge_size,
            max_verts_per_poly: self.verts_per_poly,
            detail_sample_dist: if self.detail_sample_dist < 0.9 { 0.0 } else { cs * self.detail_sample_dist },
            detail_sample_max_error: ch * self.detail_sample_max_error,
            border_size: walkable_radius.saturating_add(3),
        })
    }
}

pub fn load_config_from_path(path: &Path) -> Result<BuildConfig, BuildError> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| BuildError::InvalidConfiguration(format!("read error: {e}")))?;
    BuildConfig::from_toml_str(&s)
}
