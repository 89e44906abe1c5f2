//! One tile through the meshing engine.

use std::fmt;

use navtile_engine::{
    CompactHeightfield, EngineError, Heightfield, NULL_AREA, WALKABLE_AREA, area_marking_tolerance,
    build_contours, build_detail_mesh, build_poly_mesh, erode_walkable_area, filter_ledge_spans,
    filter_low_hanging_walkable_obstacles, filter_walkable_low_height_spans, mark_convex_poly_area,
    mark_walkable_triangles, partition_regions, rasterize_triangles,
};
use navtile_geom::{Aabb, AreaDefinition, TriMesh, Vec3};
use navtile_tile::{OffMeshLink, TileCreateParams, TileDataError, TilePayload, create_tile_data};

use crate::config::{BuildConfig, RasterConfig};
use crate::grid::GridPlan;

/// Area code given to surface that no area definition claimed.
pub const GROUND_AREA: u8 = 1;
/// Traversal flag of every polygon with a walkable area.
pub const WALKABLE_FLAG: u16 = 1;

/// Geometry shared by every tile of a build.
#[derive(Clone, Debug, Default)]
pub struct BuildInput {
    pub geometry: TriMesh,
    pub areas: Vec<AreaDefinition>,
    pub off_mesh: Vec<OffMeshLink>,
}

impl BuildInput {
    pub fn new(geometry: TriMesh) -> Self {
        Self { geometry, ..Self::default() }
    }

    pub fn with_area(mut self, area: AreaDefinition) -> Self {
        self.areas.push(area);
        self
    }
}

/// Stage of the per-tile pipeline, for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuildStage {
    Heightfield,
    Rasterize,
    CompactHeightfield,
    Erode,
    Regions,
    Contours,
    PolygonMesh,
    DetailMesh,
    TileData,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildStage::Heightfield => "heightfield",
            BuildStage::Rasterize => "rasterization",
            BuildStage::CompactHeightfield => "compact heightfield",
            BuildStage::Erode => "erosion",
            BuildStage::Regions => "region partition",
            BuildStage::Contours => "contours",
            BuildStage::PolygonMesh => "polygon mesh",
            BuildStage::DetailMesh => "detail mesh",
            BuildStage::TileData => "tile data",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TileBuildError {
    #[error("{stage} failed: {source}")]
    Engine {
        stage: BuildStage,
        #[source]
        source: EngineError,
    },
    #[error("tile data failed: {0}")]
    TileData(#[from] TileDataError),
}

impl TileBuildError {
    pub fn stage(&self) -> BuildStage {
        match self {
            TileBuildError::Engine { stage, .. } => *stage,
            TileBuildError::TileData(_) => BuildStage::TileData,
        }
    }
}

/// Result of a tile that did not fail.
#[derive(Debug)]
pub enum TileOutcome {
    Built(TilePayload),
    /// No walkable surface; names the stage that came up empty.
    Empty(BuildStage),
}

fn engine(stage: BuildStage) -> impl FnOnce(EngineError) -> TileBuildError {
    move |source| TileBuildError::Engine { stage, source }
}

/// Rasterizes the triangles of `mesh` that touch `bounds` as walkable where
/// their slope allows.
fn rasterize_mesh(
    hf: &mut Heightfield,
    mesh: &TriMesh,
    bounds: &Aabb,
    raster: &RasterConfig,
) -> Result<(), TileBuildError> {
    if let Some(index) = mesh.first_invalid_triangle() {
        return Err(TileBuildError::Engine {
            stage: BuildStage::Rasterize,
            source: EngineError::InvalidTriangle { index },
        });
    }
    let tris: Vec<[u32; 3]> = mesh
        .tris
        .iter()
        .copied()
        .filter(|t| {
            Aabb::from_points(t.iter().map(|&i| Vec3::from(mesh.verts[i as usize])))
                .is_some_and(|tb| tb.overlaps_xz(bounds))
        })
        .collect();
    if tris.is_empty() {
        return Ok(());
    }
    let mut areas = vec![NULL_AREA; tris.len()];
    mark_walkable_triangles(raster.walkable_slope, &mesh.verts, &tris, &mut areas, WALKABLE_AREA);
    rasterize_triangles(hf, &mesh.verts, &tris, &areas, raster.walkable_climb).map_err(engine(BuildStage::Rasterize))
}

/// Tags spans under each area triangle. The vertical band around a triangle
/// widens with the heightfield span and elevation to absorb voxel rounding.
fn mark_areas(chf: &mut CompactHeightfield, areas: &[AreaDefinition]) {
    let tol = area_marking_tolerance(chf.ch, chf.bmin.y, chf.bmax.y);
    for (i, def) in areas.iter().enumerate() {
        let mut spans = 0;
        for t in &def.mesh.tris {
            let Some(tri) = t.iter().map(|&v| def.mesh.verts.get(v as usize).copied()).collect::<Option<Vec<_>>>()
            else {
                continue;
            };
            let hmin = tri.iter().map(|v| v[1]).fold(f32::INFINITY, f32::min) - tol;
            let hmax = tri.iter().map(|v| v[1]).fold(f32::NEG_INFINITY, f32::max) + tol;
            spans += mark_convex_poly_area(&tri, hmin, hmax, def.area, chf);
        }
        log::trace!("area {i} (code {}): {} triangles, {spans} spans, tolerance {tol:.2}", def.area, def.mesh.tris.len());
    }
}

/// Builds the payload of tile `(tx, ty)`.
pub fn build_tile(
    input: &BuildInput,
    config: &BuildConfig,
    raster: &RasterConfig,
    plan: &GridPlan,
    tx: i32,
    ty: i32,
) -> Result<TileOutcome, TileBuildError> {
    let tile_bounds = plan.tile_bounds(tx, ty);
    let border = raster.border_size;
    let bounds = tile_bounds.expanded_xz(border as f32 * raster.cs);
    log::debug!(
        "building tile ({tx}, {ty}) bounds {:?} .. {:?}",
        bounds.min.to_array(),
        bounds.max.to_array()
    );

    // Widened so an oversized tile reaches the heightfield size check.
    let size = (i64::from(plan.tile_size) + 2 * i64::from(border)) as usize;
    let mut hf = Heightfield::new(size, size, bounds.min, bounds.max, raster.cs, raster.ch)
        .map_err(engine(BuildStage::Heightfield))?;

    rasterize_mesh(&mut hf, &input.geometry, &bounds, raster)?;
    for def in &input.areas {
        rasterize_mesh(&mut hf, &def.mesh, &bounds, raster)?;
    }
    if hf.span_count() == 0 {
        return Ok(TileOutcome::Empty(BuildStage::Rasterize));
    }

    let filters = config.filters;
    if filters.low_hanging_obstacles {
        filter_low_hanging_walkable_obstacles(raster.walkable_climb, &mut hf);
    }
    if filters.ledge_spans {
        filter_ledge_spans(raster.walkable_height, raster.walkable_climb, &mut hf);
    }
    if filters.walkable_low_height_spans {
        filter_walkable_low_height_spans(raster.walkable_height, &mut hf);
    }

    let mut chf = CompactHeightfield::build(raster.walkable_height, raster.walkable_climb, &hf);
    drop(hf);
    if chf.span_count() == 0 {
        return Ok(TileOutcome::Empty(BuildStage::CompactHeightfield));
    }

    erode_walkable_area(raster.walkable_radius, &mut chf);
    if chf.areas.iter().all(|&a| a == NULL_AREA) {
        return Ok(TileOutcome::Empty(BuildStage::Erode));
    }
    // After erosion so area codes are not worn away at their edges.
    mark_areas(&mut chf, &input.areas);

    let regions = partition_regions(
        &mut chf,
        config.partition,
        border,
        raster.min_region_area,
        raster.merge_region_area,
    )
    .map_err(engine(BuildStage::Regions))?;
    if regions == 0 {
        return Ok(TileOutcome::Empty(BuildStage::Regions));
    }

    let cset = build_contours(&chf, border, raster.max_simplification_error, raster.max_edge_len);
    if cset.contours.is_empty() {
        return Ok(TileOutcome::Empty(BuildStage::Contours));
    }

    let mut pmesh = build_poly_mesh(&cset, raster.max_verts_per_poly).map_err(engine(BuildStage::PolygonMesh))?;
    if pmesh.poly_count() == 0 {
        return Ok(TileOutcome::Empty(BuildStage::PolygonMesh));
    }

    let dmesh = build_detail_mesh(&pmesh, &chf, raster.detail_sample_dist, raster.detail_sample_max_error);
    if dmesh.meshes.len() != pmesh.poly_count() {
        return Ok(TileOutcome::Empty(BuildStage::DetailMesh));
    }

    let mut area_counts = [0usize; 64];
    for (area, flags) in pmesh.areas.iter_mut().zip(pmesh.flags.iter_mut()) {
        area_counts[usize::from(*area & 0x3f)] += 1;
        if *area == WALKABLE_AREA {
            *area = GROUND_AREA;
        }
        *flags = if *area == NULL_AREA { 0 } else { WALKABLE_FLAG };
    }
    if log::log_enabled!(log::Level::Debug) {
        let dist: Vec<String> = area_counts
            .iter()
            .enumerate()
            .filter(|(_, n)| **n > 0)
            .map(|(a, n)| format!("{a}:{n}"))
            .collect();
        log::debug!("tile ({tx}, {ty}) area distribution {}", dist.join(" "));
    }

    let payload = create_tile_data(&TileCreateParams {
        pmesh: &pmesh,
        dmesh: Some(&dmesh),
        off_mesh: &input.off_mesh,
        tile_x: tx,
        tile_y: ty,
        layer: 0,
        user_id: 0,
        walkable_height: config.agent_height,
        walkable_radius: config.agent_radius,
        walkable_climb: config.agent_max_climb,
        bmin: pmesh.bmin,
        bmax: pmesh.bmax,
    })?;
    log::debug!("tile ({tx}, {ty}): {} polygons, {} bytes", pmesh.poly_count(), payload.len());
    Ok(TileOutcome::Built(payload))
}
