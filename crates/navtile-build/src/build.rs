use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use navtile_geom::{Aabb, Vec3};
use navtile_mesh::{NavMesh, NavMeshParams, ReferenceBudget, TileRef};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::config::{BuildConfig, RasterConfig};
use crate::grid::{GridPlan, plan_grid};
use crate::tile_builder::{BuildInput, BuildStage, TileBuildError, TileOutcome, build_tile};
use crate::BuildError;

/// Tally of a grid build.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuildReport {
    pub total_tiles: usize,
    pub tiles_built: usize,
    pub tiles_empty: usize,
    pub tiles_failed: usize,
    /// `(x, y, message)` of every failed tile.
    pub failures: Vec<(i32, i32, String)>,
    /// Stage of the most recent empty or failed tile.
    pub last_stage: Option<BuildStage>,
    pub cancelled: bool,
}

/// World bounds of a build: the override if configured, otherwise the input
/// geometry lifted by the agent height.
pub fn build_bounds(input: &BuildInput, config: &BuildConfig) -> Result<Aabb, BuildError> {
    if let Some(b) = config.bounds {
        return Ok(b.into());
    }
    let mut all = input.geometry.bounds();
    for def in &input.areas {
        if let Some(b) = def.mesh.bounds() {
            all = Some(all.map_or(b, |a| a.union(b)));
        }
    }
    let mut bounds = all.ok_or_else(|| BuildError::InvalidConfiguration("input geometry is empty".into()))?;
    bounds.max = bounds.max + Vec3::new(0.0, config.agent_height, 0.0);
    Ok(bounds)
}

/// Grid plan and voxel settings shared by a build and later rebuilds.
pub fn plan_build(input: &BuildInput, config: &BuildConfig) -> Result<(GridPlan, RasterConfig), BuildError> {
    let raster = config.raster()?;
    let bounds = build_bounds(input, config)?;
    let plan = plan_grid(&bounds, config.cell_size, config.tile_size)?;
    Ok((plan, raster))
}

enum Slot {
    Done(Result<TileOutcome, TileBuildError>),
    Skipped,
}

fn record(report: &mut BuildReport, tx: i32, ty: i32, stage: BuildStage, msg: String) {
    log::warn!("tile ({tx}, {ty}) failed at {stage}: {msg}");
    report.tiles_failed += 1;
    report.failures.push((tx, ty, msg));
    report.last_stage = Some(stage);
}

/// Builds every tile of the grid and assembles them into one mesh.
///
/// Tiles are built on the calling thread, or on a pool of
/// `config.worker_threads` threads; either way they are inserted in
/// row-major order. Setting `cancel` stops the build between tiles and
/// returns what was built so far.
pub fn build_navmesh(
    input: &BuildInput,
    config: &BuildConfig,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<(NavMesh, BuildReport), BuildError> {
    let (plan, raster) = plan_build(input, config)?;
    let budget = ReferenceBudget::for_tile_count(plan.tile_count() as u64);
    let params = NavMeshParams::from_budget(
        plan.bounds.min.to_array(),
        plan.tile_world_size(),
        plan.tile_world_size(),
        budget,
    );
    let mut mesh = NavMesh::new(params)?;
    log::info!(
        "building {}x{} tiles ({} cells each), {} tile bits, {} poly bits",
        plan.tiles_x,
        plan.tiles_y,
        plan.tile_size,
        budget.tile_bits,
        budget.poly_bits
    );

    let cancelled = || cancel.as_ref().is_some_and(|c| c.load(Ordering::Relaxed));
    let coords: Vec<(i32, i32)> = plan.coords().collect();
    let build_one = |&(tx, ty): &(i32, i32)| {
        if cancelled() {
            Slot::Skipped
        } else {
            Slot::Done(build_tile(input, config, &raster, &plan, tx, ty))
        }
    };

    let mut report = BuildReport { total_tiles: plan.tile_count(), ..BuildReport::default() };
    if config.worker_threads > 0 {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("navtile-build-{i}"))
            .build()
            .map_err(|e| BuildError::AllocationFailure(e.to_string()))?;
        let slots: Vec<Slot> = pool.install(|| coords.par_iter().map(build_one).collect());
        for (&(tx, ty), slot) in coords.iter().zip(slots) {
            insert(&mut mesh, &mut report, tx, ty, slot);
        }
    } else {
        for c in &coords {
            let slot = build_one(c);
            insert(&mut mesh, &mut report, c.0, c.1, slot);
        }
    }

    log::info!(
        "built {}/{} tiles ({} empty, {} failed)",
        report.tiles_built,
        report.total_tiles,
        report.tiles_empty,
        report.tiles_failed
    );
    if report.tiles_built == 0 && !report.cancelled {
        return Err(BuildError::TileBuildFailure {
            stage: report.last_stage.unwrap_or(BuildStage::Rasterize),
        });
    }
    Ok((mesh, report))
}

fn insert(mesh: &mut NavMesh, report: &mut BuildReport, tx: i32, ty: i32, slot: Slot) {
    match slot {
        Slot::Skipped => report.cancelled = true,
        Slot::Done(Ok(TileOutcome::Built(payload))) => match mesh.add_or_replace_tile(tx, ty, 0, payload) {
            Ok(_) => report.tiles_built += 1,
            Err(e) => record(report, tx, ty, BuildStage::TileData, e.to_string()),
        },
        Slot::Done(Ok(TileOutcome::Empty(stage))) => {
            log::debug!("tile ({tx}, {ty}) is empty after {stage}");
            report.tiles_empty += 1;
            report.last_stage = Some(stage);
        }
        Slot::Done(Err(e)) => record(report, tx, ty, e.stage(), e.to_string()),
    }
}

/// Rebuilds tile `(tx, ty)` of a mesh made by [`build_navmesh`] with the same
/// input and config. Returns the new reference, or `None` when the tile came
/// out empty, in which case any old tile there is removed. References into the
/// old tile stop resolving either way.
pub fn rebuild_tile(
    mesh: &mut NavMesh,
    input: &BuildInput,
    config: &BuildConfig,
    tx: i32,
    ty: i32,
) -> Result<Option<TileRef>, BuildError> {
    let (plan, raster) = plan_build(input, config)?;
    if !(0..plan.tiles_x).contains(&tx) || !(0..plan.tiles_y).contains(&ty) {
        return Err(BuildError::InvalidConfiguration(format!(
            "tile ({tx}, {ty}) is outside the {}x{} grid",
            plan.tiles_x, plan.tiles_y
        )));
    }
    match build_tile(input, config, &raster, &plan, tx, ty)? {
        TileOutcome::Built(payload) => {
            let r = mesh.add_or_replace_tile(tx, ty, 0, payload)?;
            log::info!("rebuilt tile ({tx}, {ty})");
            Ok(Some(r))
        }
        TileOutcome::Empty(stage) => {
            log::info!("rebuilt tile ({tx}, {ty}) is empty after {stage}");
            if let Some(old) = mesh.tile_ref_at(tx, ty, 0) {
                mesh.remove_tile(old)?;
            }
            Ok(None)
        }
    }
}
