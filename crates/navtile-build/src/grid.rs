use navtile_geom::{Aabb, Vec3};

use crate::BuildError;

/// Voxel and tile dimensions of a build over `bounds`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridPlan {
    pub bounds: Aabb,
    pub cell_size: f32,
    /// Tile edge in cells. For a single-tile build this is the larger voxel
    /// dimension.
    pub tile_size: i32,
    pub voxel_width: i32,
    pub voxel_height: i32,
    pub tiles_x: i32,
    pub tiles_y: i32,
}

/// Largest voxel grid edge a build accepts.
pub const MAX_GRID_CELLS: u32 = 1 << 24;

/// Lays a tile grid over `bounds`. `tile_size` is in cells; 0 asks for one tile
/// covering the whole grid.
pub fn plan_grid(bounds: &Aabb, cell_size: f32, tile_size: i32) -> Result<GridPlan, BuildError> {
    if !(cell_size > 0.0) {
        return Err(BuildError::InvalidConfiguration(format!("cell size {cell_size} must be positive")));
    }
    if tile_size < 0 {
        return Err(BuildError::InvalidConfiguration(format!("tile size {tile_size} must not be negative")));
    }
    if bounds.is_degenerate() {
        return Err(BuildError::InvalidConfiguration(format!(
            "degenerate bounds {:?} .. {:?}",
            bounds.min, bounds.max
        )));
    }
    let extent = bounds.extent();
    let cells = |e: f32| {
        let n = (f64::from(e) / f64::from(cell_size)).ceil();
        (n.is_finite() && n <= f64::from(MAX_GRID_CELLS)).then_some(n as u32)
    };
    let (Some(voxel_width), Some(voxel_height)) = (cells(extent.x), cells(extent.z)) else {
        return Err(BuildError::InvalidConfiguration(format!(
            "bounds {:?} .. {:?} need more than {MAX_GRID_CELLS} cells per axis at cell size {cell_size}",
            bounds.min, bounds.max
        )));
    };
    let (tile_size, tiles_x, tiles_y) = if tile_size == 0 {
        (voxel_width.max(voxel_height), 1, 1)
    } else {
        let ts = tile_size as u32;
        (ts, voxel_width.div_ceil(ts), voxel_height.div_ceil(ts))
    };
    let (voxel_width, voxel_height) = (voxel_width as i32, voxel_height as i32);
    let (tile_size, tiles_x, tiles_y) = (tile_size as i32, tiles_x as i32, tiles_y as i32);
    Ok(GridPlan {
        bounds: *bounds,
        cell_size,
        tile_size,
        voxel_width,
        voxel_height,
        tiles_x,
        tiles_y,
    })
}

impl GridPlan {
    #[inline]
    pub fn tile_count(&self) -> usize {
        self.tiles_x as usize * self.tiles_y as usize
    }

    /// World edge length of a tile.
    #[inline]
    pub fn tile_world_size(&self) -> f32 {
        self.tile_size as f32 * self.cell_size
    }

    /// Bounds of tile `(tx, ty)` before the border margin; Y spans the whole
    /// build.
    pub fn tile_bounds(&self, tx: i32, ty: i32) -> Aabb {
        let tw = self.tile_world_size();
        let o = self.bounds.min;
        Aabb::new(
            Vec3::new(o.x + tx as f32 * tw, o.y, o.z + ty as f32 * tw),
            Vec3::new(o.x + (tx + 1) as f32 * tw, self.bounds.max.y, o.z + (ty + 1) as f32 * tw),
        )
    }

    /// Tile containing `pos` on the XZ plane, if it lies on the grid.
    pub fn tile_of(&self, pos: Vec3) -> Option<(i32, i32)> {
        let tw = self.tile_world_size();
        let tx = ((pos.x - self.bounds.min.x) / tw).floor();
        let ty = ((pos.z - self.bounds.min.z) / tw).floor();
        let inside = tx >= 0.0 && ty >= 0.0 && tx < self.tiles_x as f32 && ty < self.tiles_y as f32;
        inside.then_some((tx as i32, ty as i32))
    }

    /// Tile coordinates in row-major order.
    pub fn coords(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        (0..self.tiles_y).flat_map(move |ty| (0..self.tiles_x).map(move |tx| (tx, ty)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(x: f32, y: f32, z: f32) -> Aabb {
        Aabb::new(Vec3::ZERO, Vec3::new(x, y, z))
    }

    #[test]
    fn hundred_unit_level() {
        let plan = plan_grid(&bounds(100.0, 10.0, 100.0), 0.3, 32).unwrap();
        assert_eq!(plan.voxel_width, 334);
        assert_eq!(plan.tiles_x, ((100.0f32 / 0.3).ceil() as i32 + 31) / 32);
        assert_eq!((plan.tiles_x, plan.tiles_y), (11, 11));
        assert_eq!(plan.tile_count(), 121);
    }

    #[test]
    fn zero_tile_size_is_one_tile() {
        let plan = plan_grid(&bounds(30.0, 1.0, 12.0), 0.5, 0).unwrap();
        assert_eq!((plan.tiles_x, plan.tiles_y), (1, 1));
        assert_eq!(plan.tile_size, 60);
        let tb = plan.tile_bounds(0, 0);
        assert!(tb.max.x >= 30.0 && tb.max.z >= 12.0);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(plan_grid(&bounds(10.0, 1.0, 10.0), 0.0, 16).is_err());
        assert!(plan_grid(&bounds(10.0, 0.0, 10.0), 0.3, 16).is_err());
        assert!(plan_grid(&bounds(10.0, 1.0, 10.0), 0.3, -1).is_err());
    }

    #[test]
    fn huge_bounds_are_a_configuration_error() {
        let err = plan_grid(&bounds(1e9, 1.0, 1e9), 0.3, 32).unwrap_err();
        assert!(matches!(err, BuildError::InvalidConfiguration(_)), "{err}");
        assert!(plan_grid(&bounds(1e9, 1.0, 1e9), 0.3, 0).is_err());
        assert!(plan_grid(&bounds(f32::MAX, 1.0, 1.0), 1e-3, i32::MAX).is_err());

        // Right at the limit still plans, even with an enormous tile size.
        let edge = MAX_GRID_CELLS as f32;
        let plan = plan_grid(&bounds(edge, 1.0, 1.0), 1.0, i32::MAX).unwrap();
        assert_eq!((plan.voxel_width, plan.tiles_x, plan.tiles_y), (MAX_GRID_CELLS as i32, 1, 1));
    }

    #[test]
    fn tile_lookup() {
        let plan = plan_grid(&bounds(20.0, 4.0, 20.0), 0.5, 16).unwrap();
        assert_eq!((plan.tiles_x, plan.tiles_y), (3, 3));
        assert_eq!(plan.tile_of(Vec3::new(9.0, 0.0, 17.0)), Some((1, 2)));
        assert_eq!(plan.tile_of(Vec3::new(-0.1, 0.0, 1.0)), None);
        let tb = plan.tile_bounds(1, 2);
        assert_eq!(tb.min, Vec3::new(8.0, 0.0, 16.0));
        assert_eq!(tb.max, Vec3::new(16.0, 4.0, 24.0));
        let coords: Vec<_> = plan.coords().take(4).collect();
        assert_eq!(coords, vec![(0, 0), (1, 0), (2, 0), (0, 1)]);
    }
}
