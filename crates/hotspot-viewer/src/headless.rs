//! CPU accumulation backend for headless runs.
//!
//! Each surface gets a square grid laid over the XZ extent of its bounds.
//! Events splat their weight onto every cell whose center lies within the
//! event radius, with linear falloff. Reductions and readbacks complete
//! immediately.

use std::collections::BTreeMap;

use hotspot_core::{EventBatch, ReadbackHandle, RenderBackend, SurfaceId};
use hotspot_types::{Aabb, SummaryPixel, Vec3};
use tracing::debug;

/// Cells per grid side.
pub const GRID_RESOLUTION: usize = 64;

#[derive(Debug)]
struct Grid {
    bounds: Aabb,
    cells: Vec<f32>,
    summary: Vec<SummaryPixel>,
}

impl Grid {
    fn new(bounds: Aabb) -> Self {
        Self {
            bounds,
            cells: vec![0.0; GRID_RESOLUTION.saturating_mul(GRID_RESOLUTION)],
            summary: Vec::new(),
        }
    }

    fn splat(&mut self, position: Vec3, radius: f32, weight: f32) {
        let bounds = self.bounds;
        let flat = Vec3::new(position.x, 0.0, position.z);
        let radius_sq = radius * radius;
        for (row, row_cells) in self.cells.chunks_mut(GRID_RESOLUTION).enumerate() {
            for (col, cell) in row_cells.iter_mut().enumerate() {
                let d_sq = flat.distance_squared(cell_center(&bounds, col, row));
                if d_sq <= radius_sq {
                    let falloff = if radius > 0.0 {
                        1.0 - d_sq.sqrt() / radius
                    } else {
                        1.0
                    };
                    *cell = weight.mul_add(falloff, *cell);
                }
            }
        }
    }

    fn reduce(&mut self) {
        let range = self
            .cells
            .iter()
            .fold(None, |acc: Option<(f32, f32)>, &v| {
                Some(acc.map_or((v, v), |(lo, hi)| (lo.min(v), hi.max(v))))
            });
        self.summary = range
            .map(|(lo, hi)| vec![SummaryPixel::min_max(lo, hi)])
            .unwrap_or_default();
    }

    fn clear(&mut self) {
        self.cells.fill(0.0);
        self.summary.clear();
    }
}

/// Center of a grid cell, projected onto the XZ plane.
#[allow(clippy::cast_precision_loss)]
fn cell_center(bounds: &Aabb, col: usize, row: usize) -> Vec3 {
    let res = GRID_RESOLUTION as f32;
    let fx = (col as f32 + 0.5) / res;
    let fz = (row as f32 + 0.5) / res;
    let (min, max) = (bounds.min, bounds.max);
    Vec3::new(
        (max.x - min.x).mul_add(fx, min.x),
        0.0,
        (max.z - min.z).mul_add(fz, min.z),
    )
}

/// [`RenderBackend`] accumulating into CPU grids.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    grids: BTreeMap<SurfaceId, Grid>,
}

impl HeadlessBackend {
    /// Create a backend with no surfaces.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a grid for a surface.
    pub fn add_surface(&mut self, id: SurfaceId, bounds: Aabb) {
        self.grids.insert(id, Grid::new(bounds));
    }

    /// Accumulated cells of a surface, row-major.
    pub fn cells(&self, id: SurfaceId) -> Option<&[f32]> {
        self.grids.get(&id).map(|g| g.cells.as_slice())
    }
}

impl RenderBackend for HeadlessBackend {
    fn accumulate(&mut self, surface: SurfaceId, batch: &EventBatch) {
        let Some(grid) = self.grids.get_mut(&surface) else {
            debug!(surface = %surface, "Accumulate for unknown surface ignored");
            return;
        };
        for ((position, radius), weight) in batch
            .positions()
            .iter()
            .zip(batch.radii())
            .zip(batch.weights())
        {
            grid.splat(*position, *radius, *weight);
        }
    }

    fn clear(&mut self, surface: SurfaceId) {
        if let Some(grid) = self.grids.get_mut(&surface) {
            grid.clear();
        }
    }

    fn request_reduction(&mut self, surface: SurfaceId) {
        if let Some(grid) = self.grids.get_mut(&surface) {
            grid.reduce();
        }
    }

    fn request_readback(&mut self, surface: SurfaceId) -> ReadbackHandle {
        self.grids.get(&surface).map_or_else(
            || ReadbackHandle::failed(format!("no grid for {surface}")),
            |grid| ReadbackHandle::ready(grid.summary.clone()),
        )
    }
}
