//! Surfaces, their cursors, and the render collaborator seam.
//!
//! A surface is anything that accumulates events into a texture. The core
//! only needs its bounds; the texture itself lives behind [`RenderBackend`],
//! addressed by [`SurfaceId`].

use hotspot_types::{Aabb, Vec3};

use crate::event_log::EventRecord;
use crate::integrator::MAX_EVENTS_PER_BATCH;
use crate::range::{RangeDriver, ReadbackHandle};

/// Identifier of a surface, stable for the life of the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceId(pub u32);

impl core::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

/// Index of the next unexamined record in an event log.
///
/// Never decreases except through [`Cursor::reset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor(usize);

impl Cursor {
    /// A cursor at the start of the log.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Current position.
    pub const fn position(self) -> usize {
        self.0
    }

    /// Move forward to `position`. Positions behind the cursor are ignored.
    pub fn advance_to(&mut self, position: usize) {
        self.0 = self.0.max(position);
    }

    /// Return to the start of the log.
    pub const fn reset(&mut self) {
        self.0 = 0;
    }
}

/// Up to [`MAX_EVENTS_PER_BATCH`] events handed to the backend in one call.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBatch {
    positions: [Vec3; MAX_EVENTS_PER_BATCH],
    radii: [f32; MAX_EVENTS_PER_BATCH],
    weights: [f32; MAX_EVENTS_PER_BATCH],
    count: usize,
}

impl Default for EventBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBatch {
    /// An empty batch.
    pub const fn new() -> Self {
        Self {
            positions: [Vec3::ZERO; MAX_EVENTS_PER_BATCH],
            radii: [0.0; MAX_EVENTS_PER_BATCH],
            weights: [0.0; MAX_EVENTS_PER_BATCH],
            count: 0,
        }
    }

    /// Add a record. Returns `true` once the batch is full; records pushed
    /// into a full batch are dropped.
    pub fn push(&mut self, record: &EventRecord) -> bool {
        if let (Some(position), Some(radius), Some(weight)) = (
            self.positions.get_mut(self.count),
            self.radii.get_mut(self.count),
            self.weights.get_mut(self.count),
        ) {
            *position = record.position;
            *radius = record.radius;
            *weight = record.weight;
            self.count = self.count.saturating_add(1);
        }
        self.is_full()
    }

    /// Number of events in the batch.
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Whether the batch holds no events.
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether the batch holds [`MAX_EVENTS_PER_BATCH`] events.
    pub const fn is_full(&self) -> bool {
        self.count >= MAX_EVENTS_PER_BATCH
    }

    /// Positions of the batched events.
    pub fn positions(&self) -> &[Vec3] {
        self.positions.get(..self.count).unwrap_or_default()
    }

    /// Radii of the batched events.
    pub fn radii(&self) -> &[f32] {
        self.radii.get(..self.count).unwrap_or_default()
    }

    /// Weights of the batched events.
    pub fn weights(&self) -> &[f32] {
        self.weights.get(..self.count).unwrap_or_default()
    }

    /// Empty the batch for reuse.
    pub const fn clear(&mut self) {
        self.count = 0;
    }
}

/// Render-side collaborator that owns the accumulation textures.
///
/// Implemented by the GPU layer in an interactive build and by
/// CPU-side grids in headless runs and tests.
pub trait RenderBackend {
    /// Accumulate a batch of events into the surface's texture.
    fn accumulate(&mut self, surface: SurfaceId, batch: &EventBatch);

    /// Clear the surface's texture.
    fn clear(&mut self, surface: SurfaceId);

    /// Reduce the surface's texture into its min/max summary buffer.
    fn request_reduction(&mut self, surface: SurfaceId);

    /// Start an asynchronous readback of the summary buffer.
    fn request_readback(&mut self, surface: SurfaceId) -> ReadbackHandle;
}

/// A surface receiving events.
#[derive(Debug)]
pub struct Surface {
    id: SurfaceId,
    name: String,
    bounds: Aabb,
    cursor: Cursor,
    range: RangeDriver,
}

impl Surface {
    /// Create a surface with its cursor at the start of the log.
    pub fn new(id: SurfaceId, name: impl Into<String>, bounds: Aabb, range: RangeDriver) -> Self {
        Self {
            id,
            name: name.into(),
            bounds,
            cursor: Cursor::new(),
            range,
        }
    }

    /// Identifier.
    pub const fn id(&self) -> SurfaceId {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// World-space bounds.
    pub const fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Current cursor.
    pub const fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Mutable cursor, used by the integrator.
    pub const fn cursor_mut(&mut self) -> &mut Cursor {
        &mut self.cursor
    }

    /// Range driver.
    pub const fn range(&self) -> &RangeDriver {
        &self.range
    }

    /// Mutable range driver.
    pub const fn range_mut(&mut self) -> &mut RangeDriver {
        &mut self.range
    }

    /// Whether an event sphere touches this surface.
    pub fn is_relevant(&self, record: &EventRecord) -> bool {
        self.bounds.overlaps_sphere(record.position, record.radius)
    }

    /// Clear the texture, rewind the cursor, and restart the range workflow.
    pub fn reset(&mut self, backend: &mut dyn RenderBackend) {
        backend.clear(self.id);
        self.cursor.reset();
        self.range.restart();
    }
}
