//! Numeric display ranges produced by the range-reduction workflow.

use serde::{Deserialize, Serialize};

/// Inclusive min/max of accumulated surface values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRange {
    /// Smallest accumulated value.
    pub min: f32,
    /// Largest accumulated value.
    pub max: f32,
}

impl EventRange {
    /// The empty display range `(0, 0)`.
    pub const ZERO: Self = Self { min: 0.0, max: 0.0 };

    /// Create a range.
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Smallest range covering both.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// One texel of a reduced summary buffer as read back from the GPU.
///
/// The reduction pass writes the running minimum to `r` and the running
/// maximum to `g`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryPixel {
    /// Minimum channel.
    pub r: f32,
    /// Maximum channel.
    pub g: f32,
    /// Unused.
    pub b: f32,
    /// Unused.
    pub a: f32,
}

impl SummaryPixel {
    /// Create a pixel carrying a min/max pair.
    pub const fn min_max(min: f32, max: f32) -> Self {
        Self {
            r: min,
            g: max,
            b: 0.0,
            a: 0.0,
        }
    }
}
