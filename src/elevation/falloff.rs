//! Distance-based blend weights.

use serde::{Deserialize, Serialize};

use crate::geometry::smoothstep;

/// Shape of the weight used to propagate a boundary value along a road.
///
/// Every variant is 1 at distance 0, non-increasing, and exactly 0 at and beyond the
/// blend distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BlendFalloff {
    /// `1 - smoothstep(0, D, d)`.
    Smoothstep,
    /// `exp(-rate * d / D)`, rescaled so it reaches 0 at `D`.
    Exponential { rate: f32 },
}

impl Default for BlendFalloff {
    fn default() -> Self {
        BlendFalloff::Smoothstep
    }
}

impl BlendFalloff {
    /// Weight at `distance` for a blend length of `blend_distance`.
    pub fn weight(&self, distance: f32, blend_distance: f32) -> f32 {
        let d = distance.abs();
        if blend_distance <= 0.0 {
            return if d <= 0.0 { 1.0 } else { 0.0 };
        }
        if d >= blend_distance {
            return 0.0;
        }
        match *self {
            BlendFalloff::Smoothstep => 1.0 - smoothstep(0.0, blend_distance, d),
            BlendFalloff::Exponential { rate } => {
                if rate <= 1e-6 {
                    return 1.0 - d / blend_distance;
                }
                let floor = (-rate).exp();
                let w = ((-rate * d / blend_distance).exp() - floor) / (1.0 - floor);
                w.clamp(0.0, 1.0)
            }
        }
    }
}
