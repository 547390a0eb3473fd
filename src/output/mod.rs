//! Terrain write-back and paint rasterization.
//!
//! Both consumers read the footprint of an edge from [`footprint_quads`], built from the
//! same cross-section list that was shaped by the elevation passes, so paint and terrain
//! cover identical pixels.

mod blend;
mod raster;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::geometry::point_in_quad;
use crate::network::{CrossSection, EdgeId};
use crate::pipeline::ConfigError;
use crate::terrain::HeightmapGrid;

pub use blend::{blend_heightmap, BlendReport};
pub use raster::rasterize_layers;

/// Parameters for terrain write-back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Width of the shoulder over which road elevation fades into terrain (meters).
    pub terrain_falloff_meters: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            terrain_falloff_meters: 6.0,
        }
    }
}

impl OutputConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::non_negative("terrain_falloff_meters", self.terrain_falloff_meters)
    }
}

/// Road surface patch between two consecutive cross-sections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FootprintQuad {
    pub edge: EdgeId,
    /// Index of the first of the two cross-sections.
    pub first: usize,
    /// Left/right of the first section, then right/left of the second.
    pub corners: [Vec2; 4],
}

impl FootprintQuad {
    pub fn bounds(&self) -> (Vec2, Vec2) {
        self.corners
            .iter()
            .fold((Vec2::splat(f32::INFINITY), Vec2::splat(f32::NEG_INFINITY)), |(lo, hi), &c| {
                (lo.min(c), hi.max(c))
            })
    }
}

/// Quads between consecutive non-excluded cross-sections.
pub fn footprint_quads(sections: &[CrossSection]) -> Vec<FootprintQuad> {
    sections
        .windows(2)
        .filter(|pair| !pair[0].is_excluded && !pair[1].is_excluded)
        .map(|pair| FootprintQuad {
            edge: pair[0].edge_id,
            first: pair[0].index,
            corners: [
                pair[0].left_position(),
                pair[0].right_position(),
                pair[1].right_position(),
                pair[1].left_position(),
            ],
        })
        .collect()
}

/// Pixels whose world position lies inside `quad`.
pub(crate) fn covered_pixels(quad: &FootprintQuad, grid: &HeightmapGrid) -> Vec<(u32, u32)> {
    let (lo, hi) = quad.bounds();
    let Some((x0, y0, x1, y1)) = grid.pixel_bounds(lo, hi) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for y in y0..=y1 {
        for x in x0..=x1 {
            if point_in_quad(grid.pixel_to_world(x, y), &quad.corners) {
                out.push((x, y));
            }
        }
    }
    out
}

/// Per-edge record of what a write-back pass touched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FootprintReport {
    pub edge: EdgeId,
    pub quads: usize,
    /// Sorted, de-duplicated grid indices inside the footprint.
    pub pixels: Vec<usize>,
}
