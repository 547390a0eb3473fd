//! Shared terrain heightmap grid.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when constructing a grid from caller data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("grid data length {actual} != {width}x{height}")]
    LengthMismatch {
        width: u32,
        height: u32,
        actual: usize,
    },
    #[error("grid must be at least 2x2, got {0}x{1}")]
    TooSmall(u32, u32),
    #[error("meters per pixel must be positive and finite, got {0}")]
    InvalidScale(f32),
}

/// A 2D float elevation grid in meters.
///
/// Pixel `(x, y)` sits at world position `(x * meters_per_pixel, y * meters_per_pixel)`
/// in the terrain-local frame; heights are stored row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeightmapGrid {
    pub width: u32,
    pub height: u32,
    pub meters_per_pixel: f32,
    pub heights: Vec<f32>,
}

impl HeightmapGrid {
    /// Creates a grid with every height set to `elevation`.
    pub fn flat(width: u32, height: u32, meters_per_pixel: f32, elevation: f32) -> Self {
        Self {
            width,
            height,
            meters_per_pixel,
            heights: vec![elevation; width as usize * height as usize],
        }
    }

    /// Wraps caller-provided heights after validating the shape.
    pub fn from_heights(
        width: u32,
        height: u32,
        meters_per_pixel: f32,
        heights: Vec<f32>,
    ) -> Result<Self, GridError> {
        if width < 2 || height < 2 {
            return Err(GridError::TooSmall(width, height));
        }
        if !(meters_per_pixel > 0.0 && meters_per_pixel.is_finite()) {
            return Err(GridError::InvalidScale(meters_per_pixel));
        }
        if heights.len() != width as usize * height as usize {
            return Err(GridError::LengthMismatch {
                width,
                height,
                actual: heights.len(),
            });
        }
        Ok(Self {
            width,
            height,
            meters_per_pixel,
            heights,
        })
    }

    /// Builds a grid by evaluating `f(world_x, world_y)` at every pixel.
    pub fn from_fn<F>(width: u32, height: u32, meters_per_pixel: f32, f: F) -> Self
    where
        F: Fn(f32, f32) -> f32,
    {
        let mut heights = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                heights.push(f(x as f32 * meters_per_pixel, y as f32 * meters_per_pixel));
            }
        }
        Self {
            width,
            height,
            meters_per_pixel,
            heights,
        }
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Gets the height at pixel coordinates.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.heights[self.index(x, y)]
    }

    /// Sets the height at pixel coordinates.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        let i = self.index(x, y);
        self.heights[i] = value;
    }

    /// World position of a pixel.
    #[inline]
    pub fn pixel_to_world(&self, x: u32, y: u32) -> Vec2 {
        Vec2::new(x as f32, y as f32) * self.meters_per_pixel
    }

    /// World-space extent covered by the grid.
    pub fn extent(&self) -> Vec2 {
        Vec2::new(self.width.saturating_sub(1) as f32, self.height.saturating_sub(1) as f32) * self.meters_per_pixel
    }

    /// Inclusive pixel range covering the world-space box `[min, max]`, clamped to the grid.
    /// Returns `None` if the box lies entirely outside.
    pub fn pixel_bounds(&self, min: Vec2, max: Vec2) -> Option<(u32, u32, u32, u32)> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let mpp = self.meters_per_pixel;
        let x0 = (min.x / mpp).floor().max(0.0);
        let y0 = (min.y / mpp).floor().max(0.0);
        let x1 = (max.x / mpp).ceil().min((self.width - 1) as f32);
        let y1 = (max.y / mpp).ceil().min((self.height - 1) as f32);
        if x0 > x1 || y0 > y1 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }

    /// Bilinear height at a world position. Positions outside the grid clamp to the border.
    ///
    /// Grids one pixel wide or tall degrade to linear or constant reads; a grid whose data
    /// does not cover its shape reads as 0.
    pub fn sample_bilinear(&self, world: Vec2) -> f32 {
        if self.width == 0 || self.height == 0 || self.heights.len() < self.width as usize * self.height as usize {
            return 0.0;
        }
        let (max_x, max_y) = (self.width - 1, self.height - 1);
        let fx = (world.x / self.meters_per_pixel).clamp(0.0, max_x as f32);
        let fy = (world.y / self.meters_per_pixel).clamp(0.0, max_y as f32);

        let ix = (fx.floor() as u32).min(self.width.saturating_sub(2));
        let iy = (fy.floor() as u32).min(self.height.saturating_sub(2));
        let (jx, jy) = ((ix + 1).min(max_x), (iy + 1).min(max_y));
        let tx = fx - ix as f32;
        let ty = fy - iy as f32;

        let h00 = self.get(ix, iy);
        let h10 = self.get(jx, iy);
        let h01 = self.get(ix, jy);
        let h11 = self.get(jx, jy);

        let hx0 = h00 + (h10 - h00) * tx;
        let hx1 = h01 + (h11 - h01) * tx;
        hx0 + (hx1 - hx0) * ty
    }

    /// Min and max height values.
    pub fn height_range(&self) -> (f32, f32) {
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for &h in &self.heights {
            min = min.min(h);
            max = max.max(h);
        }
        (min, max)
    }
}
