//! PNG export for shaped heightmaps and paint masks.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ImageBuffer, ImageEncoder, Luma};
use thiserror::Error;

use crate::terrain::{HeightmapGrid, LayerMask, LayerMaskSet};

/// Errors that can occur during PNG export.
#[derive(Error, Debug)]
pub enum PngExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Invalid height range: min ({0}) >= max ({1})")]
    InvalidHeightRange(f32, f32),
    #[error("Data length {actual} does not match {width}x{height}")]
    ShapeMismatch {
        width: u32,
        height: u32,
        actual: usize,
    },
}

/// Options for PNG export.
#[derive(Debug, Clone)]
pub struct PngExportOptions {
    /// Elevation mapped to 0.
    pub min_height: f32,
    /// Elevation mapped to 65535.
    pub max_height: f32,
    pub compression: CompressionType,
    pub filter: FilterType,
}

impl Default for PngExportOptions {
    fn default() -> Self {
        Self {
            min_height: 0.0,
            max_height: 1000.0,
            compression: CompressionType::Default,
            filter: FilterType::Adaptive,
        }
    }
}

impl PngExportOptions {
    /// Creates options spanning the grid's elevation range.
    ///
    /// A perfectly flat grid gets a 1 m range so it still encodes.
    pub fn auto_range(grid: &HeightmapGrid) -> Self {
        let (min, max) = grid.height_range();
        Self {
            min_height: min,
            max_height: if max > min { max } else { min + 1.0 },
            ..Default::default()
        }
    }
}

/// Exports a heightmap as a 16-bit grayscale PNG.
///
/// # Arguments
/// * `grid` - The heightmap to export
/// * `path` - Output file path
/// * `options` - Export options including height range for normalization
///
/// # Returns
/// `Ok(())` on success, or an error if export fails
pub fn export_heightmap_png(
    grid: &HeightmapGrid,
    path: &Path,
    options: &PngExportOptions,
) -> Result<(), PngExportError> {
    let min = options.min_height;
    let max = options.max_height;
    if min >= max {
        return Err(PngExportError::InvalidHeightRange(min, max));
    }
    check_shape(grid.width, grid.height, grid.heights.len())?;

    let range = max - min;
    let mut img: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::new(grid.width, grid.height);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        // Normalize to [0, 1] then scale to u16
        let normalized = ((grid.get(x, y) - min) / range).clamp(0.0, 1.0);
        *pixel = Luma([(normalized * 65535.0).round() as u16]);
    }

    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let encoder = PngEncoder::new_with_quality(writer, options.compression, options.filter);

    // Convert u16 slice to bytes for the encoder
    let byte_slice: &[u8] = bytemuck::cast_slice(img.as_raw());
    encoder.write_image(byte_slice, grid.width, grid.height, image::ExtendedColorType::L16)?;
    Ok(())
}

/// Exports one paint mask as an 8-bit grayscale PNG.
pub fn export_mask_png(mask: &LayerMask, path: &Path) -> Result<(), PngExportError> {
    check_shape(mask.width, mask.height, mask.data.len())?;

    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let encoder = PngEncoder::new_with_quality(writer, CompressionType::Best, FilterType::Adaptive);
    encoder.write_image(&mask.data, mask.width, mask.height, image::ExtendedColorType::L8)?;
    Ok(())
}

/// Exports every mask of the set as `{base_name}_{layer}.png`.
///
/// # Returns
/// The written paths, in layer order
pub fn export_masks_png(
    masks: &LayerMaskSet,
    output_dir: &Path,
    base_name: &str,
) -> Result<Vec<PathBuf>, PngExportError> {
    std::fs::create_dir_all(output_dir)?;

    let mut written = Vec::new();
    for (layer, mask) in masks.iter() {
        let path = output_dir.join(format!("{}_{}.png", base_name, layer.name()));
        export_mask_png(mask, &path)?;
        written.push(path);
    }
    Ok(written)
}

fn check_shape(width: u32, height: u32, actual: usize) -> Result<(), PngExportError> {
    if actual != width as usize * height as usize {
        return Err(PngExportError::ShapeMismatch {
            width,
            height,
            actual,
        });
    }
    Ok(())
}
