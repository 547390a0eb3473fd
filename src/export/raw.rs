//! RAW heightmap read/write for game engine interchange.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

use crate::terrain::{GridError, HeightmapGrid};

/// Errors that can occur during RAW import or export.
#[derive(Error, Debug)]
pub enum RawExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid height range: min ({0}) >= max ({1})")]
    InvalidHeightRange(f32, f32),
    #[error("File holds {actual} bytes, expected {expected} for {width}x{height} {format:?}")]
    SizeMismatch {
        width: u32,
        height: u32,
        format: RawFormat,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// RAW sample formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RawFormat {
    /// 16-bit unsigned integer, little-endian (Unity default).
    #[default]
    R16LittleEndian,
    /// 16-bit unsigned integer, big-endian.
    R16BigEndian,
    /// 32-bit float, little-endian, in meters.
    R32Float,
}

impl RawFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            RawFormat::R16LittleEndian | RawFormat::R16BigEndian => 2,
            RawFormat::R32Float => 4,
        }
    }
}

/// Writes a heightmap as headerless row-major samples.
///
/// # Arguments
/// * `grid` - The heightmap to export
/// * `path` - Output file path
/// * `format` - RAW format (R16 or R32)
/// * `min_height` - Elevation mapped to 0 (R16 only)
/// * `max_height` - Elevation mapped to 65535 (R16 only)
///
/// # Returns
/// `Ok(())` on success, or an error if export fails
pub fn export_heightmap_raw(
    grid: &HeightmapGrid,
    path: &Path,
    format: RawFormat,
    min_height: f32,
    max_height: f32,
) -> Result<(), RawExportError> {
    if format != RawFormat::R32Float && min_height >= max_height {
        return Err(RawExportError::InvalidHeightRange(min_height, max_height));
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let range = max_height - min_height;
    let quantize = |h: f32| (((h - min_height) / range).clamp(0.0, 1.0) * 65535.0).round() as u16;

    match format {
        RawFormat::R16LittleEndian => {
            for &height in &grid.heights {
                writer.write_all(&quantize(height).to_le_bytes())?;
            }
        }
        RawFormat::R16BigEndian => {
            for &height in &grid.heights {
                writer.write_all(&quantize(height).to_be_bytes())?;
            }
        }
        RawFormat::R32Float => {
            for &height in &grid.heights {
                writer.write_all(&height.to_le_bytes())?;
            }
        }
    }

    writer.flush()?;
    Ok(())
}

/// Reads a headerless RAW heightmap.
///
/// R16 samples are mapped linearly back onto `[min_height, max_height]`; R32 samples are
/// taken as meters.
pub fn import_heightmap_raw(
    path: &Path,
    width: u32,
    height: u32,
    meters_per_pixel: f32,
    format: RawFormat,
    min_height: f32,
    max_height: f32,
) -> Result<HeightmapGrid, RawExportError> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;

    let expected = width as usize * height as usize * format.bytes_per_sample();
    if bytes.len() != expected {
        return Err(RawExportError::SizeMismatch {
            width,
            height,
            format,
            expected,
            actual: bytes.len(),
        });
    }

    let range = max_height - min_height;
    let heights: Vec<f32> = match format {
        RawFormat::R16LittleEndian => bytes
            .chunks_exact(2)
            .map(|c| min_height + u16::from_le_bytes([c[0], c[1]]) as f32 / 65535.0 * range)
            .collect(),
        RawFormat::R16BigEndian => bytes
            .chunks_exact(2)
            .map(|c| min_height + u16::from_be_bytes([c[0], c[1]]) as f32 / 65535.0 * range)
            .collect(),
        RawFormat::R32Float => bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    };

    Ok(HeightmapGrid::from_heights(width, height, meters_per_pixel, heights)?)
}
