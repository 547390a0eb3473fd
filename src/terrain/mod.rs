//! Terrain grids.
//!
//! Provides the shared heightmap the road passes read from and write into, and the
//! paint masks rasterized alongside it.

mod heightmap;
mod mask;

pub use heightmap::{GridError, HeightmapGrid};
pub use mask::{LayerMask, LayerMaskSet, PaintLayer};
