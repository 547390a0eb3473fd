//! Export module for saving shaped terrain, paint masks and network data.
//!
//! Supports 16-bit PNG heightmaps and 8-bit PNG masks for universal compatibility,
//! RAW formats for game engine imports, and a JSON dump of the shaped network.

mod png;
mod raw;
mod sections;

pub use png::{
    export_heightmap_png,
    export_mask_png,
    export_masks_png,
    PngExportError,
    PngExportOptions,
};
pub use raw::{export_heightmap_raw, import_heightmap_raw, RawExportError, RawFormat};
pub use sections::{export_network_json, EdgeReport, JsonExportError, NetworkReport};
