//! Road network elevation harmonization and terrain write-back.
//!
//! This crate turns 2D road centerlines into a consistent terrain elevation field and
//! aligned paint masks: junctions agree on a single elevation, curves bank, bridges and
//! tunnels get their own profiles, and masks are rasterized from the same sampled path
//! that shaped the terrain.

pub mod diagnostics;
pub mod elevation;
pub mod export;
pub mod geometry;
pub mod network;
pub mod output;
pub mod pipeline;
pub mod terrain;

pub use diagnostics::{Diagnostic, GradeOrigin};
pub use elevation::{ElevationConfig, StructureConfig, StructureElevationProfile};
pub use geometry::{InterpolationMode, Spline};
pub use network::{CrossSection, EdgeId, Junction, JunctionId, JunctionType, RoadClass, RoadInput, UnifiedRoadNetwork};
pub use output::OutputConfig;
pub use pipeline::{generate, CancellationToken, GenerationResult, Pipeline, StageConfig, StageOutcome};
pub use terrain::{HeightmapGrid, LayerMask, LayerMaskSet, PaintLayer};
