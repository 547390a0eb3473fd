//! Pipeline module for orchestrating road shaping stages.
//!
//! Provides a trait-based architecture for modular stages that are composed into a
//! complete run: sampling, topology, elevation passes and terrain/mask write-back.

mod cancel;
mod config;
mod context;
mod stage;

pub use cancel::{CancellationToken, WorkItem};
pub use config::{ConfigError, StageConfig};
pub use context::RoadTerrain;
pub use stage::{
    generate, BankingStage, GenerationResult, GenerationStage, HarmonizationStage,
    HeightmapBlendStage, JunctionSurfaceStage, Pipeline, PipelineError, RasterStage,
    SamplingStage, SmoothingStage, StageId, StageOutcome, StructureStage, TopologyStage,
    ValidationStage,
};
