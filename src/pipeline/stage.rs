//! Generation stage trait and pipeline orchestration.

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::diagnostics::{Diagnostic, GradeOrigin};
use crate::elevation::{
    apply_banking, apply_junction_surfaces, apply_structures, grade_violations,
    harmonize_junctions, smooth_edge,
};
use crate::network::{build_network, EdgeError, EdgeId, RoadEdge, RoadInput, UnifiedRoadNetwork};
use crate::output::{blend_heightmap, rasterize_layers, BlendReport, FootprintReport};
use crate::terrain::{HeightmapGrid, LayerMaskSet};

use super::cancel::{CancellationToken, WorkItem};
use super::config::{ConfigError, StageConfig};
use super::context::RoadTerrain;

/// Unique identifier for generation stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StageId {
    /// Spline construction and cross-section sampling.
    Sampling,
    /// Junction detection and classification.
    Topology,
    /// Grade-limited profile smoothing.
    Smoothing,
    /// Junction elevation agreement and propagation.
    Harmonization,
    /// Bank angle and longitudinal slope.
    Banking,
    /// Edge constraints at T-junctions.
    JunctionSurface,
    /// Bridge and tunnel profiles.
    Structures,
    /// Post-shaping grade checks.
    Validation,
    /// Terrain write-back.
    HeightmapBlend,
    /// Paint mask rasterization.
    Raster,
}

impl StageId {
    /// Returns the name of the stage.
    pub fn name(&self) -> &'static str {
        match self {
            StageId::Sampling => "sampling",
            StageId::Topology => "topology",
            StageId::Smoothing => "smoothing",
            StageId::Harmonization => "harmonization",
            StageId::Banking => "banking",
            StageId::JunctionSurface => "junction_surface",
            StageId::Structures => "structures",
            StageId::Validation => "validation",
            StageId::HeightmapBlend => "heightmap_blend",
            StageId::Raster => "raster",
        }
    }
}

/// How a stage finished.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StageOutcome {
    Completed,
    /// The cancellation token fired; `unprocessed` lists what the stage did not reach.
    Cancelled {
        stage: StageId,
        unprocessed: Vec<WorkItem>,
    },
}

impl StageOutcome {
    fn after(stage: StageId, unprocessed: Vec<WorkItem>) -> Self {
        if unprocessed.is_empty() {
            StageOutcome::Completed
        } else {
            StageOutcome::Cancelled { stage, unprocessed }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StageOutcome::Cancelled { .. })
    }
}

/// Errors that can occur during pipeline execution.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Stage '{0}' failed: {1}")]
    StageFailed(String, String),
    #[error("Missing dependency: stage '{0}' requires '{1}'")]
    MissingDependency(String, String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Trait for implementing generation stages.
///
/// Each stage refines the shared [`RoadTerrain`] context, building on the stages listed in
/// [`dependencies`](GenerationStage::dependencies).
pub trait GenerationStage: Send + Sync {
    /// Returns the unique identifier for this stage.
    fn id(&self) -> StageId;

    /// Returns a human-readable name for this stage.
    fn name(&self) -> &str;

    /// Returns the IDs of stages that must complete before this one.
    fn dependencies(&self) -> &[StageId] {
        &[]
    }

    /// Executes this stage.
    ///
    /// # Arguments
    /// * `terrain` - The run context to modify
    /// * `config` - Stage configuration parameters
    ///
    /// # Returns
    /// How the stage finished, or an error describing what went wrong
    fn execute(&self, terrain: &mut RoadTerrain, config: &StageConfig) -> Result<StageOutcome, PipelineError>;
}

/// Orchestrates multiple generation stages into a complete pipeline.
pub struct Pipeline {
    stages: Vec<Box<dyn GenerationStage>>,
    config: StageConfig,
}

impl Pipeline {
    /// Creates a new empty pipeline with the given configuration.
    pub fn new(config: StageConfig) -> Self {
        Self {
            stages: Vec::new(),
            config,
        }
    }

    /// Creates a pipeline with every stage, in data-flow order.
    pub fn standard(config: StageConfig) -> Self {
        let mut pipeline = Self::new(config);
        pipeline
            .add_stage(SamplingStage)
            .add_stage(TopologyStage)
            .add_stage(SmoothingStage)
            .add_stage(HarmonizationStage)
            .add_stage(BankingStage)
            .add_stage(JunctionSurfaceStage)
            .add_stage(StructureStage)
            .add_stage(ValidationStage)
            .add_stage(HeightmapBlendStage)
            .add_stage(RasterStage);
        pipeline
    }

    /// Adds a stage to the pipeline.
    pub fn add_stage<S: GenerationStage + 'static>(&mut self, stage: S) -> &mut Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Returns the number of stages in the pipeline.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Executes all stages in order on the given context.
    ///
    /// # Arguments
    /// * `terrain` - The run context
    ///
    /// # Returns
    /// `Completed` if every stage finished, or the first cancelled stage
    pub fn run(&self, terrain: &mut RoadTerrain) -> Result<StageOutcome, PipelineError> {
        self.run_with_callbacks(terrain, |_, _, _| {}, |_, _, _| {})
    }

    /// Executes all stages with progress callbacks.
    ///
    /// Stages already completed on `terrain` are skipped. Execution stops at the first
    /// stage that reports cancellation, leaving the context as that stage left it.
    ///
    /// # Arguments
    /// * `terrain` - The run context
    /// * `on_stage_start` - Called when each stage begins
    /// * `on_stage_complete` - Called when each stage finishes
    pub fn run_with_callbacks<F1, F2>(
        &self,
        terrain: &mut RoadTerrain,
        mut on_stage_start: F1,
        mut on_stage_complete: F2,
    ) -> Result<StageOutcome, PipelineError>
    where
        F1: FnMut(&str, usize, usize),
        F2: FnMut(&str, usize, usize),
    {
        self.config.validate()?;
        let total = self.stages.len();

        for (i, stage) in self.stages.iter().enumerate() {
            if terrain.has_completed(stage.id()) {
                debug!("skipping {}: already completed", stage.name());
                continue;
            }
            on_stage_start(stage.name(), i, total);

            for dep in stage.dependencies() {
                if !terrain.has_completed(*dep) {
                    return Err(PipelineError::MissingDependency(
                        stage.name().to_string(),
                        dep.name().to_string(),
                    ));
                }
            }

            let outcome = stage.execute(terrain, &self.config)?;
            if let StageOutcome::Cancelled { unprocessed, .. } = &outcome {
                info!("{} cancelled with {} items unprocessed", stage.name(), unprocessed.len());
                return Ok(outcome);
            }
            terrain.mark_completed(stage.id());

            on_stage_complete(stage.name(), i, total);
        }

        Ok(StageOutcome::Completed)
    }
}

/// Every edge of the network, for stages that cancel as a whole.
fn all_edges(network: &UnifiedRoadNetwork) -> Vec<WorkItem> {
    network.edges.iter().map(|e| WorkItem::Edge(e.id)).collect()
}

enum Sampled {
    Built(RoadEdge),
    Degenerate(EdgeId, EdgeError),
    Skipped(EdgeId),
}

/// Builds one edge per input road. Roads that cannot be sampled are dropped with a
/// `DegenerateGeometry` diagnostic.
pub struct SamplingStage;

impl GenerationStage for SamplingStage {
    fn id(&self) -> StageId {
        StageId::Sampling
    }

    fn name(&self) -> &str {
        "Cross-Section Sampling"
    }

    fn execute(&self, terrain: &mut RoadTerrain, config: &StageConfig) -> Result<StageOutcome, PipelineError> {
        let grid = &terrain.heightmap;
        if grid.width < 2 || grid.height < 2 || grid.heights.len() != grid.width as usize * grid.height as usize {
            return Err(PipelineError::StageFailed(
                self.name().to_string(),
                format!("unusable {}x{} heightmap", grid.width, grid.height),
            ));
        }

        let step = config.network.step_meters;
        let cancel = &terrain.cancel;
        let sampled: Vec<Sampled> = terrain
            .roads
            .par_iter()
            .enumerate()
            .map(|(i, road)| {
                let id = EdgeId(i);
                if cancel.is_cancelled() {
                    return Sampled::Skipped(id);
                }
                match RoadEdge::build(id, road, step, grid) {
                    Ok(edge) => Sampled::Built(edge),
                    Err(err) => Sampled::Degenerate(id, err),
                }
            })
            .collect();

        let mut edges = Vec::with_capacity(sampled.len());
        let mut unprocessed = Vec::new();
        for result in sampled {
            match result {
                Sampled::Built(edge) => edges.push(edge),
                Sampled::Degenerate(edge, err) => {
                    let d = Diagnostic::DegenerateGeometry {
                        edge,
                        reason: err.to_string(),
                    };
                    warn!("{}", d);
                    terrain.diagnostics.push(d);
                }
                Sampled::Skipped(edge) => unprocessed.push(WorkItem::Edge(edge)),
            }
        }

        info!(
            "sampled {} of {} roads into {} cross-sections",
            edges.len(),
            terrain.roads.len(),
            edges.iter().map(|e| e.sections.len()).sum::<usize>()
        );
        terrain.network = UnifiedRoadNetwork {
            edges,
            ..Default::default()
        };
        Ok(StageOutcome::after(self.id(), unprocessed))
    }
}

/// Detects and classifies junctions between the sampled edges.
pub struct TopologyStage;

impl GenerationStage for TopologyStage {
    fn id(&self) -> StageId {
        StageId::Topology
    }

    fn name(&self) -> &str {
        "Network Topology"
    }

    fn dependencies(&self) -> &[StageId] {
        &[StageId::Sampling]
    }

    fn execute(&self, terrain: &mut RoadTerrain, config: &StageConfig) -> Result<StageOutcome, PipelineError> {
        if terrain.cancel.is_cancelled() {
            return Ok(StageOutcome::after(self.id(), all_edges(&terrain.network)));
        }
        let edges = std::mem::take(&mut terrain.network.edges);
        let (network, diagnostics) = build_network(edges, &config.network);
        info!(
            "{} edges, {} junctions ({} ambiguous)",
            network.edges.len(),
            network.junctions.len(),
            diagnostics.len()
        );
        terrain.network = network;
        terrain.diagnostics.extend(diagnostics);
        Ok(StageOutcome::Completed)
    }
}

/// Smooths every non-structure profile under the grade limit.
pub struct SmoothingStage;

impl GenerationStage for SmoothingStage {
    fn id(&self) -> StageId {
        StageId::Smoothing
    }

    fn name(&self) -> &str {
        "Profile Smoothing"
    }

    fn dependencies(&self) -> &[StageId] {
        &[StageId::Sampling]
    }

    fn execute(&self, terrain: &mut RoadTerrain, config: &StageConfig) -> Result<StageOutcome, PipelineError> {
        let cancel = &terrain.cancel;
        let elevation = &config.elevation;
        let unprocessed: Vec<WorkItem> = terrain
            .network
            .edges
            .par_iter_mut()
            .filter_map(|edge| {
                if cancel.is_cancelled() {
                    return Some(WorkItem::Edge(edge.id));
                }
                smooth_edge(&mut edge.sections, elevation);
                None
            })
            .collect();
        Ok(StageOutcome::after(self.id(), unprocessed))
    }
}

/// Agrees one elevation per junction and blends it into incident edges.
pub struct HarmonizationStage;

impl GenerationStage for HarmonizationStage {
    fn id(&self) -> StageId {
        StageId::Harmonization
    }

    fn name(&self) -> &str {
        "Junction Harmonization"
    }

    fn dependencies(&self) -> &[StageId] {
        &[StageId::Topology, StageId::Smoothing]
    }

    fn execute(&self, terrain: &mut RoadTerrain, config: &StageConfig) -> Result<StageOutcome, PipelineError> {
        let unprocessed = harmonize_junctions(&mut terrain.network, &config.elevation, &terrain.cancel);
        Ok(StageOutcome::after(self.id(), unprocessed))
    }
}

/// Computes bank and pitch on the harmonized profiles.
pub struct BankingStage;

impl GenerationStage for BankingStage {
    fn id(&self) -> StageId {
        StageId::Banking
    }

    fn name(&self) -> &str {
        "Banking"
    }

    fn dependencies(&self) -> &[StageId] {
        &[StageId::Harmonization]
    }

    fn execute(&self, terrain: &mut RoadTerrain, config: &StageConfig) -> Result<StageOutcome, PipelineError> {
        let unprocessed = apply_banking(&mut terrain.network, &config.elevation, &terrain.cancel);
        Ok(StageOutcome::after(self.id(), unprocessed))
    }
}

/// Seats terminating roads on the banked primary road at T-junctions.
pub struct JunctionSurfaceStage;

impl GenerationStage for JunctionSurfaceStage {
    fn id(&self) -> StageId {
        StageId::JunctionSurface
    }

    fn name(&self) -> &str {
        "Junction Surfaces"
    }

    fn dependencies(&self) -> &[StageId] {
        &[StageId::Banking]
    }

    fn execute(&self, terrain: &mut RoadTerrain, config: &StageConfig) -> Result<StageOutcome, PipelineError> {
        let unprocessed = apply_junction_surfaces(&mut terrain.network, &config.elevation, &terrain.cancel);
        Ok(StageOutcome::after(self.id(), unprocessed))
    }
}

/// Plans bridge and tunnel profiles against the original terrain.
pub struct StructureStage;

impl GenerationStage for StructureStage {
    fn id(&self) -> StageId {
        StageId::Structures
    }

    fn name(&self) -> &str {
        "Structure Profiles"
    }

    fn dependencies(&self) -> &[StageId] {
        &[StageId::JunctionSurface]
    }

    fn execute(&self, terrain: &mut RoadTerrain, config: &StageConfig) -> Result<StageOutcome, PipelineError> {
        let (diagnostics, unprocessed) = apply_structures(
            &mut terrain.network,
            &terrain.heightmap,
            &config.structures,
            config.elevation.max_grade(),
            config.network.connection_tolerance_meters,
            &terrain.cancel,
        );
        terrain.diagnostics.extend(diagnostics);
        Ok(StageOutcome::after(self.id(), unprocessed))
    }
}

/// Reports grade violations left on regular roads after all shaping passes.
pub struct ValidationStage;

impl GenerationStage for ValidationStage {
    fn id(&self) -> StageId {
        StageId::Validation
    }

    fn name(&self) -> &str {
        "Grade Validation"
    }

    fn dependencies(&self) -> &[StageId] {
        &[StageId::JunctionSurface]
    }

    fn execute(&self, terrain: &mut RoadTerrain, config: &StageConfig) -> Result<StageOutcome, PipelineError> {
        if terrain.cancel.is_cancelled() {
            return Ok(StageOutcome::after(self.id(), all_edges(&terrain.network)));
        }
        let max_grade = config.elevation.max_grade();
        let found: Vec<Diagnostic> = terrain
            .network
            .edges
            .iter()
            .filter(|e| !e.is_structure())
            .flat_map(|e| grade_violations(e.id, &e.sections, max_grade, GradeOrigin::Road))
            .collect();
        for d in &found {
            warn!("{}", d);
        }
        terrain.diagnostics.extend(found);
        Ok(StageOutcome::Completed)
    }
}

/// Writes road surfaces into the heightmap.
pub struct HeightmapBlendStage;

impl GenerationStage for HeightmapBlendStage {
    fn id(&self) -> StageId {
        StageId::HeightmapBlend
    }

    fn name(&self) -> &str {
        "Heightmap Blend"
    }

    fn dependencies(&self) -> &[StageId] {
        &[StageId::Structures]
    }

    fn execute(&self, terrain: &mut RoadTerrain, config: &StageConfig) -> Result<StageOutcome, PipelineError> {
        let (reports, unprocessed) = blend_heightmap(
            &terrain.network,
            &mut terrain.heightmap,
            &config.output,
            &terrain.cancel,
        );
        info!(
            "blended {} edges ({} shoulder px)",
            reports.len(),
            reports.iter().map(|r| r.shoulder_pixels).sum::<usize>()
        );
        terrain.blend_reports = reports;
        Ok(StageOutcome::after(self.id(), unprocessed))
    }
}

/// Rasterizes paint masks from the same footprints the blend stage used.
pub struct RasterStage;

impl GenerationStage for RasterStage {
    fn id(&self) -> StageId {
        StageId::Raster
    }

    fn name(&self) -> &str {
        "Layer Rasterization"
    }

    fn dependencies(&self) -> &[StageId] {
        &[StageId::Structures]
    }

    fn execute(&self, terrain: &mut RoadTerrain, _config: &StageConfig) -> Result<StageOutcome, PipelineError> {
        if terrain.cancel.is_cancelled() {
            return Ok(StageOutcome::after(self.id(), all_edges(&terrain.network)));
        }
        let (masks, footprints) = rasterize_layers(&terrain.network, &terrain.heightmap);
        terrain.masks = masks;
        terrain.footprints = footprints;
        Ok(StageOutcome::Completed)
    }
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub heightmap: HeightmapGrid,
    pub masks: LayerMaskSet,
    pub network: UnifiedRoadNetwork,
    pub diagnostics: Vec<Diagnostic>,
    pub footprints: Vec<FootprintReport>,
    pub blend_reports: Vec<BlendReport>,
    /// `Completed`, or the stage at which cancellation stopped the run.
    pub outcome: StageOutcome,
}

impl GenerationResult {
    /// Takes the outputs out of a run context.
    pub fn new(terrain: RoadTerrain, outcome: StageOutcome) -> Self {
        Self {
            heightmap: terrain.heightmap,
            masks: terrain.masks,
            network: terrain.network,
            diagnostics: terrain.diagnostics,
            footprints: terrain.footprints,
            blend_reports: terrain.blend_reports,
            outcome,
        }
    }
}

/// Runs the standard pipeline over one geometry snapshot.
///
/// # Arguments
/// * `roads` - Road geometry; a road's index becomes its `EdgeId`
/// * `heightmap` - Terrain to read from and write into
/// * `config` - Run configuration
/// * `cancel` - Checked once per edge or junction
///
/// # Returns
/// The shaped terrain, masks and network, or an error for invalid configuration
pub fn generate(
    roads: Vec<RoadInput>,
    heightmap: HeightmapGrid,
    config: &StageConfig,
    cancel: &CancellationToken,
) -> Result<GenerationResult, PipelineError> {
    let mut terrain = RoadTerrain::with_cancellation(roads, heightmap, cancel.clone());
    let outcome = Pipeline::standard(config.clone()).run(&mut terrain)?;
    Ok(GenerationResult::new(terrain, outcome))
}
