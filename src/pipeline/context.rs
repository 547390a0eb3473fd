//! Mutable state threaded through the stages of one run.

use crate::diagnostics::Diagnostic;
use crate::network::{RoadInput, UnifiedRoadNetwork};
use crate::output::{BlendReport, FootprintReport};
use crate::terrain::{HeightmapGrid, LayerMaskSet};

use super::cancel::CancellationToken;
use super::stage::StageId;

/// Inputs, intermediate network and outputs of a single generation run.
///
/// Every run owns its own context; nothing is shared between runs except what the
/// caller passes in.
#[derive(Debug, Clone)]
pub struct RoadTerrain {
    /// Immutable geometry snapshot. A road's index is its `EdgeId`.
    pub roads: Vec<RoadInput>,
    /// Terrain read by sampling and rewritten by the blend stage.
    pub heightmap: HeightmapGrid,
    pub network: UnifiedRoadNetwork,
    pub masks: LayerMaskSet,
    pub diagnostics: Vec<Diagnostic>,
    /// Paint footprints, one per edge, from the raster stage.
    pub footprints: Vec<FootprintReport>,
    /// Terrain write-back per edge, from the blend stage.
    pub blend_reports: Vec<BlendReport>,
    pub cancel: CancellationToken,
    completed: Vec<StageId>,
}

impl RoadTerrain {
    pub fn new(roads: Vec<RoadInput>, heightmap: HeightmapGrid) -> Self {
        Self::with_cancellation(roads, heightmap, CancellationToken::new())
    }

    pub fn with_cancellation(roads: Vec<RoadInput>, heightmap: HeightmapGrid, cancel: CancellationToken) -> Self {
        Self {
            roads,
            heightmap,
            network: UnifiedRoadNetwork::default(),
            masks: LayerMaskSet::default(),
            diagnostics: Vec::new(),
            footprints: Vec::new(),
            blend_reports: Vec::new(),
            cancel,
            completed: Vec::new(),
        }
    }

    /// Stages that have run to completion on this context, in order.
    pub fn completed(&self) -> &[StageId] {
        &self.completed
    }

    pub fn has_completed(&self, stage: StageId) -> bool {
        self.completed.contains(&stage)
    }

    pub(crate) fn mark_completed(&mut self, stage: StageId) {
        if !self.completed.contains(&stage) {
            self.completed.push(stage);
        }
    }

    /// Warnings only, excluding dropped edges.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_warning())
    }
}
