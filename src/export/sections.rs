//! JSON dump of the shaped network for downstream mesh and structure tools.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use serde::Serialize;
use thiserror::Error;

use crate::diagnostics::Diagnostic;
use crate::elevation::StructureElevationProfile;
use crate::network::{CrossSection, EdgeId, Junction, JunctionId, RoadClass};
use crate::output::FootprintReport;
use crate::pipeline::{GenerationResult, StageOutcome};

/// Errors that can occur during JSON export.
#[derive(Error, Debug)]
pub enum JsonExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One edge with its final cross-sections.
#[derive(Debug, Serialize)]
pub struct EdgeReport<'a> {
    pub id: EdgeId,
    pub class: RoadClass,
    pub priority: i32,
    pub width: f32,
    pub length: f32,
    pub junctions: &'a [JunctionId],
    pub structure: Option<&'a StructureElevationProfile>,
    pub sections: &'a [CrossSection],
}

/// Everything about a run except the rasters.
#[derive(Debug, Serialize)]
pub struct NetworkReport<'a> {
    pub outcome: &'a StageOutcome,
    pub edges: Vec<EdgeReport<'a>>,
    pub junctions: &'a [Junction],
    pub diagnostics: &'a [Diagnostic],
    pub footprints: &'a [FootprintReport],
}

impl<'a> NetworkReport<'a> {
    pub fn new(result: &'a GenerationResult) -> Self {
        let network = &result.network;
        let edges = network
            .edges
            .iter()
            .map(|edge| EdgeReport {
                id: edge.id,
                class: edge.class,
                priority: edge.priority,
                width: edge.width,
                length: edge.length(),
                junctions: network.junctions_of(edge.id),
                structure: edge.structure.as_ref(),
                sections: &edge.sections,
            })
            .collect();

        Self {
            outcome: &result.outcome,
            edges,
            junctions: &network.junctions,
            diagnostics: &result.diagnostics,
            footprints: &result.footprints,
        }
    }
}

/// Writes the network report as pretty-printed JSON.
pub fn export_network_json(result: &GenerationResult, path: &Path) -> Result<(), JsonExportError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &NetworkReport::new(result))?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{generate, CancellationToken, StageConfig};
    use crate::network::RoadInput;
    use crate::terrain::HeightmapGrid;
    use glam::Vec2;
    use tempfile::tempdir;

    #[test]
    fn test_export_network_json() {
        let roads = vec![
            RoadInput::new(vec![Vec2::new(0.0, 30.0), Vec2::new(60.0, 30.0)], 6.0, RoadClass::Primary),
            RoadInput::new(vec![Vec2::new(30.0, 30.0), Vec2::new(30.0, 60.0)], 4.0, RoadClass::Service),
        ];
        let grid = HeightmapGrid::flat(64, 64, 1.0, 2.0);
        let result = generate(roads, grid, &StageConfig::default(), &CancellationToken::new()).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("network.json");
        export_network_json(&result, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["outcome"], "Completed");
        assert_eq!(value["edges"].as_array().unwrap().len(), 2);
        assert_eq!(value["edges"][1]["class"], "Service");
        assert_eq!(value["edges"][1]["junctions"], serde_json::json!([0]));
        assert_eq!(value["junctions"][0]["kind"], "T");

        let sections = value["edges"][0]["sections"].as_array().unwrap();
        assert_eq!(sections.len(), result.network.edges[0].sections.len());
        assert!(sections[0]["target_elevation"].is_number());
        assert!(value["edges"][0]["structure"].is_null());
    }
}
