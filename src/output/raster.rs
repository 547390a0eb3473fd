//! Paint mask rasterization from the shaped cross-sections.

use log::debug;
use rayon::prelude::*;

use crate::network::UnifiedRoadNetwork;
use crate::terrain::{HeightmapGrid, LayerMaskSet};

use super::{covered_pixels, footprint_quads, FootprintReport};

/// Rasterizes every edge into the mask of its paint layer.
///
/// Masks share the heightmap's shape and pixel-to-world mapping. Structure spans that are
/// still excluded are not painted.
///
/// # Returns
/// The masks and one footprint report per edge, in edge order
pub fn rasterize_layers(
    network: &UnifiedRoadNetwork,
    grid: &HeightmapGrid,
) -> (LayerMaskSet, Vec<FootprintReport>) {
    let reports: Vec<FootprintReport> = network
        .edges
        .par_iter()
        .map(|edge| {
            let quads = footprint_quads(&edge.sections);
            let mut pixels: Vec<usize> = quads
                .iter()
                .flat_map(|q| covered_pixels(q, grid))
                .map(|(x, y)| grid.index(x, y))
                .collect();
            pixels.sort_unstable();
            pixels.dedup();
            FootprintReport {
                edge: edge.id,
                quads: quads.len(),
                pixels,
            }
        })
        .collect();

    let mut masks = LayerMaskSet::default();
    for (edge, report) in network.edges.iter().zip(&reports) {
        if report.pixels.is_empty() {
            continue;
        }
        let mask = masks.layer_mut(edge.class.paint_layer(), grid.width, grid.height);
        for &i in &report.pixels {
            mask.data[i] = 255;
        }
    }

    for (layer, mask) in masks.iter() {
        debug!("{} mask: {} px", layer.name(), mask.coverage());
    }
    (masks, reports)
}
