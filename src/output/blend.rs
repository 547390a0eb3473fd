//! Heightmap write-back with a soft shoulder into the surrounding terrain.

use std::collections::BTreeMap;

use glam::Vec2;
use log::debug;
use rayon::prelude::*;
use serde::Serialize;

use crate::geometry::{point_in_quad, project_onto_segment, smoothstep};
use crate::network::{CrossSection, EdgeId, RoadEdge, UnifiedRoadNetwork};
use crate::pipeline::{CancellationToken, WorkItem};
use crate::terrain::HeightmapGrid;

use super::{footprint_quads, FootprintQuad, FootprintReport, OutputConfig};

/// What one edge wrote into the heightmap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlendReport {
    pub footprint: FootprintReport,
    /// Pixels outside the footprint pulled toward the road.
    pub shoulder_pixels: usize,
}

/// Elevation a single edge wants at one pixel.
#[derive(Debug, Clone, Copy)]
struct Stamp {
    /// Distance outside the footprint; 0 inside.
    outside: f32,
    elevation: f32,
}

/// Per-edge footprint elevations, computed independently of the grid's current values.
struct EdgeStamps {
    edge: EdgeId,
    quads: usize,
    stamps: BTreeMap<usize, Stamp>,
}

/// Writes every non-excluded cross-section into the heightmap.
///
/// Pixels inside an edge's footprint take the road surface elevation (interpolated across
/// the left edge, centerline and right edge); pixels within `terrain_falloff_meters`
/// outside are blended toward the road with a smoothstep shoulder. Edges are applied in
/// ascending (priority, id) order so higher-priority roads are written last.
///
/// # Returns
/// One report per applied edge, and edges skipped because `cancel` fired
pub fn blend_heightmap(
    network: &UnifiedRoadNetwork,
    grid: &mut HeightmapGrid,
    config: &OutputConfig,
    cancel: &CancellationToken,
) -> (Vec<BlendReport>, Vec<WorkItem>) {
    let falloff = config.terrain_falloff_meters;

    let mut order: Vec<&RoadEdge> = network.edges.iter().collect();
    order.sort_by_key(|e| (e.priority, e.id));

    let frozen = &*grid;
    let stamped: Vec<EdgeStamps> = order
        .par_iter()
        .map(|edge| stamp_edge(edge, frozen, falloff))
        .collect();

    let mut reports = Vec::with_capacity(stamped.len());
    for (n, edge) in stamped.iter().enumerate() {
        if cancel.is_cancelled() {
            let left = stamped[n..].iter().map(|e| WorkItem::Edge(e.edge)).collect();
            return (reports, left);
        }
        reports.push(apply_stamps(edge, grid, falloff));
    }

    debug!(
        "blended {} edges, {} footprint px",
        reports.len(),
        reports.iter().map(|r| r.footprint.pixels.len()).sum::<usize>()
    );
    (reports, Vec::new())
}

fn apply_stamps(edge: &EdgeStamps, grid: &mut HeightmapGrid, falloff: f32) -> BlendReport {
    let mut pixels = Vec::new();
    let mut shoulder = 0;
    for (&i, stamp) in &edge.stamps {
        if stamp.outside <= 0.0 {
            grid.heights[i] = stamp.elevation;
            pixels.push(i);
        } else {
            let w = 1.0 - smoothstep(0.0, falloff, stamp.outside);
            if w > 0.0 {
                let h = &mut grid.heights[i];
                *h += w * (stamp.elevation - *h);
                shoulder += 1;
            }
        }
    }
    BlendReport {
        footprint: FootprintReport {
            edge: edge.edge,
            quads: edge.quads,
            pixels,
        },
        shoulder_pixels: shoulder,
    }
}

/// Collects the nearest road elevation for every pixel in or near the edge's footprint.
fn stamp_edge(edge: &RoadEdge, grid: &HeightmapGrid, falloff: f32) -> EdgeStamps {
    let quads = footprint_quads(&edge.sections);
    let mut stamps: BTreeMap<usize, Stamp> = BTreeMap::new();

    for quad in &quads {
        let a = &edge.sections[quad.first];
        let b = &edge.sections[quad.first + 1];
        let (lo, hi) = quad.bounds();
        let margin = Vec2::splat(falloff);
        let Some((x0, y0, x1, y1)) = grid.pixel_bounds(lo - margin, hi + margin) else {
            continue;
        };
        for y in y0..=y1 {
            for x in x0..=x1 {
                let p = grid.pixel_to_world(x, y);
                let stamp = stamp_at(p, quad, a, b);
                if stamp.outside >= falloff && stamp.outside > 0.0 {
                    continue;
                }
                stamps
                    .entry(grid.index(x, y))
                    .and_modify(|s| {
                        if stamp.outside < s.outside {
                            *s = stamp;
                        }
                    })
                    .or_insert(stamp);
            }
        }
    }

    EdgeStamps {
        edge: edge.id,
        quads: quads.len(),
        stamps,
    }
}

/// Road elevation and distance outside the footprint at `p`, between sections `a` and `b`.
fn stamp_at(p: Vec2, quad: &FootprintQuad, a: &CrossSection, b: &CrossSection) -> Stamp {
    let (t, on_center) = project_onto_segment(p, a.center, b.center);
    let normal = a.normal.lerp(b.normal, t).normalize_or(a.normal);
    let lateral = (p - on_center).dot(normal);
    let elevation = a.surface_elevation(lateral) + (b.surface_elevation(lateral) - a.surface_elevation(lateral)) * t;

    let outside = if point_in_quad(p, &quad.corners) {
        0.0
    } else {
        let half_width = a.half_width() + (b.half_width() - a.half_width()) * t;
        // Never 0 for pixels the footprint test rejected.
        ((p - on_center).length() - half_width).max(f32::EPSILON)
    };
    Stamp { outside, elevation }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{build_network, NetworkConfig, RoadClass, RoadInput};
    use crate::output::rasterize_layers;

    fn flat_network(grid: &HeightmapGrid, roads: &[RoadInput]) -> UnifiedRoadNetwork {
        let edges = roads
            .iter()
            .enumerate()
            .map(|(i, r)| RoadEdge::build(EdgeId(i), r, 3.0, grid).unwrap())
            .collect();
        build_network(edges, &NetworkConfig::default()).0
    }

    #[test]
    fn test_footprint_and_shoulder() {
        let mut grid = HeightmapGrid::flat(64, 64, 1.0, 0.0);
        let road = RoadInput::new(vec![Vec2::new(4.0, 30.0), Vec2::new(60.0, 30.0)], 6.0, RoadClass::Primary);
        let mut net = flat_network(&grid, &[road]);
        for s in &mut net.edges[0].sections {
            s.target_elevation = 5.0;
        }
        let (reports, left) = blend_heightmap(&net, &mut grid, &OutputConfig::default(), &CancellationToken::new());
        assert!(left.is_empty());
        assert_eq!(reports.len(), 1);

        // Centre and footprint rows take the road elevation.
        assert!((grid.get(30, 30) - 5.0).abs() < 1e-5);
        assert!((grid.get(30, 32) - 5.0).abs() < 1e-5);
        // Shoulder eases down, far terrain is untouched.
        let shoulder = grid.get(30, 36);
        assert!(shoulder > 0.0 && shoulder < 5.0);
        assert_eq!(grid.get(30, 45), 0.0);
        assert!(reports[0].shoulder_pixels > 0);
    }

    #[test]
    fn test_banked_surface_tilts_across() {
        let mut grid = HeightmapGrid::flat(64, 64, 1.0, 0.0);
        let road = RoadInput::new(vec![Vec2::new(4.0, 30.0), Vec2::new(60.0, 30.0)], 8.0, RoadClass::Primary);
        let mut net = flat_network(&grid, &[road]);
        for s in &mut net.edges[0].sections {
            s.target_elevation = 10.0;
            s.constrained_left_edge_elevation = Some(9.0);
            s.constrained_right_edge_elevation = Some(11.0);
        }
        blend_heightmap(&net, &mut grid, &OutputConfig::default(), &CancellationToken::new());
        // Heading +x: the right-hand normal points to -y.
        assert!((grid.get(30, 28) - 10.5).abs() < 1e-4);
        assert!((grid.get(30, 32) - 9.5).abs() < 1e-4);
    }

    #[test]
    fn test_priority_wins_on_overlap() {
        let mut grid = HeightmapGrid::flat(64, 64, 1.0, 0.0);
        let roads = [
            RoadInput::new(vec![Vec2::new(4.0, 30.0), Vec2::new(60.0, 30.0)], 6.0, RoadClass::Primary),
            RoadInput::new(vec![Vec2::new(30.0, 4.0), Vec2::new(30.0, 60.0)], 6.0, RoadClass::Service),
        ];
        let mut net = flat_network(&grid, &roads);
        for s in &mut net.edges[0].sections {
            s.target_elevation = 8.0;
        }
        for s in &mut net.edges[1].sections {
            s.target_elevation = 2.0;
        }
        blend_heightmap(&net, &mut grid, &OutputConfig::default(), &CancellationToken::new());
        assert!((grid.get(30, 30) - 8.0).abs() < 1e-5);
    }

    #[test]
    fn test_mask_and_terrain_cover_same_pixels() {
        let mut grid = HeightmapGrid::flat(96, 96, 1.0, 0.0);
        let road = RoadInput::new(
            vec![Vec2::new(5.0, 10.0), Vec2::new(40.0, 30.0), Vec2::new(70.0, 25.0), Vec2::new(90.0, 80.0)],
            7.0,
            RoadClass::Secondary,
        );
        let net = flat_network(&grid, &[road]);
        let (_, raster) = rasterize_layers(&net, &grid);
        let (blend, _) = blend_heightmap(&net, &mut grid, &OutputConfig::default(), &CancellationToken::new());
        assert_eq!(raster[0].quads, blend[0].footprint.quads);
        assert_eq!(raster[0].quads + 1, net.edges[0].sections.len());
        assert_eq!(raster[0].pixels, blend[0].footprint.pixels);
    }

    #[test]
    fn test_idempotent_blend() {
        let make = || {
            let mut grid = HeightmapGrid::from_fn(64, 64, 1.0, |x, y| (x * 0.1).sin() + y * 0.05);
            let road = RoadInput::new(vec![Vec2::new(4.0, 12.0), Vec2::new(58.0, 50.0)], 6.0, RoadClass::Primary);
            let net = flat_network(&grid, &[road]);
            blend_heightmap(&net, &mut grid, &OutputConfig::default(), &CancellationToken::new());
            grid
        };
        assert_eq!(make(), make());
    }
}
