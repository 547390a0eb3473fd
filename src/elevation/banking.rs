//! Bank angle (roll) and longitudinal slope (pitch) per cross-section.

use rayon::prelude::*;

use crate::geometry::signed_angle;
use crate::network::{CrossSection, RoadEdge, UnifiedRoadNetwork};
use crate::pipeline::{CancellationToken, WorkItem};

use super::config::ElevationConfig;

/// Banks every non-structure edge in parallel.
///
/// # Returns
/// Edges skipped because `cancel` fired
pub fn apply_banking(
    network: &mut UnifiedRoadNetwork,
    config: &ElevationConfig,
    cancel: &CancellationToken,
) -> Vec<WorkItem> {
    network
        .edges
        .par_iter_mut()
        .filter_map(|edge| {
            if cancel.is_cancelled() {
                return Some(WorkItem::Edge(edge.id));
            }
            bank_edge(edge, config);
            None
        })
        .collect()
}

/// Computes bank angle, longitudinal slope and default edge elevations for one edge.
///
/// Bank is proportional to signed curvature (positive for left turns, raising the right
/// edge) and capped at `max_bank_angle_radians`.
pub fn bank_edge(edge: &mut RoadEdge, config: &ElevationConfig) {
    if edge.is_structure() || edge.sections.len() < 2 {
        return;
    }
    let n = edge.sections.len();
    let max = config.max_bank_angle_radians;

    let frames: Vec<(f32, f32)> = (0..n)
        .map(|i| {
            let (a, b) = neighbours(i, n);
            let (sa, sb) = (&edge.sections[a], &edge.sections[b]);
            let run = sb.distance - sa.distance;
            if run <= f32::EPSILON {
                return (0.0, 0.0);
            }
            let curvature = signed_angle(sa.tangent, sb.tangent) / run;
            let slope = (sb.target_elevation - sa.target_elevation) / run;
            ((config.bank_curvature_gain * curvature).clamp(-max, max), slope)
        })
        .collect();

    for (s, (bank, slope)) in edge.sections.iter_mut().zip(frames) {
        s.bank_angle_radians = bank;
        s.longitudinal_slope = slope;
        set_default_edges(s);
    }
}

/// Stores the banking-derived edge elevations as the precomputed values.
pub(crate) fn set_default_edges(s: &mut CrossSection) {
    s.left_edge_elevation = Some(s.banked_left_edge());
    s.right_edge_elevation = Some(s.banked_right_edge());
}

/// Central-difference neighbours, one-sided at the ends.
fn neighbours(i: usize, n: usize) -> (usize, usize) {
    (i.saturating_sub(1), (i + 1).min(n - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{EdgeId, RoadClass, RoadInput};
    use crate::terrain::HeightmapGrid;
    use glam::Vec2;

    fn arc(radius: f32, left: bool) -> Vec<Vec2> {
        let center = Vec2::new(200.0, 200.0);
        let side = if left { 1.0 } else { -1.0 };
        (0..9)
            .map(|k| {
                let a = (k as f32 / 8.0) * std::f32::consts::FRAC_PI_2;
                center + Vec2::new(a.sin(), side * (1.0 - a.cos())) * radius
            })
            .collect()
    }

    fn build(points: Vec<Vec2>, grid: &HeightmapGrid) -> RoadEdge {
        let road = RoadInput::new(points, 10.0, RoadClass::Primary);
        RoadEdge::build(EdgeId(0), &road, 3.0, grid).unwrap()
    }

    #[test]
    fn test_straight_road_is_flat_across() {
        let grid = HeightmapGrid::from_fn(128, 32, 1.0, |x, _| x * 0.05);
        let mut edge = build(vec![Vec2::new(10.0, 16.0), Vec2::new(110.0, 16.0)], &grid);
        bank_edge(&mut edge, &ElevationConfig::default());
        for s in &edge.sections {
            assert!(s.bank_angle_radians.abs() < 1e-5);
            assert!((s.left_edge() - s.right_edge()).abs() < 1e-4);
            assert!((s.longitudinal_slope - 0.05).abs() < 1e-3);
        }
    }

    #[test]
    fn test_tight_left_turn_is_capped_and_raises_right_edge() {
        let grid = HeightmapGrid::flat(400, 400, 1.0, 0.0);
        let mut edge = build(arc(50.0, true), &grid);
        let config = ElevationConfig::default();
        bank_edge(&mut edge, &config);
        let mid = &edge.sections[edge.sections.len() / 2];
        assert!((mid.bank_angle_radians - config.max_bank_angle_radians).abs() < 1e-6);
        assert!(mid.right_edge() > mid.left_edge());
        let expected = 2.0 * 5.0 * config.max_bank_angle_radians.sin();
        assert!((mid.right_edge() - mid.left_edge() - expected).abs() < 1e-4);
    }

    #[test]
    fn test_right_turn_banks_negative() {
        let grid = HeightmapGrid::flat(400, 400, 1.0, 0.0);
        let mut edge = build(arc(50.0, false), &grid);
        bank_edge(&mut edge, &ElevationConfig::default());
        let mid = &edge.sections[edge.sections.len() / 2];
        assert!(mid.bank_angle_radians < 0.0);
        assert!(mid.left_edge() > mid.right_edge());
    }

    #[test]
    fn test_gentle_curve_scales_with_curvature() {
        let grid = HeightmapGrid::flat(400, 400, 1.0, 0.0);
        let mut edge = build(arc(400.0, true), &grid);
        let config = ElevationConfig::default();
        bank_edge(&mut edge, &config);
        let mid = &edge.sections[edge.sections.len() / 2];
        let expected = config.bank_curvature_gain / 400.0;
        assert!((mid.bank_angle_radians - expected).abs() < 0.006, "{}", mid.bank_angle_radians);
    }

    #[test]
    fn test_structures_are_not_banked() {
        let grid = HeightmapGrid::flat(400, 400, 1.0, 0.0);
        let road = RoadInput::new(arc(50.0, true), 10.0, RoadClass::Primary).bridge();
        let mut edge = RoadEdge::build(EdgeId(0), &road, 3.0, &grid).unwrap();
        bank_edge(&mut edge, &ElevationConfig::default());
        assert!(edge.sections.iter().all(|s| s.bank_angle_radians == 0.0 && s.left_edge_elevation.is_none()));
    }
}
