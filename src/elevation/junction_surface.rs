//! Edge constraints that seat terminating roads flush on a banked, sloped primary road.

use glam::Vec2;
use log::debug;

use crate::network::{
    CrossSection, EdgeId, Junction, JunctionId, JunctionType, RoadEdge, UnifiedRoadNetwork,
};
use crate::pipeline::{CancellationToken, WorkItem};

use super::banking::set_default_edges;
use super::config::ElevationConfig;

/// Local frame of the primary road at a T-junction.
#[derive(Debug, Clone, Copy)]
struct PrimaryFrame {
    center: Vec2,
    tangent: Vec2,
    normal: Vec2,
    elevation: f32,
    bank: f32,
    slope: f32,
    half_width: f32,
}

impl PrimaryFrame {
    /// Primary surface elevation at a world position, from its lateral (normal) and
    /// longitudinal (tangent) offsets.
    fn surface_at(&self, p: Vec2) -> f32 {
        let offset = p - self.center;
        let lateral = offset.dot(self.normal);
        let longitudinal = offset.dot(self.tangent);
        self.elevation + lateral * self.bank.sin() + longitudinal * self.slope
    }
}

/// Adjustment at a terminating road's boundary section, faded beyond it.
#[derive(Debug, Clone, Copy, Default)]
struct BoundaryDelta {
    center: f32,
    left: f32,
    right: f32,
}

/// Applies surface constraints at every T-junction, one junction at a time.
///
/// # Returns
/// Junctions left unprocessed because `cancel` fired
pub fn apply_junction_surfaces(
    network: &mut UnifiedRoadNetwork,
    config: &ElevationConfig,
    cancel: &CancellationToken,
) -> Vec<WorkItem> {
    let targets: Vec<JunctionId> = network
        .junctions
        .iter()
        .filter(|j| j.kind == JunctionType::T && j.primary.is_some())
        .map(|j| j.id)
        .collect();

    let mut constrained = 0usize;
    for (n, id) in targets.iter().enumerate() {
        if cancel.is_cancelled() {
            return targets[n..].iter().map(|&id| WorkItem::Junction(id)).collect();
        }
        let Some(junction) = network.junction(*id).cloned() else {
            continue;
        };
        constrained += constrain_junction(network, &junction, config);
    }
    debug!(
        "constrained {} terminating sections at {} T-junctions",
        constrained,
        targets.len()
    );
    Vec::new()
}

/// Constrains the terminating edges of one T-junction. Returns the number of sections
/// given explicit edge elevations.
fn constrain_junction(network: &mut UnifiedRoadNetwork, junction: &Junction, config: &ElevationConfig) -> usize {
    let Some(primary) = junction.primary else {
        return 0;
    };
    let Some(frame) = primary_frame(network, junction, primary.edge, primary.slope) else {
        return 0;
    };

    let mut count = 0;
    for inc in junction.terminating() {
        let Some(edge) = network.edge_mut(inc.edge) else {
            continue;
        };
        if edge.is_structure() {
            continue;
        }
        count += constrain_terminating(edge, inc.section, &frame, config);
    }
    count
}

fn primary_frame(
    network: &UnifiedRoadNetwork,
    junction: &Junction,
    edge: EdgeId,
    slope: f32,
) -> Option<PrimaryFrame> {
    let inc = junction.incidence(edge)?;
    let primary = network.edge(edge)?;
    let s = primary.sections.get(inc.section)?;
    if s.is_excluded {
        return None;
    }
    Some(PrimaryFrame {
        center: s.center,
        tangent: s.tangent,
        normal: s.normal,
        elevation: s.target_elevation,
        bank: s.bank_angle_radians,
        slope,
        half_width: s.half_width(),
    })
}

/// Seats the mouth of a terminating edge on the primary surface and fades the boundary
/// adjustment over the blend distance.
fn constrain_terminating(
    edge: &mut RoadEdge,
    junction_section: usize,
    frame: &PrimaryFrame,
    config: &ElevationConfig,
) -> usize {
    let origin = edge.sections[junction_section].distance;
    let mouth = frame.half_width + 1e-3;

    // Walk away from the junction so the boundary delta is known before the fade.
    let end = edge.sections.last().map_or(origin, |s| s.distance);
    let order: Vec<usize> = if origin <= end - origin {
        (0..edge.sections.len()).collect()
    } else {
        (0..edge.sections.len()).rev().collect()
    };

    let mut count = 0;
    let mut boundary: Option<(f32, BoundaryDelta)> = None;
    for i in order {
        let s = &mut edge.sections[i];
        if s.is_excluded {
            break;
        }
        let r = (s.distance - origin).abs();
        if r <= mouth {
            let delta = seat_on_primary(s, frame);
            boundary = Some((r, delta));
            count += 1;
            continue;
        }
        let Some((r0, delta)) = boundary else {
            break;
        };
        let w = config.falloff.weight(r - r0, config.blend_distance_meters);
        if w <= 0.0 {
            break;
        }
        let (left, right) = s.unconstrained_edges();
        s.target_elevation += w * delta.center;
        s.left_edge_elevation = Some(left + w * delta.left);
        s.right_edge_elevation = Some(right + w * delta.right);
    }
    count
}

/// Sets constrained edges from the primary surface at this section's edge positions and
/// recentres the target between them. Returns the change from the section's previous
/// values.
fn seat_on_primary(s: &mut CrossSection, frame: &PrimaryFrame) -> BoundaryDelta {
    let (old_left, old_right) = s.unconstrained_edges();
    let old_center = s.target_elevation;

    let left = frame.surface_at(s.left_position());
    let right = frame.surface_at(s.right_position());
    s.constrained_left_edge_elevation = Some(left);
    s.constrained_right_edge_elevation = Some(right);
    s.target_elevation = 0.5 * (left + right);
    set_default_edges(s);

    BoundaryDelta {
        center: s.target_elevation - old_center,
        left: left - old_left,
        right: right - old_right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elevation::harmonize_junctions;
    use crate::network::{build_network, NetworkConfig, RoadClass, RoadInput};
    use crate::terrain::HeightmapGrid;

    /// 20 m primary along x with the given bank; 10 m secondary ending on its centerline.
    fn t_on(grid: &HeightmapGrid, bank: f32) -> UnifiedRoadNetwork {
        let config = NetworkConfig {
            step_meters: 2.0,
            ..Default::default()
        };
        let roads = [
            RoadInput::new(vec![Vec2::new(0.0, 50.0), Vec2::new(100.0, 50.0)], 20.0, RoadClass::Primary),
            RoadInput::new(vec![Vec2::new(50.0, 50.0), Vec2::new(50.0, 110.0)], 10.0, RoadClass::Residential),
        ];
        let edges = roads
            .iter()
            .enumerate()
            .map(|(i, r)| RoadEdge::build(EdgeId(i), r, config.step_meters, grid).unwrap())
            .collect();
        let (mut net, _) = build_network(edges, &config);
        harmonize_junctions(&mut net, &ElevationConfig::default(), &CancellationToken::new());
        for s in &mut net.edges[0].sections {
            s.bank_angle_radians = bank;
            set_default_edges(s);
        }
        for s in &mut net.edges[1].sections {
            set_default_edges(s);
        }
        net
    }

    fn banked_t() -> UnifiedRoadNetwork {
        t_on(&HeightmapGrid::flat(128, 128, 1.0, 10.0), 0.05)
    }

    #[test]
    fn test_boundary_matches_primary_cross_slope() {
        let mut net = banked_t();
        let h = net.junctions[0].harmonized_elevation.unwrap();
        let left = apply_junction_surfaces(&mut net, &ElevationConfig::default(), &CancellationToken::new());
        assert!(left.is_empty());

        // The boundary sits on the primary's edge, 10 m out: the mouth falls by the
        // primary's cross-slope over its half-width.
        let secondary = &net.edges[1];
        let boundary = &secondary.sections[5];
        assert!((boundary.distance - 10.0).abs() < 1e-3);
        let l = boundary.constrained_left_edge_elevation.unwrap();
        let r = boundary.constrained_right_edge_elevation.unwrap();
        let cross_fall = 10.0 * 0.05f32.sin();
        assert!((cross_fall - 0.5).abs() < 1e-3);
        assert!((h - l - cross_fall).abs() < 1e-3, "left {}", l);
        assert!((h - r - cross_fall).abs() < 1e-3, "right {}", r);
        // A perpendicular branch has both edges at the same lateral offset on a level primary.
        assert!((l - r).abs() < 1e-5);
        assert!((boundary.left_edge() - l).abs() < 1e-6);
        assert!((boundary.target_elevation - 0.5 * (l + r)).abs() < 1e-6);

        let first = &secondary.sections[0];
        assert!((first.constrained_left_edge_elevation.unwrap() - h).abs() < 1e-4);
    }

    #[test]
    fn test_mouth_follows_primary_grade() {
        let grid = HeightmapGrid::from_fn(128, 128, 1.0, |x, _| 10.0 + 0.04 * x);
        let mut net = t_on(&grid, 0.0);
        let primary = net.junctions[0].primary.unwrap();
        assert!((primary.slope - 0.04).abs() < 1e-4);
        let h = net.junctions[0].harmonized_elevation.unwrap();
        assert!((h - 12.0).abs() < 1e-4);

        apply_junction_surfaces(&mut net, &ElevationConfig::default(), &CancellationToken::new());

        // Secondary runs +y, so its left edge lies 5 m downhill along the primary.
        let boundary = &net.edges[1].sections[5];
        let l = boundary.constrained_left_edge_elevation.unwrap();
        let r = boundary.constrained_right_edge_elevation.unwrap();
        assert!((l - (h - 5.0 * 0.04)).abs() < 1e-3, "left {}", l);
        assert!((r - (h + 5.0 * 0.04)).abs() < 1e-3, "right {}", r);
        assert!(((r - l) - 2.0 * 5.0 * 0.04).abs() < 1e-3);
        assert!((boundary.target_elevation - h).abs() < 1e-3);
    }

    #[test]
    fn test_mouth_found_when_junction_is_off_first_section() {
        let mut net = banked_t();
        let config = ElevationConfig::default();
        let junction = net.junctions[0].clone();
        let frame = primary_frame(&net, &junction, EdgeId(0), 0.0).unwrap();

        let secondary = net.edge_mut(EdgeId(1)).unwrap();
        let count = constrain_terminating(secondary, 1, &frame, &config);
        // Sections at 0..=12 m lie within 10 m of the section at 2 m.
        assert_eq!(count, 7);
        assert!(secondary.sections[..7]
            .iter()
            .all(|s| s.constrained_left_edge_elevation.is_some()));
        assert!(secondary.sections.last().unwrap().constrained_left_edge_elevation.is_none());
    }

    #[test]
    fn test_mouth_follows_primary_and_fade_ends() {
        let mut net = banked_t();
        let h = net.junctions[0].harmonized_elevation.unwrap();
        let config = ElevationConfig::default();
        apply_junction_surfaces(&mut net, &config, &CancellationToken::new());

        let secondary = &net.edges[1];
        assert!((secondary.sections[0].target_elevation - h).abs() < 1e-4);
        assert!(secondary.sections[..=5]
            .iter()
            .all(|s| s.constrained_left_edge_elevation.is_some()));
        assert!(secondary.sections[6..]
            .iter()
            .all(|s| s.constrained_left_edge_elevation.is_none()));

        // Past mouth + blend distance the road keeps its own flat profile.
        let far = secondary.sections.last().unwrap();
        assert!(far.distance > 10.0 + config.blend_distance_meters);
        assert!((far.target_elevation - 10.0).abs() < 1e-4);
        assert!((far.left_edge() - far.right_edge()).abs() < 1e-5);

        // Just past the mouth the offset is partially carried.
        let next = &secondary.sections[6];
        assert!(next.target_elevation < 10.0 && next.target_elevation > 10.0 - 0.5);
    }

    #[test]
    fn test_primary_untouched() {
        let mut net = banked_t();
        let before: Vec<f32> = net.edges[0].sections.iter().map(|s| s.target_elevation).collect();
        apply_junction_surfaces(&mut net, &ElevationConfig::default(), &CancellationToken::new());
        let after: Vec<f32> = net.edges[0].sections.iter().map(|s| s.target_elevation).collect();
        assert_eq!(before, after);
        assert!(net.edges[0].sections.iter().all(|s| s.constrained_left_edge_elevation.is_none()));
    }
}
