//! Junction elevation agreement and distance-based propagation.
//!
//! Runs in two stages. The agreed value of every junction is computed once from the
//! pre-harmonization snapshot, then propagated along incident edges as an offset that
//! fades with the configured falloff. Results depend only on geometry and configuration,
//! never on the order junctions are visited.

use log::debug;
use rayon::prelude::*;

use crate::network::{
    EdgeId, Junction, JunctionId, JunctionRole, JunctionType, PrimaryRoad, RoadEdge,
    UnifiedRoadNetwork,
};
use crate::pipeline::{CancellationToken, WorkItem};

use super::config::ElevationConfig;

/// A junction offset acting on one edge.
#[derive(Debug, Clone, Copy)]
struct Influence {
    junction: JunctionId,
    /// Arc length of the junction section along the edge.
    distance: f32,
    /// Harmonized elevation minus the edge's own elevation at the junction.
    delta: f32,
}

/// Computes and propagates the harmonized elevation of every junction.
///
/// # Returns
/// Work items left unprocessed because `cancel` fired (empty on completion)
pub fn harmonize_junctions(
    network: &mut UnifiedRoadNetwork,
    config: &ElevationConfig,
    cancel: &CancellationToken,
) -> Vec<WorkItem> {
    let pre: Vec<Vec<f32>> = network
        .edges
        .iter()
        .map(|e| e.sections.iter().map(|s| s.target_elevation).collect())
        .collect();

    // Stage 1: one authoritative value per junction.
    let mut values = Vec::with_capacity(network.junctions.len());
    for (n, junction) in network.junctions.iter().enumerate() {
        if cancel.is_cancelled() {
            return network.junctions[n..]
                .iter()
                .map(|j| WorkItem::Junction(j.id))
                .collect();
        }
        let value = junction_value(network, &pre, junction);
        let primary = if junction.kind == JunctionType::T {
            junction.through().next().and_then(|inc| {
                let idx = network.edge_index(inc.edge)?;
                let slope = windowed_slope(
                    &network.edges[idx],
                    &pre[idx],
                    inc.distance,
                    config.slope_window_meters,
                );
                Some(PrimaryRoad {
                    edge: inc.edge,
                    slope,
                })
            })
        } else {
            None
        };
        values.push((value, primary));
    }
    for (junction, (value, primary)) in network.junctions.iter_mut().zip(values) {
        junction.harmonized_elevation = value;
        junction.primary = primary;
    }

    // Stage 2: offset propagation, independent per edge.
    let mut influences: Vec<Vec<Influence>> = vec![Vec::new(); network.edges.len()];
    for junction in &network.junctions {
        let Some(h) = junction.harmonized_elevation else {
            continue;
        };
        for inc in &junction.incidences {
            let Some(idx) = network.edge_index(inc.edge) else {
                continue;
            };
            if network.edges[idx].sections[inc.section].is_excluded {
                continue;
            }
            influences[idx].push(Influence {
                junction: junction.id,
                distance: inc.distance,
                delta: h - pre[idx][inc.section],
            });
        }
    }

    let unprocessed: Vec<EdgeId> = network
        .edges
        .par_iter_mut()
        .zip(pre.par_iter().zip(influences.par_iter()))
        .filter_map(|(edge, (pre, influences))| {
            if cancel.is_cancelled() {
                return Some(edge.id);
            }
            apply_influences(edge, pre, influences, config);
            None
        })
        .collect();
    if !unprocessed.is_empty() {
        return unprocessed.into_iter().map(WorkItem::Edge).collect();
    }

    let plateaus = network
        .junctions
        .iter()
        .filter(|j| plateau_eligible(network, j, config))
        .map(|j| j.id)
        .collect::<Vec<_>>();
    for id in &plateaus {
        apply_plateau(network, *id, config);
    }

    pin_through_sections(network);

    debug!(
        "harmonized {} junctions ({} plateaus)",
        network.junctions.len(),
        plateaus.len()
    );
    Vec::new()
}

/// Agreed elevation of a junction from the pre-harmonization snapshot.
///
/// Contributors are the non-excluded through edges, or every non-excluded incident edge
/// when none passes through. A unique highest-priority contributor defines the value;
/// otherwise the highest-priority tier is averaged and lower tiers are ignored.
fn junction_value(network: &UnifiedRoadNetwork, pre: &[Vec<f32>], junction: &Junction) -> Option<f32> {
    struct Contribution {
        priority: i32,
        elevation: f32,
        role: JunctionRole,
        excluded: bool,
    }

    let all: Vec<Contribution> = junction
        .incidences
        .iter()
        .filter_map(|inc| {
            let idx = network.edge_index(inc.edge)?;
            let edge = &network.edges[idx];
            Some(Contribution {
                priority: edge.priority,
                elevation: pre[idx][inc.section],
                role: inc.role,
                excluded: edge.sections[inc.section].is_excluded,
            })
        })
        .collect();

    let regular: Vec<&Contribution> = all.iter().filter(|c| !c.excluded).collect();
    let through: Vec<&Contribution> = regular
        .iter()
        .copied()
        .filter(|c| c.role == JunctionRole::Through)
        .collect();
    let contributors = if !through.is_empty() {
        through
    } else if !regular.is_empty() {
        regular
    } else {
        all.iter().collect()
    };

    let top = contributors.iter().map(|c| c.priority).max()?;
    let tier: Vec<f32> = contributors
        .iter()
        .filter(|c| c.priority == top)
        .map(|c| c.elevation)
        .collect();
    Some(tier.iter().sum::<f32>() / tier.len() as f32)
}

/// Rise over run of `profile` across a symmetric window centred on `distance`.
pub(crate) fn windowed_slope(edge: &RoadEdge, profile: &[f32], distance: f32, window: f32) -> f32 {
    let lo = edge.section_at_distance(distance - window * 0.5);
    let hi = edge.section_at_distance(distance + window * 0.5);
    if hi <= lo {
        return 0.0;
    }
    let run = edge.sections[hi].distance - edge.sections[lo].distance;
    if run <= f32::EPSILON {
        return 0.0;
    }
    (profile[hi] - profile[lo]) / run
}

/// Combined offset at `distance`: the nearest junction dominates and the others fill in
/// what it leaves, `w_n δ_n + (1 - w_n) Σ w_i δ_i`.
fn blended_offset(distance: f32, influences: &[Influence], config: &ElevationConfig) -> f32 {
    let Some(nearest) = influences.iter().min_by(|a, b| {
        (a.distance - distance)
            .abs()
            .total_cmp(&(b.distance - distance).abs())
            .then(a.junction.cmp(&b.junction))
    }) else {
        return 0.0;
    };
    let weight = |i: &Influence| {
        config
            .falloff
            .weight(i.distance - distance, config.blend_distance_meters)
    };
    let wn = weight(nearest);
    let rest: f32 = influences
        .iter()
        .filter(|i| !std::ptr::eq(*i, nearest))
        .map(|i| weight(i) * i.delta)
        .sum();
    wn * nearest.delta + (1.0 - wn) * rest
}

fn apply_influences(edge: &mut RoadEdge, pre: &[f32], influences: &[Influence], config: &ElevationConfig) {
    if influences.is_empty() {
        return;
    }
    for (s, &base) in edge.sections.iter_mut().zip(pre) {
        if s.is_excluded {
            continue;
        }
        s.target_elevation = base + blended_offset(s.distance, influences, config);
    }
}

/// Y/X/Complex junctions whose incident roads have comparable priority.
fn plateau_eligible(network: &UnifiedRoadNetwork, junction: &Junction, config: &ElevationConfig) -> bool {
    if junction.kind == JunctionType::T || junction.harmonized_elevation.is_none() {
        return false;
    }
    let priorities: Vec<i32> = junction
        .incidences
        .iter()
        .filter_map(|inc| network.edge(inc.edge))
        .filter(|e| !e.is_structure())
        .map(|e| e.priority)
        .collect();
    match (priorities.iter().min(), priorities.iter().max()) {
        (Some(lo), Some(hi)) => priorities.len() >= 2 && hi - lo <= config.plateau_priority_tolerance,
        _ => false,
    }
}

/// Flattens every incident edge to the harmonized value within the plateau radius and
/// eases back over the blend distance beyond it.
fn apply_plateau(network: &mut UnifiedRoadNetwork, id: JunctionId, config: &ElevationConfig) {
    let Some(junction) = network.junction(id).cloned() else {
        return;
    };
    let Some(h) = junction.harmonized_elevation else {
        return;
    };
    let radius = junction
        .incidences
        .iter()
        .filter_map(|inc| network.edge(inc.edge))
        .map(|e| e.half_width())
        .fold(0.0f32, f32::max)
        + config.plateau_margin_meters;

    for inc in &junction.incidences {
        let Some(edge) = network.edge_mut(inc.edge) else {
            continue;
        };
        for s in edge.sections.iter_mut().filter(|s| !s.is_excluded) {
            let r = (s.distance - inc.distance).abs();
            if r <= radius {
                s.target_elevation = h;
            } else {
                let w = config.falloff.weight(r - radius, config.blend_distance_meters);
                s.target_elevation += w * (h - s.target_elevation);
            }
        }
    }
}

/// Sets every through edge's junction section to the harmonized value exactly.
fn pin_through_sections(network: &mut UnifiedRoadNetwork) {
    let pins: Vec<(EdgeId, usize, f32)> = network
        .junctions
        .iter()
        .filter_map(|j| j.harmonized_elevation.map(|h| (j, h)))
        .flat_map(|(j, h)| j.through().map(move |inc| (inc.edge, inc.section, h)))
        .collect();
    for (edge, section, h) in pins {
        if let Some(s) = network
            .edge_mut(edge)
            .and_then(|e| e.sections.get_mut(section))
            .filter(|s| !s.is_excluded)
        {
            s.target_elevation = h;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{build_network, NetworkConfig, RoadClass, RoadInput};
    use crate::terrain::HeightmapGrid;
    use glam::Vec2;

    fn network(roads: &[RoadInput]) -> UnifiedRoadNetwork {
        let grid = HeightmapGrid::flat(128, 128, 1.0, 0.0);
        let edges = roads
            .iter()
            .enumerate()
            .map(|(i, r)| RoadEdge::build(EdgeId(i), r, 3.0, &grid).unwrap())
            .collect();
        build_network(edges, &NetworkConfig::default()).0
    }

    fn road(a: (f32, f32), b: (f32, f32), class: RoadClass) -> RoadInput {
        RoadInput::new(vec![Vec2::new(a.0, a.1), Vec2::new(b.0, b.1)], 8.0, class)
    }

    fn set_profile(net: &mut UnifiedRoadNetwork, edge: usize, f: impl Fn(f32) -> f32) {
        for s in &mut net.edges[edge].sections {
            s.target_elevation = f(s.distance);
        }
    }

    #[test]
    fn test_t_junction_falloff_is_monotone() {
        let mut net = network(&[
            road((0.0, 20.0), (60.0, 20.0), RoadClass::Primary),
            road((30.0, 20.0), (30.0, 80.0), RoadClass::Residential),
        ]);
        set_profile(&mut net, 0, |_| 10.0);
        set_profile(&mut net, 1, |d| 20.0 + 0.05 * d);
        let pre: Vec<f32> = net.edges[1].sections.iter().map(|s| s.target_elevation).collect();

        let config = ElevationConfig::default();
        let left = harmonize_junctions(&mut net, &config, &CancellationToken::new());
        assert!(left.is_empty());

        let j = &net.junctions[0];
        assert_eq!(j.kind, JunctionType::T);
        assert!((j.harmonized_elevation.unwrap() - 10.0).abs() < 1e-5);
        assert_eq!(j.primary.unwrap().edge, EdgeId(0));
        assert!(j.primary.unwrap().slope.abs() < 1e-6);

        let mut prev = f32::INFINITY;
        for (s, base) in net.edges[1].sections.iter().zip(&pre) {
            let diff = (s.target_elevation - base).abs();
            assert!(diff <= prev + 1e-5);
            if s.distance >= config.blend_distance_meters {
                assert!(diff < 1e-5);
            }
            prev = diff;
        }
        assert!((net.edges[1].sections[0].target_elevation - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_equal_priority_crossing_averages() {
        let mut net = network(&[
            road((0.0, 30.0), (60.0, 30.0), RoadClass::Secondary),
            road((30.0, 0.0), (30.0, 60.0), RoadClass::Secondary),
        ]);
        set_profile(&mut net, 0, |_| 10.0);
        set_profile(&mut net, 1, |_| 14.0);
        harmonize_junctions(&mut net, &ElevationConfig::default(), &CancellationToken::new());

        let j = net.junctions[0].clone();
        let h = j.harmonized_elevation.unwrap();
        assert!((h - 12.0).abs() < 1e-5);
        for inc in j.through() {
            let e = net.edge(inc.edge).unwrap();
            assert!((e.sections[inc.section].target_elevation - h).abs() < 1e-4);
        }
    }

    #[test]
    fn test_dominant_priority_wins() {
        let mut net = network(&[
            road((0.0, 30.0), (60.0, 30.0), RoadClass::Primary),
            road((30.0, 0.0), (30.0, 60.0), RoadClass::Tertiary),
        ]);
        set_profile(&mut net, 0, |_| 10.0);
        set_profile(&mut net, 1, |_| 14.0);
        harmonize_junctions(&mut net, &ElevationConfig::default(), &CancellationToken::new());
        assert!((net.junctions[0].harmonized_elevation.unwrap() - 10.0).abs() < 1e-5);
        // Far ends keep their own profile.
        assert!((net.edges[1].sections[0].target_elevation - 14.0).abs() < 1e-5);
    }

    #[test]
    fn test_three_way_plateau() {
        let c = (64.0, 64.0);
        let arm = |deg: f32| {
            let r = deg.to_radians();
            road(c, (c.0 + 30.0 * r.cos(), c.1 + 30.0 * r.sin()), RoadClass::Residential)
        };
        let mut net = network(&[arm(90.0), arm(210.0), arm(330.0)]);
        set_profile(&mut net, 0, |_| 0.0);
        set_profile(&mut net, 1, |_| 3.0);
        set_profile(&mut net, 2, |_| 6.0);
        harmonize_junctions(&mut net, &ElevationConfig::default(), &CancellationToken::new());

        assert_eq!(net.junctions[0].kind, JunctionType::Y);
        let h = net.junctions[0].harmonized_elevation.unwrap();
        assert!((h - 3.0).abs() < 1e-5);
        for edge in &net.edges {
            assert!((edge.sections[0].target_elevation - h).abs() < 1e-5);
            assert!((edge.sections[1].target_elevation - h).abs() < 1e-5);
        }
    }

    #[test]
    fn test_cancelled_run_leaves_network_untouched() {
        let mut net = network(&[
            road((0.0, 30.0), (60.0, 30.0), RoadClass::Secondary),
            road((30.0, 0.0), (30.0, 60.0), RoadClass::Secondary),
        ]);
        set_profile(&mut net, 1, |_| 14.0);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let left = harmonize_junctions(&mut net, &ElevationConfig::default(), &cancel);
        assert_eq!(left, vec![WorkItem::Junction(JunctionId(0))]);
        assert!(net.junctions[0].harmonized_elevation.is_none());
        assert!(net.edges[1].sections.iter().all(|s| s.target_elevation == 14.0));
    }
}
