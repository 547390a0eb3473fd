//! Independent elevation profiles for bridges and tunnels.

use log::{debug, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::diagnostics::{Diagnostic, GradeOrigin};
use crate::geometry::smoothstep;
use crate::network::{EdgeId, JunctionId, JunctionRole, RoadEdge, UnifiedRoadNetwork};
use crate::pipeline::{CancellationToken, WorkItem};
use crate::terrain::HeightmapGrid;

use super::config::StructureConfig;
use super::smoothing::violation;

/// Parameter samples used to measure a profile's steepest grade.
const GRADE_SAMPLES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StructureKind {
    Bridge,
    Tunnel,
}

/// Vertical curve of a structure profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StructureCurve {
    /// Straight ramp between entry and exit.
    Linear,
    /// Ramp with a downward sag of `peak_offset`.
    Parabolic,
    /// Ramp with an upward rise of `peak_offset`.
    Arch,
    /// Eased descent over the first quarter, level middle half, eased ascent.
    SCurve,
}

/// Where an entry or exit elevation came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum EndpointSource {
    /// Harmonized elevation of a junction shared with a regular road.
    Junction(JunctionId),
    /// Elevation of the nearest regular-road cross-section within tolerance.
    ConnectedRoad(EdgeId),
    /// Originally sampled terrain.
    Terrain,
}

/// Elevation data for a bridge or tunnel edge, for downstream structural geometry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureElevationProfile {
    pub kind: StructureKind,
    pub curve: StructureCurve,
    pub length: f32,
    pub entry_elevation: f32,
    pub exit_elevation: f32,
    pub entry_source: EndpointSource,
    pub exit_source: EndpointSource,
    /// Signed mid-span offset from the straight ramp (sag < 0, rise > 0).
    pub peak_offset: f32,
    /// Required cover above a tunnel ceiling; 0 for bridges.
    pub min_clearance: f32,
    /// Terrain sampled evenly along the path, entry to exit.
    pub terrain_samples: Vec<f32>,
    pub lowest_point_elevation: f32,
    /// Profile elevation at each of the edge's cross-sections.
    pub elevations: Vec<f32>,
    /// Steepest grade of the profile (percent).
    pub max_grade_percent: f32,
    /// Smallest cover above the ceiling over the middle half of a tunnel.
    pub achieved_clearance: Option<f32>,
}

impl StructureElevationProfile {
    /// Profile elevation at normalized position `t` in [0, 1] along the structure.
    pub fn elevation_at(&self, t: f32) -> f32 {
        curve_elevation(
            self.curve,
            self.entry_elevation,
            self.exit_elevation,
            self.peak_offset,
            self.lowest_point_elevation,
            t,
        )
    }
}

fn curve_elevation(curve: StructureCurve, entry: f32, exit: f32, peak: f32, low: f32, t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    let linear = entry + (exit - entry) * t;
    match curve {
        StructureCurve::Linear => linear,
        StructureCurve::Parabolic | StructureCurve::Arch => linear + peak * 4.0 * t * (1.0 - t),
        StructureCurve::SCurve => {
            if t < 0.25 {
                entry + (low - entry) * smoothstep(0.0, 0.25, t)
            } else if t <= 0.75 {
                low
            } else {
                low + (exit - low) * smoothstep(0.75, 1.0, t)
            }
        }
    }
}

/// Steepest grade over the unit profile, with the arc length where it occurs.
fn steepest(length: f32, f: impl Fn(f32) -> f32) -> (f32, f32) {
    let run = length / GRADE_SAMPLES as f32;
    (0..GRADE_SAMPLES)
        .map(|k| {
            let (t0, t1) = (k as f32 / GRADE_SAMPLES as f32, (k + 1) as f32 / GRADE_SAMPLES as f32);
            (((f(t1) - f(t0)) / run).abs(), t0 * length)
        })
        .fold((0.0, 0.0), |best, cur| if cur.0 > best.0 { cur } else { best })
}

/// Bridge curve by length class and its signed mid-span offset.
pub fn plan_bridge(length: f32, config: &StructureConfig) -> (StructureCurve, f32) {
    if length < config.short_bridge_max_length_meters {
        (StructureCurve::Linear, 0.0)
    } else if length <= config.medium_bridge_max_length_meters {
        let sag = (config.sag_ratio * length).min(config.max_sag_meters);
        (StructureCurve::Parabolic, -sag)
    } else {
        let rise = (config.rise_ratio * length).min(config.max_rise_meters);
        (StructureCurve::Arch, rise)
    }
}

/// Tunnel curve and its lowest floor elevation from terrain sampled along the path.
///
/// The straight ramp is kept when its midpoint is at or below the required floor and
/// every interior sample keeps clearance plus interior height of cover. Otherwise the
/// S-curve levels out at the tightest floor across the middle half, never above the
/// required floor or the lower portal.
pub fn plan_tunnel(entry: f32, exit: f32, samples: &[f32], config: &StructureConfig) -> (StructureCurve, f32) {
    let cover = config.tunnel_min_clearance_meters + config.tunnel_interior_height_meters;
    let peak = samples.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let required_floor = peak - cover;
    let n = samples.len();
    let at = |k: usize| if n > 1 { k as f32 / (n - 1) as f32 } else { 0.5 };

    let midpoint = 0.5 * (entry + exit);
    let covered = samples.iter().enumerate().all(|(k, &terrain)| {
        let t = at(k);
        t <= 0.0 || t >= 1.0 || entry + (exit - entry) * t <= terrain - cover
    });
    if midpoint <= required_floor && covered {
        return (StructureCurve::Linear, entry.min(exit));
    }

    let tightest = samples
        .iter()
        .enumerate()
        .filter(|&(k, _)| (0.25..=0.75).contains(&at(k)))
        .map(|(_, &terrain)| terrain - cover)
        .fold(f32::INFINITY, f32::min);
    let lowest = required_floor.min(tightest).min(entry.min(exit));
    (StructureCurve::SCurve, lowest)
}

/// Builds the profile for one structure edge.
///
/// A tunnel S-curve never descends faster than the tunnel grade limit allows; when that
/// keeps the floor above the cover it needs, the shortfall is reported as a
/// `ClearanceViolation` carrying the profile's own `achieved_clearance`.
pub fn structure_profile(
    edge: &RoadEdge,
    entry: (f32, EndpointSource),
    exit: (f32, EndpointSource),
    heightmap: &HeightmapGrid,
    config: &StructureConfig,
    max_grade: f32,
) -> (StructureElevationProfile, Vec<Diagnostic>) {
    let length = edge.length();
    let kind = if edge.is_tunnel {
        StructureKind::Tunnel
    } else {
        StructureKind::Bridge
    };
    let count = config.terrain_sample_count.max(2);
    let terrain_samples: Vec<f32> = (0..count)
        .map(|k| {
            let d = length * k as f32 / (count - 1) as f32;
            heightmap.sample_bilinear(edge.spline.point_at_distance(d))
        })
        .collect();

    let (e0, e1) = (entry.0, exit.0);
    let (limit, origin) = match kind {
        StructureKind::Bridge => (max_grade, GradeOrigin::Bridge),
        StructureKind::Tunnel => (config.tunnel_max_grade(), GradeOrigin::Tunnel),
    };
    let (curve, peak_offset, mut lowest) = match kind {
        StructureKind::Bridge => {
            let (curve, peak) = plan_bridge(length, config);
            (curve, peak, f32::NAN)
        }
        StructureKind::Tunnel => {
            let (curve, lowest) = plan_tunnel(e0, e1, &terrain_samples, config);
            (curve, 0.0, lowest)
        }
    };
    if curve == StructureCurve::SCurve {
        // Steepest point of a smoothstep descent is 1.5x its mean grade.
        let reachable = e0.max(e1) - limit * 0.25 * length / 1.5;
        let floor = lowest.max(reachable.min(e0.min(e1)));
        if floor > lowest + 1e-4 {
            debug!(
                "edge {}: tunnel floor held at {:.2} (wanted {:.2}) by the grade limit",
                edge.id, floor, lowest
            );
            lowest = floor;
        }
    }
    let profile_at = |t: f32| curve_elevation(curve, e0, e1, peak_offset, lowest, t);

    let elevations: Vec<f32> = edge
        .sections
        .iter()
        .map(|s| profile_at(if length > 0.0 { s.distance / length } else { 0.0 }))
        .collect();
    let lowest_point_elevation = match curve {
        StructureCurve::SCurve => lowest,
        _ => (0..=GRADE_SAMPLES)
            .map(|k| profile_at(k as f32 / GRADE_SAMPLES as f32))
            .fold(f32::INFINITY, f32::min),
    };

    let (grade, at) = steepest(length, &profile_at);

    let mut diagnostics = Vec::new();
    if grade > limit + 1e-4 {
        diagnostics.push(violation(edge.id, at, grade, limit, origin));
    }

    let mut achieved_clearance = None;
    if kind == StructureKind::Tunnel {
        let interior = config.tunnel_interior_height_meters;
        achieved_clearance = terrain_samples
            .iter()
            .enumerate()
            .map(|(k, &terrain)| (k as f32 / (count - 1) as f32, terrain))
            .filter(|(t, _)| (0.25..=0.75).contains(t))
            .map(|(t, terrain)| terrain - interior - profile_at(t))
            .reduce(f32::min);

        let required = config.tunnel_min_clearance_meters;
        if let Some(achieved) = achieved_clearance.filter(|&c| c < required - 1e-3) {
            diagnostics.push(Diagnostic::ClearanceViolation {
                edge: edge.id,
                required_clearance: required,
                achieved_clearance: achieved,
            });
        }
    }

    (
        StructureElevationProfile {
            kind,
            curve,
            length,
            entry_elevation: e0,
            exit_elevation: e1,
            entry_source: entry.1,
            exit_source: exit.1,
            peak_offset,
            min_clearance: if kind == StructureKind::Tunnel {
                config.tunnel_min_clearance_meters
            } else {
                0.0
            },
            terrain_samples,
            lowest_point_elevation,
            elevations,
            max_grade_percent: grade * 100.0,
            achieved_clearance,
        },
        diagnostics,
    )
}

/// Entry (`at_end == false`) or exit elevation of a structure edge.
///
/// Prefers the harmonized elevation of a junction at that end shared with a regular
/// road, then the nearest regular-road cross-section within `tolerance`, then terrain.
pub fn resolve_endpoint(
    network: &UnifiedRoadNetwork,
    edge: &RoadEdge,
    at_end: bool,
    tolerance: f32,
) -> (f32, EndpointSource) {
    let Some(section) = (if at_end { edge.sections.last() } else { edge.sections.first() }) else {
        return (0.0, EndpointSource::Terrain);
    };

    for &jid in network.junctions_of(edge.id) {
        let Some(junction) = network.junction(jid) else {
            continue;
        };
        let Some(h) = junction.harmonized_elevation else {
            continue;
        };
        let Some(inc) = junction.incidence(edge.id) else {
            continue;
        };
        let at_this_end = inc.role == JunctionRole::Terminating
            && (inc.distance - section.distance).abs() <= tolerance;
        let has_regular = junction
            .incidences
            .iter()
            .filter_map(|i| network.edge(i.edge))
            .any(|e| !e.is_structure());
        if at_this_end && has_regular {
            return (h, EndpointSource::Junction(jid));
        }
    }

    let connected = network
        .edges
        .iter()
        .filter(|e| e.id != edge.id && !e.is_structure())
        .map(|e| {
            let (i, d) = e.nearest_section(section.center);
            (e, i, d)
        })
        .filter(|(_, _, d)| *d <= tolerance)
        .min_by(|a, b| a.2.total_cmp(&b.2));
    if let Some((road, i, _)) = connected {
        return (road.sections[i].target_elevation, EndpointSource::ConnectedRoad(road.id));
    }

    (section.terrain_elevation, EndpointSource::Terrain)
}

/// Computes profiles for every structure edge in parallel and stores them on the edges.
///
/// With `exclude_structures` off, the profile is also written into the cross-sections,
/// which then take part in terrain writing and painting.
///
/// # Returns
/// Diagnostics from all structures, and edges skipped because `cancel` fired
pub fn apply_structures(
    network: &mut UnifiedRoadNetwork,
    heightmap: &HeightmapGrid,
    config: &StructureConfig,
    max_grade: f32,
    tolerance: f32,
    cancel: &CancellationToken,
) -> (Vec<Diagnostic>, Vec<WorkItem>) {
    let planned: Vec<Result<(usize, StructureElevationProfile, Vec<Diagnostic>), EdgeId>> = {
        let net = &*network;
        net.edges
            .par_iter()
            .enumerate()
            .filter(|(_, e)| e.is_structure() && e.length() > 1e-3)
            .map(|(idx, edge)| {
                if cancel.is_cancelled() {
                    return Err(edge.id);
                }
                let entry = resolve_endpoint(net, edge, false, tolerance);
                let exit = resolve_endpoint(net, edge, true, tolerance);
                let (profile, diags) = structure_profile(edge, entry, exit, heightmap, config, max_grade);
                Ok((idx, profile, diags))
            })
            .collect()
    };

    let mut diagnostics = Vec::new();
    let mut unprocessed = Vec::new();
    for result in planned {
        match result {
            Ok((idx, profile, diags)) => {
                let edge = &mut network.edges[idx];
                debug!(
                    "edge {}: {:?} {:?} over {:.1} m, lowest {:.2}",
                    edge.id, profile.kind, profile.curve, profile.length, profile.lowest_point_elevation
                );
                for d in &diags {
                    warn!("{}", d);
                }
                if !config.exclude_structures {
                    for (s, &e) in edge.sections.iter_mut().zip(&profile.elevations) {
                        s.target_elevation = e;
                        s.is_excluded = false;
                    }
                }
                edge.structure = Some(profile);
                diagnostics.extend(diags);
            }
            Err(id) => unprocessed.push(WorkItem::Edge(id)),
        }
    }
    (diagnostics, unprocessed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{build_network, NetworkConfig, RoadClass, RoadInput};
    use glam::Vec2;

    fn straight(length: f32, grid: &HeightmapGrid, tunnel: bool) -> RoadEdge {
        let road = RoadInput::new(vec![Vec2::new(0.0, 20.0), Vec2::new(length, 20.0)], 8.0, RoadClass::Primary);
        let road = if tunnel { road.tunnel() } else { road.bridge() };
        RoadEdge::build(EdgeId(0), &road, 3.0, grid).unwrap()
    }

    fn grid_for(length: f32, f: impl Fn(f32) -> f32) -> HeightmapGrid {
        let width = (length / 5.0) as u32 + 4;
        HeightmapGrid::from_fn(width, 10, 5.0, move |x, _| f(x))
    }

    #[test]
    fn test_bridge_classes() {
        let config = StructureConfig::default();
        assert_eq!(plan_bridge(40.0, &config), (StructureCurve::Linear, 0.0));
        let (curve, sag) = plan_bridge(120.0, &config);
        assert_eq!(curve, StructureCurve::Parabolic);
        assert!((sag + 0.6).abs() < 1e-6);
        assert_eq!(plan_bridge(200.0, &config).0, StructureCurve::Parabolic);
        assert!((plan_bridge(1000.0, &config).1 - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_long_bridge_arches_above_linear() {
        let grid = grid_for(300.0, |_| 0.0);
        let edge = straight(300.0, &grid, false);
        let (profile, diags) = structure_profile(
            &edge,
            (100.0, EndpointSource::Terrain),
            (104.0, EndpointSource::Terrain),
            &grid,
            &StructureConfig::default(),
            0.08,
        );
        assert_eq!(profile.curve, StructureCurve::Arch);
        let mid = profile.elevation_at(0.5);
        assert!(mid > 102.0 && mid - 102.0 <= 3.0 + 1e-4);
        assert!((mid - 105.0).abs() < 1e-4);
        assert!(diags.is_empty());
        assert_eq!(profile.elevations.len(), edge.sections.len());
        assert!((profile.elevations[0] - 100.0).abs() < 1e-4);
    }

    #[test]
    fn test_steep_short_bridge_reports_grade() {
        let grid = grid_for(40.0, |_| 0.0);
        let edge = straight(40.0, &grid, false);
        let (profile, diags) = structure_profile(
            &edge,
            (100.0, EndpointSource::Terrain),
            (110.0, EndpointSource::Terrain),
            &grid,
            &StructureConfig::default(),
            0.08,
        );
        assert_eq!(profile.curve, StructureCurve::Linear);
        assert!((profile.max_grade_percent - 25.0).abs() < 1e-2);
        assert!(matches!(
            diags.as_slice(),
            [Diagnostic::GradeViolation { origin: GradeOrigin::Bridge, .. }]
        ));
        // Reported, not corrected.
        assert!((profile.elevations.last().unwrap() - 110.0).abs() < 1e-4);
    }

    #[test]
    fn test_ridge_tunnel_uses_s_curve() {
        let ridge = |x: f32| 100.0 + 40.0 * (1.0 - (x - 300.0).abs() / 300.0).max(0.0);
        let grid = grid_for(600.0, ridge);
        let edge = straight(600.0, &grid, true);
        let (profile, diags) = structure_profile(
            &edge,
            (100.0, EndpointSource::Terrain),
            (100.0, EndpointSource::Terrain),
            &grid,
            &StructureConfig::default(),
            0.08,
        );
        assert_eq!(profile.curve, StructureCurve::SCurve);
        assert_eq!(profile.terrain_samples.len(), 20);
        let peak = profile.terrain_samples.iter().copied().fold(f32::MIN, f32::max);
        assert!(profile.lowest_point_elevation <= peak - 10.0);
        assert!(profile.achieved_clearance.unwrap() >= 5.0 - 1e-3);
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn test_deep_cover_keeps_linear_tunnel() {
        let grid = grid_for(200.0, |_| 300.0);
        let edge = straight(200.0, &grid, true);
        let (profile, _) = structure_profile(
            &edge,
            (100.0, EndpointSource::Terrain),
            (106.0, EndpointSource::Terrain),
            &grid,
            &StructureConfig::default(),
            0.08,
        );
        assert_eq!(profile.curve, StructureCurve::Linear);
        assert!((profile.lowest_point_elevation - 100.0).abs() < 1e-4);
        assert!(profile.achieved_clearance.unwrap() > 180.0);
    }

    #[test]
    fn test_shallow_tunnel_reports_clearance() {
        let grid = grid_for(60.0, |_| 100.0);
        let edge = straight(60.0, &grid, true);
        let (profile, diags) = structure_profile(
            &edge,
            (100.0, EndpointSource::Terrain),
            (100.0, EndpointSource::Terrain),
            &grid,
            &StructureConfig::default(),
            0.08,
        );
        assert_eq!(profile.curve, StructureCurve::SCurve);
        // 6 % over a 15 m quarter, steepest at 1.5x the mean: 0.6 m of descent.
        assert!((profile.lowest_point_elevation - 99.4).abs() < 1e-3);
        assert!(profile.elevations.iter().all(|&e| e >= 99.4 - 1e-3));
        assert!(profile.max_grade_percent <= 6.0 + 1e-2);

        let clearance = diags.iter().find_map(|d| match d {
            Diagnostic::ClearanceViolation { achieved_clearance, required_clearance, .. } => {
                Some((*achieved_clearance, *required_clearance))
            }
            _ => None,
        });
        let (achieved, required) = clearance.unwrap();
        assert_eq!(required, 5.0);
        assert!((achieved - (100.0 - 5.0 - 99.4)).abs() < 1e-3);
        assert_eq!(Some(achieved), profile.achieved_clearance);
        assert!(!diags.iter().any(|d| matches!(d, Diagnostic::GradeViolation { .. })));
    }

    #[test]
    fn test_endpoint_falls_back_to_nearby_road() {
        let grid = grid_for(320.0, |x| 50.0 + 0.01 * x);
        let build = |id: usize, road: RoadInput| RoadEdge::build(EdgeId(id), &road, 3.0, &grid).unwrap();
        let edges = vec![
            build(0, RoadInput::new(vec![Vec2::new(0.0, 20.0), Vec2::new(98.5, 20.0)], 8.0, RoadClass::Primary)),
            build(1, RoadInput::new(vec![Vec2::new(100.0, 20.0), Vec2::new(300.0, 20.0)], 8.0, RoadClass::Primary).bridge()),
        ];
        // Too far apart to join at 0.5 m, close enough to borrow an elevation at 2 m.
        let config = NetworkConfig {
            connection_tolerance_meters: 0.5,
            ..Default::default()
        };
        let (network, _) = build_network(edges, &config);
        assert!(network.junctions.is_empty());

        let bridge = network.edge(EdgeId(1)).unwrap();
        let road_end = network.edge(EdgeId(0)).unwrap().sections.last().unwrap().target_elevation;
        let (entry, source) = resolve_endpoint(&network, bridge, false, 2.0);
        assert_eq!(source, EndpointSource::ConnectedRoad(EdgeId(0)));
        assert_eq!(entry, road_end);

        let (exit, source) = resolve_endpoint(&network, bridge, true, 2.0);
        assert_eq!(source, EndpointSource::Terrain);
        assert_eq!(exit, bridge.sections.last().unwrap().terrain_elevation);
    }
}
