//! Junction detection and classification.

use std::collections::BTreeMap;
use std::fmt;

use glam::Vec2;
use log::{debug, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::diagnostics::Diagnostic;
use crate::geometry::{segment_intersection, signed_angle};

use super::config::NetworkConfig;
use super::road::{EdgeId, RoadEdge};

/// Stable junction identifier, assigned in detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct JunctionId(pub usize);

impl fmt::Display for JunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Geometric junction class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JunctionType {
    /// One road ends on the interior of another.
    T,
    /// Three roads end at a node with none passing straight through.
    Y,
    /// Four arms forming two roughly straight crossings.
    X,
    /// Anything else, including ambiguous geometry.
    Complex,
}

/// How an edge takes part in a junction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JunctionRole {
    /// The junction lies strictly inside the edge's span.
    Through,
    /// The junction sits at one of the edge's endpoints.
    Terminating,
}

/// One edge's attachment to a junction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Incidence {
    pub edge: EdgeId,
    /// Index of the edge's cross-section nearest the junction.
    pub section: usize,
    /// Arc length of that cross-section along the edge.
    pub distance: f32,
    pub role: JunctionRole,
}

/// The through road a T-junction's terminating road meets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrimaryRoad {
    pub edge: EdgeId,
    /// Longitudinal slope (rise/run along the edge direction) at the junction.
    pub slope: f32,
}

/// A node where two or more edges meet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Junction {
    pub id: JunctionId,
    pub position: Vec2,
    pub kind: JunctionType,
    pub incidences: Vec<Incidence>,
    /// Agreed elevation, set once by harmonization.
    pub harmonized_elevation: Option<f32>,
    /// Set by harmonization on T-junctions.
    pub primary: Option<PrimaryRoad>,
}

impl Junction {
    pub fn incidence(&self, edge: EdgeId) -> Option<&Incidence> {
        self.incidences.iter().find(|i| i.edge == edge)
    }

    pub fn through(&self) -> impl Iterator<Item = &Incidence> {
        self.incidences
            .iter()
            .filter(|i| i.role == JunctionRole::Through)
    }

    pub fn terminating(&self) -> impl Iterator<Item = &Incidence> {
        self.incidences
            .iter()
            .filter(|i| i.role == JunctionRole::Terminating)
    }
}

/// Edges, junctions and the edge → junction adjacency index.
#[derive(Debug, Clone, Default)]
pub struct UnifiedRoadNetwork {
    /// Sorted by id.
    pub edges: Vec<RoadEdge>,
    pub junctions: Vec<Junction>,
    pub adjacency: BTreeMap<EdgeId, Vec<JunctionId>>,
}

impl UnifiedRoadNetwork {
    pub fn edge_index(&self, id: EdgeId) -> Option<usize> {
        self.edges.binary_search_by_key(&id, |e| e.id).ok()
    }

    pub fn edge(&self, id: EdgeId) -> Option<&RoadEdge> {
        self.edge_index(id).map(|i| &self.edges[i])
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> Option<&mut RoadEdge> {
        self.edge_index(id).map(move |i| &mut self.edges[i])
    }

    pub fn junction(&self, id: JunctionId) -> Option<&Junction> {
        self.junctions.get(id.0)
    }

    /// Junctions touching an edge, in id order.
    pub fn junctions_of(&self, edge: EdgeId) -> &[JunctionId] {
        self.adjacency.get(&edge).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn section_count(&self) -> usize {
        self.edges.iter().map(|e| e.sections.len()).sum()
    }
}

/// A point where two edges were found close enough to connect.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    position: Vec2,
    edges: (EdgeId, EdgeId),
}

/// Axis-aligned bounds of an edge's sampled centerline.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    min: Vec2,
    max: Vec2,
}

impl Bounds {
    fn of(edge: &RoadEdge) -> Self {
        edge.sections.iter().fold(
            Bounds {
                min: Vec2::splat(f32::INFINITY),
                max: Vec2::splat(f32::NEG_INFINITY),
            },
            |b, s| Bounds {
                min: b.min.min(s.center),
                max: b.max.max(s.center),
            },
        )
    }

    fn overlaps(&self, other: &Bounds, margin: f32) -> bool {
        self.min.x - margin <= other.max.x
            && other.min.x - margin <= self.max.x
            && self.min.y - margin <= other.max.y
            && other.min.y - margin <= self.max.y
    }
}

/// Minimal union-find over candidate indices.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Keep the smaller root so cluster order follows candidate order.
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

/// Builds the unified network from sampled edges.
///
/// Junction candidates are edge endpoints lying within the connection tolerance of
/// another edge's cross-section, plus crossings between the sampled centerlines of two
/// regular roads (a bridge or tunnel only joins at its ends). Candidates
/// within tolerance of each other merge into one junction.
///
/// # Arguments
/// * `edges` - Successfully built edges (any order)
/// * `config` - Sampling and topology parameters
///
/// # Returns
/// The network and any junction ambiguity warnings
pub fn build_network(
    mut edges: Vec<RoadEdge>,
    config: &NetworkConfig,
) -> (UnifiedRoadNetwork, Vec<Diagnostic>) {
    edges.sort_by_key(|e| e.id);
    let tol = config.connection_tolerance_meters;

    let bounds: Vec<Bounds> = edges.iter().map(Bounds::of).collect();
    let candidates: Vec<Candidate> = (0..edges.len())
        .into_par_iter()
        .flat_map_iter(|i| {
            let mut found = Vec::new();
            for j in 0..edges.len() {
                if i == j || !bounds[i].overlaps(&bounds[j], tol) {
                    continue;
                }
                endpoint_candidates(&edges[i], &edges[j], tol, &mut found);
                // Structures pass over or under what they cross.
                if i < j && !edges[i].is_structure() && !edges[j].is_structure() {
                    crossing_candidates(&edges[i], &edges[j], &mut found);
                }
            }
            found
        })
        .collect();

    debug!("{} junction candidates from {} edges", candidates.len(), edges.len());

    let mut sets = DisjointSet::new(candidates.len());
    for a in 0..candidates.len() {
        for b in (a + 1)..candidates.len() {
            if candidates[a].position.distance(candidates[b].position) <= tol {
                sets.union(a, b);
            }
        }
    }

    let mut clusters: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..candidates.len() {
        let root = sets.find(i);
        clusters.entry(root).or_default().push(i);
    }

    let mut junctions = Vec::new();
    let mut diagnostics = Vec::new();

    for members in clusters.values() {
        let position = members
            .iter()
            .map(|&i| candidates[i].position)
            .sum::<Vec2>()
            / members.len() as f32;

        let mut edge_ids: Vec<EdgeId> = members
            .iter()
            .flat_map(|&i| [candidates[i].edges.0, candidates[i].edges.1])
            .collect();
        edge_ids.sort();
        edge_ids.dedup();
        if edge_ids.len() < 2 {
            continue;
        }

        let id = JunctionId(junctions.len());
        let mut incidences = Vec::with_capacity(edge_ids.len());
        let mut arms = Vec::with_capacity(edge_ids.len() * 2);
        for edge_id in edge_ids {
            let Ok(idx) = edges.binary_search_by_key(&edge_id, |e| e.id) else {
                continue;
            };
            let (incidence, edge_arms) = attach(&edges[idx], position, tol);
            arms.extend(edge_arms);
            incidences.push(incidence);
        }

        let (kind, ambiguity) = classify(&arms, config);
        if let Some(detail) = ambiguity {
            warn!("junction {} at ({:.1}, {:.1}): {}", id, position.x, position.y, detail);
            diagnostics.push(Diagnostic::JunctionAmbiguity { junction: id, detail });
        }

        junctions.push(Junction {
            id,
            position,
            kind,
            incidences,
            harmonized_elevation: None,
            primary: None,
        });
    }

    let mut adjacency: BTreeMap<EdgeId, Vec<JunctionId>> = BTreeMap::new();
    for junction in &junctions {
        for incidence in &junction.incidences {
            adjacency.entry(incidence.edge).or_default().push(junction.id);
        }
    }

    debug!("{} junctions detected", junctions.len());

    (
        UnifiedRoadNetwork {
            edges,
            junctions,
            adjacency,
        },
        diagnostics,
    )
}

/// Endpoints of `edge` that lie within `tol` of a cross-section of `other`.
fn endpoint_candidates(edge: &RoadEdge, other: &RoadEdge, tol: f32, out: &mut Vec<Candidate>) {
    let (Some(first), Some(last)) = (edge.sections.first(), edge.sections.last()) else {
        return;
    };
    for end in [first.center, last.center] {
        let (_, d) = other.nearest_section(end);
        if d <= tol {
            out.push(Candidate {
                position: end,
                edges: (edge.id, other.id),
            });
        }
    }
}

/// Crossings between the sampled centerlines of two edges.
fn crossing_candidates(a: &RoadEdge, b: &RoadEdge, out: &mut Vec<Candidate>) {
    for sa in a.sections.windows(2) {
        for sb in b.sections.windows(2) {
            if let Some(p) = segment_intersection(sa[0].center, sa[1].center, sb[0].center, sb[1].center) {
                out.push(Candidate {
                    position: p,
                    edges: (a.id, b.id),
                });
            }
        }
    }
}

/// A direction leaving the junction along one edge.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Arm {
    pub edge: EdgeId,
    pub role: JunctionRole,
    pub direction: Vec2,
}

/// Incidence and outgoing arms of `edge` at a junction located at `position`.
fn attach(edge: &RoadEdge, position: Vec2, tol: f32) -> (Incidence, Vec<Arm>) {
    let (section, _) = edge.nearest_section(position);
    let s = &edge.sections[section];
    let start = edge.sections[0].center;
    let end = edge.sections[edge.sections.len() - 1].center;
    let d_start = position.distance(start);
    let d_end = position.distance(end);

    let role = if d_start.min(d_end) <= tol {
        JunctionRole::Terminating
    } else {
        JunctionRole::Through
    };

    let arms = match role {
        JunctionRole::Through => vec![
            Arm { edge: edge.id, role, direction: s.tangent },
            Arm { edge: edge.id, role, direction: -s.tangent },
        ],
        JunctionRole::Terminating => {
            let direction = if d_start <= d_end { s.tangent } else { -s.tangent };
            vec![Arm { edge: edge.id, role, direction }]
        }
    };

    (
        Incidence {
            edge: edge.id,
            section,
            distance: s.distance,
            role,
        },
        arms,
    )
}

/// Degrees by which two arms miss being exactly opposite.
fn deviation_from_straight(a: Vec2, b: Vec2) -> f32 {
    180.0 - signed_angle(a, b).abs().to_degrees()
}

/// Classifies a junction from its outgoing arms.
///
/// # Returns
/// The junction type and, when the geometry sits too close to a decision threshold,
/// a description of the ambiguity (the type is then `Complex`).
pub(crate) fn classify(arms: &[Arm], config: &NetworkConfig) -> (JunctionType, Option<String>) {
    let straight = config.straight_angle_tolerance_deg;
    let margin = config.ambiguity_margin_deg;

    let mut edges: Vec<EdgeId> = arms.iter().map(|a| a.edge).collect();
    edges.dedup();
    let through = arms
        .iter()
        .filter(|a| a.role == JunctionRole::Through)
        .count()
        / 2;
    let terminating = edges.len() - through;

    if edges.len() == 2 && through == 1 && terminating == 1 {
        let main = arms
            .iter()
            .find(|a| a.role == JunctionRole::Through)
            .map(|a| a.direction)
            .unwrap_or(Vec2::X);
        let branch = arms
            .iter()
            .find(|a| a.role == JunctionRole::Terminating)
            .map(|a| a.direction)
            .unwrap_or(Vec2::Y);
        let angle = signed_angle(main, branch).abs().to_degrees();
        let branch_angle = angle.min(180.0 - angle);
        if branch_angle < config.min_branch_angle_deg {
            return (
                JunctionType::Complex,
                Some(format!(
                    "T branch meets through road at {:.1} deg (< {:.1})",
                    branch_angle, config.min_branch_angle_deg
                )),
            );
        }
        return (JunctionType::T, None);
    }

    if arms.len() == 3 && through == 0 {
        let min_dev = [(0, 1), (0, 2), (1, 2)]
            .iter()
            .map(|&(i, j)| deviation_from_straight(arms[i].direction, arms[j].direction))
            .fold(f32::INFINITY, f32::min);
        if (min_dev - straight).abs() <= margin {
            return (
                JunctionType::Complex,
                Some(format!(
                    "three-way arms {:.1} deg from straight, near the {:.1} deg threshold",
                    min_dev, straight
                )),
            );
        }
        return if min_dev > straight {
            (JunctionType::Y, None)
        } else {
            (JunctionType::Complex, None)
        };
    }

    if arms.len() == 4 {
        let pairings = [((0, 1), (2, 3)), ((0, 2), (1, 3)), ((0, 3), (1, 2))];
        let best = pairings
            .iter()
            .map(|&((a, b), (c, d))| {
                deviation_from_straight(arms[a].direction, arms[b].direction)
                    .max(deviation_from_straight(arms[c].direction, arms[d].direction))
            })
            .fold(f32::INFINITY, f32::min);
        if (best - straight).abs() <= margin {
            return (
                JunctionType::Complex,
                Some(format!(
                    "four-way arms {:.1} deg from straight, near the {:.1} deg threshold",
                    best, straight
                )),
            );
        }
        return if best < straight {
            (JunctionType::X, None)
        } else {
            (JunctionType::Complex, None)
        };
    }

    (JunctionType::Complex, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{RoadClass, RoadInput};
    use crate::terrain::HeightmapGrid;

    fn edges(roads: &[RoadInput]) -> Vec<RoadEdge> {
        let grid = HeightmapGrid::flat(128, 128, 1.0, 0.0);
        roads
            .iter()
            .enumerate()
            .map(|(i, r)| RoadEdge::build(EdgeId(i), r, 3.0, &grid).unwrap())
            .collect()
    }

    fn road(a: (f32, f32), b: (f32, f32)) -> RoadInput {
        RoadInput::new(vec![Vec2::new(a.0, a.1), Vec2::new(b.0, b.1)], 8.0, RoadClass::Secondary)
    }

    #[test]
    fn test_crossing_is_x() {
        let (net, diags) = build_network(
            edges(&[road((0.0, 30.0), (60.0, 30.0)), road((30.0, 0.0), (30.0, 60.0))]),
            &NetworkConfig::default(),
        );
        assert!(diags.is_empty());
        assert_eq!(net.junctions.len(), 1);
        let j = &net.junctions[0];
        assert_eq!(j.kind, JunctionType::X);
        assert!(j.position.distance(Vec2::new(30.0, 30.0)) < 1e-3);
        assert!(j.incidences.iter().all(|i| i.role == JunctionRole::Through));
        assert_eq!(j.incidence(EdgeId(0)).unwrap().section, 10);
        assert_eq!(net.junctions_of(EdgeId(1)), &[JunctionId(0)]);
    }

    #[test]
    fn test_structure_crossing_mid_span_is_not_a_junction() {
        let bridge = road((0.0, 30.0), (60.0, 30.0)).bridge();
        let tunnel = road((0.0, 50.0), (60.0, 50.0)).tunnel();
        let (net, diags) = build_network(
            edges(&[bridge, road((30.0, 0.0), (30.0, 60.0)), tunnel]),
            &NetworkConfig::default(),
        );
        assert!(diags.is_empty());
        assert!(net.junctions.is_empty());
        assert!(net.junctions_of(EdgeId(1)).is_empty());
    }

    #[test]
    fn test_branch_is_t() {
        let (net, diags) = build_network(
            edges(&[road((0.0, 20.0), (60.0, 20.0)), road((30.0, 20.0), (30.0, 50.0))]),
            &NetworkConfig::default(),
        );
        assert!(diags.is_empty());
        assert_eq!(net.junctions.len(), 1);
        let j = &net.junctions[0];
        assert_eq!(j.kind, JunctionType::T);
        assert_eq!(j.incidence(EdgeId(0)).unwrap().role, JunctionRole::Through);
        let branch = j.incidence(EdgeId(1)).unwrap();
        assert_eq!(branch.role, JunctionRole::Terminating);
        assert_eq!(branch.section, 0);
        assert_eq!(j.through().count(), 1);
        assert_eq!(j.terminating().count(), 1);
    }

    #[test]
    fn test_three_way_is_y() {
        let c = (64.0, 64.0);
        let arm = |deg: f32| {
            let r = deg.to_radians();
            road(c, (c.0 + 30.0 * r.cos(), c.1 + 30.0 * r.sin()))
        };
        let (net, diags) = build_network(
            edges(&[arm(90.0), arm(210.0), arm(330.0)]),
            &NetworkConfig::default(),
        );
        assert!(diags.is_empty());
        assert_eq!(net.junctions.len(), 1);
        assert_eq!(net.junctions[0].kind, JunctionType::Y);
        assert_eq!(net.junctions[0].terminating().count(), 3);
    }

    #[test]
    fn test_shallow_branch_is_ambiguous() {
        let r = 10f32.to_radians();
        let (net, diags) = build_network(
            edges(&[
                road((0.0, 20.0), (60.0, 20.0)),
                road((30.0, 20.0), (30.0 + 30.0 * r.cos(), 20.0 + 30.0 * r.sin())),
            ]),
            &NetworkConfig::default(),
        );
        assert_eq!(net.junctions.len(), 1);
        assert_eq!(net.junctions[0].kind, JunctionType::Complex);
        assert_eq!(diags.len(), 1);
        assert!(matches!(diags[0], Diagnostic::JunctionAmbiguity { junction: JunctionId(0), .. }));
    }

    #[test]
    fn test_disjoint_roads_have_no_junctions() {
        let (net, diags) = build_network(
            edges(&[road((0.0, 0.0), (40.0, 0.0)), road((0.0, 50.0), (40.0, 50.0))]),
            &NetworkConfig::default(),
        );
        assert!(net.junctions.is_empty());
        assert!(net.adjacency.is_empty());
        assert!(diags.is_empty());
        assert!(net.edge(EdgeId(1)).is_some());
        assert!(net.edge(EdgeId(7)).is_none());
    }

    #[test]
    fn test_classify_near_threshold() {
        let config = NetworkConfig::default();
        let dir = |deg: f32| Vec2::from_angle(deg.to_radians());
        let arm = |edge: usize, deg: f32| Arm {
            edge: EdgeId(edge),
            role: JunctionRole::Terminating,
            direction: dir(deg),
        };
        // 0/180 is straight; 90/270+24 misses straight by 24 deg, inside the margin.
        let arms = [arm(0, 0.0), arm(1, 180.0), arm(2, 90.0), arm(3, 294.0)];
        let (kind, detail) = classify(&arms, &config);
        assert_eq!(kind, JunctionType::Complex);
        assert!(detail.is_some());

        let arms = [arm(0, 0.0), arm(1, 180.0), arm(2, 90.0), arm(3, 275.0)];
        assert_eq!(classify(&arms, &config), (JunctionType::X, None));
    }
}
