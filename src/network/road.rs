//! Road inputs and network edges.

use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::elevation::StructureElevationProfile;
use crate::geometry::{InterpolationMode, Spline, SplineError};
use crate::terrain::{HeightmapGrid, PaintLayer};

use super::cross_section::{sample_cross_sections, CrossSection};

/// Stable edge identifier: the road's index in the input snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub usize);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Functional road class, used for default priority and paint layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoadClass {
    Motorway,
    Trunk,
    Primary,
    Secondary,
    Tertiary,
    Residential,
    Service,
    Track,
}

impl RoadClass {
    /// Priority rank; higher dominates at junctions.
    pub fn default_priority(&self) -> i32 {
        match self {
            RoadClass::Motorway => 7,
            RoadClass::Trunk => 6,
            RoadClass::Primary => 5,
            RoadClass::Secondary => 4,
            RoadClass::Tertiary => 3,
            RoadClass::Residential => 2,
            RoadClass::Service => 1,
            RoadClass::Track => 0,
        }
    }

    /// Material the road is painted with.
    pub fn paint_layer(&self) -> PaintLayer {
        match self {
            RoadClass::Service => PaintLayer::Gravel,
            RoadClass::Track => PaintLayer::Dirt,
            _ => PaintLayer::Asphalt,
        }
    }
}

impl Default for RoadClass {
    fn default() -> Self {
        RoadClass::Residential
    }
}

/// One road of the immutable per-run geometry snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadInput {
    /// Control points in meters, terrain-local frame.
    pub points: Vec<Vec2>,
    /// Full carriageway width in meters.
    pub width: f32,
    #[serde(default)]
    pub class: RoadClass,
    /// Overrides the class default when present.
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub is_bridge: bool,
    #[serde(default)]
    pub is_tunnel: bool,
    #[serde(default)]
    pub interpolation: InterpolationMode,
}

impl RoadInput {
    pub fn new(points: Vec<Vec2>, width: f32, class: RoadClass) -> Self {
        Self {
            points,
            width,
            class,
            priority: None,
            is_bridge: false,
            is_tunnel: false,
            interpolation: InterpolationMode::default(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn bridge(mut self) -> Self {
        self.is_bridge = true;
        self
    }

    pub fn tunnel(mut self) -> Self {
        self.is_tunnel = true;
        self
    }

    pub fn with_interpolation(mut self, mode: InterpolationMode) -> Self {
        self.interpolation = mode;
        self
    }

    pub fn effective_priority(&self) -> i32 {
        self.priority.unwrap_or_else(|| self.class.default_priority())
    }
}

/// Reasons an edge cannot be built.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EdgeError {
    #[error(transparent)]
    Spline(#[from] SplineError),
    #[error("invalid width {0}")]
    InvalidWidth(f32),
}

/// A sampled road of the network.
#[derive(Debug, Clone)]
pub struct RoadEdge {
    pub id: EdgeId,
    pub spline: Spline,
    pub width: f32,
    pub priority: i32,
    pub class: RoadClass,
    pub is_bridge: bool,
    pub is_tunnel: bool,
    /// Elevation profile for bridge/tunnel edges (populated by the structure pass).
    pub structure: Option<StructureElevationProfile>,
    /// Cross-sections in travel order.
    pub sections: Vec<CrossSection>,
}

impl RoadEdge {
    /// Builds the spline and samples cross-sections with initial terrain elevations.
    pub fn build(
        id: EdgeId,
        input: &RoadInput,
        step_meters: f32,
        heightmap: &HeightmapGrid,
    ) -> Result<Self, EdgeError> {
        if !(input.width > 0.0 && input.width.is_finite()) {
            return Err(EdgeError::InvalidWidth(input.width));
        }
        let spline = Spline::new(&input.points, input.interpolation)?;
        let is_structure = input.is_bridge || input.is_tunnel;
        let sections = sample_cross_sections(
            id,
            &spline,
            input.width,
            step_meters,
            heightmap,
            is_structure,
        );

        Ok(Self {
            id,
            spline,
            width: input.width,
            priority: input.effective_priority(),
            class: input.class,
            is_bridge: input.is_bridge,
            is_tunnel: input.is_tunnel,
            structure: None,
            sections,
        })
    }

    pub fn is_structure(&self) -> bool {
        self.is_bridge || self.is_tunnel
    }

    pub fn length(&self) -> f32 {
        self.spline.length()
    }

    pub fn half_width(&self) -> f32 {
        self.width * 0.5
    }

    /// Index of the section nearest to `distance` along the edge.
    pub fn section_at_distance(&self, distance: f32) -> usize {
        let i = self.sections.partition_point(|s| s.distance < distance);
        if i == 0 {
            return 0;
        }
        if i >= self.sections.len() {
            return self.sections.len() - 1;
        }
        if (self.sections[i].distance - distance) < (distance - self.sections[i - 1].distance) {
            i
        } else {
            i - 1
        }
    }

    /// Index of the section nearest to a world position, with its distance.
    pub fn nearest_section(&self, p: Vec2) -> (usize, f32) {
        self.sections
            .iter()
            .enumerate()
            .map(|(i, s)| (i, s.center.distance(p)))
            .fold((0, f32::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
    }
}
