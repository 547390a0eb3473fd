//! Cross-section records sampled along road edges.

use glam::Vec2;
use serde::Serialize;

use crate::geometry::{right_normal, Spline};
use crate::terrain::HeightmapGrid;

use super::road::EdgeId;

/// One transverse slice of a road.
///
/// `target_elevation` is the single source of truth for the centerline. Bank angle (roll)
/// and longitudinal slope (pitch) are kept in separate fields; edge elevations resolve
/// through [`CrossSection::left_edge`] / [`CrossSection::right_edge`] with the precedence
/// constrained > precomputed > banking-derived.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossSection {
    /// Owning edge.
    pub edge_id: EdgeId,
    pub index: usize,
    /// Arc length from the start of the edge (meters).
    pub distance: f32,
    pub center: Vec2,
    /// Unit direction of travel.
    pub tangent: Vec2,
    /// Unit right-hand normal; positive lateral offsets point to the right edge.
    pub normal: Vec2,
    pub width: f32,
    /// Bilinear terrain read at sampling time. Never mutated.
    pub terrain_elevation: f32,
    pub target_elevation: f32,
    /// Rise over run along the tangent.
    pub longitudinal_slope: f32,
    /// Roll; positive raises the right edge.
    pub bank_angle_radians: f32,
    pub left_edge_elevation: Option<f32>,
    pub right_edge_elevation: Option<f32>,
    pub constrained_left_edge_elevation: Option<f32>,
    pub constrained_right_edge_elevation: Option<f32>,
    /// Structure span, skipped by terrain writing and painting.
    pub is_excluded: bool,
}

impl CrossSection {
    #[inline]
    pub fn half_width(&self) -> f32 {
        self.width * 0.5
    }

    pub fn left_position(&self) -> Vec2 {
        self.center - self.normal * self.half_width()
    }

    pub fn right_position(&self) -> Vec2 {
        self.center + self.normal * self.half_width()
    }

    /// Left edge elevation from the bank angle alone.
    pub fn banked_left_edge(&self) -> f32 {
        self.target_elevation - self.half_width() * self.bank_angle_radians.sin()
    }

    /// Right edge elevation from the bank angle alone.
    pub fn banked_right_edge(&self) -> f32 {
        self.target_elevation + self.half_width() * self.bank_angle_radians.sin()
    }

    /// Resolved left edge elevation.
    pub fn left_edge(&self) -> f32 {
        self.constrained_left_edge_elevation
            .or(self.left_edge_elevation)
            .unwrap_or_else(|| self.banked_left_edge())
    }

    /// Resolved right edge elevation.
    pub fn right_edge(&self) -> f32 {
        self.constrained_right_edge_elevation
            .or(self.right_edge_elevation)
            .unwrap_or_else(|| self.banked_right_edge())
    }

    /// Left/right edge elevation ignoring any explicit constraint.
    pub fn unconstrained_edges(&self) -> (f32, f32) {
        (
            self.left_edge_elevation
                .unwrap_or_else(|| self.banked_left_edge()),
            self.right_edge_elevation
                .unwrap_or_else(|| self.banked_right_edge()),
        )
    }

    /// Road surface elevation at a signed lateral offset, linear between the resolved
    /// left edge, centerline and right edge. Offsets beyond the edges are clamped.
    pub fn surface_elevation(&self, lateral: f32) -> f32 {
        let hw = self.half_width();
        if hw <= 0.0 {
            return self.target_elevation;
        }
        let t = (lateral / hw).clamp(-1.0, 1.0);
        if t >= 0.0 {
            self.target_elevation + (self.right_edge() - self.target_elevation) * t
        } else {
            self.target_elevation + (self.left_edge() - self.target_elevation) * -t
        }
    }

    /// Drops derived and constrained edge values.
    pub fn clear_edges(&mut self) {
        self.left_edge_elevation = None;
        self.right_edge_elevation = None;
        self.constrained_left_edge_elevation = None;
        self.constrained_right_edge_elevation = None;
    }
}

/// Samples `spline` every `step` meters into cross-sections whose initial elevation is a
/// bilinear read of `heightmap`.
pub fn sample_cross_sections(
    edge_id: EdgeId,
    spline: &Spline,
    width: f32,
    step: f32,
    heightmap: &HeightmapGrid,
    excluded: bool,
) -> Vec<CrossSection> {
    spline
        .sample_by_distance(step)
        .enumerate()
        .map(|(index, sample)| {
            let elevation = heightmap.sample_bilinear(sample.position);
            CrossSection {
                edge_id,
                index,
                distance: sample.distance,
                center: sample.position,
                tangent: sample.tangent,
                normal: right_normal(sample.tangent),
                width,
                terrain_elevation: elevation,
                target_elevation: elevation,
                longitudinal_slope: 0.0,
                bank_angle_radians: 0.0,
                left_edge_elevation: None,
                right_edge_elevation: None,
                constrained_left_edge_elevation: None,
                constrained_right_edge_elevation: None,
                is_excluded: excluded,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::InterpolationMode;

    fn section() -> CrossSection {
        let grid = HeightmapGrid::flat(8, 8, 1.0, 20.0);
        let spline = Spline::new(&[Vec2::ZERO, Vec2::new(6.0, 0.0)], InterpolationMode::default()).unwrap();
        sample_cross_sections(EdgeId(0), &spline, 10.0, 3.0, &grid, false).remove(1)
    }

    #[test]
    fn test_sampling_reads_terrain() {
        let grid = HeightmapGrid::from_fn(32, 32, 1.0, |x, _| x * 0.5);
        let spline = Spline::new(&[Vec2::new(2.0, 5.0), Vec2::new(20.0, 5.0)], InterpolationMode::default()).unwrap();
        let sections = sample_cross_sections(EdgeId(4), &spline, 6.0, 3.0, &grid, false);
        assert_eq!(sections.len(), 7);
        for s in &sections {
            assert!((s.target_elevation - s.center.x * 0.5).abs() < 1e-4);
            assert_eq!(s.target_elevation, s.terrain_elevation);
            assert_eq!(s.normal, Vec2::new(0.0, -1.0));
        }
    }

    #[test]
    fn test_edge_precedence() {
        let mut s = section();
        s.bank_angle_radians = 0.1;
        let banked = 20.0 + 5.0 * 0.1f32.sin();
        assert!((s.right_edge() - banked).abs() < 1e-5);

        s.right_edge_elevation = Some(21.0);
        assert_eq!(s.right_edge(), 21.0);

        s.constrained_right_edge_elevation = Some(22.0);
        assert_eq!(s.right_edge(), 22.0);
        assert_eq!(s.unconstrained_edges().1, 21.0);

        s.clear_edges();
        assert!((s.right_edge() - banked).abs() < 1e-5);
    }

    #[test]
    fn test_surface_elevation_interpolates_edges() {
        let mut s = section();
        s.constrained_left_edge_elevation = Some(19.0);
        s.constrained_right_edge_elevation = Some(22.0);
        assert_eq!(s.surface_elevation(0.0), 20.0);
        assert!((s.surface_elevation(2.5) - 21.0).abs() < 1e-5);
        assert!((s.surface_elevation(-5.0) - 19.0).abs() < 1e-5);
        assert!((s.surface_elevation(-50.0) - 19.0).abs() < 1e-5);
    }
}
