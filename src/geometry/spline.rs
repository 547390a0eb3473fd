//! Arc-length parameterized road centerline splines.

use std::sync::OnceLock;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::interpolate::{CurveMethod, Interpolant};

/// Consecutive control points closer than this are merged.
const DEDUP_EPSILON: f32 = 1e-4;
/// Sub-steps per control segment used to measure true arc length.
const ARC_SUBDIVISIONS: usize = 16;

/// Errors raised while building a spline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SplineError {
    #[error("degenerate geometry: {0} distinct control point(s), at least 2 required")]
    Degenerate(usize),
    #[error("non-finite control point at index {0}")]
    NonFinite(usize),
}

/// How a road centerline is interpolated through its control points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InterpolationMode {
    /// Akima (≥5 points), natural cubic (3-4 points) or linear (2 points).
    #[default]
    SmoothInterpolated,
    /// Exact polyline through the control points. Used when fidelity to traced geometry
    /// matters more than smoothness.
    LinearControlPoints,
}

/// One evenly spaced sample along a spline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplineSample {
    /// Arc length from the first control point, in meters.
    pub distance: f32,
    pub position: Vec2,
    /// Unit tangent in the direction of travel.
    pub tangent: Vec2,
}

/// Parameter-to-arc-length lookup built from a dense subdivision.
#[derive(Debug, Clone)]
struct ArcLengthTable {
    params: Vec<f32>,
    lengths: Vec<f32>,
}

impl ArcLengthTable {
    fn total(&self) -> f32 {
        self.lengths.last().copied().unwrap_or(0.0)
    }

    /// Chord parameter for a given arc length.
    fn param_at(&self, distance: f32) -> f32 {
        let d = distance.clamp(0.0, self.total());
        let i = self.lengths.partition_point(|&l| l < d);
        if i == 0 {
            return self.params[0];
        }
        if i >= self.lengths.len() {
            return self.params[self.params.len() - 1];
        }
        let (l0, l1) = (self.lengths[i - 1], self.lengths[i]);
        let (p0, p1) = (self.params[i - 1], self.params[i]);
        let span = l1 - l0;
        if span <= f32::EPSILON {
            p1
        } else {
            p0 + (p1 - p0) * (d - l0) / span
        }
    }
}

/// A centerline curve through ordered control points.
#[derive(Debug, Clone)]
pub struct Spline {
    points: Vec<Vec2>,
    mode: InterpolationMode,
    method: CurveMethod,
    x: Interpolant,
    y: Interpolant,
    arc: OnceLock<ArcLengthTable>,
}

impl Spline {
    /// Builds a spline through `points`.
    ///
    /// Consecutive duplicates are removed first; fewer than two distinct points is a
    /// degenerate-geometry error.
    pub fn new(points: &[Vec2], mode: InterpolationMode) -> Result<Self, SplineError> {
        if let Some(i) = points.iter().position(|p| !p.is_finite()) {
            return Err(SplineError::NonFinite(i));
        }

        let mut distinct: Vec<Vec2> = Vec::with_capacity(points.len());
        for &p in points {
            if distinct
                .last()
                .map_or(true, |last| last.distance(p) > DEDUP_EPSILON)
            {
                distinct.push(p);
            }
        }
        if distinct.len() < 2 {
            return Err(SplineError::Degenerate(distinct.len()));
        }

        let method = match mode {
            InterpolationMode::LinearControlPoints => CurveMethod::Linear,
            InterpolationMode::SmoothInterpolated => match distinct.len() {
                2 => CurveMethod::Linear,
                3 | 4 => CurveMethod::NaturalCubic,
                _ => CurveMethod::Akima,
            },
        };

        // Chord-length parameterization.
        let mut knots = Vec::with_capacity(distinct.len());
        let mut acc = 0.0f32;
        knots.push(0.0);
        for w in distinct.windows(2) {
            acc += w[0].distance(w[1]);
            knots.push(acc);
        }

        let xs: Vec<f32> = distinct.iter().map(|p| p.x).collect();
        let ys: Vec<f32> = distinct.iter().map(|p| p.y).collect();

        Ok(Self {
            x: Interpolant::new(&knots, &xs, method),
            y: Interpolant::new(&knots, &ys, method),
            points: distinct,
            mode,
            method,
            arc: OnceLock::new(),
        })
    }

    /// De-duplicated control points.
    pub fn control_points(&self) -> &[Vec2] {
        &self.points
    }

    pub fn mode(&self) -> InterpolationMode {
        self.mode
    }

    /// The interpolation method actually used for this point count.
    pub fn effective_method(&self) -> CurveMethod {
        self.method
    }

    fn eval_param(&self, u: f32) -> Vec2 {
        Vec2::new(self.x.eval(u), self.y.eval(u))
    }

    fn derivative_param(&self, u: f32) -> Vec2 {
        Vec2::new(self.x.derivative(u), self.y.derivative(u))
    }

    fn arc_table(&self) -> &ArcLengthTable {
        self.arc.get_or_init(|| {
            let (_, u_end) = self.x.domain();
            let segments = (self.points.len() - 1) * ARC_SUBDIVISIONS;
            let mut params = Vec::with_capacity(segments + 1);
            let mut lengths = Vec::with_capacity(segments + 1);

            let mut prev = self.eval_param(0.0);
            let mut acc = 0.0f32;
            params.push(0.0);
            lengths.push(0.0);
            for k in 1..=segments {
                let u = u_end * k as f32 / segments as f32;
                let p = self.eval_param(u);
                acc += prev.distance(p);
                params.push(u);
                lengths.push(acc);
                prev = p;
            }
            ArcLengthTable { params, lengths }
        })
    }

    /// Total arc length in meters. Cached after the first traversal.
    pub fn length(&self) -> f32 {
        self.arc_table().total()
    }

    /// Position at the given arc length (clamped to `[0, length]`).
    pub fn point_at_distance(&self, distance: f32) -> Vec2 {
        let u = self.arc_table().param_at(distance);
        self.eval_param(u)
    }

    /// Unit tangent at the given arc length.
    pub fn tangent_at_distance(&self, distance: f32) -> Vec2 {
        let table = self.arc_table();
        let u = table.param_at(distance);
        let d = self.derivative_param(u);
        if d.length_squared() > 1e-12 {
            return d.normalize();
        }

        // Stationary parameter point; fall back to a finite difference.
        let h = (table.total() * 1e-3).max(1e-3);
        let a = self.point_at_distance((distance - h).max(0.0));
        let b = self.point_at_distance((distance + h).min(table.total()));
        (b - a).normalize_or(Vec2::X)
    }

    /// Evenly spaced samples every `step` meters (the step is adjusted so the last sample
    /// lands exactly on the final control point).
    pub fn sample_by_distance(&self, step: f32) -> DistanceSamples<'_> {
        let length = self.length();
        let intervals = if step > 0.0 && step.is_finite() {
            ((length / step).round() as usize).max(1)
        } else {
            1
        };
        DistanceSamples {
            spline: self,
            length,
            intervals,
            next: 0,
        }
    }
}

/// Iterator over evenly spaced spline samples. Cloning restarts from the current position.
#[derive(Debug, Clone)]
pub struct DistanceSamples<'a> {
    spline: &'a Spline,
    length: f32,
    intervals: usize,
    next: usize,
}

impl DistanceSamples<'_> {
    /// Actual spacing between consecutive samples.
    pub fn spacing(&self) -> f32 {
        self.length / self.intervals as f32
    }
}

impl Iterator for DistanceSamples<'_> {
    type Item = SplineSample;

    fn next(&mut self) -> Option<SplineSample> {
        if self.next > self.intervals {
            return None;
        }
        let k = self.next;
        self.next += 1;

        let distance = if k == self.intervals {
            self.length
        } else {
            self.length * k as f32 / self.intervals as f32
        };
        let position = if k == self.intervals {
            self.spline.points[self.spline.points.len() - 1]
        } else if k == 0 {
            self.spline.points[0]
        } else {
            self.spline.point_at_distance(distance)
        };

        Some(SplineSample {
            distance,
            position,
            tangent: self.spline.tangent_at_distance(distance),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.intervals + 1).saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for DistanceSamples<'_> {}
