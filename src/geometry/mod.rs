//! Centerline geometry.
//!
//! Provides arc-length parameterized splines over road control points and the
//! small set of planar helpers shared by the topology and output passes.

pub mod interpolate;
mod spline;
mod plane;

pub use interpolate::{CurveMethod, Interpolant};
pub use spline::{DistanceSamples, InterpolationMode, Spline, SplineError, SplineSample};
pub use plane::{
    project_onto_segment, right_normal, segment_intersection, signed_angle, smoothstep,
    point_in_quad,
};
