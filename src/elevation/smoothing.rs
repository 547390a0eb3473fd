//! Grade-limited smoothing of terrain-sampled profiles.

use crate::diagnostics::{Diagnostic, GradeOrigin};
use crate::network::{CrossSection, EdgeId};

use super::config::ElevationConfig;

/// Replaces raw terrain samples with a grade-limited profile.
///
/// A centred moving average over `smoothing_window_meters` is followed by a forward and
/// then a backward grade clamp, so every adjacent pair ends within `max_grade_percent`
/// without the uphill bias of a single forward sweep. Excluded (structure) edges are
/// left untouched.
pub fn smooth_edge(sections: &mut [CrossSection], config: &ElevationConfig) {
    if sections.len() < 2 || sections.iter().any(|s| s.is_excluded) {
        return;
    }

    moving_average(sections, config.smoothing_window_meters * 0.5);

    let g = config.max_grade();
    for i in 1..sections.len() {
        let run = sections[i].distance - sections[i - 1].distance;
        let prev = sections[i - 1].target_elevation;
        let e = &mut sections[i].target_elevation;
        *e = e.clamp(prev - g * run, prev + g * run);
    }
    for i in (0..sections.len() - 1).rev() {
        let run = sections[i + 1].distance - sections[i].distance;
        let next = sections[i + 1].target_elevation;
        let e = &mut sections[i].target_elevation;
        *e = e.clamp(next - g * run, next + g * run);
    }
}

/// Centred moving average with a sliding index window of `half_window` meters.
fn moving_average(sections: &mut [CrossSection], half_window: f32) {
    if half_window <= 0.0 {
        return;
    }
    let raw: Vec<f32> = sections.iter().map(|s| s.target_elevation).collect();
    let (mut lo, mut hi) = (0usize, 0usize);
    let mut sum = 0.0f64;
    for i in 0..sections.len() {
        let d = sections[i].distance;
        while hi < sections.len() && sections[hi].distance <= d + half_window {
            sum += raw[hi] as f64;
            hi += 1;
        }
        while sections[lo].distance < d - half_window {
            sum -= raw[lo] as f64;
            lo += 1;
        }
        sections[i].target_elevation = (sum / (hi - lo) as f64) as f32;
    }
}

/// Adjacent non-excluded pairs steeper than `max_grade` (rise over run).
///
/// One diagnostic is emitted per contiguous run of violating pairs, at the steepest pair.
pub fn grade_violations(
    edge: EdgeId,
    sections: &[CrossSection],
    max_grade: f32,
    origin: GradeOrigin,
) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    let mut worst: Option<(f32, f32)> = None;
    for pair in sections.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let run = b.distance - a.distance;
        let grade = if a.is_excluded || b.is_excluded || run <= 0.0 {
            0.0
        } else {
            ((b.target_elevation - a.target_elevation) / run).abs()
        };
        if grade > max_grade + 1e-4 {
            if worst.map_or(true, |(g, _)| grade > g) {
                worst = Some((grade, a.distance));
            }
        } else if let Some((g, distance)) = worst.take() {
            out.push(violation(edge, distance, g, max_grade, origin));
        }
    }
    if let Some((g, distance)) = worst {
        out.push(violation(edge, distance, g, max_grade, origin));
    }
    out
}

pub(crate) fn violation(
    edge: EdgeId,
    distance: f32,
    grade: f32,
    max_grade: f32,
    origin: GradeOrigin,
) -> Diagnostic {
    Diagnostic::GradeViolation {
        edge,
        distance,
        grade_percent: grade * 100.0,
        max_grade_percent: max_grade * 100.0,
        origin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{InterpolationMode, Spline};
    use crate::network::sample_cross_sections;
    use crate::terrain::HeightmapGrid;
    use glam::Vec2;

    fn sections_over<F: Fn(f32, f32) -> f32>(f: F) -> Vec<CrossSection> {
        let grid = HeightmapGrid::from_fn(128, 16, 1.0, f);
        let spline = Spline::new(&[Vec2::new(2.0, 8.0), Vec2::new(122.0, 8.0)], InterpolationMode::default()).unwrap();
        sample_cross_sections(EdgeId(0), &spline, 6.0, 3.0, &grid, false)
    }

    #[test]
    fn test_grade_clamp_holds() {
        let mut sections = sections_over(|x, _| if (40.0..60.0).contains(&x) { 30.0 } else { (x * 0.7).sin() * 4.0 });
        let config = ElevationConfig::default();
        smooth_edge(&mut sections, &config);
        for pair in sections.windows(2) {
            let grade = (pair[1].target_elevation - pair[0].target_elevation).abs()
                / (pair[1].distance - pair[0].distance);
            assert!(grade <= config.max_grade() + 1e-4, "grade {}", grade);
        }
        assert!(grade_violations(EdgeId(0), &sections, config.max_grade(), GradeOrigin::Road).is_empty());
    }

    #[test]
    fn test_gentle_ramp_interior_is_preserved() {
        let mut sections = sections_over(|x, _| x * 0.02);
        smooth_edge(&mut sections, &ElevationConfig::default());
        let mid = &sections[sections.len() / 2];
        assert!((mid.target_elevation - mid.center.x * 0.02).abs() < 1e-3);
    }

    #[test]
    fn test_excluded_edges_are_skipped() {
        let mut sections = sections_over(|x, _| if x > 60.0 { 50.0 } else { 0.0 });
        for s in &mut sections {
            s.is_excluded = true;
        }
        let before: Vec<f32> = sections.iter().map(|s| s.target_elevation).collect();
        smooth_edge(&mut sections, &ElevationConfig::default());
        let after: Vec<f32> = sections.iter().map(|s| s.target_elevation).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_violations_report_one_per_run() {
        let mut sections = sections_over(|_, _| 0.0);
        sections[5].target_elevation = 3.0;
        sections[30].target_elevation = -2.0;
        let found = grade_violations(EdgeId(9), &sections, 0.08, GradeOrigin::Road);
        assert_eq!(found.len(), 2);
        match &found[0] {
            Diagnostic::GradeViolation { edge, grade_percent, .. } => {
                assert_eq!(*edge, EdgeId(9));
                assert!((grade_percent - 100.0).abs() < 1e-3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
