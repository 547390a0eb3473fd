//! Result-level warnings and isolated per-edge failures.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::network::{EdgeId, JunctionId};

/// Which profile a grade violation was measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GradeOrigin {
    /// Terrain-following profile after harmonization and junction constraints.
    Road,
    /// Bridge deck profile.
    Bridge,
    /// Tunnel floor profile.
    Tunnel,
}

impl fmt::Display for GradeOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GradeOrigin::Road => "road",
            GradeOrigin::Bridge => "bridge",
            GradeOrigin::Tunnel => "tunnel",
        };
        f.write_str(s)
    }
}

/// A non-fatal finding collected while processing the network.
///
/// `DegenerateGeometry` drops a single edge; every other variant is a warning and the
/// affected elevation is still produced.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum Diagnostic {
    #[error("edge {edge}: degenerate geometry ({reason}); edge skipped")]
    DegenerateGeometry { edge: EdgeId, reason: String },

    #[error("junction {junction}: ambiguous classification ({detail}); treated as Complex")]
    JunctionAmbiguity { junction: JunctionId, detail: String },

    #[error(
        "edge {edge}: {origin} grade {grade_percent:.2}% at {distance:.1} m exceeds {max_grade_percent:.2}%"
    )]
    GradeViolation {
        edge: EdgeId,
        distance: f32,
        grade_percent: f32,
        max_grade_percent: f32,
        origin: GradeOrigin,
    },

    #[error(
        "edge {edge}: tunnel clearance {achieved_clearance:.2} m below required {required_clearance:.2} m"
    )]
    ClearanceViolation {
        edge: EdgeId,
        required_clearance: f32,
        achieved_clearance: f32,
    },
}

impl Diagnostic {
    /// True for everything except per-edge failures.
    pub fn is_warning(&self) -> bool {
        !matches!(self, Diagnostic::DegenerateGeometry { .. })
    }

    /// Edge the finding refers to, if any.
    pub fn edge(&self) -> Option<EdgeId> {
        match self {
            Diagnostic::DegenerateGeometry { edge, .. }
            | Diagnostic::GradeViolation { edge, .. }
            | Diagnostic::ClearanceViolation { edge, .. } => Some(*edge),
            Diagnostic::JunctionAmbiguity { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_severity() {
        let d = Diagnostic::GradeViolation {
            edge: EdgeId(3),
            distance: 12.0,
            grade_percent: 9.1,
            max_grade_percent: 6.0,
            origin: GradeOrigin::Tunnel,
        };
        let text = d.to_string();
        assert!(text.contains("edge 3"));
        assert!(text.contains("tunnel grade 9.10%"));
        assert!(d.is_warning());
        assert_eq!(d.edge(), Some(EdgeId(3)));

        let fail = Diagnostic::DegenerateGeometry {
            edge: EdgeId(0),
            reason: "1 point".to_string(),
        };
        assert!(!fail.is_warning());
    }
}
