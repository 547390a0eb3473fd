//! Sampling and topology configuration.

use serde::{Deserialize, Serialize};

use crate::pipeline::ConfigError;

/// Parameters for centerline sampling and junction detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Longitudinal spacing between cross-sections (meters). 2-5 m typical.
    pub step_meters: f32,
    /// Distance within which endpoints/samples are considered connected (meters).
    pub connection_tolerance_meters: f32,
    /// Two arms within this many degrees of opposite count as roughly colinear.
    pub straight_angle_tolerance_deg: f32,
    /// Angles within this margin of the colinearity threshold are ambiguous.
    pub ambiguity_margin_deg: f32,
    /// A T branch closer than this to the through road is ambiguous.
    pub min_branch_angle_deg: f32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            step_meters: 3.0,
            connection_tolerance_meters: 2.0,
            straight_angle_tolerance_deg: 25.0,
            ambiguity_margin_deg: 4.0,
            min_branch_angle_deg: 15.0,
        }
    }
}

impl NetworkConfig {
    /// Coarser sampling for large rural networks.
    pub fn rural() -> Self {
        Self {
            step_meters: 5.0,
            connection_tolerance_meters: 3.0,
            ..Default::default()
        }
    }

    /// Fine sampling for dense urban grids with narrow streets.
    pub fn urban() -> Self {
        Self {
            step_meters: 2.0,
            connection_tolerance_meters: 1.5,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::positive("step_meters", self.step_meters)?;
        ConfigError::positive("connection_tolerance_meters", self.connection_tolerance_meters)?;
        ConfigError::within("straight_angle_tolerance_deg", self.straight_angle_tolerance_deg, 0.0, 90.0)?;
        ConfigError::within("ambiguity_margin_deg", self.ambiguity_margin_deg, 0.0, self.straight_angle_tolerance_deg)?;
        ConfigError::within("min_branch_angle_deg", self.min_branch_angle_deg, 0.0, 90.0)?;
        Ok(())
    }
}
