//! Elevation and structure configuration.

use serde::{Deserialize, Serialize};

use crate::pipeline::ConfigError;

use super::falloff::BlendFalloff;

/// Parameters for smoothing, junction harmonization and banking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevationConfig {
    /// Maximum longitudinal grade between adjacent cross-sections (percent).
    pub max_grade_percent: f32,
    /// Moving-average window applied before grade clamping (meters).
    pub smoothing_window_meters: f32,
    /// Distance over which junction values fade into a road's own profile (meters).
    pub blend_distance_meters: f32,
    pub falloff: BlendFalloff,
    /// Symmetric window for the through road's slope at a T-junction (meters).
    pub slope_window_meters: f32,

    /// Roads whose priorities differ by at most this share a plateau at Y/X/Complex nodes.
    pub plateau_priority_tolerance: i32,
    /// Added to the widest incident half-width to get the plateau radius (meters).
    pub plateau_margin_meters: f32,

    /// Bank angle cap (radians).
    pub max_bank_angle_radians: f32,
    /// Bank angle per unit curvature (radians per 1/m).
    pub bank_curvature_gain: f32,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            max_grade_percent: 8.0,
            smoothing_window_meters: 20.0,
            blend_distance_meters: 30.0,
            falloff: BlendFalloff::default(),
            slope_window_meters: 10.0,

            plateau_priority_tolerance: 1,
            plateau_margin_meters: 2.0,

            max_bank_angle_radians: 0.08,
            bank_curvature_gain: 12.0,
        }
    }
}

impl ElevationConfig {
    /// Gentle grades, long blends and stronger banking for fast roads.
    pub fn highway() -> Self {
        Self {
            max_grade_percent: 5.0,
            smoothing_window_meters: 40.0,
            blend_distance_meters: 60.0,
            max_bank_angle_radians: 0.1,
            bank_curvature_gain: 20.0,
            ..Default::default()
        }
    }

    /// Steep grades and short blends for hillside roads.
    pub fn mountain() -> Self {
        Self {
            max_grade_percent: 12.0,
            smoothing_window_meters: 12.0,
            blend_distance_meters: 20.0,
            falloff: BlendFalloff::Exponential { rate: 3.0 },
            ..Default::default()
        }
    }

    /// Grade limit as rise over run.
    pub fn max_grade(&self) -> f32 {
        self.max_grade_percent / 100.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::positive("max_grade_percent", self.max_grade_percent)?;
        ConfigError::non_negative("smoothing_window_meters", self.smoothing_window_meters)?;
        ConfigError::non_negative("blend_distance_meters", self.blend_distance_meters)?;
        ConfigError::positive("slope_window_meters", self.slope_window_meters)?;
        ConfigError::non_negative("plateau_margin_meters", self.plateau_margin_meters)?;
        ConfigError::non_negative("plateau_priority_tolerance", self.plateau_priority_tolerance as f32)?;
        ConfigError::within(
            "max_bank_angle_radians",
            self.max_bank_angle_radians,
            0.0,
            std::f32::consts::FRAC_PI_4,
        )?;
        ConfigError::non_negative("bank_curvature_gain", self.bank_curvature_gain)?;
        if let BlendFalloff::Exponential { rate } = self.falloff {
            ConfigError::non_negative("falloff.rate", rate)?;
        }
        Ok(())
    }
}

/// Parameters for bridge and tunnel profiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureConfig {
    /// Cover required above the tunnel ceiling (meters).
    pub tunnel_min_clearance_meters: f32,
    pub tunnel_interior_height_meters: f32,
    pub tunnel_max_grade_percent: f32,

    /// Bridges shorter than this are straight ramps (meters).
    pub short_bridge_max_length_meters: f32,
    /// Bridges up to this length sag; longer ones arch (meters).
    pub medium_bridge_max_length_meters: f32,

    /// Terrain samples taken along a tunnel path.
    pub terrain_sample_count: usize,

    pub sag_ratio: f32,
    pub max_sag_meters: f32,
    pub rise_ratio: f32,
    pub max_rise_meters: f32,

    /// Keep structure cross-sections out of terrain writing and painting.
    pub exclude_structures: bool,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            tunnel_min_clearance_meters: 5.0,
            tunnel_interior_height_meters: 5.0,
            tunnel_max_grade_percent: 6.0,

            short_bridge_max_length_meters: 50.0,
            medium_bridge_max_length_meters: 200.0,

            terrain_sample_count: 20,

            sag_ratio: 0.005,
            max_sag_meters: 2.0,
            rise_ratio: 0.01,
            max_rise_meters: 10.0,

            exclude_structures: true,
        }
    }
}

impl StructureConfig {
    pub fn tunnel_max_grade(&self) -> f32 {
        self.tunnel_max_grade_percent / 100.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::non_negative("tunnel_min_clearance_meters", self.tunnel_min_clearance_meters)?;
        ConfigError::positive("tunnel_interior_height_meters", self.tunnel_interior_height_meters)?;
        ConfigError::positive("tunnel_max_grade_percent", self.tunnel_max_grade_percent)?;
        ConfigError::positive("short_bridge_max_length_meters", self.short_bridge_max_length_meters)?;
        ConfigError::within(
            "medium_bridge_max_length_meters",
            self.medium_bridge_max_length_meters,
            self.short_bridge_max_length_meters,
            f32::MAX,
        )?;
        if self.terrain_sample_count < 2 {
            return Err(ConfigError::OutOfRange {
                field: "terrain_sample_count",
                value: self.terrain_sample_count as f32,
                expected: "at least 2".to_string(),
            });
        }
        ConfigError::non_negative("sag_ratio", self.sag_ratio)?;
        ConfigError::non_negative("max_sag_meters", self.max_sag_meters)?;
        ConfigError::non_negative("rise_ratio", self.rise_ratio)?;
        ConfigError::non_negative("max_rise_meters", self.max_rise_meters)?;
        Ok(())
    }
}
