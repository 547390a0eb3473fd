//! Aggregate run configuration and validation errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::elevation::{ElevationConfig, StructureConfig};
use crate::network::NetworkConfig;
use crate::output::OutputConfig;

/// A configuration value outside its accepted range.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} = {value} is out of range (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: f32,
        expected: String,
    },
}

impl ConfigError {
    /// Requires a finite value greater than zero.
    pub fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
        if value > 0.0 && value.is_finite() {
            Ok(())
        } else {
            Err(ConfigError::OutOfRange {
                field,
                value,
                expected: "> 0".to_string(),
            })
        }
    }

    /// Requires a finite value of at least zero.
    pub fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
        if value >= 0.0 && value.is_finite() {
            Ok(())
        } else {
            Err(ConfigError::OutOfRange {
                field,
                value,
                expected: ">= 0".to_string(),
            })
        }
    }

    /// Requires `lo <= value <= hi`.
    pub fn within(field: &'static str, value: f32, lo: f32, hi: f32) -> Result<(), ConfigError> {
        if value >= lo && value <= hi {
            Ok(())
        } else {
            Err(ConfigError::OutOfRange {
                field,
                value,
                expected: format!("[{}, {}]", lo, hi),
            })
        }
    }
}

/// Configuration passed to each stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub network: NetworkConfig,
    pub elevation: ElevationConfig,
    pub structures: StructureConfig,
    pub output: OutputConfig,
}

impl StageConfig {
    /// Motorway-style network: gentle grades, long blends.
    pub fn highway() -> Self {
        Self {
            network: NetworkConfig::rural(),
            elevation: ElevationConfig::highway(),
            ..Default::default()
        }
    }

    /// Steep terrain: tolerant grades, tight junction blends.
    pub fn mountain() -> Self {
        Self {
            network: NetworkConfig::rural(),
            elevation: ElevationConfig::mountain(),
            ..Default::default()
        }
    }

    /// Dense street grid.
    pub fn urban() -> Self {
        Self {
            network: NetworkConfig::urban(),
            ..Default::default()
        }
    }

    /// Checks every section of the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.network.validate()?;
        self.elevation.validate()?;
        self.structures.validate()?;
        self.output.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_helpers() {
        assert!(ConfigError::positive("a", 1.0).is_ok());
        assert!(ConfigError::positive("a", 0.0).is_err());
        assert!(ConfigError::positive("a", f32::NAN).is_err());
        assert!(ConfigError::non_negative("a", 0.0).is_ok());
        assert!(ConfigError::non_negative("a", f32::INFINITY).is_err());
        assert!(ConfigError::within("a", 0.5, 0.0, 1.0).is_ok());

        let err = ConfigError::within("bank", 2.0, 0.0, 1.0).unwrap_err();
        assert_eq!(err.to_string(), "bank = 2 is out of range (expected [0, 1])");
    }

    #[test]
    fn test_presets_validate() {
        assert!(StageConfig::default().validate().is_ok());
        assert!(StageConfig::highway().validate().is_ok());
        assert!(StageConfig::mountain().validate().is_ok());
        assert!(StageConfig::urban().validate().is_ok());
    }

    #[test]
    fn test_nested_errors_surface() {
        let mut config = StageConfig::default();
        config.output.terrain_falloff_meters = -1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "terrain_falloff_meters", .. })
        ));
    }

    #[test]
    fn test_json_round_trip_with_partial_sections() {
        let config: StageConfig =
            serde_json::from_str(r#"{ "elevation": { "max_grade_percent": 5.0 } }"#).unwrap();
        assert_eq!(config.elevation.max_grade_percent, 5.0);
        assert_eq!(config.network, NetworkConfig::default());

        let text = serde_json::to_string(&config).unwrap();
        let back: StageConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
