//! Engine configuration: optimizer settings, derivation strategy and the
//! default currency data source

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::parameter::DataSource;
use crate::technology::DerivationMode;

/// Levenberg-Marquardt settings for growth model fitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Iterations (accepted or rejected steps) before giving up
    pub max_iterations: usize,

    /// Starting damping factor
    pub initial_damping: f64,

    /// Stop when the step is this small relative to the parameter norm
    pub step_tolerance: f64,

    /// Stop when the residual sum of squares, or its relative decrease, drops below this
    pub cost_tolerance: f64,

    /// Stop when the largest gradient component drops below this
    pub gradient_tolerance: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            initial_damping: 1e-3,
            step_tolerance: 1e-12,
            cost_tolerance: 1e-15,
            gradient_tolerance: 1e-12,
        }
    }
}

/// Strategy for `Technology::calculate_parameters`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivationConfig {
    pub mode: DerivationMode,

    /// Upper bound on fixed-point passes
    pub max_passes: usize,
}

impl Default for DerivationConfig {
    fn default() -> Self {
        Self {
            mode: DerivationMode::FixedPoint,
            max_passes: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fit: FitConfig,
    pub derivation: DerivationConfig,
    pub data_source: DataSource,
}

impl EngineConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        log::debug!("Loaded engine configuration from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.fit.max_iterations, 200);
        assert_eq!(config.derivation.mode, DerivationMode::FixedPoint);
        assert_eq!(config.derivation.max_passes, 16);
        assert_eq!(config.data_source, DataSource::WorldBank);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{"derivation": {"mode": "single_pass"}, "data_source": "imf"}"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.derivation.mode, DerivationMode::SinglePass);
        assert_eq!(config.derivation.max_passes, 16);
        assert_eq!(config.data_source, DataSource::Imf);
        assert_eq!(config.fit, FitConfig::default());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = EngineConfig::from_json_path(Path::new("/nonexistent/engine.json")).unwrap_err();
        assert!(matches!(err, crate::error::TechDataError::Config(_)));
    }
}
