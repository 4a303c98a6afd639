use serde::{Deserialize, Serialize};

use crate::error::{Result, SamplingError};

/// Seed used when the caller does not pick one; keeps worklists reproducible.
pub const DEFAULT_SEED: u64 = 24;
/// 8-bit classification products reserve 255 for nodata.
pub const DEFAULT_LABEL_CEILING: i32 = 255;

/// Parameters of one sampling run.
/// Defaults mirror the reference validation campaign (four classes at 90 %).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Expected user accuracy per class, indexed by (normalised) class label.
    pub expected_accuracies: Vec<f64>,
    /// Target standard error of overall accuracy. Only used without `n_points`.
    pub expected_standard_error: f64,
    /// Fixed total sample size; overrides the Olofsson formula.
    pub n_points: Option<usize>,
    pub random_seed: u64,
    /// Band sampled from multi-band rasters.
    pub band: usize,
    /// Labels at or above this value are treated as nodata.
    pub label_ceiling: i32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            expected_accuracies: vec![0.90, 0.90, 0.90, 0.90],
            expected_standard_error: 0.01,
            n_points: None,
            random_seed: DEFAULT_SEED,
            band: 0,
            label_ceiling: DEFAULT_LABEL_CEILING,
        }
    }
}

impl SamplerConfig {
    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json(text: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Checks that do not depend on the raster contents.
    pub fn validate(&self) -> Result<()> {
        if self.expected_accuracies.is_empty() {
            return Err(SamplingError::Configuration(
                "expected_accuracies must not be empty".into(),
            ));
        }
        if let Some(&bad) = self
            .expected_accuracies
            .iter()
            .find(|&&a| !(a > 0.0 && a < 1.0))
        {
            return Err(SamplingError::Configuration(format!(
                "expected accuracy {bad} is outside (0, 1)"
            )));
        }
        if self.n_points.is_none()
            && !(self.expected_standard_error.is_finite() && self.expected_standard_error > 0.0)
        {
            return Err(SamplingError::Configuration(format!(
                "expected_standard_error must be a positive number, got {}",
                self.expected_standard_error
            )));
        }
        if self.label_ceiling <= 0 {
            return Err(SamplingError::Configuration(format!(
                "label_ceiling must be positive, got {}",
                self.label_ceiling
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = SamplerConfig::default();
        assert_eq!(cfg.random_seed, 24);
        assert_eq!(cfg.expected_accuracies.len(), 4);
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = SamplerConfig::from_json(r#"{"n_points": 50, "expected_accuracies": [0.8]}"#).unwrap();
        assert_eq!(cfg.n_points, Some(50));
        assert_eq!(cfg.expected_accuracies, vec![0.8]);
        assert_eq!(cfg.expected_standard_error, 0.01);
        assert_eq!(cfg.label_ceiling, 255);
    }

    #[test]
    fn accuracy_bounds_are_exclusive() {
        for bad in [0.0, 1.0, -0.2, 1.5, f64::NAN] {
            let cfg = SamplerConfig { expected_accuracies: vec![0.9, bad], ..Default::default() };
            assert!(
                matches!(cfg.validate(), Err(SamplingError::Configuration(_))),
                "accuracy {bad} should be rejected"
            );
        }
    }

    #[test]
    fn empty_accuracies_rejected() {
        let cfg = SamplerConfig { expected_accuracies: vec![], ..Default::default() };
        assert!(matches!(cfg.validate(), Err(SamplingError::Configuration(_))));
    }

    #[test]
    fn standard_error_ignored_with_fixed_count() {
        let mut cfg = SamplerConfig { expected_standard_error: 0.0, ..Default::default() };
        assert!(cfg.validate().is_err());
        cfg.n_points = Some(10);
        assert!(cfg.validate().is_ok());
    }
}
