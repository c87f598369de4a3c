//! Search configuration.
//!
//! [`SearchConfig`] gathers every value the optimizer consumes: the target
//! total cost, the search mode, optional rounding, optional loss
//! coefficients, and iteration budgets for the higher-dimensional search.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::table::{DatasetWeights, MeasurementTable, COVER_EXTENSION, MISMATCHES};

/// Default loss coefficients for standard search: mismatches, cover_extension.
pub const STANDARD_LOSS_COEFFS: [f64; 2] = [1.0, 0.01];

/// Which searcher to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMode {
    /// Two integral parameters, optionally rounded to a grid.
    Standard,
    /// Any number of continuous parameters; never rounded.
    HigherDimensional,
}

impl Default for SearchMode {
    fn default() -> Self {
        Self::Standard
    }
}

/// Round mismatches and cover_extension to the nearest multiple of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSpec {
    pub mismatches: u32,
    pub cover_extension: u32,
}

impl RoundSpec {
    pub fn new(mismatches: u32, cover_extension: u32) -> Self {
        Self {
            mismatches,
            cover_extension,
        }
    }
}

/// Iteration budgets for the higher-dimensional search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdSettings {
    /// Bisection steps on the budget price in the outer loop.
    pub max_outer_iterations: usize,
    /// Nelder-Mead iterations per sub-problem start.
    pub max_simplex_iterations: usize,
    /// Simplex convergence threshold on objective spread.
    pub tolerance: f64,
    /// Number of measured points used as Nelder-Mead starts per dataset.
    pub restarts: usize,
}

impl Default for NdSettings {
    fn default() -> Self {
        Self {
            max_outer_iterations: 60,
            max_simplex_iterations: 400,
            tolerance: 1e-9,
            restarts: 4,
        }
    }
}

/// Top-level configuration for one pooling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Upper bound on the total cost summed over datasets.
    pub target_cost: u64,
    #[serde(default)]
    pub mode: SearchMode,
    #[serde(default)]
    pub round: Option<RoundSpec>,
    /// One coefficient per parameter, in table column order.
    #[serde(default)]
    pub loss_coeffs: Option<Vec<f64>>,
    #[serde(default)]
    pub nd: NdSettings,
}

impl SearchConfig {
    pub fn new(target_cost: u64) -> Self {
        Self {
            target_cost,
            mode: SearchMode::Standard,
            round: None,
            loss_coeffs: None,
            nd: NdSettings::default(),
        }
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_rounding(mut self, round: RoundSpec) -> Self {
        self.round = Some(round);
        self
    }

    pub fn with_loss_coeffs(mut self, coeffs: Vec<f64>) -> Self {
        self.loss_coeffs = Some(coeffs);
        self
    }

    pub fn with_nd_settings(mut self, nd: NdSettings) -> Self {
        self.nd = nd;
        self
    }

    /// Loss coefficients to use for `n_params` parameters: the explicit ones
    /// if given, otherwise the documented defaults for the mode.
    pub fn resolved_loss_coeffs(&self, n_params: usize) -> Vec<f64> {
        match (&self.loss_coeffs, self.mode) {
            (Some(coeffs), _) => coeffs.clone(),
            (None, SearchMode::Standard) => STANDARD_LOSS_COEFFS.to_vec(),
            (None, SearchMode::HigherDimensional) => vec![1.0; n_params],
        }
    }

    /// Check every configuration constraint against the inputs.
    pub fn validate(
        &self,
        table: &MeasurementTable,
        weights: Option<&DatasetWeights>,
    ) -> Result<(), ConfigError> {
        if self.target_cost == 0 {
            return Err(ConfigError::NonPositiveTarget);
        }

        let names = table.param_names();
        if names.is_empty() {
            return Err(ConfigError::NoParameters);
        }

        if let Some(coeffs) = &self.loss_coeffs {
            if coeffs.len() != names.len() {
                return Err(ConfigError::CoefficientCount {
                    expected: names.len(),
                    got: coeffs.len(),
                });
            }
            if let Some((index, value)) = coeffs.iter().enumerate().find(|(_, c)| !c.is_finite()) {
                return Err(ConfigError::NonFiniteCoefficient {
                    index,
                    value: *value,
                });
            }
        }

        match self.mode {
            SearchMode::HigherDimensional => {
                if self.round.is_some() {
                    return Err(ConfigError::RoundingWithHigherDimensional);
                }
            }
            SearchMode::Standard => {
                if !names.is_standard() {
                    return Err(ConfigError::StandardParameters {
                        found: names.as_slice().to_vec(),
                    });
                }
                if let Some(round) = &self.round {
                    if round.mismatches == 0 {
                        return Err(ConfigError::ZeroRoundingMultiple {
                            parameter: MISMATCHES.to_string(),
                        });
                    }
                    if round.cover_extension == 0 {
                        return Err(ConfigError::ZeroRoundingMultiple {
                            parameter: COVER_EXTENSION.to_string(),
                        });
                    }
                }
            }
        }

        if let Some(weights) = weights {
            if let Some(dataset) = table.dataset_ids().find(|d| weights.get(d).is_none()) {
                return Err(ConfigError::MissingWeight {
                    dataset: dataset.clone(),
                });
            }
            if let Some((dataset, _)) = weights.iter().find(|(d, _)| !table.contains_dataset(d)) {
                return Err(ConfigError::UnknownWeightedDataset {
                    dataset: dataset.clone(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ParamNames;

    fn standard_table() -> MeasurementTable {
        let mut table = MeasurementTable::new(ParamNames::standard());
        table.insert("a", vec![0.0, 0.0], 100).unwrap();
        table.insert("b", vec![0.0, 0.0], 80).unwrap();
        table
    }

    #[test]
    fn defaults_depend_on_mode() {
        let config = SearchConfig::new(100);
        assert_eq!(config.resolved_loss_coeffs(2), vec![1.0, 0.01]);

        let nd = SearchConfig::new(100).with_mode(SearchMode::HigherDimensional);
        assert_eq!(nd.resolved_loss_coeffs(3), vec![1.0, 1.0, 1.0]);

        let explicit = SearchConfig::new(100).with_loss_coeffs(vec![2.0, 0.5]);
        assert_eq!(explicit.resolved_loss_coeffs(2), vec![2.0, 0.5]);
    }

    #[test]
    fn valid_standard_config_passes() {
        let config = SearchConfig::new(30).with_rounding(RoundSpec::new(1, 10));
        assert_eq!(config.validate(&standard_table(), None), Ok(()));
    }

    #[test]
    fn zero_target_is_rejected() {
        let config = SearchConfig::new(0);
        assert_eq!(
            config.validate(&standard_table(), None),
            Err(ConfigError::NonPositiveTarget)
        );
    }

    #[test]
    fn coefficient_count_must_match() {
        let config = SearchConfig::new(30).with_loss_coeffs(vec![1.0]);
        assert_eq!(
            config.validate(&standard_table(), None),
            Err(ConfigError::CoefficientCount { expected: 2, got: 1 })
        );
    }

    #[test]
    fn rounding_and_higher_dimensional_are_exclusive() {
        let config = SearchConfig::new(30)
            .with_mode(SearchMode::HigherDimensional)
            .with_rounding(RoundSpec::new(1, 1));
        assert_eq!(
            config.validate(&standard_table(), None),
            Err(ConfigError::RoundingWithHigherDimensional)
        );
    }

    #[test]
    fn standard_mode_requires_named_columns_in_order() {
        let mut table = MeasurementTable::new(ParamNames::new(["cover_extension", "mismatches"]));
        table.insert("a", vec![0.0, 0.0], 1).unwrap();
        let err = SearchConfig::new(30).validate(&table, None).unwrap_err();
        assert!(matches!(err, ConfigError::StandardParameters { .. }));

        // The same table is fine for higher-dimensional search.
        let nd = SearchConfig::new(30).with_mode(SearchMode::HigherDimensional);
        assert_eq!(nd.validate(&table, None), Ok(()));
    }

    #[test]
    fn zero_rounding_multiple_is_rejected() {
        let config = SearchConfig::new(30).with_rounding(RoundSpec::new(1, 0));
        assert_eq!(
            config.validate(&standard_table(), None),
            Err(ConfigError::ZeroRoundingMultiple {
                parameter: "cover_extension".into()
            })
        );
    }

    #[test]
    fn weights_must_be_complete() {
        let mut weights = DatasetWeights::new();
        weights.insert("a", 1.0).unwrap();
        let config = SearchConfig::new(30);
        assert_eq!(
            config.validate(&standard_table(), Some(&weights)),
            Err(ConfigError::MissingWeight { dataset: "b".into() })
        );

        weights.insert("b", 0.5).unwrap();
        weights.insert("c", 0.5).unwrap();
        assert_eq!(
            config.validate(&standard_table(), Some(&weights)),
            Err(ConfigError::UnknownWeightedDataset { dataset: "c".into() })
        );
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: SearchConfig = serde_json::from_str(r#"{"target_cost": 5000}"#).unwrap();
        assert_eq!(config, SearchConfig::new(5000));
    }
}
