//! # pp-optimizer
//!
//! Chooses per-dataset probe design parameters that minimize weighted loss
//! while keeping the total probe count within a target.
//!
//! Provides per-dataset cost interpolators, the linear loss evaluator, the
//! two-parameter standard search (optionally rounded to user multiples), and
//! the continuous higher-dimensional search. [`pool`] runs the whole pipeline:
//! validate, build interpolators, search, round, report.

pub mod higher;
pub mod interp;
pub mod loss;
pub mod rounding;
pub mod standard;

pub use higher::HigherDimensionalSearch;
pub use interp::{
    CostSurface, GridInterpolator, MonotonicityReport, MonotonicityViolation,
    StandardInterpolator, MAX_GRID_NODES,
};
pub use loss::{dataset_weight, LossFunction};
pub use rounding::{nearest_multiple, GridProjector};
pub use standard::StandardSearch;

use pp_types::{
    DatasetWeights, MeasurementTable, PoolResult, PoolingResult, SearchConfig, SearchMode,
};

/// Run one pooling search over `table` under `config`.
///
/// Configuration is checked before any interpolator is built. Infeasible
/// targets come back as [`pp_types::SearchError::Infeasible`].
pub fn pool(
    table: &MeasurementTable,
    weights: Option<&DatasetWeights>,
    config: &SearchConfig,
) -> PoolResult<PoolingResult> {
    config.validate(table, weights)?;
    let loss = LossFunction::new(config.resolved_loss_coeffs(table.param_names().len()));
    tracing::debug!(coeffs = ?loss.coeffs(), mode = ?config.mode, "resolved loss");

    match config.mode {
        SearchMode::Standard => StandardSearch::new(table, weights, loss, config.target_cost)
            .with_rounding(config.round)
            .run()
            .map(PoolingResult::Standard),
        SearchMode::HigherDimensional => {
            HigherDimensionalSearch::new(table, weights, loss, config.target_cost)
                .with_settings(config.nd.clone())
                .run()
                .map(PoolingResult::HigherDimensional)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pp_types::{ConfigError, ParamNames, PoolError, RoundSpec};

    fn table() -> MeasurementTable {
        let mut table = MeasurementTable::new(ParamNames::standard());
        table.insert("zika", vec![0.0, 0.0], 100).unwrap();
        table.insert("zika", vec![5.0, 50.0], 10).unwrap();
        table
    }

    #[test]
    fn configuration_is_checked_before_searching() {
        let config = SearchConfig::new(30)
            .with_mode(SearchMode::HigherDimensional)
            .with_rounding(RoundSpec::new(1, 10));
        let err = pool(&table(), None, &config).unwrap_err();
        assert!(matches!(
            err,
            PoolError::Config(ConfigError::RoundingWithHigherDimensional)
        ));
    }

    #[test]
    fn dispatches_on_mode() {
        let standard = pool(&table(), None, &SearchConfig::new(500)).unwrap();
        assert!(matches!(standard, PoolingResult::Standard(_)));

        let config = SearchConfig::new(500).with_mode(SearchMode::HigherDimensional);
        let nd = pool(&table(), None, &config).unwrap();
        assert!(matches!(nd, PoolingResult::HigherDimensional(_)));
    }
}
