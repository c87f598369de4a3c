//! End-to-end pooling runs through `pp_optimizer::pool`.

use pp_optimizer::{pool, CostSurface, GridInterpolator, StandardInterpolator};
use pp_types::{
    ConfigError, DatasetWeights, MeasurementTable, ParamNames, ParamValue, PoolError,
    PoolingResult, RoundSpec, SearchConfig, SearchError, SearchMode,
};

fn two_point_table() -> MeasurementTable {
    let mut table = MeasurementTable::new(ParamNames::standard());
    table.insert("A", vec![0.0, 0.0], 100).unwrap();
    table.insert("A", vec![5.0, 50.0], 10).unwrap();
    table.insert("B", vec![0.0, 0.0], 80).unwrap();
    table.insert("B", vec![5.0, 50.0], 5).unwrap();
    table
}

/// cost = base - step_m*m - step_e*e on m in {0,2,4,6}, e in {0,50,100}.
fn linear_table(datasets: &[(&str, f64)], step_m: f64, step_e: f64) -> MeasurementTable {
    let mut table = MeasurementTable::new(ParamNames::standard());
    for (name, base) in datasets {
        for m in [0.0, 2.0, 4.0, 6.0] {
            for e in [0.0, 50.0, 100.0] {
                let cost = base - step_m * m - step_e * e;
                table.insert(*name, vec![m, e], cost as u64).unwrap();
            }
        }
    }
    table
}

fn standard(result: PoolingResult) -> pp_types::StandardSolution {
    match result {
        PoolingResult::Standard(s) => s,
        other => panic!("Expected standard result, got: {other:?}"),
    }
}

fn whole_probes(estimate: f64) -> u64 {
    (estimate - 1e-9).ceil() as u64
}

#[test]
fn two_datasets_fit_a_tight_target() {
    let solution = standard(pool(&two_point_table(), None, &SearchConfig::new(30)).unwrap());

    assert!(solution.total_cost <= 30);
    assert_eq!(solution.total_cost, 15);
    for sel in solution.selections.values() {
        assert_eq!((sel.mismatches, sel.cover_extension), (5, 50));
    }
    assert!((solution.total_loss - 11.0).abs() < 1e-9);
}

#[test]
fn target_below_minimum_is_infeasible() {
    let err = pool(&two_point_table(), None, &SearchConfig::new(1)).unwrap_err();
    assert!(err.is_infeasible());
    match err {
        PoolError::Search(SearchError::Infeasible { target, min_achievable }) => {
            assert_eq!(target, 1);
            assert_eq!(min_achievable, 15.0);
        }
        other => panic!("Expected Infeasible, got: {other:?}"),
    }
}

#[test]
fn higher_dimensional_loss_matches_returned_vector() {
    let mut table = MeasurementTable::new(ParamNames::new(["a", "b", "c"]));
    for a in [0.0, 2.0] {
        for b in [0.0, 20.0] {
            for c in [0.0, 50.0] {
                let cost = 800.0 - 100.0 * a - 5.0 * b - 2.0 * c;
                table.insert("zika", vec![a, b, c], cost as u64).unwrap();
            }
        }
    }

    let config = SearchConfig::new(600).with_mode(SearchMode::HigherDimensional);
    let result = pool(&table, None, &config).unwrap();
    assert!(result.total_cost() <= 600.0);

    let rows = result.rows();
    assert_eq!(rows.len(), 1);
    let params: Vec<f64> = rows[0]
        .1
        .iter()
        .map(|v| match v {
            ParamValue::Float(x) => *x,
            ParamValue::Int(_) => panic!("higher-dimensional values are real"),
        })
        .collect();
    assert_eq!(params.len(), 3);

    // Default coefficients are all 1.
    let recomputed: f64 = params.iter().sum();
    assert!((recomputed - result.total_loss()).abs() < 1e-9);
}

#[test]
fn zero_weight_dataset_adds_cost_but_no_loss() {
    let table = linear_table(&[("A", 2000.0), ("B", 1800.0)], 100.0, 4.0);
    let mut weights = DatasetWeights::new();
    weights.insert("A", 0.0).unwrap();
    weights.insert("B", 1.0).unwrap();

    let solution = standard(pool(&table, Some(&weights), &SearchConfig::new(2500)).unwrap());
    let a = &solution.selections["A"];
    let b = &solution.selections["B"];

    assert_eq!(a.loss, 0.0);
    assert_eq!(solution.total_loss, b.loss);
    assert_eq!(solution.total_cost, a.cost + b.cost);
    assert!(solution.total_cost <= 2500);
    // A takes its cheapest design so B can keep its budget.
    assert_eq!((a.mismatches, a.cover_extension), (6, 100));
}

#[test]
fn totals_never_exceed_the_target() {
    let table = linear_table(&[("A", 2000.0), ("B", 1800.0), ("C", 1500.0)], 100.0, 3.0);
    // Cheapest designs cost 1100 + 900 + 600.
    for target in [2600u64, 2700, 3000, 3500, 4000, 4500, 5300, 10_000] {
        let solution = standard(pool(&table, None, &SearchConfig::new(target)).unwrap());
        assert!(solution.total_cost <= target, "target {target}");
        let summed: u64 = solution.selections.values().map(|s| s.cost).sum();
        assert_eq!(summed, solution.total_cost);
    }
    let err = pool(&table, None, &SearchConfig::new(2599)).unwrap_err();
    assert!(err.is_infeasible());
}

#[test]
fn searches_are_deterministic() {
    let table = linear_table(&[("A", 2000.0), ("B", 1800.0)], 100.0, 4.0);
    let config = SearchConfig::new(2400);
    assert_eq!(
        pool(&table, None, &config).unwrap(),
        pool(&table, None, &config).unwrap()
    );

    let config = config.with_mode(SearchMode::HigherDimensional);
    assert_eq!(
        pool(&table, None, &config).unwrap(),
        pool(&table, None, &config).unwrap()
    );
}

#[test]
fn rounded_results_report_rounded_costs() {
    let table = linear_table(&[("A", 2000.0), ("B", 1800.0)], 100.0, 4.0);
    let config = SearchConfig::new(2200).with_rounding(RoundSpec::new(5, 25));
    let solution = standard(pool(&table, None, &config).unwrap());

    assert!(solution.total_cost <= 2200);
    for (dataset, sel) in &solution.selections {
        assert_eq!(sel.mismatches % 5, 0);
        assert_eq!(sel.cover_extension % 25, 0);

        let interp =
            StandardInterpolator::new(dataset, table.measurements(dataset).unwrap()).unwrap();
        let estimate = interp.estimate(&sel.params()).unwrap();
        assert_eq!(whole_probes(estimate), sel.cost);

        let loss = sel.mismatches as f64 + 0.01 * sel.cover_extension as f64;
        assert!((loss - sel.loss).abs() < 1e-12);
    }
}

#[test]
fn rounding_with_higher_dimensional_search_is_rejected() {
    let config = SearchConfig::new(30)
        .with_mode(SearchMode::HigherDimensional)
        .with_rounding(RoundSpec::new(1, 10));
    let err = pool(&two_point_table(), None, &config).unwrap_err();
    assert!(matches!(
        err,
        PoolError::Config(ConfigError::RoundingWithHigherDimensional)
    ));
}

#[test]
fn standard_mode_requires_standard_columns() {
    let mut table = MeasurementTable::new(ParamNames::new(["cover_extension", "mismatches"]));
    table.insert("A", vec![0.0, 0.0], 10).unwrap();
    let err = pool(&table, None, &SearchConfig::new(30)).unwrap_err();
    assert!(matches!(
        err,
        PoolError::Config(ConfigError::StandardParameters { .. })
    ));
}

#[test]
fn coefficient_count_must_match_parameters() {
    let config = SearchConfig::new(30).with_loss_coeffs(vec![1.0, 0.01, 3.0]);
    let err = pool(&two_point_table(), None, &config).unwrap_err();
    assert!(matches!(
        err,
        PoolError::Config(ConfigError::CoefficientCount { expected: 2, got: 3 })
    ));
}

#[test]
fn incomplete_weights_are_rejected() {
    let mut weights = DatasetWeights::new();
    weights.insert("A", 1.0).unwrap();
    let err = pool(&two_point_table(), Some(&weights), &SearchConfig::new(30)).unwrap_err();
    assert!(matches!(
        err,
        PoolError::Config(ConfigError::MissingWeight { ref dataset }) if dataset == "B"
    ));
}

#[test]
fn empty_dataset_fails_the_whole_search() {
    let mut table = two_point_table();
    table.add_dataset("C");
    let err = pool(&table, None, &SearchConfig::new(500)).unwrap_err();
    assert!(matches!(
        err,
        PoolError::Search(SearchError::EmptyDataset { ref dataset }) if dataset == "C"
    ));
}

#[test]
fn interpolators_are_exact_and_monotone() {
    let table = linear_table(&[("A", 2000.0)], 100.0, 4.0);
    let measurements = table.measurements("A").unwrap();
    let standard = StandardInterpolator::new("A", measurements).unwrap();
    let grid = GridInterpolator::new("A", measurements).unwrap();

    for m in measurements {
        assert_eq!(standard.estimate(&m.params).unwrap(), m.cost as f64);
        assert_eq!(grid.estimate(&m.params).unwrap(), m.cost as f64);
    }

    for surface in [&standard as &dyn CostSurface, &grid as &dyn CostSurface] {
        let low = surface.estimate(&[1.0, 20.0]).unwrap();
        let high = surface.estimate(&[3.0, 70.0]).unwrap();
        assert!(high <= low);
        assert!(surface.contains(&[3.0, 70.0]));
        assert!(!surface.contains(&[7.0, 70.0]));
    }
}
