//! Higher-dimensional search over any number of continuous parameters.
//!
//! Datasets are coupled only through the budget. At a given price each
//! dataset minimizes `weight * loss + price * cost` over its measured bounding
//! box with argmin's Nelder-Mead, independently of the others. The outer loop bisects
//! the price until the summed cost fits the target, then spends what is left
//! along the segment between the last feasible and infeasible solutions.
//!
//! Parameters are never rounded; fractional vectors are valid output.

use argmin::core::{CostFunction, Error as ArgminError, Executor};
use argmin::solver::neldermead::NelderMead;
use rayon::prelude::*;
use std::collections::BTreeMap;

use pp_types::{
    DatasetWeights, MeasurementTable, NdSelection, NdSettings, NdSolution, PoolResult,
    SearchError,
};

use crate::interp::{CostSurface, GridInterpolator, MonotonicityReport};
use crate::loss::{dataset_weight, LossFunction};

/// Doublings of the price before giving up on finding a feasible one.
const MAX_PRICE_DOUBLINGS: usize = 64;

/// Bisection steps when spending leftover budget along a segment.
const REFINE_STEPS: usize = 48;

/// A dataset's parameter vector with its estimated cost.
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    params: Vec<f64>,
    cost: f64,
}

#[derive(Debug)]
struct NdPlan {
    dataset: String,
    weight: f64,
    interp: GridInterpolator,
    measured: Vec<(Vec<f64>, f64)>,
}

fn total_cost(picks: &[Candidate]) -> f64 {
    picks.iter().map(|c| c.cost).sum()
}

/// `weight * loss + price * cost`, evaluated after clamping into the measured
/// bounding box.
#[derive(Clone, Copy)]
struct PricedCost<'p> {
    interp: &'p GridInterpolator,
    loss: &'p LossFunction,
    weight: f64,
    price: f64,
}

impl PricedCost<'_> {
    fn clamp(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.interp.bounds())
            .map(|(v, (lo, hi))| v.clamp(*lo, *hi))
            .collect()
    }
}

impl CostFunction for PricedCost<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, ArgminError> {
        let y = self.clamp(x);
        Ok(match self.interp.estimate(&y) {
            Ok(cost) => self.weight * self.loss.evaluate(&y) + self.price * cost,
            Err(_) => f64::INFINITY,
        })
    }
}

/// Initial simplex: `start` plus one vertex per axis, stepped toward the
/// inside of the box.
fn make_simplex(start: &[f64], bounds: &[(f64, f64)]) -> Vec<Vec<f64>> {
    let mut simplex = Vec::with_capacity(start.len() + 1);
    simplex.push(start.to_vec());
    for (i, (lo, hi)) in bounds.iter().enumerate() {
        let mut vertex = start.to_vec();
        let step = if hi > lo { 0.25 * (hi - lo) } else { 2.5e-4 };
        vertex[i] += if start[i] + step > *hi { -step } else { step };
        simplex.push(vertex);
    }
    simplex
}

/// N-parameter budget-constrained search.
#[derive(Debug)]
pub struct HigherDimensionalSearch<'a> {
    table: &'a MeasurementTable,
    weights: Option<&'a DatasetWeights>,
    loss: LossFunction,
    target: u64,
    settings: NdSettings,
}

impl<'a> HigherDimensionalSearch<'a> {
    pub fn new(
        table: &'a MeasurementTable,
        weights: Option<&'a DatasetWeights>,
        loss: LossFunction,
        target: u64,
    ) -> Self {
        Self {
            table,
            weights,
            loss,
            target,
            settings: NdSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: NdSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn run(&self) -> PoolResult<NdSolution> {
        tracing::info!(
            datasets = self.table.len(),
            params = self.table.param_names().len(),
            target = self.target,
            "starting higher-dimensional search"
        );
        let target = self.target as f64;

        let plans = self.plan()?;

        let cheapest = plans
            .par_iter()
            .map(|plan| self.solve(plan, 0.0, 1.0))
            .collect::<Result<Vec<_>, SearchError>>()?;
        let min_total = total_cost(&cheapest);
        if min_total > target {
            return Err(SearchError::Infeasible {
                target: self.target,
                min_achievable: min_total,
            }
            .into());
        }

        let free = self.picks_at(&plans, &cheapest, 0.0)?;
        if total_cost(&free) <= target {
            return Ok(self.report(&plans, free));
        }

        // Grow the price until the picks fit, then bisect between the last
        // infeasible and first feasible price.
        let mut lo = 0.0;
        let mut hi = 1.0;
        let mut near = free;
        let mut feasible = None;
        for _ in 0..MAX_PRICE_DOUBLINGS {
            let picks = self.picks_at(&plans, &cheapest, hi)?;
            if total_cost(&picks) <= target {
                feasible = Some(picks);
                break;
            }
            lo = hi;
            near = picks;
            hi *= 2.0;
        }

        let mut best = match feasible {
            Some(picks) => {
                let mut best = picks;
                for _ in 0..self.settings.max_outer_iterations {
                    let mid = 0.5 * (lo + hi);
                    let picks = self.picks_at(&plans, &cheapest, mid)?;
                    if total_cost(&picks) <= target {
                        hi = mid;
                        best = picks;
                    } else {
                        lo = mid;
                        near = picks;
                    }
                }
                tracing::debug!(price = hi, "budget price settled");
                best
            }
            None => {
                tracing::warn!("no feasible budget price found; using cheapest designs");
                cheapest
            }
        };

        self.refine(&plans, &mut best, &near)?;
        Ok(self.report(&plans, best))
    }

    fn plan(&self) -> PoolResult<Vec<NdPlan>> {
        let datasets: Vec<_> = self.table.iter().collect();
        let plans = datasets
            .par_iter()
            .map(|(dataset, measurements)| {
                MonotonicityReport::check(dataset, measurements).warn_if_violated();
                let interp = GridInterpolator::new(dataset, measurements)?;
                Ok(NdPlan {
                    dataset: dataset.to_string(),
                    weight: dataset_weight(self.weights, dataset),
                    interp,
                    measured: measurements
                        .iter()
                        .map(|m| (m.params.clone(), m.cost as f64))
                        .collect(),
                })
            })
            .collect::<Result<Vec<_>, SearchError>>()?;
        Ok(plans)
    }

    /// Every dataset's minimizer at `price`. Zero-weight datasets have no loss
    /// to trade, so they stay at their cheapest design.
    fn picks_at(
        &self,
        plans: &[NdPlan],
        cheapest: &[Candidate],
        price: f64,
    ) -> Result<Vec<Candidate>, SearchError> {
        plans
            .par_iter()
            .zip(cheapest.par_iter())
            .map(|(plan, cheap)| {
                if plan.weight == 0.0 {
                    Ok(cheap.clone())
                } else {
                    self.solve(plan, plan.weight, price)
                }
            })
            .collect()
    }

    /// Minimize `weight * loss + price * cost` over the dataset's measured box.
    fn solve(&self, plan: &NdPlan, weight: f64, price: f64) -> Result<Candidate, SearchError> {
        let problem = PricedCost {
            interp: &plan.interp,
            loss: &self.loss,
            weight,
            price,
        };
        let bounds = plan.interp.bounds();
        let solver_failed = |err: ArgminError| SearchError::Solver {
            dataset: plan.dataset.clone(),
            message: err.to_string(),
        };

        // Best measured points first, then the two extreme corners of the box.
        let mut scored: Vec<(f64, usize)> = plan
            .measured
            .iter()
            .enumerate()
            .map(|(i, (params, cost))| (weight * self.loss.evaluate(params) + price * cost, i))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let mut starts: Vec<Vec<f64>> = scored
            .iter()
            .take(self.settings.restarts)
            .map(|(_, i)| plan.measured[*i].0.clone())
            .collect();
        starts.push(bounds.iter().map(|(lo, _)| *lo).collect());
        starts.push(bounds.iter().map(|(_, hi)| *hi).collect());

        let mut best_point = starts[0].clone();
        let mut best_value = f64::INFINITY;
        for start in &starts {
            let solver = NelderMead::new(make_simplex(start, bounds))
                .with_sd_tolerance(self.settings.tolerance)
                .map_err(solver_failed)?;
            let result = Executor::new(problem, solver)
                .configure(|s| s.max_iters(self.settings.max_simplex_iterations as u64))
                .run()
                .map_err(solver_failed)?;
            let state = result.state;
            if let Some(point) = state.best_param {
                if state.best_cost < best_value {
                    best_value = state.best_cost;
                    best_point = point;
                }
            }
        }

        let params = problem.clamp(&best_point);
        let cost = plan.interp.estimate(&params)?;
        Ok(Candidate { params, cost })
    }

    /// Move each dataset from its feasible pick toward its lower-loss
    /// infeasible pick as far as the remaining budget allows.
    fn refine(
        &self,
        plans: &[NdPlan],
        best: &mut [Candidate],
        near: &[Candidate],
    ) -> Result<(), SearchError> {
        let target = self.target as f64;
        let mut total = total_cost(best);

        for (d, plan) in plans.iter().enumerate() {
            let from = best[d].clone();
            let to = &near[d];
            let from_loss = self.loss.evaluate(&from.params);
            if plan.weight == 0.0 || self.loss.evaluate(&to.params) >= from_loss {
                continue;
            }

            let point_at = |t: f64| -> Vec<f64> {
                from.params
                    .iter()
                    .zip(&to.params)
                    .map(|(a, b)| a + t * (b - a))
                    .collect()
            };

            let mut accepted: Option<Candidate> = None;
            let (mut lo, mut hi) = (0.0, 1.0);
            for step in 0..REFINE_STEPS {
                let t = if step == 0 { 1.0 } else { 0.5 * (lo + hi) };
                let params = point_at(t);
                let cost = plan.interp.estimate(&params)?;
                let fits = total - from.cost + cost <= target;
                if fits && self.loss.evaluate(&params) < from_loss {
                    accepted = Some(Candidate { params, cost });
                    if step == 0 {
                        break;
                    }
                    lo = t;
                } else {
                    hi = t;
                }
            }

            if let Some(candidate) = accepted {
                tracing::trace!(dataset = %plan.dataset, cost = candidate.cost, "spent slack");
                total = total - from.cost + candidate.cost;
                best[d] = candidate;
            }
        }
        Ok(())
    }

    fn report(&self, plans: &[NdPlan], picks: Vec<Candidate>) -> NdSolution {
        let mut selections = BTreeMap::new();
        let mut total_cost = 0.0;
        let mut total_loss = 0.0;
        for (plan, pick) in plans.iter().zip(picks) {
            let loss = self.loss.weighted(&pick.params, plan.weight);
            total_cost += pick.cost;
            total_loss += loss;
            selections.insert(
                plan.dataset.clone(),
                NdSelection {
                    params: pick.params,
                    cost: pick.cost,
                    loss,
                },
            );
        }

        tracing::info!(total_cost, total_loss, "higher-dimensional search finished");
        NdSolution {
            param_names: self.table.param_names().clone(),
            selections,
            total_cost,
            total_loss,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pp_types::{ParamNames, PoolError};

    /// cost = 1000 - 100*a - 10*b over a in {0,2,4}, b in {0,10,20}.
    fn linear_table() -> MeasurementTable {
        let mut table = MeasurementTable::new(ParamNames::new(["a", "b"]));
        for a in [0.0, 2.0, 4.0] {
            for b in [0.0, 10.0, 20.0] {
                let cost = 1000.0 - 100.0 * a - 10.0 * b;
                table.insert("zika", vec![a, b], cost as u64).unwrap();
            }
        }
        table
    }

    fn unit_loss() -> LossFunction {
        LossFunction::new(vec![1.0, 1.0])
    }

    #[test]
    fn loose_budget_keeps_smallest_parameters() {
        let table = linear_table();
        let solution = HigherDimensionalSearch::new(&table, None, unit_loss(), 5000)
            .run()
            .unwrap();
        let sel = &solution.selections["zika"];
        assert!(sel.params.iter().all(|p| p.abs() < 1e-9));
        assert!((solution.total_cost - 1000.0).abs() < 1e-9);
        assert!(solution.total_loss.abs() < 1e-9);
    }

    #[test]
    fn binding_budget_spends_on_the_cheaper_parameter() {
        let table = linear_table();
        let solution = HigherDimensionalSearch::new(&table, None, unit_loss(), 700)
            .run()
            .unwrap();
        let sel = &solution.selections["zika"];
        assert!(solution.total_cost <= 700.0);
        // `a` buys 100 probes per unit of loss, `b` only 10.
        assert!((sel.params[0] - 3.0).abs() < 1e-6);
        assert!(sel.params[1].abs() < 1e-6);
        assert!((solution.total_loss - 3.0).abs() < 1e-6);
    }

    #[test]
    fn infeasible_target_reports_cheapest_total() {
        let table = linear_table();
        let err = HigherDimensionalSearch::new(&table, None, unit_loss(), 300)
            .run()
            .unwrap_err();
        match err {
            PoolError::Search(SearchError::Infeasible { target, min_achievable }) => {
                assert_eq!(target, 300);
                assert!((min_achievable - 400.0).abs() < 1e-9);
            }
            other => panic!("Expected Infeasible, got: {other:?}"),
        }
    }

    #[test]
    fn initial_simplex_steps_into_the_box() {
        let simplex = make_simplex(&[4.0, 0.0, 1.0], &[(0.0, 4.0), (0.0, 20.0), (1.0, 1.0)]);
        assert_eq!(simplex.len(), 4);
        assert_eq!(simplex[0], vec![4.0, 0.0, 1.0]);
        assert_eq!(simplex[1], vec![3.0, 0.0, 1.0]);
        assert_eq!(simplex[2], vec![4.0, 5.0, 1.0]);
        assert_eq!(simplex[3], vec![4.0, 0.0, 1.0 - 2.5e-4]);
    }

    #[test]
    fn solver_rejections_name_the_dataset() {
        let table = linear_table();
        let settings = NdSettings {
            tolerance: -1.0,
            ..NdSettings::default()
        };
        let err = HigherDimensionalSearch::new(&table, None, unit_loss(), 700)
            .with_settings(settings)
            .run()
            .unwrap_err();
        assert!(matches!(
            err,
            PoolError::Search(SearchError::Solver { ref dataset, .. }) if dataset == "zika"
        ));
    }

    #[test]
    fn selections_stay_inside_measured_bounds() {
        let table = linear_table();
        let solution = HigherDimensionalSearch::new(&table, None, unit_loss(), 650)
            .run()
            .unwrap();
        let sel = &solution.selections["zika"];
        assert!(sel.params[0] >= 0.0 && sel.params[0] <= 4.0);
        assert!(sel.params[1] >= 0.0 && sel.params[1] <= 20.0);
    }
}
