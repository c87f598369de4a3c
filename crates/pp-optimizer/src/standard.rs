//! Standard search over `(mismatches, cover_extension)`.
//!
//! Each dataset's integral design points are reduced to a loss/cost frontier.
//! A budget price is bisected so that every dataset, minimizing its own
//! `weight * loss + price * cost`, lands on a jointly feasible assignment, and
//! leftover budget is spent greedily. That assignment only seeds the exact
//! pass: a dynamic program over the frontiers keeps, per reachable total cost,
//! the lowest loss of the datasets added so far, and drops entries whose
//! Lagrangian lower bound at the settled price already exceeds the seed.
//!
//! Ties: within a dataset, equal-loss points are ordered by mismatches then
//! cover extension. Among minimal-loss assignments the dataset that sorts
//! first takes its earliest frontier point, then the second, and so on.

use rayon::prelude::*;
use std::collections::BTreeMap;

use pp_types::{
    DatasetWeights, MeasurementTable, PoolResult, RoundSpec, SearchError, StandardSelection,
    StandardSolution,
};

use crate::interp::{CostSurface, MonotonicityReport, StandardInterpolator, MAX_GRID_NODES};
use crate::loss::{dataset_weight, LossFunction};
use crate::rounding::GridProjector;

/// Bisection steps on the budget price.
const MAX_PRICE_STEPS: usize = 200;

/// Partial assignments generated in one exact step before falling back to the
/// greedy seed.
const MAX_EXACT_CANDIDATES: usize = 50_000_000;

/// Interpolated estimates are fractional; a design needs whole probes.
pub(crate) fn probe_count(estimate: f64) -> u64 {
    (estimate - 1e-9).ceil().max(0.0) as u64
}

/// An integral design point with its cost and unweighted loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GridPoint {
    pub mismatches: i64,
    pub cover_extension: i64,
    pub cost: u64,
    pub loss: f64,
}

/// Design points ordered by non-decreasing loss and strictly decreasing cost.
#[derive(Debug, Clone)]
pub(crate) struct Frontier {
    points: Vec<GridPoint>,
}

impl Frontier {
    pub(crate) fn build(
        interp: &StandardInterpolator,
        loss: &LossFunction,
    ) -> Result<Self, SearchError> {
        let nodes = Self::count_points(interp);
        if nodes > MAX_GRID_NODES {
            return Err(SearchError::GridTooLarge {
                dataset: interp.dataset().to_string(),
                nodes,
                limit: MAX_GRID_NODES,
            });
        }

        let (m_lo, m_hi) = interp.mismatch_range();
        let mut candidates = Vec::with_capacity(nodes);
        for mismatches in (m_lo.ceil() as i64)..=(m_hi.floor() as i64) {
            let Some((e_lo, e_hi)) = interp.cover_extension_range(mismatches as f64) else {
                continue;
            };
            for cover_extension in (e_lo.ceil() as i64)..=(e_hi.floor() as i64) {
                let x = [mismatches as f64, cover_extension as f64];
                candidates.push(GridPoint {
                    mismatches,
                    cover_extension,
                    cost: probe_count(interp.estimate(&x)?),
                    loss: loss.evaluate(&x),
                });
            }
        }
        if candidates.is_empty() {
            return Err(SearchError::NoGridPoints {
                dataset: interp.dataset().to_string(),
            });
        }

        candidates.sort_by(|a, b| {
            a.loss
                .total_cmp(&b.loss)
                .then(a.mismatches.cmp(&b.mismatches))
                .then(a.cover_extension.cmp(&b.cover_extension))
        });
        let mut points: Vec<GridPoint> = Vec::new();
        for candidate in candidates {
            if points.last().map_or(true, |p| candidate.cost < p.cost) {
                points.push(candidate);
            }
        }

        tracing::debug!(
            dataset = interp.dataset(),
            frontier = points.len(),
            "built loss/cost frontier"
        );
        Ok(Self { points })
    }

    /// Integral points in the support, saturating once past the node limit.
    fn count_points(interp: &StandardInterpolator) -> usize {
        let (m_lo, m_hi) = interp.mismatch_range();
        let (first, last) = (m_lo.ceil(), m_hi.floor());
        if last < first {
            return 0;
        }
        if last - first >= MAX_GRID_NODES as f64 {
            return usize::MAX;
        }
        let mut nodes = 0usize;
        for mismatches in (first as i64)..=(last as i64) {
            if let Some((e_lo, e_hi)) = interp.cover_extension_range(mismatches as f64) {
                let width = e_hi.floor() - e_lo.ceil() + 1.0;
                if width > 0.0 {
                    nodes = nodes.saturating_add(width.min(usize::MAX as f64) as usize);
                }
            }
            if nodes > MAX_GRID_NODES {
                break;
            }
        }
        nodes
    }

    pub(crate) fn points(&self) -> &[GridPoint] {
        &self.points
    }

    pub(crate) fn cheapest(&self) -> &GridPoint {
        &self.points[self.points.len() - 1]
    }

    /// Lowest-loss point whose cost fits within `budget`.
    pub(crate) fn best_within(&self, budget: u64) -> Option<usize> {
        let i = self.points.partition_point(|p| p.cost > budget);
        (i < self.points.len()).then_some(i)
    }

    /// Point minimizing `weight * loss + price * cost`; ties go to the
    /// earlier point.
    pub(crate) fn pick(&self, weight: f64, price: f64) -> usize {
        let mut best = 0;
        let mut best_value = f64::INFINITY;
        for (i, p) in self.points.iter().enumerate() {
            let value = weight * p.loss + price * p.cost as f64;
            if value < best_value {
                best = i;
                best_value = value;
            }
        }
        best
    }

    fn max_abs_loss(&self) -> f64 {
        self.points.iter().map(|p| p.loss.abs()).fold(0.0, f64::max)
    }
}

/// Best loss of the last datasets at one total cost.
#[derive(Debug, Clone, Copy)]
struct Partial {
    cost: u64,
    loss: f64,
}

/// One dataset's inputs to the joint search.
#[derive(Debug, Clone)]
pub(crate) struct DatasetPlan {
    pub dataset: String,
    pub weight: f64,
    pub interp: StandardInterpolator,
    pub frontier: Frontier,
}

/// Two-parameter budget-constrained search.
#[derive(Debug)]
pub struct StandardSearch<'a> {
    table: &'a MeasurementTable,
    weights: Option<&'a DatasetWeights>,
    loss: LossFunction,
    target: u64,
    round: Option<RoundSpec>,
}

impl<'a> StandardSearch<'a> {
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
            round: None,
        }
    }

    pub fn with_rounding(mut self, round: Option<RoundSpec>) -> Self {
        self.round = round;
        self
    }

    pub fn run(&self) -> PoolResult<StandardSolution> {
        tracing::info!(
            datasets = self.table.len(),
            target = self.target,
            "starting standard search"
        );

        let plans = self.plan()?;

        let min_total: u64 = plans.iter().map(|p| p.frontier.cheapest().cost).sum();
        if min_total > self.target {
            return Err(SearchError::Infeasible {
                target: self.target,
                min_achievable: min_total as f64,
            }
            .into());
        }

        let (mut seed, near, price) = self.allocate(&plans);
        self.spend_slack(&plans, &mut seed, &near);
        let choice = self.solve_exact(&plans, &seed, price);

        let mut points: Vec<[i64; 2]> = plans
            .iter()
            .zip(&choice)
            .map(|(plan, &i)| {
                let p = &plan.frontier.points()[i];
                [p.mismatches, p.cover_extension]
            })
            .collect();

        if let Some(round) = self.round {
            let projector = GridProjector::new(round);
            for (plan, point) in plans.iter().zip(points.iter_mut()) {
                *point = projector.project(&plan.interp, *point)?;
            }
            let surfaces: Vec<(&StandardInterpolator, f64)> =
                plans.iter().map(|p| (&p.interp, p.weight)).collect();
            projector.repair(&surfaces, &self.loss, &mut points, self.target)?;
        }

        self.report(&plans, &points)
    }

    fn plan(&self) -> PoolResult<Vec<DatasetPlan>> {
        let datasets: Vec<_> = self.table.iter().collect();
        let plans = datasets
            .par_iter()
            .map(|(dataset, measurements)| {
                MonotonicityReport::check(dataset, measurements).warn_if_violated();
                let interp = StandardInterpolator::new(dataset, measurements)?;
                let frontier = Frontier::build(&interp, &self.loss)?;
                Ok(DatasetPlan {
                    dataset: dataset.to_string(),
                    weight: dataset_weight(self.weights, dataset),
                    interp,
                    frontier,
                })
            })
            .collect::<Result<Vec<_>, SearchError>>()?;
        Ok(plans)
    }

    /// Bisect the budget price until the per-dataset picks fit the target.
    ///
    /// Returns the feasible picks at the settled price, the (over-budget)
    /// picks just below it, and the price itself.
    fn allocate(&self, plans: &[DatasetPlan]) -> (Vec<usize>, Vec<usize>, f64) {
        let picks_at = |price: f64| -> (Vec<usize>, u64) {
            let picks: Vec<usize> = plans.iter().map(|p| p.frontier.pick(p.weight, price)).collect();
            let total = plans
                .iter()
                .zip(&picks)
                .map(|(p, &i)| p.frontier.points()[i].cost)
                .sum();
            (picks, total)
        };

        let (free, free_total) = picks_at(0.0);
        if free_total <= self.target {
            return (free.clone(), free, 0.0);
        }

        // At this price every dataset prefers its cheapest point, whose total
        // was already checked against the target.
        let mut hi = 2.0
            * plans
                .iter()
                .map(|p| p.weight * p.frontier.max_abs_loss())
                .fold(0.0, f64::max)
            + 1.0;
        let mut lo = 0.0;
        let mut best = picks_at(hi).0;
        let mut near = free;
        for _ in 0..MAX_PRICE_STEPS {
            let mid = 0.5 * (lo + hi);
            if mid <= lo || mid >= hi {
                break;
            }
            let (picks, total) = picks_at(mid);
            if total <= self.target {
                hi = mid;
                best = picks;
            } else {
                lo = mid;
                near = picks;
            }
        }
        tracing::debug!(price = hi, "budget price settled");
        (best, near, hi)
    }

    /// Spend leftover budget one move at a time, taking the move with the
    /// largest loss reduction per extra probe until none fits.
    ///
    /// Candidate moves per dataset: its pick just below the settled price,
    /// the next frontier point, and the lowest-loss point the slack allows.
    fn spend_slack(&self, plans: &[DatasetPlan], choice: &mut [usize], near: &[usize]) {
        let mut total: u64 = plans
            .iter()
            .zip(choice.iter())
            .map(|(p, &i)| p.frontier.points()[i].cost)
            .sum();

        loop {
            let slack = self.target.saturating_sub(total);
            let mut best_move: Option<(usize, usize, f64)> = None;
            for (d, plan) in plans.iter().enumerate() {
                let points = plan.frontier.points();
                let current = &points[choice[d]];
                let budget = current.cost + slack;
                let candidates = [
                    Some(near[d]),
                    choice[d].checked_sub(1),
                    plan.frontier.best_within(budget),
                ];
                for j in candidates.into_iter().flatten() {
                    if j >= choice[d] || points[j].cost > budget {
                        continue;
                    }
                    let gain = plan.weight * (current.loss - points[j].loss);
                    if gain <= 0.0 {
                        continue;
                    }
                    let rate = gain / (points[j].cost - current.cost) as f64;
                    if best_move.map_or(true, |(_, _, r)| rate > r) {
                        best_move = Some((d, j, rate));
                    }
                }
            }

            let Some((d, j, rate)) = best_move else { break };
            let points = plans[d].frontier.points();
            total = total - points[choice[d]].cost + points[j].cost;
            tracing::trace!(dataset = %plans[d].dataset, rate, "spent slack");
            choice[d] = j;
        }
    }

    /// Minimal-loss assignment within the target, seeded by a feasible one.
    ///
    /// Datasets are added last to first; each step keeps the (cost, loss)
    /// pairs of the datasets added so far that are strictly better in loss
    /// than every cheaper pair. With `price` from [`Self::allocate`],
    /// `sum(weight * loss + price * cost) - price * remaining budget` over the
    /// datasets still to add is a lower bound on their loss, so pairs that
    /// cannot beat the seed are dropped early. The kept pairs then guide a
    /// forward pass that applies the tie rule.
    fn solve_exact(&self, plans: &[DatasetPlan], seed: &[usize], price: f64) -> Vec<usize> {
        let upper: f64 = plans
            .iter()
            .zip(seed)
            .map(|(p, &i)| p.weight * p.frontier.points()[i].loss)
            .sum();
        let tolerance = 1e-9 * upper.abs().max(1.0);

        // Cheapest cost and dual value of datasets `0..d`.
        let mut min_cost_before = vec![0u64; plans.len() + 1];
        let mut dual_before = vec![0.0; plans.len() + 1];
        for (d, plan) in plans.iter().enumerate() {
            let points = plan.frontier.points();
            let pick = &points[plan.frontier.pick(plan.weight, price)];
            min_cost_before[d + 1] = min_cost_before[d] + plan.frontier.cheapest().cost;
            dual_before[d + 1] =
                dual_before[d] + plan.weight * pick.loss + price * pick.cost as f64;
        }

        let mut layers: Vec<Vec<Partial>> = vec![vec![Partial { cost: 0, loss: 0.0 }]];
        for (d, plan) in plans.iter().enumerate().rev() {
            let points = plan.frontier.points();
            // Without weight every point has zero loss and the cheapest dominates.
            let choices: Vec<usize> = if plan.weight == 0.0 {
                vec![points.len() - 1]
            } else {
                (0..points.len()).collect()
            };
            let current = &layers[layers.len() - 1];
            if current.len().saturating_mul(choices.len()) > MAX_EXACT_CANDIDATES {
                tracing::warn!(
                    dataset = %plan.dataset,
                    states = current.len(),
                    "exact search too large; keeping greedy assignment"
                );
                return seed.to_vec();
            }

            let budget = self.target - min_cost_before[d];
            let dual_rest = dual_before[d];
            let target = self.target;
            let weight = plan.weight;
            let mut next: Vec<Partial> = current
                .par_iter()
                .flat_map_iter(|state| {
                    choices.iter().filter_map(move |&j| {
                        let point = &points[j];
                        let cost = state.cost + point.cost;
                        if cost > budget {
                            return None;
                        }
                        let loss = state.loss + weight * point.loss;
                        let bound = loss + dual_rest - price * (target - cost) as f64;
                        (bound <= upper + tolerance).then_some(Partial { cost, loss })
                    })
                })
                .collect();
            next.par_sort_unstable_by(|a, b| a.cost.cmp(&b.cost).then(a.loss.total_cmp(&b.loss)));

            let mut kept = Vec::with_capacity(next.len());
            let mut best_loss = f64::INFINITY;
            for state in next {
                if state.loss < best_loss {
                    best_loss = state.loss;
                    kept.push(state);
                }
            }
            tracing::trace!(dataset = %plan.dataset, states = kept.len(), "exact step");
            layers.push(kept);
        }

        // Kept states have strictly decreasing loss, so the last one is optimal.
        let Some(optimum) = layers[plans.len()].last() else {
            tracing::warn!("exact search lost the seed assignment; keeping it");
            return seed.to_vec();
        };
        let limit = optimum.loss + tolerance;

        // Walk forward, giving each dataset its earliest frontier point that
        // still leaves a completion within the optimal loss.
        let mut choice = Vec::with_capacity(plans.len());
        let (mut spent, mut lost) = (0u64, 0.0);
        for (d, plan) in plans.iter().enumerate() {
            let rest = &layers[plans.len() - d - 1];
            let points = plan.frontier.points();
            let completes = |point: &GridPoint| {
                let cost = spent + point.cost;
                if cost > self.target {
                    return false;
                }
                let fits = rest.partition_point(|s| s.cost <= self.target - cost);
                fits > 0 && lost + plan.weight * point.loss + rest[fits - 1].loss <= limit
            };
            let Some(j) = points.iter().position(completes) else {
                tracing::warn!(
                    dataset = %plan.dataset,
                    "exact search lost the optimum; keeping greedy assignment"
                );
                return seed.to_vec();
            };
            spent += points[j].cost;
            lost += plan.weight * points[j].loss;
            choice.push(j);
        }
        choice
    }

    /// Recompute cost and loss from the final vectors.
    fn report(&self, plans: &[DatasetPlan], points: &[[i64; 2]]) -> PoolResult<StandardSolution> {
        let mut selections = BTreeMap::new();
        let mut total_cost = 0u64;
        let mut total_loss = 0.0;
        for (plan, point) in plans.iter().zip(points) {
            let x = [point[0] as f64, point[1] as f64];
            let cost = probe_count(plan.interp.estimate(&x)?);
            let loss = self.loss.weighted(&x, plan.weight);
            total_cost += cost;
            total_loss += loss;
            selections.insert(
                plan.dataset.clone(),
                StandardSelection {
                    mismatches: point[0],
                    cover_extension: point[1],
                    cost,
                    loss,
                },
            );
        }

        if total_cost > self.target {
            return Err(SearchError::Infeasible {
                target: self.target,
                min_achievable: total_cost as f64,
            }
            .into());
        }

        tracing::info!(total_cost, total_loss, "standard search finished");
        Ok(StandardSolution {
            selections,
            total_cost,
            total_loss,
        })
    }
}
