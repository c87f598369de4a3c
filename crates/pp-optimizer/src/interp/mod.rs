//! Per-dataset cost interpolation.
//!
//! Each dataset gets its own [`CostSurface`] built from its sparse
//! measurements. Estimates are exact at measured parameter vectors.
//!
//! The two implementations differ in their support policy:
//! [`StandardInterpolator`] refuses to evaluate outside the region spanned by
//! its measurements, while [`GridInterpolator`] extrapolates linearly and
//! leaves it to the caller to check [`CostSurface::contains`].

mod grid;
mod standard;

pub use grid::{GridInterpolator, MAX_GRID_NODES};
pub use standard::StandardInterpolator;

use num_traits::Float;
use serde::{Deserialize, Serialize};

use pp_types::{Measurement, SearchError};

/// Estimated cost as a function of a parameter vector, for one dataset.
pub trait CostSurface: Send + Sync {
    fn dataset(&self) -> &str;

    fn dims(&self) -> usize;

    /// Estimated cost at `x`. May be fractional.
    fn estimate(&self, x: &[f64]) -> Result<f64, SearchError>;

    /// Whether `x` lies inside the measured support.
    fn contains(&self, x: &[f64]) -> bool;

    /// Smallest and largest measured value of each parameter.
    fn bounds(&self) -> &[(f64, f64)];
}

/// Piecewise-linear interpolation through `(xs, ys)` with linear
/// extrapolation past either end. `xs` must be strictly increasing.
pub(crate) fn interp1d<T: Float>(xs: &[T], ys: &[T], x: T) -> T {
    match xs.len() {
        0 => T::nan(),
        1 => ys[0],
        n => {
            let i = xs.partition_point(|&p| p < x).saturating_sub(1).min(n - 2);
            let t = (x - xs[i]) / (xs[i + 1] - xs[i]);
            // Weighted form keeps endpoints exact: t == 0 or t == 1 returns a sample.
            ys[i] * (T::one() - t) + ys[i + 1] * t
        }
    }
}

/// Per-parameter (min, max) over a dataset's measurements.
pub(crate) fn measured_bounds(measurements: &[Measurement], dims: usize) -> Vec<(f64, f64)> {
    (0..dims)
        .map(|j| {
            measurements.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), m| {
                (lo.min(m.params[j]), hi.max(m.params[j]))
            })
        })
        .collect()
}

/// A pair of measurements where more of every parameter bought a higher cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonotonicityViolation {
    pub higher: Vec<f64>,
    pub higher_cost: u64,
    pub lower: Vec<f64>,
    pub lower_cost: u64,
}

/// Pairs of measurements that break the expected cost/parameter trade-off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonotonicityReport {
    pub dataset: String,
    pub violations: Vec<MonotonicityViolation>,
}

impl MonotonicityReport {
    /// Compare every pair of measurements. A pair violates the trade-off when
    /// one vector dominates the other componentwise yet costs more.
    pub fn check(dataset: &str, measurements: &[Measurement]) -> Self {
        let mut violations = Vec::new();
        for a in measurements {
            for b in measurements {
                let dominates = a.params != b.params
                    && a.params.iter().zip(&b.params).all(|(x, y)| x >= y);
                if dominates && a.cost > b.cost {
                    violations.push(MonotonicityViolation {
                        higher: a.params.clone(),
                        higher_cost: a.cost,
                        lower: b.params.clone(),
                        lower_cost: b.cost,
                    });
                }
            }
        }
        Self {
            dataset: dataset.to_string(),
            violations,
        }
    }

    pub fn is_monotone(&self) -> bool {
        self.violations.is_empty()
    }

    /// Emit a warning when violations were found.
    pub fn warn_if_violated(&self) {
        if let Some(first) = self.violations.first() {
            tracing::warn!(
                dataset = %self.dataset,
                violations = self.violations.len(),
                "probe counts are not monotone in the parameters: {:?} -> {} but {:?} -> {}",
                first.higher,
                first.higher_cost,
                first.lower,
                first.lower_cost
            );
        }
    }
}
