use std::collections::HashMap;

use pp_types::{Measurement, SearchError};

use super::{measured_bounds, CostSurface};

/// Upper bound on the number of nodes in one dataset's interpolation grid.
pub const MAX_GRID_NODES: usize = 1_000_000;

/// Multilinear cost surface over any number of parameters.
///
/// The grid is the Cartesian product of the distinct measured values on each
/// axis. Nodes that were measured keep their observed cost; the remaining
/// nodes are filled by inverse-distance weighting over the measurements, with
/// every axis rescaled to its measured range. Queries outside the grid are
/// extrapolated linearly from the edge cells; [`CostSurface::contains`]
/// reports whether a query needed extrapolation.
#[derive(Debug, Clone)]
pub struct GridInterpolator {
    dataset: String,
    axes: Vec<Vec<f64>>,
    strides: Vec<usize>,
    values: Vec<f64>,
    bounds: Vec<(f64, f64)>,
}

impl GridInterpolator {
    pub fn new(dataset: &str, measurements: &[Measurement]) -> Result<Self, SearchError> {
        let first = measurements.first().ok_or_else(|| SearchError::EmptyDataset {
            dataset: dataset.to_string(),
        })?;
        let dims = first.params.len();
        if let Some(m) = measurements.iter().find(|m| m.params.len() != dims) {
            return Err(SearchError::DimensionMismatch {
                dataset: dataset.to_string(),
                expected: dims,
                got: m.params.len(),
            });
        }

        let axes: Vec<Vec<f64>> = (0..dims)
            .map(|j| {
                let mut axis: Vec<f64> = measurements.iter().map(|m| m.params[j]).collect();
                axis.sort_by(f64::total_cmp);
                axis.dedup();
                axis
            })
            .collect();

        let nodes = axes
            .iter()
            .try_fold(1usize, |acc, axis| acc.checked_mul(axis.len()))
            .filter(|n| *n <= MAX_GRID_NODES)
            .ok_or_else(|| SearchError::GridTooLarge {
                dataset: dataset.to_string(),
                nodes: axes.iter().fold(1usize, |acc, a| acc.saturating_mul(a.len())),
                limit: MAX_GRID_NODES,
            })?;

        let mut strides = vec![1usize; dims];
        for j in (0..dims.saturating_sub(1)).rev() {
            strides[j] = strides[j + 1] * axes[j + 1].len();
        }

        let mut observed: HashMap<usize, f64> = HashMap::with_capacity(measurements.len());
        for m in measurements {
            let index: usize = m
                .params
                .iter()
                .zip(&axes)
                .zip(&strides)
                .map(|((p, axis), stride)| axis.partition_point(|a| a < p) * stride)
                .sum();
            observed.insert(index, m.cost as f64);
        }

        let bounds = measured_bounds(measurements, dims);
        let scales: Vec<f64> = bounds
            .iter()
            .map(|(lo, hi)| if hi > lo { 1.0 / (hi - lo) } else { 0.0 })
            .collect();

        let mut values = Vec::with_capacity(nodes);
        let mut coords = vec![0.0; dims];
        for index in 0..nodes {
            if let Some(cost) = observed.get(&index) {
                values.push(*cost);
                continue;
            }
            let mut rem = index;
            for j in 0..dims {
                coords[j] = axes[j][rem / strides[j]];
                rem %= strides[j];
            }
            values.push(inverse_distance(&coords, measurements, &scales));
        }

        tracing::debug!(
            dataset,
            nodes,
            filled = nodes - observed.len(),
            "built grid interpolator"
        );

        Ok(Self {
            dataset: dataset.to_string(),
            axes,
            strides,
            values,
            bounds,
        })
    }

    /// Distinct measured values on each axis.
    pub fn axes(&self) -> &[Vec<f64>] {
        &self.axes
    }
}

/// Inverse-squared-distance weighted mean of the measured costs.
fn inverse_distance(x: &[f64], measurements: &[Measurement], scales: &[f64]) -> f64 {
    let mut weighted = 0.0;
    let mut total = 0.0;
    for m in measurements {
        let d2: f64 = x
            .iter()
            .zip(&m.params)
            .zip(scales)
            .map(|((a, b), s)| ((a - b) * s).powi(2))
            .sum();
        if d2 == 0.0 {
            return m.cost as f64;
        }
        let w = 1.0 / d2;
        weighted += w * m.cost as f64;
        total += w;
    }
    weighted / total
}

impl CostSurface for GridInterpolator {
    fn dataset(&self) -> &str {
        &self.dataset
    }

    fn dims(&self) -> usize {
        self.axes.len()
    }

    fn estimate(&self, x: &[f64]) -> Result<f64, SearchError> {
        if x.len() != self.axes.len() {
            return Err(SearchError::DimensionMismatch {
                dataset: self.dataset.clone(),
                expected: self.axes.len(),
                got: x.len(),
            });
        }

        // Cell origin and fractional offset along each axis that has a span.
        let mut base = 0usize;
        let mut active: Vec<(usize, f64)> = Vec::with_capacity(x.len());
        for ((axis, stride), &xj) in self.axes.iter().zip(&self.strides).zip(x) {
            if axis.len() < 2 {
                continue;
            }
            let i = axis.partition_point(|&a| a < xj).saturating_sub(1).min(axis.len() - 2);
            let t = (xj - axis[i]) / (axis[i + 1] - axis[i]);
            base += i * stride;
            active.push((*stride, t));
        }

        let mut estimate = 0.0;
        for corner in 0..(1usize << active.len()) {
            let mut weight = 1.0;
            let mut index = base;
            for (bit, (stride, t)) in active.iter().enumerate() {
                if corner & (1 << bit) != 0 {
                    weight *= t;
                    index += stride;
                } else {
                    weight *= 1.0 - t;
                }
            }
            if weight != 0.0 {
                estimate += weight * self.values[index];
            }
        }
        Ok(estimate)
    }

    fn contains(&self, x: &[f64]) -> bool {
        x.len() == self.bounds.len()
            && x
                .iter()
                .zip(&self.bounds)
                .all(|(v, (lo, hi))| *v >= *lo && *v <= *hi)
    }

    fn bounds(&self) -> &[(f64, f64)] {
        &self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurement(params: &[f64], cost: u64) -> Measurement {
        Measurement {
            params: params.to_vec(),
            cost,
        }
    }

    /// cost = 1000 - 100*a - 10*b - c on a full 3x3x2 grid.
    fn full_grid() -> Vec<Measurement> {
        let mut out = Vec::new();
        for a in [0.0, 1.0, 2.0] {
            for b in [0.0, 5.0, 10.0] {
                for c in [0.0, 20.0] {
                    let cost = 1000.0 - 100.0 * a - 10.0 * b - c;
                    out.push(measurement(&[a, b, c], cost as u64));
                }
            }
        }
        out
    }

    #[test]
    fn exact_at_measured_points() {
        let measurements = full_grid();
        let interp = GridInterpolator::new("zika", &measurements).unwrap();
        for m in &measurements {
            assert_eq!(interp.estimate(&m.params).unwrap(), m.cost as f64);
        }
    }

    #[test]
    fn reproduces_linear_surface_between_nodes() {
        let interp = GridInterpolator::new("zika", &full_grid()).unwrap();
        let value = interp.estimate(&[0.5, 2.5, 10.0]).unwrap();
        assert!((value - (1000.0 - 50.0 - 25.0 - 10.0)).abs() < 1e-9);
    }

    #[test]
    fn extrapolates_outside_measured_range() {
        let interp = GridInterpolator::new("zika", &full_grid()).unwrap();
        let x = [3.0, 0.0, 0.0];
        assert!(!interp.contains(&x));
        let value = interp.estimate(&x).unwrap();
        assert!((value - 700.0).abs() < 1e-9);
    }

    #[test]
    fn sparse_measurements_stay_exact() {
        let measurements = vec![
            measurement(&[0.0, 0.0], 500),
            measurement(&[1.0, 10.0], 200),
            measurement(&[2.0, 20.0], 50),
        ];
        let interp = GridInterpolator::new("zika", &measurements).unwrap();
        assert_eq!(interp.axes()[0], vec![0.0, 1.0, 2.0]);
        for m in &measurements {
            assert_eq!(interp.estimate(&m.params).unwrap(), m.cost as f64);
        }
        // Filled nodes sit between the observed extremes.
        let filled = interp.estimate(&[0.0, 20.0]).unwrap();
        assert!(filled > 50.0 && filled < 500.0);
    }

    #[test]
    fn monotone_grid_gives_monotone_estimates() {
        let interp = GridInterpolator::new("zika", &full_grid()).unwrap();
        let low = interp.estimate(&[0.3, 1.0, 4.0]).unwrap();
        let high = interp.estimate(&[1.7, 8.0, 16.0]).unwrap();
        assert!(high <= low);
    }

    #[test]
    fn single_point_is_constant_everywhere() {
        let interp = GridInterpolator::new("zika", &[measurement(&[1.0, 2.0, 3.0], 77)]).unwrap();
        assert_eq!(interp.estimate(&[1.0, 2.0, 3.0]).unwrap(), 77.0);
        assert_eq!(interp.estimate(&[9.0, -2.0, 0.5]).unwrap(), 77.0);
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        let interp = GridInterpolator::new("zika", &full_grid()).unwrap();
        assert!(matches!(
            interp.estimate(&[1.0, 2.0]),
            Err(SearchError::DimensionMismatch { expected: 3, got: 2, .. })
        ));
    }
}
