use pp_types::{Measurement, SearchError};

use super::{interp1d, measured_bounds, CostSurface};

/// Measurements sharing one mismatch value, sorted by cover extension.
#[derive(Debug, Clone)]
struct Row {
    mismatches: f64,
    extensions: Vec<f64>,
    costs: Vec<f64>,
}

impl Row {
    fn range(&self) -> (f64, f64) {
        (self.extensions[0], self.extensions[self.extensions.len() - 1])
    }

    fn covers(&self, cover_extension: f64) -> bool {
        let (lo, hi) = self.range();
        cover_extension >= lo && cover_extension <= hi
    }

    fn eval(&self, cover_extension: f64) -> f64 {
        interp1d(&self.extensions, &self.costs, cover_extension)
    }
}

/// Cost surface over `(mismatches, cover_extension)`.
///
/// Measurements are grouped into rows by mismatch value. Within a row the
/// cost is piecewise linear in cover extension; between two measured rows it
/// is linear in mismatches. A query is supported only where the row (or both
/// bracketing rows) cover the requested cover extension; anything else is
/// [`SearchError::OutsideSupport`].
#[derive(Debug, Clone)]
pub struct StandardInterpolator {
    dataset: String,
    rows: Vec<Row>,
    bounds: Vec<(f64, f64)>,
}

impl StandardInterpolator {
    pub fn new(dataset: &str, measurements: &[Measurement]) -> Result<Self, SearchError> {
        if measurements.is_empty() {
            return Err(SearchError::EmptyDataset {
                dataset: dataset.to_string(),
            });
        }
        if let Some(m) = measurements.iter().find(|m| m.params.len() != 2) {
            return Err(SearchError::DimensionMismatch {
                dataset: dataset.to_string(),
                expected: 2,
                got: m.params.len(),
            });
        }

        let mut points: Vec<(f64, f64, f64)> = measurements
            .iter()
            .map(|m| (m.params[0], m.params[1], m.cost as f64))
            .collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

        let mut rows: Vec<Row> = Vec::new();
        for (mismatches, extension, cost) in points {
            match rows.last_mut() {
                Some(row) if row.mismatches == mismatches => {
                    row.extensions.push(extension);
                    row.costs.push(cost);
                }
                _ => rows.push(Row {
                    mismatches,
                    extensions: vec![extension],
                    costs: vec![cost],
                }),
            }
        }

        tracing::debug!(dataset, rows = rows.len(), "built standard interpolator");
        Ok(Self {
            dataset: dataset.to_string(),
            rows,
            bounds: measured_bounds(measurements, 2),
        })
    }

    /// Indices of the row equal to `mismatches`, or of the two rows around it.
    fn locate(&self, mismatches: f64) -> Option<(usize, usize)> {
        let i = self.rows.partition_point(|r| r.mismatches < mismatches);
        match self.rows.get(i) {
            Some(row) if row.mismatches == mismatches => Some((i, i)),
            Some(_) if i > 0 => Some((i - 1, i)),
            _ => None,
        }
    }

    /// Measured range of mismatches.
    pub fn mismatch_range(&self) -> (f64, f64) {
        self.bounds[0]
    }

    /// Range of cover extension supported at `mismatches`, if any.
    pub fn cover_extension_range(&self, mismatches: f64) -> Option<(f64, f64)> {
        let (i, j) = self.locate(mismatches)?;
        let (lo_i, hi_i) = self.rows[i].range();
        let (lo_j, hi_j) = self.rows[j].range();
        let (lo, hi) = (lo_i.max(lo_j), hi_i.min(hi_j));
        (lo <= hi).then_some((lo, hi))
    }

    fn outside(&self, x: &[f64]) -> SearchError {
        SearchError::OutsideSupport {
            dataset: self.dataset.clone(),
            params: x.to_vec(),
        }
    }
}

impl CostSurface for StandardInterpolator {
    fn dataset(&self) -> &str {
        &self.dataset
    }

    fn dims(&self) -> usize {
        2
    }

    fn estimate(&self, x: &[f64]) -> Result<f64, SearchError> {
        if x.len() != 2 {
            return Err(SearchError::DimensionMismatch {
                dataset: self.dataset.clone(),
                expected: 2,
                got: x.len(),
            });
        }
        let (mismatches, extension) = (x[0], x[1]);
        let (i, j) = self.locate(mismatches).ok_or_else(|| self.outside(x))?;
        let (lower, upper) = (&self.rows[i], &self.rows[j]);
        if !lower.covers(extension) || !upper.covers(extension) {
            return Err(self.outside(x));
        }
        if i == j {
            return Ok(lower.eval(extension));
        }
        let t = (mismatches - lower.mismatches) / (upper.mismatches - lower.mismatches);
        Ok(lower.eval(extension) * (1.0 - t) + upper.eval(extension) * t)
    }

    fn contains(&self, x: &[f64]) -> bool {
        x.len() == 2
            && self
                .cover_extension_range(x[0])
                .is_some_and(|(lo, hi)| x[1] >= lo && x[1] <= hi)
    }

    fn bounds(&self) -> &[(f64, f64)] {
        &self.bounds
    }
}
