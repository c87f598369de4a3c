//! Loss evaluation.

use pp_types::DatasetWeights;

/// Linear loss over a parameter vector: `sum_i coeff_i * param_i`.
#[derive(Debug, Clone, PartialEq)]
pub struct LossFunction {
    coeffs: Vec<f64>,
}

impl LossFunction {
    pub fn new(coeffs: Vec<f64>) -> Self {
        Self { coeffs }
    }

    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    /// Unweighted loss of one dataset's parameter vector.
    pub fn evaluate(&self, params: &[f64]) -> f64 {
        self.coeffs.iter().zip(params).map(|(c, p)| c * p).sum()
    }

    /// Loss scaled by the dataset's weight.
    pub fn weighted(&self, params: &[f64], weight: f64) -> f64 {
        weight * self.evaluate(params)
    }
}

/// Weight of `dataset`, or 1 when no weights were supplied.
pub fn dataset_weight(weights: Option<&DatasetWeights>, dataset: &str) -> f64 {
    weights.and_then(|w| w.get(dataset)).unwrap_or(1.0)
}
