//! Search results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::SearchMode;
use crate::table::{DatasetId, ParamNames};

/// A concrete parameter value, typed by search mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Parameters chosen for one dataset by standard search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StandardSelection {
    pub mismatches: i64,
    pub cover_extension: i64,
    /// Cost at the selected vector, as an integral probe count.
    pub cost: u64,
    /// Weighted loss contribution of this dataset.
    pub loss: f64,
}

impl StandardSelection {
    pub fn params(&self) -> [f64; 2] {
        [self.mismatches as f64, self.cover_extension as f64]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardSolution {
    pub selections: BTreeMap<DatasetId, StandardSelection>,
    pub total_cost: u64,
    pub total_loss: f64,
}

/// Parameters chosen for one dataset by higher-dimensional search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdSelection {
    pub params: Vec<f64>,
    /// Interpolated (possibly fractional) cost at `params`.
    pub cost: f64,
    /// Weighted loss contribution of this dataset.
    pub loss: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdSolution {
    pub param_names: ParamNames,
    pub selections: BTreeMap<DatasetId, NdSelection>,
    pub total_cost: f64,
    pub total_loss: f64,
}

/// Outcome of a successful pooling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PoolingResult {
    Standard(StandardSolution),
    HigherDimensional(NdSolution),
}

impl PoolingResult {
    pub fn mode(&self) -> SearchMode {
        match self {
            Self::Standard(_) => SearchMode::Standard,
            Self::HigherDimensional(_) => SearchMode::HigherDimensional,
        }
    }

    pub fn param_names(&self) -> ParamNames {
        match self {
            Self::Standard(_) => ParamNames::standard(),
            Self::HigherDimensional(s) => s.param_names.clone(),
        }
    }

    pub fn total_cost(&self) -> f64 {
        match self {
            Self::Standard(s) => s.total_cost as f64,
            Self::HigherDimensional(s) => s.total_cost,
        }
    }

    pub fn total_loss(&self) -> f64 {
        match self {
            Self::Standard(s) => s.total_loss,
            Self::HigherDimensional(s) => s.total_loss,
        }
    }

    /// One row per dataset, in dataset order, with values in column order.
    pub fn rows(&self) -> Vec<(DatasetId, Vec<ParamValue>)> {
        match self {
            Self::Standard(s) => s
                .selections
                .iter()
                .map(|(d, sel)| {
                    (
                        d.clone(),
                        vec![
                            ParamValue::Int(sel.mismatches),
                            ParamValue::Int(sel.cover_extension),
                        ],
                    )
                })
                .collect(),
            Self::HigherDimensional(s) => s
                .selections
                .iter()
                .map(|(d, sel)| {
                    (
                        d.clone(),
                        sel.params.iter().copied().map(ParamValue::Float).collect(),
                    )
                })
                .collect(),
        }
    }
}
