//! Measurement and weight tables.
//!
//! A [`MeasurementTable`] maps each dataset to the probe counts observed at
//! specific parameter vectors. It is produced by an external design process;
//! this crate only stores it and checks that its shape is consistent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::TableError;

/// Dataset identifier as it appears in the first table column.
pub type DatasetId = String;

/// Name of the mismatch parameter used by standard search.
pub const MISMATCHES: &str = "mismatches";
/// Name of the cover-extension parameter used by standard search.
pub const COVER_EXTENSION: &str = "cover_extension";

/// Ordered parameter names. Order matches table columns and loss coefficients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamNames(Vec<String>);

impl ParamNames {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    /// The `(mismatches, cover_extension)` pair.
    pub fn standard() -> Self {
        Self::new([MISMATCHES, COVER_EXTENSION])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// True when the names are exactly `(mismatches, cover_extension)`.
    pub fn is_standard(&self) -> bool {
        self.0.len() == 2 && self.0[0] == MISMATCHES && self.0[1] == COVER_EXTENSION
    }
}

/// One observed probe count at a parameter vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub params: Vec<f64>,
    pub cost: u64,
}

/// Sparse table of observed costs, keyed by dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementTable {
    param_names: ParamNames,
    datasets: BTreeMap<DatasetId, Vec<Measurement>>,
}

impl MeasurementTable {
    pub fn new(param_names: ParamNames) -> Self {
        Self {
            param_names,
            datasets: BTreeMap::new(),
        }
    }

    pub fn param_names(&self) -> &ParamNames {
        &self.param_names
    }

    /// Register a dataset without measurements. Searching a table that
    /// contains such a dataset fails, since it cannot be interpolated.
    pub fn add_dataset(&mut self, dataset: impl Into<DatasetId>) {
        self.datasets.entry(dataset.into()).or_default();
    }

    /// Record one observation.
    pub fn insert(
        &mut self,
        dataset: impl Into<DatasetId>,
        params: Vec<f64>,
        cost: u64,
    ) -> Result<(), TableError> {
        let dataset = dataset.into();

        if params.len() != self.param_names.len() {
            return Err(TableError::DimensionMismatch {
                dataset,
                expected: self.param_names.len(),
                got: params.len(),
            });
        }
        if params.iter().any(|p| !p.is_finite()) {
            return Err(TableError::NonFiniteParameter { dataset, params });
        }

        let entries = self.datasets.entry(dataset.clone()).or_default();
        if entries.iter().any(|m| m.params == params) {
            return Err(TableError::DuplicateMeasurement { dataset, params });
        }
        entries.push(Measurement { params, cost });
        Ok(())
    }

    pub fn measurements(&self, dataset: &str) -> Option<&[Measurement]> {
        self.datasets.get(dataset).map(Vec::as_slice)
    }

    pub fn contains_dataset(&self, dataset: &str) -> bool {
        self.datasets.contains_key(dataset)
    }

    /// Datasets in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (&DatasetId, &[Measurement])> {
        self.datasets.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn dataset_ids(&self) -> impl Iterator<Item = &DatasetId> {
        self.datasets.keys()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

/// Per-dataset multipliers on loss. When supplied, must cover every dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetWeights(BTreeMap<DatasetId, f64>);

impl DatasetWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, dataset: impl Into<DatasetId>, weight: f64) -> Result<(), TableError> {
        let dataset = dataset.into();
        if !weight.is_finite() || weight < 0.0 {
            return Err(TableError::InvalidWeight { dataset, weight });
        }
        if self.0.contains_key(&dataset) {
            return Err(TableError::DuplicateWeight { dataset });
        }
        self.0.insert(dataset, weight);
        Ok(())
    }

    pub fn get(&self, dataset: &str) -> Option<f64> {
        self.0.get(dataset).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DatasetId, f64)> {
        self.0.iter().map(|(k, v)| (k, *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
