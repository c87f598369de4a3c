use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use pp_types::{
    config_error, ConfigError, DatasetWeights, MeasurementTable, ParamNames, PoolResult,
    TableError,
};

/// Loader for the tab-separated tables consumed by the optimizer
#[derive(Debug, Clone)]
pub struct TableLoader {
    delimiter: u8,
}

impl Default for TableLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TableLoader {
    pub fn new() -> Self {
        Self { delimiter: b'\t' }
    }

    pub fn with_delimiter(delimiter: u8) -> Self {
        Self { delimiter }
    }

    fn reader<P: AsRef<Path>>(&self, path: P) -> PoolResult<csv::Reader<std::fs::File>> {
        let path = path.as_ref();
        ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .trim(Trim::All)
            .from_path(path)
            .map_err(|e| {
                TableError::LoadingFailed {
                    message: format!("Failed to open {}: {}", path.display(), e),
                }
                .into()
            })
    }

    /// Load the probe-count table.
    ///
    /// The first column names the dataset, the last holds the probe count and
    /// every column in between is a parameter, in order.
    pub fn load_probe_counts<P: AsRef<Path>>(&self, path: P) -> PoolResult<MeasurementTable> {
        let path = path.as_ref();
        tracing::info!("Loading probe counts from: {}", path.display());

        let mut rdr = self.reader(path)?;
        let headers = read_headers(&mut rdr)?;
        if headers.len() < 3 {
            return Err(TableError::MissingColumns {
                message: format!(
                    "probe-count table needs a dataset column, at least one parameter column \
                     and a count column; found {} columns",
                    headers.len()
                ),
            }
            .into());
        }

        let param_names = ParamNames::new(headers.iter().skip(1).take(headers.len() - 2));
        tracing::debug!("Parameter columns: {:?}", param_names);
        let mut table = MeasurementTable::new(param_names);

        for (line_num, result) in rdr.records().enumerate() {
            let line = line_num + 2;
            let record = result.map_err(|e| TableError::LoadingFailed {
                message: format!("Failed to read record at line {}: {}", line, e),
            })?;
            if record.len() != headers.len() {
                return Err(TableError::ParseError {
                    line,
                    message: format!(
                        "expected {} columns, found {}",
                        headers.len(),
                        record.len()
                    ),
                }
                .into());
            }

            let dataset = record.get(0).unwrap_or("");
            if dataset.is_empty() {
                return Err(TableError::ParseError {
                    line,
                    message: "empty dataset identifier".to_string(),
                }
                .into());
            }

            let params = record
                .iter()
                .enumerate()
                .skip(1)
                .take(record.len() - 2)
                .map(|(i, v)| parse_real(v, &headers[i], line))
                .collect::<PoolResult<Vec<f64>>>()?;
            let count_field = record.get(record.len() - 1).unwrap_or("");
            let count = count_field.parse::<u64>().map_err(|e| TableError::ParseError {
                line,
                message: format!("Could not parse probe count '{}': {}", count_field, e),
            })?;

            table.insert(dataset, params, count)?;
        }

        tracing::info!(
            "Loaded probe counts for {} datasets from {}",
            table.len(),
            path.display()
        );
        Ok(table)
    }

    /// Load per-dataset loss weights. Every dataset in `table` must have
    /// exactly one weight and every weighted dataset must be in `table`.
    pub fn load_dataset_weights<P: AsRef<Path>>(
        &self,
        path: P,
        table: &MeasurementTable,
    ) -> PoolResult<DatasetWeights> {
        let path = path.as_ref();
        tracing::info!("Loading dataset weights from: {}", path.display());

        let mut rdr = self.reader(path)?;
        let headers = read_headers(&mut rdr)?;
        if headers.len() < 2 {
            return Err(TableError::MissingColumns {
                message: format!(
                    "weights table needs dataset and weight columns; found {} columns",
                    headers.len()
                ),
            }
            .into());
        }

        let mut weights = DatasetWeights::new();
        for (line_num, result) in rdr.records().enumerate() {
            let line = line_num + 2;
            let record = result.map_err(|e| TableError::LoadingFailed {
                message: format!("Failed to read record at line {}: {}", line, e),
            })?;
            let dataset = record.get(0).unwrap_or("");
            if !table.contains_dataset(dataset) {
                return Err(TableError::UnknownDataset {
                    dataset: dataset.to_string(),
                }
                .into());
            }
            let weight = parse_real(record.get(1).unwrap_or(""), &headers[1], line)?;
            weights.insert(dataset, weight)?;
        }

        if let Some(missing) = table.dataset_ids().find(|d| weights.get(d).is_none()) {
            return Err(config_error!(ConfigError::MissingWeight {
                dataset: missing.clone(),
            }));
        }

        tracing::info!("Loaded {} dataset weights", weights.len());
        Ok(weights)
    }
}

/// Load a probe-count table with the default tab delimiter.
pub fn read_probe_counts<P: AsRef<Path>>(path: P) -> PoolResult<MeasurementTable> {
    TableLoader::new().load_probe_counts(path)
}

/// Load a dataset-weights table with the default tab delimiter.
pub fn read_dataset_weights<P: AsRef<Path>>(
    path: P,
    table: &MeasurementTable,
) -> PoolResult<DatasetWeights> {
    TableLoader::new().load_dataset_weights(path, table)
}

fn read_headers(rdr: &mut csv::Reader<std::fs::File>) -> PoolResult<StringRecord> {
    rdr.headers().cloned().map_err(|e| {
        TableError::LoadingFailed {
            message: format!("Failed to read headers: {}", e),
        }
        .into()
    })
}

fn parse_real(value: &str, field_name: &str, line: usize) -> PoolResult<f64> {
    if value.is_empty() {
        return Err(TableError::ParseError {
            line,
            message: format!("Empty value for field: {}", field_name),
        }
        .into());
    }
    value.parse::<f64>().map_err(|e| {
        TableError::ParseError {
            line,
            message: format!("Could not parse {} value '{}': {}", field_name, value, e),
        }
        .into()
    })
}
