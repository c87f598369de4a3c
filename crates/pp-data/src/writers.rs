use std::path::Path;

use csv::WriterBuilder;
use pp_types::{PoolResult, PoolingResult, TableError};

/// Write the selected parameter values, one row per dataset.
///
/// Columns are `dataset` followed by the parameter names in input order.
/// Standard results are written as integers, higher-dimensional results as
/// reals.
pub fn write_param_values<P: AsRef<Path>>(path: P, result: &PoolingResult) -> PoolResult<()> {
    let path = path.as_ref();
    let write_err = |e: csv::Error| TableError::WriteFailed {
        message: format!("Failed to write {}: {}", path.display(), e),
    };

    let mut wtr = WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(write_err)?;

    let names = result.param_names();
    let mut header = vec!["dataset".to_string()];
    header.extend(names.iter().map(str::to_string));
    wtr.write_record(&header).map_err(write_err)?;

    let rows = result.rows();
    for (dataset, values) in &rows {
        let mut record = Vec::with_capacity(values.len() + 1);
        record.push(dataset.clone());
        record.extend(values.iter().map(ToString::to_string));
        wtr.write_record(&record).map_err(write_err)?;
    }
    wtr.flush()?;

    tracing::info!("Wrote parameter values for {} datasets to {}", rows.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pp_types::{NdSelection, NdSolution, ParamNames, StandardSelection, StandardSolution};
    use std::collections::BTreeMap;
    use tempfile::NamedTempFile;

    #[test]
    fn test_standard_values_written_as_integers() {
        let mut selections = BTreeMap::new();
        selections.insert(
            "zika".to_string(),
            StandardSelection {
                mismatches: 2,
                cover_extension: 30,
                cost: 400,
                loss: 2.3,
            },
        );
        selections.insert(
            "dengue".to_string(),
            StandardSelection {
                mismatches: 0,
                cover_extension: 10,
                cost: 800,
                loss: 0.1,
            },
        );
        let result = PoolingResult::Standard(StandardSolution {
            selections,
            total_cost: 1200,
            total_loss: 2.4,
        });

        let file = NamedTempFile::new().unwrap();
        write_param_values(file.path(), &result).unwrap();

        let written = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(
            lines,
            vec![
                "dataset\tmismatches\tcover_extension",
                "dengue\t0\t10",
                "zika\t2\t30",
            ]
        );
    }

    #[test]
    fn test_higher_dimensional_values_written_as_reals() {
        let mut selections = BTreeMap::new();
        selections.insert(
            "zika".to_string(),
            NdSelection {
                params: vec![1.5, 20.25, 3.0],
                cost: 512.5,
                loss: 24.75,
            },
        );
        let result = PoolingResult::HigherDimensional(NdSolution {
            param_names: ParamNames::new(["mismatches", "cover_extension", "island"]),
            selections,
            total_cost: 512.5,
            total_loss: 24.75,
        });

        let file = NamedTempFile::new().unwrap();
        write_param_values(file.path(), &result).unwrap();

        let written = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[0], "dataset\tmismatches\tcover_extension\tisland");
        assert_eq!(lines[1], "zika\t1.5\t20.25\t3");
    }
}
