//! Rebuilding rectangular tables from stored cells

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::records::{CellRecord, ColumnMeta, ColumnRole, CsvFile};
use crate::error::{EasyMlError, Result};

/// Input and target tables of one file, ready for training
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    /// One row per complete sample, columns in ascending column order
    pub inputs: Array2<f64>,
    pub target: Array1<f64>,
    pub input_columns: Vec<String>,
    pub target_column: String,
    /// Original labels when the target was text, indexed by encoded value
    pub target_labels: Option<Vec<String>>,
}

impl Dataset {
    pub fn n_samples(&self) -> usize {
        self.inputs.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.inputs.ncols()
    }
}

/// Cell values grouped by row, then by column
fn rows_of<'a>(cells: &'a [CellRecord], columns: &[&ColumnMeta]) -> BTreeMap<usize, BTreeMap<usize, &'a str>> {
    let wanted: BTreeSet<usize> = columns.iter().map(|c| c.column_num).collect();
    let mut rows: BTreeMap<usize, BTreeMap<usize, &str>> = BTreeMap::new();
    for cell in cells.iter().filter(|c| wanted.contains(&c.column_num)) {
        rows.entry(cell.row_num)
            .or_default()
            .insert(cell.column_num, cell.value.as_str());
    }
    rows
}

fn parse_cell(value: &str, column: &ColumnMeta, row: usize) -> Result<f64> {
    match value.trim().parse::<f64>() {
        Ok(number) if number.is_finite() => Ok(number),
        _ => Err(EasyMlError::DataError(format!(
            "column '{}' row {}: '{}' is not a finite number",
            column.header, row, value
        ))),
    }
}

/// Build the training table of `file` from its cells.
///
/// Ignored columns are dropped and rows missing any remaining cell are skipped.
/// A target with any non-numeric value is label-encoded over its sorted
/// distinct values.
pub fn build_dataset(file: &CsvFile, cells: &[CellRecord]) -> Result<Dataset> {
    let no_data = |reason: &str| EasyMlError::NoEligibleData {
        file_id: file.id,
        reason: reason.to_string(),
    };

    let mut eligible: Vec<&ColumnMeta> = file
        .columns
        .iter()
        .filter(|c| c.role != ColumnRole::Ignore)
        .collect();
    eligible.sort_by_key(|c| c.column_num);

    let rows = rows_of(cells, &eligible);
    if rows.is_empty() {
        return Err(no_data("no cells outside ignored columns"));
    }

    let inputs: Vec<&ColumnMeta> = eligible
        .iter()
        .copied()
        .filter(|c| c.role == ColumnRole::Input)
        .collect();
    let targets: Vec<&ColumnMeta> = eligible
        .iter()
        .copied()
        .filter(|c| c.role == ColumnRole::Target)
        .collect();

    let target = match targets.as_slice() {
        [] => return Err(no_data("no target column")),
        [target] => *target,
        many => {
            return Err(EasyMlError::InvalidInput(format!(
                "expected one target column, found {}",
                many.len()
            )))
        }
    };
    if inputs.is_empty() {
        return Err(no_data("no input column"));
    }

    let complete: Vec<(usize, &BTreeMap<usize, &str>)> = rows
        .iter()
        .filter(|(_, row)| row.len() == eligible.len())
        .map(|(&n, row)| (n, row))
        .collect();
    if complete.is_empty() {
        return Err(no_data("no row has a value in every input and target column"));
    }

    let mut x: Array2<f64> = Array2::zeros((complete.len(), inputs.len()));
    for (i, (row_num, row)) in complete.iter().enumerate() {
        for (j, column) in inputs.iter().enumerate() {
            x[[i, j]] = parse_cell(row[&column.column_num], column, *row_num)?;
        }
    }

    let raw_target: Vec<&str> = complete.iter().map(|(_, row)| row[&target.column_num]).collect();
    let (y, target_labels) = encode_target(target, &raw_target)?;

    Ok(Dataset {
        inputs: x,
        target: y,
        input_columns: inputs.iter().map(|c| c.header.clone()).collect(),
        target_column: target.header.clone(),
        target_labels,
    })
}

/// Numeric values pass through; otherwise each value becomes the index of its
/// label in sorted order. A numeric target must be finite.
fn encode_target(column: &ColumnMeta, values: &[&str]) -> Result<(Array1<f64>, Option<Vec<String>>)> {
    let numeric: Option<Vec<f64>> = values.iter().map(|v| v.trim().parse::<f64>().ok()).collect();
    if let Some(numbers) = numeric {
        if let Some(pos) = numbers.iter().position(|n| !n.is_finite()) {
            return Err(EasyMlError::DataError(format!(
                "column '{}': target '{}' is not a finite number",
                column.header, values[pos]
            )));
        }
        return Ok((Array1::from_vec(numbers), None));
    }

    let labels: Vec<String> = values
        .iter()
        .map(|v| v.trim().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let encoded = values
        .iter()
        .map(|v| {
            labels
                .binary_search_by(|l| l.as_str().cmp(v.trim()))
                .unwrap_or(0) as f64
        })
        .collect();
    Ok((encoded, Some(labels)))
}

/// Map a prediction back to its text label when the target was encoded
pub fn decode_label(value: f64, labels: Option<&[String]>) -> String {
    match labels {
        Some(labels) if value >= 0.0 && value.fract() == 0.0 => labels
            .get(value as usize)
            .cloned()
            .unwrap_or_else(|| value.to_string()),
        _ => value.to_string(),
    }
}

/// Input table for prediction: the named columns of `file`, in the given order.
///
/// Returns the row numbers kept alongside the table.
pub fn build_inputs(
    file: &CsvFile,
    cells: &[CellRecord],
    headers: &[String],
) -> Result<(Vec<usize>, Array2<f64>)> {
    let columns = headers
        .iter()
        .map(|header| {
            file.columns.iter().find(|c| &c.header == header).ok_or_else(|| {
                EasyMlError::InvalidInput(format!(
                    "file '{}' has no column '{}'",
                    file.display_name, header
                ))
            })
        })
        .collect::<Result<Vec<&ColumnMeta>>>()?;

    let rows = rows_of(cells, &columns);
    let complete: Vec<(&usize, &BTreeMap<usize, &str>)> = rows
        .iter()
        .filter(|(_, row)| row.len() == columns.len())
        .collect();
    if complete.is_empty() {
        return Err(EasyMlError::NoEligibleData {
            file_id: file.id,
            reason: "no complete row for the model's input columns".to_string(),
        });
    }

    let mut x: Array2<f64> = Array2::zeros((complete.len(), columns.len()));
    for (i, (row_num, row)) in complete.iter().enumerate() {
        for (j, column) in columns.iter().enumerate() {
            x[[i, j]] = parse_cell(row[&column.column_num], column, **row_num)?;
        }
    }
    Ok((complete.iter().map(|(n, _)| **n).collect(), x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ndarray::array;

    fn file(roles: &[ColumnRole]) -> CsvFile {
        CsvFile {
            id: 3,
            owner: "alice".to_string(),
            raw_name: "data.csv".to_string(),
            display_name: "data".to_string(),
            columns: roles
                .iter()
                .enumerate()
                .map(|(i, &role)| ColumnMeta {
                    column_num: i,
                    header: format!("c{}", i),
                    role,
                })
                .collect(),
            created_at: Utc::now(),
        }
    }

    fn grid(rows: &[&[&str]]) -> Vec<CellRecord> {
        rows.iter()
            .enumerate()
            .flat_map(|(r, row)| {
                row.iter()
                    .enumerate()
                    .filter(|(_, v)| !v.is_empty())
                    .map(move |(c, v)| CellRecord::new(r, c, *v))
            })
            .collect()
    }

    #[test]
    fn test_columns_follow_column_order_and_skip_ignored() {
        let file = file(&[ColumnRole::Input, ColumnRole::Ignore, ColumnRole::Target, ColumnRole::Input]);
        let cells = grid(&[&["1", "x", "10", "5"], &["2", "y", "20", "6"]]);

        let data = build_dataset(&file, &cells).unwrap();
        assert_eq!(data.inputs, array![[1.0, 5.0], [2.0, 6.0]]);
        assert_eq!(data.target, array![10.0, 20.0]);
        assert_eq!(data.input_columns, vec!["c0", "c3"]);
        assert_eq!(data.target_column, "c2");
        assert!(data.target_labels.is_none());
    }

    #[test]
    fn test_incomplete_rows_are_dropped() {
        let file = file(&[ColumnRole::Input, ColumnRole::Target]);
        let cells = grid(&[&["1", "0"], &["", "1"], &["3", "1"]]);

        let data = build_dataset(&file, &cells).unwrap();
        assert_eq!(data.n_samples(), 2);
        assert_eq!(data.inputs.column(0).to_vec(), vec![1.0, 3.0]);
    }

    #[test]
    fn test_text_target_is_label_encoded() {
        let file = file(&[ColumnRole::Input, ColumnRole::Target]);
        let cells = grid(&[&["1", "versicolor"], &["2", "setosa"], &["3", "versicolor"]]);

        let data = build_dataset(&file, &cells).unwrap();
        assert_eq!(data.target, array![1.0, 0.0, 1.0]);
        let labels = data.target_labels.unwrap();
        assert_eq!(labels, vec!["setosa", "versicolor"]);
        assert_eq!(decode_label(1.0, Some(labels.as_slice())), "versicolor");
        assert_eq!(decode_label(2.5, Some(labels.as_slice())), "2.5");
    }

    #[test]
    fn test_only_ignored_columns_is_not_eligible() {
        let file = file(&[ColumnRole::Ignore, ColumnRole::Ignore]);
        let cells = grid(&[&["1", "2"]]);
        assert!(matches!(
            build_dataset(&file, &cells),
            Err(EasyMlError::NoEligibleData { file_id: 3, .. })
        ));
    }

    #[test]
    fn test_missing_roles() {
        let cells = grid(&[&["1", "2"]]);
        assert!(matches!(
            build_dataset(&file(&[ColumnRole::Input, ColumnRole::Input]), &cells),
            Err(EasyMlError::NoEligibleData { .. })
        ));
        assert!(matches!(
            build_dataset(&file(&[ColumnRole::Target, ColumnRole::Target]), &cells),
            Err(EasyMlError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_non_numeric_input_is_a_data_error() {
        let file = file(&[ColumnRole::Input, ColumnRole::Target]);
        let cells = grid(&[&["abc", "1"]]);
        assert!(matches!(build_dataset(&file, &cells), Err(EasyMlError::DataError(_))));
    }

    #[test]
    fn test_non_finite_cells_are_data_errors() {
        let training = file(&[ColumnRole::Input, ColumnRole::Target]);
        for cells in [
            grid(&[&["inf", "1"], &["2", "0"]]),
            grid(&[&["1", "1"], &["2", "NaN"]]),
            grid(&[&["1", "-inf"], &["2", "0"]]),
        ] {
            assert!(matches!(build_dataset(&training, &cells), Err(EasyMlError::DataError(_))));
        }

        let inputs_only = file(&[ColumnRole::Input]);
        assert!(matches!(
            build_inputs(&inputs_only, &grid(&[&["nan"]]), &["c0".to_string()]),
            Err(EasyMlError::DataError(_))
        ));
    }

    #[test]
    fn test_build_inputs_by_header() {
        let file = file(&[ColumnRole::Input, ColumnRole::Input, ColumnRole::Target]);
        let cells = grid(&[&["1", "2", ""], &["3", "", ""], &["5", "6", "x"]]);

        let (rows, x) = build_inputs(&file, &cells, &["c1".to_string(), "c0".to_string()]).unwrap();
        assert_eq!(rows, vec![0, 2]);
        assert_eq!(x, array![[2.0, 1.0], [6.0, 5.0]]);
        assert!(build_inputs(&file, &cells, &["nope".to_string()]).is_err());
    }
}
