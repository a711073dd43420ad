//! CSV ingestion into column-tagged cells

use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;

use super::records::CellRecord;
use crate::error::{EasyMlError, Result};

/// Headers and non-empty cells of a parsed CSV file
#[derive(Debug, Clone)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub cells: Vec<CellRecord>,
    pub n_rows: usize,
}

/// Cell values read as missing, in any column
pub const NA_TOKENS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

fn read_options() -> CsvReadOptions {
    let null_values = NullValues::AllColumns(NA_TOKENS.iter().map(|s| (*s).into()).collect());
    let parse_opts = CsvParseOptions::default().with_null_values(Some(null_values));

    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_parse_options(parse_opts)
}

/// Read a CSV file from disk
pub fn read_csv_path(path: &Path) -> Result<CsvTable> {
    let df = read_options()
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    table_from_frame(&df)
}

/// Read CSV content already held in memory
pub fn read_csv_bytes(bytes: &[u8]) -> Result<CsvTable> {
    let df = read_options()
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;
    table_from_frame(&df)
}

/// Every column is read as text so the stored cells keep the uploaded values.
/// Nulls, `NA_TOKENS` and blank cells are not stored.
fn table_from_frame(df: &DataFrame) -> Result<CsvTable> {
    if df.width() == 0 {
        return Err(EasyMlError::DataError("CSV file has no columns".to_string()));
    }

    let headers: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    let mut cells = Vec::new();
    for (column_num, column) in df.get_columns().iter().enumerate() {
        let series = column.as_materialized_series().cast(&DataType::String)?;
        let values = series.str()?;
        for (row_num, value) in values.into_iter().enumerate() {
            match value.map(str::trim) {
                Some(v) if !v.is_empty() => cells.push(CellRecord::new(row_num, column_num, v)),
                _ => {}
            }
        }
    }

    Ok(CsvTable {
        headers,
        cells,
        n_rows: df.height(),
    })
}
