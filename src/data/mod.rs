//! Uploaded data: stored records, CSV ingestion and table reconstruction

pub mod frame;
pub mod loader;
pub mod records;

pub use frame::{build_dataset, build_inputs, decode_label, Dataset};
pub use loader::{read_csv_bytes, read_csv_path, CsvTable, NA_TOKENS};
pub use records::{CellRecord, ColumnMeta, ColumnRole, CsvFile};
