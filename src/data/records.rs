//! Stored representation of uploaded files and their cells

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EasyMlError, Result};

/// How a column takes part in training
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnRole {
    #[default]
    Input,
    Target,
    Ignore,
}

impl FromStr for ColumnRole {
    type Err = EasyMlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "input" => Ok(ColumnRole::Input),
            "target" => Ok(ColumnRole::Target),
            "ignore" | "ignored" => Ok(ColumnRole::Ignore),
            other => Err(EasyMlError::InvalidInput(format!(
                "unknown column role '{}', expected input, target or ignore",
                other
            ))),
        }
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnRole::Input => "input",
            ColumnRole::Target => "target",
            ColumnRole::Ignore => "ignore",
        };
        f.write_str(name)
    }
}

/// Header and role of one column, numbered from 0 in file order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub column_num: usize,
    pub header: String,
    pub role: ColumnRole,
}

/// An uploaded CSV file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvFile {
    pub id: u64,
    pub owner: String,
    /// File name as uploaded, extension included
    pub raw_name: String,
    /// Name shown to the owner and used as the prefix of model names
    pub display_name: String,
    pub columns: Vec<ColumnMeta>,
    pub created_at: DateTime<Utc>,
}

impl CsvFile {
    /// Column whose header or number matches `key`
    pub fn find_column(&self, key: &str) -> Option<&ColumnMeta> {
        self.columns
            .iter()
            .find(|c| c.header == key)
            .or_else(|| {
                key.parse::<usize>()
                    .ok()
                    .and_then(|n| self.columns.iter().find(|c| c.column_num == n))
            })
    }

    pub fn columns_with_role(&self, role: ColumnRole) -> impl Iterator<Item = &ColumnMeta> {
        self.columns.iter().filter(move |c| c.role == role)
    }
}

/// One non-empty cell of an uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRecord {
    pub row_num: usize,
    pub column_num: usize,
    pub value: String,
}

impl CellRecord {
    pub fn new(row_num: usize, column_num: usize, value: impl Into<String>) -> Self {
        Self {
            row_num,
            column_num,
            value: value.into(),
        }
    }
}
