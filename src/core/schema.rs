//! Table schema as seen by the archiving engine

use serde::{Deserialize, Serialize};

use super::config::TableConfig;
use super::error::{ArchiveError, Result};
use super::types::DataType;

/// Index of the event time column in fact tables
pub const TIME_COLUMN: usize = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: DataType,
    /// Deleted columns stay in the layout and are archived as all-null
    #[serde(default)]
    pub deleted: bool,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            deleted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    /// Column indices defining the archive sort order, highest priority first
    pub archiving_sort_columns: Vec<usize>,
    #[serde(default = "default_fact_table")]
    pub is_fact_table: bool,
    #[serde(default)]
    pub config: TableConfig,
}

fn default_fact_table() -> bool {
    true
}

impl TableSchema {
    pub fn value_types(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.data_type).collect()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Fact tables are partitioned by the uint32 event time in column 0
    pub fn validate(&self) -> Result<()> {
        if self.is_fact_table {
            match self.columns.get(TIME_COLUMN) {
                Some(column) if column.data_type == DataType::Uint32 => {}
                Some(column) => {
                    return Err(ArchiveError::Config(format!(
                        "table {}: time column must be uint32, found {}",
                        self.name, column.data_type
                    )))
                }
                None => {
                    return Err(ArchiveError::Config(format!(
                        "table {} has no columns",
                        self.name
                    )))
                }
            }
        }
        validate_sort_columns(&self.archiving_sort_columns, self.columns.len())
    }
}

/// Sort columns must be non-empty and address existing columns
pub fn validate_sort_columns(sort_columns: &[usize], num_columns: usize) -> Result<()> {
    if sort_columns.is_empty() {
        return Err(ArchiveError::SortColumnReadFailure(
            "no archiving sort columns configured".to_string(),
        ));
    }
    if let Some(bad) = sort_columns.iter().find(|&&c| c >= num_columns) {
        return Err(ArchiveError::SortColumnReadFailure(format!(
            "sort column {} out of range ({} columns)",
            bad, num_columns
        )));
    }
    Ok(())
}
