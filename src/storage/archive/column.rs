//! Immutable archive column with explicit buffer release

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use std::ops::Range;

use crate::core::{ArchiveError, DataType, DataValue, Result};
use crate::storage::column::{ColumnMode, ColumnVector};

/// Buffers of an archive column while it is alive
#[derive(Debug)]
pub struct ArchiveBuffers {
    /// Values and presence
    pub vector: ColumnVector,
    /// Cumulative end offsets of runs of equal values, kept for sort columns
    pub counts: Option<Vec<u32>>,
}

#[derive(Debug)]
pub struct ArchiveColumn {
    data_type: DataType,
    length: usize,
    mode: ColumnMode,
    buffers: RwLock<Option<ArchiveBuffers>>,
}

impl ArchiveColumn {
    pub fn new(vector: ColumnVector, with_counts: bool) -> Self {
        let counts = with_counts.then(|| run_ends(&vector));
        Self {
            data_type: vector.data_type(),
            length: vector.len(),
            mode: vector.mode(),
            buffers: RwLock::new(Some(ArchiveBuffers { vector, counts })),
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn mode(&self) -> ColumnMode {
        self.mode
    }

    /// Read access to the buffers, `None` once released
    pub fn read(&self) -> Option<MappedRwLockReadGuard<'_, ArchiveBuffers>> {
        RwLockReadGuard::try_map(self.buffers.read(), |b| b.as_ref()).ok()
    }

    pub fn value(&self, row: usize) -> Result<Option<DataValue>> {
        let buffers = self.read().ok_or_else(|| {
            ArchiveError::SortColumnReadFailure("archive column has been released".to_string())
        })?;
        Ok(buffers.vector.value(row))
    }

    pub fn has_values(&self) -> bool {
        self.buffers.read().is_some()
    }

    pub fn has_counts(&self) -> bool {
        self.buffers
            .read()
            .as_ref()
            .map(|b| b.counts.is_some())
            .unwrap_or(false)
    }

    pub fn counts(&self) -> Option<Vec<u32>> {
        self.read().and_then(|b| b.counts.clone())
    }

    /// Rows sharing the value of `row`, looked up through the count buffer
    pub fn equal_run(&self, row: u32) -> Option<Range<u32>> {
        let buffers = self.read()?;
        let counts = buffers.counts.as_ref()?;
        let run = counts.partition_point(|end| *end <= row);
        let end = *counts.get(run)?;
        let start = if run == 0 { 0 } else { counts[run - 1] };
        Some(start..end)
    }

    pub fn is_released(&self) -> bool {
        self.buffers.read().is_none()
    }

    /// Drop the buffers. Returns false if they were already gone.
    pub(crate) fn release(&self) -> bool {
        self.buffers.write().take().is_some()
    }
}

/// Bytes the buffers of a column of `rows` values occupy, counts included
pub fn estimated_column_bytes(data_type: DataType, rows: usize, with_counts: bool) -> u64 {
    let counts = if with_counts { rows * 4 } else { 0 };
    (rows * (data_type.value_width() + 1) + counts) as u64
}

fn run_ends(vector: &ColumnVector) -> Vec<u32> {
    let mut ends = Vec::new();
    for row in 1..vector.len() {
        if vector.value(row) != vector.value(row - 1) {
            ends.push(row as u32);
        }
    }
    if !vector.is_empty() {
        ends.push(vector.len() as u32);
    }
    ends
}
