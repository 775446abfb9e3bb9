//! Two-way merge of an archive batch with a sorted patch
//!
//! Both inputs are ordered by the archiving sort columns. The merge walks
//! them in lockstep, taking the archived row first when keys are equal, and
//! materialises every column of the result once the row order is known. The
//! result's memory and the merge's scratch space (base keys and row order)
//! are reserved up front so an over-budget merge fails before anything is
//! allocated.

use std::sync::Arc;
use tracing::{debug, info};

use super::batch::{estimated_bytes, estimated_sort_key_bytes, VersionedColumnStore};
use super::patch::ArchivingPatch;
use crate::core::{ArchiveError, Day, Result, SortKey, TableSchema};
use crate::storage::column::ColumnVector;
use crate::storage::memory::{HostMemoryManager, MemoryReservation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Base(usize),
    Patch(usize),
}

/// Merge `patch` into `base` (or into nothing for a day without archive
/// data), producing the next version of the day's batch.
pub fn merge(
    base: Option<&VersionedColumnStore>,
    patch: &ArchivingPatch,
    schema: &TableSchema,
    day: Day,
    memory: &Arc<dyn HostMemoryManager>,
) -> Result<VersionedColumnStore> {
    let patch_keys = patch.sorted_keys().ok_or_else(|| {
        ArchiveError::Internal(format!("patch of day {} merged before sorting", day))
    })?;
    if let Some(base) = base {
        check_layout(base, schema)?;
    }

    let sort_columns = patch.sort_columns();
    let value_types = schema.value_types();
    let base_rows = base.map(|b| b.size() as usize).unwrap_or(0);
    let rows = base_rows + patch.len();

    let reservation =
        MemoryReservation::reserve(memory, estimated_bytes(&value_types, rows, sort_columns))?;
    let scratch =
        MemoryReservation::reserve(memory, scratch_bytes(base_rows, rows, sort_columns.len()))?;

    let base_keys = match base {
        Some(base) => (0..base_rows)
            .map(|row| base.sort_key(row, sort_columns))
            .collect::<Result<Vec<SortKey>>>()?,
        None => Vec::new(),
    };
    let order = merge_order(&base_keys, patch_keys);

    let mut columns = Vec::with_capacity(value_types.len());
    for (index, column_schema) in schema.columns.iter().enumerate() {
        let mut vector = ColumnVector::with_capacity(column_schema.data_type, rows);
        if column_schema.deleted {
            for _ in 0..rows {
                vector.push(None)?;
            }
            columns.push(vector);
            continue;
        }

        let base_buffers = match base.and_then(|b| b.column(index)) {
            Some(column) => Some(column.read().ok_or_else(|| {
                ArchiveError::PersistenceFailure(format!(
                    "archive column {} of day {} was released before merge",
                    index, day
                ))
            })?),
            None => None,
        };

        for source in &order {
            let value = match *source {
                Source::Base(row) => base_buffers.as_ref().and_then(|b| b.vector.value(row)),
                Source::Patch(i) => patch.snapshot().value(patch.record_ids()[i], index)?,
            };
            vector.push(value)?;
        }
        columns.push(vector);
    }

    drop(order);
    drop(base_keys);
    drop(scratch);

    let version = base.map(|b| b.version() + 1).unwrap_or(1);
    debug!(
        "Merged day {}: {} archived + {} patch rows",
        day,
        base_rows,
        patch.len()
    );
    let merged =
        VersionedColumnStore::with_reservation(day, version, columns, sort_columns, reservation)?;
    info!(
        "🔀 Built archive batch day={} version={} rows={}",
        day,
        version,
        merged.size()
    );
    Ok(merged)
}

/// Base row keys plus the merged row order
fn scratch_bytes(base_rows: usize, rows: usize, num_sort_columns: usize) -> u64 {
    estimated_sort_key_bytes(base_rows, num_sort_columns)
        + (rows * std::mem::size_of::<Source>()) as u64
}

fn check_layout(base: &VersionedColumnStore, schema: &TableSchema) -> Result<()> {
    if base.num_columns() != schema.num_columns() {
        return Err(ArchiveError::PersistenceFailure(format!(
            "archive batch of day {} has {} columns, table {} has {}",
            base.day(),
            base.num_columns(),
            schema.name,
            schema.num_columns()
        )));
    }
    for (index, (column, column_schema)) in base.columns().iter().zip(&schema.columns).enumerate() {
        if column.data_type() != column_schema.data_type {
            return Err(ArchiveError::PersistenceFailure(format!(
                "archive column {} of day {} is {}, table {} declares {}",
                index,
                base.day(),
                column.data_type(),
                schema.name,
                column_schema.data_type
            )));
        }
    }
    Ok(())
}

/// Interleave two sorted key sequences, base first on ties
fn merge_order(base: &[SortKey], patch: &[SortKey]) -> Vec<Source> {
    let mut order = Vec::with_capacity(base.len() + patch.len());
    let (mut i, mut j) = (0, 0);
    while i < base.len() && j < patch.len() {
        if base[i] <= patch[j] {
            order.push(Source::Base(i));
            i += 1;
        } else {
            order.push(Source::Patch(j));
            j += 1;
        }
    }
    order.extend((i..base.len()).map(Source::Base));
    order.extend((j..patch.len()).map(Source::Patch));
    order
}
