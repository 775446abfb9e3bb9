//! Point-in-time view of a live store

use std::sync::Arc;

use super::LiveBatch;
use crate::core::{ArchiveError, DataValue, RecordLocator, Result};

/// Committed records of a live store at the time of the snapshot.
///
/// Batches are ordered oldest first. Only the first `valid_count(i)` rows of
/// each batch are addressable, so rows appended after the snapshot was taken
/// (including the tail of the newest batch) are never exposed.
#[derive(Debug, Clone, Default)]
pub struct LiveSnapshot {
    batches: Vec<Arc<LiveBatch>>,
    batch_ids: Vec<i32>,
    valid_counts: Vec<u32>,
}

impl LiveSnapshot {
    pub(crate) fn new(
        batches: Vec<Arc<LiveBatch>>,
        batch_ids: Vec<i32>,
        valid_counts: Vec<u32>,
    ) -> Self {
        Self {
            batches,
            batch_ids,
            valid_counts,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn num_batches(&self) -> usize {
        self.batches.len()
    }

    pub fn batch_ids(&self) -> &[i32] {
        &self.batch_ids
    }

    pub fn batches(&self) -> &[Arc<LiveBatch>] {
        &self.batches
    }

    pub fn num_columns(&self) -> usize {
        self.batches.first().map(|b| b.num_columns()).unwrap_or(0)
    }

    /// Rows of batch `index` visible through this snapshot
    pub fn valid_count(&self, index: usize) -> u32 {
        self.valid_counts.get(index).copied().unwrap_or(0)
    }

    /// Valid rows of the newest (possibly partially filled) batch
    pub fn last_batch_valid_count(&self) -> u32 {
        self.valid_counts.last().copied().unwrap_or(0)
    }

    pub fn num_records(&self) -> u64 {
        self.valid_counts.iter().map(|c| *c as u64).sum()
    }

    /// Every addressable record, batch by batch
    pub fn locators(&self) -> impl Iterator<Item = RecordLocator> + '_ {
        self.valid_counts
            .iter()
            .enumerate()
            .flat_map(|(batch, count)| {
                (0..*count).map(move |offset| RecordLocator::new(batch as i32, offset))
            })
    }

    pub fn value(&self, locator: RecordLocator, column: usize) -> Result<Option<DataValue>> {
        let batch = self.checked_batch(locator)?;
        if column >= batch.num_columns() {
            return Err(ArchiveError::SortColumnReadFailure(format!(
                "column {} out of range for live batch {}",
                column,
                batch.id()
            )));
        }
        Ok(batch.value(column, locator.offset))
    }

    fn checked_batch(&self, locator: RecordLocator) -> Result<&Arc<LiveBatch>> {
        let index = usize::try_from(locator.batch).ok();
        match index.and_then(|i| self.batches.get(i).map(|b| (i, b))) {
            Some((i, batch)) if locator.offset < self.valid_counts[i] => Ok(batch),
            _ => Err(ArchiveError::SnapshotInconsistency(format!(
                "record locator {:?} is outside the snapshot",
                locator
            ))),
        }
    }
}
