/*
 * Copyright 2025 Vijaykumar Singh
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Archiving patches
//!
//! A patch is the set of live records one archiving run folds into one day's
//! archive batch. Patches are built by scanning a live snapshot's event time
//! column, keeping the records inside `(old_cutoff, new_cutoff]` and bucketing
//! them by day, then sorted by the table's archiving sort columns.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::{
    day_of, validate_sort_columns, ArchiveError, Day, RecordLocator, Result, SortKey, TIME_COLUMN,
};
use crate::jobs::{ArchiveStage, JobKey, ProgressReporter};
use crate::storage::live::LiveSnapshot;

/// Records of one day to be merged into that day's archive batch
#[derive(Debug, Clone)]
pub struct ArchivingPatch {
    snapshot: Arc<LiveSnapshot>,
    sort_columns: Vec<usize>,
    record_ids: Vec<RecordLocator>,
    /// Sort keys aligned with `record_ids`, present once sorted
    keys: Option<Vec<SortKey>>,
}

impl ArchivingPatch {
    pub fn new(snapshot: Arc<LiveSnapshot>, sort_columns: Vec<usize>) -> Self {
        Self {
            snapshot,
            sort_columns,
            record_ids: Vec::new(),
            keys: None,
        }
    }

    pub fn sort_columns(&self) -> &[usize] {
        &self.sort_columns
    }

    pub fn record_ids(&self) -> &[RecordLocator] {
        &self.record_ids
    }

    pub fn len(&self) -> usize {
        self.record_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_ids.is_empty()
    }

    pub fn snapshot(&self) -> &LiveSnapshot {
        &self.snapshot
    }

    pub fn is_sorted(&self) -> bool {
        self.keys.is_some()
    }

    /// Sort keys in record order, available after `sort`
    pub fn sorted_keys(&self) -> Option<&[SortKey]> {
        self.keys.as_deref()
    }

    fn push(&mut self, locator: RecordLocator) {
        self.record_ids.push(locator);
        self.keys = None;
    }

    pub fn sort_key(&self, locator: RecordLocator) -> Result<SortKey> {
        self.sort_columns
            .iter()
            .map(|column| self.snapshot.value(locator, *column))
            .collect()
    }

    /// Order records by the sort columns in priority order, nulls first in
    /// every column. The sort is stable, so records with equal keys keep
    /// their encounter order and re-sorting is a no-op.
    pub fn sort(&mut self) -> Result<()> {
        let mut decorated = self
            .record_ids
            .iter()
            .map(|locator| Ok((self.sort_key(*locator)?, *locator)))
            .collect::<Result<Vec<(SortKey, RecordLocator)>>>()?;
        decorated.sort_by(|a, b| a.0.cmp(&b.0));

        let (keys, record_ids): (Vec<SortKey>, Vec<RecordLocator>) = decorated.into_iter().unzip();
        self.record_ids = record_ids;
        self.keys = Some(keys);
        Ok(())
    }
}

/// Result of partitioning a snapshot for one archiving run
#[derive(Debug, Clone, Default)]
pub struct PatchSet {
    pub by_day: BTreeMap<Day, ArchivingPatch>,
    /// Records inside the cutoff window
    pub num_records: usize,
    /// Largest event time of every snapshot batch, in snapshot order
    pub max_event_times: Vec<Option<u32>>,
}

impl PatchSet {
    pub fn is_empty(&self) -> bool {
        self.by_day.is_empty()
    }

    pub fn days(&self) -> Vec<Day> {
        self.by_day.keys().copied().collect()
    }
}

impl LiveSnapshot {
    /// Partition the snapshot's records inside `(old_cutoff, new_cutoff]` by
    /// day. Progress is reported after every scanned batch under stage
    /// "create patch". Patches come back unsorted.
    pub fn create_archiving_patches(
        self: &Arc<Self>,
        new_cutoff: u32,
        old_cutoff: u32,
        sort_columns: &[usize],
        reporter: &dyn ProgressReporter,
        key: &JobKey,
    ) -> Result<PatchSet> {
        if sort_columns.is_empty() || !self.is_empty() {
            validate_sort_columns(sort_columns, self.num_columns())?;
        }

        let mut patches = PatchSet::default();
        if new_cutoff <= old_cutoff {
            debug!(
                "Cutoff {} is not newer than {} for {}, nothing to patch",
                new_cutoff, old_cutoff, key
            );
            return Ok(patches);
        }

        let total = self.num_batches();
        for (index, batch) in self.batches().iter().enumerate() {
            let valid = self.valid_count(index);
            let by_day = &mut patches.by_day;
            let mut in_window = 0usize;

            if batch.data_type(TIME_COLUMN).is_none() {
                return Err(ArchiveError::SortColumnReadFailure(format!(
                    "live batch {} has no event time column",
                    batch.id()
                )));
            }

            // The column lock is held for one row at a time
            let mut max_event_time = None;
            for offset in 0..valid {
                let event_time = batch
                    .value(TIME_COLUMN, offset)
                    .and_then(|v| v.as_u32())
                    .ok_or_else(|| {
                        ArchiveError::SortColumnReadFailure(format!(
                            "unreadable event time at offset {} of live batch {}",
                            offset,
                            batch.id()
                        ))
                    })?;
                max_event_time = max_event_time.max(Some(event_time));
                if event_time <= old_cutoff || event_time > new_cutoff {
                    continue;
                }
                by_day
                    .entry(day_of(event_time))
                    .or_insert_with(|| ArchivingPatch::new(Arc::clone(self), sort_columns.to_vec()))
                    .push(RecordLocator::new(index as i32, offset));
                in_window += 1;
            }

            patches.max_event_times.push(max_event_time);
            patches.num_records += in_window;

            let num_records = patches.num_records;
            let num_days = patches.by_day.len();
            reporter.report(key, &mut |detail| {
                detail.stage = ArchiveStage::CreatePatch;
                detail.job.current = index + 1;
                detail.job.total = total;
                detail.job.num_records = num_records;
                detail.job.num_affected_days = num_days;
            });
        }

        info!(
            "🧩 Created archiving patches for {}: {} records across {} days in ({}, {}]",
            key,
            patches.num_records,
            patches.by_day.len(),
            old_cutoff,
            new_cutoff
        );
        Ok(patches)
    }
}
