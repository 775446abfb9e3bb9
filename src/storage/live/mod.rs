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

//! Live Store - append-only in-memory row groups awaiting archiving
//!
//! Rows are appended to the newest live batch until it is full, then a new
//! batch with the next id is opened. Batch ids ascend with age so the oldest
//! batch has the smallest id. Column buffers are shared behind `Arc` and only
//! grow past the store's write position, which is what lets a snapshot hold
//! references to them instead of copies.

pub mod snapshot;

pub use snapshot::LiveSnapshot;

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::{ArchiveError, DataType, DataValue, RecordId, Result};
use crate::storage::column::ColumnVector;

/// Id of the first live batch of an empty store
pub const FIRST_LIVE_BATCH_ID: i32 = i32::MIN;

/// One append-only row group
#[derive(Debug)]
pub struct LiveBatch {
    id: i32,
    capacity: u32,
    columns: Vec<RwLock<ColumnVector>>,
}

impl LiveBatch {
    pub fn new(id: i32, value_types: &[DataType], capacity: u32) -> Self {
        Self {
            id,
            capacity,
            columns: value_types
                .iter()
                .map(|dt| RwLock::new(ColumnVector::with_capacity(*dt, capacity as usize)))
                .collect(),
        }
    }

    /// Build a batch from already-populated columns (recovery and tests)
    pub fn from_columns(id: i32, columns: Vec<ColumnVector>, capacity: u32) -> Result<Self> {
        let len = columns.first().map(|c| c.len()).unwrap_or(0);
        if columns.iter().any(|c| c.len() != len) {
            return Err(ArchiveError::SnapshotInconsistency(format!(
                "live batch {} has columns of different lengths",
                id
            )));
        }
        if len > capacity as usize {
            return Err(ArchiveError::SnapshotInconsistency(format!(
                "live batch {} holds {} rows but capacity is {}",
                id, len, capacity
            )));
        }
        Ok(Self {
            id,
            capacity,
            columns: columns.into_iter().map(RwLock::new).collect(),
        })
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Rows appended so far
    pub fn len(&self) -> u32 {
        self.columns
            .first()
            .map(|c| c.read().len() as u32)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self, column: usize) -> Option<DataType> {
        self.columns.get(column).map(|c| c.read().data_type())
    }

    pub fn value(&self, column: usize, offset: u32) -> Option<DataValue> {
        self.columns
            .get(column)
            .and_then(|c| c.read().value(offset as usize))
    }

    fn append_row(&self, row: &[Option<DataValue>]) -> Result<u32> {
        if row.len() != self.columns.len() {
            return Err(ArchiveError::Internal(format!(
                "row has {} values but live batch {} has {} columns",
                row.len(),
                self.id,
                self.columns.len()
            )));
        }
        // Type-check every value first so a bad row never lands half-written
        for (column, value) in self.columns.iter().zip(row) {
            if let Some(value) = value {
                let expected = column.read().data_type();
                if value.data_type() != expected {
                    return Err(ArchiveError::TypeMismatch {
                        expected,
                        actual: value.data_type(),
                    });
                }
            }
        }
        let offset = self.len();
        for (column, value) in self.columns.iter().zip(row) {
            column.write().push(*value)?;
        }
        Ok(offset)
    }
}

#[derive(Debug)]
struct LiveStoreState {
    batches: BTreeMap<i32, Arc<LiveBatch>>,
    /// Next slot to be written; everything before it is committed
    last_read_record: RecordId,
}

/// Per-shard live store
#[derive(Debug)]
pub struct LiveStore {
    value_types: Vec<DataType>,
    batch_capacity: u32,
    state: RwLock<LiveStoreState>,
}

impl LiveStore {
    pub fn new(value_types: Vec<DataType>, batch_capacity: u32) -> Self {
        Self {
            value_types,
            batch_capacity,
            state: RwLock::new(LiveStoreState {
                batches: BTreeMap::new(),
                last_read_record: RecordId::new(FIRST_LIVE_BATCH_ID, 0),
            }),
        }
    }

    /// Restore a live store from existing batches and its write position
    pub fn from_batches(
        value_types: Vec<DataType>,
        batch_capacity: u32,
        batches: Vec<LiveBatch>,
        last_read_record: RecordId,
    ) -> Result<Self> {
        let mut by_id = BTreeMap::new();
        for batch in batches {
            if batch.num_columns() != value_types.len() {
                return Err(ArchiveError::SnapshotInconsistency(format!(
                    "live batch {} has {} columns, schema has {}",
                    batch.id(),
                    batch.num_columns(),
                    value_types.len()
                )));
            }
            for (column, expected) in value_types.iter().enumerate() {
                let actual = batch.data_type(column);
                if actual != Some(*expected) {
                    return Err(ArchiveError::SnapshotInconsistency(format!(
                        "live batch {} column {} has type {:?}, schema says {}",
                        batch.id(),
                        column,
                        actual,
                        expected
                    )));
                }
            }
            by_id.insert(batch.id(), Arc::new(batch));
        }
        Ok(Self {
            value_types,
            batch_capacity,
            state: RwLock::new(LiveStoreState {
                batches: by_id,
                last_read_record,
            }),
        })
    }

    pub fn value_types(&self) -> &[DataType] {
        &self.value_types
    }

    pub fn last_read_record(&self) -> RecordId {
        self.state.read().last_read_record
    }

    pub fn batch_ids(&self) -> Vec<i32> {
        self.state.read().batches.keys().copied().collect()
    }

    pub fn get_batch(&self, batch_id: i32) -> Option<Arc<LiveBatch>> {
        self.state.read().batches.get(&batch_id).cloned()
    }

    /// Append one row at the write position, opening a new batch when the
    /// current one is full
    pub fn append_row(&self, row: &[Option<DataValue>]) -> Result<RecordId> {
        let mut state = self.state.write();
        let current = state.last_read_record;
        let needs_new_batch = match state.batches.get(&current.batch_id) {
            Some(batch) => current.index >= batch.capacity(),
            None => true,
        };

        if needs_new_batch {
            let id = match state.batches.keys().next_back() {
                Some(last) => last.checked_add(1).ok_or_else(|| {
                    ArchiveError::Internal("live batch id space exhausted".to_string())
                })?,
                None => FIRST_LIVE_BATCH_ID,
            };
            debug!("Opening live batch {}", id);
            state.batches.insert(
                id,
                Arc::new(LiveBatch::new(id, &self.value_types, self.batch_capacity)),
            );
            state.last_read_record = RecordId::new(id, 0);
        }

        let position = state.last_read_record;
        let batch = state
            .batches
            .get(&position.batch_id)
            .cloned()
            .ok_or_else(|| ArchiveError::Internal("current live batch vanished".to_string()))?;
        batch.append_row(row)?;
        state.last_read_record.index += 1;
        Ok(position)
    }

    /// Point-in-time view of every committed record. Column data is shared,
    /// not copied; the store lock is only held long enough to read the
    /// batch list and the write position.
    pub fn snapshot(&self) -> Result<LiveSnapshot> {
        let state = self.state.read();
        if state.batches.is_empty() {
            return Ok(LiveSnapshot::default());
        }

        let last = state.last_read_record;
        let last_batch = state.batches.get(&last.batch_id).ok_or_else(|| {
            ArchiveError::SnapshotInconsistency(format!(
                "last read record points at missing live batch {}",
                last.batch_id
            ))
        })?;
        if last.index > last_batch.len() {
            return Err(ArchiveError::SnapshotInconsistency(format!(
                "last read record {:?} is past the end of live batch {} ({} rows)",
                last,
                last.batch_id,
                last_batch.len()
            )));
        }

        let mut batches = Vec::new();
        let mut batch_ids = Vec::new();
        let mut valid_counts = Vec::new();
        for (id, batch) in state.batches.range(..=last.batch_id) {
            let valid = if *id == last.batch_id {
                last.index
            } else {
                batch.len()
            };
            batches.push(Arc::clone(batch));
            batch_ids.push(*id);
            valid_counts.push(valid);
        }

        Ok(LiveSnapshot::new(batches, batch_ids, valid_counts))
    }

    /// Drop fully archived batches. The batch at the write position is never
    /// removed. Returns the ids actually removed.
    pub fn purge_batches(&self, batch_ids: &[i32]) -> Vec<i32> {
        let mut state = self.state.write();
        let writing = state.last_read_record.batch_id;
        let mut purged = Vec::new();
        for id in batch_ids {
            if *id == writing {
                continue;
            }
            if state.batches.remove(id).is_some() {
                purged.push(*id);
            }
        }
        if !purged.is_empty() {
            info!("🧹 Purged {} archived live batches: {:?}", purged.len(), purged);
        }
        purged
    }
}
