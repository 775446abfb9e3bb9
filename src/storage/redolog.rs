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

//! Redo log bookkeeping consumed by archiving
//!
//! Each redo log file is tracked with the largest event time it holds. Once
//! the archiving cutoff passes that time the file's records are durable in
//! the archive and the file may go, unless it is still being written or the
//! backfill replay has not moved past it yet.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::core::{ArchiveError, Result, ShardId};
use crate::storage::disk::DiskStore;

/// Replay position of the backfill subsystem
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillPosition {
    /// Last redo log file backfill has fully processed up to
    pub last_redo_file: i64,
    pub last_batch_offset: u32,
}

#[derive(Debug, Default)]
struct RedoLogState {
    max_event_times: BTreeMap<i64, u32>,
    current_file: i64,
}

#[derive(Debug)]
pub struct RedoLogManager {
    table: String,
    shard: ShardId,
    state: Mutex<RedoLogState>,
}

impl RedoLogManager {
    pub fn new(table: impl Into<String>, shard: ShardId) -> Self {
        Self {
            table: table.into(),
            shard,
            state: Mutex::new(RedoLogState::default()),
        }
    }

    /// Record that `file_id` holds a record with `event_time`
    pub fn update_max_event_time(&self, file_id: i64, event_time: u32) {
        let mut state = self.state.lock();
        let max = state.max_event_times.entry(file_id).or_insert(event_time);
        *max = (*max).max(event_time);
    }

    /// Mark the file currently receiving writes
    pub fn set_current_file(&self, file_id: i64) {
        self.state.lock().current_file = file_id;
    }

    pub fn current_file(&self) -> i64 {
        self.state.lock().current_file
    }

    pub fn max_event_times(&self) -> BTreeMap<i64, u32> {
        self.state.lock().max_event_times.clone()
    }

    /// Drop every file whose records are all older than `cutoff`, that is
    /// not the current file and that backfill has already moved past.
    /// Returns the ids of the deleted files.
    pub fn checkpoint(
        &self,
        cutoff: u32,
        backfill: BackfillPosition,
        disk: &dyn DiskStore,
    ) -> Result<Vec<i64>> {
        let mut state = self.state.lock();
        let current_file = state.current_file;
        let purgeable: Vec<i64> = state
            .max_event_times
            .iter()
            .filter(|(file_id, max_event_time)| {
                **max_event_time < cutoff
                    && **file_id != current_file
                    && **file_id < backfill.last_redo_file
            })
            .map(|(file_id, _)| *file_id)
            .collect();

        let mut deleted = Vec::with_capacity(purgeable.len());
        for file_id in purgeable {
            if let Err(e) = disk.delete_log_file(&self.table, self.shard, file_id) {
                warn!(
                    "Failed to delete redo log {} of {}|{}: {:#}",
                    file_id, self.table, self.shard, e
                );
                return Err(ArchiveError::persistence(
                    format!("delete redo log {}", file_id),
                    e,
                ));
            }
            state.max_event_times.remove(&file_id);
            deleted.push(file_id);
        }

        if !deleted.is_empty() {
            info!(
                "🧾 Purged {} redo log files of {}|{} below cutoff {}",
                deleted.len(),
                self.table,
                self.shard,
                cutoff
            );
        }
        Ok(deleted)
    }
}
