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

//! Table shard: one live store, one archive store and their recovery state
//!
//! `TableShard::archive` is the archiving run. It snapshots the live store,
//! cuts per-day patches, merges every affected day in memory, persists the
//! merged batches, and only then publishes the new archive store version.
//! No column file is written until every day has been merged. Any failure
//! before the publication leaves the published version untouched and hands
//! back every buffer allocated for the run.

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::core::{ArchiveError, Day, Result, ShardId, TableSchema};
use crate::jobs::{ArchiveJobDetail, ArchiveStage, JobKey, ProgressReporter};
use crate::storage::archive::{
    estimated_sort_key_bytes, merge, retire, ArchiveStore, ArchiveStoreVersion, ArchivingPatch,
    VersionedColumnStore,
};
use crate::storage::disk::{write_column, DiskStore};
use crate::storage::live::{LiveSnapshot, LiveStore};
use crate::storage::memory::{HostMemoryManager, MemoryReservation};
use crate::storage::metadata::{BatchVersionMetadata, MetaStore};
use crate::storage::redolog::{BackfillPosition, RedoLogManager};

/// Collaborators shared by every shard of a store
#[derive(Debug, Clone)]
pub struct ShardDeps {
    pub disk: Arc<dyn DiskStore>,
    pub meta: Arc<dyn MetaStore>,
    pub memory: Arc<dyn HostMemoryManager>,
}

/// What an archiving run changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveOutcome {
    pub num_records: usize,
    pub affected_days: Vec<Day>,
    pub purged_live_batches: Vec<i32>,
    pub purged_log_files: Vec<i64>,
}

/// A merged day batch that is not published yet
struct StagedBatch {
    day: Day,
    batch: Arc<VersionedColumnStore>,
    base_version: Option<u32>,
}

#[derive(Debug)]
pub struct TableShard {
    schema: TableSchema,
    shard_id: ShardId,
    live_store: LiveStore,
    archive_store: ArchiveStore,
    redo_log: RedoLogManager,
    backfill: RwLock<BackfillPosition>,
    deps: ShardDeps,
    /// Held for the whole of an archiving run
    archiving: Mutex<()>,
}

impl TableShard {
    pub fn new(
        schema: TableSchema,
        shard_id: ShardId,
        live_batch_capacity: u32,
        deps: ShardDeps,
    ) -> Result<Self> {
        let live_store = LiveStore::new(schema.value_types(), live_batch_capacity);
        Self::with_stores(schema, shard_id, live_store, ArchiveStoreVersion::empty(), deps)
    }

    /// Assemble a shard around existing live data and archive state
    pub fn with_stores(
        schema: TableSchema,
        shard_id: ShardId,
        live_store: LiveStore,
        archive: ArchiveStoreVersion,
        deps: ShardDeps,
    ) -> Result<Self> {
        schema.validate()?;
        if live_store.value_types() != schema.value_types().as_slice() {
            return Err(ArchiveError::Config(format!(
                "live store of {}|{} does not match the table schema",
                schema.name, shard_id
            )));
        }
        let redo_log = RedoLogManager::new(schema.name.clone(), shard_id);
        Ok(Self {
            schema,
            shard_id,
            live_store,
            archive_store: ArchiveStore::new(archive),
            redo_log,
            backfill: RwLock::new(BackfillPosition::default()),
            deps,
            archiving: Mutex::new(()),
        })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.schema.name
    }

    pub fn shard_id(&self) -> ShardId {
        self.shard_id
    }

    pub fn live_store(&self) -> &LiveStore {
        &self.live_store
    }

    pub fn archive_store(&self) -> &ArchiveStore {
        &self.archive_store
    }

    pub fn redo_log(&self) -> &RedoLogManager {
        &self.redo_log
    }

    pub fn backfill_position(&self) -> BackfillPosition {
        *self.backfill.read()
    }

    pub fn set_backfill_position(&self, position: BackfillPosition) {
        *self.backfill.write() = position;
    }

    /// Fold every live record with event time in
    /// `(published cutoff, cutoff]` into the archive store.
    ///
    /// Never waits on readers: a `VersionGuard` the caller still holds keeps
    /// the superseded batches alive, and they are released when the last
    /// guard on that version drops.
    pub fn archive(
        &self,
        cutoff: u32,
        key: &JobKey,
        reporter: &dyn ProgressReporter,
    ) -> Result<ArchiveOutcome> {
        let _running = self.archiving.lock();
        let started = Instant::now();

        let current = self.archive_store.read();
        let old_cutoff = current.archiving_cutoff();
        report(reporter, key, |detail| {
            detail.stage = ArchiveStage::CreatePatch;
            detail.current_cutoff = old_cutoff;
            detail.last_cutoff = old_cutoff;
            detail.running_cutoff = cutoff;
            detail.job.current = 0;
            detail.job.total = 0;
            detail.job.num_records = 0;
            detail.job.num_affected_days = 0;
        });

        if cutoff <= old_cutoff {
            info!(
                "⏭️ Archiving {} skipped: cutoff {} is not past published cutoff {}",
                key, cutoff, old_cutoff
            );
            report(reporter, key, |detail| detail.stage = ArchiveStage::Complete);
            return Ok(ArchiveOutcome::default());
        }

        let snapshot = Arc::new(self.live_store.snapshot()?);
        info!(
            "📸 Archiving {}: snapshot of {} live batches, {} records, cutoff {} -> {}",
            key,
            snapshot.num_batches(),
            snapshot.num_records(),
            old_cutoff,
            cutoff
        );

        let patches = snapshot.create_archiving_patches(
            cutoff,
            old_cutoff,
            &self.schema.archiving_sort_columns,
            reporter,
            key,
        )?;
        let num_records = patches.num_records;
        let affected_days = patches.days();
        let max_event_times = patches.max_event_times.clone();

        let staged = self.merge_and_persist(patches.by_day, &current, key, reporter)?;

        let mut batches = current.batches().clone();
        for staged_batch in &staged {
            batches.insert(staged_batch.day, Arc::clone(&staged_batch.batch));
        }
        drop(current);
        let superseded = self
            .archive_store
            .publish(ArchiveStoreVersion::new(cutoff, batches));
        retire(&superseded, &affected_days);

        self.record_metadata(&staged, cutoff)?;
        self.delete_superseded_versions(&staged)?;
        let purged_log_files = self.redo_log.checkpoint(
            cutoff,
            self.backfill_position(),
            self.deps.disk.as_ref(),
        )?;

        report(reporter, key, |detail| detail.stage = ArchiveStage::Purge);
        let purged_live_batches = self.purge_live_batches(&snapshot, &max_event_times, cutoff);

        let num_days = affected_days.len();
        report(reporter, key, |detail| {
            detail.stage = ArchiveStage::Complete;
            detail.current_cutoff = cutoff;
            detail.running_cutoff = cutoff;
            detail.job.current = num_days;
            detail.job.total = num_days;
            detail.job.num_records = num_records;
            detail.job.num_affected_days = num_days;
        });
        info!(
            "✅ Archiving {} complete: {} records into {} days, cutoff {} in {:?}",
            key,
            num_records,
            num_days,
            cutoff,
            started.elapsed()
        );

        Ok(ArchiveOutcome {
            num_records,
            affected_days,
            purged_live_batches,
            purged_log_files,
        })
    }

    /// Merge every patch, then persist the merged batches. All days are
    /// merged, with their memory reserved, before the first column file is
    /// opened. On failure the versions written for this run are removed
    /// again and nothing is staged.
    fn merge_and_persist(
        &self,
        patches: BTreeMap<Day, ArchivingPatch>,
        current: &ArchiveStoreVersion,
        key: &JobKey,
        reporter: &dyn ProgressReporter,
    ) -> Result<Vec<StagedBatch>> {
        let total = patches.len();
        let mut staged: Vec<StagedBatch> = Vec::with_capacity(total);

        for (index, (day, patch)) in patches.into_iter().enumerate() {
            report(reporter, key, |detail| {
                detail.stage = ArchiveStage::Merge;
                detail.job.current = index;
                detail.job.total = total;
            });

            let base = current.batch(day);
            // Dropping `staged` hands back the memory of the days merged so far
            let merged = self
                .merge_day(day, patch, base.map(|b| b.as_ref()))
                .map_err(|e| {
                    warn!("❌ Merge of {} day {} failed: {}", key, day, e);
                    e
                })?;
            staged.push(StagedBatch {
                day,
                batch: Arc::new(merged),
                base_version: base.map(|b| b.version()),
            });
        }

        for (index, staged_batch) in staged.iter().enumerate() {
            report(reporter, key, |detail| {
                detail.stage = ArchiveStage::Persist;
                detail.job.current = index;
                detail.job.total = total;
            });
            if let Err(e) = self.persist_batch(&staged_batch.batch) {
                warn!(
                    "❌ Persisting {} day {} failed: {}",
                    key, staged_batch.day, e
                );
                self.discard_staged(&staged[..=index]);
                return Err(e);
            }
            debug!(
                "Staged {} day {} version {} ({} rows)",
                key,
                staged_batch.day,
                staged_batch.batch.version(),
                staged_batch.batch.size()
            );
            report(reporter, key, |detail| detail.job.current = index + 1);
        }
        Ok(staged)
    }

    /// Sort and merge one day. The patch's sort keys are accounted while
    /// they exist.
    fn merge_day(
        &self,
        day: Day,
        mut patch: ArchivingPatch,
        base: Option<&VersionedColumnStore>,
    ) -> Result<VersionedColumnStore> {
        let keys = MemoryReservation::reserve(
            &self.deps.memory,
            estimated_sort_key_bytes(patch.len(), patch.sort_columns().len()),
        )?;
        patch.sort()?;
        let merged = merge(base, &patch, &self.schema, day, &self.deps.memory);
        drop(patch);
        drop(keys);
        merged
    }

    /// One column file per column of the batch
    fn persist_batch(&self, batch: &VersionedColumnStore) -> Result<()> {
        for (index, column) in batch.columns().iter().enumerate() {
            let context = || {
                format!(
                    "write column {} of {}|{} day {} version {}",
                    index,
                    self.schema.name,
                    self.shard_id,
                    batch.day(),
                    batch.version()
                )
            };
            let mut writer = self
                .deps
                .disk
                .open_column_file_for_write(
                    &self.schema.name,
                    index,
                    self.shard_id,
                    batch.day(),
                    batch.version(),
                )
                .map_err(|e| ArchiveError::persistence(context(), e))?;
            write_column(&mut writer, column).map_err(|e| ArchiveError::persistence(context(), e))?;
        }
        Ok(())
    }

    /// Best effort removal of unpublished versions' files
    fn discard_staged(&self, staged: &[StagedBatch]) {
        for staged_batch in staged {
            let (day, version) = (staged_batch.day, staged_batch.batch.version());
            if let Err(e) = self.deps.disk.delete_batch_versions(
                &self.schema.name,
                self.shard_id,
                day,
                version,
                version,
            ) {
                warn!(
                    "Failed to clean up unpublished {}|{} day {} version {}: {:#}",
                    self.schema.name, self.shard_id, day, version, e
                );
            }
        }
    }

    fn record_metadata(&self, staged: &[StagedBatch], cutoff: u32) -> Result<()> {
        let metadata = BatchVersionMetadata {
            num_columns: self.schema.num_columns(),
            archiving_cutoff: cutoff,
        };
        for staged_batch in staged {
            self.deps
                .meta
                .add_archive_batch_version(
                    &self.schema.name,
                    self.shard_id,
                    staged_batch.day,
                    staged_batch.batch.version(),
                    staged_batch.batch.size(),
                    &metadata,
                )
                .map_err(|e| {
                    ArchiveError::persistence(
                        format!(
                            "record {}|{} day {} version {}",
                            self.schema.name,
                            self.shard_id,
                            staged_batch.day,
                            staged_batch.batch.version()
                        ),
                        e,
                    )
                })?;
        }
        self.deps
            .meta
            .update_archiving_cutoff(&self.schema.name, self.shard_id, cutoff)
            .map_err(|e| {
                ArchiveError::persistence(
                    format!("update cutoff of {}|{}", self.schema.name, self.shard_id),
                    e,
                )
            })
    }

    fn delete_superseded_versions(&self, staged: &[StagedBatch]) -> Result<()> {
        for staged_batch in staged {
            let Some(base_version) = staged_batch.base_version else {
                continue;
            };
            self.deps
                .disk
                .delete_batch_versions(
                    &self.schema.name,
                    self.shard_id,
                    staged_batch.day,
                    0,
                    base_version,
                )
                .map_err(|e| {
                    ArchiveError::persistence(
                        format!(
                            "delete superseded {}|{} day {} versions <= {}",
                            self.schema.name, self.shard_id, staged_batch.day, base_version
                        ),
                        e,
                    )
                })?;
        }
        Ok(())
    }

    /// Drop snapshot batches whose records are all archived now. The last
    /// snapshot batch may still be receiving rows and always stays.
    fn purge_live_batches(
        &self,
        snapshot: &LiveSnapshot,
        max_event_times: &[Option<u32>],
        cutoff: u32,
    ) -> Vec<i32> {
        let last = snapshot.num_batches().saturating_sub(1);
        let archived: Vec<i32> = snapshot
            .batch_ids()
            .iter()
            .zip(max_event_times)
            .take(last)
            .filter(|(_, max)| max.map_or(true, |t| t <= cutoff))
            .map(|(id, _)| *id)
            .collect();
        if archived.is_empty() {
            return archived;
        }
        self.live_store.purge_batches(&archived)
    }
}

fn report(reporter: &dyn ProgressReporter, key: &JobKey, mut update: impl FnMut(&mut ArchiveJobDetail)) {
    reporter.report(key, &mut update);
}
