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

//! # archstore - archiving engine of a sharded columnar store
//!
//! Rows land in a per-shard, append-only **live store**. A background
//! archiving job periodically folds every live row older than a cutoff into
//! the shard's **archive store**: immutable, sorted, per-day column batches
//! that are versioned and persisted through a disk store.
//!
//! ## Archiving run
//!
//! - take a point-in-time snapshot of the live store without blocking writers
//! - cut the snapshot into per-day patches inside `(old cutoff, new cutoff]`
//! - sort every patch by the table's archiving sort columns, nulls first
//! - merge each patch with the day's current batch into a new version and
//!   write it to disk
//! - publish all new day batches at once as a new archive store version
//! - release the superseded batches once their last reader is gone
//! - record the new cutoff, then drop redo logs and live batches it covers
//!
//! Progress of every run is reported into the job manager, which also makes
//! sure only one archiving job per table shard runs at a time.

pub mod core;
pub mod jobs;
pub mod storage;

pub use crate::core::*;
pub use jobs::{
    ArchiveJobDetail, ArchiveStage, ArchivingJob, Job, JobDetail, JobKey, JobKind, JobManager,
    JobStatus, NoopReporter, ProgressReporter, Scheduler,
};
pub use storage::{
    ArchiveOutcome, ArchiveStore, ArchiveStoreVersion, LiveSnapshot, LiveStore, MemStore,
    ShardDeps, TableShard, VersionedColumnStore,
};
