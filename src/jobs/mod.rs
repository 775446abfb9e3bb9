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

//! Background jobs: keys, progress details, admission and scheduling
//!
//! One logical job exists per (table, shard, kind). The job manager keeps the
//! latest detail of every key for observability and refuses to start a key
//! that is still running. The scheduler periodically creates archiving jobs
//! for shards whose data has aged past their archiving delay.

pub mod archiving;
pub mod manager;
pub mod scheduler;

pub use archiving::ArchivingJob;
pub use manager::JobManager;
pub use scheduler::Scheduler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::core::{Result, ShardId};

/// Kinds of background jobs sharing the job key space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    Archiving,
    Backfill,
    Snapshot,
    Purge,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobKind::Archiving => "archiving",
            JobKind::Backfill => "backfill",
            JobKind::Snapshot => "snapshot",
            JobKind::Purge => "purge",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub table: String,
    pub shard: ShardId,
    pub kind: JobKind,
}

impl JobKey {
    pub fn new(table: impl Into<String>, shard: ShardId, kind: JobKind) -> Self {
        Self {
            table: table.into(),
            shard,
            kind,
        }
    }

    pub fn archiving(table: impl Into<String>, shard: ShardId) -> Self {
        Self::new(table, shard, JobKind::Archiving)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.table, self.shard, self.kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Stage labels reported by an archiving run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArchiveStage {
    #[default]
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "create patch")]
    CreatePatch,
    #[serde(rename = "merge")]
    Merge,
    #[serde(rename = "persist")]
    Persist,
    #[serde(rename = "purge")]
    Purge,
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "failed")]
    Failed,
}

impl ArchiveStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveStage::Idle => "idle",
            ArchiveStage::CreatePatch => "create patch",
            ArchiveStage::Merge => "merge",
            ArchiveStage::Persist => "persist",
            ArchiveStage::Purge => "purge",
            ArchiveStage::Complete => "complete",
            ArchiveStage::Failed => "failed",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self,
            ArchiveStage::CreatePatch
                | ArchiveStage::Merge
                | ArchiveStage::Persist
                | ArchiveStage::Purge
        )
    }
}

impl fmt::Display for ArchiveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress and outcome of the latest run of a job key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDetail {
    pub status: JobStatus,
    /// Progress counter over batches (patch creation) or days (merge)
    pub current: usize,
    pub total: usize,
    pub num_records: usize,
    pub num_affected_days: usize,
    pub last_start_time: Option<DateTime<Utc>>,
    pub last_duration: Duration,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveJobDetail {
    #[serde(flatten)]
    pub job: JobDetail,
    pub stage: ArchiveStage,
    /// Cutoff published for the shard
    pub current_cutoff: u32,
    /// Cutoff the in-flight (or latest) run is archiving up to
    pub running_cutoff: u32,
    /// Cutoff that was published before the latest run
    pub last_cutoff: u32,
}

/// Progress sink threaded through an archiving run. The update closure is
/// applied to the key's detail while the reporter holds its write lock.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, key: &JobKey, update: &mut dyn FnMut(&mut ArchiveJobDetail));
}

impl<F> ProgressReporter for F
where
    F: Fn(&JobKey, &mut dyn FnMut(&mut ArchiveJobDetail)) + Send + Sync,
{
    fn report(&self, key: &JobKey, update: &mut dyn FnMut(&mut ArchiveJobDetail)) {
        self(key, update)
    }
}

/// Reporter that drops every update
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _key: &JobKey, _update: &mut dyn FnMut(&mut ArchiveJobDetail)) {}
}

/// A unit of background work admitted by the job manager
pub trait Job: Send + Sync {
    fn key(&self) -> JobKey;

    fn run(&self, reporter: &dyn ProgressReporter) -> Result<()>;
}
