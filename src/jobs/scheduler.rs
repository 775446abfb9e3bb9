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

//! Periodic archiving scheduler
//!
//! Every tick the scheduler walks the hosted fact table shards and submits an
//! archiving job for each shard whose archiving interval has elapsed. The
//! cutoff of such a job trails the current time by the table's archiving
//! delay, so freshly ingested rows always stay live for a while.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::{ArchivingJob, Job, JobKey, JobManager, JobStatus};
use crate::core::{ArchiveError, Result, SchedulerConfig};
use crate::storage::MemStore;

#[derive(Debug)]
pub struct Scheduler {
    mem_store: Arc<MemStore>,
    job_manager: Arc<JobManager>,
    config: SchedulerConfig,
    shutdown: Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(mem_store: Arc<MemStore>, config: SchedulerConfig) -> Self {
        Self {
            mem_store,
            job_manager: Arc::new(JobManager::new()),
            config,
            shutdown: Arc::new(Notify::new()),
            task: Mutex::new(None),
        }
    }

    pub fn job_manager(&self) -> &Arc<JobManager> {
        &self.job_manager
    }

    pub fn mem_store(&self) -> &Arc<MemStore> {
        &self.mem_store
    }

    /// Archiving jobs due at `now`
    pub fn due_jobs(&self, now: DateTime<Utc>) -> Vec<ArchivingJob> {
        let now_secs = u32::try_from(now.timestamp().max(0)).unwrap_or(u32::MAX);
        let mut due = Vec::new();
        for shard in self.mem_store.shards() {
            let schema = shard.schema();
            if !schema.is_fact_table {
                continue;
            }
            let key = JobKey::archiving(shard.table(), shard.shard_id());
            if let Some(detail) = self.job_manager.get_job_detail(&key) {
                if detail.job.status == JobStatus::Running {
                    continue;
                }
                let interval_secs = i64::from(schema.config.archiving_interval_minutes) * 60;
                if let Some(last_start) = detail.job.last_start_time {
                    if (now - last_start).num_seconds() < interval_secs {
                        continue;
                    }
                }
            }

            let delay_secs = schema.config.archiving_delay_minutes.saturating_mul(60);
            let cutoff = now_secs.saturating_sub(delay_secs);
            if cutoff <= shard.archive_store().archiving_cutoff() {
                continue;
            }
            due.push(ArchivingJob::new(
                shard.table(),
                shard.shard_id(),
                cutoff,
                Arc::clone(&self.mem_store),
            ));
        }
        due
    }

    /// One scheduling pass. Returns the handles of the submitted jobs; shards
    /// whose job is still running are skipped.
    pub fn run_once(&self, now: DateTime<Utc>) -> Vec<JoinHandle<Result<()>>> {
        let mut handles = Vec::new();
        for job in self.due_jobs(now) {
            let key = job.key();
            let cutoff = job.cutoff();
            match self.job_manager.submit(Box::new(job)) {
                Ok(handle) => {
                    info!("🗓️ Scheduled archiving {} to cutoff {}", key, cutoff);
                    handles.push(handle);
                }
                Err(ArchiveError::AlreadyRunning { .. }) => {
                    debug!("Archiving {} still running, skipped", key);
                }
                Err(e) => warn!("⚠️ Failed to schedule archiving {}: {}", key, e),
            }
        }
        handles
    }

    /// Start the periodic loop on the current tokio runtime
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if !self.config.enabled {
            info!("🕒 Archiving scheduler disabled");
            return Ok(());
        }
        let mut task = self.task.lock();
        if task.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            ArchiveError::Internal(format!("no tokio runtime for the scheduler: {}", e))
        })?;
        let tick = Duration::from_secs(self.config.tick_interval_secs.max(1));
        info!("🚀 Starting archiving scheduler with interval {:?}", tick);

        let scheduler = Arc::clone(self);
        let shutdown = Arc::clone(&self.shutdown);
        *task = Some(runtime.spawn(async move {
            let mut ticker = interval(tick);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let submitted = scheduler.run_once(Utc::now());
                        if !submitted.is_empty() {
                            debug!("Scheduler tick submitted {} jobs", submitted.len());
                        }
                    }
                    _ = shutdown.notified() => break,
                }
            }
            info!("🛑 Archiving scheduler stopped");
        }));
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Stop the loop and wait for it to exit. Jobs already submitted keep
    /// running to completion.
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            self.shutdown.notify_one();
            if let Err(e) = task.await {
                warn!("Scheduler loop ended abnormally: {}", e);
            }
        }
    }
}
