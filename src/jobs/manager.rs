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

//! Job admission and progress bookkeeping

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::{ArchiveJobDetail, ArchiveStage, Job, JobKey, JobStatus, ProgressReporter};
use crate::core::{ArchiveError, Result};

/// Admits at most one running job per key and keeps the latest detail of
/// every key it has seen
#[derive(Debug, Default)]
pub struct JobManager {
    details: RwLock<HashMap<JobKey, ArchiveJobDetail>>,
}

impl JobManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn admit(&self, key: &JobKey) -> Result<()> {
        let mut details = self.details.write();
        let detail = details.entry(key.clone()).or_default();
        if detail.job.status == JobStatus::Running {
            info!("🚫 Rejected {}: already running", key);
            return Err(ArchiveError::AlreadyRunning {
                key: key.to_string(),
            });
        }
        detail.job.status = JobStatus::Running;
        detail.job.last_start_time = Some(Utc::now());
        detail.job.last_error = None;
        info!("▶️ Admitted job {}", key);
        Ok(())
    }

    fn finish(&self, key: &JobKey, started: Instant, result: &Result<()>) {
        let mut details = self.details.write();
        let detail = details.entry(key.clone()).or_default();
        detail.job.last_duration = started.elapsed();
        match result {
            Ok(()) => {
                detail.job.status = JobStatus::Succeeded;
                info!("🏁 Job {} succeeded in {:?}", key, detail.job.last_duration);
            }
            Err(e) => {
                detail.job.status = JobStatus::Failed;
                detail.stage = ArchiveStage::Failed;
                detail.job.last_error = Some(e.to_string());
                error!("❌ Job {} failed: {}", key, e);
            }
        }
    }

    /// Run a job on the calling thread
    pub fn run(&self, job: &dyn Job) -> Result<()> {
        let key = job.key();
        self.admit(&key)?;
        let started = Instant::now();
        let result = job.run(self);
        self.finish(&key, started, &result);
        result
    }

    /// Run a job on the blocking pool of the current tokio runtime. Admission
    /// happens before this returns, so a rejected job never reaches the pool.
    pub fn submit(self: &Arc<Self>, job: Box<dyn Job>) -> Result<JoinHandle<Result<()>>> {
        let runtime = Handle::try_current()
            .map_err(|e| ArchiveError::Internal(format!("no tokio runtime to run jobs on: {}", e)))?;
        let key = job.key();
        self.admit(&key)?;

        let manager = Arc::clone(self);
        Ok(runtime.spawn_blocking(move || {
            let started = Instant::now();
            let result = job.run(manager.as_ref());
            manager.finish(&key, started, &result);
            result
        }))
    }

    pub fn is_running(&self, key: &JobKey) -> bool {
        self.details
            .read()
            .get(key)
            .map(|d| d.job.status == JobStatus::Running)
            .unwrap_or(false)
    }

    pub fn get_job_detail(&self, key: &JobKey) -> Option<ArchiveJobDetail> {
        self.details.read().get(key).cloned()
    }

    pub fn job_details(&self) -> HashMap<JobKey, ArchiveJobDetail> {
        self.details.read().clone()
    }

    /// Details keyed by `table|shard|kind`
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let details: HashMap<String, ArchiveJobDetail> = self
            .details
            .read()
            .iter()
            .map(|(key, detail)| (key.to_string(), detail.clone()))
            .collect();
        serde_json::to_value(details).map_err(|e| ArchiveError::Serialization(e.to_string()))
    }
}

impl ProgressReporter for JobManager {
    fn report(&self, key: &JobKey, update: &mut dyn FnMut(&mut ArchiveJobDetail)) {
        let mut details = self.details.write();
        update(details.entry(key.clone()).or_default());
    }
}
