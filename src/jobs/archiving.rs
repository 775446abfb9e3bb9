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

use std::sync::Arc;
use tracing::debug;

use super::{Job, JobKey, ProgressReporter};
use crate::core::{Result, ShardId};
use crate::storage::MemStore;

/// Archives one table shard up to a fixed cutoff
#[derive(Debug, Clone)]
pub struct ArchivingJob {
    table: String,
    shard: ShardId,
    cutoff: u32,
    mem_store: Arc<MemStore>,
}

impl ArchivingJob {
    pub fn new(table: impl Into<String>, shard: ShardId, cutoff: u32, mem_store: Arc<MemStore>) -> Self {
        Self {
            table: table.into(),
            shard,
            cutoff,
            mem_store,
        }
    }

    pub fn cutoff(&self) -> u32 {
        self.cutoff
    }
}

impl Job for ArchivingJob {
    fn key(&self) -> JobKey {
        JobKey::archiving(self.table.as_str(), self.shard)
    }

    fn run(&self, reporter: &dyn ProgressReporter) -> Result<()> {
        let outcome = self
            .mem_store
            .archive(&self.table, self.shard, self.cutoff, reporter)?;
        debug!(
            "Archiving job {}|{} to {}: {:?}",
            self.table, self.shard, self.cutoff, outcome
        );
        Ok(())
    }
}
