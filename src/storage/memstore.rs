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

//! Registry of the table shards hosted by this process

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::core::{ArchiveError, Result, ShardId, StoreConfig, TableSchema};
use crate::jobs::{JobKey, ProgressReporter};
use crate::storage::disk::LocalDiskStore;
use crate::storage::memory::BudgetedHostMemory;
use crate::storage::metadata::LocalMetaStore;
use crate::storage::shard::{ArchiveOutcome, ShardDeps, TableShard};

#[derive(Debug)]
pub struct MemStore {
    shards: RwLock<HashMap<(String, ShardId), Arc<TableShard>>>,
    deps: ShardDeps,
    live_batch_capacity: u32,
}

impl MemStore {
    pub fn new(deps: ShardDeps, live_batch_capacity: u32) -> Self {
        Self {
            shards: RwLock::new(HashMap::new()),
            deps,
            live_batch_capacity,
        }
    }

    /// Store backed by the local disk and metadata stores under
    /// `config.data_dir`
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let meta = LocalMetaStore::new(&config.data_dir)
            .map_err(|e| ArchiveError::persistence("open metadata store", e))?;
        let deps = ShardDeps {
            disk: Arc::new(LocalDiskStore::new(&config.data_dir)),
            meta: Arc::new(meta),
            memory: Arc::new(BudgetedHostMemory::new(config.host_memory_budget_bytes)),
        };
        Ok(Self::new(deps, config.live_batch_capacity))
    }

    pub fn deps(&self) -> &ShardDeps {
        &self.deps
    }

    /// Create an empty shard of `schema`
    pub fn create_shard(&self, schema: TableSchema, shard_id: ShardId) -> Result<Arc<TableShard>> {
        let shard = Arc::new(TableShard::new(
            schema,
            shard_id,
            self.live_batch_capacity,
            self.deps.clone(),
        )?);
        self.add_shard(Arc::clone(&shard));
        Ok(shard)
    }

    pub fn add_shard(&self, shard: Arc<TableShard>) {
        info!("➕ Hosting shard {}|{}", shard.table(), shard.shard_id());
        self.shards
            .write()
            .insert((shard.table().to_string(), shard.shard_id()), shard);
    }

    pub fn remove_shard(&self, table: &str, shard_id: ShardId) -> Option<Arc<TableShard>> {
        self.shards.write().remove(&(table.to_string(), shard_id))
    }

    pub fn get_shard(&self, table: &str, shard_id: ShardId) -> Result<Arc<TableShard>> {
        self.shards
            .read()
            .get(&(table.to_string(), shard_id))
            .cloned()
            .ok_or_else(|| ArchiveError::NotFound(format!("shard {}|{}", table, shard_id)))
    }

    pub fn shards(&self) -> Vec<Arc<TableShard>> {
        let mut shards: Vec<_> = self.shards.read().values().cloned().collect();
        shards.sort_by(|a, b| (a.table(), a.shard_id()).cmp(&(b.table(), b.shard_id())));
        shards
    }

    /// Archive one shard up to `cutoff`
    pub fn archive(
        &self,
        table: &str,
        shard_id: ShardId,
        cutoff: u32,
        reporter: &dyn ProgressReporter,
    ) -> Result<ArchiveOutcome> {
        let shard = self.get_shard(table, shard_id)?;
        shard.archive(cutoff, &JobKey::archiving(table, shard_id), reporter)
    }
}
