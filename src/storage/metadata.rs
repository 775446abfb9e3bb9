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

//! Metadata storage for archiving cutoffs and archive batch versions

use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::{Day, ShardId};

/// Extra facts recorded with every archive batch version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchVersionMetadata {
    pub num_columns: usize,
    /// Cutoff of the archiving run that produced the version
    pub archiving_cutoff: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchVersionRecord {
    pub version: u32,
    pub size: u32,
    pub metadata: BatchVersionMetadata,
    pub created_at: DateTime<Utc>,
}

/// Persistent archiving state of one shard
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShardMetadata {
    pub archiving_cutoff: u32,
    pub batches: BTreeMap<Day, BatchVersionRecord>,
}

/// Metadata collaborator of the archiving engine
pub trait MetaStore: Send + Sync + Debug {
    fn add_archive_batch_version(
        &self,
        table: &str,
        shard: ShardId,
        day: Day,
        version: u32,
        size: u32,
        metadata: &BatchVersionMetadata,
    ) -> anyhow::Result<()>;

    fn update_archiving_cutoff(&self, table: &str, shard: ShardId, cutoff: u32)
        -> anyhow::Result<()>;

    /// Recorded state of a shard; default when nothing was recorded
    fn shard_metadata(&self, table: &str, shard: ShardId) -> anyhow::Result<ShardMetadata>;
}

type ShardKey = (String, ShardId);

/// Metadata kept in process memory only
#[derive(Debug, Default)]
pub struct InMemoryMetaStore {
    shards: RwLock<HashMap<ShardKey, ShardMetadata>>,
}

impl InMemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<R>(&self, table: &str, shard: ShardId, f: impl FnOnce(&mut ShardMetadata) -> R) -> R {
        let mut shards = self.shards.write();
        f(shards.entry((table.to_string(), shard)).or_default())
    }
}

impl MetaStore for InMemoryMetaStore {
    fn add_archive_batch_version(
        &self,
        table: &str,
        shard: ShardId,
        day: Day,
        version: u32,
        size: u32,
        metadata: &BatchVersionMetadata,
    ) -> anyhow::Result<()> {
        self.update(table, shard, |meta| {
            meta.batches.insert(
                day,
                BatchVersionRecord {
                    version,
                    size,
                    metadata: metadata.clone(),
                    created_at: Utc::now(),
                },
            );
        });
        Ok(())
    }

    fn update_archiving_cutoff(
        &self,
        table: &str,
        shard: ShardId,
        cutoff: u32,
    ) -> anyhow::Result<()> {
        self.update(table, shard, |meta| meta.archiving_cutoff = cutoff);
        Ok(())
    }

    fn shard_metadata(&self, table: &str, shard: ShardId) -> anyhow::Result<ShardMetadata> {
        Ok(self
            .shards
            .read()
            .get(&(table.to_string(), shard))
            .cloned()
            .unwrap_or_default())
    }
}

/// Metadata persisted as one JSON document per shard.
///
/// Documents are replaced through a temporary file and a rename so that a
/// crash never leaves a half-written document behind.
#[derive(Debug)]
pub struct LocalMetaStore {
    metadata_dir: PathBuf,
    cache: InMemoryMetaStore,
}

impl LocalMetaStore {
    pub fn new(data_dir: &Path) -> anyhow::Result<Self> {
        let metadata_dir = data_dir.join("metadata");
        fs::create_dir_all(&metadata_dir)
            .with_context(|| format!("Failed to create {}", metadata_dir.display()))?;
        Ok(Self {
            metadata_dir,
            cache: InMemoryMetaStore::new(),
        })
    }

    fn document_path(&self, table: &str, shard: ShardId) -> PathBuf {
        self.metadata_dir.join(format!("{}_{}.json", table, shard))
    }

    fn load(&self, table: &str, shard: ShardId) -> anyhow::Result<ShardMetadata> {
        let path = self.document_path(table, shard);
        if !path.exists() {
            return Ok(ShardMetadata::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&data).with_context(|| format!("Corrupted {}", path.display()))
    }

    fn persist(&self, table: &str, shard: ShardId, meta: &ShardMetadata) -> anyhow::Result<()> {
        let path = self.document_path(table, shard);
        let temp_path = path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(meta)?;
        fs::write(&temp_path, data)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        fs::rename(&temp_path, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        debug!("Persisted metadata of {}|{}", table, shard);
        Ok(())
    }

    fn modify(
        &self,
        table: &str,
        shard: ShardId,
        f: impl FnOnce(&mut ShardMetadata),
    ) -> anyhow::Result<()> {
        let mut meta = self.shard_metadata(table, shard)?;
        f(&mut meta);
        self.persist(table, shard, &meta)?;
        self.cache.update(table, shard, |cached| *cached = meta);
        Ok(())
    }
}

impl MetaStore for LocalMetaStore {
    fn add_archive_batch_version(
        &self,
        table: &str,
        shard: ShardId,
        day: Day,
        version: u32,
        size: u32,
        metadata: &BatchVersionMetadata,
    ) -> anyhow::Result<()> {
        self.modify(table, shard, |meta| {
            meta.batches.insert(
                day,
                BatchVersionRecord {
                    version,
                    size,
                    metadata: metadata.clone(),
                    created_at: Utc::now(),
                },
            );
        })
    }

    fn update_archiving_cutoff(
        &self,
        table: &str,
        shard: ShardId,
        cutoff: u32,
    ) -> anyhow::Result<()> {
        self.modify(table, shard, |meta| meta.archiving_cutoff = cutoff)
    }

    fn shard_metadata(&self, table: &str, shard: ShardId) -> anyhow::Result<ShardMetadata> {
        let key = (table.to_string(), shard);
        if let Some(meta) = self.cache.shards.read().get(&key) {
            return Ok(meta.clone());
        }
        let meta = self.load(table, shard)?;
        self.cache.update(table, shard, |cached| *cached = meta.clone());
        Ok(meta)
    }
}
