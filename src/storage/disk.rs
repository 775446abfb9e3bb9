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

//! Disk store for archive batch columns and redo log files
//!
//! Every archive column is written as one file per (day, version). The file
//! body is the bincode encoding of the column followed by a little-endian
//! CRC32 of that body.

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::core::{DataType, Day, ShardId};
use crate::storage::archive::ArchiveColumn;
use crate::storage::column::{ColumnValues, ColumnVector};

/// Storage collaborator for archive batches and redo logs
pub trait DiskStore: Send + Sync + Debug {
    fn open_column_file_for_write(
        &self,
        table: &str,
        column: usize,
        shard: ShardId,
        day: Day,
        version: u32,
    ) -> anyhow::Result<Box<dyn Write + Send>>;

    fn open_column_file_for_read(
        &self,
        table: &str,
        column: usize,
        shard: ShardId,
        day: Day,
        version: u32,
    ) -> anyhow::Result<Box<dyn Read + Send>>;

    /// Delete every version of a day's batch in `from_version..=to_version`
    fn delete_batch_versions(
        &self,
        table: &str,
        shard: ShardId,
        day: Day,
        from_version: u32,
        to_version: u32,
    ) -> anyhow::Result<()>;

    fn delete_log_file(&self, table: &str, shard: ShardId, file_id: i64) -> anyhow::Result<()>;
}

/// On-disk form of one archive column
#[derive(Debug, Serialize, Deserialize)]
struct ColumnFile {
    data_type: DataType,
    values: ColumnValues,
    nulls: Vec<bool>,
    counts: Option<Vec<u32>>,
}

/// Encode an archive column into `writer`
pub fn write_column(writer: &mut dyn Write, column: &ArchiveColumn) -> anyhow::Result<()> {
    let buffers = column
        .read()
        .ok_or_else(|| anyhow!("cannot persist a released column"))?;
    let file = ColumnFile {
        data_type: column.data_type(),
        values: buffers.vector.values().clone(),
        nulls: buffers.vector.nulls().to_vec(),
        counts: buffers.counts.clone(),
    };
    let body = bincode::serialize(&file).context("Failed to serialize column")?;
    let checksum = crc32fast::hash(&body);
    writer.write_all(&body)?;
    writer.write_all(&checksum.to_le_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Decode a column written by `write_column`, verifying its checksum
pub fn read_column(reader: &mut dyn Read) -> anyhow::Result<(ColumnVector, Option<Vec<u32>>)> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    if data.len() < 4 {
        bail!("column file truncated ({} bytes)", data.len());
    }
    let (body, trailer) = data.split_at(data.len() - 4);
    let mut checksum_bytes = [0u8; 4];
    checksum_bytes.copy_from_slice(trailer);
    if u32::from_le_bytes(checksum_bytes) != crc32fast::hash(body) {
        bail!("column file checksum mismatch");
    }

    let file: ColumnFile = bincode::deserialize(body).context("Failed to deserialize column")?;
    if file.values.data_type() != file.data_type {
        bail!(
            "column file declares {} but holds {} values",
            file.data_type,
            file.values.data_type()
        );
    }
    let vector = ColumnVector::from_parts(file.values, file.nulls)?;
    Ok((vector, file.counts))
}

/// Disk store rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalDiskStore {
    root: PathBuf,
}

impl LocalDiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn shard_dir(&self, table: &str, shard: ShardId) -> PathBuf {
        self.root.join("data").join(format!("{}_{}", table, shard))
    }

    fn batches_dir(&self, table: &str, shard: ShardId) -> PathBuf {
        self.shard_dir(table, shard).join("archiving_batches")
    }

    pub fn batch_dir(&self, table: &str, shard: ShardId, day: Day, version: u32) -> PathBuf {
        self.batches_dir(table, shard)
            .join(format!("{}_{}", day, version))
    }

    pub fn column_path(
        &self,
        table: &str,
        column: usize,
        shard: ShardId,
        day: Day,
        version: u32,
    ) -> PathBuf {
        self.batch_dir(table, shard, day, version)
            .join(format!("{}.data", column))
    }

    pub fn log_path(&self, table: &str, shard: ShardId, file_id: i64) -> PathBuf {
        self.shard_dir(table, shard)
            .join("redologs")
            .join(format!("{}.redolog", file_id))
    }
}

impl DiskStore for LocalDiskStore {
    fn open_column_file_for_write(
        &self,
        table: &str,
        column: usize,
        shard: ShardId,
        day: Day,
        version: u32,
    ) -> anyhow::Result<Box<dyn Write + Send>> {
        let path = self.column_path(table, column, shard, day, version);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file =
            File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn open_column_file_for_read(
        &self,
        table: &str,
        column: usize,
        shard: ShardId,
        day: Day,
        version: u32,
    ) -> anyhow::Result<Box<dyn Read + Send>> {
        let path = self.column_path(table, column, shard, day, version);
        let file = File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn delete_batch_versions(
        &self,
        table: &str,
        shard: ShardId,
        day: Day,
        from_version: u32,
        to_version: u32,
    ) -> anyhow::Result<()> {
        let dir = self.batches_dir(table, shard);
        if !dir.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some((entry_day, entry_version)) = name.to_str().and_then(parse_batch_dir) else {
                warn!("Skipping unexpected entry {:?} in {}", name, dir.display());
                continue;
            };
            if entry_day == day && (from_version..=to_version).contains(&entry_version) {
                fs::remove_dir_all(entry.path())
                    .with_context(|| format!("Failed to remove {}", entry.path().display()))?;
                debug!(
                    "🗑️ Deleted archive batch {} day={} version={}",
                    table, day, entry_version
                );
            }
        }
        Ok(())
    }

    fn delete_log_file(&self, table: &str, shard: ShardId, file_id: i64) -> anyhow::Result<()> {
        let path = self.log_path(table, shard, file_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}

fn parse_batch_dir(name: &str) -> Option<(Day, u32)> {
    let (day, version) = name.split_once('_')?;
    Some((day.parse().ok()?, version.parse().ok()?))
}
