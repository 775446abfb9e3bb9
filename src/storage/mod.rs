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

pub mod archive;
pub mod column;
pub mod disk;
pub mod live;
pub mod memory;
pub mod memstore;
pub mod metadata;
pub mod redolog;
pub mod shard;

pub use archive::{
    ArchiveStore, ArchiveStoreVersion, ArchivingPatch, PatchSet, VersionGuard,
    VersionedColumnStore,
};
pub use column::{ColumnMode, ColumnValues, ColumnVector};
pub use disk::{DiskStore, LocalDiskStore};
pub use live::{LiveBatch, LiveSnapshot, LiveStore};
pub use memory::{BudgetedHostMemory, HostMemoryManager, MemoryReservation};
pub use memstore::MemStore;
pub use metadata::{BatchVersionMetadata, InMemoryMetaStore, LocalMetaStore, MetaStore};
pub use redolog::{BackfillPosition, RedoLogManager};
pub use shard::{ArchiveOutcome, ShardDeps, TableShard};
