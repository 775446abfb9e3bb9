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

//! Archive side of a shard
//!
//! Archived data is kept per day as an immutable, sorted, versioned batch.
//! An archiving run cuts patches out of a live snapshot, merges each into the
//! day's current batch and publishes a whole new store version at once.

pub mod batch;
pub mod column;
pub mod merge;
pub mod patch;
pub mod version;

pub use batch::{estimated_bytes, estimated_sort_key_bytes, VersionedColumnStore};
pub use column::{ArchiveBuffers, ArchiveColumn};
pub use merge::merge;
pub use patch::{ArchivingPatch, PatchSet};
pub use version::{retire, ArchiveStore, ArchiveStoreVersion, VersionGuard};
