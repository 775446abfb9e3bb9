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

//! Core value types shared by the live store, the archive store and the
//! archiving jobs.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Shard identifier within a table
pub type ShardId = u32;

/// Day partition identifier (days since the unix epoch)
pub type Day = i32;

pub const SECONDS_PER_DAY: u32 = 86_400;

/// Day partition an event timestamp (seconds since epoch) belongs to
pub fn day_of(timestamp: u32) -> Day {
    (timestamp / SECONDS_PER_DAY) as Day
}

/// Supported column value kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int32,
    Uint32,
    Int64,
    Float32,
    Float64,
}

impl DataType {
    /// Bytes used by one value of this kind in a value buffer
    pub fn value_width(&self) -> usize {
        match self {
            DataType::Bool => 1,
            DataType::Int32 | DataType::Uint32 | DataType::Float32 => 4,
            DataType::Int64 | DataType::Float64 => 8,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Bool => "bool",
            DataType::Int32 => "int32",
            DataType::Uint32 => "uint32",
            DataType::Int64 => "int64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        };
        f.write_str(name)
    }
}

/// A single non-null column value.
///
/// Values of the same kind are totally ordered (floats use the IEEE total
/// order). Values of different kinds order by kind, which never happens for
/// values read from one typed column. Nulls are modelled as `None` in an
/// `Option<DataValue>`, whose derived ordering puts them before any value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum DataValue {
    Bool(bool),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
}

impl DataValue {
    pub fn data_type(&self) -> DataType {
        match self {
            DataValue::Bool(_) => DataType::Bool,
            DataValue::Int32(_) => DataType::Int32,
            DataValue::Uint32(_) => DataType::Uint32,
            DataValue::Int64(_) => DataType::Int64,
            DataValue::Float32(_) => DataType::Float32,
            DataValue::Float64(_) => DataType::Float64,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            DataValue::Uint32(v) => Some(*v),
            _ => None,
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            DataValue::Bool(_) => 0,
            DataValue::Int32(_) => 1,
            DataValue::Uint32(_) => 2,
            DataValue::Int64(_) => 3,
            DataValue::Float32(_) => 4,
            DataValue::Float64(_) => 5,
        }
    }
}

impl Ord for DataValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (DataValue::Bool(a), DataValue::Bool(b)) => a.cmp(b),
            (DataValue::Int32(a), DataValue::Int32(b)) => a.cmp(b),
            (DataValue::Uint32(a), DataValue::Uint32(b)) => a.cmp(b),
            (DataValue::Int64(a), DataValue::Int64(b)) => a.cmp(b),
            (DataValue::Float32(a), DataValue::Float32(b)) => a.total_cmp(b),
            (DataValue::Float64(a), DataValue::Float64(b)) => a.total_cmp(b),
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }
}

impl PartialOrd for DataValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DataValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DataValue {}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Bool(v) => write!(f, "{}", v),
            DataValue::Int32(v) => write!(f, "{}", v),
            DataValue::Uint32(v) => write!(f, "{}", v),
            DataValue::Int64(v) => write!(f, "{}", v),
            DataValue::Float32(v) => write!(f, "{}", v),
            DataValue::Float64(v) => write!(f, "{}", v),
        }
    }
}

/// Composite sort key of one row: the values of the archiving sort columns
/// in priority order. Compared lexicographically with nulls first.
pub type SortKey = Vec<Option<DataValue>>;

/// Write position inside the live store: `index` is the next slot to be
/// filled in live batch `batch_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId {
    pub batch_id: i32,
    pub index: u32,
}

impl RecordId {
    pub fn new(batch_id: i32, index: u32) -> Self {
        Self { batch_id, index }
    }
}

/// Address of one record inside a live snapshot. `batch` is the position of
/// the batch in the snapshot (oldest first), `offset` the row within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordLocator {
    pub batch: i32,
    pub offset: u32,
}

impl RecordLocator {
    pub fn new(batch: i32, offset: u32) -> Self {
        Self { batch, offset }
    }
}
