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

//! Typed column vectors
//!
//! A column vector is a value buffer plus a presence buffer. Null slots keep a
//! default value in the value buffer so that both buffers always have the same
//! length. Live batches and archive batches share this representation.

use serde::{Deserialize, Serialize};

use crate::core::{ArchiveError, DataType, DataValue, Result};

/// Typed value buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnValues {
    Bool(Vec<bool>),
    Int32(Vec<i32>),
    Uint32(Vec<u32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl ColumnValues {
    pub fn with_capacity(data_type: DataType, capacity: usize) -> Self {
        match data_type {
            DataType::Bool => ColumnValues::Bool(Vec::with_capacity(capacity)),
            DataType::Int32 => ColumnValues::Int32(Vec::with_capacity(capacity)),
            DataType::Uint32 => ColumnValues::Uint32(Vec::with_capacity(capacity)),
            DataType::Int64 => ColumnValues::Int64(Vec::with_capacity(capacity)),
            DataType::Float32 => ColumnValues::Float32(Vec::with_capacity(capacity)),
            DataType::Float64 => ColumnValues::Float64(Vec::with_capacity(capacity)),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ColumnValues::Bool(_) => DataType::Bool,
            ColumnValues::Int32(_) => DataType::Int32,
            ColumnValues::Uint32(_) => DataType::Uint32,
            ColumnValues::Int64(_) => DataType::Int64,
            ColumnValues::Float32(_) => DataType::Float32,
            ColumnValues::Float64(_) => DataType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Bool(v) => v.len(),
            ColumnValues::Int32(v) => v.len(),
            ColumnValues::Uint32(v) => v.len(),
            ColumnValues::Int64(v) => v.len(),
            ColumnValues::Float32(v) => v.len(),
            ColumnValues::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_size(&self) -> usize {
        self.len() * self.data_type().value_width()
    }

    fn get(&self, index: usize) -> Option<DataValue> {
        match self {
            ColumnValues::Bool(v) => v.get(index).copied().map(DataValue::Bool),
            ColumnValues::Int32(v) => v.get(index).copied().map(DataValue::Int32),
            ColumnValues::Uint32(v) => v.get(index).copied().map(DataValue::Uint32),
            ColumnValues::Int64(v) => v.get(index).copied().map(DataValue::Int64),
            ColumnValues::Float32(v) => v.get(index).copied().map(DataValue::Float32),
            ColumnValues::Float64(v) => v.get(index).copied().map(DataValue::Float64),
        }
    }

    /// Append a value, or the kind's default for a null slot
    fn push(&mut self, value: Option<DataValue>) -> Result<()> {
        match (self, value) {
            (ColumnValues::Bool(v), None) => v.push(false),
            (ColumnValues::Int32(v), None) => v.push(0),
            (ColumnValues::Uint32(v), None) => v.push(0),
            (ColumnValues::Int64(v), None) => v.push(0),
            (ColumnValues::Float32(v), None) => v.push(0.0),
            (ColumnValues::Float64(v), None) => v.push(0.0),
            (ColumnValues::Bool(v), Some(DataValue::Bool(x))) => v.push(x),
            (ColumnValues::Int32(v), Some(DataValue::Int32(x))) => v.push(x),
            (ColumnValues::Uint32(v), Some(DataValue::Uint32(x))) => v.push(x),
            (ColumnValues::Int64(v), Some(DataValue::Int64(x))) => v.push(x),
            (ColumnValues::Float32(v), Some(DataValue::Float32(x))) => v.push(x),
            (ColumnValues::Float64(v), Some(DataValue::Float64(x))) => v.push(x),
            (values, Some(other)) => {
                return Err(ArchiveError::TypeMismatch {
                    expected: values.data_type(),
                    actual: other.data_type(),
                })
            }
        }
        Ok(())
    }
}

/// How the values of a column are populated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnMode {
    /// Every slot is null (or the column is empty)
    AllValuesDefault,
    /// No slot is null
    AllValuesPresent,
    /// Mixed; the presence buffer is needed to read values
    HasNullVector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnVector {
    values: ColumnValues,
    /// `true` where a value is present
    nulls: Vec<bool>,
    present: usize,
}

impl ColumnVector {
    pub fn new(data_type: DataType) -> Self {
        Self::with_capacity(data_type, 0)
    }

    pub fn with_capacity(data_type: DataType, capacity: usize) -> Self {
        Self {
            values: ColumnValues::with_capacity(data_type, capacity),
            nulls: Vec::with_capacity(capacity),
            present: 0,
        }
    }

    pub fn from_values<I>(data_type: DataType, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = Option<DataValue>>,
    {
        let mut column = Self::new(data_type);
        for value in values {
            column.push(value)?;
        }
        Ok(column)
    }

    pub fn data_type(&self) -> DataType {
        self.values.data_type()
    }

    pub fn len(&self) -> usize {
        self.nulls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nulls.is_empty()
    }

    /// Value at `index`; `None` for a null slot or an index past the end
    pub fn value(&self, index: usize) -> Option<DataValue> {
        match self.nulls.get(index) {
            Some(true) => self.values.get(index),
            _ => None,
        }
    }

    pub fn is_present(&self, index: usize) -> bool {
        self.nulls.get(index).copied().unwrap_or(false)
    }

    pub fn push(&mut self, value: Option<DataValue>) -> Result<()> {
        self.values.push(value)?;
        self.nulls.push(value.is_some());
        if value.is_some() {
            self.present += 1;
        }
        Ok(())
    }

    pub fn null_count(&self) -> usize {
        self.len() - self.present
    }

    pub fn mode(&self) -> ColumnMode {
        if self.present == 0 {
            ColumnMode::AllValuesDefault
        } else if self.present == self.len() {
            ColumnMode::AllValuesPresent
        } else {
            ColumnMode::HasNullVector
        }
    }

    pub fn values(&self) -> &ColumnValues {
        &self.values
    }

    pub fn nulls(&self) -> &[bool] {
        &self.nulls
    }

    pub fn byte_size(&self) -> usize {
        self.values.byte_size() + self.nulls.len()
    }

    /// Rebuild a vector from buffers read back from disk
    pub fn from_parts(values: ColumnValues, nulls: Vec<bool>) -> Result<Self> {
        if values.len() != nulls.len() {
            return Err(ArchiveError::Serialization(format!(
                "value buffer has {} slots but presence buffer has {}",
                values.len(),
                nulls.len()
            )));
        }
        let present = nulls.iter().filter(|p| **p).count();
        Ok(Self {
            values,
            nulls,
            present,
        })
    }
}
