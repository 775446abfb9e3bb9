//! Versioned per-day archive batch

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use super::column::{estimated_column_bytes, ArchiveColumn};
use crate::core::{ArchiveError, DataType, DataValue, Day, Result, SortKey};
use crate::storage::column::ColumnVector;
use crate::storage::memory::{HostMemoryManager, MemoryReservation};

/// Immutable, sorted columnar row group of one day.
///
/// A store is never mutated after construction. Its buffers are released
/// explicitly once it has been superseded and no reader can reach it any
/// more; the host memory reservation goes back with them, or when the store
/// is dropped, whichever comes first.
#[derive(Debug)]
pub struct VersionedColumnStore {
    day: Day,
    version: u32,
    size: u32,
    columns: Vec<ArchiveColumn>,
    reservation: Mutex<Option<MemoryReservation>>,
}

impl VersionedColumnStore {
    /// Build a store from sorted columns, accounting its buffers against
    /// `memory`
    pub fn new(
        day: Day,
        version: u32,
        columns: Vec<ColumnVector>,
        sort_columns: &[usize],
        memory: &Arc<dyn HostMemoryManager>,
    ) -> Result<Self> {
        let rows = columns.first().map(|c| c.len()).unwrap_or(0);
        let types: Vec<DataType> = columns.iter().map(|c| c.data_type()).collect();
        let reservation =
            MemoryReservation::reserve(memory, estimated_bytes(&types, rows, sort_columns))?;
        Self::with_reservation(day, version, columns, sort_columns, reservation)
    }

    /// Build a store whose memory was reserved before its buffers were
    /// allocated
    pub(crate) fn with_reservation(
        day: Day,
        version: u32,
        columns: Vec<ColumnVector>,
        sort_columns: &[usize],
        reservation: MemoryReservation,
    ) -> Result<Self> {
        let rows = columns.first().map(|c| c.len()).unwrap_or(0);
        if columns.iter().any(|c| c.len() != rows) {
            return Err(ArchiveError::Internal(format!(
                "archive batch for day {} has columns of different lengths",
                day
            )));
        }
        let size = u32::try_from(rows).map_err(|_| {
            ArchiveError::Internal(format!("archive batch for day {} is too large", day))
        })?;

        let columns = columns
            .into_iter()
            .enumerate()
            .map(|(i, vector)| ArchiveColumn::new(vector, sort_columns.contains(&i)))
            .collect();

        Ok(Self {
            day,
            version,
            size,
            columns,
            reservation: Mutex::new(Some(reservation)),
        })
    }

    pub fn day(&self) -> Day {
        self.day
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Row count
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[ArchiveColumn] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&ArchiveColumn> {
        self.columns.get(index)
    }

    pub fn reserved_bytes(&self) -> u64 {
        self.reservation
            .lock()
            .as_ref()
            .map(|r| r.bytes())
            .unwrap_or(0)
    }

    pub fn sort_key(&self, row: usize, sort_columns: &[usize]) -> Result<SortKey> {
        sort_columns
            .iter()
            .map(|c| {
                self.columns
                    .get(*c)
                    .ok_or_else(|| {
                        ArchiveError::SortColumnReadFailure(format!(
                            "sort column {} missing from archive batch of day {}",
                            c, self.day
                        ))
                    })?
                    .value(row)
            })
            .collect()
    }

    pub fn is_released(&self) -> bool {
        self.columns.iter().all(|c| c.is_released()) && self.reservation.lock().is_none()
    }

    /// Release every buffer and hand the accounted memory back. Idempotent.
    pub fn release(&self) {
        let released = self.columns.iter().filter(|c| c.release()).count();
        let reservation = self.reservation.lock().take();
        if let Some(reservation) = reservation {
            debug!(
                "🧹 Released archive batch day={} version={} ({} columns, {} bytes)",
                self.day,
                self.version,
                released,
                reservation.bytes()
            );
        }
    }
}

/// Host memory a batch of `rows` rows with these column types occupies
pub fn estimated_bytes(value_types: &[DataType], rows: usize, sort_columns: &[usize]) -> u64 {
    value_types
        .iter()
        .enumerate()
        .map(|(i, dt)| estimated_column_bytes(*dt, rows, sort_columns.contains(&i)))
        .sum()
}

/// Host memory `rows` materialised sort keys over `num_sort_columns`
/// columns occupy
pub fn estimated_sort_key_bytes(rows: usize, num_sort_columns: usize) -> u64 {
    let per_key = std::mem::size_of::<SortKey>()
        + num_sort_columns * std::mem::size_of::<Option<DataValue>>();
    (rows * per_key) as u64
}
