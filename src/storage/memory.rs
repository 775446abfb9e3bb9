//! Host memory accounting
//!
//! Every archive buffer allocation is bracketed by a reservation against the
//! host memory budget. Reservations are RAII: dropping one hands the bytes
//! back, so a merge that fails halfway never leaks accounted memory.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::{ArchiveError, Result};

pub trait HostMemoryManager: Send + Sync + Debug {
    /// Account `bytes` against the budget, failing with `MemoryExhausted`
    /// when the budget would be exceeded
    fn try_reserve(&self, bytes: u64) -> Result<()>;

    /// Hand back bytes previously reserved
    fn release(&self, bytes: u64);

    /// Bytes currently accounted
    fn usage(&self) -> u64;

    fn budget(&self) -> u64;
}

/// Fixed-budget accounting backed by an atomic counter
#[derive(Debug)]
pub struct BudgetedHostMemory {
    budget: u64,
    used: AtomicU64,
}

impl BudgetedHostMemory {
    pub fn new(budget: u64) -> Self {
        Self {
            budget,
            used: AtomicU64::new(0),
        }
    }
}

impl HostMemoryManager for BudgetedHostMemory {
    fn try_reserve(&self, bytes: u64) -> Result<()> {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|total| *total <= self.budget)
            })
            .map(|_| ())
            .map_err(|used| ArchiveError::MemoryExhausted {
                requested: bytes,
                available: self.budget.saturating_sub(used),
            })
    }

    fn release(&self, bytes: u64) {
        let result = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(bytes))
            });
        if let Ok(previous) = result {
            if previous < bytes {
                warn!(
                    "⚠️ Host memory release of {} bytes exceeds accounted usage {}",
                    bytes, previous
                );
            }
        }
    }

    fn usage(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    fn budget(&self) -> u64 {
        self.budget
    }
}

/// Bytes accounted against a host memory manager until dropped
#[derive(Debug)]
pub struct MemoryReservation {
    bytes: u64,
    manager: Arc<dyn HostMemoryManager>,
}

impl MemoryReservation {
    pub fn reserve(manager: &Arc<dyn HostMemoryManager>, bytes: u64) -> Result<Self> {
        manager.try_reserve(bytes)?;
        debug!("Reserved {} bytes of host memory", bytes);
        Ok(Self {
            bytes,
            manager: Arc::clone(manager),
        })
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for MemoryReservation {
    fn drop(&mut self) {
        self.manager.release(self.bytes);
    }
}
