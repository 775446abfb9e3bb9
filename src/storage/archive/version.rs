//! Archive store versions and atomic publication
//!
//! A shard's archive store is a single pointer to an immutable
//! `ArchiveStoreVersion`. Publishing swaps the pointer under a write lock;
//! readers take the read lock only long enough to register themselves on the
//! version they will read. Retiring a superseded version never blocks: its
//! replaced batches are released right away when nobody reads it, otherwise
//! by whichever guard leaves it last.

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use tracing::{debug, info};

use super::batch::VersionedColumnStore;
use crate::core::Day;

#[derive(Default)]
struct Readers {
    count: usize,
    /// Days to release once `count` drops to zero
    retired: Option<Vec<Day>>,
}

pub struct ArchiveStoreVersion {
    archiving_cutoff: u32,
    batches: BTreeMap<Day, Arc<VersionedColumnStore>>,
    readers: Mutex<Readers>,
}

impl ArchiveStoreVersion {
    pub fn new(archiving_cutoff: u32, batches: BTreeMap<Day, Arc<VersionedColumnStore>>) -> Self {
        Self {
            archiving_cutoff,
            batches,
            readers: Mutex::new(Readers::default()),
        }
    }

    pub fn empty() -> Self {
        Self::new(0, BTreeMap::new())
    }

    pub fn archiving_cutoff(&self) -> u32 {
        self.archiving_cutoff
    }

    pub fn batch(&self, day: Day) -> Option<&Arc<VersionedColumnStore>> {
        self.batches.get(&day)
    }

    pub fn batches(&self) -> &BTreeMap<Day, Arc<VersionedColumnStore>> {
        &self.batches
    }

    pub fn days(&self) -> Vec<Day> {
        self.batches.keys().copied().collect()
    }

    pub fn reader_count(&self) -> usize {
        self.readers.lock().count
    }

    /// Whether a retirement is waiting on this version's readers
    pub fn has_pending_release(&self) -> bool {
        self.readers.lock().retired.is_some()
    }

    fn enter(&self) {
        self.readers.lock().count += 1;
    }

    fn exit(&self) {
        let pending = {
            let mut readers = self.readers.lock();
            readers.count -= 1;
            if readers.count == 0 {
                readers.retired.take()
            } else {
                None
            }
        };
        if let Some(days) = pending {
            debug!(
                "Last reader left archive store version cutoff={}",
                self.archiving_cutoff
            );
            self.release_days(&days);
        }
    }

    fn release_days(&self, days: &[Day]) {
        for day in days {
            if let Some(batch) = self.batch(*day) {
                debug!(
                    "Retiring archive batch day={} version={}",
                    day,
                    batch.version()
                );
                batch.release();
            }
        }
    }
}

impl fmt::Debug for ArchiveStoreVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveStoreVersion")
            .field("archiving_cutoff", &self.archiving_cutoff)
            .field("days", &self.days())
            .field("readers", &self.reader_count())
            .finish()
    }
}

/// Registered read access to one archive store version
pub struct VersionGuard {
    version: Arc<ArchiveStoreVersion>,
}

impl VersionGuard {
    fn enter(version: Arc<ArchiveStoreVersion>) -> Self {
        version.enter();
        Self { version }
    }

    pub fn version(&self) -> &Arc<ArchiveStoreVersion> {
        &self.version
    }
}

impl Deref for VersionGuard {
    type Target = ArchiveStoreVersion;

    fn deref(&self) -> &Self::Target {
        &self.version
    }
}

impl Drop for VersionGuard {
    fn drop(&mut self) {
        self.version.exit();
    }
}

/// Holder of a shard's current archive store version
#[derive(Debug)]
pub struct ArchiveStore {
    current: RwLock<Arc<ArchiveStoreVersion>>,
}

impl ArchiveStore {
    pub fn new(initial: ArchiveStoreVersion) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Register as a reader of the current version
    pub fn read(&self) -> VersionGuard {
        let current = self.current.read();
        VersionGuard::enter(Arc::clone(&current))
    }

    pub fn archiving_cutoff(&self) -> u32 {
        self.current.read().archiving_cutoff()
    }

    /// Replace the current version, returning the superseded one
    pub fn publish(&self, version: ArchiveStoreVersion) -> Arc<ArchiveStoreVersion> {
        let cutoff = version.archiving_cutoff();
        let mut current = self.current.write();
        let old = std::mem::replace(&mut *current, Arc::new(version));
        info!(
            "📌 Published archive store version cutoff={} (was {})",
            cutoff,
            old.archiving_cutoff()
        );
        old
    }
}

/// Release the batches of `days` in a superseded version. With readers
/// still on it the release is handed to the last `VersionGuard` to drop, so
/// a caller holding a guard never waits on itself. Batches shared with the
/// current version must not be listed.
pub fn retire(old: &ArchiveStoreVersion, days: &[Day]) {
    {
        let mut readers = old.readers.lock();
        if readers.count > 0 {
            debug!(
                "Deferring release of {} days at cutoff={} until {} readers leave",
                days.len(),
                old.archiving_cutoff,
                readers.count
            );
            readers
                .retired
                .get_or_insert_with(Vec::new)
                .extend_from_slice(days);
            return;
        }
    }
    old.release_days(days);
}
