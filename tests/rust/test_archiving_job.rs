//! End-to-end archiving runs against a three-batch live store

use super::common::*;

#[cfg(test)]
mod archiving_job_tests {
    use super::*;
    use archstore::core::{ArchiveError, DataValue, RecordLocator};
    use archstore::jobs::{
        ArchiveJobDetail, ArchiveStage, ArchivingJob, Job, JobKey, JobManager, JobStatus,
        NoopReporter,
    };
    use archstore::storage::archive::estimated_bytes;
    use archstore::storage::metadata::MetaStore;
    use archstore::storage::{ColumnMode, HostMemoryManager, LiveSnapshot};
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    const BUDGET: u64 = 1 << 20;

    fn job(scenario: &Scenario, cutoff: u32) -> ArchivingJob {
        ArchivingJob::new(TABLE, SHARD, cutoff, Arc::clone(&scenario.mem_store))
    }

    fn key() -> JobKey {
        JobKey::archiving(TABLE, SHARD)
    }

    #[test]
    fn test_patch_is_sorted_nulls_first() {
        let scenario = archiving_scenario(BUDGET);
        let snapshot: Arc<LiveSnapshot> =
            Arc::new(scenario.shard.live_store().snapshot().unwrap());
        assert_eq!(snapshot.batch_ids(), &[-110, -101]);
        assert_eq!(snapshot.num_records(), 8);

        let mut patches = snapshot
            .create_archiving_patches(140, 100, &[1, 2], &NoopReporter, &key())
            .unwrap();
        assert_eq!(patches.num_records, 7);
        assert_eq!(patches.days(), vec![0]);
        assert_eq!(patches.max_event_times, vec![Some(135), Some(140)]);

        let patch = patches.by_day.get_mut(&0).unwrap();
        patch.sort().unwrap();
        let expected: Vec<RecordLocator> = [(0, 3), (1, 0), (0, 1), (1, 2), (0, 4), (0, 2), (1, 1)]
            .into_iter()
            .map(|(batch, offset)| RecordLocator::new(batch, offset))
            .collect();
        assert_eq!(patch.record_ids(), expected.as_slice());
    }

    #[test]
    fn test_archiving_job_end_to_end() {
        let scenario = archiving_scenario(BUDGET);
        let manager = JobManager::new();

        manager.run(&job(&scenario, 140)).unwrap();

        let detail = manager.get_job_detail(&key()).unwrap();
        assert_eq!(detail.job.status, JobStatus::Succeeded);
        assert_eq!(detail.stage, ArchiveStage::Complete);
        assert_eq!(detail.job.current, 1);
        assert_eq!(detail.job.total, 1);
        assert_eq!(detail.job.num_records, 7);
        assert_eq!(detail.job.num_affected_days, 1);
        assert_eq!(detail.current_cutoff, 140);
        assert_eq!(detail.running_cutoff, 140);
        assert_eq!(detail.last_cutoff, 100);
        assert!(detail.job.last_error.is_none());

        // Published version: merged day 0 batch, base rows win ties
        let version = scenario.shard.archive_store().read();
        assert_eq!(version.archiving_cutoff(), 140);
        let merged = Arc::clone(version.batch(0).unwrap());
        drop(version);
        assert_eq!(merged.version(), 1);
        assert_eq!(merged.size(), 12);
        assert_eq!(
            event_times(&merged),
            vec![50, 130, 110, 60, 110, 70, 140, 135, 120, 80, 120, 90]
        );
        assert_eq!(merged.column(0).unwrap().mode(), ColumnMode::AllValuesPresent);
        assert_eq!(merged.column(1).unwrap().mode(), ColumnMode::HasNullVector);
        assert_eq!(
            column_values(&merged, 1)[..3],
            [None, None, Some(DataValue::Bool(false))]
        );

        // Superseded batch is gone, memory follows
        assert!(scenario.base_batch.is_released());
        assert_eq!(scenario.memory.usage(), merged.reserved_bytes());

        // Disk: new version written, old version deleted
        assert_eq!(
            scenario.disk.written_versions(),
            vec![(0, 0, 1), (1, 0, 1), (2, 0, 1)]
        );
        assert_eq!(*scenario.disk.deleted_versions.lock(), vec![(0, 0, 0)]);

        // Metadata
        let meta = scenario.meta.shard_metadata(TABLE, SHARD).unwrap();
        assert_eq!(meta.archiving_cutoff, 140);
        let record = meta.batches.get(&0).unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.size, 12);
        assert_eq!(record.metadata.archiving_cutoff, 140);

        // Redo log 1 is archived and behind the backfill position
        assert_eq!(*scenario.disk.deleted_logs.lock(), vec![1]);
        assert!(scenario.shard.redo_log().max_event_times().is_empty());

        // -110 is fully archived; -101 is the write position; -99 is unseen
        assert_eq!(scenario.shard.live_store().batch_ids(), vec![-101, -99]);
    }

    #[test]
    fn test_archiving_again_past_archived_data() {
        let scenario = archiving_scenario(BUDGET);
        let manager = JobManager::new();
        manager.run(&job(&scenario, 140)).unwrap();
        let merged = Arc::clone(scenario.shard.archive_store().read().batch(0).unwrap());

        manager.run(&job(&scenario, 240)).unwrap();

        let detail = manager.get_job_detail(&key()).unwrap();
        assert_eq!(detail.job.status, JobStatus::Succeeded);
        assert_eq!(detail.job.num_records, 0);
        assert_eq!(detail.job.num_affected_days, 0);
        assert_eq!(detail.last_cutoff, 140);
        assert_eq!(detail.current_cutoff, 240);
        assert_eq!(scenario.shard.archive_store().archiving_cutoff(), 240);
        assert_eq!(
            scenario.meta.shard_metadata(TABLE, SHARD).unwrap().archiving_cutoff,
            240
        );

        // Untouched day batch is shared, not released
        let version = scenario.shard.archive_store().read();
        assert!(Arc::ptr_eq(version.batch(0).unwrap(), &merged));
        assert!(!merged.is_released());
    }

    #[test]
    fn test_stale_cutoff_is_a_noop() {
        let scenario = archiving_scenario(BUDGET);
        let manager = JobManager::new();

        manager.run(&job(&scenario, 100)).unwrap();

        let detail = manager.get_job_detail(&key()).unwrap();
        assert_eq!(detail.job.status, JobStatus::Succeeded);
        assert_eq!(detail.stage, ArchiveStage::Complete);
        assert_eq!(detail.job.num_records, 0);
        assert_eq!(scenario.shard.archive_store().archiving_cutoff(), 100);
        assert!(!scenario.base_batch.is_released());
        assert!(scenario.disk.written_versions().is_empty());
        assert_eq!(scenario.shard.live_store().batch_ids(), vec![-110, -101, -99]);
    }

    #[test]
    fn test_persistence_failure_keeps_published_state() {
        let scenario = archiving_scenario(BUDGET);
        let manager = JobManager::new();
        scenario.disk.fail_writes.store(true, Ordering::SeqCst);
        let usage_before = scenario.memory.usage();

        let err = manager.run(&job(&scenario, 140)).unwrap_err();
        assert!(matches!(err, ArchiveError::PersistenceFailure(_)), "{:?}", err);

        let detail = manager.get_job_detail(&key()).unwrap();
        assert_eq!(detail.job.status, JobStatus::Failed);
        assert_eq!(detail.stage, ArchiveStage::Failed);
        assert!(detail.job.last_error.is_some());

        let version = scenario.shard.archive_store().read();
        assert_eq!(version.archiving_cutoff(), 100);
        assert!(Arc::ptr_eq(version.batch(0).unwrap(), &scenario.base_batch));
        drop(version);
        assert!(!scenario.base_batch.is_released());
        assert_eq!(scenario.memory.usage(), usage_before);
        assert_eq!(*scenario.disk.deleted_versions.lock(), vec![(0, 1, 1)]);
        assert!(scenario.disk.deleted_logs.lock().is_empty());
        assert_eq!(
            scenario.meta.shard_metadata(TABLE, SHARD).unwrap().archiving_cutoff,
            0
        );
        assert_eq!(scenario.shard.live_store().batch_ids(), vec![-110, -101, -99]);

        // Retry once the disk is back
        scenario.disk.fail_writes.store(false, Ordering::SeqCst);
        manager.run(&job(&scenario, 140)).unwrap();
        assert_eq!(scenario.shard.archive_store().read().batch(0).unwrap().size(), 12);
    }

    #[test]
    fn test_memory_exhaustion_keeps_published_state() {
        let types = trips_schema().value_types();
        let scenario = archiving_scenario(estimated_bytes(&types, BASE_ROWS.len(), &[1, 2]));
        let manager = JobManager::new();

        let err = manager.run(&job(&scenario, 140)).unwrap_err();
        assert!(matches!(err, ArchiveError::MemoryExhausted { .. }), "{:?}", err);

        assert_eq!(scenario.shard.archive_store().archiving_cutoff(), 100);
        assert!(!scenario.base_batch.is_released());
        assert_eq!(scenario.memory.usage(), scenario.base_batch.reserved_bytes());
        assert!(scenario.disk.written_versions().is_empty());
        assert_eq!(
            manager.get_job_detail(&key()).unwrap().job.status,
            JobStatus::Failed
        );
    }

    #[test]
    fn test_metadata_failure_after_publish() {
        let scenario = archiving_scenario(BUDGET);
        scenario.meta.fail.store(true, Ordering::SeqCst);

        let err = scenario
            .shard
            .archive(140, &key(), &NoopReporter)
            .unwrap_err();
        assert!(matches!(err, ArchiveError::PersistenceFailure(_)), "{:?}", err);

        // Publication already happened; cleanup steps after it did not
        assert_eq!(scenario.shard.archive_store().archiving_cutoff(), 140);
        assert!(scenario.disk.deleted_logs.lock().is_empty());
        assert_eq!(scenario.shard.live_store().batch_ids(), vec![-110, -101, -99]);
    }

    #[test]
    fn test_readers_keep_superseded_batch_alive() {
        let scenario = archiving_scenario(BUDGET);
        let reader = scenario.shard.archive_store().read();

        // Archiving on the reader's own thread completes
        let outcome = scenario.shard.archive(140, &key(), &NoopReporter).unwrap();
        assert_eq!(outcome.num_records, 7);
        assert_eq!(scenario.shard.archive_store().archiving_cutoff(), 140);

        // New readers see the new version; the old reader still reads its own
        let merged_bytes = {
            let current = scenario.shard.archive_store().read();
            let merged = current.batch(0).unwrap();
            assert_eq!(merged.size(), 12);
            merged.reserved_bytes()
        };
        assert_eq!(reader.archiving_cutoff(), 100);
        assert_eq!(event_times(reader.batch(0).unwrap()), vec![50, 60, 70, 80, 90]);
        assert!(!scenario.base_batch.is_released());
        assert!(reader.has_pending_release());

        drop(reader);
        assert!(scenario.base_batch.is_released());
        assert_eq!(scenario.memory.usage(), merged_bytes);
    }

    #[test]
    fn test_reader_on_another_thread_does_not_block_archiving() {
        let scenario = archiving_scenario(BUDGET);
        let entered = Arc::new(Barrier::new(2));
        let hold = Arc::new(Barrier::new(2));
        let reader = {
            let shard = Arc::clone(&scenario.shard);
            let (entered, hold) = (Arc::clone(&entered), Arc::clone(&hold));
            thread::spawn(move || {
                let guard = shard.archive_store().read();
                entered.wait();
                hold.wait();
                event_times(guard.batch(0).unwrap())
            })
        };

        entered.wait();
        scenario.shard.archive(140, &key(), &NoopReporter).unwrap();
        assert!(!scenario.base_batch.is_released());

        hold.wait();
        assert_eq!(reader.join().unwrap(), vec![50, 60, 70, 80, 90]);
        assert!(scenario.base_batch.is_released());
    }

    #[test]
    fn test_merges_every_day_before_writing() {
        // The one-row day fits; the sort keys of fifty rows do not
        let scenario = two_day_scenario(1000, 50);
        let stages = parking_lot::Mutex::new(Vec::new());
        let reporter = |_key: &JobKey, update: &mut dyn FnMut(&mut ArchiveJobDetail)| {
            let mut detail = ArchiveJobDetail::default();
            update(&mut detail);
            stages.lock().push((detail.stage, detail.job.current));
        };

        let err = scenario
            .shard
            .archive(TWO_DAY_CUTOFF, &key(), &reporter)
            .unwrap_err();
        assert!(matches!(err, ArchiveError::MemoryExhausted { .. }), "{:?}", err);

        // Day 0 was merged, day 1 was not, and no column file was opened
        let stages = stages.into_inner();
        assert!(stages.contains(&(ArchiveStage::Merge, 1)));
        assert!(!stages.iter().any(|(stage, _)| *stage == ArchiveStage::Persist));
        assert!(scenario.disk.opened.lock().is_empty());
        assert!(scenario.disk.deleted_versions.lock().is_empty());
        assert_eq!(scenario.memory.usage(), 0);
        assert_eq!(scenario.shard.archive_store().archiving_cutoff(), 0);
    }

    #[test]
    fn test_later_day_write_failure_removes_earlier_days() {
        let scenario = two_day_scenario(BUDGET, 2);
        *scenario.disk.fail_day.lock() = Some(1);
        let usage_before = scenario.memory.usage();
        let live_before = scenario.shard.live_store().batch_ids();

        let err = scenario
            .shard
            .archive(TWO_DAY_CUTOFF, &key(), &NoopReporter)
            .unwrap_err();
        assert!(matches!(err, ArchiveError::PersistenceFailure(_)), "{:?}", err);

        // Day 0 was fully written, then removed along with day 1
        let opened = scenario.disk.opened.lock().clone();
        assert_eq!(opened, vec![(0, 0, 1), (1, 0, 1), (2, 0, 1), (0, 1, 1)]);
        let deleted = scenario.disk.deleted_versions.lock().clone();
        assert!(deleted.contains(&(0, 1, 1)), "{:?}", deleted);
        assert!(deleted.contains(&(1, 1, 1)), "{:?}", deleted);
        assert!(scenario.disk.written_versions().is_empty());

        assert_eq!(scenario.memory.usage(), usage_before);
        let version = scenario.shard.archive_store().read();
        assert_eq!(version.archiving_cutoff(), 0);
        assert!(version.batches().is_empty());
        drop(version);
        assert_eq!(
            scenario.meta.shard_metadata(TABLE, SHARD).unwrap().archiving_cutoff,
            0
        );
        assert_eq!(scenario.shard.live_store().batch_ids(), live_before);

        // Both days land once the disk recovers
        *scenario.disk.fail_day.lock() = None;
        let outcome = scenario
            .shard
            .archive(TWO_DAY_CUTOFF, &key(), &NoopReporter)
            .unwrap();
        assert_eq!(outcome.affected_days, vec![0, 1]);
        assert_eq!(outcome.num_records, 3);
    }

    #[test]
    fn test_snapshot_ignores_concurrent_appends() {
        let scenario = archiving_scenario(BUDGET);
        let shard = Arc::new(
            archstore::storage::TableShard::new(
                trips_schema(),
                1,
                4,
                scenario.mem_store.deps().clone(),
            )
            .unwrap(),
        );
        let row = |time: u32| {
            [
                Some(DataValue::Uint32(time)),
                Some(DataValue::Bool(time % 2 == 0)),
                Some(DataValue::Float32(time as f32)),
            ]
        };
        for time in 1..=20 {
            shard.live_store().append_row(&row(time)).unwrap();
        }

        let writer = {
            let shard = Arc::clone(&shard);
            thread::spawn(move || {
                for time in 1000..1200 {
                    shard.live_store().append_row(&row(time)).unwrap();
                }
            })
        };
        let outcome = shard
            .archive(100, &JobKey::archiving(TABLE, 1), &NoopReporter)
            .unwrap();
        writer.join().unwrap();

        assert_eq!(outcome.num_records, 20);
        assert_eq!(shard.archive_store().read().batch(0).unwrap().size(), 20);

        let snapshot = shard.live_store().snapshot().unwrap();
        let late = snapshot
            .locators()
            .filter(|locator| {
                matches!(
                    snapshot.value(*locator, 0).unwrap(),
                    Some(DataValue::Uint32(t)) if t >= 1000
                )
            })
            .count();
        assert_eq!(late, 200);
    }

    /// Holds its key until the gate opens
    struct GateJob {
        open: Arc<std::sync::atomic::AtomicBool>,
    }

    impl Job for GateJob {
        fn key(&self) -> JobKey {
            key()
        }

        fn run(&self, _reporter: &dyn archstore::jobs::ProgressReporter) -> archstore::Result<()> {
            while !self.open.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_archiving_job_is_rejected() {
        let scenario = archiving_scenario(BUDGET);
        let manager = Arc::new(JobManager::new());
        let open = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let handle = manager
            .submit(Box::new(GateJob {
                open: Arc::clone(&open),
            }))
            .unwrap();
        assert!(manager.is_running(&key()));

        let err = manager.run(&job(&scenario, 140)).unwrap_err();
        assert!(matches!(err, ArchiveError::AlreadyRunning { .. }), "{:?}", err);
        assert_eq!(scenario.shard.archive_store().archiving_cutoff(), 100);

        open.store(true, Ordering::SeqCst);
        handle.await.unwrap().unwrap();
        assert!(!manager.is_running(&key()));

        manager.run(&job(&scenario, 140)).unwrap();
        let json = manager.to_json().unwrap();
        assert_eq!(json["trips|0|archiving"]["status"], "Succeeded");
        assert_eq!(json["trips|0|archiving"]["num_records"], 7);
        assert_eq!(json["trips|0|archiving"]["stage"], "complete");
    }
}
