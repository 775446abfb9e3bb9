//! Scheduler driving archiving jobs over hosted shards

use super::common::*;

#[cfg(test)]
mod job_scheduling_tests {
    use super::*;
    use archstore::core::SchedulerConfig;
    use archstore::jobs::{ArchiveStage, JobKey, JobStatus, Scheduler};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn delay_secs() -> i64 {
        i64::from(trips_schema().config.archiving_delay_minutes) * 60
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_scheduled_run_archives_up_to_delayed_cutoff() {
        let scenario = archiving_scenario(1 << 20);
        let scheduler = Scheduler::new(Arc::clone(&scenario.mem_store), SchedulerConfig::default());
        let now = Utc.timestamp_opt(delay_secs() + 140, 0).unwrap();

        let handles = scheduler.run_once(now);
        assert_eq!(handles.len(), 1);
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let detail = scheduler
            .job_manager()
            .get_job_detail(&JobKey::archiving(TABLE, SHARD))
            .unwrap();
        assert_eq!(detail.job.status, JobStatus::Succeeded);
        assert_eq!(detail.stage, ArchiveStage::Complete);
        assert_eq!(detail.job.num_records, 7);
        assert_eq!(detail.current_cutoff, 140);
        assert!(scenario.base_batch.is_released());

        // Inside the archiving interval the shard is not due again
        let later = Utc.timestamp_opt(delay_secs() + 200, 0).unwrap();
        assert!(scheduler.run_once(later).is_empty());
    }

    #[tokio::test]
    async fn test_nothing_due_before_the_published_cutoff() {
        let scenario = archiving_scenario(1 << 20);
        let scheduler = Scheduler::new(Arc::clone(&scenario.mem_store), SchedulerConfig::default());

        let now = Utc.timestamp_opt(delay_secs() + 100, 0).unwrap();
        assert!(scheduler.due_jobs(now).is_empty());
        assert!(scheduler.run_once(now).is_empty());
        assert_eq!(scenario.shard.archive_store().archiving_cutoff(), 100);
    }
}
