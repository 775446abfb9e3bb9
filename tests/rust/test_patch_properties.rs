//! Property tests for patch creation, sorting and merging

use super::common::*;

#[cfg(test)]
mod patch_property_tests {
    use super::*;
    use archstore::core::{day_of, DataValue};
    use archstore::jobs::{JobKey, NoopReporter};
    use archstore::storage::archive::merge;
    use archstore::storage::{
        BudgetedHostMemory, HostMemoryManager, LiveStore, VersionedColumnStore,
    };
    use proptest::collection::vec;
    use proptest::option;
    use proptest::prelude::*;
    use std::sync::Arc;

    const THREE_DAYS: u32 = 3 * 86_400;

    /// Few distinct fares so that equal sort keys are common
    fn row_in(times: std::ops::Range<u32>) -> impl Strategy<Value = TripRow> {
        (times, option::of(any::<bool>()), option::of(0u8..4))
            .prop_map(|(time, flag, fare)| (time, flag, fare.map(|f| f32::from(f) * 0.5)))
    }

    fn live_store(rows: &[TripRow]) -> LiveStore {
        let store = LiveStore::new(trips_schema().value_types(), 7);
        for row in rows {
            store.append_row(&trip_values(row)).unwrap();
        }
        store
    }

    fn time_of(value: Option<DataValue>) -> u32 {
        value.and_then(|v| v.as_u32()).unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_patches_cover_window_sorted_and_stable(
            rows in vec(row_in(0..THREE_DAYS), 0..60),
            a in 0..THREE_DAYS,
            b in 0..THREE_DAYS,
        ) {
            let (old_cutoff, new_cutoff) = (a.min(b), a.max(b));
            let snapshot = Arc::new(live_store(&rows).snapshot().unwrap());
            let patches = snapshot
                .create_archiving_patches(
                    new_cutoff,
                    old_cutoff,
                    &[1, 2],
                    &NoopReporter,
                    &JobKey::archiving(TABLE, SHARD),
                )
                .unwrap();

            let in_window = rows
                .iter()
                .filter(|r| r.0 > old_cutoff && r.0 <= new_cutoff)
                .count();
            prop_assert_eq!(patches.num_records, in_window);

            let mut total = 0;
            for (day, mut patch) in patches.by_day {
                patch.sort().unwrap();
                let keys = patch.sorted_keys().unwrap().to_vec();
                let locators = patch.record_ids().to_vec();
                for (i, locator) in locators.iter().enumerate() {
                    let time = time_of(snapshot.value(*locator, 0).unwrap());
                    prop_assert!(time > old_cutoff && time <= new_cutoff);
                    prop_assert_eq!(day_of(time), day);
                    if i == 0 {
                        continue;
                    }
                    prop_assert!(keys[i - 1] <= keys[i]);
                    if keys[i - 1] == keys[i] {
                        let prev = locators[i - 1];
                        prop_assert!((prev.batch, prev.offset) < (locator.batch, locator.offset));
                    }
                }
                total += patch.len();
            }
            prop_assert_eq!(total, in_window);
        }

        #[test]
        fn prop_merge_keeps_rows_sorted(
            mut base_rows in vec(row_in(0..1_000), 0..30),
            live_rows in vec(row_in(1_001..2_000), 1..30),
        ) {
            let schema = trips_schema();
            let memory: Arc<dyn HostMemoryManager> = Arc::new(BudgetedHostMemory::new(1 << 20));
            base_rows.sort_by(|x, y| trip_key(x).cmp(&trip_key(y)));
            let base = if base_rows.is_empty() {
                None
            } else {
                Some(
                    VersionedColumnStore::new(
                        0,
                        3,
                        trip_columns(&base_rows),
                        &schema.archiving_sort_columns,
                        &memory,
                    )
                    .unwrap(),
                )
            };

            let snapshot = Arc::new(live_store(&live_rows).snapshot().unwrap());
            let mut patches = snapshot
                .create_archiving_patches(
                    2_000,
                    1_000,
                    &schema.archiving_sort_columns,
                    &NoopReporter,
                    &JobKey::archiving(TABLE, SHARD),
                )
                .unwrap();
            let mut patch = patches.by_day.remove(&0).unwrap();
            patch.sort().unwrap();

            let merged = merge(base.as_ref(), &patch, &schema, 0, &memory).unwrap();
            prop_assert_eq!(merged.version(), if base.is_some() { 4 } else { 1 });
            prop_assert_eq!(merged.size() as usize, base_rows.len() + live_rows.len());

            let times = event_times(&merged);
            for row in 1..merged.size() as usize {
                let prev = merged.sort_key(row - 1, &schema.archiving_sort_columns).unwrap();
                let next = merged.sort_key(row, &schema.archiving_sort_columns).unwrap();
                prop_assert!(prev <= next);
                // Base rows come first among equal keys
                if prev == next {
                    prop_assert!(!(times[row - 1] > 1_000 && times[row] < 1_000));
                }
            }

            let mut expected: Vec<u32> = base_rows.iter().chain(&live_rows).map(|r| r.0).collect();
            expected.sort_unstable();
            let mut actual = times;
            actual.sort_unstable();
            prop_assert_eq!(actual, expected);
        }
    }
}
