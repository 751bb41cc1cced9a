//! Trailing-window activity aggregation.
//!
//! For every distinct day present in a date-stamped event log, counts the
//! entities that had at least a threshold number of events inside the
//! trailing window ending that day. Days absent from the log produce no
//! output row; there is no calendar gap-filling.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// One day's rolling active-entity count.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ActiveCount {
    pub on_date: NaiveDate,
    pub value: u64,
}

/// Count, per distinct day in `events`, the entities with at least
/// `day_threshold` events in the half-open window `(day - period, day + 1]`
/// (days, i.e. the window ends at the midnight closing the given day).
///
/// `events` pairs a timestamp with an entity key. Timestamps are assigned
/// to their UTC calendar day. The result has one row per distinct day,
/// sorted ascending; an empty log yields an empty series.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn rolling_active_counts(
    events: &[(DateTime<Utc>, i64)],
    period: i64,
    day_threshold: u64,
) -> Vec<ActiveCount> {
    let days: BTreeSet<NaiveDate> = events.iter().map(|(ts, _)| ts.date_naive()).collect();

    days.into_iter()
        .map(|day| {
            let midnight = day.and_hms_opt(0, 0, 0).expect("midnight is valid").and_utc();
            let window_start = midnight - Duration::days(period);
            let window_end = midnight + Duration::days(1);

            let mut per_entity: HashMap<i64, u64> = HashMap::new();
            for (ts, entity) in events {
                if *ts > window_start && *ts <= window_end {
                    *per_entity.entry(*entity).or_insert(0) += 1;
                }
            }

            let value = per_entity.values().filter(|&&n| n >= day_threshold).count() as u64;
            ActiveCount {
                on_date: day,
                value,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 3, day, hour, 0, 0).single().unwrap()
    }

    #[test]
    fn empty_log_yields_empty_series() {
        assert!(rolling_active_counts(&[], 29, 1).is_empty());
    }

    #[test]
    fn one_row_per_distinct_day_sorted() {
        let events = vec![(at(5, 10), 1), (at(2, 9), 1), (at(5, 15), 2), (at(9, 1), 1)];
        let series = rolling_active_counts(&events, 0, 1);
        let days: Vec<u32> = series
            .iter()
            .map(|c| {
                use chrono::Datelike;
                c.on_date.day()
            })
            .collect();
        assert_eq!(days, vec![2, 5, 9]);
    }

    #[test]
    fn trailing_window_spans_previous_days() {
        // One event per day on three consecutive days, same entity.
        // With a 1-day trailing period, day 2's window covers days 1-2.
        let events = vec![(at(1, 10), 7), (at(2, 10), 7), (at(3, 10), 7)];
        let series = rolling_active_counts(&events, 1, 1);
        assert_eq!(series.len(), 3);
        assert_eq!(series[1].on_date, NaiveDate::from_ymd_opt(2023, 3, 2).unwrap());
        assert_eq!(series[1].value, 1);
    }

    #[test]
    fn threshold_filters_sparse_entities() {
        // Entity 1 acts twice in the window ending day 3, entity 2 once.
        let events = vec![(at(2, 10), 1), (at(3, 10), 1), (at(3, 12), 2)];
        let series = rolling_active_counts(&events, 1, 2);
        let day3 = series
            .iter()
            .find(|c| c.on_date == NaiveDate::from_ymd_opt(2023, 3, 3).unwrap())
            .unwrap();
        assert_eq!(day3.value, 1);
    }

    #[test]
    fn window_lower_bound_is_exclusive() {
        // period = 1, day = 3: window is (Mar 2 00:00, Mar 4 00:00].
        // An event exactly at Mar 2 00:00 is outside.
        let events = vec![(at(2, 0), 1), (at(3, 10), 2)];
        let series = rolling_active_counts(&events, 1, 1);
        let day3 = series
            .iter()
            .find(|c| c.on_date == NaiveDate::from_ymd_opt(2023, 3, 3).unwrap())
            .unwrap();
        assert_eq!(day3.value, 1);
    }
}
