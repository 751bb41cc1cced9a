//! Activity bucketing.
//!
//! Splits a population of event rows into ordered tiers by per-entity
//! activity count, using the IQR outlier rule to bound each tier. This
//! segregates extreme-low and extreme-high participants so the bulk of a
//! distribution can be compared without whales drowning it out.
//!
//! The split is a heuristic, not an equal-size partition: with a small or
//! already well-bounded population, later iterations can come out empty.

use crate::stats::quantile_sorted;
use std::collections::{HashMap, HashSet};

/// Sentinel meaning "no upper bound" on the final bucket.
pub const UNBOUNDED: i64 = -1;

/// One activity tier: the member rows plus the count range that selected
/// them.
#[derive(Debug, Clone)]
pub struct Bucket<R> {
    /// Event rows whose entity fell in this tier.
    pub rows: Vec<R>,
    /// Inclusive lower bound on the per-entity count.
    pub low: i64,
    /// Inclusive upper bound, or [`UNBOUNDED`] for the final bucket.
    pub high: i64,
    /// Number of distinct entities in this tier.
    pub total: usize,
}

impl<R> Bucket<R> {
    /// Human-readable range label, e.g. `[2; 14]` or `[15; ∞)`.
    #[must_use]
    pub fn range_label(&self) -> String {
        if self.high == UNBOUNDED {
            format!("[{}; ∞)", self.low)
        } else {
            format!("[{}; {}]", self.low, self.high)
        }
    }
}

/// Partition `rows` into `iterations + 1` ordered buckets by per-entity
/// row count.
///
/// Each iteration computes Q1/Q3 of the count distribution over the rows
/// not yet bucketed, takes `high = round(Q3 + 1.5 * IQR)`, and moves every
/// entity whose count lies in `[low, high]` into the current bucket. The
/// next iteration starts at `low = high + 1`. Whatever survives all
/// iterations forms a final unbounded bucket.
///
/// An empty remaining population stops the split early; the buckets
/// collected so far are returned as-is.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn split_into_buckets<R, F>(
    rows: Vec<R>,
    entity_key: F,
    iterations: usize,
    low_start: i64,
) -> Vec<Bucket<R>>
where
    F: Fn(&R) -> i64,
{
    let mut buckets = Vec::with_capacity(iterations + 1);
    let mut remaining = rows;
    let mut low = low_start;

    for _ in 0..iterations {
        if remaining.is_empty() {
            return buckets;
        }

        let counts = entity_counts(&remaining, &entity_key);
        #[allow(clippy::cast_precision_loss)]
        let mut values: Vec<f64> = counts.values().map(|&c| c as f64).collect();
        values.sort_unstable_by(|a, b| a.total_cmp(b));
        let q1 = quantile_sorted(&values, 0.25);
        let q3 = quantile_sorted(&values, 0.75);
        let high = (1.5f64.mul_add(q3 - q1, q3)).round() as i64;

        let selected: HashSet<i64> = counts
            .iter()
            .filter(|&(_, &c)| c >= low && c <= high)
            .map(|(&entity, _)| entity)
            .collect();

        let (members, rest): (Vec<R>, Vec<R>) = remaining
            .into_iter()
            .partition(|r| selected.contains(&entity_key(r)));

        buckets.push(Bucket {
            rows: members,
            low,
            high,
            total: selected.len(),
        });

        low = high + 1;
        remaining = rest;
    }

    let total = entity_counts(&remaining, &entity_key).len();
    buckets.push(Bucket {
        rows: remaining,
        low,
        high: UNBOUNDED,
        total,
    });

    buckets
}

fn entity_counts<R, F>(rows: &[R], entity_key: &F) -> HashMap<i64, i64>
where
    F: Fn(&R) -> i64,
{
    let mut counts: HashMap<i64, i64> = HashMap::new();
    for r in rows {
        *counts.entry(entity_key(r)).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    /// (entity, row id) event rows: `n` rows per entity.
    fn rows_for(entities: &[(i64, usize)]) -> Vec<(i64, usize)> {
        let mut rows = Vec::new();
        let mut next = 0;
        for &(entity, n) in entities {
            for _ in 0..n {
                rows.push((entity, next));
                next += 1;
            }
        }
        rows
    }

    #[test]
    fn outlier_is_segregated_into_final_bucket() {
        // Eight entities with one row each, one entity with a hundred:
        // Q1 = Q3 = 1, IQR = 0, so the first threshold is exactly 1.
        let mut population: Vec<(i64, usize)> = (1..=8).map(|e| (e, 1)).collect();
        population.push((9, 100));
        let rows = rows_for(&population);

        let buckets = split_into_buckets(rows, |r| r.0, 1, 0);
        assert_eq!(buckets.len(), 2);

        assert_eq!(buckets[0].low, 0);
        assert_eq!(buckets[0].high, 1);
        assert_eq!(buckets[0].total, 8);
        assert_eq!(buckets[0].rows.len(), 8);

        assert_eq!(buckets[1].low, 2);
        assert_eq!(buckets[1].high, UNBOUNDED);
        assert_eq!(buckets[1].total, 1);
        assert_eq!(buckets[1].rows.len(), 100);
        assert!(buckets[1].rows.iter().all(|r| r.0 == 9));
    }

    #[test]
    fn buckets_partition_the_population() {
        let rows = rows_for(&[(1, 2), (2, 3), (3, 1), (4, 40), (5, 7), (6, 2)]);
        let expected_len = rows.len();
        let mut ids: Vec<usize> = rows.iter().map(|r| r.1).collect();
        ids.sort_unstable();

        let buckets = split_into_buckets(rows, |r| r.0, 3, 0);

        let mut seen: Vec<usize> = buckets
            .iter()
            .flat_map(|b| b.rows.iter().map(|r| r.1))
            .collect();
        seen.sort_unstable();
        assert_eq!(seen.len(), expected_len);
        assert_eq!(seen, ids);
    }

    #[test]
    fn thresholds_are_strictly_increasing() {
        let rows = rows_for(&[(1, 1), (2, 2), (3, 3), (4, 5), (5, 8), (6, 30)]);
        let buckets = split_into_buckets(rows, |r| r.0, 2, 0);

        for pair in buckets.windows(2) {
            assert_eq!(pair[1].low, pair[0].high + 1);
            assert!(pair[1].low > pair[0].low);
        }
        assert_eq!(buckets.last().unwrap().high, UNBOUNDED);
    }

    #[test]
    fn empty_population_stops_early() {
        let buckets = split_into_buckets(Vec::<(i64, usize)>::new(), |r| r.0, 3, 0);
        assert!(buckets.is_empty());
    }

    #[test]
    fn fully_consumed_population_leaves_empty_final_bucket() {
        // Uniform counts: the first iteration swallows everyone.
        let rows = rows_for(&[(1, 2), (2, 2), (3, 2)]);
        let buckets = split_into_buckets(rows, |r| r.0, 1, 0);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].total, 3);
        assert!(buckets[1].rows.is_empty());
        assert_eq!(buckets[1].total, 0);
        assert_eq!(buckets[1].high, UNBOUNDED);
    }

    #[test]
    fn range_label_formats() {
        let b = Bucket::<()> {
            rows: vec![],
            low: 2,
            high: 14,
            total: 0,
        };
        assert_eq!(b.range_label(), "[2; 14]");
        let b = Bucket::<()> {
            rows: vec![],
            low: 15,
            high: UNBOUNDED,
            total: 0,
        };
        assert_eq!(b.range_label(), "[15; ∞)");
    }
}
