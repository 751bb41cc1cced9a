//! Retention significance testing.
//!
//! Tests whether continued participation is associated with cohort
//! membership via a chi-square test of independence over a 2x2
//! contingency table. The observed table, the expected-frequency table,
//! and the statistic/p-value pair are returned together so a report can
//! show the raw counts alongside the verdict.

use crate::error::{PulseError, Result};
use crate::model::{MonthlyAction, MISSING_ID};
use crate::stats::chi_square_survival;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Number of observed cells minus one, minus the delta degrees of freedom:
/// 4 - 1 - 1 = 2.
const DEGREES_OF_FREEDOM: u32 = 2;

/// Observed 2x2 contingency table. Rows are the outcome (continued /
/// left), columns are the cohort (successful / unsuccessful).
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ContingencyTable {
    pub continued: [u64; 2],
    pub left: [u64; 2],
}

impl ContingencyTable {
    /// Column totals: cohort sizes.
    #[must_use]
    pub const fn col_totals(&self) -> [u64; 2] {
        [
            self.continued[0] + self.left[0],
            self.continued[1] + self.left[1],
        ]
    }

    /// Row totals: continued / left across both cohorts.
    #[must_use]
    pub const fn row_totals(&self) -> [u64; 2] {
        [
            self.continued[0] + self.continued[1],
            self.left[0] + self.left[1],
        ]
    }

    #[must_use]
    pub const fn grand_total(&self) -> u64 {
        self.continued[0] + self.continued[1] + self.left[0] + self.left[1]
    }
}

/// Result of the independence test.
#[derive(Debug, Clone, Serialize)]
pub struct RetentionTest {
    pub statistic: f64,
    pub p_value: f64,
    pub observed: ContingencyTable,
    /// Expected frequencies under independence, same row/column layout as
    /// the observed table.
    pub expected: [[f64; 2]; 2],
}

/// Run the chi-square independence test over two cohorts.
///
/// `continued` maps a record to its binary outcome. The statistic is
/// computed over the four observed cells `[s_yes, u_yes, s_no, u_no]`
/// against the matching expected frequencies
/// (`row_total * col_total / grand_total`).
///
/// # Errors
///
/// Returns [`PulseError::EmptyCohort`] when either cohort is empty and
/// [`PulseError::ZeroTotal`] when a row total is zero — both would put a
/// zero denominator under the expected-frequency computation, and the
/// caller is expected to guard rather than receive a NaN.
pub fn chi_square_independence<R, F>(
    successful: &[R],
    unsuccessful: &[R],
    continued: F,
) -> Result<RetentionTest>
where
    F: Fn(&R) -> bool,
{
    if successful.is_empty() {
        return Err(PulseError::EmptyCohort {
            cohort: "successful",
        });
    }
    if unsuccessful.is_empty() {
        return Err(PulseError::EmptyCohort {
            cohort: "unsuccessful",
        });
    }

    let count = |records: &[R]| {
        let yes = records.iter().filter(|r| continued(r)).count() as u64;
        (yes, records.len() as u64 - yes)
    };
    let (s_yes, s_no) = count(successful);
    let (u_yes, u_no) = count(unsuccessful);

    let observed = ContingencyTable {
        continued: [s_yes, u_yes],
        left: [s_no, u_no],
    };

    let rows = observed.row_totals();
    let cols = observed.col_totals();
    #[allow(clippy::cast_precision_loss)]
    let grand = observed.grand_total() as f64;

    if rows.contains(&0) {
        return Err(PulseError::zero_total("expected frequency"));
    }

    #[allow(clippy::cast_precision_loss)]
    let expected = [
        [
            rows[0] as f64 * cols[0] as f64 / grand,
            rows[0] as f64 * cols[1] as f64 / grand,
        ],
        [
            rows[1] as f64 * cols[0] as f64 / grand,
            rows[1] as f64 * cols[1] as f64 / grand,
        ],
    ];

    // f_obs = [s_yes, u_yes, s_no, u_no] against the matching cells.
    #[allow(clippy::cast_precision_loss)]
    let cells = [
        (s_yes as f64, expected[0][0]),
        (u_yes as f64, expected[0][1]),
        (s_no as f64, expected[1][0]),
        (u_no as f64, expected[1][1]),
    ];
    let statistic: f64 = cells
        .iter()
        .map(|(obs, exp)| (obs - exp).powi(2) / exp)
        .sum();

    Ok(RetentionTest {
        statistic,
        p_value: chi_square_survival(statistic, DEGREES_OF_FREEDOM),
        observed,
        expected,
    })
}

/// One account in the participation-retention population.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RetentionRecord {
    pub account_id: i64,
    /// Any main-site activity on or after the cutoff date.
    pub continued: bool,
}

/// Build the two cohorts for the participation hypothesis: main-site
/// accounts active before `cutoff`, split by whether they participated in
/// the series. The outcome is activity on or after the cutoff.
///
/// Missing-account sentinel rows are ignored; they cannot be matched
/// across sites.
#[must_use]
pub fn participation_cohorts(
    actions: &[MonthlyAction],
    participants: &HashSet<i64>,
    cutoff: DateTime<Utc>,
) -> (Vec<RetentionRecord>, Vec<RetentionRecord>) {
    // (seen before cutoff, seen on/after cutoff) per account.
    let mut activity: HashMap<i64, (bool, bool)> = HashMap::new();
    for a in actions {
        if a.account_id == MISSING_ID {
            continue;
        }
        let entry = activity.entry(a.account_id).or_insert((false, false));
        if a.on_date < cutoff {
            entry.0 = true;
        } else {
            entry.1 = true;
        }
    }

    let mut in_series = Vec::new();
    let mut outside = Vec::new();
    for (account_id, (before, after)) in activity {
        if !before {
            continue;
        }
        let record = RetentionRecord {
            account_id,
            continued: after,
        };
        if participants.contains(&account_id) {
            in_series.push(record);
        } else {
            outside.push(record);
        }
    }
    (in_series, outside)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Cohort with `yes` continued members and `no` departed ones.
    fn cohort(yes: usize, no: usize) -> Vec<bool> {
        let mut v = vec![true; yes];
        v.extend(std::iter::repeat_n(false, no));
        v
    }

    #[test]
    fn totals_and_expected_frequencies_agree() {
        let success = cohort(8, 2);
        let unsuccess = cohort(2, 8);
        let test = chi_square_independence(&success, &unsuccess, |r| *r).unwrap();

        assert_eq!(test.observed.grand_total(), 20);
        assert_eq!(test.observed.row_totals(), [10, 10]);
        assert_eq!(test.observed.col_totals(), [10, 10]);

        // Expected table reproduces the observed marginals.
        for row in 0..2 {
            let sum: f64 = test.expected[row].iter().sum();
            assert!((sum - test.observed.row_totals()[row] as f64).abs() < 1e-9);
        }
        for col in 0..2 {
            let sum: f64 = test.expected[0][col] + test.expected[1][col];
            assert!((sum - test.observed.col_totals()[col] as f64).abs() < 1e-9);
        }
    }

    #[test]
    fn known_statistic_and_p_value() {
        // All expected cells are 5; chi2 = 4 * (3^2 / 5) = 7.2.
        let test =
            chi_square_independence(&cohort(8, 2), &cohort(2, 8), |r| *r).unwrap();
        assert!((test.statistic - 7.2).abs() < 1e-9);
        assert!((test.p_value - (-3.6f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn independent_cohorts_score_zero() {
        let test =
            chi_square_independence(&cohort(5, 5), &cohort(5, 5), |r| *r).unwrap();
        assert!(test.statistic.abs() < 1e-12);
        assert!((test.p_value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_cohort_is_rejected() {
        let err = chi_square_independence(&[], &cohort(1, 1), |r: &bool| *r).unwrap_err();
        assert!(matches!(
            err,
            PulseError::EmptyCohort {
                cohort: "successful"
            }
        ));

        let err = chi_square_independence(&cohort(1, 1), &[], |r: &bool| *r).unwrap_err();
        assert!(matches!(
            err,
            PulseError::EmptyCohort {
                cohort: "unsuccessful"
            }
        ));
    }

    #[test]
    fn cohorts_split_on_participation_and_cutoff() {
        use chrono::TimeZone;
        let day = |d: u32| Utc.with_ymd_and_hms(2023, 5, d, 0, 0, 0).single().unwrap();
        let action = |account_id: i64, d: u32| MonthlyAction {
            on_date: day(d),
            user_id: account_id,
            account_id,
            questions: 1,
            answers: 0,
            comments: 0,
            edits: 0,
            accept_votes: 0,
            up_votes: 0,
            down_votes: 0,
            comment_votes: 0,
            close_votes: 0,
            reopen_votes: 0,
            other_flags: 0,
            reviews: 0,
        };

        let actions = vec![
            action(1, 1),
            action(1, 20), // participant, continued
            action(2, 2),  // participant, left
            action(3, 3),
            action(3, 25), // outsider, continued
            action(4, 28), // only active after the cutoff: not in population
            action(MISSING_ID, 1),
        ];
        let participants = HashSet::from([1, 2]);
        let (in_series, outside) = participation_cohorts(&actions, &participants, day(15));

        assert_eq!(in_series.len(), 2);
        assert_eq!(outside.len(), 1);
        assert_eq!(in_series.iter().filter(|r| r.continued).count(), 1);
        assert!(outside[0].continued);
        assert!(outside.iter().all(|r| r.account_id != 4));
    }

    #[test]
    fn degenerate_outcome_is_rejected() {
        // Nobody left: the "left" row total is zero.
        let err = chi_square_independence(&cohort(3, 0), &cohort(4, 0), |r| *r).unwrap_err();
        assert!(matches!(err, PulseError::ZeroTotal { .. }));
    }
}
