//! Engagement-point scoring and activity tiers for main-site users.
//!
//! One engagement point equals a question or an answer; comments and
//! edits are worth a fifth of a point, votes, flags and reviews a tenth.
//! Tiers are nested by construction since they are ascending thresholds
//! over the same score: Core ⊆ VeryEngaged ⊆ Engaged ⊆ Active.

use crate::model::MonthlyAction;
use serde::Serialize;
use std::collections::HashMap;

/// Weighted activity score for one per-day snapshot row.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn engagement_points(a: &MonthlyAction) -> f64 {
    let content = a.questions + a.answers;
    let curation = a.comments + a.edits;
    let votes = a.accept_votes
        + a.up_votes
        + a.down_votes
        + a.comment_votes
        + a.close_votes
        + a.reopen_votes
        + a.other_flags
        + a.reviews;

    content as f64 + 0.2 * curation as f64 + 0.1 * votes as f64
}

/// Activity tier thresholds on engagement points.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EngagementTier {
    /// Any action at all.
    Active,
    /// At least one engagement point.
    Engaged,
    /// At least ten points.
    VeryEngaged,
    /// At least a hundred points.
    Core,
}

impl EngagementTier {
    pub const ALL: [Self; 4] = [Self::Active, Self::Engaged, Self::VeryEngaged, Self::Core];

    /// Whether a point total clears this tier.
    #[must_use]
    pub fn matches(self, points: f64) -> bool {
        match self {
            Self::Active => points > 0.0,
            Self::Engaged => points >= 1.0,
            Self::VeryEngaged => points >= 10.0,
            Self::Core => points >= 100.0,
        }
    }
}

impl std::fmt::Display for EngagementTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Engaged => write!(f, "engaged"),
            Self::VeryEngaged => write!(f, "very engaged"),
            Self::Core => write!(f, "core"),
        }
    }
}

/// Distinct-user counts per tier, computed over summed points for the
/// whole snapshot.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TierCounts {
    pub active: u64,
    pub engaged: u64,
    pub very_engaged: u64,
    pub core: u64,
}

/// Sum engagement points per user and count how many users clear each
/// tier threshold.
#[must_use]
pub fn tier_counts(actions: &[MonthlyAction]) -> TierCounts {
    let mut per_user: HashMap<i64, f64> = HashMap::new();
    for a in actions {
        *per_user.entry(a.user_id).or_insert(0.0) += engagement_points(a);
    }

    let count = |tier: EngagementTier| {
        per_user.values().filter(|&&p| tier.matches(p)).count() as u64
    };

    TierCounts {
        active: count(EngagementTier::Active),
        engaged: count(EngagementTier::Engaged),
        very_engaged: count(EngagementTier::VeryEngaged),
        core: count(EngagementTier::Core),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn action(user_id: i64, questions: i64, comments: i64, up_votes: i64) -> MonthlyAction {
        MonthlyAction {
            on_date: Utc::now(),
            user_id,
            account_id: user_id,
            questions,
            answers: 0,
            comments,
            edits: 0,
            accept_votes: 0,
            up_votes,
            down_votes: 0,
            comment_votes: 0,
            close_votes: 0,
            reopen_votes: 0,
            other_flags: 0,
            reviews: 0,
        }
    }

    #[test]
    fn point_weights() {
        // One question plus five comments scores exactly two points.
        let a = action(1, 1, 5, 0);
        assert!((engagement_points(&a) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn vote_only_activity_is_active_but_not_engaged() {
        let a = action(1, 0, 0, 1);
        let p = engagement_points(&a);
        assert!(EngagementTier::Active.matches(p));
        assert!(!EngagementTier::Engaged.matches(p));
    }

    #[test]
    fn tiers_are_nested() {
        for points in [0.0, 0.1, 1.0, 9.9, 10.0, 99.9, 100.0, 500.0] {
            let mut previous = true;
            for tier in EngagementTier::ALL {
                let now = tier.matches(points);
                assert!(previous || !now, "tier {tier} broke nesting at {points}");
                previous = now;
            }
        }
    }

    #[test]
    fn tier_counts_sum_per_user() {
        let actions = vec![
            action(1, 60, 0, 0),
            action(1, 45, 0, 0), // user 1 totals 105 points
            action(2, 1, 0, 0),  // engaged
            action(3, 0, 0, 2),  // active only
        ];
        let counts = tier_counts(&actions);
        assert_eq!(counts.active, 3);
        assert_eq!(counts.engaged, 2);
        assert_eq!(counts.very_engaged, 1);
        assert_eq!(counts.core, 1);
    }
}
