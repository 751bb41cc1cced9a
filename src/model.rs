//! Data models for the meta-site dataset.
//!
//! These structures represent the normalized form of the community platform
//! export after parsing: posts, votes, comments, users, per-day activity
//! snapshots, and curated feedback rows.
//!
//! Missing user and account identifiers keep the `-1` sentinel from the
//! source system; roster membership and user-type comparisons rely on
//! plain integer semantics. Missing dates are `Option`s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Sentinel for a missing user or account id.
pub const MISSING_ID: i64 = -1;

/// `UserTypeId` value marking an employee/staff account.
pub const USER_TYPE_EMPLOYEE: i64 = 5;

/// Vote type ids used by the analysis.
pub mod vote_type {
    pub const UP: i64 = 2;
    pub const DOWN: i64 = 3;
    pub const BOOKMARK: i64 = 5;
    pub const FOLLOW: i64 = 21;
}

/// A question or answer on the meta site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    /// 1 = question, 2 = answer.
    pub post_type_id: i64,
    /// Question id this answer belongs to.
    pub parent_id: Option<i64>,
    pub owner_user_id: Option<i64>,
    pub title: Option<String>,
    pub creation_date: DateTime<Utc>,
    pub deletion_date: Option<DateTime<Utc>>,
    pub score: i64,
    pub view_count: i64,
}

impl Post {
    pub const QUESTION: i64 = 1;
    pub const ANSWER: i64 = 2;

    #[must_use]
    pub const fn is_question(&self) -> bool {
        self.post_type_id == Self::QUESTION
    }

    #[must_use]
    pub const fn is_answer(&self) -> bool {
        self.post_type_id == Self::ANSWER
    }
}

/// A vote on a post or on a comment.
///
/// Post votes and comment votes arrive in two tables of identical shape;
/// `post_id` holds the post id for the former and the comment id for the
/// latter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub vote_type_id: i64,
    pub creation_date: DateTime<Utc>,
    pub deletion_date: Option<DateTime<Utc>>,
    /// `-1` when the vote has no target user.
    pub target_user_id: i64,
}

/// A comment on a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    /// `-1` when the author is unknown.
    pub user_id: i64,
    /// Defaults to 0 when absent in the export.
    pub score: i64,
    pub creation_date: DateTime<Utc>,
    pub deletion_date: Option<DateTime<Utc>>,
}

/// A meta-site user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Network-wide account id; `-1` when missing.
    pub account_id: i64,
    pub display_name: Option<String>,
    pub reputation: i64,
    /// 5 marks an employee account (assigned from the employee roster).
    pub user_type_id: i64,
    /// Derived from the moderator roster by account id.
    pub is_moderator: bool,
    pub creation_date: Option<DateTime<Utc>>,
}

impl User {
    #[must_use]
    pub const fn is_employee(&self) -> bool {
        self.user_type_id == USER_TYPE_EMPLOYEE
    }
}

/// Per-user, per-day activity snapshot from the main site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyAction {
    pub on_date: DateTime<Utc>,
    /// `-1` when missing.
    pub user_id: i64,
    /// `-1` when missing.
    pub account_id: i64,
    pub questions: i64,
    pub answers: i64,
    pub comments: i64,
    pub edits: i64,
    pub accept_votes: i64,
    pub up_votes: i64,
    pub down_votes: i64,
    pub comment_votes: i64,
    pub close_votes: i64,
    pub reopen_votes: i64,
    pub other_flags: i64,
    pub reviews: i64,
}

/// Curated sentiment label on a feedback row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Positive,
    Neutral,
    Negative,
}

impl Mood {
    /// Parse a workbook cell. Only "positive" and "negative" are
    /// distinguished; anything else lands in the neutral bin.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "positive" => Self::Positive,
            "negative" => Self::Negative,
            _ => Self::Neutral,
        }
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Positive => write!(f, "positive"),
            Self::Neutral => write!(f, "neutral"),
            Self::Negative => write!(f, "negative"),
        }
    }
}

/// One manually curated feedback entry for an answer in the series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRow {
    /// Post id parsed from the Link column.
    pub answer_id: i64,
    /// Question the feedback sheet belongs to.
    pub question_id: i64,
    /// Free-text subject tag; blank is normalized to the literal "n/a".
    pub theme: String,
    pub mood: Mood,
    pub score: i64,
}

/// Snapshot metadata stored alongside the indexed dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub name: String,
    pub source: String,
    pub indexed_at: DateTime<Utc>,
}

/// Row counts and date bounds for the indexed snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub posts_count: i64,
    pub post_votes_count: i64,
    pub comments_count: i64,
    pub comment_votes_count: i64,
    pub users_count: i64,
    pub monthly_actions_count: i64,
    pub feedback_count: i64,
    pub first_post_date: Option<DateTime<Utc>>,
    pub last_post_date: Option<DateTime<Utc>>,
    pub indexed_at: DateTime<Utc>,
}

/// The full in-memory snapshot an analysis run operates on.
///
/// Loaded once per command, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub users: Vec<User>,
    pub posts: Vec<Post>,
    pub post_votes: Vec<Vote>,
    pub comments: Vec<Comment>,
    pub comment_votes: Vec<Vote>,
    pub monthly_actions: Vec<MonthlyAction>,
    pub feedback: Vec<FeedbackRow>,
    /// Account ids from the employee roster.
    pub employee_accounts: HashSet<i64>,
    /// Account ids from the moderator roster.
    pub moderator_accounts: HashSet<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(post_type_id: i64) -> Post {
        Post {
            id: 1,
            post_type_id,
            parent_id: None,
            owner_user_id: None,
            title: None,
            creation_date: Utc::now(),
            deletion_date: None,
            score: 0,
            view_count: 0,
        }
    }

    #[test]
    fn post_type_helpers() {
        assert!(post(Post::QUESTION).is_question());
        assert!(post(Post::ANSWER).is_answer());
        assert!(!post(Post::ANSWER).is_question());
        // Wiki and other exotic post types are neither.
        assert!(!post(4).is_question());
        assert!(!post(4).is_answer());
    }

    #[test]
    fn mood_parse_is_lenient() {
        assert_eq!(Mood::parse("Positive"), Mood::Positive);
        assert_eq!(Mood::parse(" negative "), Mood::Negative);
        assert_eq!(Mood::parse("neutral"), Mood::Neutral);
        assert_eq!(Mood::parse(""), Mood::Neutral);
        assert_eq!(Mood::parse("meh"), Mood::Neutral);
    }
}
