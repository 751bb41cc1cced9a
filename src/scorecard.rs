//! Per-announcement scorecards.
//!
//! Each question in the series is graded three ways: an editorial
//! checklist filled in by hand, reach relative to the other announcements,
//! and the curated feedback sentiment. Grades are the traffic-light
//! red/yellow/green used in the review meetings.

use crate::enrich::{EnrichedPost, FeedbackPost};
use crate::error::{PulseError, Result};
use crate::model::Mood;
use itertools::Itertools;
use serde::Serialize;

/// Traffic-light grade.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Red,
    Yellow,
    Green,
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Red => write!(f, "red"),
            Self::Yellow => write!(f, "yellow"),
            Self::Green => write!(f, "green"),
        }
    }
}

/// Editorial checklist for an announcement post.
///
/// Seven yes/no criteria; the grade comes from the number of criteria met:
/// 6-7 green, 4-5 yellow, 3 or fewer red.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct Checklist {
    /// Told as a story rather than a feature list.
    pub story: bool,
    /// Sticks to a single theme.
    pub single_theme: bool,
    /// Shorter than one and a half pages.
    pub short: bool,
    /// Positively presented.
    pub positive: bool,
    /// Written from the user's perspective.
    pub user_perspective: bool,
    /// Ends with a clear call to action or question.
    pub clear_cta: bool,
    /// Easy to read.
    pub easy_to_read: bool,
}

impl Checklist {
    pub const MAX_SCORE: u32 = 7;

    /// Names accepted by [`Checklist::from_keys`], in field order.
    pub const KEYS: [&'static str; 7] = [
        "story",
        "single-theme",
        "short",
        "positive",
        "user-perspective",
        "clear-cta",
        "easy-to-read",
    ];

    const fn items(self) -> [bool; 7] {
        [
            self.story,
            self.single_theme,
            self.short,
            self.positive,
            self.user_perspective,
            self.clear_cta,
            self.easy_to_read,
        ]
    }

    /// Build from a list of met-criterion names (e.g. from the CLI).
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::InvalidArgument`] for an unknown name.
    pub fn from_keys<S: AsRef<str>>(keys: &[S]) -> Result<Self> {
        let mut checklist = Self::default();
        for key in keys {
            match key.as_ref() {
                "story" => checklist.story = true,
                "single-theme" => checklist.single_theme = true,
                "short" => checklist.short = true,
                "positive" => checklist.positive = true,
                "user-perspective" => checklist.user_perspective = true,
                "clear-cta" => checklist.clear_cta = true,
                "easy-to-read" => checklist.easy_to_read = true,
                other => {
                    return Err(PulseError::invalid_argument(format!(
                        "unknown checklist item '{}'; valid items: {}",
                        other,
                        Self::KEYS.join(", ")
                    )));
                }
            }
        }
        Ok(checklist)
    }

    /// Number of criteria met.
    #[must_use]
    pub fn score(self) -> u32 {
        self.items().iter().map(|&b| u32::from(b)).sum()
    }

    #[must_use]
    pub fn grade(self) -> Grade {
        match self.score() {
            6.. => Grade::Green,
            ..=3 => Grade::Red,
            _ => Grade::Yellow,
        }
    }
}

/// Reach of an announcement relative to its peers.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ReachGrade {
    pub grade: Grade,
    /// Percent of peer announcements with fewer page views.
    pub view_percentile: f64,
    /// Percent of peer announcements with less engagement.
    pub interest_percentile: f64,
}

/// Grade a question's reach against the other employee-authored
/// questions: the percentile of its page views and of its total
/// engagement. Both high is green, either below the median is red.
///
/// # Errors
///
/// Returns [`PulseError::QuestionNotFound`] when the id is not an
/// employee-authored question of the dataset.
#[allow(clippy::cast_precision_loss)]
pub fn reach_grade(posts: &[EnrichedPost], question_id: i64) -> Result<ReachGrade> {
    let peers: Vec<&EnrichedPost> = posts
        .iter()
        .filter(|p| p.is_question() && p.owner_is_employee())
        .collect();

    let subject = peers
        .iter()
        .find(|p| p.id == question_id)
        .ok_or(PulseError::QuestionNotFound { id: question_id })?;

    let percentile_of = |value: i64, field: fn(&EnrichedPost) -> i64| {
        let below = peers.iter().filter(|p| field(p) < value).count();
        below as f64 / peers.len() as f64 * 100.0
    };

    let view_percentile = percentile_of(subject.view_count, |p| p.view_count);
    let interest_percentile = percentile_of(subject.total_question_action_count, |p| {
        p.total_question_action_count
    });

    let grade = if (view_percentile >= 80.0 && interest_percentile > 50.0)
        || (view_percentile > 50.0 && interest_percentile >= 80.0)
    {
        Grade::Green
    } else if view_percentile < 50.0 || interest_percentile < 50.0 {
        Grade::Red
    } else {
        Grade::Yellow
    };

    Ok(ReachGrade {
        grade,
        view_percentile,
        interest_percentile,
    })
}

/// Sentiment shares of the curated feedback for one question.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FeedbackGrade {
    pub grade: Grade,
    pub positive_pct: f64,
    pub neutral_pct: f64,
    pub negative_pct: f64,
    /// Sum of feedback scores the shares are relative to.
    pub total_score: i64,
}

/// Grade the curated feedback: at least half the score weight positive is
/// green, at least half negative is red.
///
/// # Errors
///
/// Returns [`PulseError::ZeroTotal`] when the question's feedback scores
/// sum to zero (including the no-feedback case) — the shares are
/// undefined and the caller must treat the question as ungradable.
#[allow(clippy::cast_precision_loss)]
pub fn feedback_grade(feedback: &[FeedbackPost], question_id: i64) -> Result<FeedbackGrade> {
    let rows: Vec<&FeedbackPost> = feedback
        .iter()
        .filter(|f| f.feedback.question_id == question_id)
        .collect();

    let total: i64 = rows.iter().map(|f| f.feedback.score).sum();
    if total == 0 {
        return Err(PulseError::zero_total(format!(
            "feedback score share for question {question_id}"
        )));
    }

    let mood_sum = |mood: Mood| -> i64 {
        rows.iter()
            .filter(|f| f.feedback.mood == mood)
            .map(|f| f.feedback.score)
            .sum()
    };

    let share = |sum: i64| sum as f64 / total as f64 * 100.0;
    let positive_pct = share(mood_sum(Mood::Positive));
    let neutral_pct = share(mood_sum(Mood::Neutral));
    let negative_pct = share(mood_sum(Mood::Negative));

    let grade = if positive_pct >= 50.0 {
        Grade::Green
    } else if negative_pct >= 50.0 {
        Grade::Red
    } else {
        Grade::Yellow
    };

    Ok(FeedbackGrade {
        grade,
        positive_pct,
        neutral_pct,
        negative_pct,
        total_score: total,
    })
}

/// Score-weighted share of one feedback theme.
#[derive(Debug, Clone, Serialize)]
pub struct ThemeShare {
    pub theme: String,
    pub score: i64,
    pub percent: f64,
}

/// Aggregate feedback scores by theme for one question, as shares of the
/// question's total feedback score.
///
/// # Errors
///
/// Returns [`PulseError::ZeroTotal`] when the scores sum to zero, as in
/// [`feedback_grade`].
#[allow(clippy::cast_precision_loss)]
pub fn theme_breakdown(feedback: &[FeedbackPost], question_id: i64) -> Result<Vec<ThemeShare>> {
    let rows: Vec<&FeedbackPost> = feedback
        .iter()
        .filter(|f| f.feedback.question_id == question_id)
        .collect();

    let total: i64 = rows.iter().map(|f| f.feedback.score).sum();
    if total == 0 {
        return Err(PulseError::zero_total(format!(
            "theme share for question {question_id}"
        )));
    }

    let mut shares: Vec<ThemeShare> = rows
        .iter()
        .map(|f| (f.feedback.theme.clone(), f.feedback.score))
        .into_group_map()
        .into_iter()
        .map(|(theme, scores)| {
            let score: i64 = scores.iter().sum();
            ThemeShare {
                theme,
                score,
                percent: score as f64 / total as f64 * 100.0,
            }
        })
        .collect();
    shares.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.theme.cmp(&b.theme)));
    Ok(shares)
}
