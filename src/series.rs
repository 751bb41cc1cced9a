//! Slicing the snapshot down to the announcement series.
//!
//! The series is the configured set of question ids plus everything
//! hanging off them: answers, votes on both, comments, comment votes, and
//! every user who touched any of it. Participation and per-question user
//! breakdowns feed the stats report and the retention cohorts.

use crate::enrich::{EnrichedComment, EnrichedPost, EnrichedTables};
use crate::error::{PulseError, Result};
use crate::model::{vote_type, Dataset, User, Vote, MISSING_ID};
use crate::stats;
use serde::Serialize;
use std::collections::HashSet;

/// The series-restricted view of the snapshot.
#[derive(Debug, Clone)]
pub struct SeriesSlice {
    pub question_ids: Vec<i64>,
    pub posts: Vec<EnrichedPost>,
    pub post_votes: Vec<Vote>,
    pub comments: Vec<EnrichedComment>,
    pub comment_votes: Vec<Vote>,
    pub users: Vec<User>,
}

/// Distinct-user participation counts by role.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ParticipantCounts {
    pub total: usize,
    pub askers: usize,
    pub answer_givers: usize,
    pub post_voters: usize,
    pub bookmarkers: usize,
    pub commentators: usize,
    pub comment_voters: usize,
}

/// Distinct-action counts for the series.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ActionCounts {
    pub questions: usize,
    pub answers: usize,
    pub post_votes: usize,
    pub bookmarks_follows: usize,
    pub comments: usize,
    pub comment_votes: usize,
}

/// User ids touching one question, with repetition (a user answering
/// twice appears twice); callers dedupe as needed.
#[derive(Debug, Clone, Default)]
pub struct QuestionUsers {
    /// Everyone: content plus voters.
    pub all: Vec<i64>,
    /// Answer givers and commentators (question and answers).
    pub content: Vec<i64>,
    /// Post voters and comment voters (question and answers).
    pub voters: Vec<i64>,
}

/// Share of a question's downvoters who also posted content on it.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DownvoterShare {
    pub downvoters: usize,
    pub percent: f64,
}

/// Trimmed reputation stats of a question's downvoters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DownvoterReputation {
    pub mean: f64,
    pub median: f64,
}

impl SeriesSlice {
    /// Restrict the enriched snapshot to the series questions.
    #[must_use]
    pub fn build(tables: &EnrichedTables, dataset: &Dataset, question_ids: &[i64]) -> Self {
        let wanted: HashSet<i64> = question_ids.iter().copied().collect();

        let posts: Vec<EnrichedPost> = tables
            .posts
            .iter()
            .filter(|p| {
                wanted.contains(&p.id) || p.parent_id.is_some_and(|parent| wanted.contains(&parent))
            })
            .cloned()
            .collect();
        let post_ids: HashSet<i64> = posts.iter().map(|p| p.id).collect();

        let post_votes: Vec<Vote> = dataset
            .post_votes
            .iter()
            .filter(|v| post_ids.contains(&v.post_id))
            .cloned()
            .collect();

        let comments: Vec<EnrichedComment> = tables
            .comments
            .iter()
            .filter(|c| post_ids.contains(&c.post_id))
            .cloned()
            .collect();
        let comment_ids: HashSet<i64> = comments.iter().map(|c| c.id).collect();

        let comment_votes: Vec<Vote> = dataset
            .comment_votes
            .iter()
            .filter(|v| comment_ids.contains(&v.post_id))
            .cloned()
            .collect();

        let mut touching: HashSet<i64> = HashSet::new();
        touching.extend(posts.iter().filter_map(|p| p.owner_user_id));
        touching.extend(comments.iter().map(|c| c.user_id));
        touching.extend(post_votes.iter().map(|v| v.user_id));
        touching.extend(comment_votes.iter().map(|v| v.user_id));

        let users: Vec<User> = tables
            .users
            .iter()
            .filter(|u| touching.contains(&u.id))
            .cloned()
            .collect();

        Self {
            question_ids: question_ids.to_vec(),
            posts,
            post_votes,
            comments,
            comment_votes,
            users,
        }
    }

    /// Employee-authored questions of the series, sorted by creation date.
    /// This is the order the "Q #n" serial numbering follows.
    #[must_use]
    pub fn employee_questions(&self) -> Vec<&EnrichedPost> {
        let mut questions: Vec<&EnrichedPost> = self
            .posts
            .iter()
            .filter(|p| p.is_question() && p.owner_is_employee())
            .collect();
        questions.sort_by_key(|p| p.creation_date);
        questions
    }

    /// Unique users participating in the series, by role.
    #[must_use]
    pub fn participant_counts(&self) -> ParticipantCounts {
        let distinct = |ids: &mut dyn Iterator<Item = i64>| ids.collect::<HashSet<i64>>().len();

        ParticipantCounts {
            total: self.users.iter().map(|u| u.id).collect::<HashSet<_>>().len(),
            askers: distinct(
                &mut self
                    .posts
                    .iter()
                    .filter(|p| p.is_question())
                    .filter_map(|p| p.owner_user_id),
            ),
            answer_givers: distinct(
                &mut self
                    .posts
                    .iter()
                    .filter(|p| p.post_type_id == crate::model::Post::ANSWER)
                    .filter_map(|p| p.owner_user_id),
            ),
            post_voters: distinct(
                &mut self
                    .post_votes
                    .iter()
                    .filter(|v| [vote_type::UP, vote_type::DOWN].contains(&v.vote_type_id))
                    .map(|v| v.user_id),
            ),
            bookmarkers: distinct(
                &mut self
                    .post_votes
                    .iter()
                    .filter(|v| [vote_type::BOOKMARK, vote_type::FOLLOW].contains(&v.vote_type_id))
                    .map(|v| v.user_id),
            ),
            commentators: distinct(&mut self.comments.iter().map(|c| c.user_id)),
            comment_voters: distinct(&mut self.comment_votes.iter().map(|v| v.user_id)),
        }
    }

    /// Distinct actions taken in the series.
    #[must_use]
    pub fn action_counts(&self) -> ActionCounts {
        let distinct = |ids: &mut dyn Iterator<Item = i64>| ids.collect::<HashSet<i64>>().len();

        ActionCounts {
            questions: distinct(
                &mut self.posts.iter().filter(|p| p.is_question()).map(|p| p.id),
            ),
            answers: distinct(
                &mut self
                    .posts
                    .iter()
                    .filter(|p| p.post_type_id == crate::model::Post::ANSWER)
                    .map(|p| p.id),
            ),
            post_votes: distinct(
                &mut self
                    .post_votes
                    .iter()
                    .filter(|v| [vote_type::UP, vote_type::DOWN].contains(&v.vote_type_id))
                    .map(|v| v.id),
            ),
            bookmarks_follows: distinct(
                &mut self
                    .post_votes
                    .iter()
                    .filter(|v| [vote_type::BOOKMARK, vote_type::FOLLOW].contains(&v.vote_type_id))
                    .map(|v| v.id),
            ),
            comments: distinct(&mut self.comments.iter().map(|c| c.id)),
            comment_votes: distinct(&mut self.comment_votes.iter().map(|v| v.id)),
        }
    }

    fn commentators_of(&self, post_id: i64) -> impl Iterator<Item = i64> + '_ {
        self.comments
            .iter()
            .filter(move |c| c.post_id == post_id)
            .map(|c| c.user_id)
    }

    fn post_voters_of(&self, post_id: i64) -> impl Iterator<Item = i64> + '_ {
        self.post_votes
            .iter()
            .filter(move |v| v.post_id == post_id)
            .map(|v| v.user_id)
    }

    fn comment_voters_of(&self, post_id: i64) -> Vec<i64> {
        let comment_ids: HashSet<i64> = self
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .map(|c| c.id)
            .collect();
        self.comment_votes
            .iter()
            .filter(|v| comment_ids.contains(&v.post_id))
            .map(|v| v.user_id)
            .collect()
    }

    /// Everyone who touched a question: answer givers, commentators and
    /// voters on the question and on all of its answers.
    #[must_use]
    pub fn question_users(&self, question_id: i64) -> QuestionUsers {
        let answers: Vec<i64> = self
            .posts
            .iter()
            .filter(|p| p.parent_id == Some(question_id))
            .map(|p| p.id)
            .collect();

        let mut content: Vec<i64> = self
            .posts
            .iter()
            .filter(|p| p.parent_id == Some(question_id))
            .filter_map(|p| p.owner_user_id)
            .collect();
        content.extend(self.commentators_of(question_id));

        let mut voters: Vec<i64> = self.post_voters_of(question_id).collect();
        voters.extend(self.comment_voters_of(question_id));

        for &answer_id in &answers {
            content.extend(self.commentators_of(answer_id));
            voters.extend(self.post_voters_of(answer_id));
            voters.extend(self.comment_voters_of(answer_id));
        }

        let mut all = content.clone();
        all.extend(voters.iter().copied());

        QuestionUsers {
            all,
            content,
            voters,
        }
    }

    /// Distinct downvoters of a question (vote type 3, on the question
    /// post itself).
    #[must_use]
    pub fn downvoters_of(&self, question_id: i64) -> HashSet<i64> {
        self.post_votes
            .iter()
            .filter(|v| v.post_id == question_id && v.vote_type_id == vote_type::DOWN)
            .map(|v| v.user_id)
            .collect()
    }

    /// Percentage of a question's downvoters who also posted an answer or
    /// a comment on it.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::ZeroTotal`] when the question has no
    /// downvoters — the share is undefined, not zero.
    #[allow(clippy::cast_precision_loss)]
    pub fn downvoter_content_share(&self, question_id: i64) -> Result<DownvoterShare> {
        let downvoters = self.downvoters_of(question_id);
        if downvoters.is_empty() {
            return Err(PulseError::zero_total(format!(
                "downvoter share for question {question_id}"
            )));
        }

        let content: HashSet<i64> = self
            .question_users(question_id)
            .content
            .into_iter()
            .collect();
        let overlap = downvoters.intersection(&content).count();

        Ok(DownvoterShare {
            downvoters: downvoters.len(),
            percent: overlap as f64 / downvoters.len() as f64 * 100.0,
        })
    }

    /// Mean and median reputation of a question's downvoters, with
    /// reputations at or above the 95th percentile trimmed out.
    /// `None` when nothing remains after the trim.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn downvoter_reputation(&self, question_id: i64) -> Option<DownvoterReputation> {
        let downvoters = self.downvoters_of(question_id);
        let reputations: Vec<f64> = self
            .users
            .iter()
            .filter(|u| downvoters.contains(&u.id))
            .map(|u| u.reputation as f64)
            .collect();
        if reputations.is_empty() {
            return None;
        }

        let cap = stats::quantile(&reputations, 0.95);
        let trimmed: Vec<f64> = reputations.into_iter().filter(|&r| r < cap).collect();

        Some(DownvoterReputation {
            mean: stats::mean(&trimmed)?,
            median: stats::median(&trimmed)?,
        })
    }

    /// Account ids of everyone who participated in the series (content or
    /// votes). Missing-account sentinels are excluded.
    #[must_use]
    pub fn participant_accounts(&self) -> HashSet<i64> {
        self.users
            .iter()
            .filter(|u| u.account_id != MISSING_ID)
            .map(|u| u.account_id)
            .collect()
    }
}
