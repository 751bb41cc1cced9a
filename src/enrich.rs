//! Derived-metrics join pipeline.
//!
//! Turns the raw snapshot into enriched post and comment tables carrying
//! the per-post engagement counts. The steps run in a fixed order because
//! later counts are sums over earlier ones:
//!
//! 1. tag users from the employee and moderator rosters
//! 2. votes per comment
//! 3. votes per post
//! 4. comments per post
//! 5. comment votes rolled up per post
//! 6. `post_action_count` = 3 + 4 + 5
//! 7. answers per question
//! 8. answers' action counts rolled up per question
//! 9. `total_question_action_count` = 6 + 8, zeroed for non-questions
//! 10. owner attributes joined onto each post
//! 11. curated feedback inner-joined by answer id
//!
//! Every count join defaults a missing match to 0 before any arithmetic.
//! The pipeline never mutates its input and is idempotent over a static
//! snapshot.

use crate::model::{Comment, Dataset, FeedbackRow, Post, User, Vote};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// A comment with its derived vote count.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedComment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub score: i64,
    pub creation_date: DateTime<Utc>,
    pub comment_vote_count: i64,
}

/// A post with all derived engagement counts and owner attributes.
///
/// Counts are always present (0 on a join miss); owner attributes are
/// `None` when the owner is unknown or absent from the users table.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedPost {
    pub id: i64,
    pub post_type_id: i64,
    pub parent_id: Option<i64>,
    pub owner_user_id: Option<i64>,
    pub title: Option<String>,
    pub creation_date: DateTime<Utc>,
    pub deletion_date: Option<DateTime<Utc>>,
    pub score: i64,
    pub view_count: i64,
    pub post_vote_count: i64,
    pub post_comment_count: i64,
    pub post_comment_vote_count: i64,
    pub answer_count: i64,
    pub post_action_count: i64,
    pub all_answers_action_count: i64,
    pub total_question_action_count: i64,
    pub owner_user_type_id: Option<i64>,
    pub owner_reputation: Option<i64>,
    pub owner_is_moderator: Option<bool>,
}

impl EnrichedPost {
    #[must_use]
    pub const fn is_question(&self) -> bool {
        self.post_type_id == Post::QUESTION
    }

    #[must_use]
    pub fn owner_is_employee(&self) -> bool {
        self.owner_user_type_id == Some(crate::model::USER_TYPE_EMPLOYEE)
    }
}

/// An enriched post paired with one curated feedback row (inner join on
/// `post.id == feedback.answer_id`; posts without feedback are dropped
/// from this table only).
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackPost {
    pub post: EnrichedPost,
    pub feedback: FeedbackRow,
}

/// Output of the join pipeline.
#[derive(Debug, Clone)]
pub struct EnrichedTables {
    /// Users with roster tags applied.
    pub users: Vec<User>,
    pub posts: Vec<EnrichedPost>,
    pub comments: Vec<EnrichedComment>,
    pub feedback: Vec<FeedbackPost>,
}

/// Apply roster tags: employee accounts get the employee user type,
/// moderator accounts get the moderator flag. Both tags may apply.
pub fn tag_users(
    users: &mut [User],
    employee_accounts: &HashSet<i64>,
    moderator_accounts: &HashSet<i64>,
) {
    for user in users {
        if employee_accounts.contains(&user.account_id) {
            user.user_type_id = crate::model::USER_TYPE_EMPLOYEE;
        }
        if moderator_accounts.contains(&user.account_id) {
            user.is_moderator = true;
        }
    }
}

/// Count distinct record ids per key.
#[allow(clippy::cast_possible_wrap)]
fn distinct_counts<I>(pairs: I) -> HashMap<i64, i64>
where
    I: IntoIterator<Item = (i64, i64)>,
{
    let mut seen: HashMap<i64, HashSet<i64>> = HashMap::new();
    for (key, id) in pairs {
        seen.entry(key).or_default().insert(id);
    }
    seen.into_iter().map(|(k, s)| (k, s.len() as i64)).collect()
}

/// Run the full pipeline over a snapshot.
#[must_use]
pub fn enrich(dataset: &Dataset) -> EnrichedTables {
    let mut users = dataset.users.clone();
    tag_users(
        &mut users,
        &dataset.employee_accounts,
        &dataset.moderator_accounts,
    );

    let comments = enrich_comments(&dataset.comments, &dataset.comment_votes);
    let posts = enrich_posts(&dataset.posts, &dataset.post_votes, &comments, &users);
    let feedback = join_feedback(&posts, &dataset.feedback);

    EnrichedTables {
        users,
        posts,
        comments,
        feedback,
    }
}

/// Steps 2: attach per-comment vote counts.
#[must_use]
pub fn enrich_comments(comments: &[Comment], comment_votes: &[Vote]) -> Vec<EnrichedComment> {
    let vote_counts = distinct_counts(comment_votes.iter().map(|v| (v.post_id, v.id)));

    comments
        .iter()
        .map(|c| EnrichedComment {
            id: c.id,
            post_id: c.post_id,
            user_id: c.user_id,
            score: c.score,
            creation_date: c.creation_date,
            comment_vote_count: vote_counts.get(&c.id).copied().unwrap_or(0),
        })
        .collect()
}

/// Steps 3-10: per-post counts, answer rollups, owner attributes.
#[must_use]
pub fn enrich_posts(
    posts: &[Post],
    post_votes: &[Vote],
    comments: &[EnrichedComment],
    users: &[User],
) -> Vec<EnrichedPost> {
    let vote_counts = distinct_counts(post_votes.iter().map(|v| (v.post_id, v.id)));
    let comment_counts = distinct_counts(comments.iter().map(|c| (c.post_id, c.id)));

    let mut comment_vote_sums: HashMap<i64, i64> = HashMap::new();
    for c in comments {
        *comment_vote_sums.entry(c.post_id).or_insert(0) += c.comment_vote_count;
    }

    let answer_counts = distinct_counts(
        posts
            .iter()
            .filter(|p| p.is_answer())
            .filter_map(|p| p.parent_id.map(|parent| (parent, p.id))),
    );

    let users_by_id: HashMap<i64, &User> = users.iter().map(|u| (u.id, u)).collect();

    let mut enriched: Vec<EnrichedPost> = posts
        .iter()
        .map(|p| {
            let post_vote_count = vote_counts.get(&p.id).copied().unwrap_or(0);
            let post_comment_count = comment_counts.get(&p.id).copied().unwrap_or(0);
            let post_comment_vote_count = comment_vote_sums.get(&p.id).copied().unwrap_or(0);
            let owner = p.owner_user_id.and_then(|id| users_by_id.get(&id));

            EnrichedPost {
                id: p.id,
                post_type_id: p.post_type_id,
                parent_id: p.parent_id,
                owner_user_id: p.owner_user_id,
                title: p.title.clone(),
                creation_date: p.creation_date,
                deletion_date: p.deletion_date,
                score: p.score,
                view_count: p.view_count,
                post_vote_count,
                post_comment_count,
                post_comment_vote_count,
                answer_count: answer_counts.get(&p.id).copied().unwrap_or(0),
                post_action_count: post_vote_count + post_comment_count + post_comment_vote_count,
                all_answers_action_count: 0,
                total_question_action_count: 0,
                owner_user_type_id: owner.map(|u| u.user_type_id),
                owner_reputation: owner.map(|u| u.reputation),
                owner_is_moderator: owner.map(|u| u.is_moderator),
            }
        })
        .collect();

    // Step 8 needs every answer's post_action_count, so it runs as a
    // second pass over the freshly built rows.
    let mut answer_action_sums: HashMap<i64, i64> = HashMap::new();
    for p in &enriched {
        if p.post_type_id == Post::ANSWER {
            if let Some(parent) = p.parent_id {
                *answer_action_sums.entry(parent).or_insert(0) += p.post_action_count;
            }
        }
    }

    for p in &mut enriched {
        p.all_answers_action_count = answer_action_sums.get(&p.id).copied().unwrap_or(0);
        p.total_question_action_count = if p.post_type_id == Post::QUESTION {
            p.post_action_count + p.all_answers_action_count
        } else {
            0
        };
    }

    enriched
}

/// Step 11: inner join of posts and curated feedback on the answer id.
#[must_use]
pub fn join_feedback(posts: &[EnrichedPost], feedback: &[FeedbackRow]) -> Vec<FeedbackPost> {
    let posts_by_id: HashMap<i64, &EnrichedPost> = posts.iter().map(|p| (p.id, p)).collect();

    feedback
        .iter()
        .filter_map(|row| {
            posts_by_id.get(&row.answer_id).map(|post| FeedbackPost {
                post: (*post).clone(),
                feedback: row.clone(),
            })
        })
        .collect()
}
