//! Meta-site dataset parser.
//!
//! Reads the CSV export of the site database (one file per logical
//! entity) into typed records. Type corrections happen here, before
//! anything downstream sees the rows: date parsing, `-1` sentinels for
//! missing user/account ids, comment scores defaulting to 0, and
//! duplicate `(OnDate, UserId)` monthly-action rows discarded with the
//! first occurrence winning.

use crate::error::{PulseError, Result};
use crate::model::{
    Comment, Dataset, MonthlyAction, Post, User, Vote, MISSING_ID,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Parser for the dataset export directory.
pub struct DatasetParser {
    dataset_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawPost {
    #[serde(rename = "Id")]
    id: i64,
    #[serde(rename = "PostTypeId")]
    post_type_id: i64,
    #[serde(rename = "ParentId")]
    parent_id: Option<i64>,
    #[serde(rename = "OwnerUserId")]
    owner_user_id: Option<i64>,
    #[serde(rename = "Title")]
    title: Option<String>,
    #[serde(rename = "CreationDate")]
    creation_date: String,
    #[serde(rename = "DeletionDate")]
    deletion_date: Option<String>,
    #[serde(rename = "Score")]
    score: Option<i64>,
    #[serde(rename = "ViewCount")]
    view_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawVote {
    #[serde(rename = "Id")]
    id: i64,
    #[serde(rename = "PostId", alias = "PostCommentId")]
    post_id: i64,
    #[serde(rename = "UserId")]
    user_id: Option<i64>,
    #[serde(rename = "VoteTypeId")]
    vote_type_id: i64,
    #[serde(rename = "CreationDate")]
    creation_date: String,
    #[serde(rename = "DeletionDate")]
    deletion_date: Option<String>,
    #[serde(rename = "TargetUserId")]
    target_user_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    #[serde(rename = "Id")]
    id: i64,
    #[serde(rename = "PostId")]
    post_id: i64,
    #[serde(rename = "UserId")]
    user_id: Option<i64>,
    #[serde(rename = "Score")]
    score: Option<i64>,
    #[serde(rename = "CreationDate")]
    creation_date: String,
    #[serde(rename = "DeletionDate")]
    deletion_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    #[serde(rename = "Id")]
    id: i64,
    #[serde(rename = "AccountId")]
    account_id: Option<i64>,
    #[serde(rename = "DisplayName")]
    display_name: Option<String>,
    #[serde(rename = "Reputation")]
    reputation: Option<i64>,
    #[serde(rename = "UserTypeId")]
    user_type_id: Option<i64>,
    #[serde(rename = "CreationDate")]
    creation_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRosterEntry {
    #[serde(rename = "AccountId")]
    account_id: i64,
}

#[derive(Debug, Deserialize)]
struct RawMonthlyAction {
    #[serde(rename = "OnDate")]
    on_date: String,
    #[serde(rename = "UserId")]
    user_id: Option<i64>,
    #[serde(rename = "AccountId")]
    account_id: Option<i64>,
    #[serde(rename = "Questions")]
    questions: Option<i64>,
    #[serde(rename = "Answers")]
    answers: Option<i64>,
    #[serde(rename = "Comments")]
    comments: Option<i64>,
    #[serde(rename = "Edits")]
    edits: Option<i64>,
    #[serde(rename = "AcceptVotes")]
    accept_votes: Option<i64>,
    #[serde(rename = "UpVotes")]
    up_votes: Option<i64>,
    #[serde(rename = "DownVotes")]
    down_votes: Option<i64>,
    #[serde(rename = "CommentVotes")]
    comment_votes: Option<i64>,
    #[serde(rename = "CloseVotes")]
    close_votes: Option<i64>,
    #[serde(rename = "ReopenVotes")]
    reopen_votes: Option<i64>,
    #[serde(rename = "OtherFlags")]
    other_flags: Option<i64>,
    #[serde(rename = "Reviews")]
    reviews: Option<i64>,
}

impl DatasetParser {
    pub fn new(dataset_path: impl AsRef<Path>) -> Self {
        Self {
            dataset_path: dataset_path.as_ref().to_path_buf(),
        }
    }

    /// Name of the dataset, taken from the export directory.
    #[must_use]
    pub fn dataset_name(&self) -> String {
        self.dataset_path
            .file_name()
            .map_or_else(|| "dataset".to_string(), |n| n.to_string_lossy().into_owned())
    }

    fn read_records<T: serde::de::DeserializeOwned>(&self, filename: &str) -> Result<Vec<T>> {
        let path = self.dataset_path.join(filename);
        if !path.exists() {
            return Err(PulseError::MissingDatasetFile {
                file: filename.to_string(),
            });
        }
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|e| PulseError::parse_error(filename, e.to_string()))?;

        let mut records = Vec::new();
        for row in reader.deserialize() {
            let record: T = row.map_err(|e| PulseError::parse_error(filename, e.to_string()))?;
            records.push(record);
        }
        Ok(records)
    }

    /// Parse a timestamp as exported by the site database.
    fn parse_date(value: &str, filename: &str) -> Result<DateTime<Utc>> {
        Self::parse_date_opt(value).ok_or_else(|| PulseError::InvalidDate {
            value: value.to_string(),
            context: filename.to_string(),
        })
    }

    /// Lenient timestamp parsing: RFC 3339, the SQL export format, or a
    /// bare date.
    fn parse_date_opt(value: &str) -> Option<DateTime<Utc>> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f") {
            return Some(dt.and_utc());
        }
        if let Ok(d) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            return Some(d.and_hms_opt(0, 0, 0)?.and_utc());
        }
        None
    }

    fn optional_date(value: Option<&str>) -> Option<DateTime<Utc>> {
        value.and_then(Self::parse_date_opt)
    }

    /// Parse posts.csv.
    pub fn parse_posts(&self) -> Result<Vec<Post>> {
        info!("Parsing posts.csv...");
        let raw: Vec<RawPost> = self.read_records("posts.csv")?;
        let posts = raw
            .into_iter()
            .map(|p| {
                Ok(Post {
                    id: p.id,
                    post_type_id: p.post_type_id,
                    parent_id: p.parent_id,
                    owner_user_id: p.owner_user_id,
                    title: p.title.filter(|t| !t.is_empty()),
                    creation_date: Self::parse_date(&p.creation_date, "posts.csv")?,
                    deletion_date: Self::optional_date(p.deletion_date.as_deref()),
                    score: p.score.unwrap_or(0),
                    view_count: p.view_count.unwrap_or(0),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        info!("Parsed {} posts", posts.len());
        Ok(posts)
    }

    fn parse_votes(&self, filename: &str) -> Result<Vec<Vote>> {
        info!("Parsing {filename}...");
        let raw: Vec<RawVote> = self.read_records(filename)?;
        let votes = raw
            .into_iter()
            .map(|v| {
                Ok(Vote {
                    id: v.id,
                    post_id: v.post_id,
                    user_id: v.user_id.unwrap_or(MISSING_ID),
                    vote_type_id: v.vote_type_id,
                    creation_date: Self::parse_date(&v.creation_date, filename)?,
                    deletion_date: Self::optional_date(v.deletion_date.as_deref()),
                    target_user_id: v.target_user_id.unwrap_or(MISSING_ID),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        info!("Parsed {} rows from {filename}", votes.len());
        Ok(votes)
    }

    /// Parse post_votes.csv.
    pub fn parse_post_votes(&self) -> Result<Vec<Vote>> {
        self.parse_votes("post_votes.csv")
    }

    /// Parse comment_votes.csv (same shape, keyed by comment id).
    pub fn parse_comment_votes(&self) -> Result<Vec<Vote>> {
        self.parse_votes("comment_votes.csv")
    }

    /// Parse comments.csv.
    pub fn parse_comments(&self) -> Result<Vec<Comment>> {
        info!("Parsing comments.csv...");
        let raw: Vec<RawComment> = self.read_records("comments.csv")?;
        let comments = raw
            .into_iter()
            .map(|c| {
                Ok(Comment {
                    id: c.id,
                    post_id: c.post_id,
                    user_id: c.user_id.unwrap_or(MISSING_ID),
                    score: c.score.unwrap_or(0),
                    creation_date: Self::parse_date(&c.creation_date, "comments.csv")?,
                    deletion_date: Self::optional_date(c.deletion_date.as_deref()),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        info!("Parsed {} comments", comments.len());
        Ok(comments)
    }

    /// Parse users.csv. Roster tags are applied later by the join
    /// pipeline, so `is_moderator` starts out false here.
    pub fn parse_users(&self) -> Result<Vec<User>> {
        info!("Parsing users.csv...");
        let raw: Vec<RawUser> = self.read_records("users.csv")?;
        let users = raw
            .into_iter()
            .map(|u| User {
                id: u.id,
                account_id: u.account_id.unwrap_or(MISSING_ID),
                display_name: u.display_name.filter(|n| !n.is_empty()),
                reputation: u.reputation.unwrap_or(0),
                user_type_id: u.user_type_id.unwrap_or(2),
                is_moderator: false,
                creation_date: Self::optional_date(u.creation_date.as_deref()),
            })
            .collect::<Vec<_>>();
        info!("Parsed {} users", users.len());
        Ok(users)
    }

    /// Parse an account roster file (moderators.csv, employee_accounts.csv).
    pub fn parse_account_roster(&self, filename: &str) -> Result<HashSet<i64>> {
        info!("Parsing {filename}...");
        let raw: Vec<RawRosterEntry> = self.read_records(filename)?;
        let accounts: HashSet<i64> = raw.into_iter().map(|r| r.account_id).collect();
        info!("Parsed {} accounts from {filename}", accounts.len());
        Ok(accounts)
    }

    /// Parse monthly_actions.csv. The file is optional — a meta-only
    /// dataset simply has no main-site activity.
    pub fn parse_monthly_actions(&self) -> Result<Vec<MonthlyAction>> {
        if !self.dataset_path.join("monthly_actions.csv").exists() {
            warn!("monthly_actions.csv not found; main-site reports will be empty");
            return Ok(vec![]);
        }
        info!("Parsing monthly_actions.csv...");
        let raw: Vec<RawMonthlyAction> = self.read_records("monthly_actions.csv")?;

        let mut seen: HashSet<(i64, i64)> = HashSet::new();
        let mut actions = Vec::new();
        for a in raw {
            let on_date = Self::parse_date(&a.on_date, "monthly_actions.csv")?;
            let user_id = a.user_id.unwrap_or(MISSING_ID);
            // Duplicate (OnDate, UserId) rows: first occurrence wins.
            if !seen.insert((on_date.timestamp(), user_id)) {
                continue;
            }
            actions.push(MonthlyAction {
                on_date,
                user_id,
                account_id: a.account_id.unwrap_or(MISSING_ID),
                questions: a.questions.unwrap_or(0),
                answers: a.answers.unwrap_or(0),
                comments: a.comments.unwrap_or(0),
                edits: a.edits.unwrap_or(0),
                accept_votes: a.accept_votes.unwrap_or(0),
                up_votes: a.up_votes.unwrap_or(0),
                down_votes: a.down_votes.unwrap_or(0),
                comment_votes: a.comment_votes.unwrap_or(0),
                close_votes: a.close_votes.unwrap_or(0),
                reopen_votes: a.reopen_votes.unwrap_or(0),
                other_flags: a.other_flags.unwrap_or(0),
                reviews: a.reviews.unwrap_or(0),
            });
        }
        info!("Parsed {} monthly action rows", actions.len());
        Ok(actions)
    }

    /// Parse the full dataset (feedback is attached separately from the
    /// workbook export).
    pub fn parse_dataset(&self) -> Result<Dataset> {
        if !self.dataset_path.exists() {
            return Err(PulseError::dataset_not_found(&self.dataset_path));
        }

        Ok(Dataset {
            users: self.parse_users()?,
            posts: self.parse_posts()?,
            post_votes: self.parse_post_votes()?,
            comments: self.parse_comments()?,
            comment_votes: self.parse_comment_votes()?,
            monthly_actions: self.parse_monthly_actions()?,
            feedback: vec![],
            employee_accounts: self.parse_account_roster("employee_accounts.csv")?,
            moderator_accounts: self.parse_account_roster("moderators.csv")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn parse_date_formats() {
        assert!(DatasetParser::parse_date_opt("2023-06-01 12:30:45").is_some());
        assert!(DatasetParser::parse_date_opt("2023-06-01 12:30:45.123").is_some());
        assert!(DatasetParser::parse_date_opt("2023-06-01T12:30:45Z").is_some());
        assert!(DatasetParser::parse_date_opt("2023-06-01").is_some());
        assert!(DatasetParser::parse_date_opt("").is_none());
        assert!(DatasetParser::parse_date_opt("not a date").is_none());
    }

    #[test]
    fn comment_defaults_apply() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("comments.csv"),
            "Id,PostId,UserId,Score,CreationDate,DeletionDate\n\
             1,10,,,2023-06-01 10:00:00,\n\
             2,10,42,3,2023-06-02 10:00:00,2023-06-03 00:00:00\n",
        )
        .unwrap();

        let parser = DatasetParser::new(dir.path());
        let comments = parser.parse_comments().unwrap();
        assert_eq!(comments[0].user_id, MISSING_ID);
        assert_eq!(comments[0].score, 0);
        assert!(comments[0].deletion_date.is_none());
        assert_eq!(comments[1].user_id, 42);
        assert!(comments[1].deletion_date.is_some());
    }

    #[test]
    fn comment_votes_accept_post_comment_id_header() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("comment_votes.csv"),
            "Id,PostCommentId,UserId,VoteTypeId,CreationDate,DeletionDate,TargetUserId\n\
             1,77,5,2,2023-06-01 10:00:00,,\n",
        )
        .unwrap();

        let parser = DatasetParser::new(dir.path());
        let votes = parser.parse_comment_votes().unwrap();
        assert_eq!(votes[0].post_id, 77);
        assert_eq!(votes[0].target_user_id, MISSING_ID);
    }

    #[test]
    fn monthly_actions_dedup_first_wins() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("monthly_actions.csv"),
            "OnDate,UserId,AccountId,Questions,Answers,Comments,Edits,AcceptVotes,UpVotes,DownVotes,CommentVotes,CloseVotes,ReopenVotes,OtherFlags,Reviews\n\
             2023-06-01,7,70,1,0,0,0,0,0,0,0,0,0,0,0\n\
             2023-06-01,7,70,9,9,9,9,9,9,9,9,9,9,9,9\n\
             2023-06-02,7,70,0,1,0,0,0,0,0,0,0,0,0,0\n",
        )
        .unwrap();

        let parser = DatasetParser::new(dir.path());
        let actions = parser.parse_monthly_actions().unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].questions, 1, "first occurrence wins");
        assert_eq!(actions[1].answers, 1);
    }

    #[test]
    fn missing_monthly_actions_is_empty_not_error() {
        let dir = TempDir::new().unwrap();
        let parser = DatasetParser::new(dir.path());
        assert!(parser.parse_monthly_actions().unwrap().is_empty());
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let parser = DatasetParser::new(dir.path());
        assert!(matches!(
            parser.parse_posts(),
            Err(PulseError::MissingDatasetFile { .. })
        ));
    }
}
