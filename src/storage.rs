//! `SQLite` snapshot storage.
//!
//! The `index` command parses the CSV export once and persists it here;
//! analysis commands load the snapshot back into memory. Only raw tables
//! are stored — derived metrics are recomputed by the join pipeline on
//! every run, so a snapshot can never carry stale derived columns.

use crate::error::{PulseError, Result};
use crate::model::{
    Comment, Dataset, DatasetInfo, DatasetStats, FeedbackRow, MonthlyAction, Mood, Post, User,
    Vote,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

const SCHEMA_VERSION: i32 = 1;

fn to_db_date(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn to_db_date_opt(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|d| d.to_rfc3339())
}

fn epoch_utc() -> DateTime<Utc> {
    DateTime::from_timestamp(0, 0).expect("epoch is a valid timestamp")
}

fn from_db_date(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).map_or_else(|_| epoch_utc(), |dt| dt.with_timezone(&Utc))
}

fn from_db_date_opt(value: Option<String>) -> Option<DateTime<Utc>> {
    value.as_deref().map(from_db_date)
}

/// `SQLite` snapshot manager.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())?;

        // Set pragmas for performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be initialized.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA temp_store = MEMORY;")?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    fn migrate(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version == SCHEMA_VERSION {
            return Ok(());
        }
        if version != 0 {
            return Err(PulseError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                found: version,
            });
        }

        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS dataset_info (
                name        TEXT NOT NULL,
                source      TEXT NOT NULL,
                indexed_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS posts (
                id              INTEGER PRIMARY KEY,
                post_type_id    INTEGER NOT NULL,
                parent_id       INTEGER,
                owner_user_id   INTEGER,
                title           TEXT,
                creation_date   TEXT NOT NULL,
                deletion_date   TEXT,
                score           INTEGER NOT NULL,
                view_count      INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS post_votes (
                id              INTEGER PRIMARY KEY,
                post_id         INTEGER NOT NULL,
                user_id         INTEGER NOT NULL,
                vote_type_id    INTEGER NOT NULL,
                creation_date   TEXT NOT NULL,
                deletion_date   TEXT,
                target_user_id  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS comment_votes (
                id              INTEGER PRIMARY KEY,
                post_id         INTEGER NOT NULL,
                user_id         INTEGER NOT NULL,
                vote_type_id    INTEGER NOT NULL,
                creation_date   TEXT NOT NULL,
                deletion_date   TEXT,
                target_user_id  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS comments (
                id              INTEGER PRIMARY KEY,
                post_id         INTEGER NOT NULL,
                user_id         INTEGER NOT NULL,
                score           INTEGER NOT NULL,
                creation_date   TEXT NOT NULL,
                deletion_date   TEXT
            );

            CREATE TABLE IF NOT EXISTS users (
                id              INTEGER PRIMARY KEY,
                account_id      INTEGER NOT NULL,
                display_name    TEXT,
                reputation      INTEGER NOT NULL,
                user_type_id    INTEGER NOT NULL,
                creation_date   TEXT
            );

            CREATE TABLE IF NOT EXISTS monthly_actions (
                on_date         TEXT NOT NULL,
                user_id         INTEGER NOT NULL,
                account_id      INTEGER NOT NULL,
                questions       INTEGER NOT NULL,
                answers         INTEGER NOT NULL,
                comments        INTEGER NOT NULL,
                edits           INTEGER NOT NULL,
                accept_votes    INTEGER NOT NULL,
                up_votes        INTEGER NOT NULL,
                down_votes      INTEGER NOT NULL,
                comment_votes   INTEGER NOT NULL,
                close_votes     INTEGER NOT NULL,
                reopen_votes    INTEGER NOT NULL,
                other_flags     INTEGER NOT NULL,
                reviews         INTEGER NOT NULL,
                PRIMARY KEY (on_date, user_id)
            );

            CREATE TABLE IF NOT EXISTS feedback (
                answer_id    INTEGER NOT NULL,
                question_id  INTEGER NOT NULL,
                theme        TEXT NOT NULL,
                mood         TEXT NOT NULL,
                score        INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS employee_accounts (
                account_id INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS moderator_accounts (
                account_id INTEGER PRIMARY KEY
            );

            CREATE INDEX IF NOT EXISTS idx_posts_parent ON posts(parent_id);
            CREATE INDEX IF NOT EXISTS idx_post_votes_post ON post_votes(post_id);
            CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id);
            CREATE INDEX IF NOT EXISTS idx_comment_votes_comment ON comment_votes(post_id);
            ",
        )?;
        self.conn
            .execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
        Ok(())
    }

    /// Store snapshot metadata, replacing any previous record.
    pub fn store_info(&mut self, info: &DatasetInfo) -> Result<()> {
        self.conn.execute("DELETE FROM dataset_info", [])?;
        self.conn.execute(
            "INSERT INTO dataset_info (name, source, indexed_at) VALUES (?1, ?2, ?3)",
            params![info.name, info.source, to_db_date(info.indexed_at)],
        )?;
        Ok(())
    }

    /// Load snapshot metadata, if any.
    pub fn get_info(&self) -> Result<Option<DatasetInfo>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, source, indexed_at FROM dataset_info LIMIT 1")?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(Some(DatasetInfo {
                name: row.get(0)?,
                source: row.get(1)?,
                indexed_at: from_db_date(&row.get::<_, String>(2)?),
            })),
            None => Ok(None),
        }
    }

    /// Store the full raw snapshot in one transaction.
    pub fn store_dataset(&mut self, dataset: &Dataset) -> Result<()> {
        let tx = self.conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO posts
                 (id, post_type_id, parent_id, owner_user_id, title, creation_date,
                  deletion_date, score, view_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for p in &dataset.posts {
                stmt.execute(params![
                    p.id,
                    p.post_type_id,
                    p.parent_id,
                    p.owner_user_id,
                    p.title,
                    to_db_date(p.creation_date),
                    to_db_date_opt(p.deletion_date),
                    p.score,
                    p.view_count,
                ])?;
            }

            let store_votes = |table: &str, votes: &[Vote]| -> Result<()> {
                let mut stmt = tx.prepare(&format!(
                    "INSERT OR REPLACE INTO {table}
                     (id, post_id, user_id, vote_type_id, creation_date, deletion_date,
                      target_user_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                ))?;
                for v in votes {
                    stmt.execute(params![
                        v.id,
                        v.post_id,
                        v.user_id,
                        v.vote_type_id,
                        to_db_date(v.creation_date),
                        to_db_date_opt(v.deletion_date),
                        v.target_user_id,
                    ])?;
                }
                Ok(())
            };
            store_votes("post_votes", &dataset.post_votes)?;
            store_votes("comment_votes", &dataset.comment_votes)?;

            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO comments
                 (id, post_id, user_id, score, creation_date, deletion_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for c in &dataset.comments {
                stmt.execute(params![
                    c.id,
                    c.post_id,
                    c.user_id,
                    c.score,
                    to_db_date(c.creation_date),
                    to_db_date_opt(c.deletion_date),
                ])?;
            }

            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO users
                 (id, account_id, display_name, reputation, user_type_id, creation_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for u in &dataset.users {
                stmt.execute(params![
                    u.id,
                    u.account_id,
                    u.display_name,
                    u.reputation,
                    u.user_type_id,
                    to_db_date_opt(u.creation_date),
                ])?;
            }

            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO monthly_actions
                 (on_date, user_id, account_id, questions, answers, comments, edits,
                  accept_votes, up_votes, down_votes, comment_votes, close_votes,
                  reopen_votes, other_flags, reviews)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            )?;
            for a in &dataset.monthly_actions {
                stmt.execute(params![
                    to_db_date(a.on_date),
                    a.user_id,
                    a.account_id,
                    a.questions,
                    a.answers,
                    a.comments,
                    a.edits,
                    a.accept_votes,
                    a.up_votes,
                    a.down_votes,
                    a.comment_votes,
                    a.close_votes,
                    a.reopen_votes,
                    a.other_flags,
                    a.reviews,
                ])?;
            }

            tx.execute("DELETE FROM feedback", [])?;
            let mut stmt = tx.prepare(
                "INSERT INTO feedback (answer_id, question_id, theme, mood, score)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for f in &dataset.feedback {
                stmt.execute(params![
                    f.answer_id,
                    f.question_id,
                    f.theme,
                    f.mood.to_string(),
                    f.score,
                ])?;
            }

            let store_roster = |table: &str, accounts: &HashSet<i64>| -> Result<()> {
                let mut stmt = tx.prepare(&format!(
                    "INSERT OR REPLACE INTO {table} (account_id) VALUES (?1)"
                ))?;
                for account in accounts {
                    stmt.execute(params![account])?;
                }
                Ok(())
            };
            store_roster("employee_accounts", &dataset.employee_accounts)?;
            store_roster("moderator_accounts", &dataset.moderator_accounts)?;
        }

        tx.commit()?;
        info!("Stored snapshot: {} posts", dataset.posts.len());
        Ok(())
    }

    /// Load the full raw snapshot back into memory.
    pub fn load_dataset(&self) -> Result<Dataset> {
        Ok(Dataset {
            users: self.load_users()?,
            posts: self.load_posts()?,
            post_votes: self.load_votes("post_votes")?,
            comments: self.load_comments()?,
            comment_votes: self.load_votes("comment_votes")?,
            monthly_actions: self.load_monthly_actions()?,
            feedback: self.load_feedback()?,
            employee_accounts: self.load_roster("employee_accounts")?,
            moderator_accounts: self.load_roster("moderator_accounts")?,
        })
    }

    fn load_posts(&self) -> Result<Vec<Post>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, post_type_id, parent_id, owner_user_id, title, creation_date,
                    deletion_date, score, view_count
             FROM posts ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Post {
                id: row.get(0)?,
                post_type_id: row.get(1)?,
                parent_id: row.get(2)?,
                owner_user_id: row.get(3)?,
                title: row.get(4)?,
                creation_date: from_db_date(&row.get::<_, String>(5)?),
                deletion_date: from_db_date_opt(row.get(6)?),
                score: row.get(7)?,
                view_count: row.get(8)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    fn load_votes(&self, table: &str) -> Result<Vec<Vote>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, post_id, user_id, vote_type_id, creation_date, deletion_date,
                    target_user_id
             FROM {table} ORDER BY id"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(Vote {
                id: row.get(0)?,
                post_id: row.get(1)?,
                user_id: row.get(2)?,
                vote_type_id: row.get(3)?,
                creation_date: from_db_date(&row.get::<_, String>(4)?),
                deletion_date: from_db_date_opt(row.get(5)?),
                target_user_id: row.get(6)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    fn load_comments(&self) -> Result<Vec<Comment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, post_id, user_id, score, creation_date, deletion_date
             FROM comments ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Comment {
                id: row.get(0)?,
                post_id: row.get(1)?,
                user_id: row.get(2)?,
                score: row.get(3)?,
                creation_date: from_db_date(&row.get::<_, String>(4)?),
                deletion_date: from_db_date_opt(row.get(5)?),
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    fn load_users(&self) -> Result<Vec<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, account_id, display_name, reputation, user_type_id, creation_date
             FROM users ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(User {
                id: row.get(0)?,
                account_id: row.get(1)?,
                display_name: row.get(2)?,
                reputation: row.get(3)?,
                user_type_id: row.get(4)?,
                is_moderator: false,
                creation_date: from_db_date_opt(row.get(5)?),
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    fn load_monthly_actions(&self) -> Result<Vec<MonthlyAction>> {
        let mut stmt = self.conn.prepare(
            "SELECT on_date, user_id, account_id, questions, answers, comments, edits,
                    accept_votes, up_votes, down_votes, comment_votes, close_votes,
                    reopen_votes, other_flags, reviews
             FROM monthly_actions ORDER BY on_date, user_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(MonthlyAction {
                on_date: from_db_date(&row.get::<_, String>(0)?),
                user_id: row.get(1)?,
                account_id: row.get(2)?,
                questions: row.get(3)?,
                answers: row.get(4)?,
                comments: row.get(5)?,
                edits: row.get(6)?,
                accept_votes: row.get(7)?,
                up_votes: row.get(8)?,
                down_votes: row.get(9)?,
                comment_votes: row.get(10)?,
                close_votes: row.get(11)?,
                reopen_votes: row.get(12)?,
                other_flags: row.get(13)?,
                reviews: row.get(14)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    fn load_feedback(&self) -> Result<Vec<FeedbackRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT answer_id, question_id, theme, mood, score
             FROM feedback ORDER BY question_id, answer_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(FeedbackRow {
                answer_id: row.get(0)?,
                question_id: row.get(1)?,
                theme: row.get(2)?,
                mood: Mood::parse(&row.get::<_, String>(3)?),
                score: row.get(4)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    fn load_roster(&self, table: &str) -> Result<HashSet<i64>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT account_id FROM {table}"))?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        rows.collect::<std::result::Result<HashSet<_>, _>>()
            .map_err(Into::into)
    }

    /// Row counts and date bounds for the snapshot.
    pub fn get_stats(&self) -> Result<DatasetStats> {
        let count = |table: &str| -> Result<i64> {
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })
                .map_err(Into::into)
        };

        let (first, last): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(creation_date), MAX(creation_date) FROM posts",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let indexed_at = self
            .get_info()?
            .map_or_else(Utc::now, |info| info.indexed_at);

        Ok(DatasetStats {
            posts_count: count("posts")?,
            post_votes_count: count("post_votes")?,
            comments_count: count("comments")?,
            comment_votes_count: count("comment_votes")?,
            users_count: count("users")?,
            monthly_actions_count: count("monthly_actions")?,
            feedback_count: count("feedback")?,
            first_post_date: from_db_date_opt(first),
            last_post_date: from_db_date_opt(last),
            indexed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_dataset() -> Dataset {
        let date = Utc.with_ymd_and_hms(2023, 6, 1, 10, 0, 0).single().unwrap();
        Dataset {
            users: vec![User {
                id: 1,
                account_id: 100,
                display_name: Some("pat".to_string()),
                reputation: 42,
                user_type_id: 2,
                is_moderator: false,
                creation_date: Some(date),
            }],
            posts: vec![Post {
                id: 10,
                post_type_id: Post::QUESTION,
                parent_id: None,
                owner_user_id: Some(1),
                title: Some("Announcing things".to_string()),
                creation_date: date,
                deletion_date: None,
                score: 5,
                view_count: 100,
            }],
            post_votes: vec![Vote {
                id: 20,
                post_id: 10,
                user_id: 1,
                vote_type_id: 2,
                creation_date: date,
                deletion_date: None,
                target_user_id: -1,
            }],
            comments: vec![Comment {
                id: 30,
                post_id: 10,
                user_id: 1,
                score: 0,
                creation_date: date,
                deletion_date: None,
            }],
            comment_votes: vec![],
            monthly_actions: vec![MonthlyAction {
                on_date: date,
                user_id: 1,
                account_id: 100,
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
            }],
            feedback: vec![FeedbackRow {
                answer_id: 11,
                question_id: 10,
                theme: "n/a".to_string(),
                mood: Mood::Positive,
                score: 2,
            }],
            employee_accounts: HashSet::from([100]),
            moderator_accounts: HashSet::new(),
        }
    }

    #[test]
    fn snapshot_round_trips() {
        let mut storage = Storage::open_memory().unwrap();
        let dataset = sample_dataset();
        storage.store_dataset(&dataset).unwrap();

        let loaded = storage.load_dataset().unwrap();
        assert_eq!(loaded.posts.len(), 1);
        assert_eq!(loaded.posts[0].title.as_deref(), Some("Announcing things"));
        assert_eq!(loaded.posts[0].creation_date, dataset.posts[0].creation_date);
        assert_eq!(loaded.post_votes[0].target_user_id, -1);
        assert_eq!(loaded.comments[0].score, 0);
        assert_eq!(loaded.users[0].account_id, 100);
        assert_eq!(loaded.monthly_actions.len(), 1);
        assert_eq!(loaded.feedback[0].mood, Mood::Positive);
        assert!(loaded.employee_accounts.contains(&100));
    }

    #[test]
    fn reindexing_replaces_rows() {
        let mut storage = Storage::open_memory().unwrap();
        let dataset = sample_dataset();
        storage.store_dataset(&dataset).unwrap();
        storage.store_dataset(&dataset).unwrap();

        let stats = storage.get_stats().unwrap();
        assert_eq!(stats.posts_count, 1);
        assert_eq!(stats.feedback_count, 1, "feedback is replaced, not appended");
    }

    #[test]
    fn stats_report_counts_and_bounds() {
        let mut storage = Storage::open_memory().unwrap();
        storage.store_dataset(&sample_dataset()).unwrap();

        let stats = storage.get_stats().unwrap();
        assert_eq!(stats.posts_count, 1);
        assert_eq!(stats.post_votes_count, 1);
        assert_eq!(stats.users_count, 1);
        assert!(stats.first_post_date.is_some());
        assert_eq!(stats.first_post_date, stats.last_post_date);
    }

    #[test]
    fn info_round_trips() {
        let mut storage = Storage::open_memory().unwrap();
        assert!(storage.get_info().unwrap().is_none());

        let info = DatasetInfo {
            name: "meta-export".to_string(),
            source: "/data/meta-export".to_string(),
            indexed_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).single().unwrap(),
        };
        storage.store_info(&info).unwrap();
        let loaded = storage.get_info().unwrap().unwrap();
        assert_eq!(loaded.name, "meta-export");
        assert_eq!(loaded.indexed_at, info.indexed_at);
    }
}
