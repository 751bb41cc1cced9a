//! End-to-end CLI tests for metapulse.
//!
//! These tests run the actual metapulse binary and verify:
//! - Command-line interface behavior
//! - Output format and content
//! - Error handling and messages
//!
//! # Test Organization
//!
//! Tests are organized by command:
//! - `test_index_*` - Index command tests
//! - `test_stats_*` - Stats command tests
//! - `test_scorecard_*` / `test_retention_*` - Report command tests
//! - `test_cli_*` - General CLI tests (flags, help, errors)

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

/// Write a complete dataset export plus a feedback workbook into a temp
/// directory. Returns (tempdir, dataset path, workbook path, db path).
fn create_fixture() -> (TempDir, PathBuf, PathBuf, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let dataset = temp_dir.path().join("export");
    fs::create_dir_all(&dataset).expect("Failed to create dataset directory");

    fs::write(
        dataset.join("users.csv"),
        "Id,AccountId,DisplayName,Reputation,UserTypeId,CreationDate\n\
         1,100,alice,5000,2,2020-01-01 00:00:00\n\
         2,101,bob,300,2,2020-02-01 00:00:00\n\
         3,102,carol,80,2,2021-05-05 00:00:00\n",
    )
    .unwrap();
    fs::write(
        dataset.join("posts.csv"),
        "Id,PostTypeId,ParentId,OwnerUserId,Title,CreationDate,DeletionDate,Score,ViewCount\n\
         1,1,,1,Announcing the thing,2023-06-01 09:00:00,,10,500\n\
         2,2,1,2,,2023-06-01 10:00:00,,5,0\n\
         3,2,1,3,,2023-06-02 11:00:00,,-1,0\n",
    )
    .unwrap();
    fs::write(
        dataset.join("post_votes.csv"),
        "Id,PostId,UserId,VoteTypeId,CreationDate,DeletionDate,TargetUserId\n\
         10,1,2,2,2023-06-01 12:00:00,,\n\
         11,1,3,3,2023-06-01 13:00:00,,\n\
         12,2,1,2,2023-06-02 09:00:00,,\n",
    )
    .unwrap();
    fs::write(
        dataset.join("comments.csv"),
        "Id,PostId,UserId,Score,CreationDate,DeletionDate\n\
         20,1,3,1,2023-06-01 14:00:00,\n",
    )
    .unwrap();
    fs::write(
        dataset.join("comment_votes.csv"),
        "Id,PostCommentId,UserId,VoteTypeId,CreationDate,DeletionDate,TargetUserId\n\
         30,20,2,2,2023-06-01 15:00:00,,\n",
    )
    .unwrap();
    fs::write(dataset.join("employee_accounts.csv"), "AccountId\n100\n").unwrap();
    fs::write(dataset.join("moderators.csv"), "AccountId\n101\n").unwrap();
    fs::write(
        dataset.join("monthly_actions.csv"),
        "OnDate,UserId,AccountId,Questions,Answers,Comments,Edits,AcceptVotes,UpVotes,DownVotes,CommentVotes,CloseVotes,ReopenVotes,OtherFlags,Reviews\n\
         2023-06-01,1,100,1,0,0,0,0,0,0,0,0,0,0,0\n\
         2023-06-20,1,100,0,1,0,0,0,0,0,0,0,0,0,0\n\
         2023-06-02,2,101,0,0,1,0,0,0,0,0,0,0,0,0\n\
         2023-06-03,9,900,0,0,0,0,0,2,0,0,0,0,0,0\n\
         2023-06-21,9,900,0,0,0,0,0,1,0,0,0,0,0,0\n\
         2023-06-04,8,800,0,0,0,1,0,0,0,0,0,0,0,0\n",
    )
    .unwrap();

    let workbook = temp_dir.path().join("feedback.json");
    fs::write(
        &workbook,
        r#"[
            {
                "title": "meta.stackoverflow.com/q/1",
                "values": [
                    ["Link", "Theme", "Mood", "Score"],
                    ["https://meta.stackoverflow.com/a/2/101", "speed", "positive", "3"],
                    ["https://meta.stackoverflow.com/a/3/102", "", "negative", "1"]
                ]
            }
        ]"#,
    )
    .unwrap();

    let db = temp_dir.path().join("metapulse.db");
    (temp_dir, dataset, workbook, db)
}

fn metapulse() -> Command {
    Command::cargo_bin("metapulse").expect("binary builds")
}

fn index_fixture(dataset: &PathBuf, workbook: &PathBuf, db: &PathBuf) {
    metapulse()
        .args(["index"])
        .arg(dataset)
        .arg("--workbook")
        .arg(workbook)
        .arg("--db")
        .arg(db)
        .args(["--questions", "1"])
        .assert()
        .success();
}

// =============================================================================
// index
// =============================================================================

#[test]
fn test_index_succeeds_on_fixture() {
    let (_tmp, dataset, workbook, db) = create_fixture();
    metapulse()
        .args(["index"])
        .arg(&dataset)
        .arg("--workbook")
        .arg(&workbook)
        .arg("--db")
        .arg(&db)
        .args(["--questions", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Indexing complete"));
    assert!(db.exists());
}

#[test]
fn test_index_missing_dataset_fails() {
    let tmp = TempDir::new().unwrap();
    metapulse()
        .args(["index"])
        .arg(tmp.path().join("nope"))
        .arg("--db")
        .arg(tmp.path().join("db"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

// =============================================================================
// stats
// =============================================================================

#[test]
fn test_stats_json_counts() {
    let (_tmp, dataset, workbook, db) = create_fixture();
    index_fixture(&dataset, &workbook, &db);

    metapulse()
        .args(["stats", "-f", "json"])
        .arg("--db")
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"posts_count\":3"))
        .stdout(predicate::str::contains("\"feedback_count\":2"));
}

#[test]
fn test_stats_detailed_series_breakdown() {
    let (_tmp, dataset, workbook, db) = create_fixture();
    index_fixture(&dataset, &workbook, &db);

    metapulse()
        .args(["stats", "--detailed", "--questions", "1"])
        .arg("--db")
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("Unique users participating"))
        .stdout(predicate::str::contains("Askers"));
}

#[test]
fn test_stats_without_snapshot_fails_with_hint() {
    let tmp = TempDir::new().unwrap();
    metapulse()
        .args(["stats"])
        .arg("--db")
        .arg(tmp.path().join("missing.db"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("metapulse index"));
}

// =============================================================================
// scorecard / buckets / trend / retention
// =============================================================================

#[test]
fn test_scorecard_reports_grades() {
    let (_tmp, dataset, workbook, db) = create_fixture();
    index_fixture(&dataset, &workbook, &db);

    metapulse()
        .args(["scorecard", "1", "--questions", "1"])
        .args(["--checklist", "story,short,positive,clear-cta,easy-to-read,single-theme"])
        .arg("--db")
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("Scorecard for question"))
        .stdout(predicate::str::contains("Checklist"))
        .stdout(predicate::str::contains("6/7"))
        .stdout(predicate::str::contains("Feedback"));
}

#[test]
fn test_scorecard_unknown_question_fails() {
    let (_tmp, dataset, workbook, db) = create_fixture();
    index_fixture(&dataset, &workbook, &db);

    metapulse()
        .args(["scorecard", "424242", "--questions", "1"])
        .arg("--db")
        .arg(&db)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_buckets_partition_voters() {
    let (_tmp, dataset, workbook, db) = create_fixture();
    index_fixture(&dataset, &workbook, &db);

    metapulse()
        .args(["buckets", "--by", "votes", "--questions", "1", "-f", "csv"])
        .arg("--db")
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("bucket,low,high,users,events"));
}

#[test]
fn test_trend_csv_has_one_row_per_day() {
    let (_tmp, dataset, workbook, db) = create_fixture();
    index_fixture(&dataset, &workbook, &db);

    let output = metapulse()
        .args(["trend", "-f", "csv", "--period", "29"])
        .arg("--db")
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("date,active"))
        .get_output()
        .stdout
        .clone();

    let text = String::from_utf8(output).unwrap();
    // Header plus one row for each of the six distinct days.
    assert_eq!(text.lines().count(), 7);
}

#[test]
fn test_retention_reports_contingency_table() {
    let (_tmp, dataset, workbook, db) = create_fixture();
    index_fixture(&dataset, &workbook, &db);

    metapulse()
        .args(["retention", "2023-06-15", "--questions", "1"])
        .arg("--db")
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("Participation retention test"))
        .stdout(predicate::str::contains("continued"))
        .stdout(predicate::str::contains("chi²"));
}

#[test]
fn test_retention_bad_date_fails() {
    let (_tmp, dataset, workbook, db) = create_fixture();
    index_fixture(&dataset, &workbook, &db);

    metapulse()
        .args(["retention", "June 15th", "--questions", "1"])
        .arg("--db")
        .arg(&db)
        .assert()
        .failure()
        .stderr(predicate::str::contains("bad cutoff date"));
}

// =============================================================================
// general CLI
// =============================================================================

#[test]
fn test_cli_help_lists_commands() {
    metapulse()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("index"))
        .stdout(predicate::str::contains("scorecard"))
        .stdout(predicate::str::contains("retention"));
}

#[test]
fn test_cli_missing_questions_hint() {
    let (_tmp, dataset, workbook, db) = create_fixture();
    index_fixture(&dataset, &workbook, &db);

    metapulse()
        .args(["buckets"])
        .arg("--db")
        .arg(&db)
        .env_remove("METAPULSE_DB")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--questions"));
}

#[test]
fn test_cli_completions_generate() {
    metapulse()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("metapulse"));
}
