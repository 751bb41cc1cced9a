//! CLI definitions for metapulse.
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// metapulse - engagement & sentiment analytics for announcement series
#[derive(Parser, Debug)]
#[command(name = "metapulse")]
#[command(author = "Dana Verwer <dana@verwer.dev>")]
#[command(version)]
#[command(about = "Engagement and sentiment analytics for Q&A announcement series")]
#[command(long_about = r#"
metapulse - measure how a recurring announcement/Q&A series lands with a
community.

It joins the meta-site activity export (posts, votes, comments, users)
with a curated feedback spreadsheet and reports engagement counts,
activity buckets, rolling active-user trends, per-announcement
scorecards, and a participation-retention significance test.

Quick start:
  1. Export the site database as CSV files into one directory
  2. Run: metapulse index /path/to/export --workbook feedback.json
  3. Configure the series: metapulse config --questions 423456,424001
  4. Report: metapulse stats, metapulse scorecard 423456, ...
"#)]
pub struct Cli {
    /// Path to the snapshot database file
    #[arg(long, env = "METAPULSE_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Question ids of the series (overrides the config file)
    #[arg(long, value_delimiter = ',', global = true)]
    pub questions: Option<Vec<i64>>,

    /// Output format
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Be verbose (show debug info)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Be quiet (suppress non-error output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index a dataset export into the snapshot database
    Index(IndexArgs),

    /// Show dataset and series statistics
    Stats(StatsArgs),

    /// Split series participants into activity buckets
    Buckets(BucketsArgs),

    /// Rolling active-user trend from the main-site activity log
    Trend(TrendArgs),

    /// Engagement-point tier summary for main-site users
    Engagement,

    /// Chi-square retention test: series participants vs. the rest
    Retention(RetentionArgs),

    /// Grade one announcement: checklist, reach, feedback
    Scorecard(ScorecardArgs),

    /// Show or manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Path to the dataset export directory
    pub dataset_path: PathBuf,

    /// Path to the feedback workbook export (JSON)
    #[arg(long, short = 'w', env = "METAPULSE_WORKBOOK")]
    pub workbook: Option<PathBuf>,

    /// Force full re-index (delete the existing snapshot)
    #[arg(long, short = 'F')]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Include the per-role participation breakdown for the series
    #[arg(long, short = 'd')]
    pub detailed: bool,
}

#[derive(Args, Debug)]
pub struct BucketsArgs {
    /// Which series activity to bucket participants by
    #[arg(long, short = 'b', default_value = "votes")]
    pub by: BucketSource,

    /// Number of IQR iterations (buckets minus the final unbounded one)
    #[arg(long, short = 'i', default_value = "3")]
    pub iterations: usize,

    /// Lowest per-user count admitted into the first bucket
    #[arg(long, default_value = "0")]
    pub low: i64,
}

#[derive(Args, Debug)]
pub struct TrendArgs {
    /// Trailing window length in days
    #[arg(long, short = 'p', default_value = "29")]
    pub period: i64,

    /// Minimum events inside the window to count a user as active
    #[arg(long, short = 't', default_value = "1")]
    pub threshold: u64,

    /// Only count days at or above this engagement tier
    #[arg(long)]
    pub tier: Option<Tier>,
}

#[derive(Args, Debug)]
pub struct RetentionArgs {
    /// Cutoff date (YYYY-MM-DD): cohorts form before it, the outcome is
    /// activity on or after it
    pub cutoff: String,
}

#[derive(Args, Debug)]
pub struct ScorecardArgs {
    /// Question id to grade
    pub question_id: i64,

    /// Checklist items that the announcement meets
    /// (story, single-theme, short, positive, user-perspective,
    /// clear-cta, easy-to-read)
    #[arg(long, value_delimiter = ',')]
    pub checklist: Option<Vec<String>>,

    /// Include the feedback theme breakdown
    #[arg(long)]
    pub themes: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Show current configuration
    #[arg(long)]
    pub show: bool,

    /// Save the series question ids to the config file
    #[arg(long, value_delimiter = ',')]
    pub set_questions: Option<Vec<i64>>,

    /// Save a default dataset path
    #[arg(long)]
    pub dataset: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonPretty,
    Csv,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BucketSource {
    /// Votes cast on series posts
    #[default]
    Votes,
    /// Comments written on series posts
    Comments,
    /// Answers posted to series questions
    Answers,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    Active,
    Engaged,
    VeryEngaged,
    Core,
}

impl From<Tier> for crate::engagement::EngagementTier {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Active => Self::Active,
            Tier::Engaged => Self::Engaged,
            Tier::VeryEngaged => Self::VeryEngaged,
            Tier::Core => Self::Core,
        }
    }
}
