//! metapulse - engagement & sentiment analytics CLI
//!
//! Main entry point for the metapulse command-line tool.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use tracing::info;

use metapulse::buckets::{split_into_buckets, Bucket};
use metapulse::config::Config;
use metapulse::engagement::{engagement_points, tier_counts, EngagementTier};
use metapulse::enrich::enrich;
use metapulse::feedback::{collect_feedback, Workbook};
use metapulse::render;
use metapulse::retention::{chi_square_independence, participation_cohorts};
use metapulse::scorecard::{feedback_grade, reach_grade, theme_breakdown, Checklist};
use metapulse::series::SeriesSlice;
use metapulse::window::rolling_active_counts;
use metapulse::*;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_cli_logging(cli.quiet, cli.verbose);
    let config = Config::load();

    match &cli.command {
        Commands::Index(args) => cmd_index(&cli, &config, args),
        Commands::Stats(args) => cmd_stats(&cli, &config, args),
        Commands::Buckets(args) => cmd_buckets(&cli, &config, args),
        Commands::Trend(args) => cmd_trend(&cli, &config, args),
        Commands::Engagement => cmd_engagement(&cli, &config),
        Commands::Retention(args) => cmd_retention(&cli, &config, args),
        Commands::Scorecard(args) => cmd_scorecard(&cli, &config, args),
        Commands::Config(args) => cmd_config(&config, args),
        Commands::Completions(args) => cmd_completions(args.clone()),
    }
}

fn get_db_path(cli: &Cli, config: &Config) -> PathBuf {
    cli.db.clone().unwrap_or_else(|| config.db_path())
}

/// The series question ids: CLI wins over the config file.
fn series_questions(cli: &Cli, config: &Config) -> Result<Vec<i64>> {
    let questions = cli
        .questions
        .clone()
        .unwrap_or_else(|| config.series.questions.clone());
    if questions.is_empty() {
        anyhow::bail!(
            "No series questions configured.\n\
             Pass --questions <id,id,...> or save them with \
             'metapulse config --set-questions <id,id,...>'."
        );
    }
    Ok(questions)
}

fn open_snapshot(cli: &Cli, config: &Config) -> Result<Storage> {
    let db_path = get_db_path(cli, config);
    if !db_path.exists() {
        return Err(PulseError::database_not_found(db_path).into());
    }
    Ok(Storage::open(db_path)?)
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}

// =============================================================================
// index
// =============================================================================

fn cmd_index(cli: &Cli, config: &Config, args: &cli::IndexArgs) -> Result<()> {
    let dataset_path = &args.dataset_path;
    if !dataset_path.exists() {
        anyhow::bail!("Dataset path does not exist: {}", dataset_path.display());
    }

    let db_path = get_db_path(cli, config);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if args.force && db_path.exists() {
        std::fs::remove_file(&db_path)?;
        info!("Cleared existing snapshot");
    }

    println!("{}", "Indexing dataset export...".bold().cyan());
    println!("  Dataset:  {}", dataset_path.display());
    println!("  Database: {}", db_path.display());
    println!();

    let pb = ProgressBar::new(3);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("##-"),
    );

    pb.set_message("Parsing CSV export...");
    let parser = DatasetParser::new(dataset_path);
    let mut dataset = parser.parse_dataset()?;
    pb.println(format!(
        "  {} {} posts, {} comments, {} users",
        "✓".green(),
        format_number_usize(dataset.posts.len()),
        format_number_usize(dataset.comments.len()),
        format_number_usize(dataset.users.len()),
    ));
    pb.inc(1);

    pb.set_message("Loading feedback workbook...");
    let workbook_path = args.workbook.clone().or_else(|| config.paths.workbook.clone());
    if let Some(path) = workbook_path {
        let workbook = Workbook::load(&path)?;
        let questions = cli
            .questions
            .clone()
            .unwrap_or_else(|| config.series.questions.clone());
        let questions = if questions.is_empty() {
            workbook.question_ids()
        } else {
            questions
        };
        dataset.feedback = collect_feedback(&workbook, &questions)?;
        pb.println(format!(
            "  {} {} feedback rows for {} questions",
            "✓".green(),
            format_number_usize(dataset.feedback.len()),
            format_number_usize(questions.len()),
        ));
    } else {
        pb.println(format!(
            "  {} no workbook given; feedback reports will be empty",
            "-".yellow()
        ));
    }
    pb.inc(1);

    pb.set_message("Storing snapshot...");
    let mut storage = Storage::open(&db_path)?;
    storage.store_info(&DatasetInfo {
        name: parser.dataset_name(),
        source: dataset_path.display().to_string(),
        indexed_at: Utc::now(),
    })?;
    storage.store_dataset(&dataset)?;
    pb.inc(1);
    pb.finish_and_clear();

    println!();
    println!("{}", "Indexing complete!".bold().green());
    println!(
        "Run {} or {} to start analyzing.",
        "metapulse stats".bold(),
        "metapulse scorecard <question_id>".bold()
    );
    Ok(())
}

// =============================================================================
// stats
// =============================================================================

fn cmd_stats(cli: &Cli, config: &Config, args: &cli::StatsArgs) -> Result<()> {
    let storage = open_snapshot(cli, config)?;
    let stats = storage.get_stats()?;

    match cli.format {
        OutputFormat::Json | OutputFormat::JsonPretty => {
            print_json(&stats, cli.format == OutputFormat::JsonPretty)?;
        }
        _ => {
            println!("{}", "Snapshot Statistics".bold().cyan());
            println!("{}", "─".repeat(40));
            println!("  {:<20} {:>12}", "Posts:", format_number(stats.posts_count));
            println!(
                "  {:<20} {:>12}",
                "Post votes:",
                format_number(stats.post_votes_count)
            );
            println!(
                "  {:<20} {:>12}",
                "Comments:",
                format_number(stats.comments_count)
            );
            println!(
                "  {:<20} {:>12}",
                "Comment votes:",
                format_number(stats.comment_votes_count)
            );
            println!("  {:<20} {:>12}", "Users:", format_number(stats.users_count));
            println!(
                "  {:<20} {:>12}",
                "Activity rows:",
                format_number(stats.monthly_actions_count)
            );
            println!(
                "  {:<20} {:>12}",
                "Feedback rows:",
                format_number(stats.feedback_count)
            );
            println!("{}", "─".repeat(40));

            if let (Some(first), Some(last)) = (stats.first_post_date, stats.last_post_date) {
                println!(
                    "  First post: {}",
                    first.format("%Y-%m-%d").to_string().green()
                );
                println!(
                    "  Last post:  {}",
                    last.format("%Y-%m-%d").to_string().green()
                );
            }
        }
    }

    if args.detailed {
        let questions = series_questions(cli, config)?;
        let dataset = storage.load_dataset()?;
        let tables = enrich(&dataset);
        let slice = SeriesSlice::build(&tables, &dataset, &questions);
        print_series_stats(&slice);
    }

    Ok(())
}

fn print_series_stats(slice: &SeriesSlice) {
    let participants = slice.participant_counts();
    let actions = slice.action_counts();

    println!();
    println!("{}", "Unique users participating in the series".bold().cyan());
    println!("  {:<24} {:>8}", "Total:", format_number_usize(participants.total));
    println!("  {:<24} {:>8}", "Askers:", format_number_usize(participants.askers));
    println!(
        "  {:<24} {:>8}",
        "Answer givers:",
        format_number_usize(participants.answer_givers)
    );
    println!(
        "  {:<24} {:>8}",
        "Post voters:",
        format_number_usize(participants.post_voters)
    );
    println!(
        "  {:<24} {:>8}",
        "Bookmark / follow:",
        format_number_usize(participants.bookmarkers)
    );
    println!(
        "  {:<24} {:>8}",
        "Commentators:",
        format_number_usize(participants.commentators)
    );
    println!(
        "  {:<24} {:>8}",
        "Comment voters:",
        format_number_usize(participants.comment_voters)
    );

    println!();
    println!("{}", "Actions".bold().cyan());
    println!("  {:<24} {:>8}", "Questions:", format_number_usize(actions.questions));
    println!("  {:<24} {:>8}", "Answers:", format_number_usize(actions.answers));
    println!(
        "  {:<24} {:>8}",
        "Post votes:",
        format_number_usize(actions.post_votes)
    );
    println!(
        "  {:<24} {:>8}",
        "Bookmark / follow:",
        format_number_usize(actions.bookmarks_follows)
    );
    println!("  {:<24} {:>8}", "Comments:", format_number_usize(actions.comments));
    println!(
        "  {:<24} {:>8}",
        "Comment votes:",
        format_number_usize(actions.comment_votes)
    );

    let questions = slice.employee_questions();
    if questions.is_empty() {
        return;
    }
    println!();
    println!("{}", "Announcements".bold().cyan());
    for (index, question) in questions.iter().enumerate() {
        let users = slice.question_users(question.id);
        let contributors: std::collections::HashSet<i64> = users.content.iter().copied().collect();
        let voters: std::collections::HashSet<i64> = users.voters.iter().copied().collect();

        println!(
            "  Q #{} ({})  interest {}, {} contributors, {} voters",
            index + 1,
            question.id,
            format_number(question.total_question_action_count).cyan(),
            format_number_usize(contributors.len()),
            format_number_usize(voters.len()),
        );
        match slice.downvoter_content_share(question.id) {
            Ok(share) => {
                let reputation = slice
                    .downvoter_reputation(question.id)
                    .map_or_else(String::new, |r| {
                        format!(", median rep {:.0}", r.median)
                    });
                println!(
                    "      {} downvoters, {:.0}% of them posted content{reputation}",
                    share.downvoters, share.percent
                );
            }
            Err(_) => println!("      no downvotes"),
        }
    }
}

// =============================================================================
// buckets
// =============================================================================

#[derive(Debug, Serialize)]
struct BucketReport {
    index: usize,
    low: i64,
    high: i64,
    users: usize,
    events: usize,
}

fn cmd_buckets(cli: &Cli, config: &Config, args: &cli::BucketsArgs) -> Result<()> {
    let questions = series_questions(cli, config)?;
    let storage = open_snapshot(cli, config)?;
    let dataset = storage.load_dataset()?;
    let tables = enrich(&dataset);
    let slice = SeriesSlice::build(&tables, &dataset, &questions);

    // Rows are (user, event date): the user is the bucketed entity, the
    // date feeds the per-bucket activity sketch.
    let rows: Vec<(i64, chrono::DateTime<Utc>)> = match args.by {
        BucketSource::Votes => slice
            .post_votes
            .iter()
            .map(|v| (v.user_id, v.creation_date))
            .collect(),
        BucketSource::Comments => slice
            .comments
            .iter()
            .map(|c| (c.user_id, c.creation_date))
            .collect(),
        BucketSource::Answers => slice
            .posts
            .iter()
            .filter(|p| p.post_type_id == Post::ANSWER)
            .filter_map(|p| p.owner_user_id.map(|u| (u, p.creation_date)))
            .collect(),
    };

    if rows.is_empty() {
        println!("{}", "No series activity to bucket.".yellow());
        return Ok(());
    }

    let buckets = split_into_buckets(rows, |r| r.0, args.iterations, args.low);
    let reports: Vec<BucketReport> = buckets
        .iter()
        .enumerate()
        .map(|(index, b)| BucketReport {
            index,
            low: b.low,
            high: b.high,
            users: b.total,
            events: b.rows.len(),
        })
        .collect();

    match cli.format {
        OutputFormat::Json | OutputFormat::JsonPretty => {
            print_json(&reports, cli.format == OutputFormat::JsonPretty)?;
        }
        OutputFormat::Csv => {
            println!("bucket,low,high,users,events");
            for r in &reports {
                println!("{},{},{},{},{}", r.index, r.low, r.high, r.users, r.events);
            }
        }
        OutputFormat::Text => {
            println!(
                "{}",
                format!("Activity buckets by {:?} per user", args.by).bold().cyan()
            );
            for (report, bucket) in reports.iter().zip(&buckets) {
                print_bucket(report, bucket);
            }
        }
    }
    Ok(())
}

fn print_bucket(report: &BucketReport, bucket: &Bucket<(i64, chrono::DateTime<Utc>)>) {
    println!(
        "  Bucket {} {}  {} users, {} events",
        report.index,
        bucket.range_label().bold(),
        format_number_usize(report.users).cyan(),
        format_number_usize(report.events),
    );
    let dates: Vec<chrono::DateTime<Utc>> = bucket.rows.iter().map(|r| r.1).collect();
    let monthly = render::monthly_counts(&dates);
    if !monthly.is_empty() {
        let values: Vec<u64> = monthly.iter().map(|(_, n)| *n).collect();
        println!(
            "      {} .. {}  {}",
            monthly[0].0,
            monthly[monthly.len() - 1].0,
            render::sparkline(&values, 40)
        );
    }
}

// =============================================================================
// trend
// =============================================================================

fn cmd_trend(cli: &Cli, config: &Config, args: &cli::TrendArgs) -> Result<()> {
    let storage = open_snapshot(cli, config)?;
    let dataset = storage.load_dataset()?;

    let tier: Option<EngagementTier> = args.tier.map(Into::into);
    let events: Vec<(chrono::DateTime<Utc>, i64)> = dataset
        .monthly_actions
        .iter()
        .filter(|a| tier.is_none_or(|t| t.matches(engagement_points(a))))
        .map(|a| (a.on_date, a.user_id))
        .collect();

    let series = rolling_active_counts(&events, args.period, args.threshold);

    match cli.format {
        OutputFormat::Json | OutputFormat::JsonPretty => {
            print_json(&series, cli.format == OutputFormat::JsonPretty)?;
        }
        OutputFormat::Csv => {
            println!("date,active");
            for point in &series {
                println!("{},{}", point.on_date, point.value);
            }
        }
        OutputFormat::Text => {
            let label = tier.map_or_else(|| "all".to_string(), |t| t.to_string());
            println!(
                "{}",
                format!(
                    "Rolling {}-day active users ({label} tier)",
                    args.period + 1
                )
                .bold()
                .cyan()
            );
            if series.is_empty() {
                println!("{}", "No activity rows in the snapshot.".yellow());
                return Ok(());
            }
            let values: Vec<u64> = series.iter().map(|p| p.value).collect();
            println!("  {}", render::sparkline(&values, 60));
            let peak = series.iter().max_by_key(|p| p.value).expect("nonempty");
            let last = series.last().expect("nonempty");
            println!(
                "  Peak {} on {}, latest {} on {}",
                format_number(peak.value as i64).cyan(),
                peak.on_date,
                format_number(last.value as i64).cyan(),
                last.on_date
            );
        }
    }
    Ok(())
}

// =============================================================================
// engagement
// =============================================================================

fn cmd_engagement(cli: &Cli, config: &Config) -> Result<()> {
    let storage = open_snapshot(cli, config)?;
    let dataset = storage.load_dataset()?;
    let counts = tier_counts(&dataset.monthly_actions);

    match cli.format {
        OutputFormat::Json | OutputFormat::JsonPretty => {
            print_json(&counts, cli.format == OutputFormat::JsonPretty)?;
        }
        _ => {
            println!("{}", "Engagement tiers (whole snapshot)".bold().cyan());
            let rows = [
                ("active", counts.active),
                ("engaged", counts.engaged),
                ("very engaged", counts.very_engaged),
                ("core", counts.core),
            ];
            let max = rows.iter().map(|(_, n)| *n).max().unwrap_or(1);
            for (label, value) in rows {
                println!("{}", render::bar_row(label, value, max, 30));
            }
        }
    }
    Ok(())
}

// =============================================================================
// retention
// =============================================================================

#[derive(Debug, Serialize)]
struct RetentionReport {
    cutoff: NaiveDate,
    participants: usize,
    outsiders: usize,
    statistic: f64,
    p_value: f64,
    observed: metapulse::retention::ContingencyTable,
    expected: [[f64; 2]; 2],
}

fn cmd_retention(cli: &Cli, config: &Config, args: &cli::RetentionArgs) -> Result<()> {
    let cutoff_date = NaiveDate::parse_from_str(&args.cutoff, "%Y-%m-%d")
        .map_err(|_| PulseError::invalid_argument(format!("bad cutoff date '{}'", args.cutoff)))?;
    let cutoff = cutoff_date
        .and_hms_opt(0, 0, 0)
        .expect("midnight is valid")
        .and_utc();

    let questions = series_questions(cli, config)?;
    let storage = open_snapshot(cli, config)?;
    let dataset = storage.load_dataset()?;
    let tables = enrich(&dataset);
    let slice = SeriesSlice::build(&tables, &dataset, &questions);

    let participants = slice.participant_accounts();
    let (in_series, outside) =
        participation_cohorts(&dataset.monthly_actions, &participants, cutoff);
    let test = chi_square_independence(&in_series, &outside, |r| r.continued)?;

    let report = RetentionReport {
        cutoff: cutoff_date,
        participants: in_series.len(),
        outsiders: outside.len(),
        statistic: test.statistic,
        p_value: test.p_value,
        observed: test.observed,
        expected: test.expected,
    };

    match cli.format {
        OutputFormat::Json | OutputFormat::JsonPretty => {
            print_json(&report, cli.format == OutputFormat::JsonPretty)?;
        }
        _ => {
            let obs = &report.observed;
            let rows = obs.row_totals();
            let cols = obs.col_totals();
            println!("{}", "Participation retention test".bold().cyan());
            println!("  Cutoff: {}", report.cutoff);
            println!();
            println!("  {:<12} {:>12} {:>12} {:>10}", "", "series", "others", "total");
            println!(
                "  {:<12} {:>12} {:>12} {:>10}",
                "continued",
                format_number(obs.continued[0] as i64),
                format_number(obs.continued[1] as i64),
                format_number(rows[0] as i64)
            );
            println!(
                "  {:<12} {:>12} {:>12} {:>10}",
                "left",
                format_number(obs.left[0] as i64),
                format_number(obs.left[1] as i64),
                format_number(rows[1] as i64)
            );
            println!(
                "  {:<12} {:>12} {:>12} {:>10}",
                "total",
                format_number(cols[0] as i64),
                format_number(cols[1] as i64),
                format_number(obs.grand_total() as i64)
            );
            println!();
            println!(
                "  Expected: [[{:.2}, {:.2}], [{:.2}, {:.2}]]",
                report.expected[0][0],
                report.expected[0][1],
                report.expected[1][0],
                report.expected[1][1]
            );
            let verdict = if report.p_value < 0.05 {
                "significant at the 5% level".green()
            } else {
                "not significant at the 5% level".yellow()
            };
            println!(
                "  chi² = {:.4}, p = {:.4} ({verdict})",
                report.statistic, report.p_value
            );
        }
    }
    Ok(())
}

// =============================================================================
// scorecard
// =============================================================================

#[derive(Debug, Serialize)]
struct ScorecardReport {
    question_id: i64,
    title: Option<String>,
    checklist: Option<ChecklistReport>,
    reach: metapulse::scorecard::ReachGrade,
    feedback: Option<metapulse::scorecard::FeedbackGrade>,
}

#[derive(Debug, Serialize)]
struct ChecklistReport {
    grade: metapulse::scorecard::Grade,
    score: u32,
    max_score: u32,
}

fn cmd_scorecard(cli: &Cli, config: &Config, args: &cli::ScorecardArgs) -> Result<()> {
    let storage = open_snapshot(cli, config)?;
    let dataset = storage.load_dataset()?;
    let tables = enrich(&dataset);

    let reach = reach_grade(&tables.posts, args.question_id)?;

    let checklist = args
        .checklist
        .as_deref()
        .map(Checklist::from_keys)
        .transpose()?
        .map(|c| ChecklistReport {
            grade: c.grade(),
            score: c.score(),
            max_score: Checklist::MAX_SCORE,
        });

    // No feedback sheet (or scores cancelling to zero) leaves the
    // question ungradable on sentiment; the other grades still stand.
    let feedback = match feedback_grade(&tables.feedback, args.question_id) {
        Ok(grade) => Some(grade),
        Err(PulseError::ZeroTotal { .. }) => None,
        Err(e) => return Err(e.into()),
    };

    let title = tables
        .posts
        .iter()
        .find(|p| p.id == args.question_id)
        .and_then(|p| p.title.clone());

    let report = ScorecardReport {
        question_id: args.question_id,
        title,
        checklist,
        reach,
        feedback,
    };

    match cli.format {
        OutputFormat::Json | OutputFormat::JsonPretty => {
            print_json(&report, cli.format == OutputFormat::JsonPretty)?;
        }
        _ => {
            println!(
                "{} {}",
                "Scorecard for question".bold().cyan(),
                report.question_id.to_string().bold()
            );
            if let Some(title) = &report.title {
                println!("  {title}");
            }
            println!("{}", "─".repeat(CONTENT_DIVIDER_WIDTH));

            if let Some(checklist) = &report.checklist {
                println!(
                    "  Checklist  {}  {}/{} criteria met",
                    render::grade_badge(checklist.grade),
                    checklist.score,
                    checklist.max_score
                );
            }
            println!(
                "  Reach      {}  views p{:.0}, interest p{:.0}",
                render::grade_badge(report.reach.grade),
                report.reach.view_percentile,
                report.reach.interest_percentile
            );
            match &report.feedback {
                Some(feedback) => println!(
                    "  Feedback   {}  {:.0}% positive / {:.0}% neutral / {:.0}% negative",
                    render::grade_badge(feedback.grade),
                    feedback.positive_pct,
                    feedback.neutral_pct,
                    feedback.negative_pct
                ),
                None => println!("  Feedback   (no gradable feedback)"),
            }
        }
    }

    if args.themes {
        match theme_breakdown(&tables.feedback, args.question_id) {
            Ok(shares) => {
                println!();
                println!("{}", "Feedback themes".bold().cyan());
                for share in shares {
                    println!(
                        "  {:<24} {:>6} ({:.0}%)",
                        share.theme,
                        format_number(share.score),
                        share.percent
                    );
                }
            }
            Err(PulseError::ZeroTotal { .. }) => {
                println!("{}", "No gradable feedback for a theme breakdown.".yellow());
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

// =============================================================================
// config / completions
// =============================================================================

fn cmd_config(config: &Config, args: &cli::ConfigArgs) -> Result<()> {
    let mut config = config.clone();
    let mut changed = false;

    if let Some(questions) = &args.set_questions {
        config.series.questions.clone_from(questions);
        changed = true;
    }
    if let Some(dataset) = &args.dataset {
        config.paths.dataset = Some(dataset.clone());
        changed = true;
    }
    if changed {
        config.save()?;
        println!("{}", "Configuration saved.".green());
    }

    if args.show || !changed {
        println!("{}", "Current Configuration".bold().cyan());
        println!("  Database: {}", config.db_path().display());
        match &config.paths.dataset {
            Some(p) => println!("  Dataset:  {}", p.display()),
            None => println!("  Dataset:  (not set)"),
        }
        match &config.paths.workbook {
            Some(p) => println!("  Workbook: {}", p.display()),
            None => println!("  Workbook: (not set)"),
        }
        if config.series.questions.is_empty() {
            println!("  Series questions: (not set)");
        } else {
            let ids: Vec<String> = config
                .series
                .questions
                .iter()
                .map(ToString::to_string)
                .collect();
            println!("  Series questions: {}", ids.join(", "));
        }
    }
    Ok(())
}

fn cmd_completions(args: cli::CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "metapulse", &mut io::stdout());
    Ok(())
}
