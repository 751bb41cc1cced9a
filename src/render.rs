//! Terminal rendering helpers for the analysis reports.
//!
//! Sparklines and bar rows for trends and bucket activity, traffic-light
//! badges for scorecards. Everything here returns plain strings; the
//! commands decide where they go.

use crate::scorecard::Grade;
use chrono::{DateTime, Datelike, Utc};
use colored::Colorize;
use itertools::Itertools;

/// Generate an ASCII sparkline from a slice of values.
///
/// Uses Unicode block characters: ▁▂▃▄▅▆▇█
///
/// Values are bucketed by averaging when there are more than `width`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn sparkline(values: &[u64], width: usize) -> String {
    if values.is_empty() || width == 0 {
        return String::new();
    }

    let blocks = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

    // Bucket values if we have more than width
    let bucketed: Vec<u64> = if values.len() <= width {
        values.to_vec()
    } else {
        let bucket_size = values.len().div_ceil(width);
        values
            .chunks(bucket_size)
            .map(|chunk| chunk.iter().sum::<u64>() / chunk.len() as u64)
            .collect()
    };

    let max = *bucketed.iter().max().unwrap_or(&1);
    if max == 0 {
        return "▁".repeat(bucketed.len().min(width));
    }

    bucketed
        .iter()
        .take(width)
        .map(|&v| {
            let idx = ((v as f64 / max as f64) * 7.0) as usize;
            blocks[idx.min(7)]
        })
        .collect()
}

/// Format one labelled bar of a horizontal bar chart.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn bar_row(label: &str, value: u64, max: u64, width: usize) -> String {
    let bar_len = if max > 0 {
        ((value as f64 / max as f64) * width as f64) as usize
    } else {
        0
    };
    format!("{label:>12} {} {value}", "█".repeat(bar_len))
}

/// Color a traffic-light grade for terminal output.
#[must_use]
pub fn grade_badge(grade: Grade) -> String {
    let label = format!(" {} ", grade.to_string().to_uppercase());
    match grade {
        Grade::Green => label.black().on_green().to_string(),
        Grade::Yellow => label.black().on_yellow().to_string(),
        Grade::Red => label.white().on_red().to_string(),
    }
}

/// Count timestamps per calendar month, sorted ascending.
///
/// Used to sketch a bucket's activity over the series' lifetime.
#[must_use]
pub fn monthly_counts(dates: &[DateTime<Utc>]) -> Vec<(String, u64)> {
    dates
        .iter()
        .map(|d| format!("{:04}-{:02}", d.year(), d.month()))
        .counts()
        .into_iter()
        .map(|(month, count)| (month, count as u64))
        .sorted()
        .collect()
}
