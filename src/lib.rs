//! metapulse - engagement & sentiment analytics for announcement series
//!
//! This library measures how a recurring announcement/Q&A series lands
//! with a community: it joins the meta-site activity export with curated
//! spreadsheet feedback and computes engagement metrics, activity
//! buckets, rolling active-user trends, scorecards, and a retention
//! significance test.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface definitions
//! - [`error`] - Custom error types with rich context
//! - [`model`] - Typed records for the dataset entities
//! - [`parser`] - CSV dataset parsing and type corrections
//! - [`feedback`] - Curated feedback workbook source
//! - [`storage`] - `SQLite` snapshot layer
//! - [`enrich`] - Derived-metrics join pipeline
//! - [`buckets`] - IQR activity bucketing
//! - [`window`] - Trailing-window active-entity counts
//! - [`retention`] - Chi-square retention test
//! - [`engagement`] - Engagement points and activity tiers
//! - [`series`] - Series slicing and participation breakdowns
//! - [`scorecard`] - Per-announcement traffic-light grades

pub mod buckets;
pub mod cli;
pub mod config;
pub mod engagement;
pub mod enrich;
pub mod error;
pub mod feedback;
pub mod logging;
pub mod model;
pub mod parser;
pub mod render;
pub mod retention;
pub mod scorecard;
pub mod series;
pub mod stats;
pub mod storage;
pub mod window;

pub use cli::*;
pub use error::{PulseError, Result, ResultExt};
pub use model::*;
pub use parser::DatasetParser;
pub use storage::Storage;

/// Default database filename
pub const DEFAULT_DB_NAME: &str = "metapulse.db";

/// Standard width for content dividers in CLI output
pub const CONTENT_DIVIDER_WIDTH: usize = 60;

/// Get the default data directory for metapulse
#[must_use]
pub fn default_data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("metapulse")
}

/// Get the default database path
#[must_use]
pub fn default_db_path() -> std::path::PathBuf {
    default_data_dir().join(DEFAULT_DB_NAME)
}

/// Format an integer with thousands separators.
#[must_use]
pub fn format_number(value: i64) -> String {
    let abs = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(abs.len() + abs.len() / 3);

    for (idx, ch) in abs.chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    let mut formatted: String = out.chars().rev().collect();
    if value < 0 {
        formatted.insert(0, '-');
    }
    formatted
}

/// Format a usize with thousands separators.
#[must_use]
pub fn format_number_usize(value: usize) -> String {
    format_number(i64::try_from(value).unwrap_or(i64::MAX))
}

/// Escape text for CSV by sanitizing newlines and quotes.
#[must_use]
pub fn csv_escape_text(text: &str) -> String {
    text.replace('"', "\"\"").replace(['\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use super::{csv_escape_text, format_number, format_number_usize};

    #[test]
    fn format_number_adds_separators() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(12_345_678), "12,345,678");
        assert_eq!(format_number(-12_345), "-12,345");
    }

    #[test]
    fn format_number_usize_matches() {
        assert_eq!(format_number_usize(1234), "1,234");
    }

    #[test]
    fn csv_escape_text_sanitizes_newlines_and_quotes() {
        let input = "Hello\r\n\"world\", ok";
        let escaped = csv_escape_text(input);
        assert_eq!(escaped, "Hello  \"\"world\"\", ok");
    }
}
