//! Curated feedback workbook.
//!
//! Feedback lives in a hand-maintained spreadsheet, one sheet per
//! announcement, where the sheet title carries the question's meta-site
//! URL. Fetching and authentication happen outside this tool; what arrives
//! here is the workbook export: a JSON array of `{title, values}` sheets
//! with the first row of `values` being the header.

use crate::error::{PulseError, Result};
use crate::model::{FeedbackRow, Mood};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

/// Sheet titles carrying a question link, e.g.
/// `meta.stackoverflow.com/q/423456` or `meta.example.com/questions/99`.
static SHEET_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"meta\.[\w.-]+/(?:q|questions)/(\d+)").expect("valid regex"));

/// First run of digits in a Link cell.
static FIRST_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid regex"));

/// Anything that can answer "give me the feedback rows for question N".
///
/// Returns `Ok(None)` when no source sheet matches the question id — a
/// skipped question, never an error.
pub trait FeedbackSource {
    /// # Errors
    ///
    /// Returns an error when a matching sheet exists but cannot be parsed.
    fn feedback(&self, question_id: i64) -> Result<Option<Vec<FeedbackRow>>>;
}

/// One exported sheet: title plus raw cell grid.
#[derive(Debug, Clone, Deserialize)]
struct SheetExport {
    title: String,
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// A spreadsheet export loaded from disk.
#[derive(Debug, Clone)]
pub struct Workbook {
    sheets: Vec<SheetExport>,
}

impl Workbook {
    /// Load a workbook export file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid
    /// workbook export.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| PulseError::path_error("read", path, e))?;
        Self::from_json(&content)
    }

    /// Parse a workbook export from its JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::InvalidWorkbook`] on malformed JSON.
    pub fn from_json(content: &str) -> Result<Self> {
        let sheets: Vec<SheetExport> =
            serde_json::from_str(content).map_err(|e| PulseError::InvalidWorkbook {
                reason: e.to_string(),
            })?;
        debug!("Loaded workbook with {} sheets", sheets.len());
        Ok(Self { sheets })
    }

    /// Question ids of every sheet whose title matches the question URL
    /// pattern, in workbook order.
    #[must_use]
    pub fn question_ids(&self) -> Vec<i64> {
        self.sheets
            .iter()
            .filter_map(|s| SHEET_TITLE.captures(&s.title))
            .filter_map(|caps| caps[1].parse().ok())
            .collect()
    }

    fn parse_sheet(sheet: &SheetExport, question_id: i64) -> Result<Vec<FeedbackRow>> {
        let Some(header) = sheet.values.first() else {
            return Ok(vec![]);
        };

        let column = |name: &str| -> Result<usize> {
            header
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| PulseError::InvalidWorkbook {
                    reason: format!("sheet '{}' has no '{name}' column", sheet.title),
                })
        };
        let link_col = column("Link")?;
        let theme_col = column("Theme")?;
        let mood_col = column("Mood")?;
        let score_col = column("Score")?;

        fn cell(row: &[String], idx: usize) -> &str {
            row.get(idx).map_or("", |c| c.as_str())
        }

        let mut rows = Vec::new();
        for row in &sheet.values[1..] {
            let link = cell(row, link_col);
            let Some(answer_id) = FIRST_NUMBER
                .find(link)
                .and_then(|m| m.as_str().parse::<i64>().ok())
            else {
                warn!(
                    "Skipping feedback row without a post link in sheet '{}'",
                    sheet.title
                );
                continue;
            };

            let theme = cell(row, theme_col).trim();
            let theme = if theme.is_empty() { "n/a" } else { theme };

            let score = cell(row, score_col).trim().parse::<i64>().unwrap_or(0);

            rows.push(FeedbackRow {
                answer_id,
                question_id,
                theme: theme.to_string(),
                mood: Mood::parse(cell(row, mood_col)),
                score,
            });
        }
        Ok(rows)
    }
}

impl FeedbackSource for Workbook {
    fn feedback(&self, question_id: i64) -> Result<Option<Vec<FeedbackRow>>> {
        for sheet in &self.sheets {
            let Some(caps) = SHEET_TITLE.captures(&sheet.title) else {
                continue;
            };
            let sheet_id: i64 = caps[1].parse().map_err(|_| PulseError::InvalidWorkbook {
                reason: format!("unparseable question id in sheet title '{}'", sheet.title),
            })?;
            if sheet_id != question_id {
                continue;
            }
            return Self::parse_sheet(sheet, question_id).map(Some);
        }
        Ok(None)
    }
}

/// Gather feedback for every question in the series. Questions with no
/// matching sheet are skipped.
///
/// # Errors
///
/// Propagates parse failures from matching sheets.
pub fn collect_feedback(
    source: &dyn FeedbackSource,
    question_ids: &[i64],
) -> Result<Vec<FeedbackRow>> {
    let mut all = Vec::new();
    for &id in question_ids {
        match source.feedback(id)? {
            Some(rows) => all.extend(rows),
            None => debug!("No feedback sheet for question {id}"),
        }
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workbook() -> Workbook {
        Workbook::from_json(
            r#"[
                {
                    "title": "meta.stackoverflow.com/q/423456",
                    "values": [
                        ["Link", "Theme", "Mood", "Score"],
                        ["https://meta.stackoverflow.com/a/423500/1001", "speed", "positive", "5"],
                        ["https://meta.stackoverflow.com/a/423501/1002", "", "negative", "-2"],
                        ["no link here", "docs", "neutral", "1"]
                    ]
                },
                {
                    "title": "notes for next quarter",
                    "values": [["Link", "Theme", "Mood", "Score"]]
                },
                {
                    "title": "meta.example.com/questions/99",
                    "values": [
                        ["Mood", "Score", "Link", "Theme"],
                        ["neutral", "3", "meta.example.com/a/120", "rollout"]
                    ]
                }
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn matches_sheet_by_question_url() {
        let wb = workbook();
        let rows = wb.feedback(423_456).unwrap().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].answer_id, 423_500);
        assert_eq!(rows[0].question_id, 423_456);
        assert_eq!(rows[0].mood, Mood::Positive);
        assert_eq!(rows[0].score, 5);
    }

    #[test]
    fn questions_url_form_also_matches() {
        let wb = workbook();
        let rows = wb.feedback(99).unwrap().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].answer_id, 120);
        assert_eq!(rows[0].theme, "rollout");
    }

    #[test]
    fn blank_theme_becomes_na() {
        let wb = workbook();
        let rows = wb.feedback(423_456).unwrap().unwrap();
        assert_eq!(rows[1].theme, "n/a");
        assert_eq!(rows[1].score, -2);
    }

    #[test]
    fn rows_without_links_are_skipped() {
        let wb = workbook();
        let rows = wb.feedback(423_456).unwrap().unwrap();
        assert!(rows.iter().all(|r| r.theme != "docs"));
    }

    #[test]
    fn missing_sheet_is_none_not_error() {
        let wb = workbook();
        assert!(wb.feedback(12345).unwrap().is_none());
    }

    #[test]
    fn non_matching_titles_are_ignored() {
        // "notes for next quarter" has no question URL; it must never match.
        let wb = workbook();
        assert!(wb.feedback(0).unwrap().is_none());
    }

    #[test]
    fn question_ids_lists_matching_sheets() {
        assert_eq!(workbook().question_ids(), vec![423_456, 99]);
    }

    #[test]
    fn collect_skips_missing_questions() {
        let wb = workbook();
        let rows = collect_feedback(&wb, &[423_456, 7, 99]).unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn missing_column_is_an_error() {
        let wb = Workbook::from_json(
            r#"[{"title": "meta.x.com/q/5", "values": [["Link", "Mood", "Score"], ["a/1", "positive", "2"]]}]"#,
        )
        .unwrap();
        assert!(matches!(
            wb.feedback(5),
            Err(PulseError::InvalidWorkbook { .. })
        ));
    }
}
