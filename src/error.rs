//! Custom error types for metapulse.
//!
//! Provides structured error handling with detailed context for better
//! diagnostics and user experience.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for metapulse operations.
///
/// Each variant provides specific context about what went wrong,
/// enabling better error messages and programmatic error handling.
#[derive(Error, Debug)]
pub enum PulseError {
    // =========================================================================
    // Dataset Errors
    // =========================================================================
    /// Dataset directory not found at the specified path.
    #[error("Dataset not found at '{path}'")]
    DatasetNotFound { path: PathBuf },

    /// Required file missing from the dataset export.
    #[error("Missing required file in dataset: {file}")]
    MissingDatasetFile { file: String },

    /// Failed to parse a dataset file.
    #[error("Failed to parse '{file}': {reason}")]
    ParseError { file: String, reason: String },

    /// Invalid date value in a dataset file.
    #[error("Invalid date '{value}' in {context}")]
    InvalidDate { value: String, context: String },

    /// Feedback workbook export is invalid or corrupt.
    #[error("Invalid feedback workbook: {reason}")]
    InvalidWorkbook { reason: String },

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Database file not found (dataset not yet indexed).
    #[error(
        "No indexed dataset found. Run 'metapulse index <dataset_path>' first.\nExpected database at: {path}"
    )]
    DatabaseNotFound { path: PathBuf },

    /// Database schema version mismatch.
    #[error(
        "Database schema version mismatch: expected {expected}, found {found}. Re-index with --force."
    )]
    SchemaMismatch { expected: i32, found: i32 },

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    // =========================================================================
    // Computation Errors
    // =========================================================================
    /// A cohort handed to a statistical test was empty.
    #[error("Cohort '{cohort}' is empty; the test requires nonempty cohorts")]
    EmptyCohort { cohort: &'static str },

    /// A percentage or average had a zero denominator.
    #[error("Cannot compute {what}: total is zero")]
    ZeroTotal { what: String },

    /// A question id was not present in the dataset.
    #[error("Question {id} not found in the indexed dataset")]
    QuestionNotFound { id: i64 },

    // =========================================================================
    // IO / Configuration Errors
    // =========================================================================
    /// File read/write error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Path-specific IO error with context.
    #[error("Failed to {operation} '{path}': {source}")]
    PathError {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file parsing error.
    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigError { path: PathBuf, reason: String },

    // =========================================================================
    // CLI Errors
    // =========================================================================
    /// Invalid command-line argument.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Catch-all for other errors with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Wrapped anyhow error for gradual migration.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for metapulse operations.
pub type Result<T> = std::result::Result<T, PulseError>;

impl PulseError {
    /// Create a dataset not found error.
    pub fn dataset_not_found(path: impl Into<PathBuf>) -> Self {
        Self::DatasetNotFound { path: path.into() }
    }

    /// Create a parse error.
    pub fn parse_error(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ParseError {
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Create a database not found error.
    pub fn database_not_found(path: impl Into<PathBuf>) -> Self {
        Self::DatabaseNotFound { path: path.into() }
    }

    /// Create a zero-denominator error.
    pub fn zero_total(what: impl Into<String>) -> Self {
        Self::ZeroTotal { what: what.into() }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create a path error with context.
    pub fn path_error(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::PathError {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Wrap an error with additional context.
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Check if this error is recoverable (user can fix it).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DatasetNotFound { .. }
                | Self::DatabaseNotFound { .. }
                | Self::QuestionNotFound { .. }
                | Self::EmptyCohort { .. }
                | Self::ZeroTotal { .. }
                | Self::InvalidArgument { .. }
        )
    }

    /// Get a suggestion for how to fix this error, if applicable.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::DatasetNotFound { .. } | Self::MissingDatasetFile { .. } => {
                Some("Verify the dataset path; it must contain the CSV export (posts.csv, users.csv, ...).")
            }
            Self::DatabaseNotFound { .. } => {
                Some("Run 'metapulse index <dataset_path>' to build the snapshot database.")
            }
            Self::SchemaMismatch { .. } => {
                Some("Run 'metapulse index --force <dataset_path>' to rebuild the snapshot.")
            }
            Self::EmptyCohort { .. } => {
                Some("Pick a cutoff date inside the activity range so both cohorts are populated.")
            }
            Self::QuestionNotFound { .. } => {
                Some("Check the question id against 'metapulse stats'; only indexed posts can be graded.")
            }
            _ => None,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error.
    ///
    /// # Errors
    ///
    /// Returns the original error wrapped with additional context.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily (only evaluated on error).
    ///
    /// # Errors
    ///
    /// Returns the original error wrapped with additional context.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PulseError::with_context(context, e))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| PulseError::with_context(f(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PulseError::dataset_not_found("/path/to/export");
        assert!(err.to_string().contains("/path/to/export"));
    }

    #[test]
    fn test_error_suggestions() {
        let err = PulseError::database_not_found("/path/to/db");
        assert!(err.suggestion().is_some());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_zero_total_is_recoverable() {
        let err = PulseError::zero_total("feedback score share");
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("total is zero"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PulseError = io_err.into();
        assert!(matches!(err, PulseError::IoError(_)));
    }

    #[test]
    fn test_result_ext_context() {
        let res: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "inner failure",
        ));
        let err = res.context("while loading snapshot").unwrap_err();
        assert!(err.to_string().contains("while loading snapshot"));
    }
}
