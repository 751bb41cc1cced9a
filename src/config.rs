//! Configuration system for metapulse.
//!
//! Provides layered configuration from multiple sources:
//!
//! 1. **Compiled defaults** - Sensible defaults built into the binary
//! 2. **User config file** - `~/.config/metapulse/config.toml`
//! 3. **Environment variables** - `METAPULSE_*` prefix
//! 4. **CLI arguments** - Highest priority, always wins
//!
//! # Example Configuration File
//!
//! ```toml
//! [paths]
//! db = "~/.local/share/metapulse/metapulse.db"
//! dataset = "/data/meta-export"
//! workbook = "/data/feedback.json"
//!
//! [series]
//! questions = [423456, 424001, 424800]
//!
//! [report]
//! format = "text"
//! colors = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Main configuration structure for metapulse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path-related configuration.
    pub paths: PathsConfig,
    /// The announcement series under analysis.
    pub series: SeriesConfig,
    /// Report output configuration.
    pub report: ReportConfig,
}

/// Path configuration for database and input locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Path to the `SQLite` snapshot database.
    /// Environment variable: `METAPULSE_DB`
    pub db: Option<PathBuf>,

    /// Default dataset export directory (for repeated indexing).
    /// Environment variable: `METAPULSE_DATASET`
    pub dataset: Option<PathBuf>,

    /// Default feedback workbook export file.
    /// Environment variable: `METAPULSE_WORKBOOK`
    pub workbook: Option<PathBuf>,
}

/// The question ids making up the announcement series.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesConfig {
    /// Question ids, in publication order.
    pub questions: Vec<i64>,
}

/// Report output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Default output format: text, json, json-pretty, csv.
    pub format: String,

    /// Enable colored output.
    pub colors: bool,

    /// Suppress non-essential output (progress bars, etc.).
    pub quiet: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            colors: true,
            quiet: false,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. User config file (~/.config/metapulse/config.toml)
    /// 3. Compiled defaults
    #[must_use]
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load from user config file
        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        // Override from environment variables
        config.apply_env_overrides();

        debug!("Configuration loaded: {:?}", config);
        config
    }

    /// Load configuration from a specific file.
    #[must_use]
    pub fn load_from_file(path: &PathBuf) -> Option<Self> {
        if !path.exists() {
            debug!("Config file not found: {}", path.display());
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    info!("Loaded config from: {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Load the user configuration file from the standard location.
    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        Self::load_from_file(&config_path)
    }

    /// Get the path to the user configuration file.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("metapulse").join("config.toml"))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(db) = std::env::var("METAPULSE_DB") {
            self.paths.db = Some(PathBuf::from(db));
        }
        if let Ok(dataset) = std::env::var("METAPULSE_DATASET") {
            self.paths.dataset = Some(PathBuf::from(dataset));
        }
        if let Ok(workbook) = std::env::var("METAPULSE_WORKBOOK") {
            self.paths.workbook = Some(PathBuf::from(workbook));
        }

        if let Ok(format) = std::env::var("METAPULSE_FORMAT") {
            self.report.format = format;
        }
        if std::env::var("METAPULSE_NO_COLOR").is_ok() || std::env::var("NO_COLOR").is_ok() {
            self.report.colors = false;
        }
        if std::env::var("METAPULSE_QUIET").is_ok() {
            self.report.quiet = true;
        }
    }

    /// Merge another config into this one (other takes precedence).
    fn merge(&mut self, other: Self) {
        // Paths
        if other.paths.db.is_some() {
            self.paths.db = other.paths.db;
        }
        if other.paths.dataset.is_some() {
            self.paths.dataset = other.paths.dataset;
        }
        if other.paths.workbook.is_some() {
            self.paths.workbook = other.paths.workbook;
        }

        // Series
        if !other.series.questions.is_empty() {
            self.series.questions = other.series.questions;
        }

        // Report (always override if present in other)
        self.report.format = other.report.format;
        self.report.colors = other.report.colors;
        self.report.quiet = other.report.quiet;
    }

    /// Get the database path, using defaults if not configured.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.paths.db.clone().unwrap_or_else(crate::default_db_path)
    }

    /// Save the current configuration to the user config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined,
    /// the parent directory cannot be created, or the file cannot be
    /// written.
    pub fn save(&self) -> std::io::Result<()> {
        let config_path = Self::user_config_path().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory",
            )
        })?;

        // Create parent directory if needed
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        std::fs::write(&config_path, content)?;
        info!("Saved config to: {}", config_path.display());
        Ok(())
    }

    /// Generate a default configuration file content.
    #[must_use]
    pub fn default_config_content() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.series.questions.is_empty());
        assert_eq!(config.report.format, "text");
        assert!(config.report.colors);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config.report.format, parsed.report.format);
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config::default();
        let mut other = Config::default();
        other.series.questions = vec![1, 2, 3];
        other.paths.db = Some(PathBuf::from("/custom/path"));

        base.merge(other);

        assert_eq!(base.series.questions, vec![1, 2, 3]);
        assert_eq!(base.paths.db, Some(PathBuf::from("/custom/path")));
    }

    #[test]
    fn test_default_config_content() {
        let content = Config::default_config_content();
        assert!(content.contains("[paths]"));
        assert!(content.contains("[series]"));
        assert!(content.contains("[report]"));
    }
}
