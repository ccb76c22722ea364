//! Configuration constants and runtime settings for the harvester.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{HarvesterError, Result};

/// HTTP timeout for API calls in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// HTTP timeout for ReShare JSON exports, which can be slow to render.
pub const EXPORT_TIMEOUT_SECS: u64 = 60;

/// HTTP timeout for file downloads in seconds.
pub const DOWNLOAD_TIMEOUT_SECS: u64 = 120;

/// Attempts made by a file download before giving up on connection errors.
pub const DOWNLOAD_MAX_ATTEMPTS: u32 = 3;

/// First backoff delay for download retries; doubles on each attempt.
pub const DOWNLOAD_RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

/// Chunk size used when streaming downloads and hashing files.
pub const CHUNK_SIZE: usize = 8192;

/// Maximum length of the title part of a dataset directory name.
pub const SLUG_MAX_LEN: usize = 60;

/// Default number of extra rounds `scrape-all` gives to failed sources.
pub const DEFAULT_SOURCE_RETRIES: u32 = 2;

/// Known QDA project file extensions.
pub const QDA_EXTENSIONS: &[&str] = &[
    ".qdpx",    // REFI-QDA project
    ".qde",     // REFI-QDA codebook exchange
    ".mx",      // MAXQDA
    ".mx18",    // MAXQDA 2018
    ".mx20",    // MAXQDA 2020
    ".mx22",    // MAXQDA 2022
    ".mx24",    // MAXQDA 2024
    ".nvp",     // NVivo (Windows)
    ".nvpx",    // NVivo (Mac)
    ".atlproj", // ATLAS.ti
    ".ddx",     // Dedoose
    ".qda",     // QDA Miner
];

/// Extensions of plain qualitative material (transcripts, field notes).
pub const QUALITATIVE_EXTENSIONS: &[&str] = &[".txt", ".pdf", ".rtf", ".docx"];

/// Directory name under the data root for each source.
pub const SOURCE_DIR_NAMES: &[(&str, &str)] = &[
    ("qdr", "qdr"),
    ("dans", "dans"),
    ("dataverseno", "dataverse-no"),
    ("zenodo", "zenodo"),
    ("dryad", "dryad"),
    ("ukds", "uk-data-service"),
    ("qualidatanet", "qualidata-net"),
];

/// Directory name for a source, falling back to the source name itself.
///
/// # Examples
/// ```
/// use qdarchive_harvester::config::source_dir_name;
///
/// assert_eq!(source_dir_name("ukds"), "uk-data-service");
/// assert_eq!(source_dir_name("custom"), "custom");
/// ```
pub fn source_dir_name(source: &str) -> &str {
    SOURCE_DIR_NAMES
        .iter()
        .find(|(name, _)| *name == source)
        .map_or(source, |(_, dir)| dir)
}

/// Runtime settings for a harvest run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestConfig {
    /// Root of the downloaded file tree.
    pub data_dir: PathBuf,
    /// Directory CSV exports are written to.
    pub exports_dir: PathBuf,
    /// SQLite catalog location.
    pub db_path: PathBuf,
    /// Extra rounds `scrape-all` gives to sources that failed.
    pub source_retries: u32,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            exports_dir: PathBuf::from("exports"),
            db_path: PathBuf::from("qdarchive.db"),
            source_retries: DEFAULT_SOURCE_RETRIES,
        }
    }
}

impl HarvestConfig {
    /// Build settings from `QDARCHIVE_*` environment variables.
    ///
    /// Unset variables keep their defaults; a malformed retry count is an error.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("QDARCHIVE_DATA_DIR") {
            config.data_dir = dir.into();
        }
        if let Ok(dir) = std::env::var("QDARCHIVE_EXPORTS_DIR") {
            config.exports_dir = dir.into();
        }
        if let Ok(path) = std::env::var("QDARCHIVE_DB_PATH") {
            config.db_path = path.into();
        }
        if let Ok(value) = std::env::var("QDARCHIVE_SOURCE_RETRIES") {
            config.source_retries = value.parse().map_err(|_| {
                HarvesterError::Config(format!(
                    "QDARCHIVE_SOURCE_RETRIES must be a non-negative integer, got '{value}'"
                ))
            })?;
        }

        Ok(config)
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_db_path(mut self, db_path: impl Into<PathBuf>) -> Self {
        self.db_path = db_path.into();
        self
    }

    pub fn with_source_retries(mut self, retries: u32) -> Self {
        self.source_retries = retries;
        self
    }

    /// Default CSV export location.
    pub fn default_export_path(&self) -> PathBuf {
        self.exports_dir.join("metadata.csv")
    }

    /// Create the data and export directories if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.exports_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_dir_name_known() {
        assert_eq!(source_dir_name("dataverseno"), "dataverse-no");
        assert_eq!(source_dir_name("qualidatanet"), "qualidata-net");
        assert_eq!(source_dir_name("zenodo"), "zenodo");
    }

    #[test]
    fn test_source_dir_name_fallback() {
        assert_eq!(source_dir_name("figshare"), "figshare");
    }

    #[test]
    fn test_extension_sets_are_lowercase_with_dot() {
        for ext in QDA_EXTENSIONS.iter().chain(QUALITATIVE_EXTENSIONS) {
            assert!(ext.starts_with('.'), "{ext} lacks a leading dot");
            assert_eq!(*ext, ext.to_lowercase());
        }
    }

    #[test]
    fn test_builder_overrides() {
        let config = HarvestConfig::default()
            .with_data_dir("/tmp/qda")
            .with_db_path("/tmp/qda.db")
            .with_source_retries(5);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/qda"));
        assert_eq!(config.db_path, PathBuf::from("/tmp/qda.db"));
        assert_eq!(config.source_retries, 5);
        assert_eq!(
            config.default_export_path(),
            PathBuf::from("exports/metadata.csv")
        );
    }
}
