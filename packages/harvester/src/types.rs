//! Core data types shared by connectors and the orchestrator.
//!
//! Connectors normalize every source API into [`SearchResult`] and
//! [`FileInfo`]. Both are transient: the orchestrator copies what it keeps
//! into a [`crate::catalog::CatalogRecord`].

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// A dataset-level record returned by a connector.
///
/// `search` fills the summary fields and leaves `files` empty;
/// `get_metadata` fills everything it can extract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Registry key of the source (e.g. "zenodo").
    pub source_name: String,
    /// Stable URL of the dataset within its source.
    pub source_url: String,
    /// Identifier of the dataset within its source (DOI, record id, ...).
    pub record_id: String,
    pub title: String,
    pub description: String,
    /// Authors joined with `"; "`.
    pub authors: String,
    pub license_type: String,
    pub license_url: String,
    pub date_published: String,
    pub tags: Vec<String>,
    pub keywords: Vec<String>,
    pub kind_of_data: Vec<String>,
    pub language: Vec<String>,
    pub software: Vec<String>,
    pub geographic_coverage: Vec<String>,
    pub depositor: String,
    pub producer: Vec<String>,
    pub publication: Vec<String>,
    pub date_of_collection: String,
    pub time_period_covered: String,
    pub uploader_name: String,
    pub uploader_email: String,
    pub files: Vec<FileInfo>,
}

impl SearchResult {
    /// Create an empty result for a source and URL.
    pub fn new(source_name: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            source_url: source_url.into(),
            ..Self::default()
        }
    }

    /// Record identifier, falling back to the last segment of the source URL.
    #[must_use]
    pub fn effective_record_id(&self) -> &str {
        if !self.record_id.is_empty() {
            return &self.record_id;
        }
        self.source_url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

/// One downloadable unit within a [`SearchResult`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub download_url: String,
    /// Size in bytes as reported by the source.
    pub size: u64,
    pub content_type: String,
    /// Human label for the format, e.g. "REFI-QDA Project" or "pdf".
    pub friendly_type: String,
    pub restricted: bool,
    /// Source checksum as `"<algo>:<hex>"`, empty when not reported.
    pub api_checksum: String,
    /// Source-specific file identifier.
    pub id: String,
}

impl FileInfo {
    pub fn new(name: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            download_url: download_url.into(),
            ..Self::default()
        }
    }

    /// Lowercase extension with a leading dot, or an empty string.
    ///
    /// # Examples
    /// ```
    /// use qdarchive_harvester::types::FileInfo;
    ///
    /// assert_eq!(FileInfo::new("Study.QDPX", "").extension(), ".qdpx");
    /// assert_eq!(FileInfo::new("README", "").extension(), "");
    /// ```
    #[must_use]
    pub fn extension(&self) -> String {
        file_extension(&self.name)
    }
}

/// Lowercase extension of a file name with a leading dot.
pub fn file_extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

/// Counters produced by a harvest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestStats {
    /// Files downloaded and cataloged.
    pub downloaded: usize,
    /// Files cataloged as metadata-only because access was restricted.
    pub restricted: usize,
    /// Datasets dropped by the license or relevance gate.
    pub skipped: usize,
    /// Datasets whose metadata was fetched.
    pub datasets_seen: usize,
    /// Files already present in the catalog.
    pub already_cataloged: usize,
    /// Downloads discarded because identical content was already stored.
    pub duplicates: usize,
    /// Files cataloged as metadata-only because of their type.
    pub irrelevant: usize,
    /// Downloads that failed for reasons other than access restrictions.
    pub failed: usize,
}

impl HarvestStats {
    /// Add another run's counters to this one.
    pub fn merge(&mut self, other: &HarvestStats) {
        self.downloaded += other.downloaded;
        self.restricted += other.restricted;
        self.skipped += other.skipped;
        self.datasets_seen += other.datasets_seen;
        self.already_cataloged += other.already_cataloged;
        self.duplicates += other.duplicates;
        self.irrelevant += other.irrelevant;
        self.failed += other.failed;
    }
}

/// Final state of a source after `scrape-all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceStatus {
    Ok,
    Failed,
}

impl SourceStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-source line of the `scrape-all` summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub source_name: String,
    pub status: SourceStatus,
    /// Number of times the source was attempted.
    pub attempts: u32,
    /// Counters accumulated over all attempts.
    pub stats: HarvestStats,
    pub last_error: Option<String>,
}
