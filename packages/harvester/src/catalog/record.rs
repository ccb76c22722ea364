//! The persisted catalog row.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::classify::is_qda;
use crate::license::effective_license;
use crate::text::join_list;
use crate::types::{FileInfo, SearchResult};

/// Column order of the `files` table, shared by SQL and CSV export.
pub const COLUMNS: &[&str] = &[
    "id",
    "source_name",
    "source_url",
    "download_url",
    "file_name",
    "file_type",
    "file_hash",
    "file_size_bytes",
    "local_path",
    "local_directory",
    "license_type",
    "license_url",
    "title",
    "description",
    "authors",
    "date_published",
    "tags",
    "keywords",
    "kind_of_data",
    "language",
    "content_type",
    "friendly_type",
    "software",
    "geographic_coverage",
    "restricted",
    "api_checksum",
    "depositor",
    "producer",
    "publication",
    "date_of_collection",
    "time_period_covered",
    "uploader_name",
    "uploader_email",
    "is_qda_file",
    "downloaded_at",
    "created_at",
    "notes",
];

/// Note stored for files skipped because of their type.
pub const NOTE_IRRELEVANT: &str = "irrelevant file type";
/// Note stored for files the source flags as restricted.
pub const NOTE_RESTRICTED: &str = "access restricted";
/// Note stored for files whose download was refused with HTTP 403.
pub const NOTE_FORBIDDEN: &str = "access restricted (403)";

/// One discovered file, downloaded or metadata-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Row id, `None` until inserted.
    pub id: Option<i64>,
    pub source_name: String,
    pub source_url: String,
    pub download_url: String,
    pub file_name: String,
    /// Lowercase extension with a leading dot.
    pub file_type: String,
    pub file_hash: Option<String>,
    pub file_size_bytes: Option<i64>,
    pub local_path: Option<String>,
    pub local_directory: String,
    pub license_type: String,
    pub license_url: String,
    pub title: String,
    pub description: String,
    pub authors: String,
    pub date_published: String,
    pub tags: String,
    pub keywords: String,
    pub kind_of_data: String,
    pub language: String,
    pub content_type: String,
    pub friendly_type: String,
    pub software: String,
    pub geographic_coverage: String,
    pub restricted: bool,
    pub api_checksum: String,
    pub depositor: String,
    pub producer: String,
    pub publication: String,
    pub date_of_collection: String,
    pub time_period_covered: String,
    pub uploader_name: String,
    pub uploader_email: String,
    pub is_qda_file: bool,
    pub downloaded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl CatalogRecord {
    /// Mirror a dataset's metadata for one of its files.
    ///
    /// `is_qda_file` is decided here, once.
    pub fn for_file(result: &SearchResult, file: &FileInfo, local_directory: &str) -> Self {
        Self {
            id: None,
            source_name: result.source_name.clone(),
            source_url: result.source_url.clone(),
            download_url: file.download_url.clone(),
            file_name: file.name.clone(),
            file_type: file.extension(),
            file_hash: None,
            file_size_bytes: i64::try_from(file.size).ok(),
            local_path: None,
            local_directory: local_directory.to_string(),
            license_type: effective_license(&result.license_type, &result.license_url),
            license_url: result.license_url.clone(),
            title: result.title.clone(),
            description: result.description.clone(),
            authors: result.authors.clone(),
            date_published: result.date_published.clone(),
            tags: join_list(&result.tags),
            keywords: join_list(&result.keywords),
            kind_of_data: join_list(&result.kind_of_data),
            language: join_list(&result.language),
            content_type: file.content_type.clone(),
            friendly_type: file.friendly_type.clone(),
            software: join_list(&result.software),
            geographic_coverage: join_list(&result.geographic_coverage),
            restricted: file.restricted,
            api_checksum: file.api_checksum.clone(),
            depositor: result.depositor.clone(),
            producer: join_list(&result.producer),
            publication: join_list(&result.publication),
            date_of_collection: result.date_of_collection.clone(),
            time_period_covered: result.time_period_covered.clone(),
            uploader_name: result.uploader_name.clone(),
            uploader_email: result.uploader_email.clone(),
            is_qda_file: is_qda(file),
            downloaded_at: None,
            created_at: Utc::now(),
            notes: None,
        }
    }

    /// Turn into a downloaded record; a local path always comes with a hash.
    pub fn downloaded(mut self, local_path: &str, file_hash: &str, size: Option<u64>) -> Self {
        self.local_path = Some(local_path.to_string());
        self.file_hash = Some(file_hash.to_string());
        if let Some(size) = size.and_then(|s| i64::try_from(s).ok()) {
            self.file_size_bytes = Some(size);
        }
        self.downloaded_at = Some(Utc::now());
        self
    }

    /// Turn into a metadata-only record with an explanatory note.
    pub fn metadata_only(mut self, note: &str) -> Self {
        self.local_path = None;
        self.file_hash = None;
        self.downloaded_at = None;
        self.notes = Some(note.to_string());
        self
    }

    #[must_use]
    pub fn is_downloaded(&self) -> bool {
        self.local_path.is_some()
    }

    /// Read a row selected with [`COLUMNS`].
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            source_name: row.get("source_name")?,
            source_url: row.get("source_url")?,
            download_url: row.get("download_url")?,
            file_name: row.get("file_name")?,
            file_type: row.get("file_type")?,
            file_hash: row.get("file_hash")?,
            file_size_bytes: row.get("file_size_bytes")?,
            local_path: row.get("local_path")?,
            local_directory: row.get("local_directory")?,
            license_type: row.get("license_type")?,
            license_url: row.get("license_url")?,
            title: row.get("title")?,
            description: row.get("description")?,
            authors: row.get("authors")?,
            date_published: row.get("date_published")?,
            tags: row.get("tags")?,
            keywords: row.get("keywords")?,
            kind_of_data: row.get("kind_of_data")?,
            language: row.get("language")?,
            content_type: row.get("content_type")?,
            friendly_type: row.get("friendly_type")?,
            software: row.get("software")?,
            geographic_coverage: row.get("geographic_coverage")?,
            restricted: row.get("restricted")?,
            api_checksum: row.get("api_checksum")?,
            depositor: row.get("depositor")?,
            producer: row.get("producer")?,
            publication: row.get("publication")?,
            date_of_collection: row.get("date_of_collection")?,
            time_period_covered: row.get("time_period_covered")?,
            uploader_name: row.get("uploader_name")?,
            uploader_email: row.get("uploader_email")?,
            is_qda_file: row.get("is_qda_file")?,
            downloaded_at: row.get("downloaded_at")?,
            created_at: row.get("created_at")?,
            notes: row.get("notes")?,
        })
    }

    /// Values in [`COLUMNS`] order, rendered as text for flat export.
    pub fn to_row_strings(&self) -> Vec<String> {
        fn opt<T: ToString>(value: &Option<T>) -> String {
            value.as_ref().map(ToString::to_string).unwrap_or_default()
        }

        vec![
            opt(&self.id),
            self.source_name.clone(),
            self.source_url.clone(),
            self.download_url.clone(),
            self.file_name.clone(),
            self.file_type.clone(),
            opt(&self.file_hash),
            opt(&self.file_size_bytes),
            opt(&self.local_path),
            self.local_directory.clone(),
            self.license_type.clone(),
            self.license_url.clone(),
            self.title.clone(),
            self.description.clone(),
            self.authors.clone(),
            self.date_published.clone(),
            self.tags.clone(),
            self.keywords.clone(),
            self.kind_of_data.clone(),
            self.language.clone(),
            self.content_type.clone(),
            self.friendly_type.clone(),
            self.software.clone(),
            self.geographic_coverage.clone(),
            self.restricted.to_string(),
            self.api_checksum.clone(),
            self.depositor.clone(),
            self.producer.clone(),
            self.publication.clone(),
            self.date_of_collection.clone(),
            self.time_period_covered.clone(),
            self.uploader_name.clone(),
            self.uploader_email.clone(),
            self.is_qda_file.to_string(),
            self.downloaded_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            self.created_at.to_rfc3339(),
            opt(&self.notes),
        ]
    }
}
