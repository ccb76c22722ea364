//! SQLite-backed catalog of harvested files.
//!
//! One row per discovered file. Rows are written once, as either a
//! downloaded record or a metadata-only record, and every write commits
//! immediately so an interrupted run keeps everything decided so far.

mod filter;
mod record;

pub use filter::{normalize_file_type, CatalogFilter};
pub use record::{CatalogRecord, COLUMNS, NOTE_FORBIDDEN, NOTE_IRRELEVANT, NOTE_RESTRICTED};

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::{HarvesterError, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_name TEXT NOT NULL,
    source_url TEXT NOT NULL,
    download_url TEXT NOT NULL,
    file_name TEXT NOT NULL,
    file_type TEXT NOT NULL DEFAULT '',
    file_hash TEXT,
    file_size_bytes INTEGER,
    local_path TEXT,
    local_directory TEXT NOT NULL DEFAULT '',
    license_type TEXT NOT NULL DEFAULT '',
    license_url TEXT NOT NULL DEFAULT '',
    title TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    authors TEXT NOT NULL DEFAULT '',
    date_published TEXT NOT NULL DEFAULT '',
    tags TEXT NOT NULL DEFAULT '',
    keywords TEXT NOT NULL DEFAULT '',
    kind_of_data TEXT NOT NULL DEFAULT '',
    language TEXT NOT NULL DEFAULT '',
    content_type TEXT NOT NULL DEFAULT '',
    friendly_type TEXT NOT NULL DEFAULT '',
    software TEXT NOT NULL DEFAULT '',
    geographic_coverage TEXT NOT NULL DEFAULT '',
    restricted BOOLEAN NOT NULL DEFAULT 0,
    api_checksum TEXT NOT NULL DEFAULT '',
    depositor TEXT NOT NULL DEFAULT '',
    producer TEXT NOT NULL DEFAULT '',
    publication TEXT NOT NULL DEFAULT '',
    date_of_collection TEXT NOT NULL DEFAULT '',
    time_period_covered TEXT NOT NULL DEFAULT '',
    uploader_name TEXT NOT NULL DEFAULT '',
    uploader_email TEXT NOT NULL DEFAULT '',
    is_qda_file BOOLEAN NOT NULL DEFAULT 0,
    downloaded_at TEXT,
    created_at TEXT NOT NULL,
    notes TEXT,
    CHECK (local_path IS NULL OR file_hash IS NOT NULL)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_files_key
    ON files(source_name, download_url, file_name);

CREATE UNIQUE INDEX IF NOT EXISTS idx_files_hash
    ON files(file_hash) WHERE file_hash IS NOT NULL;

CREATE INDEX IF NOT EXISTS idx_files_source ON files(source_name);
"#;

/// Aggregate counts shown by the `status` command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub total: usize,
    pub qda_files: usize,
    pub downloaded: usize,
    pub restricted: usize,
    pub by_source: BTreeMap<String, usize>,
    pub by_language: BTreeMap<String, usize>,
    pub by_software: BTreeMap<String, usize>,
}

/// Handle on the catalog database, owned for the duration of a run.
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Open (or create) the catalog at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "Opened catalog");
        Self::with_connection(conn)
    }

    /// A throwaway catalog, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Persist a new record and return its id.
    ///
    /// Fails if the dedup key or the content hash is already present.
    pub fn insert(&self, record: &CatalogRecord) -> Result<i64> {
        let row = record;
        self.conn.execute(
            r#"
            INSERT INTO files (
                source_name, source_url, download_url, file_name, file_type,
                file_hash, file_size_bytes, local_path, local_directory,
                license_type, license_url, title, description, authors,
                date_published, tags, keywords, kind_of_data, language,
                content_type, friendly_type, software, geographic_coverage,
                restricted, api_checksum, depositor, producer, publication,
                date_of_collection, time_period_covered, uploader_name,
                uploader_email, is_qda_file, downloaded_at, created_at, notes
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26,
                ?27, ?28, ?29, ?30, ?31, ?32, ?33, ?34, ?35, ?36
            )
            "#,
            params![
                row.source_name,
                row.source_url,
                row.download_url,
                row.file_name,
                row.file_type,
                row.file_hash,
                row.file_size_bytes,
                row.local_path,
                row.local_directory,
                row.license_type,
                row.license_url,
                row.title,
                row.description,
                row.authors,
                row.date_published,
                row.tags,
                row.keywords,
                row.kind_of_data,
                row.language,
                row.content_type,
                row.friendly_type,
                row.software,
                row.geographic_coverage,
                row.restricted,
                row.api_checksum,
                row.depositor,
                row.producer,
                row.publication,
                row.date_of_collection,
                row.time_period_covered,
                row.uploader_name,
                row.uploader_email,
                row.is_qda_file,
                row.downloaded_at,
                row.created_at,
                row.notes,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Look up a record by its dedup key.
    pub fn find_by_key(
        &self,
        source_name: &str,
        download_url: &str,
        file_name: &str,
    ) -> Result<Option<CatalogRecord>> {
        let sql = format!(
            "SELECT {} FROM files WHERE source_name = ?1 AND download_url = ?2 AND file_name = ?3",
            COLUMNS.join(", ")
        );
        let record = self
            .conn
            .query_row(&sql, params![source_name, download_url, file_name], |row| {
                CatalogRecord::from_row(row)
            })
            .optional()?;
        Ok(record)
    }

    /// Whether a record with this dedup key exists.
    pub fn exists(&self, source_name: &str, download_url: &str, file_name: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM files WHERE source_name = ?1 AND download_url = ?2 AND file_name = ?3",
                params![source_name, download_url, file_name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Whether some record stores its file at `local_path`.
    pub fn owns_path(&self, local_path: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM files WHERE local_path = ?1 LIMIT 1",
                params![local_path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Look up the downloaded record with this content hash.
    pub fn find_by_hash(&self, file_hash: &str) -> Result<Option<CatalogRecord>> {
        let sql = format!("SELECT {} FROM files WHERE file_hash = ?1", COLUMNS.join(", "));
        let record = self
            .conn
            .query_row(&sql, params![file_hash], |row| CatalogRecord::from_row(row))
            .optional()?;
        Ok(record)
    }

    /// Fetch a record by id.
    pub fn get(&self, id: i64) -> Result<CatalogRecord> {
        let sql = format!("SELECT {} FROM files WHERE id = ?1", COLUMNS.join(", "));
        self.conn
            .query_row(&sql, params![id], |row| CatalogRecord::from_row(row))
            .optional()?
            .ok_or_else(|| HarvesterError::RecordNotFound(format!("catalog id {id}")))
    }

    /// Number of records matching the filter.
    pub fn count(&self, filter: &CatalogFilter) -> Result<usize> {
        let (clause, values) = filter.to_sql();
        let sql = format!("SELECT COUNT(*) FROM files{clause}");
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(values), |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Records matching the filter, ordered by id.
    pub fn list(&self, filter: &CatalogFilter, limit: Option<usize>) -> Result<Vec<CatalogRecord>> {
        let (clause, values) = filter.to_sql();
        let mut sql = format!("SELECT {} FROM files{clause} ORDER BY id", COLUMNS.join(", "));
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), |row| CatalogRecord::from_row(row))?;
        let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Every record, ordered by id.
    pub fn records(&self) -> Result<Vec<CatalogRecord>> {
        self.list(&CatalogFilter::default(), None)
    }

    /// Aggregate counts for the status report.
    pub fn stats(&self) -> Result<CatalogStats> {
        let count = |filter: CatalogFilter| self.count(&filter);

        let mut stats = CatalogStats {
            total: count(CatalogFilter::new())?,
            qda_files: count(CatalogFilter::new().qda_only())?,
            downloaded: count(CatalogFilter::new().downloaded_only())?,
            restricted: count(CatalogFilter::new().restricted(true))?,
            ..CatalogStats::default()
        };

        let mut stmt = self
            .conn
            .prepare("SELECT source_name, COUNT(*) FROM files GROUP BY source_name")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (source, n) = row?;
            stats.by_source.insert(source, usize::try_from(n).unwrap_or_default());
        }

        // Language and software columns hold "; "-joined lists.
        let mut stmt = self.conn.prepare("SELECT language, software FROM files")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (language, software) = row?;
            tally(&mut stats.by_language, &language);
            tally(&mut stats.by_software, &software);
        }

        Ok(stats)
    }

    /// Delete every record. Returns the number removed.
    pub fn reset(&self) -> Result<usize> {
        let removed = self.conn.execute("DELETE FROM files", [])?;
        tracing::info!(removed, "Catalog reset");
        Ok(removed)
    }
}

fn tally(counts: &mut BTreeMap<String, usize>, joined: &str) {
    for value in joined.split("; ").map(str::trim).filter(|v| !v.is_empty()) {
        *counts.entry(value.to_string()).or_default() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileInfo, SearchResult};
    use pretty_assertions::assert_eq;

    fn record(source: &str, url: &str, name: &str) -> CatalogRecord {
        let result = SearchResult {
            title: "Focus groups with teachers".to_string(),
            description: "Qualitative focus group transcripts".to_string(),
            license_type: "CC BY 4.0".to_string(),
            language: vec!["English".to_string(), "Dutch".to_string()],
            software: vec!["NVivo".to_string()],
            keywords: vec!["education".to_string()],
            ..SearchResult::new(source, format!("https://example.org/{source}/1"))
        };
        CatalogRecord::for_file(&result, &FileInfo::new(name, url), "focus-groups-1")
    }

    #[test]
    fn test_insert_and_get() {
        let catalog = Catalog::open_in_memory().unwrap();
        let rec = record("zenodo", "https://example.org/f/1", "a.qdpx").downloaded("/d/a.qdpx", "h1", None);
        let id = catalog.insert(&rec).unwrap();

        let stored = catalog.get(id).unwrap();
        assert_eq!(stored.id, Some(id));
        assert_eq!(stored.file_name, "a.qdpx");
        assert_eq!(stored.file_hash.as_deref(), Some("h1"));
        assert!(stored.is_qda_file);
    }

    #[test]
    fn test_get_missing() {
        let catalog = Catalog::open_in_memory().unwrap();
        assert!(matches!(catalog.get(42), Err(HarvesterError::RecordNotFound(_))));
    }

    #[test]
    fn test_dedup_key_is_unique() {
        let catalog = Catalog::open_in_memory().unwrap();
        let rec = record("ukds", "https://example.org/doc/9", "a.txt").metadata_only(NOTE_RESTRICTED);
        catalog.insert(&rec).unwrap();
        assert!(catalog.insert(&rec).is_err());

        // Same URL, different file name is a different file.
        let other = record("ukds", "https://example.org/doc/9", "b.txt").metadata_only(NOTE_RESTRICTED);
        catalog.insert(&other).unwrap();

        assert!(catalog.exists("ukds", "https://example.org/doc/9", "a.txt").unwrap());
        assert!(!catalog.exists("ukds", "https://example.org/doc/9", "c.txt").unwrap());
        assert!(catalog.find_by_key("ukds", "https://example.org/doc/9", "b.txt").unwrap().is_some());
    }

    #[test]
    fn test_hash_is_unique_when_present() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog
            .insert(&record("qdr", "u1", "a.pdf").downloaded("/d/a.pdf", "same", None))
            .unwrap();
        assert!(catalog
            .insert(&record("qdr", "u2", "b.pdf").downloaded("/d/b.pdf", "same", None))
            .is_err());

        // Metadata-only rows have no hash and never collide.
        catalog.insert(&record("qdr", "u3", "c.pdf").metadata_only(NOTE_IRRELEVANT)).unwrap();
        catalog.insert(&record("qdr", "u4", "d.pdf").metadata_only(NOTE_IRRELEVANT)).unwrap();

        assert_eq!(catalog.find_by_hash("same").unwrap().unwrap().download_url, "u1");
        assert!(catalog.find_by_hash("other").unwrap().is_none());
    }

    #[test]
    fn test_filters_and_stats() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog
            .insert(&record("zenodo", "u1", "a.qdpx").downloaded("/d/a.qdpx", "h1", None))
            .unwrap();
        catalog.insert(&record("zenodo", "u2", "b.pdf").metadata_only(NOTE_RESTRICTED)).unwrap();
        catalog
            .insert(&record("dans", "u3", "c.txt").downloaded("/d/c.txt", "h3", None))
            .unwrap();

        assert_eq!(catalog.count(&CatalogFilter::new().source("zenodo")).unwrap(), 2);
        assert_eq!(catalog.count(&CatalogFilter::new().file_type("qdpx")).unwrap(), 1);
        assert_eq!(catalog.count(&CatalogFilter::new().downloaded_only()).unwrap(), 2);
        assert_eq!(catalog.count(&CatalogFilter::new().language("dutch")).unwrap(), 3);
        assert_eq!(catalog.count(&CatalogFilter::new().search("TEACHERS")).unwrap(), 3);
        assert_eq!(catalog.count(&CatalogFilter::new().license("cc-by")).unwrap(), 3);

        let listed = catalog.list(&CatalogFilter::new(), Some(2)).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].download_url, "u1");

        let stats = catalog.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.qda_files, 1);
        assert_eq!(stats.downloaded, 2);
        assert_eq!(stats.restricted, 0);
        assert_eq!(stats.by_source.get("zenodo"), Some(&2));
        assert_eq!(stats.by_language.get("Dutch"), Some(&3));
        assert_eq!(stats.by_software.get("NVivo"), Some(&3));
    }

    #[test]
    fn test_owns_path() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog
            .insert(&record("qdr", "u1", "README.txt").downloaded("/d/README.txt", "h1", None))
            .unwrap();
        assert!(catalog.owns_path("/d/README.txt").unwrap());
        assert!(!catalog.owns_path("/d/README_2.txt").unwrap());
    }

    #[test]
    fn test_reset() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.insert(&record("dans", "u1", "a.txt").metadata_only(NOTE_IRRELEVANT)).unwrap();
        assert_eq!(catalog.reset().unwrap(), 1);
        assert!(catalog.records().unwrap().is_empty());
    }

    #[test]
    fn test_open_on_disk_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.db");
        {
            let catalog = Catalog::open(&path).unwrap();
            catalog.insert(&record("dryad", "u1", "a.txt").metadata_only(NOTE_IRRELEVANT)).unwrap();
        }
        let catalog = Catalog::open(&path).unwrap();
        assert_eq!(catalog.records().unwrap().len(), 1);
    }
}
