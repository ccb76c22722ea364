//! Harvest orchestration: search, gate, download and catalog.
//!
//! For one source the flow is
//! `search → get_metadata → license gate → relevance gate → per-file decision`,
//! and every file decision is written to the catalog as soon as it is made,
//! so an interrupted run keeps everything decided so far.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::catalog::{Catalog, CatalogRecord, NOTE_FORBIDDEN, NOTE_IRRELEVANT, NOTE_RESTRICTED};
use crate::classify::{assess_relevance, is_relevant_file};
use crate::connectors::{Connector, ConnectorRegistry};
use crate::error::{HarvesterError, Result};
use crate::http::sanitize_filename;
use crate::license::{effective_license, passes_license_gate};
use crate::queries::QueryPlan;
use crate::storage::{dataset_dir, numbered_file_name, sha256_file};
use crate::types::{FileInfo, HarvestStats, SearchResult, SourceStatus, SourceSummary};

/// Knobs for one scrape run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeOptions {
    /// Keep at most this many new results per query.
    pub limit: Option<usize>,
    /// Extension filter passed through to `search`.
    pub file_type: Option<String>,
}

/// What happened to a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Downloaded,
    Irrelevant,
    AlreadyCataloged,
    Restricted,
    Duplicate,
    Failed,
}

impl FileOutcome {
    fn count(self, stats: &mut HarvestStats) {
        match self {
            Self::Downloaded => stats.downloaded += 1,
            Self::Irrelevant => stats.irrelevant += 1,
            Self::AlreadyCataloged => stats.already_cataloged += 1,
            Self::Restricted => stats.restricted += 1,
            Self::Duplicate => stats.duplicates += 1,
            Self::Failed => stats.failed += 1,
        }
    }
}

/// Drives connectors against one catalog and one data directory.
pub struct Harvester<'a> {
    catalog: &'a Catalog,
    data_root: PathBuf,
}

impl<'a> Harvester<'a> {
    pub fn new(catalog: &'a Catalog, data_root: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            data_root: data_root.into(),
        }
    }

    #[must_use]
    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Run every query against one source.
    ///
    /// Search and metadata failures only skip the query or dataset at hand.
    /// If every query fails at the search stage the source is reported as
    /// unavailable, so `scrape_all` can retry it. Catalog errors abort.
    pub fn scrape(
        &self,
        connector: &dyn Connector,
        queries: &[String],
        options: &ScrapeOptions,
    ) -> Result<HarvestStats> {
        let source = connector.name();
        let mut stats = HarvestStats::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut failed_queries = 0usize;
        let mut last_error: Option<String> = None;

        for query in queries {
            tracing::info!(source, query = %query, "Searching");
            let results = match connector.search(query, options.file_type.as_deref()) {
                Ok(results) => results,
                Err(e) => {
                    tracing::warn!(source, query = %query, error = %e, "Search failed, skipping query");
                    failed_queries += 1;
                    last_error = Some(e.to_string());
                    continue;
                }
            };

            let fresh: Vec<SearchResult> = results
                .into_iter()
                .filter(|r| seen.insert(r.source_url.clone()))
                .take(options.limit.unwrap_or(usize::MAX))
                .collect();
            tracing::info!(source, query = %query, new_results = fresh.len(), "Processing results");

            for summary in &fresh {
                self.process_result(connector, summary, &mut stats)?;
            }
        }

        if !queries.is_empty() && failed_queries == queries.len() {
            return Err(HarvesterError::SourceUnavailable {
                source_name: source.to_string(),
                message: last_error.unwrap_or_else(|| "all searches failed".to_string()),
            });
        }

        tracing::info!(
            source,
            downloaded = stats.downloaded,
            restricted = stats.restricted,
            skipped = stats.skipped,
            "Source finished"
        );
        Ok(stats)
    }

    /// Harvest every registered source, retrying failed ones.
    ///
    /// Sources run in registration order; after the first round, sources
    /// that failed get up to `retries` further rounds. One summary per
    /// source is returned in registration order.
    pub fn scrape_all(
        &self,
        registry: &ConnectorRegistry,
        plan: &QueryPlan,
        options: &ScrapeOptions,
        retries: u32,
    ) -> Vec<SourceSummary> {
        let mut summaries: Vec<SourceSummary> = registry
            .names()
            .into_iter()
            .map(|name| SourceSummary {
                source_name: name.to_string(),
                status: SourceStatus::Failed,
                attempts: 0,
                stats: HarvestStats::default(),
                last_error: None,
            })
            .collect();

        for round in 0..=retries {
            let pending: Vec<usize> = summaries
                .iter()
                .enumerate()
                .filter(|(_, s)| s.status == SourceStatus::Failed)
                .map(|(i, _)| i)
                .collect();
            if pending.is_empty() {
                break;
            }
            if round > 0 {
                tracing::info!(round, sources = pending.len(), "Retrying failed sources");
            }

            for index in pending {
                let summary = &mut summaries[index];
                let connector = match registry.get(&summary.source_name) {
                    Ok(connector) => connector,
                    Err(e) => {
                        summary.last_error = Some(e.to_string());
                        continue;
                    }
                };

                summary.attempts += 1;
                let queries = plan.for_source(&summary.source_name);
                match self.scrape(connector, queries, options) {
                    Ok(stats) => {
                        summary.stats.merge(&stats);
                        summary.status = SourceStatus::Ok;
                        summary.last_error = None;
                    }
                    Err(e) => {
                        tracing::error!(
                            source = %summary.source_name,
                            attempt = summary.attempts,
                            error = %e,
                            "Source harvest failed"
                        );
                        summary.last_error = Some(e.to_string());
                    }
                }
            }
        }

        summaries
    }

    /// Fetch, gate and process one dataset.
    fn process_result(
        &self,
        connector: &dyn Connector,
        summary: &SearchResult,
        stats: &mut HarvestStats,
    ) -> Result<()> {
        let source = connector.name();
        let record = match connector.get_metadata(&summary.source_url) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(source, url = %summary.source_url, error = %e, "Metadata fetch failed, skipping dataset");
                return Ok(());
            }
        };
        stats.datasets_seen += 1;

        if !passes_license_gate(&record.license_type, &record.license_url) {
            tracing::debug!(
                source,
                url = %record.source_url,
                license = %effective_license(&record.license_type, &record.license_url),
                "Skipping dataset: license is not open"
            );
            stats.skipped += 1;
            return Ok(());
        }

        let relevance = assess_relevance(&record);
        if !relevance.is_relevant() {
            tracing::debug!(source, url = %record.source_url, ?relevance, "Skipping dataset: not relevant");
            stats.skipped += 1;
            return Ok(());
        }

        if record.files.is_empty() {
            return Ok(());
        }

        let dir = dataset_dir(
            &self.data_root,
            source,
            &record.title,
            record.effective_record_id(),
        );
        for file in &record.files {
            let outcome = self.process_file(connector, &record, file, &dir)?;
            outcome.count(stats);
        }
        Ok(())
    }

    /// Decide, and persist, what happens to one file.
    fn process_file(
        &self,
        connector: &dyn Connector,
        record: &SearchResult,
        file: &FileInfo,
        dir: &Path,
    ) -> Result<FileOutcome> {
        let source = connector.name();
        if self.catalog.exists(source, &file.download_url, &file.name)? {
            tracing::debug!(source, file = %file.name, "Already cataloged");
            return Ok(FileOutcome::AlreadyCataloged);
        }

        let local_directory = dir.display().to_string();
        let entry = CatalogRecord::for_file(record, file, &local_directory);

        if !is_relevant_file(file) {
            self.catalog.insert(&entry.metadata_only(NOTE_IRRELEVANT))?;
            return Ok(FileOutcome::Irrelevant);
        }

        if file.restricted {
            tracing::info!(source, file = %file.name, "Restricted, cataloging metadata only");
            self.catalog.insert(&entry.metadata_only(NOTE_RESTRICTED))?;
            return Ok(FileOutcome::Restricted);
        }

        let target = self.target_name(dir, file)?;
        let path = match connector.download(&file.download_url, dir, target.as_deref()) {
            Ok(path) => path,
            Err(e) if e.is_access_denied() => {
                tracing::info!(source, file = %file.name, "Download refused (403), cataloging metadata only");
                self.catalog.insert(&entry.metadata_only(NOTE_FORBIDDEN))?;
                return Ok(FileOutcome::Restricted);
            }
            Err(e) => {
                tracing::warn!(source, file = %file.name, url = %file.download_url, error = %e, "Download failed");
                return Ok(FileOutcome::Failed);
            }
        };

        let hash = sha256_file(&path)?;
        if let Some(existing) = self.catalog.find_by_hash(&hash)? {
            tracing::info!(
                source,
                file = %file.name,
                existing = %existing.local_path.as_deref().unwrap_or_default(),
                "Duplicate content, discarding download"
            );
            if !self.catalog.owns_path(&path.display().to_string())? {
                fs::remove_file(&path)?;
            }
            return Ok(FileOutcome::Duplicate);
        }

        let size = fs::metadata(&path).ok().map(|m| m.len());
        let entry = entry.downloaded(&path.display().to_string(), &hash, size);
        self.catalog.insert(&entry)?;
        Ok(FileOutcome::Downloaded)
    }

    /// Local name for a file, numbered when another file already holds the
    /// plain name in `dir`.
    ///
    /// Returns `None` when the source name is unusable, leaving the choice
    /// to the download.
    fn target_name(&self, dir: &Path, file: &FileInfo) -> Result<Option<String>> {
        let Some(name) = sanitize_filename(&file.name) else {
            return Ok(None);
        };
        let mut candidate = name.clone();
        let mut n = 1;
        while self.is_taken(&dir.join(&candidate))? {
            n += 1;
            candidate = numbered_file_name(&name, n);
        }
        Ok(Some(candidate))
    }

    fn is_taken(&self, path: &Path) -> Result<bool> {
        Ok(path.exists() || self.catalog.owns_path(&path.display().to_string())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Connector serving canned results and writing fixed bytes on download.
    struct StubConnector {
        results: Vec<SearchResult>,
        fail_search: bool,
        searches: Mutex<usize>,
    }

    impl StubConnector {
        fn new(results: Vec<SearchResult>) -> Self {
            Self {
                results,
                fail_search: false,
                searches: Mutex::new(0),
            }
        }
    }

    impl Connector for StubConnector {
        fn name(&self) -> &str {
            "zenodo"
        }

        fn search(&self, _query: &str, _file_type: Option<&str>) -> Result<Vec<SearchResult>> {
            *self.searches.lock().unwrap() += 1;
            if self.fail_search {
                return Err(HarvesterError::HttpStatus {
                    status: 503,
                    url: "https://example.org/search".to_string(),
                });
            }
            Ok(self
                .results
                .iter()
                .map(|r| SearchResult {
                    files: Vec::new(),
                    ..r.clone()
                })
                .collect())
        }

        fn get_metadata(&self, record_url: &str) -> Result<SearchResult> {
            self.results
                .iter()
                .find(|r| r.source_url == record_url)
                .cloned()
                .ok_or_else(|| HarvesterError::RecordNotFound(record_url.to_string()))
        }

        fn download(&self, url: &str, dest_dir: &Path, filename: Option<&str>) -> Result<PathBuf> {
            fs::create_dir_all(dest_dir)?;
            let path = dest_dir.join(filename.unwrap_or("download"));
            fs::write(&path, url.as_bytes())?;
            Ok(path)
        }
    }

    fn dataset(id: &str, files: Vec<FileInfo>) -> SearchResult {
        SearchResult {
            record_id: id.to_string(),
            title: format!("Interview study {id}"),
            description: "Semi-structured interviews".to_string(),
            license_type: "CC-BY-4.0".to_string(),
            files,
            ..SearchResult::new("zenodo", format!("https://zenodo.org/records/{id}"))
        }
    }

    #[test]
    fn test_limit_and_cross_query_dedup() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = Catalog::open_in_memory().unwrap();
        let harvester = Harvester::new(&catalog, tmp.path());
        let connector = StubConnector::new(vec![
            dataset("1", vec![FileInfo::new("a.qdpx", "https://zenodo.org/f/1")]),
            dataset("2", vec![FileInfo::new("b.qdpx", "https://zenodo.org/f/2")]),
        ]);

        let queries = vec!["qdpx".to_string(), "interviews".to_string()];
        let options = ScrapeOptions {
            limit: Some(1),
            file_type: None,
        };
        let stats = harvester.scrape(&connector, &queries, &options).unwrap();

        // First query keeps record 1, second query only sees record 2 as new.
        assert_eq!(stats.datasets_seen, 2);
        assert_eq!(stats.downloaded, 2);
    }

    #[test]
    fn test_all_searches_failing_marks_source_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = Catalog::open_in_memory().unwrap();
        let harvester = Harvester::new(&catalog, tmp.path());
        let mut connector = StubConnector::new(Vec::new());
        connector.fail_search = true;

        let err = harvester
            .scrape(&connector, &["qdpx".to_string()], &ScrapeOptions::default())
            .unwrap_err();
        assert!(matches!(err, HarvesterError::SourceUnavailable { .. }));
        assert_eq!(*connector.searches.lock().unwrap(), 1);
    }

    #[test]
    fn test_irrelevant_file_is_metadata_only() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = Catalog::open_in_memory().unwrap();
        let harvester = Harvester::new(&catalog, tmp.path());
        let connector = StubConnector::new(vec![dataset(
            "3",
            vec![FileInfo::new("photo.jpg", "https://zenodo.org/f/3")],
        )]);

        let stats = harvester
            .scrape(&connector, &["interviews".to_string()], &ScrapeOptions::default())
            .unwrap();
        assert_eq!(stats.irrelevant, 1);

        let record = catalog
            .find_by_key("zenodo", "https://zenodo.org/f/3", "photo.jpg")
            .unwrap()
            .unwrap();
        assert_eq!(record.notes.as_deref(), Some(NOTE_IRRELEVANT));
        assert!(record.local_path.is_none());
        assert!(!tmp.path().join("zenodo").exists());
    }

    #[test]
    fn test_file_outcome_counters() {
        let mut stats = HarvestStats::default();
        FileOutcome::Downloaded.count(&mut stats);
        FileOutcome::Restricted.count(&mut stats);
        FileOutcome::Restricted.count(&mut stats);
        FileOutcome::Failed.count(&mut stats);
        assert_eq!(stats.downloaded, 1);
        assert_eq!(stats.restricted, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.skipped, 0);
    }
}
