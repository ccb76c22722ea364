//! Dryad API v2 connector.
//!
//! Dryad answers in HAL: lists live under `_embedded`, related resources
//! under `_links`. Every dataset is published under CC0.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use super::{non_empty, Connector};
use crate::error::Result;
use crate::http::{ApiClient, HttpSettings};
use crate::text::{full_name, strip_html};
use crate::types::{file_extension, FileInfo, SearchResult};

pub const BASE_URL: &str = "https://datadryad.org";

pub const MIN_INTERVAL: Duration = Duration::from_secs(2);

/// Upper bound on results collected for one query.
pub const MAX_SEARCH_RESULTS: usize = 500;

const PAGE_SIZE: usize = 100;

const CC0_URL: &str = "https://creativecommons.org/publicdomain/zero/1.0/";

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static DOI_PREFIXED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(doi:[^\s?#]+)").expect("valid regex"));

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static DOI_RESOLVER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"doi\.org/(10\.[^\s?#]+)").expect("valid regex"));

pub struct DryadConnector {
    base_url: String,
    client: ApiClient,
}

impl DryadConnector {
    pub fn new() -> Result<Self> {
        Self::with_settings(BASE_URL, HttpSettings::with_min_interval(MIN_INTERVAL))
    }

    pub fn with_settings(base_url: &str, settings: HttpSettings) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: ApiClient::new(settings)?,
        })
    }

    fn api_url(&self) -> String {
        format!("{}/api/v2", self.base_url)
    }

    fn landing_url(&self, identifier: &str) -> String {
        format!("{}/stash/dataset/{identifier}", self.base_url)
    }

    /// Resolve a HAL href, which may be absolute, root-relative or API-relative.
    fn resolve(&self, href: &str) -> String {
        if href.is_empty() {
            String::new()
        } else if href.starts_with("http") {
            href.to_string()
        } else if href.starts_with('/') {
            format!("{}{href}", self.base_url)
        } else {
            format!("{}/{href}", self.api_url())
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchPage {
    #[serde(rename = "_embedded")]
    embedded: EmbeddedDatasets,
    total: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EmbeddedDatasets {
    #[serde(rename = "stash:datasets")]
    datasets: Vec<Dataset>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Dataset {
    identifier: String,
    title: String,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    methods: Option<String>,
    authors: Option<Vec<Author>>,
    keywords: Option<Vec<String>>,
    publication_date: String,
    license: Option<String>,
    field_of_science: Option<String>,
    locations: Option<Vec<Location>>,
    related_works: Option<Vec<RelatedWork>>,
    #[serde(rename = "_links")]
    links: DatasetLinks,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Author {
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
}

impl Author {
    fn full_name(&self) -> String {
        full_name(
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default(),
        )
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Location {
    place: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RelatedWork {
    relationship: String,
    identifier: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DatasetLinks {
    #[serde(rename = "stash:version")]
    version: Link,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Link {
    href: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FilesPage {
    #[serde(rename = "_embedded")]
    embedded: EmbeddedFiles,
    total: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EmbeddedFiles {
    #[serde(rename = "stash:files")]
    files: Vec<DryadFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DryadFile {
    path: String,
    size: u64,
    mime_type: String,
    digest_type: String,
    digest: String,
    #[serde(rename = "_links")]
    links: FileLinks,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileLinks {
    #[serde(rename = "self")]
    self_link: Link,
    #[serde(rename = "stash:download")]
    download: Link,
}

/// DOI in `doi:` form from a landing URL, resolver URL or bare DOI.
pub(crate) fn extract_doi(record_url: &str) -> String {
    if let Some(caps) = DOI_PREFIXED.captures(record_url) {
        return caps[1].trim_end_matches('/').to_string();
    }
    if let Some(caps) = DOI_RESOLVER.captures(record_url) {
        return format!("doi:{}", caps[1].trim_end_matches('/'));
    }
    let trimmed = record_url.trim().trim_end_matches('/');
    if trimmed.starts_with("10.") {
        return format!("doi:{trimmed}");
    }
    trimmed.to_string()
}

fn author_names(authors: &[Author]) -> String {
    non_empty(authors.iter().map(Author::full_name)).join("; ")
}

impl DryadConnector {
    fn to_summary(&self, dataset: Dataset) -> SearchResult {
        let keywords = non_empty(dataset.keywords.unwrap_or_default());
        let source_url = if dataset.identifier.is_empty() {
            String::new()
        } else {
            self.landing_url(&dataset.identifier)
        };
        SearchResult {
            record_id: dataset.identifier,
            title: dataset.title,
            description: strip_html(dataset.abstract_text.as_deref().unwrap_or_default()),
            authors: author_names(dataset.authors.as_deref().unwrap_or_default()),
            date_published: dataset.publication_date,
            tags: keywords.clone(),
            keywords,
            ..SearchResult::new("dryad", source_url)
        }
    }

    fn to_record(&self, record_url: &str, dataset: Dataset, files: Vec<FileInfo>) -> SearchResult {
        let abstract_text = strip_html(dataset.abstract_text.as_deref().unwrap_or_default());
        let methods = strip_html(dataset.methods.as_deref().unwrap_or_default());
        let description = match (abstract_text.is_empty(), methods.is_empty()) {
            (_, true) => abstract_text,
            (true, false) => methods,
            (false, false) => format!("{abstract_text}\n\nMethods: {methods}"),
        };

        let license_url = dataset
            .license
            .filter(|l| l.contains("creativecommons"))
            .unwrap_or_else(|| CC0_URL.to_string());

        let authors = dataset.authors.unwrap_or_default();
        let (uploader_name, uploader_email) = authors
            .first()
            .map(|a| (a.full_name(), a.email.clone().unwrap_or_default()))
            .unwrap_or_default();

        let publication = dataset
            .related_works
            .unwrap_or_default()
            .into_iter()
            .filter(|w| !w.identifier.trim().is_empty())
            .map(|w| {
                if w.relationship.is_empty() {
                    w.identifier
                } else {
                    format!("{}: {}", w.relationship, w.identifier)
                }
            })
            .collect();

        let source_url = if dataset.identifier.is_empty() {
            record_url.to_string()
        } else {
            self.landing_url(&dataset.identifier)
        };
        let keywords = non_empty(dataset.keywords.unwrap_or_default());

        SearchResult {
            record_id: dataset.identifier,
            title: dataset.title,
            description,
            authors: author_names(&authors),
            license_type: "CC0-1.0".to_string(),
            license_url,
            date_published: dataset.publication_date,
            tags: keywords.clone(),
            keywords,
            kind_of_data: non_empty(dataset.field_of_science),
            geographic_coverage: non_empty(
                dataset
                    .locations
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|l| l.place),
            ),
            publication,
            uploader_name,
            uploader_email,
            files,
            ..SearchResult::new("dryad", source_url)
        }
    }

    fn to_file(&self, file: DryadFile) -> FileInfo {
        let api_checksum = if file.digest_type.is_empty() || file.digest.is_empty() {
            String::new()
        } else {
            format!("{}:{}", file.digest_type, file.digest)
        };
        let id = file
            .links
            .self_link
            .href
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        FileInfo {
            size: file.size,
            content_type: file.mime_type,
            friendly_type: file_extension(&file.path).trim_start_matches('.').to_string(),
            api_checksum,
            id,
            ..FileInfo::new(file.path, self.resolve(&file.links.download.href))
        }
    }

    fn fetch_version_files(&self, version_url: &str) -> Result<Vec<FileInfo>> {
        let url = format!("{version_url}/files");
        let mut files = Vec::new();
        let mut seen = 0usize;
        let mut page = 1usize;

        loop {
            let params = [("per_page", PAGE_SIZE.to_string()), ("page", page.to_string())];
            let body: FilesPage = self.client.get_json(&url, &params)?;
            let batch = body.embedded.files;
            if batch.is_empty() {
                break;
            }
            seen += batch.len();
            files.extend(batch.into_iter().map(|f| self.to_file(f)));

            if seen >= body.total {
                break;
            }
            page += 1;
        }

        Ok(files)
    }
}

impl Connector for DryadConnector {
    fn name(&self) -> &str {
        "dryad"
    }

    fn search(&self, query: &str, _file_type: Option<&str>) -> Result<Vec<SearchResult>> {
        let url = format!("{}/search", self.api_url());
        let mut results: Vec<SearchResult> = Vec::new();
        let mut page = 1usize;

        loop {
            let params = [
                ("q", query.to_string()),
                ("per_page", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ];
            let body: SearchPage = self.client.get_json(&url, &params)?;
            let datasets = body.embedded.datasets;
            if datasets.is_empty() {
                break;
            }
            results.extend(datasets.into_iter().map(|d| self.to_summary(d)));

            if results.len() >= body.total {
                break;
            }
            if results.len() >= MAX_SEARCH_RESULTS {
                tracing::info!(query, total = body.total, cap = MAX_SEARCH_RESULTS, "Search capped");
                results.truncate(MAX_SEARCH_RESULTS);
                break;
            }
            page += 1;
        }

        tracing::info!(source = "dryad", query, count = results.len(), "Search finished");
        Ok(results)
    }

    fn get_metadata(&self, record_url: &str) -> Result<SearchResult> {
        let doi = extract_doi(record_url);
        let url = format!("{}/datasets/{}", self.api_url(), urlencoding::encode(&doi));
        let dataset: Dataset = self.client.get_json(&url, &[])?;

        let version_href = dataset.links.version.href.clone();
        let files = if version_href.is_empty() {
            tracing::warn!(%record_url, "Dataset has no version link, skipping files");
            Vec::new()
        } else {
            self.fetch_version_files(&self.resolve(&version_href))?
        };

        Ok(self.to_record(record_url, dataset, files))
    }

    fn download(&self, url: &str, dest_dir: &Path, filename: Option<&str>) -> Result<PathBuf> {
        self.client.download(url, dest_dir, filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn connector() -> DryadConnector {
        DryadConnector::with_settings(BASE_URL, HttpSettings::immediate()).unwrap()
    }

    #[test]
    fn test_extract_doi() {
        assert_eq!(
            extract_doi("https://datadryad.org/stash/dataset/doi:10.5061/dryad.abc123"),
            "doi:10.5061/dryad.abc123"
        );
        assert_eq!(extract_doi("https://doi.org/10.5061/dryad.abc123/"), "doi:10.5061/dryad.abc123");
        assert_eq!(extract_doi("10.5061/dryad.abc123"), "doi:10.5061/dryad.abc123");
    }

    #[test]
    fn test_encoded_doi_path() {
        assert_eq!(
            urlencoding::encode("doi:10.5061/dryad.abc123"),
            "doi%3A10.5061%2Fdryad.abc123"
        );
    }

    #[test]
    fn test_resolve_links() {
        let dryad = connector();
        assert_eq!(
            dryad.resolve("/api/v2/versions/99"),
            "https://datadryad.org/api/v2/versions/99"
        );
        assert_eq!(dryad.resolve("versions/99"), "https://datadryad.org/api/v2/versions/99");
        assert_eq!(dryad.resolve("https://cdn.example.org/x"), "https://cdn.example.org/x");
    }

    #[test]
    fn test_dataset_mapping() {
        let dataset: Dataset = serde_json::from_value(json!({
            "identifier": "doi:10.5061/dryad.abc123",
            "title": "Caregiver interviews",
            "abstract": "<p>Interviews with caregivers &amp; families.</p>",
            "methods": "Thematic analysis",
            "authors": [
                {"firstName": "Ana", "lastName": "Silva", "email": "ana@example.org"},
                {"firstName": null, "lastName": "Okafor"}
            ],
            "keywords": null,
            "publicationDate": "2021-08-01",
            "license": "https://spdx.org/licenses/CC0-1.0.html",
            "fieldOfScience": "Sociology",
            "locations": [{"place": "Lisbon"}, {"place": null}],
            "relatedWorks": [{"relationship": "article", "identifier": "https://doi.org/10.1/y"}],
            "_links": {"stash:version": {"href": "/api/v2/versions/99"}}
        }))
        .unwrap();

        let result = connector().to_record("doi:10.5061/dryad.abc123", dataset, Vec::new());
        assert_eq!(result.source_url, "https://datadryad.org/stash/dataset/doi:10.5061/dryad.abc123");
        assert_eq!(result.description, "Interviews with caregivers & families.\n\nMethods: Thematic analysis");
        assert_eq!(result.authors, "Ana Silva; Okafor");
        assert_eq!(result.license_type, "CC0-1.0");
        assert_eq!(result.license_url, CC0_URL);
        assert!(result.keywords.is_empty());
        assert_eq!(result.kind_of_data, vec!["Sociology".to_string()]);
        assert_eq!(result.geographic_coverage, vec!["Lisbon".to_string()]);
        assert_eq!(result.publication, vec!["article: https://doi.org/10.1/y".to_string()]);
        assert_eq!(result.uploader_name, "Ana Silva");
        assert_eq!(result.uploader_email, "ana@example.org");
    }

    #[test]
    fn test_file_mapping() {
        let file: DryadFile = serde_json::from_value(json!({
            "path": "transcripts.docx",
            "size": 5120,
            "mimeType": "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "digestType": "sha-256",
            "digest": "ff00",
            "_links": {
                "self": {"href": "/api/v2/files/555"},
                "stash:download": {"href": "/api/v2/files/555/download"}
            }
        }))
        .unwrap();

        let info = connector().to_file(file);
        assert_eq!(info.name, "transcripts.docx");
        assert_eq!(info.download_url, "https://datadryad.org/api/v2/files/555/download");
        assert_eq!(info.api_checksum, "sha-256:ff00");
        assert_eq!(info.friendly_type, "docx");
        assert_eq!(info.id, "555");
        assert!(!info.restricted);
    }
}
