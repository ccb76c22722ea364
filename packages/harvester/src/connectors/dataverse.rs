//! Dataverse connector, shared by QDR, DANS and DataverseNO.
//!
//! Search uses `/api/search?type=dataset`; metadata comes from the native
//! dataset API, where every citation field is a `{typeName, value}` pair
//! and compound values nest further `{typeName, value}` objects.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use super::{lenient_string, non_empty, Connector};
use crate::error::Result;
use crate::http::{ApiClient, HttpSettings};
use crate::text::strip_html;
use crate::types::{FileInfo, SearchResult};

/// Minimum gap between requests to one Dataverse instance.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

const PAGE_SIZE: usize = 100;

pub struct DataverseConnector {
    name: String,
    base_url: String,
    client: ApiClient,
}

impl DataverseConnector {
    /// Connector for the instance at `base_url`, registered as `name`.
    pub fn new(base_url: &str, name: &str) -> Result<Self> {
        Self::with_settings(base_url, name, HttpSettings::with_min_interval(MIN_INTERVAL))
    }

    pub fn with_settings(base_url: &str, name: &str, settings: HttpSettings) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: ApiClient::new(settings)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn dataset_url(&self, persistent_id: &str) -> String {
        format!("{}/dataset.xhtml?persistentId={persistent_id}", self.base_url)
    }

    fn datafile_url(&self, file_id: &str) -> String {
        format!("{}/api/access/datafile/{file_id}", self.base_url)
    }
}

// --- Search API ---

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    data: SearchData,
}

#[derive(Debug, Default, Deserialize)]
struct SearchData {
    #[serde(default)]
    total_count: usize,
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchItem {
    name: String,
    url: String,
    global_id: String,
    description: String,
    authors: Vec<String>,
    published_at: String,
    subjects: Vec<String>,
    keywords: Vec<String>,
}

// --- Native dataset API ---

#[derive(Debug, Deserialize)]
struct DatasetEnvelope {
    #[serde(default)]
    data: Dataset,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Dataset {
    #[serde(deserialize_with = "lenient_string")]
    id: String,
    publication_date: String,
    latest_version: DatasetVersion,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DatasetVersion {
    dataset_persistent_id: String,
    release_time: String,
    license: Option<LicenseField>,
    terms_of_use: String,
    metadata_blocks: MetadataBlocks,
    files: Vec<FileEntry>,
}

/// Dataverse 6 sends `{name, uri}`; older instances send a bare string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LicenseField {
    Named {
        #[serde(default)]
        name: String,
        #[serde(default)]
        uri: String,
    },
    Plain(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetadataBlocks {
    citation: MetadataBlock,
    geospatial: MetadataBlock,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetadataBlock {
    fields: Vec<MetadataField>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataField {
    type_name: String,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileEntry {
    restricted: bool,
    #[serde(rename = "dataFile")]
    data_file: DataFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DataFile {
    #[serde(deserialize_with = "lenient_string")]
    id: String,
    filename: String,
    filesize: u64,
    content_type: String,
    friendly_type: String,
    checksum: Option<Checksum>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Checksum {
    #[serde(rename = "type")]
    kind: String,
    value: String,
}

impl MetadataBlock {
    fn get(&self, type_name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|f| f.type_name == type_name)
            .map(|f| &f.value)
    }

    /// Primitive field as a single string.
    fn text(&self, type_name: &str) -> String {
        self.get(type_name).map(value_text).unwrap_or_default()
    }

    /// Primitive or controlled-vocabulary field as a list.
    fn list(&self, type_name: &str) -> Vec<String> {
        match self.get(type_name) {
            Some(Value::Array(items)) => non_empty(items.iter().map(value_text)),
            Some(other) => non_empty([value_text(other)]),
            None => Vec::new(),
        }
    }

    /// Compound field entries, each a map of sub-field name to field.
    fn compounds(&self, type_name: &str) -> Vec<&serde_json::Map<String, Value>> {
        match self.get(type_name) {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_object).collect(),
            Some(Value::Object(entry)) => vec![entry],
            _ => Vec::new(),
        }
    }

    /// One sub-field pulled out of every compound entry.
    fn compound_list(&self, type_name: &str, sub_field: &str) -> Vec<String> {
        non_empty(self.compounds(type_name).into_iter().map(|e| sub_value(e, sub_field)))
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn sub_value(entry: &serde_json::Map<String, Value>, sub_field: &str) -> String {
    entry
        .get(sub_field)
        .and_then(|f| f.get("value"))
        .map(value_text)
        .unwrap_or_default()
}

fn date_range(start: &str, end: &str) -> String {
    match (start.trim(), end.trim()) {
        ("", "") => String::new(),
        (s, "") => s.to_string(),
        ("", e) => e.to_string(),
        (s, e) => format!("{s} to {e}"),
    }
}

/// Persistent id from a dataset URL (`?persistentId=doi:...`) or a bare id.
pub(crate) fn extract_persistent_id(record_url: &str) -> Option<String> {
    if let Some((_, rest)) = record_url.split_once("persistentId=") {
        let raw = rest.split('&').next().unwrap_or_default();
        let decoded = urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |d| d.into_owned());
        return Some(decoded);
    }
    let trimmed = record_url.trim();
    if trimmed.starts_with("doi:") || trimmed.starts_with("hdl:") {
        return Some(trimmed.to_string());
    }
    None
}

impl DataverseConnector {
    fn to_summary(&self, item: SearchItem) -> SearchResult {
        let source_url = if item.global_id.is_empty() {
            item.url
        } else {
            self.dataset_url(&item.global_id)
        };
        SearchResult {
            record_id: item.global_id,
            title: item.name,
            description: strip_html(&item.description),
            authors: non_empty(item.authors).join("; "),
            date_published: item.published_at,
            tags: non_empty(item.subjects),
            keywords: non_empty(item.keywords),
            ..SearchResult::new(&self.name, source_url)
        }
    }

    fn to_record(&self, record_url: &str, fallback_id: &str, dataset: Dataset) -> SearchResult {
        let version = dataset.latest_version;
        let citation = &version.metadata_blocks.citation;
        let geospatial = &version.metadata_blocks.geospatial;

        let description = citation
            .compound_list("dsDescription", "dsDescriptionValue")
            .iter()
            .map(|d| strip_html(d))
            .collect::<Vec<_>>()
            .join(" ");

        let (license_type, license_url) = match version.license {
            Some(LicenseField::Named { name, uri }) => (name, uri),
            Some(LicenseField::Plain(name)) => (name, String::new()),
            None => (String::new(), String::new()),
        };
        // Older instances only carry free-text terms.
        let license_type = if license_type.trim().is_empty() {
            strip_html(&version.terms_of_use)
        } else {
            license_type
        };

        let software = citation
            .compounds("software")
            .into_iter()
            .map(|e| {
                let name = sub_value(e, "softwareName");
                let release = sub_value(e, "softwareVersion");
                format!("{name} {release}").trim().to_string()
            })
            .collect::<Vec<_>>();

        let publication = citation
            .compounds("publication")
            .into_iter()
            .map(|e| {
                let text = strip_html(&sub_value(e, "publicationCitation"));
                if text.is_empty() {
                    sub_value(e, "publicationURL")
                } else {
                    text
                }
            })
            .collect::<Vec<_>>();

        let date_of_collection = citation
            .compounds("dateOfCollection")
            .into_iter()
            .map(|e| date_range(&sub_value(e, "dateOfCollectionStart"), &sub_value(e, "dateOfCollectionEnd")))
            .find(|r| !r.is_empty())
            .unwrap_or_default();

        let time_period_covered = citation
            .compounds("timePeriodCovered")
            .into_iter()
            .map(|e| date_range(&sub_value(e, "timePeriodCoveredStart"), &sub_value(e, "timePeriodCoveredEnd")))
            .find(|r| !r.is_empty())
            .unwrap_or_default();

        let geographic_coverage = geospatial
            .compounds("geographicCoverage")
            .into_iter()
            .map(|e| {
                ["otherGeographicCoverage", "city", "state", "country"]
                    .iter()
                    .map(|sub| sub_value(e, sub))
                    .filter(|v| !v.trim().is_empty())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .collect::<Vec<_>>();

        let contact = citation.compounds("datasetContact").into_iter().next();
        let (uploader_name, uploader_email) = contact
            .map(|c| (sub_value(c, "datasetContactName"), sub_value(c, "datasetContactEmail")))
            .unwrap_or_default();

        let files = version
            .files
            .into_iter()
            .filter(|f| !f.data_file.id.is_empty())
            .map(|entry| {
                let file = entry.data_file;
                FileInfo {
                    download_url: self.datafile_url(&file.id),
                    size: file.filesize,
                    content_type: file.content_type,
                    friendly_type: file.friendly_type,
                    restricted: entry.restricted,
                    api_checksum: file
                        .checksum
                        .filter(|c| !c.value.is_empty())
                        .map(|c| format!("{}:{}", c.kind, c.value))
                        .unwrap_or_default(),
                    id: file.id,
                    ..FileInfo::new(file.filename, "")
                }
            })
            .collect();

        let record_id = [version.dataset_persistent_id.as_str(), fallback_id, dataset.id.as_str()]
            .into_iter()
            .find(|id| !id.is_empty())
            .unwrap_or_default()
            .to_string();

        let date_published = if version.release_time.is_empty() {
            dataset.publication_date
        } else {
            version.release_time
        };

        SearchResult {
            record_id,
            title: citation.text("title"),
            description,
            authors: citation.compound_list("author", "authorName").join("; "),
            license_type,
            license_url,
            date_published,
            tags: citation.list("subject"),
            keywords: citation.compound_list("keyword", "keywordValue"),
            kind_of_data: citation.list("kindOfData"),
            language: citation.list("language"),
            software: non_empty(software),
            geographic_coverage: non_empty(geographic_coverage),
            depositor: citation.text("depositor"),
            producer: citation.compound_list("producer", "producerName"),
            publication: non_empty(publication),
            date_of_collection,
            time_period_covered,
            uploader_name,
            uploader_email,
            files,
            ..SearchResult::new(&self.name, record_url)
        }
    }
}

impl Connector for DataverseConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn search(&self, query: &str, _file_type: Option<&str>) -> Result<Vec<SearchResult>> {
        // Search hits carry no file listing, so the file-type filter cannot apply here.
        let url = format!("{}/api/search", self.base_url);
        let mut results = Vec::new();
        let mut start = 0usize;

        loop {
            let params = [
                ("q", query.to_string()),
                ("type", "dataset".to_string()),
                ("per_page", PAGE_SIZE.to_string()),
                ("start", start.to_string()),
            ];
            let page: SearchEnvelope = self.client.get_json(&url, &params)?;
            let items = page.data.items;
            if items.is_empty() {
                break;
            }

            start += items.len();
            results.extend(items.into_iter().map(|item| self.to_summary(item)));

            if start >= page.data.total_count {
                break;
            }
        }

        tracing::info!(source = %self.name, query, count = results.len(), "Search finished");
        Ok(results)
    }

    fn get_metadata(&self, record_url: &str) -> Result<SearchResult> {
        let (envelope, fallback_id): (DatasetEnvelope, String) =
            match extract_persistent_id(record_url) {
                Some(pid) => {
                    let url = format!("{}/api/datasets/:persistentId", self.base_url);
                    (self.client.get_json(&url, &[("persistentId", pid.clone())])?, pid)
                }
                None => {
                    let id = record_url
                        .trim_end_matches('/')
                        .rsplit('/')
                        .next()
                        .unwrap_or_default()
                        .to_string();
                    let url = format!("{}/api/datasets/{id}", self.base_url);
                    (self.client.get_json(&url, &[])?, id)
                }
            };

        Ok(self.to_record(record_url, &fallback_id, envelope.data))
    }

    fn download(&self, url: &str, dest_dir: &Path, filename: Option<&str>) -> Result<PathBuf> {
        self.client.download(url, dest_dir, filename)
    }
}
