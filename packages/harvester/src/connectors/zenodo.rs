//! Zenodo REST API connector.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use super::{lenient_string, matches_file_type, non_empty, Connector, HitTotal, OneOrMany};
use crate::error::Result;
use crate::http::{ApiClient, HttpSettings};
use crate::text::strip_html;
use crate::types::{file_extension, FileInfo, SearchResult};

pub const BASE_URL: &str = "https://zenodo.org";

/// Zenodo allows 30 requests a minute for anonymous clients.
pub const MIN_INTERVAL: Duration = Duration::from_secs(2);

const PAGE_SIZE: usize = 25;

/// Record id inside `/records/123` or `/record/123`.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static RECORD_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/records?/(\d+)").expect("valid regex"));

pub struct ZenodoConnector {
    base_url: String,
    client: ApiClient,
}

impl ZenodoConnector {
    pub fn new() -> Result<Self> {
        Self::with_settings(BASE_URL, HttpSettings::with_min_interval(MIN_INTERVAL))
    }

    pub fn with_settings(base_url: &str, settings: HttpSettings) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: ApiClient::new(settings)?,
        })
    }

    fn record_url(&self, record_id: &str) -> String {
        format!("{}/records/{record_id}", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    hits: Hits,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Hits {
    hits: Vec<Record>,
    total: HitTotal,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Record {
    #[serde(deserialize_with = "lenient_string")]
    id: String,
    metadata: Metadata,
    files: Vec<RecordFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Metadata {
    title: String,
    description: String,
    creators: Vec<Person>,
    contributors: Vec<Person>,
    publication_date: String,
    keywords: Vec<String>,
    license: Option<License>,
    access_right: Option<String>,
    language: Option<OneOrMany<String>>,
    resource_type: ResourceType,
    related_identifiers: Vec<RelatedIdentifier>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Person {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum License {
    Id {
        #[serde(default)]
        id: String,
    },
    Plain(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResourceType {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RelatedIdentifier {
    identifier: String,
    relation: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RecordFile {
    #[serde(deserialize_with = "lenient_string")]
    id: String,
    key: String,
    size: u64,
    checksum: String,
    links: FileLinks,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileLinks {
    #[serde(rename = "self")]
    self_link: String,
}

/// Numeric record id from a Zenodo URL or a bare id.
pub(crate) fn extract_record_id(record_url: &str) -> String {
    if let Some(caps) = RECORD_ID.captures(record_url) {
        return caps[1].to_string();
    }
    let trimmed = record_url.trim().trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed).to_string()
}

fn author_names(creators: &[Person]) -> String {
    non_empty(creators.iter().map(|c| c.name.as_str())).join("; ")
}

impl ZenodoConnector {
    fn to_summary(&self, record: Record) -> SearchResult {
        let meta = record.metadata;
        SearchResult {
            title: meta.title,
            description: strip_html(&meta.description),
            authors: author_names(&meta.creators),
            date_published: meta.publication_date,
            tags: non_empty(&meta.keywords),
            keywords: non_empty(&meta.keywords),
            record_id: record.id.clone(),
            ..SearchResult::new("zenodo", self.record_url(&record.id))
        }
    }

    fn to_record(&self, record_url: &str, record: Record) -> SearchResult {
        let meta = record.metadata;
        let restricted = meta
            .access_right
            .as_deref()
            .is_some_and(|access| access != "open");

        let files = record
            .files
            .into_iter()
            .map(|f| {
                let friendly_type = file_extension(&f.key).trim_start_matches('.').to_string();
                FileInfo {
                    size: f.size,
                    friendly_type,
                    restricted,
                    api_checksum: f.checksum,
                    id: if f.id.is_empty() { record.id.clone() } else { f.id },
                    ..FileInfo::new(f.key, f.links.self_link)
                }
            })
            .collect();

        let license_type = match meta.license {
            Some(License::Id { id }) | Some(License::Plain(id)) => id,
            None => String::new(),
        };

        let publication = meta
            .related_identifiers
            .iter()
            .filter(|r| !r.identifier.trim().is_empty())
            .map(|r| {
                if r.relation.is_empty() {
                    r.identifier.clone()
                } else {
                    format!("{}: {}", r.relation, r.identifier)
                }
            })
            .collect();

        SearchResult {
            record_id: record.id,
            title: meta.title,
            description: strip_html(&meta.description),
            authors: author_names(&meta.creators),
            license_type,
            date_published: meta.publication_date,
            tags: non_empty(&meta.keywords),
            keywords: non_empty(&meta.keywords),
            kind_of_data: non_empty([meta.resource_type.kind]),
            language: non_empty(meta.language.map(OneOrMany::into_vec).unwrap_or_default()),
            producer: non_empty(meta.contributors.iter().map(|c| c.name.as_str())),
            publication,
            uploader_name: meta.creators.first().map(|c| c.name.clone()).unwrap_or_default(),
            files,
            ..SearchResult::new("zenodo", record_url)
        }
    }
}

impl Connector for ZenodoConnector {
    fn name(&self) -> &str {
        "zenodo"
    }

    fn search(&self, query: &str, file_type: Option<&str>) -> Result<Vec<SearchResult>> {
        let url = format!("{}/api/records", self.base_url);
        let mut results = Vec::new();
        let mut seen = 0usize;
        let mut page = 1usize;

        loop {
            let params = [
                ("q", query.to_string()),
                ("size", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ];
            let body: SearchPage = self.client.get_json(&url, &params)?;
            let total = body.hits.total.value();
            let hits = body.hits.hits;
            if hits.is_empty() {
                break;
            }
            seen += hits.len();

            for record in hits {
                if let Some(ext) = file_type {
                    if !record.files.iter().any(|f| matches_file_type(&f.key, ext)) {
                        continue;
                    }
                }
                results.push(self.to_summary(record));
            }

            if seen >= total {
                break;
            }
            page += 1;
        }

        tracing::info!(source = "zenodo", query, count = results.len(), "Search finished");
        Ok(results)
    }

    fn get_metadata(&self, record_url: &str) -> Result<SearchResult> {
        let record_id = extract_record_id(record_url);
        let url = format!("{}/api/records/{record_id}", self.base_url);
        let record: Record = self.client.get_json(&url, &[])?;
        Ok(self.to_record(record_url, record))
    }

    fn download(&self, url: &str, dest_dir: &Path, filename: Option<&str>) -> Result<PathBuf> {
        self.client.download(url, dest_dir, filename)
    }
}
