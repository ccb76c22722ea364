//! QualidataNet connector, backed by its public Elasticsearch index.
//!
//! QualidataNet is a metadata portal: every hit links to a record hosted by
//! a partner data center, and the index lists no downloadable files. Hits
//! already carry the full record, so they are cached by `source_url` and
//! `get_metadata` only queries the index on a cache miss.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use super::{lenient_string, non_empty, Connector, HitTotal, OneOrMany};
use crate::error::{HarvesterError, Result};
use crate::http::{ApiClient, HttpSettings};
use crate::text::strip_html;
use crate::types::SearchResult;

pub const SEARCH_ENDPOINT: &str = "https://www.qualidatanet.com/es/qualidatanet/dataset/_search";

pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

const PAGE_SIZE: usize = 50;

const SEARCH_FIELDS: &[&str] = &["citation_title", "description", "keyword"];

pub struct QualidataNetConnector {
    endpoint: String,
    client: ApiClient,
    cache: Mutex<HashMap<String, SearchResult>>,
}

impl QualidataNetConnector {
    pub fn new() -> Result<Self> {
        Self::with_settings(SEARCH_ENDPOINT, HttpSettings::with_min_interval(MIN_INTERVAL))
    }

    /// `endpoint` is the full `_search` URL of the index.
    pub fn with_settings(endpoint: &str, settings: HttpSettings) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint.to_string(),
            client: ApiClient::new(settings)?,
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn cached(&self, record_url: &str) -> Option<SearchResult> {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.get(record_url).cloned()
    }

    fn remember(&self, result: &SearchResult) {
        if result.source_url.is_empty() {
            return;
        }
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(result.source_url.clone(), result.clone());
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Hits {
    total: HitTotal,
    hits: Vec<Hit>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Hit {
    #[serde(rename = "_id", deserialize_with = "lenient_string")]
    id: String,
    #[serde(rename = "_source")]
    source: Dataset,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Dataset {
    #[serde(deserialize_with = "lenient_string")]
    citation_title: String,
    description: Option<OneOrMany<String>>,
    citation_authors: Option<OneOrMany<String>>,
    #[serde(deserialize_with = "lenient_string")]
    citation_date: String,
    keyword: Option<OneOrMany<String>>,
    location: Option<OneOrMany<String>>,
    #[serde(rename = "dataCenter")]
    data_center: Option<OneOrMany<String>>,
    #[serde(deserialize_with = "lenient_string")]
    metadatalink: String,
    license: Option<OneOrMany<String>>,
    #[serde(rename = "type")]
    kind: Option<OneOrMany<String>>,
    format: Option<OneOrMany<String>>,
}

fn values(field: Option<OneOrMany<String>>) -> Vec<String> {
    non_empty(field.map(OneOrMany::into_vec).unwrap_or_default())
}

impl Dataset {
    /// Whether any declared format mentions the extension.
    fn offers_format(&self, file_type: &str) -> bool {
        let ext = file_type.trim_start_matches('.').to_lowercase();
        match &self.format {
            Some(OneOrMany::One(format)) => format.to_lowercase().contains(&ext),
            Some(OneOrMany::Many(formats)) => formats.iter().any(|f| f.to_lowercase().contains(&ext)),
            None => false,
        }
    }
}

fn to_result(hit: Hit) -> SearchResult {
    let dataset = hit.source;
    let keywords = values(dataset.keyword);
    let link = dataset.metadatalink.trim().to_string();

    SearchResult {
        record_id: if hit.id.is_empty() { link.clone() } else { hit.id },
        title: dataset.citation_title,
        description: strip_html(&values(dataset.description).join("\n")),
        authors: values(dataset.citation_authors).join("; "),
        license_type: values(dataset.license).into_iter().next().unwrap_or_default(),
        date_published: dataset.citation_date,
        tags: keywords.clone(),
        keywords,
        kind_of_data: values(dataset.kind),
        geographic_coverage: values(dataset.location),
        producer: values(dataset.data_center),
        publication: non_empty([link.as_str()]),
        ..SearchResult::new("qualidatanet", link.as_str())
    }
}

impl Connector for QualidataNetConnector {
    fn name(&self) -> &str {
        "qualidatanet"
    }

    fn search(&self, query: &str, file_type: Option<&str>) -> Result<Vec<SearchResult>> {
        let mut results = Vec::new();
        let mut seen = 0usize;

        loop {
            let body = json!({
                "query": {"multi_match": {"query": query, "fields": SEARCH_FIELDS}},
                "size": PAGE_SIZE,
                "from": seen,
            });
            let response: SearchResponse = self.client.post_json(&self.endpoint, &body)?;
            let total = response.hits.total.value();
            let hits = response.hits.hits;
            if hits.is_empty() {
                break;
            }
            seen += hits.len();

            for hit in hits {
                if let Some(ext) = file_type {
                    if !hit.source.offers_format(ext) {
                        continue;
                    }
                }
                let result = to_result(hit);
                self.remember(&result);
                results.push(result);
            }

            if seen >= total {
                break;
            }
        }

        tracing::info!(source = "qualidatanet", query, count = results.len(), "Search finished");
        Ok(results)
    }

    fn get_metadata(&self, record_url: &str) -> Result<SearchResult> {
        if let Some(result) = self.cached(record_url) {
            return Ok(result);
        }

        let body = json!({
            "query": {"match_phrase": {"metadatalink": record_url}},
            "size": 1,
        });
        let response: SearchResponse = self.client.post_json(&self.endpoint, &body)?;
        let hit = response
            .hits
            .hits
            .into_iter()
            .next()
            .ok_or_else(|| HarvesterError::RecordNotFound(record_url.to_string()))?;

        let result = to_result(hit);
        self.remember(&result);
        Ok(result)
    }

    fn download(&self, _url: &str, _dest_dir: &Path, _filename: Option<&str>) -> Result<PathBuf> {
        Err(HarvesterError::Unsupported {
            source_name: self.name().to_string(),
            operation: "file downloads".to_string(),
        })
    }
}
