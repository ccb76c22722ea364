//! UK Data Service ReShare connector, via the EPrints JSON exports.
//!
//! ReShare has no search API with paging; the simple-search export returns
//! every match in one document. EPrints fields are loosely typed (strings,
//! lists, numbers), so most of them are read as raw JSON and flattened.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::{lenient_string, matches_file_type, non_empty, Connector};
use crate::config::EXPORT_TIMEOUT_SECS;
use crate::error::{HarvesterError, Result};
use crate::http::{ApiClient, HttpSettings};
use crate::text::{full_name, strip_html};
use crate::types::{file_extension, FileInfo, SearchResult};

pub const BASE_URL: &str = "https://reshare.ukdataservice.ac.uk";

pub const MIN_INTERVAL: Duration = Duration::from_secs(2);

/// Thumbnails and index files EPrints generates for every document.
const SKIP_FILENAMES: &[&str] = &[
    "lightbox.jpg",
    "preview.jpg",
    "medium.jpg",
    "small.jpg",
    "indexcodes.txt",
];

/// EPrints license ids considered open, with their canonical names and deeds.
const LICENSES: &[(&str, &str, &str)] = &[
    ("cc_by", "CC-BY-4.0", "https://creativecommons.org/licenses/by/4.0/"),
    ("cc_by_sa", "CC-BY-SA-4.0", "https://creativecommons.org/licenses/by-sa/4.0/"),
    ("cc_by_nc", "CC-BY-NC-4.0", "https://creativecommons.org/licenses/by-nc/4.0/"),
    ("cc_by_nc_sa", "CC-BY-NC-SA-4.0", "https://creativecommons.org/licenses/by-nc-sa/4.0/"),
    ("cc_by_nd", "CC-BY-ND-4.0", "https://creativecommons.org/licenses/by-nd/4.0/"),
    ("cc_by_nc_nd", "CC-BY-NC-ND-4.0", "https://creativecommons.org/licenses/by-nc-nd/4.0/"),
    ("cc_public_domain", "CC0-1.0", "https://creativecommons.org/publicdomain/zero/1.0/"),
];

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static EPRINT_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/id/eprint/(\d+)").expect("valid regex"));

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static TRAILING_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\d+)/?$").expect("valid regex"));

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static DOCUMENT_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/id/document/(\d+)").expect("valid regex"));

pub struct UkdsConnector {
    base_url: String,
    client: ApiClient,
}

impl UkdsConnector {
    pub fn new() -> Result<Self> {
        let settings = HttpSettings::with_min_interval(MIN_INTERVAL)
            .with_timeout(Duration::from_secs(EXPORT_TIMEOUT_SECS));
        Self::with_settings(BASE_URL, settings)
    }

    pub fn with_settings(base_url: &str, settings: HttpSettings) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: ApiClient::new(settings)?,
        })
    }

    fn record_url(&self, eprint_id: &str) -> String {
        format!("{}/{eprint_id}/", self.base_url)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EPrint {
    #[serde(deserialize_with = "lenient_string")]
    eprintid: String,
    #[serde(deserialize_with = "lenient_string")]
    title: String,
    #[serde(rename = "abstract", deserialize_with = "lenient_string")]
    abstract_text: String,
    creators: Vec<Creator>,
    contact_details: Vec<Creator>,
    keywords: Value,
    #[serde(deserialize_with = "lenient_string")]
    date: String,
    language: Value,
    data_kind: Value,
    country: Value,
    geographic_cover: Value,
    award_funders: Value,
    #[serde(deserialize_with = "lenient_string")]
    doi: String,
    collection_dates: Option<CollectionDates>,
    documents: Vec<Document>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Creator {
    name: Option<PersonName>,
    #[serde(deserialize_with = "lenient_string")]
    id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PersonName {
    #[serde(deserialize_with = "lenient_string")]
    given: String,
    #[serde(deserialize_with = "lenient_string")]
    family: String,
}

impl Creator {
    fn display_name(&self) -> String {
        self.name
            .as_ref()
            .map(|n| full_name(&n.given, &n.family))
            .unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CollectionDates {
    #[serde(deserialize_with = "lenient_string")]
    date_from: String,
    #[serde(deserialize_with = "lenient_string")]
    date_to: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Document {
    #[serde(deserialize_with = "lenient_string")]
    uri: String,
    #[serde(deserialize_with = "lenient_string")]
    security: String,
    #[serde(deserialize_with = "lenient_string")]
    license: String,
    files: Vec<DocumentFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DocumentFile {
    #[serde(deserialize_with = "lenient_string")]
    filename: String,
    filesize: u64,
    #[serde(deserialize_with = "lenient_string")]
    mime_type: String,
}

/// Flatten a loosely typed EPrints field into strings.
fn loose_strings(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => non_empty([s]),
        Value::Number(n) => vec![n.to_string()],
        Value::Array(items) => items.iter().flat_map(loose_strings).collect(),
        _ => Vec::new(),
    }
}

/// EPrints keywords are sometimes one comma- or semicolon-separated string.
fn keyword_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => non_empty(s.split([',', ';', '\n'])),
        other => loose_strings(other),
    }
}

fn license_entry(eprints_id: &str) -> Option<&'static (&'static str, &'static str, &'static str)> {
    LICENSES.iter().find(|(id, _, _)| *id == eprints_id)
}

fn is_open_eprints_license(eprints_id: &str) -> bool {
    license_entry(eprints_id).is_some()
}

/// Pick the dataset license: the first open one across documents, else the first seen.
fn pick_license(documents: &[Document]) -> (String, String) {
    let licenses: Vec<&str> = documents
        .iter()
        .map(|d| d.license.as_str())
        .filter(|l| !l.is_empty())
        .collect();

    if let Some((_, name, url)) = licenses.iter().find_map(|l| license_entry(l)) {
        return (name.to_string(), url.to_string());
    }
    (licenses.first().map(|l| l.to_string()).unwrap_or_default(), String::new())
}

/// Eprint id from `/857166/`, `/id/eprint/857166` or a bare id.
pub(crate) fn extract_eprint_id(record_url: &str) -> String {
    if let Some(caps) = EPRINT_PATH.captures(record_url) {
        return caps[1].to_string();
    }
    if let Some(caps) = TRAILING_ID.captures(record_url) {
        return caps[1].to_string();
    }
    let trimmed = record_url.trim().trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed).to_string()
}

fn document_id(uri: &str) -> Option<String> {
    DOCUMENT_PATH.captures(uri).map(|c| c[1].to_string())
}

fn is_generated_file(filename: &str) -> bool {
    SKIP_FILENAMES.contains(&filename)
}

fn author_names(creators: &[Creator]) -> String {
    non_empty(creators.iter().map(Creator::display_name)).join("; ")
}

impl UkdsConnector {
    fn to_summary(&self, eprint: EPrint) -> SearchResult {
        let keywords = keyword_list(&eprint.keywords);
        SearchResult {
            record_id: eprint.eprintid.clone(),
            title: eprint.title,
            description: strip_html(&eprint.abstract_text),
            authors: author_names(&eprint.creators),
            date_published: eprint.date,
            tags: keywords.clone(),
            keywords,
            ..SearchResult::new("ukds", self.record_url(&eprint.eprintid))
        }
    }

    fn build_files(&self, eprint_id: &str, documents: &[Document]) -> Vec<FileInfo> {
        let mut files = Vec::new();
        for doc in documents {
            let restricted = doc.security != "public" || !is_open_eprints_license(&doc.license);
            let Some(doc_id) = document_id(&doc.uri) else {
                tracing::debug!(eprint_id, uri = %doc.uri, "Document without id, skipping");
                continue;
            };

            for file in doc.files.iter().filter(|f| !is_generated_file(&f.filename)) {
                files.push(FileInfo {
                    size: file.filesize,
                    content_type: file.mime_type.clone(),
                    friendly_type: file_extension(&file.filename).trim_start_matches('.').to_string(),
                    restricted,
                    id: eprint_id.to_string(),
                    ..FileInfo::new(
                        file.filename.clone(),
                        format!("{}/id/document/{doc_id}", self.base_url),
                    )
                });
            }
        }
        files
    }

    fn to_record(&self, record_url: &str, eprint: EPrint) -> SearchResult {
        let keywords = keyword_list(&eprint.keywords);

        let mut geographic_coverage = loose_strings(&eprint.country);
        for place in loose_strings(&eprint.geographic_cover) {
            if !geographic_coverage.contains(&place) {
                geographic_coverage.push(place);
            }
        }

        let date_of_collection = eprint
            .collection_dates
            .map(|d| match (d.date_from.trim(), d.date_to.trim()) {
                ("", "") => String::new(),
                (from, "") => from.to_string(),
                ("", to) => to.to_string(),
                (from, to) => format!("{from} to {to}"),
            })
            .unwrap_or_default();

        let (license_type, license_url) = pick_license(&eprint.documents);
        let files = self.build_files(&eprint.eprintid, &eprint.documents);

        let (uploader_name, uploader_email) = eprint
            .creators
            .first()
            .map(|c| (c.display_name(), c.id.clone()))
            .unwrap_or_default();

        let publication = if eprint.doi.trim().is_empty() {
            Vec::new()
        } else {
            vec![format!("https://doi.org/{}", eprint.doi.trim())]
        };

        SearchResult {
            record_id: eprint.eprintid,
            title: eprint.title,
            description: strip_html(&eprint.abstract_text),
            authors: author_names(&eprint.creators),
            license_type,
            license_url,
            date_published: eprint.date,
            tags: keywords.clone(),
            keywords,
            kind_of_data: loose_strings(&eprint.data_kind),
            language: loose_strings(&eprint.language),
            geographic_coverage,
            depositor: eprint
                .contact_details
                .first()
                .map(Creator::display_name)
                .unwrap_or_default(),
            producer: loose_strings(&eprint.award_funders),
            publication,
            date_of_collection,
            uploader_name,
            uploader_email,
            files,
            ..SearchResult::new("ukds", record_url)
        }
    }
}

impl Connector for UkdsConnector {
    fn name(&self) -> &str {
        "ukds"
    }

    fn search(&self, query: &str, file_type: Option<&str>) -> Result<Vec<SearchResult>> {
        let url = format!("{}/cgi/search/simple/export_reshare_JSON.js", self.base_url);
        let params = [
            ("output", "JSON".to_string()),
            ("q", query.to_string()),
            ("_action_export", "1".to_string()),
            ("_action_export_redir", "1".to_string()),
            ("_order", "bytitle".to_string()),
            ("basic_srchtype", "ALL".to_string()),
            ("_satisfyall", "ALL".to_string()),
            ("_action_search", "Search".to_string()),
        ];
        let eprints: Vec<EPrint> = self.client.get_json(&url, &params)?;

        let results: Vec<SearchResult> = eprints
            .into_iter()
            .filter(|eprint| match file_type {
                Some(ext) => eprint
                    .documents
                    .iter()
                    .flat_map(|d| d.files.iter())
                    .filter(|f| !is_generated_file(&f.filename))
                    .any(|f| matches_file_type(&f.filename, ext)),
                None => true,
            })
            .map(|eprint| self.to_summary(eprint))
            .collect();

        tracing::info!(source = "ukds", query, count = results.len(), "Search finished");
        Ok(results)
    }

    fn get_metadata(&self, record_url: &str) -> Result<SearchResult> {
        let eprint_id = extract_eprint_id(record_url);
        let url = format!(
            "{}/cgi/export/eprint/{eprint_id}/JSON/reshare-eprint-{eprint_id}.js",
            self.base_url
        );
        // A single export is either the object itself or a one-element list.
        let body: Value = self.client.get_json(&url, &[])?;
        let item = match body {
            Value::Array(items) => items.into_iter().next(),
            other @ Value::Object(_) => Some(other),
            _ => None,
        }
        .ok_or_else(|| HarvesterError::RecordNotFound(format!("ReShare eprint {eprint_id}")))?;
        let eprint: EPrint = serde_json::from_value(item)?;

        Ok(self.to_record(record_url, eprint))
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

    fn connector() -> UkdsConnector {
        UkdsConnector::with_settings(BASE_URL, HttpSettings::immediate()).unwrap()
    }

    fn eprint_json() -> Value {
        json!({
            "eprintid": 857166,
            "title": "Youth Voices: interviews with young carers",
            "abstract": "<p>Qualitative interviews with young carers.</p>",
            "creators": [
                {"name": {"given": "Sam", "family": "Jones"}, "id": "sam@example.ac.uk"},
                {"name": {"given": "Priya", "family": "Shah"}}
            ],
            "contact_details": [{"name": {"given": "Data", "family": "Officer"}}],
            "keywords": ["young carers", "interviews"],
            "date": 2020,
            "language": ["English"],
            "data_kind": ["Text"],
            "country": ["United Kingdom"],
            "geographic_cover": "Scotland",
            "award_funders": ["ESRC"],
            "doi": "10.5255/UKDA-SN-857166",
            "collection_dates": {"date_from": "2018-01-01", "date_to": "2018-12-31"},
            "documents": [
                {"uri": "http://reshare.ukdataservice.ac.uk/id/document/3744469",
                 "security": "public", "license": "cc_by",
                 "files": [
                    {"filename": "interview_01.docx", "filesize": 3000, "mime_type": "application/msword"},
                    {"filename": "preview.jpg", "filesize": 10, "mime_type": "image/jpeg"}
                 ]},
                {"uri": "http://reshare.ukdataservice.ac.uk/id/document/3744470",
                 "security": "staffonly", "license": "ukda_eul",
                 "files": [
                    {"filename": "interview_02.docx", "filesize": 4000, "mime_type": "application/msword"}
                 ]}
            ]
        })
    }

    #[test]
    fn test_extract_eprint_id() {
        assert_eq!(extract_eprint_id("https://reshare.ukdataservice.ac.uk/857166/"), "857166");
        assert_eq!(extract_eprint_id("https://reshare.ukdataservice.ac.uk/id/eprint/857166"), "857166");
        assert_eq!(extract_eprint_id("857166"), "857166");
    }

    #[test]
    fn test_record_mapping() {
        let eprint: EPrint = serde_json::from_value(eprint_json()).unwrap();
        let url = "https://reshare.ukdataservice.ac.uk/857166/";
        let result = connector().to_record(url, eprint);

        assert_eq!(result.record_id, "857166");
        assert_eq!(result.description, "Qualitative interviews with young carers.");
        assert_eq!(result.authors, "Sam Jones; Priya Shah");
        assert_eq!(result.license_type, "CC-BY-4.0");
        assert_eq!(result.license_url, "https://creativecommons.org/licenses/by/4.0/");
        assert_eq!(result.date_published, "2020");
        assert_eq!(
            result.geographic_coverage,
            vec!["United Kingdom".to_string(), "Scotland".to_string()]
        );
        assert_eq!(result.depositor, "Data Officer");
        assert_eq!(result.producer, vec!["ESRC".to_string()]);
        assert_eq!(result.publication, vec!["https://doi.org/10.5255/UKDA-SN-857166".to_string()]);
        assert_eq!(result.date_of_collection, "2018-01-01 to 2018-12-31");
        assert_eq!(result.uploader_name, "Sam Jones");
        assert_eq!(result.uploader_email, "sam@example.ac.uk");
    }

    #[test]
    fn test_files_skip_thumbnails_and_flag_restricted() {
        let eprint: EPrint = serde_json::from_value(eprint_json()).unwrap();
        let result = connector().to_record("https://reshare.ukdataservice.ac.uk/857166/", eprint);

        let names: Vec<&str> = result.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["interview_01.docx", "interview_02.docx"]);
        assert_eq!(
            result.files[0].download_url,
            "https://reshare.ukdataservice.ac.uk/id/document/3744469"
        );
        assert!(!result.files[0].restricted);
        assert!(result.files[1].restricted);
    }

    #[test]
    fn test_pick_license_prefers_open() {
        let docs: Vec<Document> = serde_json::from_value(json!([
            {"license": "ukda_eul"},
            {"license": "cc_by_nc_sa"}
        ]))
        .unwrap();
        assert_eq!(pick_license(&docs).0, "CC-BY-NC-SA-4.0");

        let closed: Vec<Document> = serde_json::from_value(json!([{"license": "ukda_eul"}])).unwrap();
        assert_eq!(pick_license(&closed), ("ukda_eul".to_string(), String::new()));
    }

    #[test]
    fn test_keyword_string_is_split() {
        assert_eq!(
            keyword_list(&json!("carers, youth; interviews")),
            vec!["carers".to_string(), "youth".to_string(), "interviews".to_string()]
        );
    }
}
