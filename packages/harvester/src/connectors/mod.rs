//! Source connectors.
//!
//! Each connector turns one repository API into [`SearchResult`]s and
//! [`FileInfo`](crate::types::FileInfo)s. Connectors own their HTTP client
//! and throttle; the orchestrator only sees the [`Connector`] trait.

mod dataverse;
mod dryad;
mod qualidatanet;
mod registry;
mod ukds;
mod zenodo;

pub use dataverse::DataverseConnector;
pub use dryad::DryadConnector;
pub use qualidatanet::QualidataNetConnector;
pub use registry::{ConnectorRegistry, SourceInfo};
pub use ukds::UkdsConnector;
pub use zenodo::ZenodoConnector;

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;
use crate::types::SearchResult;

/// Capability interface implemented by every source.
pub trait Connector: Send + Sync {
    /// Registry key of the source, e.g. `"zenodo"`.
    fn name(&self) -> &str;

    /// Run one query, following pagination.
    ///
    /// Results carry summary metadata only; `files` stays empty. When
    /// `file_type` is given and hits list their files, results without a
    /// matching extension are dropped.
    fn search(&self, query: &str, file_type: Option<&str>) -> Result<Vec<SearchResult>>;

    /// Fetch the full record behind a `source_url`, including its files.
    fn get_metadata(&self, record_url: &str) -> Result<SearchResult>;

    /// Download one file into `dest_dir` and return its local path.
    fn download(&self, url: &str, dest_dir: &Path, filename: Option<&str>) -> Result<PathBuf>;
}

/// Extension filter shared by the connectors whose hits list file names.
pub(crate) fn matches_file_type(file_name: &str, file_type: &str) -> bool {
    let ext = crate::catalog::normalize_file_type(file_type);
    file_name.to_lowercase().ends_with(&ext)
}

/// A JSON value that sources send either as a single item or as a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }
}

/// Hit count reported either as a number or as `{"value": n}`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub(crate) enum HitTotal {
    Count(usize),
    Object {
        #[serde(default)]
        value: usize,
    },
}

impl Default for HitTotal {
    fn default() -> Self {
        Self::Count(0)
    }
}

impl HitTotal {
    pub(crate) fn value(self) -> usize {
        match self {
            Self::Count(n) | Self::Object { value: n } => n,
        }
    }
}

/// Strings that may arrive as `null`, numbers or strings.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

/// Trim, drop empties, and collect into owned strings.
pub(crate) fn non_empty<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .map(|v| v.as_ref().trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Doc {
        #[serde(default)]
        value: OneOrMany<String>,
        #[serde(default, deserialize_with = "lenient_string")]
        id: String,
    }

    #[test]
    fn test_matches_file_type() {
        assert!(matches_file_type("Study.QDPX", "qdpx"));
        assert!(matches_file_type("study.qdpx", ".qdpx"));
        assert!(!matches_file_type("study.pdf", "qdpx"));
    }

    #[test]
    fn test_one_or_many() {
        let one: Doc = serde_json::from_str(r#"{"value": "a"}"#).unwrap();
        assert_eq!(one.value.into_vec(), vec!["a".to_string()]);

        let many: Doc = serde_json::from_str(r#"{"value": ["a", "b"]}"#).unwrap();
        assert_eq!(many.value.into_vec().len(), 2);

        let missing: Doc = serde_json::from_str("{}").unwrap();
        assert!(missing.value.into_vec().is_empty());
    }

    #[test]
    fn test_lenient_string() {
        let doc: Doc = serde_json::from_str(r#"{"id": 857166}"#).unwrap();
        assert_eq!(doc.id, "857166");
        let doc: Doc = serde_json::from_str(r#"{"id": null}"#).unwrap();
        assert_eq!(doc.id, "");
    }

    #[test]
    fn test_hit_total_shapes() {
        let plain: HitTotal = serde_json::from_str("42").unwrap();
        assert_eq!(plain.value(), 42);
        let object: HitTotal = serde_json::from_str(r#"{"value": 7, "relation": "eq"}"#).unwrap();
        assert_eq!(object.value(), 7);
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty([" a ", "", "b"]), vec!["a".to_string(), "b".to_string()]);
    }
}
