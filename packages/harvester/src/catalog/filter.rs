//! Filters for catalog queries.

use rusqlite::types::Value;

/// Conditions combined with `AND` when listing or counting records.
///
/// Text matches on license, language and software are case-insensitive
/// substring matches; the free-text search spans title, description,
/// keywords and tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    pub source_name: Option<String>,
    pub download_url: Option<String>,
    pub file_name: Option<String>,
    pub file_hash: Option<String>,
    /// Extension, with or without a leading dot.
    pub file_type: Option<String>,
    pub is_qda_file: Option<bool>,
    pub restricted: Option<bool>,
    pub license: Option<String>,
    pub language: Option<String>,
    pub software: Option<String>,
    pub search: Option<String>,
    pub has_software: bool,
    pub has_keywords: bool,
    pub downloaded_only: bool,
}

impl CatalogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, source_name: impl Into<String>) -> Self {
        self.source_name = Some(source_name.into());
        self
    }

    pub fn file_type(mut self, file_type: impl Into<String>) -> Self {
        self.file_type = Some(file_type.into());
        self
    }

    pub fn qda_only(mut self) -> Self {
        self.is_qda_file = Some(true);
        self
    }

    pub fn restricted(mut self, restricted: bool) -> Self {
        self.restricted = Some(restricted);
        self
    }

    pub fn license(mut self, license: impl Into<String>) -> Self {
        self.license = Some(license.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn software(mut self, software: impl Into<String>) -> Self {
        self.software = Some(software.into());
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn downloaded_only(mut self) -> Self {
        self.downloaded_only = true;
        self
    }

    /// Render as a `WHERE` clause (empty when unfiltered) and its parameters.
    pub(crate) fn to_sql(&self) -> (String, Vec<Value>) {
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        let mut equals = |column: &str, value: Value, clauses: &mut Vec<String>| {
            params.push(value);
            clauses.push(format!("{column} = ?{}", params.len()));
        };

        if let Some(v) = &self.source_name {
            equals("source_name", Value::Text(v.clone()), &mut clauses);
        }
        if let Some(v) = &self.download_url {
            equals("download_url", Value::Text(v.clone()), &mut clauses);
        }
        if let Some(v) = &self.file_name {
            equals("file_name", Value::Text(v.clone()), &mut clauses);
        }
        if let Some(v) = &self.file_hash {
            equals("file_hash", Value::Text(v.clone()), &mut clauses);
        }
        if let Some(v) = &self.file_type {
            equals("file_type", Value::Text(normalize_file_type(v)), &mut clauses);
        }
        if let Some(v) = self.is_qda_file {
            equals("is_qda_file", Value::Integer(i64::from(v)), &mut clauses);
        }
        if let Some(v) = self.restricted {
            equals("restricted", Value::Integer(i64::from(v)), &mut clauses);
        }

        let mut contains = |columns: &[&str], needle: &str, clauses: &mut Vec<String>| {
            params.push(Value::Text(format!("%{}%", needle.to_lowercase())));
            let index = params.len();
            let parts: Vec<String> = columns
                .iter()
                .map(|c| format!("LOWER({c}) LIKE ?{index}"))
                .collect();
            clauses.push(format!("({})", parts.join(" OR ")));
        };

        if let Some(v) = &self.license {
            contains(&["license_type"], v, &mut clauses);
        }
        if let Some(v) = &self.language {
            contains(&["language"], v, &mut clauses);
        }
        if let Some(v) = &self.software {
            contains(&["software"], v, &mut clauses);
        }
        if let Some(v) = &self.search {
            contains(&["title", "description", "keywords", "tags"], v, &mut clauses);
        }

        if self.has_software {
            clauses.push("software <> ''".to_string());
        }
        if self.has_keywords {
            clauses.push("keywords <> ''".to_string());
        }
        if self.downloaded_only {
            clauses.push("local_path IS NOT NULL".to_string());
        }

        if clauses.is_empty() {
            (String::new(), params)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), params)
        }
    }
}

/// Lowercase a file type and ensure it starts with a dot.
pub fn normalize_file_type(file_type: &str) -> String {
    let trimmed = file_type.trim().to_lowercase();
    if trimmed.starts_with('.') {
        trimmed
    } else {
        format!(".{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_filter() {
        let (sql, params) = CatalogFilter::new().to_sql();
        assert_eq!(sql, "");
        assert!(params.is_empty());
    }

    #[test]
    fn test_equality_and_flags() {
        let (sql, params) = CatalogFilter::new()
            .source("zenodo")
            .file_type("QDPX")
            .qda_only()
            .downloaded_only()
            .to_sql();
        assert_eq!(
            sql,
            " WHERE source_name = ?1 AND file_type = ?2 AND is_qda_file = ?3 AND local_path IS NOT NULL"
        );
        assert_eq!(
            params,
            vec![
                Value::Text("zenodo".to_string()),
                Value::Text(".qdpx".to_string()),
                Value::Integer(1),
            ]
        );
    }

    #[test]
    fn test_search_spans_columns() {
        let (sql, params) = CatalogFilter::new().search("Nurses").to_sql();
        assert_eq!(
            sql,
            " WHERE (LOWER(title) LIKE ?1 OR LOWER(description) LIKE ?1 OR LOWER(keywords) LIKE ?1 OR LOWER(tags) LIKE ?1)"
        );
        assert_eq!(params, vec![Value::Text("%nurses%".to_string())]);
    }

    #[test]
    fn test_normalize_file_type() {
        assert_eq!(normalize_file_type("qdpx"), ".qdpx");
        assert_eq!(normalize_file_type(".PDF"), ".pdf");
    }
}
