//! Query plans: which search strings each source is asked.
//!
//! A plan comes from the built-in list, from repeated `--query` flags, or
//! from a YAML file:
//!
//! ```yaml
//! default:
//!   - qualitative interviews
//!   - qdpx
//! sources:
//!   qualidatanet:
//!     - Interview
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{HarvesterError, Result};

/// Queries used when the caller gives none.
pub const DEFAULT_QUERIES: &[&str] = &[
    "qdpx",
    "qualitative data",
    "interview transcripts",
    "focus group",
    "nvivo",
    "maxqda",
    "atlas.ti",
];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueryPlan {
    /// Queries for every source without its own list.
    #[serde(default)]
    pub default: Vec<String>,
    /// Per-source overrides, keyed by registry name.
    #[serde(default)]
    pub sources: BTreeMap<String, Vec<String>>,
}

impl Default for QueryPlan {
    fn default() -> Self {
        Self::from_queries(DEFAULT_QUERIES.iter().map(|q| (*q).to_string()).collect())
    }
}

impl QueryPlan {
    /// Plan that asks every source the same queries.
    pub fn from_queries(queries: Vec<String>) -> Self {
        Self {
            default: queries,
            sources: BTreeMap::new(),
        }
    }

    /// Parse a YAML plan. A plan without any query is rejected.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let plan: Self = serde_yaml_ng::from_str(text)?;
        if plan.default.is_empty() && plan.sources.values().all(Vec::is_empty) {
            return Err(HarvesterError::Config(
                "query file lists no queries".to_string(),
            ));
        }
        Ok(plan)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Queries for one source: its own list if present, else the default.
    #[must_use]
    pub fn for_source(&self, source: &str) -> &[String] {
        match self.sources.get(source) {
            Some(queries) if !queries.is_empty() => queries,
            _ => &self.default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_plan() {
        let plan = QueryPlan::default();
        assert_eq!(plan.for_source("zenodo").len(), DEFAULT_QUERIES.len());
        assert_eq!(plan.for_source("zenodo")[0], "qdpx");
    }

    #[test]
    fn test_yaml_plan_with_override() {
        let yaml = r#"
default:
  - qualitative interviews
sources:
  qualidatanet:
    - Interview
    - Biographie
"#;
        let plan = QueryPlan::from_yaml(yaml).unwrap();
        assert_eq!(plan.for_source("dryad"), ["qualitative interviews".to_string()]);
        assert_eq!(
            plan.for_source("qualidatanet"),
            ["Interview".to_string(), "Biographie".to_string()]
        );
    }

    #[test]
    fn test_empty_override_falls_back() {
        let yaml = "default: [qdpx]\nsources:\n  ukds: []\n";
        let plan = QueryPlan::from_yaml(yaml).unwrap();
        assert_eq!(plan.for_source("ukds"), ["qdpx".to_string()]);
    }

    #[test]
    fn test_empty_plan_rejected() {
        let err = QueryPlan::from_yaml("default: []\n").unwrap_err();
        assert!(matches!(err, HarvesterError::Config(_)));
    }

    #[test]
    fn test_invalid_yaml() {
        let err = QueryPlan::from_yaml("default: {not: [a list").unwrap_err();
        assert!(matches!(err, HarvesterError::Yaml(_)));
    }
}
