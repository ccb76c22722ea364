//! Registry mapping source identifiers to connectors.

use std::collections::HashMap;

use super::{
    Connector, DataverseConnector, DryadConnector, QualidataNetConnector, UkdsConnector,
    ZenodoConnector,
};
use crate::config::source_dir_name;
use crate::error::{HarvesterError, Result};

/// Dataverse instances harvested by default: `(name, base URL)`.
pub const DATAVERSE_INSTANCES: &[(&str, &str)] = &[
    ("qdr", "https://data.qdr.syr.edu"),
    ("dans", "https://ssh.datastations.nl"),
    ("dataverseno", "https://dataverse.no"),
];

const DESCRIPTIONS: &[(&str, &str)] = &[
    ("qdr", "Qualitative Data Repository (Dataverse)"),
    ("dans", "DANS Data Station Social Sciences and Humanities (Dataverse)"),
    ("dataverseno", "DataverseNO (Dataverse)"),
    ("zenodo", "Zenodo"),
    ("dryad", "Dryad"),
    ("ukds", "UK Data Service ReShare (EPrints)"),
    ("qualidatanet", "QualidataNet (metadata only)"),
];

/// One line of `list-sources`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub name: String,
    pub description: String,
    /// Directory under the data root that holds this source's files.
    pub dir_name: String,
}

/// Connectors keyed by name, iterated in registration order.
pub struct ConnectorRegistry {
    connectors: HashMap<String, Box<dyn Connector>>,
    order: Vec<String>,
}

impl ConnectorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connectors: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Registry with every built-in source and its production settings.
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        for (name, base_url) in DATAVERSE_INSTANCES {
            registry.register(Box::new(DataverseConnector::new(base_url, name)?));
        }
        registry.register(Box::new(ZenodoConnector::new()?));
        registry.register(Box::new(DryadConnector::new()?));
        registry.register(Box::new(UkdsConnector::new()?));
        registry.register(Box::new(QualidataNetConnector::new()?));
        Ok(registry)
    }

    /// Register a connector under its own name, replacing any previous one.
    pub fn register(&mut self, connector: Box<dyn Connector>) {
        let name = connector.name().to_string();
        if self.connectors.insert(name.clone(), connector).is_none() {
            self.order.push(name);
        }
    }

    /// Look up a connector by source name.
    pub fn get(&self, name: &str) -> Result<&dyn Connector> {
        self.connectors
            .get(name)
            .map(|c| c.as_ref())
            .ok_or_else(|| HarvesterError::UnknownSource(name.to_string()))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.connectors.contains_key(name)
    }

    /// Registered source names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Connectors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Connector> {
        self.order
            .iter()
            .filter_map(|name| self.connectors.get(name))
            .map(|c| c.as_ref())
    }

    #[must_use]
    pub fn sources(&self) -> Vec<SourceInfo> {
        self.order
            .iter()
            .map(|name| SourceInfo {
                name: name.clone(),
                description: DESCRIPTIONS
                    .iter()
                    .find(|(n, _)| *n == name.as_str())
                    .map_or_else(|| name.clone(), |(_, d)| (*d).to_string()),
                dir_name: source_dir_name(name).to_string(),
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
