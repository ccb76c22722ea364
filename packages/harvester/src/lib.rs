//! QDArchive Harvester - Collect open qualitative research data.
//!
//! This crate searches public research-data repositories for qualitative
//! datasets, keeps the openly licensed and topically relevant ones,
//! downloads their QDA and qualitative files, and records every file in a
//! local SQLite catalog.
//!
//! # Example
//!
//! ```
//! use qdarchive_harvester::license::is_open_license;
//! use qdarchive_harvester::storage::slugify;
//!
//! assert!(is_open_license("CC-BY-4.0"));
//! assert!(!is_open_license("All rights reserved"));
//! assert_eq!(slugify("Café Interviews: 2019"), "cafe-interviews-2019");
//! ```
//!
//! # Architecture
//!
//! - [`connectors`]: One connector per source behind the [`Connector`] trait, plus the registry
//! - [`harvester`]: Search, gating, per-file decisions and `scrape-all` retries
//! - [`catalog`]: SQLite catalog of harvested files
//! - [`classify`]: QDA detection and relevance heuristics
//! - [`license`]: License normalization and the open-license gate
//! - [`storage`]: Local file layout and SHA-256 hashing
//! - [`http`]: Throttled, retrying HTTP client shared by the connectors
//! - [`queries`]: Query plans
//! - [`export`]: CSV export
//! - [`config`]: Constants and runtime settings
//! - [`types`]: Core data types
//! - [`error`]: Error types and Result alias
//! - [`cli`]: Command-line interface

pub mod catalog;
pub mod classify;
pub mod cli;
pub mod config;
pub mod connectors;
pub mod error;
pub mod export;
pub mod harvester;
pub mod http;
pub mod license;
pub mod queries;
pub mod storage;
pub mod text;
pub mod types;

// Re-export commonly used items
pub use catalog::{Catalog, CatalogFilter, CatalogRecord};
pub use connectors::{Connector, ConnectorRegistry};
pub use error::{HarvesterError, Result};
pub use harvester::{Harvester, ScrapeOptions};
pub use queries::QueryPlan;
pub use types::{FileInfo, HarvestStats, SearchResult, SourceStatus, SourceSummary};
