//! Error types for the harvester.
//!
//! Uses the dual-error pattern: `HarvesterError` for library consumers
//! with detailed error context, and predicates like
//! [`HarvesterError::is_access_denied`] so the orchestrator can pick a
//! recovery policy without matching on transport internals.

use thiserror::Error;

/// Main error type for the harvester library.
#[derive(Debug, Error)]
pub enum HarvesterError {
    /// HTTP request failed at the transport level.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status code.
    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// All retry attempts failed.
    #[error("Giving up after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    /// A source could not be reached during search or metadata lookup.
    #[error("Source '{source_name}' unavailable: {message}")]
    SourceUnavailable {
        source_name: String,
        message: String,
    },

    /// Requested source is not registered.
    #[error("Unknown source: '{0}'. Run `list-sources` to see the available sources")]
    UnknownSource(String),

    /// A record lookup returned nothing.
    #[error("No record found for {0}")]
    RecordNotFound(String),

    /// Operation is not offered by this source.
    #[error("{source_name} does not support {operation}")]
    Unsupported {
        source_name: String,
        operation: String,
    },

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decoding failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML query file could not be parsed.
    #[error("YAML parsing failed: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// Catalog database error.
    #[error("Catalog error: {0}")]
    Database(#[from] rusqlite::Error),

    /// CSV export failed.
    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),
}

impl HarvesterError {
    /// HTTP status carried by this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the server refused access (HTTP 403).
    ///
    /// The orchestrator treats this like a file flagged as restricted.
    #[must_use]
    pub fn is_access_denied(&self) -> bool {
        self.status() == Some(403)
    }
}

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, HarvesterError>;
