//! Relevance heuristics: QDA file detection and qualitative-topic signals.
//!
//! These are recall-oriented substring checks, not NLP. The keyword table
//! is a flat set of lowercase substrings covering English, Dutch,
//! Norwegian, German, Spanish, French and Portuguese research vocabulary.

use crate::config::{QDA_EXTENSIONS, QUALITATIVE_EXTENSIONS};
use crate::types::{file_extension, FileInfo, SearchResult};

/// Markers in friendly-type or content-type strings that identify REFI-QDA exports.
const REFI_QDA_MARKERS: &[&str] = &["refi-qda", "refiqda"];

/// Resource types that describe something other than research data.
pub const NON_DATA_KINDS: &[&str] = &[
    "publication",
    "poster",
    "presentation",
    "software",
    "image",
    "video",
    "lesson",
    "physicalobject",
    "workflow",
    "model",
];

/// Substrings signalling qualitative research in descriptions and keywords.
pub const QUALITATIVE_KEYWORDS: &[&str] = &[
    // English
    "qualitative",
    "interview",
    "focus group",
    "ethnograph",
    "grounded theory",
    "thematic analysis",
    "discourse analysis",
    "narrative analysis",
    "content analysis",
    "oral history",
    "life history",
    "participant observation",
    "field notes",
    "fieldnotes",
    "fieldwork",
    "transcript",
    "case study",
    "phenomenolog",
    "codebook",
    "coding scheme",
    // Dutch
    "kwalitatie",
    "focusgroep",
    "etnografi",
    "diepte-interview",
    "veldwerk",
    // Norwegian / Danish / Swedish
    "kvalitativ",
    "intervju",
    "fokusgruppe",
    "feltarbeid",
    "feltnotater",
    // German, Portuguese
    "qualitativ",
    "leitfadeninterview",
    "transkript",
    "feldnotizen",
    "grupo focal",
    "entrevista",
    "pesquisa qualitativa",
    // Spanish
    "cualitativ",
    "grupos focales",
    "etnográf",
    "transcripci",
    // French
    "entretien",
    "groupe de discussion",
    "ethnographi",
    "recherche qualitative",
    // QDA software and formats
    "nvivo",
    "maxqda",
    "atlas.ti",
    "atlasti",
    "dedoose",
    "qda miner",
    "qdaminer",
    "qdacity",
    "refi-qda",
    "refiqda",
    "qdpx",
];

/// True iff the file looks like a QDA project file.
///
/// Matches the fixed QDA extension set, or a REFI-QDA marker in the
/// friendly type or content type (case-insensitive).
///
/// # Examples
/// ```
/// use qdarchive_harvester::classify::is_qda_file;
///
/// assert!(is_qda_file("study.qdpx", "", ""));
/// assert!(is_qda_file("notes.txt", "", "application/x-REFIQDA"));
/// assert!(!is_qda_file("report.pdf", "PDF", "application/pdf"));
/// ```
pub fn is_qda_file(name: &str, friendly_type: &str, content_type: &str) -> bool {
    let ext = file_extension(name);
    if !ext.is_empty() && QDA_EXTENSIONS.contains(&ext.as_str()) {
        return true;
    }
    let types = format!("{} {}", friendly_type, content_type).to_lowercase();
    REFI_QDA_MARKERS.iter().any(|marker| types.contains(marker))
}

/// [`is_qda_file`] applied to a connector-reported file.
pub fn is_qda(file: &FileInfo) -> bool {
    is_qda_file(&file.name, &file.friendly_type, &file.content_type)
}

/// True if the extension is one of the plain qualitative material formats.
pub fn is_qualitative_extension(name: &str) -> bool {
    let ext = file_extension(name);
    !ext.is_empty() && QUALITATIVE_EXTENSIONS.contains(&ext.as_str())
}

/// Whether a file deserves a download at all.
pub fn is_relevant_file(file: &FileInfo) -> bool {
    is_qda(file) || is_qualitative_extension(&file.name)
}

/// True if the text contains at least one qualitative-research signal.
pub fn has_qualitative_signal(text: &str) -> bool {
    let lower = text.to_lowercase();
    QUALITATIVE_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// First declared kind-of-data entry that marks a non-data resource.
pub fn non_data_kind(kind_of_data: &[String]) -> Option<&str> {
    kind_of_data
        .iter()
        .map(String::as_str)
        .find(|kind| NON_DATA_KINDS.contains(&kind.trim().to_lowercase().as_str()))
}

/// Outcome of the dataset relevance gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relevance {
    /// Carries at least one QDA file.
    HasQdaFile,
    /// No QDA file, but the metadata reads as qualitative research.
    QualitativeSignal,
    /// Declared as a non-data resource (publication, software, ...).
    NonDataResource(String),
    /// Nothing in description or keywords suggests qualitative research.
    NoQualitativeSignal,
}

impl Relevance {
    #[must_use]
    pub fn is_relevant(&self) -> bool {
        matches!(self, Self::HasQdaFile | Self::QualitativeSignal)
    }
}

/// Decide whether a dataset is topically relevant.
///
/// A dataset with a QDA file always passes. Otherwise it must not be
/// declared as a non-data resource, and its description plus keywords must
/// contain a qualitative signal.
pub fn assess_relevance(result: &SearchResult) -> Relevance {
    if result.files.iter().any(is_qda) {
        return Relevance::HasQdaFile;
    }

    if let Some(kind) = non_data_kind(&result.kind_of_data) {
        return Relevance::NonDataResource(kind.to_string());
    }

    let text = format!("{} {}", result.description, result.keywords.join(" "));
    if has_qualitative_signal(&text) {
        Relevance::QualitativeSignal
    } else {
        Relevance::NoQualitativeSignal
    }
}
