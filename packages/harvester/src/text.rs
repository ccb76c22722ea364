//! Text normalization for metadata fields.

use std::sync::LazyLock;

use regex::Regex;

/// Matches an HTML tag.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

/// Matches a run of whitespace.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Matches numeric character references like `&#233;` or `&#xE9;`.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static NUMERIC_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("valid regex"));

const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&amp;", "&"),
];

/// Remove HTML tags, decode common entities and collapse whitespace.
///
/// # Examples
/// ```
/// use qdarchive_harvester::text::strip_html;
///
/// assert_eq!(strip_html("<p>Hello <b>world</b></p>"), "Hello world");
/// assert_eq!(strip_html("Fish &amp; chips"), "Fish & chips");
/// ```
pub fn strip_html(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let without_tags = HTML_TAG.replace_all(text, " ");
    let decoded = decode_entities(&without_tags);
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    let numeric = NUMERIC_ENTITY.replace_all(text, |caps: &regex::Captures<'_>| {
        let code = &caps[1];
        let value = match code.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse().ok(),
        };
        value
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });

    // `&amp;` comes last so "&amp;lt;" decodes to "&lt;", not "<".
    NAMED_ENTITIES
        .iter()
        .fold(numeric.into_owned(), |acc, (entity, replacement)| {
            acc.replace(entity, replacement)
        })
}

/// Join non-empty values with `"; "`.
pub fn join_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

/// "Given Family" from optional name parts, trimmed.
pub fn full_name(given: &str, family: &str) -> String {
    format!("{} {}", given.trim(), family.trim()).trim().to_string()
}
