//! License normalization and the open-license gate.
//!
//! Only openly licensed datasets are harvested. Sources phrase the same
//! license in many ways ("Creative Commons Attribution 4.0 International",
//! "CC BY 4.0", "cc-by-4.0"), so strings are first collapsed into a
//! canonical SPDX-like token and then tested against an allow-list of
//! prefixes.

use std::sync::LazyLock;

use regex::Regex;

/// Accepted license prefixes, compared against the hyphenated lowercase form.
pub const OPEN_LICENSE_PREFIXES: &[&str] = &[
    "cc-by",
    "cc-by-sa",
    "cc-by-nc",
    "cc-by-nc-sa",
    "cc-by-nd",
    "cc-by-nc-nd",
    "cc0",
    "public-domain",
    "odc-by",
    "odc-odbl",
    "odc-pddl",
    "mit",
    "apache-2.0",
    // QDR: documentation is CC BY-SA 4.0, data is free for registered users
    "standard-access",
];

/// Short form: "CC BY-NC-SA 4.0", "cc-by-4.0", "CC BY".
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static SHORT_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^cc[\s-]+by((?:[\s-]+(?:nc|sa|nd))*)(?:[\s-]+v?(\d+(?:\.\d+)?))?(?:[\s(].*)?$")
        .expect("valid regex")
});

/// Version number inside a long-form name.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+\.\d+)\b").expect("valid regex"));

/// Creative Commons deed URL: `/licenses/by-nc/4.0/` or `/publicdomain/zero/1.0/`.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static CC_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"creativecommons\.org/(?:licenses/([a-z-]+)|publicdomain/(zero))/(\d+\.\d+)")
        .expect("valid regex")
});

/// Collapse common Creative Commons phrasings into a canonical token.
///
/// Unrecognized strings are returned unchanged.
///
/// # Examples
/// ```
/// use qdarchive_harvester::license::normalize_license;
///
/// assert_eq!(normalize_license("Creative Commons Attribution 4.0 International"), "CC-BY-4.0");
/// assert_eq!(normalize_license("CC BY-SA 4.0"), "CC-BY-SA-4.0");
/// assert_eq!(normalize_license("CC0 1.0"), "CC0-1.0");
/// assert_eq!(normalize_license("All rights reserved"), "All rights reserved");
/// ```
pub fn normalize_license(raw: &str) -> String {
    let lower = raw.trim().to_lowercase().replace('_', " ");
    if lower.is_empty() {
        return raw.to_string();
    }

    if lower.starts_with("cc0")
        || lower.starts_with("cc zero")
        || lower.starts_with("creative commons zero")
        || lower.starts_with("creative commons cc0")
    {
        return "CC0-1.0".to_string();
    }

    if let Some(rest) = lower.strip_prefix("creative commons attribution") {
        let nc = rest.contains("noncommercial") || rest.contains("non-commercial");
        let sa = rest.contains("sharealike") || rest.contains("share-alike") || rest.contains("share alike");
        let nd = rest.contains("noderiv") || rest.contains("no-deriv") || rest.contains("no deriv");
        let version = VERSION.captures(rest).map(|c| c[1].to_string());
        return cc_token(nc, sa, nd, version.as_deref());
    }

    if let Some(caps) = SHORT_FORM.captures(&lower) {
        let flags = caps.get(1).map_or("", |m| m.as_str());
        let has = |flag: &str| {
            flags
                .split(|c: char| c == '-' || c.is_whitespace())
                .any(|f| f == flag)
        };
        let version = caps.get(2).map(|m| m.as_str());
        return cc_token(has("nc"), has("sa"), has("nd"), version);
    }

    raw.to_string()
}

fn cc_token(nc: bool, sa: bool, nd: bool, version: Option<&str>) -> String {
    let mut token = String::from("CC-BY");
    if nc {
        token.push_str("-NC");
    }
    if sa {
        token.push_str("-SA");
    } else if nd {
        token.push_str("-ND");
    }
    if let Some(version) = version {
        token.push('-');
        token.push_str(version);
    }
    token
}

/// Canonical token for a Creative Commons deed URL, if it is one.
///
/// # Examples
/// ```
/// use qdarchive_harvester::license::license_from_url;
///
/// assert_eq!(
///     license_from_url("https://creativecommons.org/licenses/by-nc/4.0/"),
///     Some("CC-BY-NC-4.0".to_string())
/// );
/// assert_eq!(license_from_url("https://example.org/terms"), None);
/// ```
pub fn license_from_url(url: &str) -> Option<String> {
    let lower = url.to_lowercase();
    let caps = CC_URL.captures(&lower)?;
    let version = &caps[3];
    if caps.get(2).is_some() {
        return Some(format!("CC0-{version}"));
    }
    let code = caps.get(1)?.as_str();
    Some(format!("CC-{}-{version}", code.to_uppercase()))
}

/// Return true if the license identifier looks like an open license.
pub fn is_open_license(license: &str) -> bool {
    let normalized = license.trim().to_lowercase().replace([' ', '_'], "-");
    if normalized.is_empty() {
        return false;
    }
    OPEN_LICENSE_PREFIXES
        .iter()
        .any(|prefix| normalized.starts_with(prefix))
}

/// Canonical license of a dataset, falling back to its license URL.
pub fn effective_license(license_type: &str, license_url: &str) -> String {
    if license_type.trim().is_empty() {
        return license_from_url(license_url).unwrap_or_default();
    }
    normalize_license(license_type)
}

/// The license gate: normalize, then test against the allow-list.
pub fn passes_license_gate(license_type: &str, license_url: &str) -> bool {
    is_open_license(&effective_license(license_type, license_url))
}
