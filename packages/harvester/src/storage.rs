//! Local file layout and content hashing.
//!
//! Downloaded files live at
//! `{data_root}/{source_dir}/{slug(title)}-{record_id}/{filename}`. The
//! layout is deterministic so repeated runs find the same directories. A
//! second file with the same name in one dataset is stored as
//! `{stem}_2.{ext}`, then `_3` and so on.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use crate::config::{source_dir_name, CHUNK_SIZE, SLUG_MAX_LEN};
use crate::error::Result;

/// Turn a title into a lowercase ASCII slug.
///
/// Accents are stripped, runs of non-alphanumeric characters become single
/// hyphens, and long slugs are cut back to the last hyphen within
/// [`SLUG_MAX_LEN`] so words are never split.
///
/// # Examples
/// ```
/// use qdarchive_harvester::storage::slugify;
///
/// assert_eq!(slugify("Data & Analysis: Results (2024)"), "data-analysis-results-2024");
/// assert_eq!(slugify("Entrevistas Cualitativas Ñandú"), "entrevistas-cualitativas-nandu");
/// assert_eq!(slugify(""), "");
/// ```
pub fn slugify(title: &str) -> String {
    slugify_with_limit(title, SLUG_MAX_LEN)
}

/// [`slugify`] with an explicit length limit.
pub fn slugify_with_limit(title: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.nfkd().filter(char::is_ascii) {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    truncate_on_hyphen(slug, max_len)
}

fn truncate_on_hyphen(slug: String, max_len: usize) -> String {
    if slug.len() <= max_len {
        return slug;
    }
    // The slug is pure ASCII, so byte offsets are char boundaries.
    if slug.as_bytes()[max_len] == b'-' {
        return slug[..max_len].to_string();
    }
    match slug[..max_len].rfind('-') {
        Some(cut) => slug[..cut].to_string(),
        // A single word longer than the limit has no boundary to cut on.
        None => slug[..max_len].to_string(),
    }
}

/// Make a source record identifier safe as part of a directory name.
///
/// # Examples
/// ```
/// use qdarchive_harvester::storage::sanitize_record_id;
///
/// assert_eq!(sanitize_record_id("doi:10.5064/F6ABC123"), "doi_10.5064_F6ABC123");
/// ```
pub fn sanitize_record_id(record_id: &str) -> String {
    record_id.trim().replace(['/', ':', '\\'], "_")
}

/// Directory name for a dataset: `{slug(title)}-{record_id}` or just the id.
pub fn dataset_dir_name(title: &str, record_id: &str) -> String {
    let id = sanitize_record_id(record_id);
    let slug = slugify(title);
    match (slug.is_empty(), id.is_empty()) {
        (true, _) => id,
        (false, true) => slug,
        (false, false) => format!("{slug}-{id}"),
    }
}

/// Full storage directory for a dataset of a source.
pub fn dataset_dir(data_root: &Path, source: &str, title: &str, record_id: &str) -> PathBuf {
    data_root
        .join(source_dir_name(source))
        .join(dataset_dir_name(title, record_id))
}

/// File name with a copy number inserted before the extension.
///
/// # Examples
/// ```
/// use qdarchive_harvester::storage::numbered_file_name;
///
/// assert_eq!(numbered_file_name("README.txt", 2), "README_2.txt");
/// assert_eq!(numbered_file_name("Makefile", 3), "Makefile_3");
/// ```
pub fn numbered_file_name(name: &str, n: u32) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{n}.{ext}"),
        _ => format!("{name}_{n}"),
    }
}

/// SHA-256 of a file as lowercase hex, streamed in fixed-size chunks.
pub fn sha256_file(path: impl AsRef<Path>) -> Result<String> {
    let mut file = File::open(path)?;
    sha256_reader(&mut file)
}

/// SHA-256 of any readable source as lowercase hex.
pub fn sha256_reader<R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; CHUNK_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Data & Analysis: Results (2024)"), "data-analysis-results-2024");
        assert_eq!(slugify("  --Hello--World--  "), "hello-world");
        assert_eq!(slugify("Ärzte über Öffentlichkeit"), "arzte-uber-offentlichkeit");
    }

    #[test]
    fn test_slugify_empty_results() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("!!! ???"), "");
        assert_eq!(slugify("日本語"), "");
    }

    #[test]
    fn test_slugify_truncates_on_word_boundary() {
        let slug = slugify_with_limit("qualitative interviews with nurses", 20);
        assert_eq!(slug, "qualitative");
        assert!(!slug.ends_with('-'));

        // Limit landing exactly on a hyphen keeps the whole first part.
        assert_eq!(slugify_with_limit("alpha beta gamma", 10), "alpha-beta");
    }

    #[test]
    fn test_slugify_long_title_stays_within_limit() {
        let title = "A very long title about semi structured interviews conducted across several regions";
        let slug = slugify(title);
        assert!(slug.len() <= SLUG_MAX_LEN);
        assert!(!slug.ends_with('-'));
        assert!(title.to_lowercase().replace(' ', "-").starts_with(&slug));
    }

    #[test]
    fn test_dataset_dir_name() {
        assert_eq!(
            dataset_dir_name("Test Dataset", "doi:10.5064/F6ABC123"),
            "test-dataset-doi_10.5064_F6ABC123"
        );
        assert_eq!(dataset_dir_name("", "857166"), "857166");
        assert_eq!(dataset_dir_name("???", "857166"), "857166");
    }

    #[test]
    fn test_dataset_dir() {
        let dir = dataset_dir(Path::new("/data"), "ukds", "Youth Voices", "857166");
        assert_eq!(dir, PathBuf::from("/data/uk-data-service/youth-voices-857166"));
    }

    #[test]
    fn test_numbered_file_name() {
        assert_eq!(numbered_file_name("codes.qdpx", 2), "codes_2.qdpx");
        assert_eq!(numbered_file_name("archive.tar.gz", 4), "archive.tar_4.gz");
        assert_eq!(numbered_file_name(".hidden", 2), ".hidden_2");
    }

    #[test]
    fn test_sha256_reader() {
        let mut cursor = Cursor::new(b"hello world");
        assert_eq!(
            sha256_reader(&mut cursor).unwrap(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_sha256_file_matches_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let data = vec![7u8; CHUNK_SIZE * 3 + 11];
        std::fs::write(&path, &data).unwrap();

        let from_file = sha256_file(&path).unwrap();
        let from_reader = sha256_reader(&mut Cursor::new(data)).unwrap();
        assert_eq!(from_file, from_reader);
    }
}
