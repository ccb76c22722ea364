//! CLI tests for the offline commands.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn qdarchive(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("qdarchive").unwrap();
    cmd.env("QDARCHIVE_DB_PATH", dir.join("catalog.db"))
        .env("QDARCHIVE_DATA_DIR", dir.join("data"))
        .env("QDARCHIVE_EXPORTS_DIR", dir.join("exports"))
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_status_on_empty_catalog() {
    let tmp = tempfile::tempdir().unwrap();
    qdarchive(tmp.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Total records:"))
        .stdout(predicate::str::contains("Downloaded files:"));
    assert!(tmp.path().join("catalog.db").exists());
}

#[test]
fn test_db_flag_overrides_environment() {
    let tmp = tempfile::tempdir().unwrap();
    let custom = tmp.path().join("custom.db");
    qdarchive(tmp.path())
        .args(["status", "--db"])
        .arg(&custom)
        .assert()
        .success();
    assert!(custom.exists());
    assert!(!tmp.path().join("catalog.db").exists());
}

#[test]
fn test_list_sources() {
    let tmp = tempfile::tempdir().unwrap();
    qdarchive(tmp.path())
        .arg("list-sources")
        .assert()
        .success()
        .stdout(predicate::str::contains("dataverseno"))
        .stdout(predicate::str::contains("qualidatanet"))
        .stdout(predicate::str::contains("uk-data-service"));
}

#[test]
fn test_unknown_source_exits_non_zero() {
    let tmp = tempfile::tempdir().unwrap();
    qdarchive(tmp.path())
        .args(["scrape", "figshare"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown source: 'figshare'"));
    assert!(!tmp.path().join("catalog.db").exists());
}

#[test]
fn test_export_writes_header() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out").join("metadata.csv");
    qdarchive(tmp.path())
        .args(["export", "-o"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported 0 records"));

    let csv = std::fs::read_to_string(&out).unwrap();
    assert!(csv.starts_with("id,source_name,source_url,download_url,file_name"));
}

#[test]
fn test_show_missing_record() {
    let tmp = tempfile::tempdir().unwrap();
    qdarchive(tmp.path())
        .args(["show", "42"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No record found"));
}

#[test]
fn test_reset_requires_confirmation() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    std::fs::create_dir_all(data.join("zenodo")).unwrap();
    std::fs::write(data.join("zenodo").join("a.qdpx"), b"x").unwrap();

    qdarchive(tmp.path())
        .arg("reset")
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Aborted"));
    assert!(data.join("zenodo").join("a.qdpx").exists());

    qdarchive(tmp.path())
        .args(["reset", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 0 records"));
    assert!(data.exists());
    assert!(!data.join("zenodo").exists());
}
