use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

fn path_as_str(path: &Path) -> &str {
    path.to_str().expect("path should be valid utf-8")
}

#[test]
fn clean_requires_config() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("netops"));
    cmd.arg("clean")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--config"));
}

#[test]
fn clean_rejects_config_without_clean_table() {
    let dir = tempdir().expect("tempdir");
    let config = dir.path().join("netops.toml");
    fs::write(&config, "[upgrade]\nstore = \"/tmp/x.db\"\n").expect("config");

    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("netops"));
    cmd.arg("clean")
        .arg("--config")
        .arg(path_as_str(&config))
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no [clean] table"));
}

#[test]
fn clean_reports_unreachable_api() {
    let dir = tempdir().expect("tempdir");
    let config = dir.path().join("netops.toml");
    let sample = fs::read_to_string(fixture("fixtures/clean.toml")).expect("sample");
    fs::write(
        &config,
        sample.replace("https://api.netmaker.example.com", "http://127.0.0.1:9"),
    )
    .expect("config");

    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("netops"));
    cmd.arg("clean")
        .arg("--config")
        .arg(path_as_str(&config))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to list devices of network netmaker"));
}
