//! CLI integration tests for hubmigrate
//!
//! These tests drive the binary for everything that works without a hub:
//! argument parsing, mapping inspection and configuration errors.

use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get a command instance for the hubmigrate binary, isolated from the
/// caller's environment
fn hubmigrate_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("hubmigrate"));
    cmd.env_remove("HUB_MIGRATE_HUB_ID")
        .env_remove("HUB_MIGRATE_BASE_URL")
        .env_remove("HUB_MIGRATE_TOKEN")
        .env_remove("HUB_MIGRATE_DST_HUB_ID")
        .env_remove("HUB_MIGRATE_DST_BASE_URL")
        .env_remove("HUB_MIGRATE_DST_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

/// Writes a mapping file with the given pairs
fn write_mapping(dir: &TempDir, pairs: &[(&str, &str)]) -> std::path::PathBuf {
    let pairs: Vec<[&str; 2]> = pairs.iter().map(|(a, b)| [*a, *b]).collect();
    let path = dir.path().join("mapping.json");
    fs::write(
        &path,
        serde_json::json!({ "contentItems": pairs }).to_string(),
    )
    .unwrap();
    path
}

/// Writes an empty config file so the user's own config is never read
fn empty_config(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, "").unwrap();
    path
}

// =============================================================================
// Help and arguments
// =============================================================================

#[test]
fn test_help_lists_commands() {
    hubmigrate_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("import"))
        .stdout(predicate::str::contains("export"))
        .stdout(predicate::str::contains("unarchive"))
        .stdout(predicate::str::contains("copy"))
        .stdout(predicate::str::contains("move"))
        .stdout(predicate::str::contains("mapping"));
}

#[test]
fn test_import_help_shows_options() {
    hubmigrate_cmd()
        .args(["import", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--base-repo"))
        .stdout(predicate::str::contains("--skip-incomplete"))
        .stdout(predicate::str::contains("--republish"));
}

#[test]
fn test_import_rejects_two_bases() {
    hubmigrate_cmd()
        .args(["import", "dir", "--base-repo", "r", "--base-folder", "f"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_move_help_shows_options() {
    hubmigrate_cmd()
        .args(["move", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--src-repo"))
        .stdout(predicate::str::contains("--dst-hub-id"))
        .stdout(predicate::str::contains("--revert-log"));
}

#[test]
fn test_copy_rejects_two_destinations() {
    hubmigrate_cmd()
        .args(["copy", "--dst-repo", "r", "--dst-folder", "f"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

// =============================================================================
// Mapping inspection
// =============================================================================

#[test]
fn test_mapping_show_lists_pairs() {
    let dir = TempDir::new().unwrap();
    let mapping = write_mapping(&dir, &[("src-1", "dst-9"), ("src-2", "dst-4")]);
    let config = empty_config(&dir);

    hubmigrate_cmd()
        .arg("--config")
        .arg(&config)
        .args(["mapping", "show"])
        .arg(&mapping)
        .assert()
        .success()
        .stdout(predicate::str::contains("src-1\tdst-9"))
        .stdout(predicate::str::contains("2 mapping(s)"));
}

#[test]
fn test_mapping_show_json() {
    let dir = TempDir::new().unwrap();
    let mapping = write_mapping(&dir, &[("src-1", "dst-9")]);
    let config = empty_config(&dir);

    let output = hubmigrate_cmd()
        .arg("--config")
        .arg(&config)
        .args(["--format", "json", "mapping", "show"])
        .arg(&mapping)
        .output()
        .unwrap();

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json[0]["source"], "src-1");
    assert_eq!(json[0]["destination"], "dst-9");
}

#[test]
fn test_mapping_get() {
    let dir = TempDir::new().unwrap();
    let mapping = write_mapping(&dir, &[("src-1", "dst-9")]);
    let config = empty_config(&dir);

    hubmigrate_cmd()
        .arg("--config")
        .arg(&config)
        .args(["mapping", "get"])
        .arg(&mapping)
        .arg("src-1")
        .assert()
        .success()
        .stdout("dst-9\n");

    hubmigrate_cmd()
        .arg("--config")
        .arg(&config)
        .args(["mapping", "get"])
        .arg(&mapping)
        .arg("unknown")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No mapping for unknown"));
}

#[test]
fn test_mapping_show_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    let config = empty_config(&dir);

    hubmigrate_cmd()
        .arg("--config")
        .arg(&config)
        .args(["mapping", "show"])
        .arg(dir.path().join("nope.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_export_without_hub_id_fails() {
    let dir = TempDir::new().unwrap();
    let config = empty_config(&dir);

    hubmigrate_cmd()
        .arg("--config")
        .arg(&config)
        .arg("export")
        .arg(dir.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("No hub configured"));
}

#[test]
fn test_copy_without_hub_id_fails() {
    let dir = TempDir::new().unwrap();
    let config = empty_config(&dir);

    hubmigrate_cmd()
        .arg("--config")
        .arg(&config)
        .args(["copy", "--src-repo", "r"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No hub configured"));
}

#[test]
fn test_missing_config_file_fails() {
    let dir = TempDir::new().unwrap();

    hubmigrate_cmd()
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .args(["mapping", "show", "x.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));
}

#[test]
fn test_invalid_publish_config_fails() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(&config, "[publish]\nmax_concurrent = 0\n").unwrap();

    hubmigrate_cmd()
        .arg("--config")
        .arg(&config)
        .args(["mapping", "show", "x.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_concurrent"));
}
