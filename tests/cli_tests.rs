//! CLI integration tests using assert_cmd.
//!
//! Tests without database: always run (help, arg validation, settings file).
//! Tests with database: gated on TEST_DATABASE_URL environment variable.

mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

#[allow(deprecated)]
fn pricewatch() -> Command {
    let mut cmd = Command::cargo_bin("pricewatch").unwrap();
    cmd.env_remove("DATABASE_URL")
        .env_remove("SERVICE_DATABASE_URL")
        .env_remove("FIRECRAWL_API_KEY")
        .env_remove("RESEND_API_KEY");
    cmd
}

// --- Help and arg validation (no database needed) ---

#[test]
fn help_shows_all_subcommands() {
    pricewatch().arg("--help").assert().success().stdout(
        predicate::str::contains("serve")
            .and(predicate::str::contains("check"))
            .and(predicate::str::contains("track"))
            .and(predicate::str::contains("--database-url"))
            .and(predicate::str::contains("--config")),
    );
}

#[test]
fn help_track_shows_args() {
    pricewatch()
        .args(["track", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--owner").and(predicate::str::contains("<URL>")));
}

#[test]
fn help_serve_shows_port() {
    pricewatch()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--port"));
}

#[test]
fn track_rejects_non_uuid_owner() {
    pricewatch()
        .args(["track", "--owner", "not-a-uuid", "https://shop.example/widget"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--owner"));
}

#[test]
fn unknown_subcommand_fails() {
    pricewatch().arg("scrape").assert().failure();
}

#[test]
fn check_without_database_url_fails() {
    pricewatch()
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DATABASE_URL is required"));
}

#[test]
fn track_without_database_url_fails() {
    pricewatch()
        .args([
            "track",
            "--owner",
            "550e8400-e29b-41d4-a716-446655440000",
            "https://shop.example/widget",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("DATABASE_URL is required"));
}

// --- Settings file ---

#[test]
fn invalid_settings_file_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[batch]\nconcurrency = 0").unwrap();
    pricewatch()
        .arg("--config")
        .arg(file.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("batch.concurrency"));
}

#[test]
fn missing_settings_file_is_reported() {
    pricewatch()
        .args(["--config", "/nonexistent/pricewatch.toml", "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}

#[test]
fn firecrawl_backend_requires_api_key() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[fetcher]\nbackend = \"firecrawl\"").unwrap();
    pricewatch()
        .arg("--config")
        .arg(file.path())
        .args(["--database-url", "postgres://nobody@127.0.0.1:1/none"])
        .args([
            "track",
            "--owner",
            "550e8400-e29b-41d4-a716-446655440000",
            "https://shop.example/widget",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("FIRECRAWL_API_KEY"));
}

// --- With database ---

#[test]
fn check_on_empty_database_prints_report() {
    if !common::has_test_db() {
        eprintln!("Skipping: TEST_DATABASE_URL not set");
        return;
    }
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (db, _) = common::setup_test_db().await;
        common::truncate_all_tables(db.pool()).await;
    });

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[fetcher]\nbackend = \"meta\"").unwrap();
    pricewatch()
        .arg("--config")
        .arg(file.path())
        .env("DATABASE_URL", common::test_db_url())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total\": 0"));
}
