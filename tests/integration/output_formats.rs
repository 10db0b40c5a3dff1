use assert_cmd::Command;
use predicates::prelude::*;
use test_support::read_fixture_text;

use crate::helpers::eng_metrics;

fn releases(cwd: &std::path::Path) -> Command {
  let mut cmd = eng_metrics(cwd);
  cmd
    .env("EM_TEST_GITHUB_TAGS_JSON", read_fixture_text("github/tags.json"))
    .args(["--no-cache", "--year", "2024", "releases", "--repo", "acme/api"]);
  cmd
}

#[test]
fn table_is_the_default_format() {
  let dir = test_support::tempdir();
  releases(dir.path())
    .assert()
    .success()
    .stdout(predicate::str::starts_with("releases (2024-01-01T00:00:00+00:00"))
    .stdout(predicate::str::contains("Month    Releases  Tags"))
    .stdout(predicate::str::contains("release-2024-03-02, release-2024-03-20"))
    .stdout(predicate::str::contains("repository: acme/api"));
}

#[test]
fn csv_has_header_and_quoted_lists() {
  let dir = test_support::tempdir();
  let out = releases(dir.path()).args(["--format", "csv"]).output().unwrap();
  assert!(out.status.success());

  let text = String::from_utf8(out.stdout).unwrap();
  let lines: Vec<&str> = text.lines().collect();
  assert_eq!(lines[0], "Month,Releases,Tags");
  assert_eq!(lines[1], "2024-01,1,release-2024-01-15");
  assert_eq!(lines[2], "2024-03,2,\"release-2024-03-02, release-2024-03-20\"");
  assert_eq!(lines.len(), 3);
}

#[test]
fn out_writes_to_file_and_creates_parents() {
  let dir = test_support::tempdir();
  let target = dir.path().join("reports").join("releases.json");

  releases(dir.path())
    .args(["--format", "json", "--out"])
    .arg(&target)
    .assert()
    .success()
    .stdout(predicate::str::is_empty());

  let doc: serde_json::Value = test_support::read_json(&target);
  assert_eq!(doc["report"], "releases");
  assert_eq!(doc["summary"]["total"], 3);
}

#[test]
fn json_logs_go_to_stderr_only() {
  let dir = test_support::tempdir();
  let out = releases(dir.path())
    .env("RUST_LOG", "info")
    .args(["--log-json", "--format", "json"])
    .output()
    .unwrap();
  assert!(out.status.success());

  let doc: serde_json::Value = serde_json::from_slice(&out.stdout).expect("stdout stays pure JSON");
  assert_eq!(doc["report"], "releases");

  let stderr = String::from_utf8_lossy(&out.stderr);
  let first = stderr.lines().find(|l| !l.trim().is_empty()).expect("some log output");
  let event: serde_json::Value = serde_json::from_str(first).expect("log line is JSON");
  assert!(event.get("level").is_some());
}
