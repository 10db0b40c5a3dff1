use serde_json::Value;
use test_support::read_fixture_text;

use crate::helpers::{eng_metrics, failure_stderr, json_report, with_jira};

#[test]
fn saved_rows_replay_without_credentials_or_network() {
  let dir = test_support::tempdir();
  let rows_path = dir.path().join("dump").join("issues.json");

  let mut save = eng_metrics(dir.path());
  with_jira(&mut save, "jira/released_issues.json")
    .args(["--no-cache", "--year", "2024", "cycle-time", "--save-to-file"])
    .arg(&rows_path);
  let saved = json_report(&mut save);

  let raw: Vec<Value> = test_support::read_json(&rows_path);
  assert_eq!(raw.len(), 4);

  // only the project list is needed when replaying
  let loaded = json_report(
    eng_metrics(dir.path())
      .env("JIRA_PROJECTS", "CORE")
      .env("JIRA_TEAM_FIELD", "customfield_100")
      .args(["--no-cache", "--year", "2024", "cycle-time", "--load-from-file"])
      .arg(&rows_path),
  );

  assert_eq!(loaded["rows"], saved["rows"]);
  assert_eq!(loaded["summary"], saved["summary"]);
}

#[test]
fn github_rows_replay_without_token() {
  let dir = test_support::tempdir();
  let rows_path = dir.path().join("tags.json");

  let saved = json_report(
    eng_metrics(dir.path())
      .env("EM_TEST_GITHUB_TAGS_JSON", read_fixture_text("github/tags.json"))
      .args(["--no-cache", "--year", "2024", "releases", "--repo", "acme/api", "--save-to-file"])
      .arg(&rows_path),
  );

  let loaded = json_report(
    eng_metrics(dir.path())
      .env("PATH", "")
      .args(["--no-cache", "--year", "2024", "releases", "--repo", "acme/api", "--load-from-file"])
      .arg(&rows_path),
  );

  assert_eq!(loaded["rows"], saved["rows"]);
}

#[test]
fn load_rejects_non_array_files() {
  let dir = test_support::tempdir();
  let rows_path = dir.path().join("bad.json");
  std::fs::write(&rows_path, r#"{"not": "rows"}"#).unwrap();

  let err = failure_stderr(
    eng_metrics(dir.path())
      .args(["--no-cache", "releases", "--repo", "acme/api", "--load-from-file"])
      .arg(&rows_path),
  );
  assert!(err.contains("expected a JSON array"), "{err}");
}

#[test]
fn force_fresh_conflicts_with_load() {
  let dir = test_support::tempdir();
  let err = failure_stderr(eng_metrics(dir.path()).args([
    "--force-fresh",
    "--load-from-file",
    "rows.json",
    "releases",
  ]));
  assert!(err.contains("--force-fresh cannot be combined with --load-from-file"), "{err}");
}

#[test]
fn cached_responses_are_reused_until_forced_fresh() {
  let dir = test_support::tempdir();
  let cache_dir = dir.path().join("cache");
  let cache_arg = cache_dir.to_str().unwrap();

  let first = json_report(
    eng_metrics(dir.path())
      .env("EM_TEST_GITHUB_TAGS_JSON", read_fixture_text("github/tags.json"))
      .args(["--cache-dir", cache_arg, "--year", "2024", "releases", "--repo", "acme/api"]),
  );
  assert_eq!(first["summary"]["total"], 3);
  assert!(std::fs::read_dir(&cache_dir).unwrap().count() > 0);

  // different upstream data, same cache: the cached listing wins
  let cached = json_report(
    eng_metrics(dir.path())
      .env("EM_TEST_GITHUB_TAGS_JSON", "[]")
      .args(["--cache-dir", cache_arg, "--year", "2024", "releases", "--repo", "acme/api"]),
  );
  assert_eq!(cached["summary"]["total"], 3);

  let fresh = json_report(
    eng_metrics(dir.path())
      .env("EM_TEST_GITHUB_TAGS_JSON", "[]")
      .args(["--cache-dir", cache_arg, "--force-fresh", "--year", "2024", "releases", "--repo", "acme/api"]),
  );
  assert_eq!(fresh["summary"]["total"], 0);

  let bypassed = json_report(
    eng_metrics(dir.path())
      .env("EM_TEST_GITHUB_TAGS_JSON", read_fixture_text("github/tags.json"))
      .args(["--cache-dir", cache_arg, "--no-cache", "--year", "2024", "releases", "--repo", "acme/api"]),
  );
  assert_eq!(bypassed["summary"]["total"], 3);
}
