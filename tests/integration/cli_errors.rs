use test_support::read_fixture_text;

use crate::helpers::{eng_metrics, failure_stderr};

#[test]
fn missing_subcommand_is_reported() {
  let dir = test_support::tempdir();
  let err = failure_stderr(&mut eng_metrics(dir.path()));
  assert!(err.contains("No report selected"), "{err}");
}

#[test]
fn ambiguous_window_is_rejected() {
  let dir = test_support::tempdir();
  let err = failure_stderr(eng_metrics(dir.path()).args(["--year", "2024", "--month", "2024-03", "cycle-time"]));
  assert!(err.contains("Ambiguous time selection"), "{err}");
}

#[test]
fn since_requires_until() {
  let dir = test_support::tempdir();
  let err = failure_stderr(eng_metrics(dir.path()).args(["--since", "2024-01-01", "releases"]));
  assert!(err.contains("--since and --until must be used together"), "{err}");
}

#[test]
fn unknown_timezone_is_rejected() {
  let dir = test_support::tempdir();
  let err = failure_stderr(eng_metrics(dir.path()).args(["--tz", "Mars/Olympus", "releases"]));
  assert!(err.contains("invalid --tz"), "{err}");
}

#[test]
fn jira_reports_list_every_missing_variable() {
  let dir = test_support::tempdir();
  let err = failure_stderr(eng_metrics(dir.path()).arg("cycle-time"));
  assert!(err.contains("Missing required environment variables"), "{err}");
  for var in ["JIRA_LINK", "USER_EMAIL", "JIRA_API_KEY", "JIRA_PROJECTS"] {
    assert!(err.contains(var), "{var} not listed in: {err}");
  }
}

#[test]
fn github_reports_need_a_repository() {
  let dir = test_support::tempdir();
  let err = failure_stderr(
    eng_metrics(dir.path())
      .env("EM_TEST_GITHUB_TAGS_JSON", read_fixture_text("github/tags.json"))
      .args(["--no-cache", "releases"]),
  );
  assert!(err.contains("GITHUB_METRIC_OWNER_OR_ORGANIZATION"), "{err}");
  assert!(err.contains("GITHUB_METRIC_REPO"), "{err}");
}

#[test]
fn malformed_repo_flag_is_rejected() {
  let dir = test_support::tempdir();
  let err = failure_stderr(
    eng_metrics(dir.path())
      .env("EM_TEST_GITHUB_TAGS_JSON", "[]")
      .args(["--no-cache", "releases", "--repo", "not-a-repo"]),
  );
  assert!(err.contains("invalid repository"), "{err}");
}

#[test]
fn bug_stats_rejects_future_years() {
  let dir = test_support::tempdir();
  let err = failure_stderr(
    eng_metrics(dir.path())
      .env("JIRA_PROJECTS", "ABC")
      .env("EM_TEST_JIRA_ISSUES_JSON", "[]")
      .args(["--no-cache", "bug-stats", "--end-year", "2030"]),
  );
  assert!(err.contains("--end-year must be between"), "{err}");
}
