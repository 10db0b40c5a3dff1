use std::path::Path;

use assert_cmd::Command;
use serde_json::Value;
use test_support::{cmd_bin, read_fixture_text};

pub const NOW: &str = "2024-06-01T00:00:00Z";

/// Variables that would leak a developer's real setup into a test run.
const SCRUBBED: &[&str] = &[
  "JIRA_LINK",
  "USER_EMAIL",
  "JIRA_API_KEY",
  "JIRA_PROJECTS",
  "JIRA_TEAM_FIELD",
  "JIRA_WORK_TYPE_FIELD",
  "JIRA_POINTS_FIELD",
  "JIRA_BUG_PRIORITY_FIELD",
  "GITHUB_TOKEN",
  "GH_TOKEN",
  "GITHUB_API_URL",
  "GITHUB_METRIC_OWNER_OR_ORGANIZATION",
  "GITHUB_METRIC_REPO",
  "GITHUB_METRIC_REPOS",
  "EM_TEST_JIRA_ISSUES_JSON",
  "EM_TEST_GITHUB_TAGS_JSON",
  "EM_TEST_GITHUB_PULLS_JSON",
  "EM_TEST_GITHUB_REVIEWS_JSON",
  "EM_TEST_GITHUB_TIMELINE_JSON",
  "EM_TEST_GITHUB_GRAPHQL_JSON",
];

/// The binary with a scrubbed environment, a pinned clock and `cwd` as working directory
/// (keeps a developer `.env` out of the run). Caching is left to the caller.
pub fn eng_metrics(cwd: &Path) -> Command {
  let mut cmd = cmd_bin("eng-metrics");
  for var in SCRUBBED {
    cmd.env_remove(var);
  }
  cmd.env("RUST_LOG", "warn");
  cmd.current_dir(cwd).args(["--now-override", NOW]);
  cmd
}

/// Jira fixture setup: field ids matching tests/fixtures/jira and the given issues.
pub fn with_jira<'a>(cmd: &'a mut Command, issues_fixture: &str) -> &'a mut Command {
  cmd
    .env("JIRA_PROJECTS", "CORE")
    .env("JIRA_TEAM_FIELD", "customfield_100")
    .env("JIRA_WORK_TYPE_FIELD", "customfield_200")
    .env("JIRA_POINTS_FIELD", "300")
    .env("EM_TEST_JIRA_ISSUES_JSON", read_fixture_text(issues_fixture))
}

/// Run to success and parse stdout as a JSON report document.
pub fn json_report(cmd: &mut Command) -> Value {
  let out = cmd.args(["--format", "json"]).output().expect("run eng-metrics");
  assert!(
    out.status.success(),
    "eng-metrics failed: {}",
    String::from_utf8_lossy(&out.stderr)
  );
  serde_json::from_slice(&out.stdout).expect("stdout is JSON")
}

/// Run to failure and return stderr.
pub fn failure_stderr(cmd: &mut Command) -> String {
  let out = cmd.output().expect("run eng-metrics");
  assert!(!out.status.success(), "expected failure, stdout: {}", String::from_utf8_lossy(&out.stdout));
  String::from_utf8_lossy(&out.stderr).into_owned()
}

pub fn row<'a>(doc: &'a Value, pred: impl Fn(&Value) -> bool) -> &'a Value {
  doc["rows"]
    .as_array()
    .and_then(|rows| rows.iter().find(|r| pred(r)))
    .unwrap_or_else(|| panic!("no matching row in {}", doc["rows"]))
}

/// Numeric JSON value within 0.01 of `expected`.
pub fn approx(v: &Value, expected: f64) -> bool {
  v.as_f64().is_some_and(|x| (x - expected).abs() < 0.01)
}
