use jsonschema::validator_for;
use serde_json::Value;
use test_support::{read_fixture_text, read_json, schemas_dir};

use crate::helpers::{eng_metrics, json_report, with_jira};

fn compile_schema(name: &str) -> jsonschema::Validator {
  let schema: Value = read_json(schemas_dir().join(name));
  validator_for(&schema).expect("compile schema")
}

fn assert_conforms(doc: &Value) {
  let compiled = compile_schema("eng-metrics.report.schema.json");
  if let Err(err) = compiled.validate(doc) {
    panic!("{} does not match the report schema: {err}", doc["report"]);
  }
}

#[test]
fn jira_reports_conform_to_schema() {
  for report in ["cycle-time", "engineering-excellence"] {
    let dir = test_support::tempdir();
    let mut cmd = eng_metrics(dir.path());
    with_jira(&mut cmd, "jira/released_issues.json").args(["--no-cache", "--year", "2024", report]);
    assert_conforms(&json_report(&mut cmd));
  }

  let dir = test_support::tempdir();
  let mut cmd = eng_metrics(dir.path());
  with_jira(&mut cmd, "jira/release_tickets.json").args(["--no-cache", "--year", "2024", "release-failure"]);
  assert_conforms(&json_report(&mut cmd));

  let dir = test_support::tempdir();
  let mut cmd = eng_metrics(dir.path());
  with_jira(&mut cmd, "jira/priority_bugs.json").args(["--no-cache", "--year", "2024", "bug-priority"]);
  assert_conforms(&json_report(&mut cmd));

  let dir = test_support::tempdir();
  let mut cmd = eng_metrics(dir.path());
  with_jira(&mut cmd, "jira/epics.json").args(["--no-cache", "epic-tracking", "--epic", "CORE-100,CORE-200", "--periods", "2"]);
  assert_conforms(&json_report(&mut cmd));
}

#[test]
fn github_reports_conform_to_schema() {
  let cases: [(&str, &str, &str, &[&str]); 5] = [
    ("EM_TEST_GITHUB_TAGS_JSON", "github/tags.json", "releases", &["--repo", "acme/api"]),
    ("EM_TEST_GITHUB_GRAPHQL_JSON", "github/history_pages.json", "lines-changed", &["--repo", "acme/api"]),
    ("EM_TEST_GITHUB_GRAPHQL_JSON", "github/merged_pulls_page.json", "pr-performance", &["--repo", "acme/api"]),
    ("EM_TEST_GITHUB_GRAPHQL_JSON", "github/org_repositories.json", "active-repos", &["--org", "acme"]),
    ("EM_TEST_GITHUB_GRAPHQL_JSON", "github/developer_pulls_page.json", "developer-activity", &["--repo", "acme/api"]),
  ];

  for (var, fixture, report, extra) in cases {
    let dir = test_support::tempdir();
    let doc = json_report(
      eng_metrics(dir.path())
        .env(var, read_fixture_text(fixture))
        .args(["--no-cache", "--year", "2024", report])
        .args(extra),
    );
    assert_conforms(&doc);
  }
}

#[test]
fn schema_rejects_documents_without_rows() {
  let compiled = compile_schema("eng-metrics.report.schema.json");
  let broken = serde_json::json!({
    "report": "releases",
    "generated_at": "2024-06-01T00:00:00Z",
    "count": 0,
    "summary": {}
  });
  assert!(compiled.validate(&broken).is_err());
}
