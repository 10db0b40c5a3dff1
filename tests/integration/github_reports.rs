use serde_json::json;
use test_support::read_fixture_text;

use crate::helpers::{eng_metrics, json_report, row};

#[test]
fn releases_counts_prefixed_tags_per_month() {
  let dir = test_support::tempdir();
  let doc = json_report(
    eng_metrics(dir.path())
      .env("EM_TEST_GITHUB_TAGS_JSON", read_fixture_text("github/tags.json"))
      .args(["--no-cache", "--year", "2024", "releases", "--repo", "acme/api"]),
  );

  assert_eq!(doc["count"], 2);
  let march = row(&doc, |r| r["month"] == "2024-03");
  assert_eq!(march["count"], 2);
  assert_eq!(march["names"], json!(["release-2024-03-02", "release-2024-03-20"]));
  assert_eq!(doc["summary"]["repository"], "acme/api");
  assert_eq!(doc["summary"]["total"], 3);
}

#[test]
fn releases_honours_custom_prefix_and_env_repository() {
  let dir = test_support::tempdir();
  let doc = json_report(
    eng_metrics(dir.path())
      .env("GITHUB_METRIC_OWNER_OR_ORGANIZATION", "acme")
      .env("GITHUB_METRIC_REPO", "web")
      .env("EM_TEST_GITHUB_TAGS_JSON", r#"[{"name":"web-2024-02-01"},{"name":"release-2024-02-02"}]"#)
      .args(["--no-cache", "--year", "2024", "releases", "--tag-prefix", "web-"]),
  );

  assert_eq!(doc["summary"]["repository"], "acme/web");
  assert_eq!(doc["summary"]["total"], 1);
  assert_eq!(doc["rows"][0]["names"], json!(["web-2024-02-01"]));
}

#[test]
fn code_review_measures_merged_pulls() {
  let dir = test_support::tempdir();
  let doc = json_report(
    eng_metrics(dir.path())
      .env("EM_TEST_GITHUB_PULLS_JSON", read_fixture_text("github/pulls.json"))
      .env("EM_TEST_GITHUB_REVIEWS_JSON", read_fixture_text("github/reviews.json"))
      .env("EM_TEST_GITHUB_TIMELINE_JSON", read_fixture_text("github/timeline.json"))
      .args(["--no-cache", "--month", "2024-03", "code-review", "--repo", "acme/api"]),
  );

  assert_eq!(doc["count"], 2);

  let merged = row(&doc, |r| r["number"] == 42);
  assert_eq!(merged["created_at"], "2024-03-01 10:00:00");
  assert_eq!(merged["first_review_at"], "2024-03-01 14:00:00");
  assert_eq!(merged["hours_to_merge"], 24.0);
  assert_eq!(merged["hours_to_first_review"], 4.0);
  assert_eq!(merged["hours_to_first_approval"], 6.0);
  assert_eq!(merged["hours_approval_to_merge"], 18.0);
  assert_eq!(merged["hours_request_to_first_review"], 2.0);

  let closed = row(&doc, |r| r["number"] == 43);
  assert!(closed["merged_at"].is_null());
  assert!(closed["hours_to_merge"].is_null());

  assert_eq!(doc["summary"]["prs"], 2);
  assert_eq!(doc["summary"]["merged"], 1);
  assert_eq!(doc["summary"]["median_hours_to_merge"], 24.0);
}

#[test]
fn code_review_limit_caps_selection() {
  let dir = test_support::tempdir();
  let doc = json_report(
    eng_metrics(dir.path())
      .env("EM_TEST_GITHUB_PULLS_JSON", read_fixture_text("github/pulls.json"))
      .args(["--no-cache", "--month", "2024-03", "code-review", "--repo", "acme/api", "--limit", "1"]),
  );

  assert_eq!(doc["count"], 1);
  assert_eq!(doc["rows"][0]["number"], 42);
}

#[test]
fn code_review_reports_in_requested_zone() {
  let dir = test_support::tempdir();
  let doc = json_report(
    eng_metrics(dir.path())
      .env("EM_TEST_GITHUB_PULLS_JSON", read_fixture_text("github/pulls.json"))
      .args([
        "--no-cache",
        "--tz",
        "America/New_York",
        "--month",
        "2024-03",
        "code-review",
        "--repo",
        "acme/api",
      ]),
  );

  assert_eq!(doc["range"]["timezone"], "America/New_York");
  let merged = row(&doc, |r| r["number"] == 42);
  assert_eq!(merged["created_at"], "2024-03-01 05:00:00");
}

#[test]
fn lines_changed_follows_history_pages() {
  let dir = test_support::tempdir();
  let doc = json_report(
    eng_metrics(dir.path())
      .env("EM_TEST_GITHUB_GRAPHQL_JSON", read_fixture_text("github/history_pages.json"))
      .args(["--no-cache", "--year", "2024", "lines-changed", "--repo", "acme/api"]),
  );

  let months: Vec<&str> = doc["rows"].as_array().unwrap().iter().map(|r| r["month"].as_str().unwrap()).collect();
  assert_eq!(months, vec!["2024-01", "2024-03"]);

  let march = row(&doc, |r| r["month"] == "2024-03");
  assert_eq!(march["commits"], 2);
  assert_eq!(march["additions"], 130);
  assert_eq!(march["deletions"], 60);
  assert_eq!(march["net"], 70);

  assert_eq!(doc["summary"]["commits"], 3);
  assert_eq!(doc["summary"]["net"], 74);
}

#[test]
fn pr_performance_counts_only_approved_merges_in_window() {
  let dir = test_support::tempdir();
  let doc = json_report(
    eng_metrics(dir.path())
      .env("EM_TEST_GITHUB_GRAPHQL_JSON", read_fixture_text("github/merged_pulls_page.json"))
      .args(["--no-cache", "--year", "2024", "pr-performance", "--repo", "acme/api"]),
  );

  assert_eq!(doc["summary"]["merged_prs"], 2);
  assert_eq!(doc["summary"]["approved_prs"], 1);
  assert_eq!(doc["count"], 1);

  let march = &doc["rows"][0];
  assert_eq!(march["month"], "2024-03");
  assert_eq!(march["prs"], 1);
  assert_eq!(march["median_merge_hours"], 4.0);
  assert_eq!(march["median_check_minutes"], 30.0);
  assert_eq!(march["avg_files_changed"], 6.0);
  assert_eq!(march["avg_first_review_hours"], 2.0);
  assert_eq!(march["check_success_pct"], 100.0);

  assert_eq!(doc["summary"]["years"]["2024"]["prs"], 1);
}

#[test]
fn active_repos_lists_recent_pull_request_activity() {
  let dir = test_support::tempdir();
  let doc = json_report(
    eng_metrics(dir.path())
      .env("EM_TEST_GITHUB_GRAPHQL_JSON", read_fixture_text("github/org_repositories.json"))
      .args(["--no-cache", "active-repos", "--org", "acme", "--days", "30"]),
  );

  assert!(doc.get("range").is_none());
  let names: Vec<&str> = doc["rows"].as_array().unwrap().iter().map(|r| r["name"].as_str().unwrap()).collect();
  assert_eq!(names, vec!["web", "api"]);

  let api = row(&doc, |r| r["name"] == "api");
  assert_eq!(api["recent_prs"], 2);
  assert_eq!(api["total_prs"], 120);
  assert_eq!(api["last_pr_date"], "2024-05-20");

  assert_eq!(doc["summary"]["organization"], "acme");
  assert_eq!(doc["summary"]["since"], "2024-05-02T00:00:00Z");
  assert_eq!(doc["summary"]["scanned"], 4);
}

#[test]
fn active_repos_filter_restricts_names() {
  let dir = test_support::tempdir();
  let doc = json_report(
    eng_metrics(dir.path())
      .env("GITHUB_METRIC_OWNER_OR_ORGANIZATION", "acme")
      .env("GITHUB_METRIC_REPOS", "api,legacy")
      .env("EM_TEST_GITHUB_GRAPHQL_JSON", read_fixture_text("github/org_repositories.json"))
      .args(["--no-cache", "active-repos"]),
  );

  assert_eq!(doc["count"], 1);
  assert_eq!(doc["rows"][0]["name"], "api");
  assert_eq!(doc["summary"]["days"], 60);
}

#[test]
fn developer_activity_splits_authoring_and_reviewing() {
  let dir = test_support::tempdir();
  let doc = json_report(
    eng_metrics(dir.path())
      .env("EM_TEST_GITHUB_GRAPHQL_JSON", read_fixture_text("github/developer_pulls_page.json"))
      .args(["--no-cache", "--month", "2024-03", "developer-activity", "--repo", "acme/api"]),
  );

  assert_eq!(doc["summary"]["repository"], "acme/api");
  assert_eq!(doc["summary"]["merged_prs"], 2);
  assert_eq!(doc["summary"]["developers"], 3);

  let ada = row(&doc, |r| r["developer"] == "ada");
  assert_eq!(ada["month"], "2024-03");
  assert_eq!(ada["prs"], 2);
  assert_eq!(ada["median_merge_hours"], 6.0);
  assert_eq!(ada["median_additions"], 65.0);
  assert_eq!(ada["median_files_changed"], 2.5);
  assert_eq!(ada["reviews"], 0);

  let bo = row(&doc, |r| r["developer"] == "bo");
  assert_eq!(bo["prs"], 0);
  assert!(bo["median_merge_hours"].is_null());
  assert_eq!(bo["reviews"], 2);
  assert_eq!(bo["approvals"], 1);
  assert_eq!(bo["review_comments"], 1);
  assert_eq!(bo["avg_review_response_hours"], 3.0);
}

#[test]
fn developer_activity_user_filter() {
  let dir = test_support::tempdir();
  let doc = json_report(
    eng_metrics(dir.path())
      .env("EM_TEST_GITHUB_GRAPHQL_JSON", read_fixture_text("github/developer_pulls_page.json"))
      .args(["--no-cache", "--year", "2024", "developer-activity", "--repo", "acme/api", "--users", "ADA"]),
  );

  assert_eq!(doc["summary"]["merged_prs"], 4);
  assert_eq!(doc["summary"]["developers"], 1);
  let months: Vec<&str> = doc["rows"].as_array().unwrap().iter().map(|r| r["month"].as_str().unwrap()).collect();
  assert_eq!(months, vec!["2024-03", "2024-04"]);

  let april = row(&doc, |r| r["month"] == "2024-04");
  assert_eq!(april["prs"], 0);
  assert_eq!(april["reviews"], 1);
  assert_eq!(april["avg_review_response_hours"], 6.0);
}
