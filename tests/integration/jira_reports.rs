use serde_json::json;
use test_support::read_fixture_text;

use crate::helpers::{approx, eng_metrics, failure_stderr, json_report, row, with_jira};

const RELEASED: &str = "jira/released_issues.json";

#[test]
fn cycle_time_groups_by_team_and_month() {
  let dir = test_support::tempdir();
  let mut cmd = eng_metrics(dir.path());
  with_jira(&mut cmd, RELEASED).args(["--no-cache", "--year", "2024", "cycle-time"]);
  let doc = json_report(&mut cmd);

  assert_eq!(doc["report"], "cycle-time");
  assert_eq!(doc["range"]["label"], "2024");
  assert_eq!(doc["range"]["timezone"], "UTC");

  let teams: Vec<&str> = doc["rows"].as_array().unwrap().iter().map(|r| r["team"].as_str().unwrap()).collect();
  assert_eq!(teams, vec!["Mobile", "Platform", "All", "All"]);

  let platform = row(&doc, |r| r["team"] == "Platform" && r["month"] == "2024-03");
  assert_eq!(platform["tickets"], 2);
  assert_eq!(platform["median_days"], 2.5);

  let mobile = row(&doc, |r| r["team"] == "Mobile");
  assert_eq!(mobile["month"], "2024-04");
  assert_eq!(mobile["median_days"], 0.5);

  assert_eq!(doc["summary"]["tickets_measured"], 3);
  assert_eq!(doc["summary"]["tickets_skipped"], json!({ "missing review start": 1 }));
  assert_eq!(doc["summary"]["median_days"], 2.0);
}

#[test]
fn cycle_time_window_excludes_other_months() {
  let dir = test_support::tempdir();
  let mut cmd = eng_metrics(dir.path());
  with_jira(&mut cmd, RELEASED).args(["--no-cache", "--month", "2024-04", "cycle-time"]);
  let doc = json_report(&mut cmd);

  assert_eq!(doc["summary"]["tickets_measured"], 1);
  assert_eq!(doc["summary"]["tickets_skipped"]["released outside date range"], 2);
  assert!(doc["rows"].as_array().unwrap().iter().all(|r| r["month"] == "2024-04"));
}

#[test]
fn cycle_time_month_follows_report_zone_at_the_boundary() {
  let dir = test_support::tempdir();
  let mut cmd = eng_metrics(dir.path());
  with_jira(&mut cmd, "jira/boundary_issues.json").args([
    "--no-cache",
    "--tz",
    "America/Los_Angeles",
    "--month",
    "2024-03",
    "cycle-time",
  ]);
  let doc = json_report(&mut cmd);

  // CORE-9 lands on March 31 evening local time, CORE-10 on April 1 local time
  assert_eq!(doc["summary"]["tickets_measured"], 1);
  assert_eq!(doc["summary"]["tickets_skipped"]["released outside date range"], 1);
  let platform = row(&doc, |r| r["team"] == "Platform");
  assert_eq!(platform["month"], "2024-03");
  assert_eq!(platform["median_days"], 1.0);
}

#[test]
fn engineering_excellence_tracks_cumulative_share() {
  let dir = test_support::tempdir();
  let mut cmd = eng_metrics(dir.path());
  with_jira(&mut cmd, RELEASED).args(["--no-cache", "--year", "2024", "engineering-excellence"]);
  let doc = json_report(&mut cmd);

  let march = row(&doc, |r| r["team"] == "Platform" && r["month"] == "2024-03");
  assert_eq!(march["total"], 2);
  assert_eq!(march["excellence"], 1);
  assert_eq!(march["excellence_pct"], 50.0);

  let april = row(&doc, |r| r["team"] == "Platform" && r["month"] == "2024-04");
  assert_eq!(april["excellence"], 0);
  assert!(approx(&april["cumulative_excellence_pct"], 33.33));

  let mobile = row(&doc, |r| r["team"] == "Mobile");
  assert_eq!(mobile["excellence_pct"], 100.0);

  assert_eq!(doc["summary"]["tickets"], 4);
  assert_eq!(doc["summary"]["excellence_pct"], 50.0);
}

#[test]
fn individual_ranks_contributors_against_team_average() {
  let dir = test_support::tempdir();
  let mut cmd = eng_metrics(dir.path());
  with_jira(&mut cmd, RELEASED).args(["--no-cache", "--year", "2024", "individual", "--team", "platform"]);
  let doc = json_report(&mut cmd);

  assert_eq!(doc["count"], 3);
  let ben = row(&doc, |r| r["assignee"] == "Ben");
  assert_eq!(ben["month"], "2024-03");
  assert_eq!(ben["points"], 5.0);
  assert_eq!(ben["points_ratio"], 1.25);
  assert_eq!(ben["team_average_points"], 4.0);

  assert!(doc["rows"].as_array().unwrap().iter().all(|r| r["assignee"] != "Cy"));
  assert_eq!(doc["summary"]["team"], "platform");
  assert_eq!(doc["summary"]["top_by_points"][0]["assignee"], "Ben");
}

#[test]
fn release_failure_counts_rollbacks_and_linked_tickets() {
  let dir = test_support::tempdir();
  let mut cmd = eng_metrics(dir.path());
  with_jira(&mut cmd, "jira/release_tickets.json").args(["--no-cache", "--year", "2024", "release-failure"]);
  let doc = json_report(&mut cmd);

  let feb = row(&doc, |r| r["month"] == "2024-02");
  assert_eq!(feb["releases"], 2);
  assert_eq!(feb["failed"], 1);
  assert_eq!(feb["failure_pct"], 50.0);
  assert_eq!(feb["linked_tickets"], 4);
  assert_eq!(feb["failed_linked_tickets"], 2);

  let mar = row(&doc, |r| r["month"] == "2024-03");
  assert_eq!(mar["failed"], 0);

  assert_eq!(doc["summary"]["releases"], 3);
  assert_eq!(doc["summary"]["failed"], 1);
  assert!(approx(&doc["summary"]["failure_pct"], 33.33));
}

#[test]
fn release_failure_exceptions_clear_failures() {
  let dir = test_support::tempdir();
  let mut cmd = eng_metrics(dir.path());
  with_jira(&mut cmd, "jira/release_tickets.json").args([
    "--no-cache",
    "--year",
    "2024",
    "release-failure",
    "--exception",
    "rel-1",
  ]);
  let doc = json_report(&mut cmd);

  assert_eq!(doc["summary"]["failed"], 0);
  assert_eq!(doc["summary"]["exceptions_applied"], json!(["REL-1"]));
}

#[test]
fn bug_stats_counts_each_metric_per_project() {
  let dir = test_support::tempdir();
  let doc = json_report(
    eng_metrics(dir.path())
      .env("JIRA_PROJECTS", "ABC,DEF,GHI")
      .env("EM_TEST_JIRA_ISSUES_JSON", read_fixture_text("jira/bug_queries.json"))
      .args(["--no-cache", "bug-stats", "--start-year", "2024"]),
  );

  assert!(doc.get("range").is_none());
  let projects: Vec<&str> = doc["rows"].as_array().unwrap().iter().map(|r| r["project"].as_str().unwrap()).collect();
  assert_eq!(projects, vec!["ABC", "DEF", "GHI", "All"]);

  let abc = row(&doc, |r| r["project"] == "ABC");
  assert_eq!(abc["created"], 2);
  assert_eq!(abc["closed"], 1);
  assert_eq!(abc["open_end_of_year"], 1);
  assert_eq!(abc["net_change"], 1);

  let def = row(&doc, |r| r["project"] == "DEF");
  assert_eq!(def["wont_do"], 1);
  assert_eq!(def["net_change"], 0);

  let ghi = row(&doc, |r| r["project"] == "GHI");
  assert_eq!(ghi["created"], 0);

  assert_eq!(doc["summary"]["created"], 3);
  assert_eq!(doc["summary"]["closed"], 1);
  assert_eq!(doc["summary"]["wont_do"], 1);
}

#[test]
fn epic_tracking_credits_completed_children_per_quarter() {
  let dir = test_support::tempdir();
  let mut cmd = eng_metrics(dir.path());
  with_jira(&mut cmd, "jira/epics.json").args([
    "--no-cache",
    "epic-tracking",
    "--epic",
    "CORE-100,CORE-200",
    "--quarter",
    "2024-Q2",
    "--periods",
    "2",
  ]);
  let doc = json_report(&mut cmd);

  assert!(doc.get("range").is_none());
  assert_eq!(doc["count"], 4);
  assert_eq!(doc["summary"]["epics"], 2);
  assert_eq!(doc["summary"]["periods"], json!(["2024-Q1", "2024-Q2"]));

  let epics: Vec<&str> = doc["rows"].as_array().unwrap().iter().map(|r| r["epic"].as_str().unwrap()).collect();
  assert_eq!(epics, vec!["CORE-200", "CORE-200", "CORE-100", "CORE-100"]);

  let q1 = row(&doc, |r| r["epic"] == "CORE-100" && r["period"] == "2024-Q1");
  assert_eq!(q1["team"], "Platform");
  assert_eq!(q1["period_tickets_completed"], 1);
  assert_eq!(q1["period_points_completed"], 3.0);
  assert_eq!(q1["tickets_total"], 3);
  assert_eq!(q1["tickets_done"], 2);
  assert!(approx(&q1["tickets_pct_done"], 66.67));
  assert_eq!(q1["points_pct_done"], 80.0);

  let q2 = row(&doc, |r| r["epic"] == "CORE-100" && r["period"] == "2024-Q2");
  assert_eq!(q2["period_points_completed"], 5.0);

  // closed before the first period: counts toward totals only
  let mobile = row(&doc, |r| r["epic"] == "CORE-200" && r["period"] == "2024-Q2");
  assert_eq!(mobile["tickets_pct_done"], 100.0);
  assert_eq!(mobile["period_tickets_completed"], 0);
}

#[test]
fn epic_tracking_rejects_quarter_with_another_window() {
  let dir = test_support::tempdir();
  let mut cmd = eng_metrics(dir.path());
  with_jira(&mut cmd, "jira/epics.json").args(["--no-cache", "--year", "2024", "epic-tracking", "--epic", "CORE-100", "--quarter", "2024-Q1"]);
  let stderr = failure_stderr(&mut cmd);
  assert!(stderr.contains("--quarter"), "stderr: {stderr}");
}

#[test]
fn bug_priority_measures_days_to_completion() {
  let dir = test_support::tempdir();
  let mut cmd = eng_metrics(dir.path());
  with_jira(&mut cmd, "jira/priority_bugs.json").args(["--no-cache", "--year", "2024", "bug-priority"]);
  let doc = json_report(&mut cmd);

  let priorities: Vec<&str> = doc["rows"].as_array().unwrap().iter().map(|r| r["priority"].as_str().unwrap()).collect();
  assert_eq!(priorities, vec!["High", "Low"]);

  let high = row(&doc, |r| r["priority"] == "High");
  assert_eq!(high["bugs"], 2);
  assert!(approx(&high["share_pct"], 66.67));
  assert_eq!(high["average_days"], 3.0);
  assert_eq!(high["min_days"], 2.0);
  assert_eq!(high["max_days"], 4.0);

  let low = row(&doc, |r| r["priority"] == "Low");
  assert_eq!(low["median_days"], 0.5);

  assert_eq!(doc["summary"]["bugs"], 3);
  assert_eq!(doc["summary"]["bugs_skipped"], json!({ "created outside date range": 1 }));
  assert!(approx(&doc["summary"]["average_days"], 2.17));
}
