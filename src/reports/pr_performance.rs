//! Merged, approved pull requests: merge time, CI check time, reviews and check success per month.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::cache::acquire_rows;
use crate::ext::serde_json::JsonFetch;
use crate::integrations::github_api::graphql_paginate;
use crate::model::{ReportDoc, TableRow, cell2};
use crate::reports::RunContext;
use crate::stats::{mean, median, month_key, percent, round2, year_of_month};
use crate::util::parse_timestamp;
use crate::window::DateWindow;

pub const PULLS_PATH: &str = "repository.pullRequests";

pub const PULLS_QUERY: &str = r#"
query($owner: String!, $name: String!, $after: String) {
  repository(owner: $owner, name: $name) {
    pullRequests(first: 25, after: $after, orderBy: {field: UPDATED_AT, direction: DESC}, states: [MERGED]) {
      pageInfo { hasNextPage endCursor }
      nodes {
        number
        title
        createdAt
        mergedAt
        additions
        deletions
        changedFiles
        reviews(first: 10) { totalCount nodes { state createdAt author { login } } }
        comments { totalCount }
        commits(last: 1) {
          nodes {
            commit {
              checkSuites(first: 10) {
                nodes { checkRuns(first: 10) { nodes { name startedAt completedAt status conclusion } } }
              }
            }
          }
        }
      }
    }
  }
}
"#;

/// Metrics of one merged pull request.
#[derive(Debug, Clone, PartialEq)]
pub struct PrStats {
  pub number: i64,
  pub month: String,
  pub merge_seconds: i64,
  pub check_seconds: i64,
  pub successful_checks: usize,
  pub failed_checks: usize,
  pub reviews: usize,
  pub first_review_seconds: Option<i64>,
  pub files_changed: i64,
  pub comments: i64,
}

fn merged_at(pr: &Value) -> Option<DateTime<FixedOffset>> {
  pr.fetch("mergedAt").as_str().and_then(parse_timestamp)
}

/// Pagination predicate: stop once a page reaches a PR merged before `start`.
pub fn page_reaches_before(nodes: &[Value], start: DateTime<Utc>) -> bool {
  nodes.iter().filter_map(merged_at).any(|m| m < start)
}

pub fn is_approved(pr: &Value) -> bool {
  pr.fetch("reviews.nodes")
    .items()
    .iter()
    .any(|r| r.fetch("state").as_str() == Some("APPROVED"))
}

/// Check time and outcomes of the last commit's check runs.
fn check_totals(pr: &Value) -> (i64, usize, usize) {
  let mut seconds = 0;
  let mut successful = 0;
  let mut failed = 0;

  for suite in pr.fetch("commits.nodes.0.commit.checkSuites.nodes").items() {
    for run in suite.fetch("checkRuns.nodes").items() {
      let started = run.fetch("startedAt").as_str().and_then(parse_timestamp);
      let completed = run.fetch("completedAt").as_str().and_then(parse_timestamp);
      let (Some(started), Some(completed)) = (started, completed) else {
        continue;
      };

      seconds += (completed - started).num_seconds();
      match run.fetch("conclusion").as_str() {
        Some("SUCCESS") => successful += 1,
        Some("FAILURE") | Some("CANCELLED") => failed += 1,
        _ => {}
      }
    }
  }

  (seconds, successful, failed)
}

/// Stats for a PR merged inside the window; `None` otherwise.
pub fn measure(pr: &Value, window: &DateWindow, tz: &Tz) -> Option<PrStats> {
  let created = pr.fetch("createdAt").as_str().and_then(parse_timestamp)?;
  let merged = merged_at(pr)?;
  if !window.contains(&merged, tz) {
    return None;
  }

  let (check_seconds, successful_checks, failed_checks) = check_totals(pr);

  let mut review_times: Vec<DateTime<FixedOffset>> = pr
    .fetch("reviews.nodes")
    .items()
    .iter()
    .filter_map(|r| r.fetch("createdAt").as_str().and_then(parse_timestamp))
    .collect();
  review_times.sort();

  Some(PrStats {
    number: pr.fetch("number").to_or_default(),
    month: month_key(&merged, tz),
    merge_seconds: (merged - created).num_seconds(),
    check_seconds,
    successful_checks,
    failed_checks,
    reviews: pr.fetch("reviews.nodes").items().len(),
    first_review_seconds: review_times.first().map(|first| (*first - created).num_seconds()),
    files_changed: pr.fetch("changedFiles").to_or_default(),
    comments: pr.fetch("comments.totalCount").to_or_default(),
  })
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PrPerformanceRow {
  pub month: String,
  pub prs: usize,
  pub median_merge_hours: f64,
  pub median_check_minutes: f64,
  pub avg_files_changed: f64,
  pub avg_first_review_hours: f64,
  pub check_success_pct: f64,
}

impl TableRow for PrPerformanceRow {
  const HEADERS: &'static [&'static str] = &[
    "Month",
    "PRs",
    "Median Merge (hrs)",
    "Median Check (min)",
    "Avg Files Changed",
    "Avg First Review (hrs)",
    "Check Success %",
  ];

  fn cells(&self) -> Vec<String> {
    vec![
      self.month.clone(),
      self.prs.to_string(),
      cell2(self.median_merge_hours),
      cell2(self.median_check_minutes),
      format!("{:.1}", self.avg_files_changed),
      cell2(self.avg_first_review_hours),
      format!("{:.1}", self.check_success_pct),
    ]
  }
}

fn merge_hours(prs: &[&PrStats]) -> Vec<f64> {
  prs.iter().map(|p| p.merge_seconds as f64 / 3600.0).collect()
}

fn check_minutes(prs: &[&PrStats]) -> Vec<f64> {
  prs.iter().map(|p| p.check_seconds as f64 / 60.0).collect()
}

fn by_period<'a>(prs: &'a [PrStats], key: impl Fn(&PrStats) -> String) -> BTreeMap<String, Vec<&'a PrStats>> {
  let mut out: BTreeMap<String, Vec<&PrStats>> = BTreeMap::new();
  for p in prs {
    out.entry(key(p)).or_default().push(p);
  }
  out
}

pub fn monthly_rows(prs: &[PrStats]) -> Vec<PrPerformanceRow> {
  by_period(prs, |p| p.month.clone())
    .into_iter()
    .map(|(month, group)| {
      let files: Vec<f64> = group.iter().map(|p| p.files_changed as f64).collect();
      let first_reviews: Vec<f64> = group
        .iter()
        .filter_map(|p| p.first_review_seconds)
        .filter(|s| *s != 0)
        .map(|s| s as f64 / 3600.0)
        .collect();
      let successful: usize = group.iter().map(|p| p.successful_checks).sum();
      let finished: usize = group.iter().map(|p| p.successful_checks + p.failed_checks).sum();

      PrPerformanceRow {
        month,
        prs: group.len(),
        median_merge_hours: median(&merge_hours(&group)).unwrap_or(0.0),
        median_check_minutes: median(&check_minutes(&group)).unwrap_or(0.0),
        avg_files_changed: mean(&files).unwrap_or(0.0),
        avg_first_review_hours: mean(&first_reviews).unwrap_or(0.0),
        check_success_pct: percent(successful as f64, finished as f64),
      }
    })
    .collect()
}

/// Per-year statistics keyed by year.
pub fn yearly_summary(prs: &[PrStats]) -> Value {
  let mut out = Map::new();

  for (year, group) in by_period(prs, |p| year_of_month(&p.month).map(|y| y.to_string()).unwrap_or_default()) {
    let merge = merge_hours(&group);
    let check = check_minutes(&group);
    let median_merge = median(&merge).unwrap_or(0.0);
    let median_check = median(&check).unwrap_or(0.0);
    let avg_merge = mean(&merge).unwrap_or(0.0);
    let avg_check = mean(&check).unwrap_or(0.0);

    out.insert(
      year,
      json!({
        "prs": group.len(),
        "median_merge_hours": round2(median_merge),
        "median_check_minutes": round2(median_check),
        "avg_merge_hours": round2(avg_merge),
        "avg_check_minutes": round2(avg_check),
        "avg_check_merge_ratio_pct": round2(percent(avg_check, avg_merge * 60.0)),
        "median_check_merge_ratio_pct": round2(percent(median_check, median_merge * 60.0)),
      }),
    );
  }

  Value::Object(out)
}

pub fn run(ctx: &RunContext, repo: Option<&str>) -> Result<ReportDoc> {
  let settings = ctx.github_settings();
  let (owner, name) = settings.require_repo(repo)?;
  let start = ctx.window.start_in(&ctx.tz).with_timezone(&Utc);

  let pulls = acquire_rows(&ctx.rows, || {
    let api = ctx.github_api(&settings)?;
    info!(owner = %owner, repo = %name, since = %start, "fetching merged pull requests");
    let variables = json!({ "owner": owner, "name": name });
    graphql_paginate(api.as_ref(), PULLS_QUERY, variables, PULLS_PATH, |nodes| {
      !page_reaches_before(nodes, start)
    })
  })?;

  let merged: Vec<&Value> = pulls
    .iter()
    .filter(|pr| merged_at(pr).is_some_and(|m| ctx.window.contains(&m, &ctx.tz)))
    .collect();

  let mut stats = Vec::new();
  for pr in &merged {
    let number = pr.fetch("number").to_or_default::<i64>();
    if !is_approved(pr) {
      debug!(number, "skipping unapproved pull request");
      continue;
    }
    if let Some(s) = measure(pr, &ctx.window, &ctx.tz) {
      stats.push(s);
    }
  }
  info!(merged = merged.len(), approved = stats.len(), "pr performance computed");

  Ok(
    ctx
      .doc("pr-performance", &monthly_rows(&stats))?
      .with_summary("repository", format!("{owner}/{name}"))
      .with_summary("merged_prs", merged.len())
      .with_summary("approved_prs", stats.len())
      .with_summary("years", yearly_summary(&stats)),
  )
}
