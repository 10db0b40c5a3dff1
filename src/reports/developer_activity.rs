//! Per-developer activity on merged pull requests: what each person authored and how they reviewed, by month.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use chrono::Utc;
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::cache::acquire_rows;
use crate::ext::serde_json::JsonFetch;
use crate::integrations::github_api::graphql_paginate;
use crate::model::{ReportDoc, TableRow, cell_opt};
use crate::reports::RunContext;
use crate::reports::pr_performance::{PULLS_PATH, page_reaches_before};
use crate::stats::{mean, median, month_key, round2};
use crate::util::parse_timestamp;
use crate::window::DateWindow;

pub const ACTIVITY_QUERY: &str = r#"
query($owner: String!, $name: String!, $after: String) {
  repository(owner: $owner, name: $name) {
    pullRequests(first: 25, after: $after, orderBy: {field: UPDATED_AT, direction: DESC}, states: [MERGED]) {
      pageInfo { hasNextPage endCursor }
      nodes {
        number
        createdAt
        mergedAt
        additions
        deletions
        changedFiles
        author { login }
        reviews(first: 50) { nodes { state body submittedAt author { login } } }
      }
    }
  }
}
"#;

/// Activity of one person in one month.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Activity {
  pub merge_hours: Vec<f64>,
  pub additions: Vec<f64>,
  pub deletions: Vec<f64>,
  pub files_changed: Vec<f64>,
  pub reviews: usize,
  pub approvals: usize,
  pub review_comments: usize,
  pub response_hours: Vec<f64>,
}

/// `(month, login)` → activity.
pub type ActivityMap = BTreeMap<(String, String), Activity>;

/// Lower-cased logins to keep; empty keeps everyone.
#[derive(Debug, Clone, Default)]
pub struct UserFilter(BTreeSet<String>);

impl UserFilter {
  pub fn new(users: &[String]) -> Self {
    Self(users.iter().map(|u| u.trim().to_lowercase()).filter(|u| !u.is_empty()).collect())
  }

  pub fn keeps(&self, login: &str) -> bool {
    self.0.is_empty() || self.0.contains(&login.to_lowercase())
  }
}

fn hours(seconds: i64) -> f64 {
  seconds as f64 / 3600.0
}

/// Fold one pull request into `out`. Returns false when it was not merged inside the window.
pub fn record(pr: &Value, window: &DateWindow, tz: &Tz, users: &UserFilter, out: &mut ActivityMap) -> bool {
  let created = pr.fetch("createdAt").as_str().and_then(parse_timestamp);
  let merged = pr.fetch("mergedAt").as_str().and_then(parse_timestamp);
  let (Some(created), Some(merged)) = (created, merged) else {
    return false;
  };
  if !window.contains(&merged, tz) {
    return false;
  }
  let month = month_key(&merged, tz);

  if let Some(author) = pr.fetch("author.login").as_str().filter(|a| users.keeps(a)) {
    let a = out.entry((month.clone(), author.to_string())).or_default();
    a.merge_hours.push(hours((merged - created).num_seconds()));
    a.additions.push(pr.fetch("additions").to_or_default::<f64>());
    a.deletions.push(pr.fetch("deletions").to_or_default::<f64>());
    a.files_changed.push(pr.fetch("changedFiles").to_or_default::<f64>());
  }

  for review in pr.fetch("reviews.nodes").items() {
    let Some(reviewer) = review.fetch("author.login").as_str().filter(|r| users.keeps(r)) else {
      continue;
    };
    let a = out.entry((month.clone(), reviewer.to_string())).or_default();
    a.reviews += 1;
    match review.fetch("state").as_str() {
      Some("APPROVED") => a.approvals += 1,
      Some("COMMENTED") | Some("CHANGES_REQUESTED") => a.review_comments += 1,
      _ => {}
    }
    if let Some(submitted) = review.fetch("submittedAt").as_str().and_then(parse_timestamp) {
      a.response_hours.push(hours((submitted - created).num_seconds()));
    }
  }

  true
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeveloperActivityRow {
  pub month: String,
  pub developer: String,
  pub prs: usize,
  pub median_merge_hours: Option<f64>,
  pub avg_merge_hours: Option<f64>,
  pub median_additions: Option<f64>,
  pub median_deletions: Option<f64>,
  pub median_files_changed: Option<f64>,
  pub reviews: usize,
  pub approvals: usize,
  pub review_comments: usize,
  pub avg_review_response_hours: Option<f64>,
}

impl TableRow for DeveloperActivityRow {
  const HEADERS: &'static [&'static str] = &[
    "Month",
    "Developer",
    "PRs",
    "Median Merge (hrs)",
    "Avg Merge (hrs)",
    "Median Lines Added",
    "Median Lines Removed",
    "Median Files Changed",
    "Reviews",
    "Approvals",
    "Review Comments",
    "Avg Review Response (hrs)",
  ];

  fn cells(&self) -> Vec<String> {
    vec![
      self.month.clone(),
      self.developer.clone(),
      self.prs.to_string(),
      cell_opt(self.median_merge_hours),
      cell_opt(self.avg_merge_hours),
      cell_opt(self.median_additions),
      cell_opt(self.median_deletions),
      cell_opt(self.median_files_changed),
      self.reviews.to_string(),
      self.approvals.to_string(),
      self.review_comments.to_string(),
      cell_opt(self.avg_review_response_hours),
    ]
  }
}

/// Rows ordered by month, then login.
pub fn rows(activity: &ActivityMap) -> Vec<DeveloperActivityRow> {
  activity
    .iter()
    .map(|((month, developer), a)| DeveloperActivityRow {
      month: month.clone(),
      developer: developer.clone(),
      prs: a.merge_hours.len(),
      median_merge_hours: median(&a.merge_hours).map(round2),
      avg_merge_hours: mean(&a.merge_hours).map(round2),
      median_additions: median(&a.additions),
      median_deletions: median(&a.deletions),
      median_files_changed: median(&a.files_changed),
      reviews: a.reviews,
      approvals: a.approvals,
      review_comments: a.review_comments,
      avg_review_response_hours: mean(&a.response_hours).map(round2),
    })
    .collect()
}

pub fn run(ctx: &RunContext, repo: Option<&str>, users: &[String]) -> Result<ReportDoc> {
  let settings = ctx.github_settings();
  let (owner, name) = settings.require_repo(repo)?;
  let start = ctx.window.start_in(&ctx.tz).with_timezone(&Utc);
  let filter = UserFilter::new(users);

  let pulls = acquire_rows(&ctx.rows, || {
    let api = ctx.github_api(&settings)?;
    info!(owner = %owner, repo = %name, since = %start, "fetching merged pull requests with reviews");
    let variables = json!({ "owner": owner, "name": name });
    graphql_paginate(api.as_ref(), ACTIVITY_QUERY, variables, PULLS_PATH, |nodes| {
      !page_reaches_before(nodes, start)
    })
  })?;

  let mut activity = ActivityMap::new();
  let mut merged = 0;
  for pr in &pulls {
    if record(pr, &ctx.window, &ctx.tz, &filter, &mut activity) {
      merged += 1;
    } else {
      debug!(number = pr.fetch("number").to_or_default::<i64>(), "pull request not merged in window");
    }
  }

  let developers: BTreeSet<&str> = activity.keys().map(|(_, login)| login.as_str()).collect();
  info!(merged, developers = developers.len(), "developer activity computed");

  Ok(
    ctx
      .doc("developer-activity", &rows(&activity))?
      .with_summary("repository", format!("{owner}/{name}"))
      .with_summary("merged_prs", merged)
      .with_summary("developers", developers.len()),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::window::{WindowSpec, resolve};
  use chrono::NaiveDate;

  fn window() -> DateWindow {
    let now = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    resolve(&WindowSpec::Year { year: 2024 }, now).unwrap()
  }

  fn pr(author: &str, created: &str, merged: &str, additions: i64, reviews: Value) -> Value {
    json!({
      "number": 1,
      "createdAt": created,
      "mergedAt": merged,
      "additions": additions,
      "deletions": 5,
      "changedFiles": 2,
      "author": { "login": author },
      "reviews": { "nodes": reviews }
    })
  }

  #[test]
  fn credits_authors_and_reviewers_in_the_merge_month() {
    let reviews = json!([
      { "state": "COMMENTED", "body": "nit", "submittedAt": "2024-03-01T02:00:00Z", "author": { "login": "bo" } },
      { "state": "APPROVED", "body": "", "submittedAt": "2024-03-01T04:00:00Z", "author": { "login": "bo" } },
      { "state": "APPROVED", "body": "", "submittedAt": "2024-03-01T06:00:00Z", "author": { "login": "cy" } }
    ]);
    let mut out = ActivityMap::new();
    let kept = record(
      &pr("ada", "2024-03-01T00:00:00Z", "2024-03-02T00:00:00Z", 40, reviews),
      &window(),
      &Tz::UTC,
      &UserFilter::default(),
      &mut out,
    );
    assert!(kept);

    let table = rows(&out);
    let devs: Vec<&str> = table.iter().map(|r| r.developer.as_str()).collect();
    assert_eq!(devs, vec!["ada", "bo", "cy"]);

    let ada = &table[0];
    assert_eq!((ada.month.as_str(), ada.prs), ("2024-03", 1));
    assert_eq!(ada.median_merge_hours, Some(24.0));
    assert_eq!(ada.median_additions, Some(40.0));
    assert_eq!(ada.reviews, 0);

    let bo = &table[1];
    assert_eq!(bo.prs, 0);
    assert_eq!(bo.median_merge_hours, None);
    assert_eq!((bo.reviews, bo.approvals, bo.review_comments), (2, 1, 1));
    assert_eq!(bo.avg_review_response_hours, Some(3.0));
  }

  #[test]
  fn medians_across_several_prs() {
    let mut out = ActivityMap::new();
    for (created, adds) in [("2024-04-01T00:00:00Z", 10), ("2024-04-02T00:00:00Z", 30), ("2024-04-03T00:00:00Z", 80)] {
      record(&pr("ada", created, "2024-04-04T00:00:00Z", adds, json!([])), &window(), &Tz::UTC, &UserFilter::default(), &mut out);
    }
    let row = &rows(&out)[0];
    assert_eq!(row.prs, 3);
    assert_eq!(row.median_additions, Some(30.0));
    assert_eq!(row.median_merge_hours, Some(48.0));
    assert_eq!(row.avg_merge_hours, Some(48.0));
  }

  #[test]
  fn user_filter_is_case_insensitive() {
    let filter = UserFilter::new(&["Ada".to_string(), " ".to_string()]);
    assert!(filter.keeps("ada"));
    assert!(!filter.keeps("bo"));

    let reviews = json!([{ "state": "APPROVED", "submittedAt": "2024-03-01T02:00:00Z", "author": { "login": "bo" } }]);
    let mut out = ActivityMap::new();
    record(&pr("ADA", "2024-03-01T00:00:00Z", "2024-03-02T00:00:00Z", 1, reviews), &window(), &Tz::UTC, &filter, &mut out);
    let devs: Vec<&str> = out.keys().map(|(_, d)| d.as_str()).collect();
    assert_eq!(devs, vec!["ADA"]);
  }

  #[test]
  fn ignores_prs_merged_outside_the_window() {
    let mut out = ActivityMap::new();
    let old = pr("ada", "2023-12-30T00:00:00Z", "2023-12-31T23:00:00Z", 1, json!([]));
    assert!(!record(&old, &window(), &Tz::UTC, &UserFilter::default(), &mut out));
    assert!(out.is_empty());
  }
}
