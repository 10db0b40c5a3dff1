//! Review latency of closed pull requests: time to first review, first approval and merge.

use anyhow::Result;
use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::cache::acquire_rows;
use crate::ext::serde_json::JsonFetch;
use crate::model::{ReportDoc, TableRow, cell_opt};
use crate::reports::RunContext;
use crate::stats::{mean, median, round2};
use crate::util::{hours_between, parse_timestamp};
use crate::window::DateWindow;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn ts(v: &Value, path: &str) -> Option<DateTime<FixedOffset>> {
  v.fetch(path).as_str().and_then(parse_timestamp)
}

/// Closed PRs created inside the window, in listing order, cut to `limit` (0 means no limit).
pub fn select_pulls(pulls: Vec<Value>, window: &DateWindow, tz: &Tz, limit: Option<usize>) -> Vec<Value> {
  let mut selected: Vec<Value> = pulls
    .into_iter()
    .filter(|p| ts(p, "created_at").is_some_and(|c| window.contains(&c, tz)))
    .collect();

  if let Some(n) = limit.filter(|n| *n > 0) {
    selected.truncate(n);
  }
  selected
}

/// Milestones derived from a PR's reviews and timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewTiming {
  pub first_review: Option<DateTime<FixedOffset>>,
  pub first_approval: Option<DateTime<FixedOffset>>,
  pub first_request: Option<DateTime<FixedOffset>>,
}

/// Reviews count only with a submission time and a reviewer login.
pub fn review_timing(reviews: &[Value], timeline: &[Value]) -> ReviewTiming {
  let mut submitted: Vec<(DateTime<FixedOffset>, &Value)> = reviews
    .iter()
    .filter(|r| r.fetch("user.login").as_str().is_some())
    .filter_map(|r| ts(r, "submitted_at").map(|at| (at, r)))
    .collect();
  submitted.sort_by_key(|(at, _)| *at);

  ReviewTiming {
    first_review: submitted.first().map(|(at, _)| *at),
    first_approval: submitted
      .iter()
      .find(|(_, r)| r.fetch("state").as_str() == Some("APPROVED"))
      .map(|(at, _)| *at),
    first_request: timeline
      .iter()
      .filter(|e| e.fetch("event").as_str() == Some("review_requested"))
      .filter_map(|e| ts(e, "created_at"))
      .min(),
  }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CodeReviewRow {
  pub number: i64,
  pub created_at: Option<String>,
  pub merged_at: Option<String>,
  pub hours_to_merge: Option<f64>,
  pub first_review_at: Option<String>,
  pub hours_to_first_review: Option<f64>,
  pub hours_to_first_approval: Option<f64>,
  pub hours_approval_to_merge: Option<f64>,
  pub hours_request_to_first_review: Option<f64>,
}

impl TableRow for CodeReviewRow {
  const HEADERS: &'static [&'static str] = &[
    "PR",
    "Created At",
    "Merged At",
    "Time to Merge (hrs)",
    "First Review",
    "Time to First Review (hrs)",
    "Time to First Approval (hrs)",
    "Approval to Merge (hrs)",
    "Request to First Review (hrs)",
  ];

  fn cells(&self) -> Vec<String> {
    vec![
      self.number.to_string(),
      self.created_at.clone().unwrap_or_default(),
      self.merged_at.clone().unwrap_or_default(),
      cell_opt(self.hours_to_merge),
      self.first_review_at.clone().unwrap_or_default(),
      cell_opt(self.hours_to_first_review),
      cell_opt(self.hours_to_first_approval),
      cell_opt(self.hours_approval_to_merge),
      cell_opt(self.hours_request_to_first_review),
    ]
  }
}

fn hours(start: Option<DateTime<FixedOffset>>, end: Option<DateTime<FixedOffset>>) -> Option<f64> {
  Some(round2(hours_between(&start?, &end?)))
}

/// One row from a `{pull, reviews, timeline}` record; records without a PR number yield `None`.
pub fn review_row(record: &Value, tz: &Tz) -> Option<CodeReviewRow> {
  let pull = record.fetch("pull").value()?;
  let number = pull.fetch("number").to::<i64>()?;
  let fmt = |t: DateTime<FixedOffset>| t.with_timezone(tz).format(TIMESTAMP_FORMAT).to_string();

  let created = ts(pull, "created_at");
  let merged = ts(pull, "merged_at");
  let mut row = CodeReviewRow { number, created_at: created.map(fmt), ..Default::default() };
  if merged.is_none() {
    return Some(row);
  }

  let timing = review_timing(record.fetch("reviews").items(), record.fetch("timeline").items());

  row.merged_at = merged.map(fmt);
  row.hours_to_merge = hours(created, merged);
  row.first_review_at = timing.first_review.map(fmt);
  row.hours_to_first_review = hours(created, timing.first_review);
  row.hours_to_first_approval = hours(created, timing.first_approval);
  row.hours_approval_to_merge = hours(timing.first_approval, merged);
  row.hours_request_to_first_review = match (timing.first_request, timing.first_review) {
    (Some(req), Some(rev)) if req <= rev => hours(Some(req), Some(rev)),
    _ => None,
  };

  Some(row)
}

fn summarize(values: Vec<f64>) -> (Value, Value) {
  (
    json!(mean(&values).map(round2)),
    json!(median(&values).map(round2)),
  )
}

pub fn run(ctx: &RunContext, repo: Option<&str>, limit: Option<usize>) -> Result<ReportDoc> {
  let settings = ctx.github_settings();
  let (owner, name) = settings.require_repo(repo)?;

  let records = acquire_rows(&ctx.rows, || {
    let api = ctx.github_api(&settings)?;
    let pulls = api.list_pulls(&owner, &name, "closed")?;
    let listed = pulls.len();
    let selected = select_pulls(pulls, &ctx.window, &ctx.tz, limit);
    info!(owner = %owner, repo = %name, listed, selected = selected.len(), "closed pull requests");

    let mut out = Vec::with_capacity(selected.len());
    for pull in selected {
      let number = pull.fetch("number").to::<i64>();
      let merged = pull.fetch("merged_at").is_present();

      let (reviews, timeline) = match number {
        Some(n) if merged => {
          debug!(number = n, "fetching reviews and timeline");
          (api.list_reviews(&owner, &name, n)?, api.list_timeline(&owner, &name, n)?)
        }
        _ => (Vec::new(), Vec::new()),
      };
      out.push(json!({ "pull": pull, "reviews": reviews, "timeline": timeline }));
    }
    Ok(out)
  })?;

  let mut rows = Vec::with_capacity(records.len());
  for record in &records {
    match review_row(record, &ctx.tz) {
      Some(row) => rows.push(row),
      None => warn!("skipping pull request record without a number"),
    }
  }

  let merged = rows.iter().filter(|r| r.merged_at.is_some()).count();
  info!(prs = rows.len(), merged, "code review computed");

  let mut doc = ctx
    .doc("code-review", &rows)?
    .with_summary("repository", format!("{owner}/{name}"))
    .with_summary("prs", rows.len())
    .with_summary("merged", merged);

  let metrics: [(&str, fn(&CodeReviewRow) -> Option<f64>); 5] = [
    ("hours_to_merge", |r| r.hours_to_merge),
    ("hours_to_first_review", |r| r.hours_to_first_review),
    ("hours_to_first_approval", |r| r.hours_to_first_approval),
    ("hours_approval_to_merge", |r| r.hours_approval_to_merge),
    ("hours_request_to_first_review", |r| r.hours_request_to_first_review),
  ];
  for (metric, pick) in metrics {
    let (avg, med) = summarize(rows.iter().filter_map(pick).collect());
    doc = doc
      .with_summary(&format!("avg_{metric}"), avg)
      .with_summary(&format!("median_{metric}"), med);
  }

  Ok(doc)
}
