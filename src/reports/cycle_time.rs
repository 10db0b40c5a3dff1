//! Cycle time: business days from the first code-review transition to the release transition.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, info};

use crate::integrations::jira_api::project_clause;
use crate::integrations::jira_issue::Issue;
use crate::model::{ReportDoc, TableRow, cell2};
use crate::reports::{RunContext, parse_issues};
use crate::stats::{Grouped, business_days, business_seconds, mean, median, month_key};
use crate::window::DateWindow;

pub const ISSUE_TYPES: &str = "issueType in (Task, Bug, Story, Spike)";

/// Tickets transitioned to Released inside the window.
pub fn released_jql(projects: &[String], window: &DateWindow) -> String {
  let (start, end) = window.jql_bounds();
  format!(
    "{} AND status changed to Released during (\"{start}\", \"{end}\") AND {ISSUE_TYPES} ORDER BY updated ASC",
    project_clause(projects)
  )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SkipReason {
  MissingRelease,
  OutsideRange,
  MissingReviewStart,
}

impl fmt::Display for SkipReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let text = match self {
      SkipReason::MissingRelease => "missing release timestamp",
      SkipReason::OutsideRange => "released outside date range",
      SkipReason::MissingReviewStart => "missing review start",
    };
    f.write_str(text)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
  pub key: String,
  pub team: String,
  pub month: String,
  pub seconds: i64,
}

pub fn measure(issue: &Issue, window: &DateWindow, tz: &Tz) -> Result<Sample, SkipReason> {
  let milestones = issue.milestones();

  let released = milestones.released.ok_or(SkipReason::MissingRelease)?;
  if !window.contains(&released, tz) {
    return Err(SkipReason::OutsideRange);
  }
  let review_start = milestones.review_start.ok_or(SkipReason::MissingReviewStart)?;

  let seconds = business_seconds(
    review_start.with_timezone(tz).naive_local(),
    released.with_timezone(tz).naive_local(),
  );

  Ok(Sample {
    key: issue.key.clone(),
    team: issue.team.clone(),
    month: month_key(&released, tz),
    seconds,
  })
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CycleTimeRow {
  pub team: String,
  pub month: String,
  pub median_days: f64,
  pub average_days: f64,
  pub tickets: usize,
}

impl TableRow for CycleTimeRow {
  const HEADERS: &'static [&'static str] = &["Team", "Month", "Median (days)", "Average (days)", "Tickets"];

  fn cells(&self) -> Vec<String> {
    vec![
      self.team.clone(),
      self.month.clone(),
      cell2(self.median_days),
      cell2(self.average_days),
      self.tickets.to_string(),
    ]
  }
}

pub fn aggregate(samples: &[Sample]) -> Vec<CycleTimeRow> {
  let mut grouped: Grouped<f64> = Grouped::new();
  for s in samples {
    grouped.push_with_all(&s.team, &s.month, business_days(s.seconds));
  }

  let mut rows = Vec::new();
  for (team, months) in grouped.ordered() {
    for (month, days) in months {
      rows.push(CycleTimeRow {
        team: team.label().to_string(),
        month: month.clone(),
        median_days: median(days).unwrap_or(0.0),
        average_days: mean(days).unwrap_or(0.0),
        tickets: days.len(),
      });
    }
  }

  rows
}

pub fn run(ctx: &RunContext) -> Result<ReportDoc> {
  let settings = ctx.jira_settings()?;
  let raw = ctx.jira_rows(&settings, &released_jql(&settings.projects, &ctx.window))?;
  let issues = parse_issues(&raw, &settings);

  let mut samples = Vec::new();
  let mut skipped: BTreeMap<String, usize> = BTreeMap::new();

  for issue in &issues {
    match measure(issue, &ctx.window, &ctx.tz) {
      Ok(sample) => {
        debug!(key = %sample.key, days = business_days(sample.seconds), "cycle time");
        samples.push(sample);
      }
      Err(reason) => {
        debug!(key = %issue.key, reason = %reason, "skipping ticket");
        *skipped.entry(reason.to_string()).or_default() += 1;
      }
    }
  }
  info!(measured = samples.len(), skipped = skipped.values().sum::<usize>(), "cycle time computed");

  let rows = aggregate(&samples);
  let all_days: Vec<f64> = samples.iter().map(|s| business_days(s.seconds)).collect();

  Ok(
    ctx
      .doc("cycle-time", &rows)?
      .with_summary("tickets_measured", samples.len())
      .with_summary("tickets_skipped", serde_json::to_value(&skipped)?)
      .with_summary("median_days", median(&all_days))
      .with_summary("average_days", mean(&all_days)),
  )
}
