//! Completed bugs per priority: how many there were and how long they took from creation to completion.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::JiraSettings;
use crate::integrations::jira_api::project_clause;
use crate::integrations::jira_issue::Issue;
use crate::model::{ReportDoc, TableRow, cell2};
use crate::reports::{RunContext, parse_issues};
use crate::stats::{mean, median, percent, round2};
use crate::window::DateWindow;

/// Statuses that close a bug for this report.
pub const COMPLETION_STATUSES: [&str; 2] = ["Released", "Done"];

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Completed bugs with a priority, created inside the (padded) window.
pub fn bug_jql(settings: &JiraSettings, window: &DateWindow) -> String {
  let (start, end) = window.jql_bounds();
  let statuses: Vec<String> = COMPLETION_STATUSES.iter().map(|s| format!("\"{s}\"")).collect();
  format!(
    "{} AND issuetype = Bug AND created >= \"{start}\" AND created < \"{end}\" AND status IN ({}) AND {} IS NOT EMPTY ORDER BY created ASC",
    project_clause(&settings.projects),
    statuses.join(", "),
    settings.fields.bug_priority_jql(),
  )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Skip {
  NoPriority,
  NoCreated,
  OutsideRange,
  NoCompletion,
}

impl fmt::Display for Skip {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let text = match self {
      Skip::NoPriority => "no priority",
      Skip::NoCreated => "no creation time",
      Skip::OutsideRange => "created outside date range",
      Skip::NoCompletion => "no completion time",
    };
    f.write_str(text)
  }
}

/// Creation time, falling back to the earliest status change.
fn created_at(issue: &Issue) -> Option<DateTime<FixedOffset>> {
  issue.created.or_else(|| issue.status_changes.first().map(|c| c.at))
}

/// `(priority, days from creation to the latest released or done transition)`.
pub fn measure(issue: &Issue, window: &DateWindow, tz: &Tz) -> Result<(String, f64), Skip> {
  let priority = issue.priority.clone().ok_or(Skip::NoPriority)?;
  let created = created_at(issue).ok_or(Skip::NoCreated)?;
  if !window.contains(&created, tz) {
    return Err(Skip::OutsideRange);
  }

  let milestones = issue.milestones();
  let completed = match (milestones.released, milestones.done) {
    (Some(r), Some(d)) => r.max(d),
    (r, d) => r.or(d).ok_or(Skip::NoCompletion)?,
  };

  let days = (completed - created).num_seconds() as f64 / SECONDS_PER_DAY;
  Ok((priority, round2(days)))
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BugPriorityRow {
  pub priority: String,
  pub bugs: usize,
  pub share_pct: f64,
  pub average_days: f64,
  pub median_days: f64,
  pub min_days: f64,
  pub max_days: f64,
}

impl TableRow for BugPriorityRow {
  const HEADERS: &'static [&'static str] = &[
    "Priority",
    "Bugs",
    "Share %",
    "Average (days)",
    "Median (days)",
    "Min (days)",
    "Max (days)",
  ];

  fn cells(&self) -> Vec<String> {
    vec![
      self.priority.clone(),
      self.bugs.to_string(),
      cell2(self.share_pct),
      cell2(self.average_days),
      cell2(self.median_days),
      cell2(self.min_days),
      cell2(self.max_days),
    ]
  }
}

/// Rows ordered by bug count (descending), then priority name.
pub fn aggregate(samples: &[(String, f64)]) -> Vec<BugPriorityRow> {
  let mut by_priority: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
  for (priority, days) in samples {
    by_priority.entry(priority.as_str()).or_default().push(*days);
  }

  let total = samples.len() as f64;
  let mut rows: Vec<BugPriorityRow> = by_priority
    .into_iter()
    .map(|(priority, days)| BugPriorityRow {
      priority: priority.to_string(),
      bugs: days.len(),
      share_pct: round2(percent(days.len() as f64, total)),
      average_days: round2(mean(&days).unwrap_or(0.0)),
      median_days: round2(median(&days).unwrap_or(0.0)),
      min_days: days.iter().cloned().fold(f64::INFINITY, f64::min),
      max_days: days.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
    })
    .collect();

  rows.sort_by(|a, b| b.bugs.cmp(&a.bugs).then_with(|| a.priority.cmp(&b.priority)));
  rows
}

pub fn run(ctx: &RunContext) -> Result<ReportDoc> {
  let settings = ctx.jira_settings()?;
  let raw = ctx.jira_rows(&settings, &bug_jql(&settings, &ctx.window))?;
  let issues = parse_issues(&raw, &settings);

  let mut samples = Vec::new();
  let mut skipped: BTreeMap<String, usize> = BTreeMap::new();
  for issue in &issues {
    match measure(issue, &ctx.window, &ctx.tz) {
      Ok(sample) => samples.push(sample),
      Err(reason) => {
        debug!(key = %issue.key, reason = %reason, "skipping bug");
        *skipped.entry(reason.to_string()).or_default() += 1;
      }
    }
  }
  info!(measured = samples.len(), skipped = skipped.values().sum::<usize>(), "bug priority computed");

  let all_days: Vec<f64> = samples.iter().map(|(_, d)| *d).collect();
  Ok(
    ctx
      .doc("bug-priority", &aggregate(&samples))?
      .with_summary("bugs", samples.len())
      .with_summary("bugs_skipped", serde_json::to_value(&skipped)?)
      .with_summary("average_days", mean(&all_days).map(round2)),
  )
}
