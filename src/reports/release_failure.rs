//! Release failure rate: release tickets that left Released after being released.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, info};

use crate::integrations::jira_api::project_clause;
use crate::integrations::jira_issue::Issue;
use crate::model::{ReportDoc, TableRow, cell2};
use crate::reports::{RunContext, parse_issues};
use crate::stats::{month_key, percent};
use crate::window::DateWindow;

pub const DEFAULT_SUMMARY: &str = "Production Release";

pub fn release_jql(projects: &[String], summary: &str, window: &DateWindow) -> String {
  let (start, end) = window.jql_bounds();
  let summary = summary.replace('"', "\\\"");
  format!(
    "{} AND summary ~ \"{summary}\" AND type = Release AND status changed to Released during (\"{start}\", \"{end}\") ORDER BY created ASC",
    project_clause(projects)
  )
}

/// One release inside the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
  pub key: String,
  pub month: String,
  pub failed: bool,
  pub linked: usize,
}

/// Release events of a ticket inside the window; exceptions never count as failed.
pub fn releases_of(issue: &Issue, exceptions: &[String], window: &DateWindow, tz: &Tz) -> Vec<Release> {
  let excepted = exceptions.iter().any(|e| e.eq_ignore_ascii_case(&issue.key));

  issue
    .release_events()
    .into_iter()
    .filter(|e| window.contains(&e.at, tz))
    .map(|e| Release {
      key: issue.key.clone(),
      month: month_key(&e.at, tz),
      failed: e.failed && !excepted,
      linked: issue.outward_links.len(),
    })
    .collect()
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ReleaseFailureRow {
  pub month: String,
  pub releases: usize,
  pub failed: usize,
  pub failure_pct: f64,
  pub linked_tickets: usize,
  pub failed_linked_tickets: usize,
  pub linked_failure_pct: f64,
}

impl TableRow for ReleaseFailureRow {
  const HEADERS: &'static [&'static str] = &[
    "Month",
    "Releases",
    "Failed",
    "Failure %",
    "Linked Tickets",
    "Failed Linked",
    "Linked Failure %",
  ];

  fn cells(&self) -> Vec<String> {
    vec![
      self.month.clone(),
      self.releases.to_string(),
      self.failed.to_string(),
      cell2(self.failure_pct),
      self.linked_tickets.to_string(),
      self.failed_linked_tickets.to_string(),
      cell2(self.linked_failure_pct),
    ]
  }
}

pub fn aggregate(releases: &[Release]) -> Vec<ReleaseFailureRow> {
  let mut by_month: BTreeMap<&str, ReleaseFailureRow> = BTreeMap::new();

  for r in releases {
    let row = by_month.entry(r.month.as_str()).or_insert_with(|| ReleaseFailureRow {
      month: r.month.clone(),
      ..Default::default()
    });
    row.releases += 1;
    row.linked_tickets += r.linked;
    if r.failed {
      row.failed += 1;
      row.failed_linked_tickets += r.linked;
    }
  }

  by_month
    .into_values()
    .map(|mut row| {
      row.failure_pct = percent(row.failed as f64, row.releases as f64);
      row.linked_failure_pct = percent(row.failed_linked_tickets as f64, row.linked_tickets as f64);
      row
    })
    .collect()
}

pub fn run(ctx: &RunContext, exceptions: &[String], summary: &str) -> Result<ReportDoc> {
  let settings = ctx.jira_settings()?;
  let raw = ctx.jira_rows(&settings, &release_jql(&settings.projects, summary, &ctx.window))?;
  let issues = parse_issues(&raw, &settings);

  let releases: Vec<Release> = issues
    .iter()
    .flat_map(|i| releases_of(i, exceptions, &ctx.window, &ctx.tz))
    .collect();
  for r in releases.iter().filter(|r| r.failed) {
    debug!(key = %r.key, month = %r.month, linked = r.linked, "failed release");
  }

  let applied: Vec<&str> = issues
    .iter()
    .filter(|i| exceptions.iter().any(|e| e.eq_ignore_ascii_case(&i.key)))
    .map(|i| i.key.as_str())
    .collect();

  let total = releases.len();
  let failed = releases.iter().filter(|r| r.failed).count();
  info!(total, failed, "release failure computed");

  Ok(
    ctx
      .doc("release-failure", &aggregate(&releases))?
      .with_summary("releases", total)
      .with_summary("failed", failed)
      .with_summary("failure_pct", percent(failed as f64, total as f64))
      .with_summary("exceptions_applied", applied),
  )
}
