//! Engineering excellence ratio: debt-reduction and critical work versus product work, per team and month.

use anyhow::Result;
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, info};

use crate::integrations::jira_issue::Issue;
use crate::model::{ReportDoc, TableRow, cell2};
use crate::reports::cycle_time::released_jql;
use crate::reports::{RunContext, parse_issues};
use crate::stats::{ALL_GROUP, Grouped, month_key, percent};
use crate::window::DateWindow;

/// Work types counted as engineering excellence; everything else (including no work type) is product.
pub const EXCELLENCE_WORK_TYPES: [&str; 2] = ["Debt Reduction", "Critical"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkCategory {
  Excellence,
  Product,
}

pub fn classify(work_type: Option<&str>) -> WorkCategory {
  match work_type.map(str::trim) {
    Some(w) if EXCELLENCE_WORK_TYPES.iter().any(|e| e.eq_ignore_ascii_case(w)) => WorkCategory::Excellence,
    _ => WorkCategory::Product,
  }
}

/// `(team, month, category)` for a ticket released inside the window.
pub fn categorize(issue: &Issue, window: &DateWindow, tz: &Tz) -> Option<(String, String, WorkCategory)> {
  let released = issue.milestones().released?;
  if !window.contains(&released, tz) {
    return None;
  }

  Some((
    issue.team.clone(),
    month_key(&released, tz),
    classify(issue.work_type.as_deref()),
  ))
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExcellenceRow {
  pub team: String,
  pub month: String,
  pub total: usize,
  pub product: usize,
  pub product_pct: f64,
  pub excellence: usize,
  pub excellence_pct: f64,
  pub cumulative_excellence_pct: f64,
}

impl TableRow for ExcellenceRow {
  const HEADERS: &'static [&'static str] = &[
    "Team",
    "Month",
    "Tickets",
    "Product",
    "Product %",
    "Eng. Excellence",
    "Eng. Excellence %",
    "Cumulative EE %",
  ];

  fn cells(&self) -> Vec<String> {
    vec![
      self.team.clone(),
      self.month.clone(),
      self.total.to_string(),
      self.product.to_string(),
      cell2(self.product_pct),
      self.excellence.to_string(),
      cell2(self.excellence_pct),
      cell2(self.cumulative_excellence_pct),
    ]
  }
}

pub fn aggregate(entries: &[(String, String, WorkCategory)]) -> Vec<ExcellenceRow> {
  let mut grouped: Grouped<WorkCategory> = Grouped::new();
  for (team, month, category) in entries {
    grouped.push_with_all(team, month, *category);
  }

  let mut rows = Vec::new();
  for (team, months) in grouped.ordered() {
    let mut cumulative_ee = 0usize;
    let mut cumulative_total = 0usize;

    for (month, categories) in months {
      let excellence = categories.iter().filter(|c| **c == WorkCategory::Excellence).count();
      let total = categories.len();
      let product = total - excellence;
      cumulative_ee += excellence;
      cumulative_total += total;

      rows.push(ExcellenceRow {
        team: team.label().to_string(),
        month: month.clone(),
        total,
        product,
        product_pct: percent(product as f64, total as f64),
        excellence,
        excellence_pct: percent(excellence as f64, total as f64),
        cumulative_excellence_pct: percent(cumulative_ee as f64, cumulative_total as f64),
      });
    }
  }

  rows
}

pub fn run(ctx: &RunContext) -> Result<ReportDoc> {
  let settings = ctx.jira_settings()?;
  let raw = ctx.jira_rows(&settings, &released_jql(&settings.projects, &ctx.window))?;
  let issues = parse_issues(&raw, &settings);

  let mut entries = Vec::new();
  for issue in &issues {
    match categorize(issue, &ctx.window, &ctx.tz) {
      Some(entry) => entries.push(entry),
      None => debug!(key = %issue.key, "skipping ticket without a release inside the window"),
    }
  }
  info!(tickets = entries.len(), "engineering excellence computed");

  let rows = aggregate(&entries);
  let overall = rows
    .iter()
    .rev()
    .find(|r| r.team == ALL_GROUP)
    .map(|r| r.cumulative_excellence_pct)
    .unwrap_or(0.0);

  Ok(
    ctx
      .doc("engineering-excellence", &rows)?
      .with_summary("tickets", entries.len())
      .with_summary("excellence_pct", overall),
  )
}
