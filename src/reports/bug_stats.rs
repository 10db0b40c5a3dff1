//! Yearly bug flow per project: created, closed, won't do, and still open at the end of the year.

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use chrono::Datelike;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use crate::cache::acquire_rows;
use crate::ext::serde_json::JsonFetch;
use crate::integrations::jira_api::{self, project_clause, search_all};
use crate::model::{ReportDoc, TableRow};
use crate::reports::RunContext;
use crate::stats::ALL_GROUP;

pub const MIN_YEAR: i32 = 1900;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BugMetric {
  Created,
  Closed,
  WontDo,
  OpenEndOfYear,
}

impl BugMetric {
  pub const ALL: [BugMetric; 4] = [
    BugMetric::Created,
    BugMetric::Closed,
    BugMetric::WontDo,
    BugMetric::OpenEndOfYear,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      BugMetric::Created => "created",
      BugMetric::Closed => "closed",
      BugMetric::WontDo => "wont_do",
      BugMetric::OpenEndOfYear => "open_end_of_year",
    }
  }

  pub fn parse(raw: &str) -> Option<BugMetric> {
    BugMetric::ALL.into_iter().find(|m| m.as_str() == raw)
  }
}

pub fn validate_years(start: i32, end: i32, current: i32) -> Result<()> {
  for (flag, year) in [("--start-year", start), ("--end-year", end)] {
    if !(MIN_YEAR..=current).contains(&year) {
      bail!("{flag} must be between {MIN_YEAR} and {current}, got {year}");
    }
  }
  if start > end {
    bail!("--start-year ({start}) cannot be after --end-year ({end})");
  }
  Ok(())
}

/// JQL for one metric of one year.
pub fn metric_jql(metric: BugMetric, year: i32, projects: &[String]) -> String {
  let base = format!("{} AND issuetype = Bug", project_clause(projects));
  let (from, to) = (format!("{year}-01-01"), format!("{}-01-01", year + 1));

  match metric {
    BugMetric::Created => format!("{base} AND created >= \"{from}\" AND created < \"{to}\""),
    BugMetric::Closed => format!(
      "{base} AND status in (Done, Closed, Released) AND updated >= \"{from}\" AND updated < \"{to}\" AND resolution != \"Won't Do\""
    ),
    BugMetric::WontDo => format!(
      "{base} AND status in (Done, Closed, Released) AND updated >= \"{from}\" AND updated < \"{to}\" AND resolution = \"Won't Do\""
    ),
    BugMetric::OpenEndOfYear => {
      format!("{base} AND created < \"{to}\" AND status not in (Done, Closed, Released)")
    }
  }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct BugStatsRow {
  pub year: i32,
  pub project: String,
  pub created: usize,
  pub closed: usize,
  pub wont_do: usize,
  pub open_end_of_year: usize,
  pub net_change: i64,
}

impl TableRow for BugStatsRow {
  const HEADERS: &'static [&'static str] = &[
    "Year",
    "Project",
    "Created",
    "Closed",
    "Won't Do",
    "Open End of Year",
    "Net Change",
  ];

  fn cells(&self) -> Vec<String> {
    vec![
      self.year.to_string(),
      self.project.clone(),
      self.created.to_string(),
      self.closed.to_string(),
      self.wont_do.to_string(),
      self.open_end_of_year.to_string(),
      self.net_change.to_string(),
    ]
  }
}

impl BugStatsRow {
  fn add(&mut self, metric: BugMetric, n: usize) {
    match metric {
      BugMetric::Created => self.created += n,
      BugMetric::Closed => self.closed += n,
      BugMetric::WontDo => self.wont_do += n,
      BugMetric::OpenEndOfYear => self.open_end_of_year += n,
    }
    self.net_change = self.created as i64 - self.closed as i64 - self.wont_do as i64;
  }
}

/// Flattened record for one matching ticket: `{year, metric, key, project}`.
pub fn record(year: i32, metric: BugMetric, issue: &Value) -> Value {
  let key = issue.fetch("key").as_str().unwrap_or_default();
  let project = issue
    .fetch("fields.project.key")
    .as_str()
    .or_else(|| key.split('-').next())
    .unwrap_or_default();

  json!({ "year": year, "metric": metric.as_str(), "key": key, "project": project })
}

/// Rows per year: every configured project (zeros included), projects seen only in data, then `All`.
pub fn aggregate(records: &[Value], projects: &[String], years: &[i32]) -> Vec<BugStatsRow> {
  let mut counts: BTreeMap<(i32, String), BugStatsRow> = BTreeMap::new();

  for &year in years {
    for p in projects {
      counts.insert(
        (year, p.clone()),
        BugStatsRow { year, project: p.clone(), ..Default::default() },
      );
    }
  }

  for r in records {
    let (Some(year), Some(metric), Some(project)) = (
      r.fetch("year").to::<i32>(),
      r.fetch("metric").as_str().and_then(BugMetric::parse),
      r.fetch("project").as_str(),
    ) else {
      continue;
    };

    counts
      .entry((year, project.to_string()))
      .or_insert_with(|| BugStatsRow { year, project: project.to_string(), ..Default::default() })
      .add(metric, 1);
  }

  let mut rows = Vec::new();
  let mut seen_years: Vec<i32> = counts.keys().map(|(y, _)| *y).collect();
  seen_years.dedup();

  for year in seen_years {
    let mut all = BugStatsRow { year, project: ALL_GROUP.to_string(), ..Default::default() };

    for ((_, _), row) in counts.range((year, String::new())..(year + 1, String::new())) {
      all.add(BugMetric::Created, row.created);
      all.add(BugMetric::Closed, row.closed);
      all.add(BugMetric::WontDo, row.wont_do);
      all.add(BugMetric::OpenEndOfYear, row.open_end_of_year);
      rows.push(row.clone());
    }
    rows.push(all);
  }

  rows
}

pub fn run(ctx: &RunContext, start_year: Option<i32>, end_year: Option<i32>) -> Result<ReportDoc> {
  let current = ctx.now.with_timezone(&ctx.tz).year();
  let start = start_year.unwrap_or(current);
  let end = end_year.unwrap_or(current);
  validate_years(start, end, current)?;

  let settings = ctx.jira_settings()?;
  let years: Vec<i32> = (start..=end).collect();

  let records = acquire_rows(&ctx.rows, || {
    let api = jira_api::build_api(&settings, ctx.cache);
    let mut out = Vec::new();

    for &year in &years {
      for metric in BugMetric::ALL {
        let issues = search_all(api.as_ref(), &metric_jql(metric, year, &settings.projects))?;
        info!(year, metric = metric.as_str(), count = issues.len(), "bug query");
        out.extend(issues.iter().map(|i| record(year, metric, i)));
      }
    }

    Ok(out)
  })?;

  let rows = aggregate(&records, &settings.projects, &years);
  let totals: Vec<&BugStatsRow> = rows.iter().filter(|r| r.project == ALL_GROUP).collect();

  Ok(
    ctx
      .doc_unranged("bug-stats", &rows)?
      .with_summary("years", format!("{start}..={end}"))
      .with_summary("created", totals.iter().map(|r| r.created).sum::<usize>())
      .with_summary("closed", totals.iter().map(|r| r.closed).sum::<usize>())
      .with_summary("wont_do", totals.iter().map(|r| r.wont_do).sum::<usize>()),
  )
}
