//! Individual contribution inside one team: points and tickets per assignee relative to the team average.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::integrations::jira_issue::Issue;
use crate::model::{ReportDoc, TableRow, cell2};
use crate::reports::cycle_time::released_jql;
use crate::reports::{RunContext, parse_issues};
use crate::stats::{mean, month_key, ratio};
use crate::window::DateWindow;

pub const UNASSIGNED: &str = "Unassigned";
pub const ROLLING_MONTHS: usize = 3;
pub const TOP_N: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tally {
  pub points: f64,
  pub tickets: usize,
}

/// month → assignee → tally
pub type MonthlyTallies = BTreeMap<String, BTreeMap<String, Tally>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skip {
  OtherTeam,
  NoCompletion,
  OutsideRange,
}

/// Credit a ticket to its assignee in the month it was released (or done, when never released).
pub fn credit(
  issue: &Issue,
  team: &str,
  window: &DateWindow,
  tz: &Tz,
  tallies: &mut MonthlyTallies,
) -> Result<(), Skip> {
  if !issue.team.eq_ignore_ascii_case(team.trim()) {
    return Err(Skip::OtherTeam);
  }

  let milestones = issue.milestones();
  let completed = milestones.released.or(milestones.done).ok_or(Skip::NoCompletion)?;
  if milestones.released.is_none() {
    debug!(key = %issue.key, "no release timestamp; using done timestamp");
  }
  if !window.contains(&completed, tz) {
    return Err(Skip::OutsideRange);
  }

  let assignee = issue.assignee.clone().unwrap_or_else(|| UNASSIGNED.to_string());
  let tally = tallies
    .entry(month_key(&completed, tz))
    .or_default()
    .entry(assignee)
    .or_default();
  tally.points += issue.story_points;
  tally.tickets += 1;

  Ok(())
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IndividualRow {
  pub month: String,
  pub assignee: String,
  pub points: f64,
  pub points_ratio: f64,
  pub tickets: usize,
  pub tickets_ratio: f64,
  pub team_average_points: f64,
  pub team_average_tickets: f64,
}

impl TableRow for IndividualRow {
  const HEADERS: &'static [&'static str] = &[
    "Month",
    "Assignee",
    "Points",
    "Points Ratio",
    "Tickets",
    "Tickets Ratio",
    "Team Avg Points",
    "Team Avg Tickets",
  ];

  fn cells(&self) -> Vec<String> {
    vec![
      self.month.clone(),
      self.assignee.clone(),
      format!("{}", self.points),
      cell2(self.points_ratio),
      self.tickets.to_string(),
      cell2(self.tickets_ratio),
      cell2(self.team_average_points),
      cell2(self.team_average_tickets),
    ]
  }
}

fn team_averages(members: &BTreeMap<String, Tally>) -> (f64, f64) {
  let size = members.len() as f64;
  if size == 0.0 {
    return (0.0, 0.0);
  }
  let points: f64 = members.values().map(|t| t.points).sum();
  let tickets: usize = members.values().map(|t| t.tickets).sum();
  (points / size, tickets as f64 / size)
}

/// Rows per month, members ordered by points (descending) then name.
pub fn rows(tallies: &MonthlyTallies) -> Vec<IndividualRow> {
  let mut out = Vec::new();

  for (month, members) in tallies {
    let (avg_points, avg_tickets) = team_averages(members);
    let mut sorted: Vec<(&String, &Tally)> = members.iter().collect();
    sorted.sort_by(|a, b| b.1.points.total_cmp(&a.1.points).then_with(|| a.0.cmp(b.0)));

    for (assignee, tally) in sorted {
      out.push(IndividualRow {
        month: month.clone(),
        assignee: assignee.clone(),
        points: tally.points,
        points_ratio: ratio(tally.points, avg_points),
        tickets: tally.tickets,
        tickets_ratio: ratio(tally.tickets as f64, avg_tickets),
        team_average_points: avg_points,
        team_average_tickets: avg_tickets,
      });
    }
  }

  out
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Contributor {
  pub assignee: String,
  pub average_ratio: f64,
  pub total: f64,
}

/// Top contributors by average ratio over the last `ROLLING_MONTHS` months with data.
///
/// Months where the team average is zero contribute no ratio for that metric.
pub fn top_contributors(tallies: &MonthlyTallies) -> (Vec<Contributor>, Vec<Contributor>) {
  let recent: Vec<&BTreeMap<String, Tally>> = tallies.values().rev().take(ROLLING_MONTHS).collect();

  let mut point_ratios: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
  let mut ticket_ratios: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
  let mut point_totals: BTreeMap<&str, f64> = BTreeMap::new();
  let mut ticket_totals: BTreeMap<&str, f64> = BTreeMap::new();

  for members in recent {
    let (avg_points, avg_tickets) = team_averages(members);

    for (assignee, tally) in members {
      if avg_points > 0.0 {
        point_ratios.entry(assignee).or_default().push(tally.points / avg_points);
      }
      if avg_tickets > 0.0 {
        ticket_ratios.entry(assignee).or_default().push(tally.tickets as f64 / avg_tickets);
      }
      *point_totals.entry(assignee).or_default() += tally.points;
      *ticket_totals.entry(assignee).or_default() += tally.tickets as f64;
    }
  }

  (rank(&point_ratios, &point_totals), rank(&ticket_ratios, &ticket_totals))
}

fn rank(ratios: &BTreeMap<&str, Vec<f64>>, totals: &BTreeMap<&str, f64>) -> Vec<Contributor> {
  let mut list: Vec<Contributor> = ratios
    .iter()
    .filter_map(|(assignee, rs)| {
      Some(Contributor {
        assignee: assignee.to_string(),
        average_ratio: mean(rs)?,
        total: totals.get(*assignee).copied().unwrap_or(0.0),
      })
    })
    .collect();

  list.sort_by(|a, b| {
    b.average_ratio
      .total_cmp(&a.average_ratio)
      .then_with(|| a.assignee.cmp(&b.assignee))
  });
  list.truncate(TOP_N);
  list
}

fn contributors_json(list: &[Contributor]) -> Value {
  Value::Array(
    list
      .iter()
      .map(|c| json!({ "assignee": c.assignee, "average_ratio": (c.average_ratio * 100.0).round() / 100.0, "total": c.total }))
      .collect(),
  )
}

pub fn run(ctx: &RunContext, team: &str) -> Result<ReportDoc> {
  let settings = ctx.jira_settings()?;
  let raw = ctx.jira_rows(&settings, &released_jql(&settings.projects, &ctx.window))?;
  let issues = parse_issues(&raw, &settings);

  let mut tallies = MonthlyTallies::new();
  let mut other_team = 0usize;
  let mut outside = 0usize;
  for issue in &issues {
    match credit(issue, team, &ctx.window, &ctx.tz, &mut tallies) {
      Ok(()) => {}
      Err(Skip::OtherTeam) => other_team += 1,
      Err(Skip::OutsideRange) => outside += 1,
      Err(Skip::NoCompletion) => {
        warn!(key = %issue.key, "released ticket has neither a released nor a done timestamp; skipping")
      }
    }
  }
  info!(team, months = tallies.len(), other_team, outside, "individual metrics computed");

  let (by_points, by_tickets) = top_contributors(&tallies);

  Ok(
    ctx
      .doc("individual", &rows(&tallies))?
      .with_summary("team", team)
      .with_summary("top_by_points", contributors_json(&by_points))
      .with_summary("top_by_tickets", contributors_json(&by_tickets)),
  )
}
