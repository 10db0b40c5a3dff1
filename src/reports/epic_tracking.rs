//! Epic progress: child tickets done versus still open, and how many were completed in each
//! quarter, month or year leading up to an anchor period.

use anyhow::{Context, Result, bail};
use chrono::Datelike;
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::acquire_rows;
use crate::ext::serde_json::JsonFetch;
use crate::integrations::jira_api::{self, search_all};
use crate::integrations::jira_issue::Issue;
use crate::model::{ReportDoc, TableRow, cell2};
use crate::reports::{RunContext, parse_issues};
use crate::stats::{percent, round2};
use crate::window::{DateWindow, WindowSpec, month_bounds, year_bounds};

/// Current statuses that count a child ticket as finished.
pub const DONE_STATUSES: [&str; 3] = ["done", "released", "closed"];

/// Key under which fetched children are stored on each epic row.
pub const CHILDREN_KEY: &str = "children";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpicSelection {
  Keys(Vec<String>),
  Labels(Vec<String>),
}

impl EpicSelection {
  pub fn from_args(keys: &[String], labels: &[String]) -> Result<Self> {
    let keys: Vec<String> = keys.iter().map(|k| k.trim().to_string()).filter(|k| !k.is_empty()).collect();
    let labels: Vec<String> = labels.iter().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect();

    match (keys.is_empty(), labels.is_empty()) {
      (false, true) => Ok(EpicSelection::Keys(keys)),
      (true, false) => Ok(EpicSelection::Labels(labels)),
      (false, false) => bail!("choose epics either by --epic or by --label, not both"),
      (true, true) => bail!("epic-tracking needs --epic KEY[,KEY...] or --label NAME[,NAME...]"),
    }
  }

  pub fn jql(&self) -> String {
    match self {
      EpicSelection::Keys(keys) if keys.len() == 1 => format!("key = {}", keys[0]),
      EpicSelection::Keys(keys) => format!("key in ({})", keys.join(", ")),
      EpicSelection::Labels(labels) if labels.len() == 1 => {
        format!("issuetype = Epic AND labels = {}", quoted(&labels[0]))
      }
      EpicSelection::Labels(labels) => {
        let list: Vec<String> = labels.iter().map(|l| quoted(l.as_str())).collect();
        format!("issuetype = Epic AND labels IN ({})", list.join(", "))
      }
    }
  }
}

fn quoted(raw: &str) -> String {
  format!("\"{}\"", raw.replace('"', "\\\""))
}

pub fn children_jql(epic_key: &str) -> String {
  format!("parent = {epic_key} ORDER BY key ASC")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
  Quarter,
  Month,
  Year,
}

impl Granularity {
  pub fn default_periods(self) -> u32 {
    match self {
      Granularity::Quarter => 4,
      Granularity::Month => 6,
      Granularity::Year => 1,
    }
  }
}

/// The period the timeline ends with: `(granularity, year, quarter or month)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
  pub granularity: Granularity,
  pub year: i32,
  pub index: u32,
}

/// `YYYY-QN` → `(year, quarter)`.
pub fn parse_quarter(raw: &str) -> Result<(i32, u32)> {
  let upper = raw.trim().to_ascii_uppercase();
  let (y, q) = upper
    .split_once("-Q")
    .with_context(|| format!("invalid --quarter {raw:?}, expected YYYY-QN"))?;
  let year: i32 = y.parse().with_context(|| format!("parsing year in --quarter {raw:?}"))?;
  let quarter: u32 = q.parse().with_context(|| format!("parsing quarter in --quarter {raw:?}"))?;

  if !(1..=4).contains(&quarter) {
    bail!("invalid --quarter {raw:?}: quarter must be 1, 2, 3 or 4");
  }
  Ok((year, quarter))
}

/// `--quarter` wins; otherwise the global `--month` or `--year` (or the current year) picks the anchor.
pub fn anchor(quarter: Option<&str>, spec: &WindowSpec, window: &DateWindow) -> Result<Anchor> {
  match (quarter, spec) {
    (Some(q), WindowSpec::CurrentYear) => {
      let (year, index) = parse_quarter(q)?;
      Ok(Anchor { granularity: Granularity::Quarter, year, index })
    }
    (Some(_), _) => bail!("--quarter cannot be combined with another window option"),
    (None, WindowSpec::Month { .. }) => Ok(Anchor {
      granularity: Granularity::Month,
      year: window.start.year(),
      index: window.start.month(),
    }),
    (None, WindowSpec::Year { .. }) | (None, WindowSpec::CurrentYear) => Ok(Anchor {
      granularity: Granularity::Year,
      year: window.start.year(),
      index: 1,
    }),
    (None, _) => bail!("epic-tracking periods come from --quarter, --month or --year"),
  }
}

pub const MAX_PERIODS: u32 = 120;

fn period(granularity: Granularity, year: i64, index: i64) -> Result<DateWindow> {
  let y = i32::try_from(year).context("period out of range")?;

  let (label, start, end) = match granularity {
    Granularity::Quarter => {
      let first = (index - 1) * 3 + 1;
      let (start, _) = month_bounds(&format!("{y:04}-{first:02}"))?;
      let (_, end) = month_bounds(&format!("{y:04}-{:02}", first + 2))?;
      (format!("{y}-Q{index}"), start, end)
    }
    Granularity::Month => {
      let label = format!("{y:04}-{index:02}");
      let (start, end) = month_bounds(&label)?;
      (label, start, end)
    }
    Granularity::Year => {
      let (start, end) = year_bounds(y)?;
      (y.to_string(), start, end)
    }
  };

  Ok(DateWindow { label, start, end })
}

/// The anchor period and the `count - 1` periods before it, oldest first.
pub fn periods(anchor: Anchor, count: u32) -> Result<Vec<DateWindow>> {
  if count == 0 || count > MAX_PERIODS {
    bail!("--periods must be between 1 and {MAX_PERIODS}");
  }

  let per_year: i64 = match anchor.granularity {
    Granularity::Quarter => 4,
    Granularity::Month => 12,
    Granularity::Year => 1,
  };
  let anchor_ordinal = i64::from(anchor.year) * per_year + i64::from(anchor.index) - 1;

  (0..i64::from(count))
    .rev()
    .map(|back| {
      let ordinal = anchor_ordinal - back;
      period(anchor.granularity, ordinal.div_euclid(per_year), ordinal.rem_euclid(per_year) + 1)
    })
    .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completed {
  pub tickets: usize,
  pub points: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpicProgress {
  pub tickets_total: usize,
  pub tickets_done: usize,
  pub points_total: f64,
  pub points_done: f64,
  /// Parallel to the periods passed to `progress`.
  pub completed: Vec<Completed>,
}

pub fn is_done(issue: &Issue) -> bool {
  issue
    .status
    .as_deref()
    .is_some_and(|s| DONE_STATUSES.iter().any(|d| d.eq_ignore_ascii_case(s)))
}

/// Done tickets are credited to the period holding their released (or else done) transition.
pub fn progress(children: &[Issue], periods: &[DateWindow], tz: &Tz) -> EpicProgress {
  let mut out = EpicProgress {
    completed: vec![Completed::default(); periods.len()],
    ..Default::default()
  };

  for child in children {
    out.tickets_total += 1;
    out.points_total += child.story_points;

    if !is_done(child) {
      continue;
    }
    out.tickets_done += 1;
    out.points_done += child.story_points;

    let milestones = child.milestones();
    let Some(completed_at) = milestones.released.or(milestones.done) else {
      debug!(key = %child.key, "done ticket without a completion transition");
      continue;
    };
    if let Some(idx) = periods.iter().position(|p| p.contains(&completed_at, tz)) {
      out.completed[idx].tickets += 1;
      out.completed[idx].points += child.story_points;
    }
  }

  out
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EpicRow {
  pub epic: String,
  pub team: String,
  pub status: String,
  pub period: String,
  pub period_tickets_completed: usize,
  pub period_points_completed: f64,
  pub tickets_total: usize,
  pub tickets_done: usize,
  pub tickets_other: usize,
  pub tickets_pct_done: f64,
  pub points_total: f64,
  pub points_done: f64,
  pub points_other: f64,
  pub points_pct_done: f64,
  pub summary: String,
}

impl TableRow for EpicRow {
  const HEADERS: &'static [&'static str] = &[
    "Epic",
    "Team",
    "Status",
    "Period",
    "Period Tickets",
    "Period Points",
    "Tickets",
    "Done",
    "Other",
    "% Done",
    "Points",
    "Pts Done",
    "Pts Other",
    "Pts % Done",
    "Summary",
  ];

  fn cells(&self) -> Vec<String> {
    vec![
      self.epic.clone(),
      self.team.clone(),
      self.status.clone(),
      self.period.clone(),
      self.period_tickets_completed.to_string(),
      cell2(self.period_points_completed),
      self.tickets_total.to_string(),
      self.tickets_done.to_string(),
      self.tickets_other.to_string(),
      cell2(self.tickets_pct_done),
      cell2(self.points_total),
      cell2(self.points_done),
      cell2(self.points_other),
      cell2(self.points_pct_done),
      self.summary.clone(),
    ]
  }
}

/// One row per period for an epic; totals repeat so every row stands alone.
pub fn epic_rows(epic: &Issue, p: &EpicProgress, periods: &[DateWindow]) -> Vec<EpicRow> {
  periods
    .iter()
    .zip(&p.completed)
    .map(|(window, done)| EpicRow {
      epic: epic.key.clone(),
      team: epic.team.clone(),
      status: epic.status.clone().unwrap_or_default(),
      period: window.label.clone(),
      period_tickets_completed: done.tickets,
      period_points_completed: done.points,
      tickets_total: p.tickets_total,
      tickets_done: p.tickets_done,
      tickets_other: p.tickets_total - p.tickets_done,
      tickets_pct_done: round2(percent(p.tickets_done as f64, p.tickets_total as f64)),
      points_total: p.points_total,
      points_done: p.points_done,
      points_other: p.points_total - p.points_done,
      points_pct_done: round2(percent(p.points_done, p.points_total)),
      summary: epic.summary.clone(),
    })
    .collect()
}

pub fn run(
  ctx: &RunContext,
  keys: &[String],
  labels: &[String],
  quarter: Option<&str>,
  count: Option<u32>,
) -> Result<ReportDoc> {
  let selection = EpicSelection::from_args(keys, labels)?;
  let anchor = anchor(quarter, &ctx.spec, &ctx.window)?;
  let periods = periods(anchor, count.unwrap_or_else(|| anchor.granularity.default_periods()))?;

  let settings = ctx.jira_settings()?;
  let jql = selection.jql();
  let raw = acquire_rows(&ctx.rows, || {
    let api = jira_api::build_api(&settings, ctx.cache);
    info!(jql = %jql, "querying jira epics");
    let mut epics = search_all(api.as_ref(), &jql)?;

    for epic in &mut epics {
      let Some(key) = epic.fetch("key").as_str().map(|k| k.to_string()) else {
        continue;
      };
      let children = search_all(api.as_ref(), &children_jql(&key))?;
      debug!(epic = %key, children = children.len(), "fetched epic children");
      if let Value::Object(map) = epic {
        map.insert(CHILDREN_KEY.to_string(), Value::Array(children));
      }
    }
    Ok(epics)
  })?;

  let mut epics: Vec<(Issue, Vec<Issue>)> = raw
    .iter()
    .filter_map(|v| {
      let Some(epic) = Issue::from_json(v, &settings.fields) else {
        warn!("skipping jira epic without a key");
        return None;
      };
      Some((epic, parse_issues(v.fetch(CHILDREN_KEY).items(), &settings)))
    })
    .collect();
  epics.sort_by(|a, b| (&a.0.team, &a.0.key).cmp(&(&b.0.team, &b.0.key)));

  let mut rows = Vec::new();
  for (epic, children) in &epics {
    let p = progress(children, &periods, &ctx.tz);
    debug!(epic = %epic.key, children = children.len(), done = p.tickets_done, "epic progress");
    rows.extend(epic_rows(epic, &p, &periods));
  }
  info!(epics = epics.len(), periods = periods.len(), "epic tracking computed");

  let labels: Vec<Value> = periods.iter().map(|p| Value::String(p.label.clone())).collect();
  Ok(
    ctx
      .doc_unranged("epic-tracking", &rows)?
      .with_summary("epics", epics.len())
      .with_summary("periods", Value::Array(labels)),
  )
}
