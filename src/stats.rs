// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Aggregation primitives shared by every report (median/mean, percentages, business time, month grouping)
// role: aggregation/stats
// inputs: f64 samples; naive local timestamps; group/month keys
// outputs: Option<f64> statistics; seconds; ordered group → month → samples maps
// invariants:
// - Empty samples yield None, never NaN
// - percent/ratio never divide by zero (0.0 instead)
// - business_seconds counts weekdays only, at most BUSINESS_DAY_SECONDS per calendar day
// - Grouped iterates named groups alphabetically with the roll-up last; months ascend
// errors: none (pure)
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, NaiveTime, TimeZone};

/// Roll-up group name used next to per-team groups.
pub const ALL_GROUP: &str = "All";

/// A business day is eight working hours.
pub const BUSINESS_DAY_SECONDS: i64 = 8 * 3600;

pub fn mean(values: &[f64]) -> Option<f64> {
  if values.is_empty() {
    return None;
  }
  Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median with the usual even-length convention (mean of the two middle samples).
pub fn median(values: &[f64]) -> Option<f64> {
  if values.is_empty() {
    return None;
  }

  let mut sorted = values.to_vec();
  sorted.sort_by(|a, b| a.total_cmp(b));

  let mid = sorted.len() / 2;
  if sorted.len() % 2 == 0 {
    Some((sorted[mid - 1] + sorted[mid]) / 2.0)
  } else {
    Some(sorted[mid])
  }
}

pub fn percent(part: f64, whole: f64) -> f64 {
  if whole == 0.0 {
    0.0
  } else {
    part / whole * 100.0
  }
}

/// `value / baseline`, or 0 when the baseline is not positive.
pub fn ratio(value: f64, baseline: f64) -> f64 {
  if baseline <= 0.0 {
    0.0
  } else {
    value / baseline
  }
}

pub fn round2(v: f64) -> f64 {
  (v * 100.0).round() / 100.0
}

/// `YYYY-MM` bucket for an instant, as seen in `tz`.
pub fn month_key<T: TimeZone, Z: TimeZone>(ts: &DateTime<T>, tz: &Z) -> String
where
  Z::Offset: std::fmt::Display,
{
  ts.with_timezone(tz).format("%Y-%m").to_string()
}

/// Leading year of a `YYYY-MM` key.
pub fn year_of_month(month: &str) -> Option<i32> {
  month.get(..4).and_then(|y| y.parse().ok())
}

/// Working seconds between two local timestamps.
///
/// Walks calendar days from `start`. Saturdays and Sundays contribute nothing; every other day
/// contributes the time until 23:59 (or until `end` on the final day), capped at eight hours.
pub fn business_seconds(start: NaiveDateTime, end: NaiveDateTime) -> i64 {
  if end <= start {
    return 0;
  }

  let day_end_time = NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN);
  let mut current = start;
  let mut total = 0i64;

  while current <= end {
    let workday = current.weekday().num_days_from_monday() < 5;

    if current.date() == end.date() {
      if workday {
        total += (end - current).num_seconds().min(BUSINESS_DAY_SECONDS);
      }
      break;
    }

    if workday {
      let day_end = current.date().and_time(day_end_time);
      total += (day_end - current).num_seconds().clamp(0, BUSINESS_DAY_SECONDS);
    }

    current = (current.date() + Duration::days(1)).and_time(NaiveTime::MIN);
  }

  total
}

/// Business days (8h) for a span of business seconds.
pub fn business_days(seconds: i64) -> f64 {
  seconds as f64 / BUSINESS_DAY_SECONDS as f64
}

/// Group key: a named group (team, project, ...) or the roll-up over all of them.
///
/// Derived ordering puts every named group before the roll-up, so a team that happens to be
/// called `All` stays a group of its own.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum GroupKey {
  Named(String),
  All,
}

impl GroupKey {
  pub fn label(&self) -> &str {
    match self {
      GroupKey::Named(name) => name,
      GroupKey::All => ALL_GROUP,
    }
  }
}

/// Samples grouped by `GroupKey` and then by `YYYY-MM`.
#[derive(Debug, Clone)]
pub struct Grouped<T> {
  groups: BTreeMap<GroupKey, BTreeMap<String, Vec<T>>>,
}

impl<T> Default for Grouped<T> {
  fn default() -> Self {
    Self { groups: BTreeMap::new() }
  }
}

impl<T> Grouped<T> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, group: GroupKey, month: &str, value: T) {
    self
      .groups
      .entry(group)
      .or_default()
      .entry(month.to_string())
      .or_default()
      .push(value);
  }

  pub fn is_empty(&self) -> bool {
    self.groups.is_empty()
  }

  /// Groups in presentation order: named groups alphabetically, then the roll-up.
  pub fn ordered(&self) -> impl Iterator<Item = (&GroupKey, &BTreeMap<String, Vec<T>>)> {
    self.groups.iter()
  }
}

impl<T: Clone> Grouped<T> {
  /// Record under the named `group` and under the roll-up.
  pub fn push_with_all(&mut self, group: &str, month: &str, value: T) {
    self.push(GroupKey::Named(group.to_string()), month, value.clone());
    self.push(GroupKey::All, month, value);
  }
}
