use anyhow::{Context, Result, bail};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_english::{Interval, parse_duration};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use two_timer::{Config as NaturalConfig, parse as parse_natural};

use crate::util::parse_flexible_date;

// Report windows: what the user asked for (`WindowSpec`) and the resolved bounds (`DateWindow`).

/// Covers any gap between the report zone and a Jira profile zone (UTC offsets stay within ±14h).
pub const JQL_PAD_DAYS: i64 = 1;

#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum WindowSpec {
  CurrentYear,
  Year { year: i32 },
  Month { ym: String },
  ForPhrase { phrase: String },
  SinceUntil { since: String, until: String },
  WeeksBack { weeks: u32 },
}

/// Resolved window in report-local wall-clock time; `end` is exclusive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DateWindow {
  pub label: String,
  pub start: NaiveDateTime,
  pub end: NaiveDateTime,
}

impl DateWindow {
  pub fn start_in(&self, tz: &Tz) -> DateTime<Tz> {
    localize(&self.start, tz)
  }

  pub fn end_in(&self, tz: &Tz) -> DateTime<Tz> {
    localize(&self.end, tz)
  }

  /// Whether an instant falls inside `[start, end)` as seen in `tz`.
  pub fn contains<T: TimeZone>(&self, ts: &DateTime<T>, tz: &Tz) -> bool {
    let local = ts.with_timezone(tz).naive_local();
    local >= self.start && local < self.end
  }

  /// Bounds for JQL `during ("...", "...")` clauses, widened by `JQL_PAD_DAYS` on each side.
  ///
  /// Jira reads these in the API user's profile zone rather than the report zone, so the query
  /// over-fetches and callers narrow the result with `contains`.
  pub fn jql_bounds(&self) -> (String, String) {
    let pad = Duration::days(JQL_PAD_DAYS);
    let start = self.start.checked_sub_signed(pad).unwrap_or(self.start);
    let end = self.end.checked_add_signed(pad).unwrap_or(self.end);
    (
      start.format("%Y-%m-%d %H:%M").to_string(),
      end.format("%Y-%m-%d %H:%M").to_string(),
    )
  }

  /// RFC3339 UTC bounds for GitHub `since`/`until` arguments.
  pub fn utc_bounds(&self, tz: &Tz) -> (String, String) {
    (
      self.start_in(tz).with_timezone(&Utc).format("%Y-%m-%dT%H:%M:%SZ").to_string(),
      self.end_in(tz).with_timezone(&Utc).format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    )
  }

  /// `YYYY-MM` keys touched by the window, chronological.
  pub fn months(&self) -> Vec<String> {
    let mut out = Vec::new();
    let mut y = self.start.year();
    let mut m = self.start.month();
    let last = self.end - Duration::seconds(1);

    while (y, m) <= (last.year(), last.month()) {
      out.push(format!("{y:04}-{m:02}"));
      (y, m) = if m == 12 { (y + 1, 1) } else { (y, m + 1) };
    }

    out
  }
}

/// Attach a zone to a wall-clock time; nonexistent local times fall back to their UTC reading.
pub fn localize(naive: &NaiveDateTime, tz: &Tz) -> DateTime<Tz> {
  tz.from_local_datetime(naive)
    .earliest()
    .unwrap_or_else(|| tz.from_utc_datetime(naive))
}

fn first_of_month(y: i32, m: u32) -> Result<NaiveDateTime> {
  NaiveDate::from_ymd_opt(y, m, 1)
    .map(|d| d.and_time(NaiveTime::MIN))
    .with_context(|| format!("invalid month {y:04}-{m:02}"))
}

pub fn year_bounds(year: i32) -> Result<(NaiveDateTime, NaiveDateTime)> {
  Ok((first_of_month(year, 1)?, first_of_month(year + 1, 1)?))
}

pub fn month_bounds(year_month: &str) -> Result<(NaiveDateTime, NaiveDateTime)> {
  let parts: Vec<&str> = year_month.split('-').collect();

  if parts.len() != 2 {
    bail!("invalid --month, expected YYYY-MM");
  }
  let y: i32 = parts[0].parse().context("parsing year in --month")?;
  let m: u32 = parts[1].parse().context("parsing month in --month")?;

  if !(1..=12).contains(&m) {
    bail!("invalid month in --month");
  }
  let (next_y, next_m) = if m == 12 { (y + 1, 1) } else { (y, m + 1) };

  Ok((first_of_month(y, m)?, first_of_month(next_y, next_m)?))
}

/// Resolve a window against `now` (wall-clock time in the report zone).
pub fn resolve(window: &WindowSpec, now: NaiveDateTime) -> Result<DateWindow> {
  let (label, start, end) = match window {
    WindowSpec::CurrentYear => {
      let (s, e) = year_bounds(now.year())?;
      (now.year().to_string(), s, e)
    }
    WindowSpec::Year { year } => {
      let (s, e) = year_bounds(*year)?;
      (year.to_string(), s, e)
    }
    WindowSpec::Month { ym } => {
      let (s, e) = month_bounds(ym)?;
      (ym.clone(), s, e)
    }
    WindowSpec::SinceUntil { since, until } => {
      let start = parse_bound(since, false).with_context(|| format!("parsing --since {since:?}"))?;
      let end = parse_bound(until, true).with_context(|| format!("parsing --until {until:?}"))?;
      (format!("{since}..{until}"), start, end)
    }
    WindowSpec::WeeksBack { weeks } => {
      if *weeks == 0 {
        bail!("--weeks-back must be at least 1");
      }
      let start = shift_back(now, Duration::weeks(i64::from(*weeks)))?;
      (format!("last {weeks} weeks"), start, now)
    }
    WindowSpec::ForPhrase { phrase } => {
      let (s, e) = for_phrase_bounds(phrase, now)?;
      (phrase.trim().to_string(), s, e)
    }
  };

  if start >= end {
    bail!("empty window {label}: start {start} is not before end {end}");
  }

  Ok(DateWindow { label, start, end })
}

/// Date-only `until` bounds are inclusive of that day.
fn parse_bound(raw: &str, inclusive_end: bool) -> Result<NaiveDateTime> {
  if let Ok(ts) = NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%dT%H:%M:%S") {
    return Ok(ts);
  }

  let day = parse_flexible_date(raw)?;
  let day = if inclusive_end { day + Duration::days(1) } else { day };

  Ok(day.and_time(NaiveTime::MIN))
}

/// Parse a `--now-override` string.
/// Accepts RFC3339 (e.g. 2025-08-15T12:00:00Z) or a naive UTC timestamp `%Y-%m-%dT%H:%M:%S`.
pub fn parse_now_override(s: Option<&str>) -> Option<DateTime<Utc>> {
  s.and_then(|raw| {
    DateTime::parse_from_rfc3339(raw)
      .ok()
      .map(|dt| dt.with_timezone(&Utc))
      .or_else(|| {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
          .ok()
          .map(|ndt| ndt.and_utc())
      })
  })
}

// --- Helpers for `--for` parsing ---

/// `now - span`, or an error when the result leaves chrono's representable range.
fn shift_back(now: NaiveDateTime, span: Duration) -> Result<NaiveDateTime> {
  now
    .checked_sub_signed(span)
    .with_context(|| format!("window out of range: {span} before {now}"))
}

fn day_start(dt: NaiveDateTime) -> NaiveDateTime {
  dt.date().and_time(NaiveTime::MIN)
}

fn start_of_week(dt: NaiveDateTime) -> NaiveDateTime {
  let weekday = dt.weekday().num_days_from_monday() as i64;
  day_start(dt - Duration::days(weekday))
}

static RE_LAST_WEEKDAY: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"^last\s+(monday|tuesday|wednesday|thursday|friday|saturday|sunday)$").expect("weekday regex")
});

fn weekday_index(day: &str) -> i64 {
  match day {
    "tuesday" => 1,
    "wednesday" => 2,
    "thursday" => 3,
    "friday" => 4,
    "saturday" => 5,
    "sunday" => 6,
    _ => 0,
  }
}

fn for_phrase_bounds(input: &str, now: NaiveDateTime) -> Result<(NaiveDateTime, NaiveDateTime)> {
  let phrase = input.trim().to_lowercase();

  match phrase.as_str() {
    "today" => return Ok((day_start(now), now)),
    "yesterday" => return Ok((now - Duration::days(1), now)),
    "last week" => return Ok((start_of_week(now - Duration::days(7)), start_of_week(now))),
    "last month" => {
      let (y, m) = if now.month() == 1 { (now.year() - 1, 12) } else { (now.year(), now.month() - 1) };
      return Ok((first_of_month(y, m)?, first_of_month(now.year(), now.month())?));
    }
    "this year" | "year to date" => return Ok((first_of_month(now.year(), 1)?, now)),
    _ => {}
  }

  // last <weekday>: strictly previous occurrence through now
  if let Some(caps) = RE_LAST_WEEKDAY.captures(&phrase) {
    let target_idx = caps.get(1).map(|m| weekday_index(m.as_str())).unwrap_or(0);
    let today = day_start(now);
    let cur_idx = today.weekday().num_days_from_monday() as i64;
    let mut delta_days = cur_idx - target_idx;
    if delta_days <= 0 {
      delta_days += 7;
    }

    return Ok((today - Duration::days(delta_days), now));
  }

  // Durations ("3 weeks ago", "10 days") via chrono-english
  if let Ok(interval) = parse_duration(&phrase) {
    let (start, end) = match interval {
      Interval::Seconds(secs) => (shift_back(now, Duration::seconds(i64::from(secs).abs()))?, now),
      Interval::Days(days) => (shift_back(now, Duration::days(i64::from(days).abs()))?, now),
      Interval::Months(months) => (subtract_months(now, i64::from(months.unsigned_abs()))?, now),
    };

    return Ok((start, end));
  }

  // Natural ranges via two_timer ("last year", "this month", "march 2024")
  if let Ok((start, end, _lit)) = parse_natural(&phrase, Some(NaturalConfig::new().now(now))) {
    let until = if end > now { now } else { end };
    return Ok((start, until));
  }

  bail!("unrecognized --for phrase {input:?}")
}

fn last_day_of_month(year: i32, month: u32) -> Result<u32> {
  let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
  let first_next = first_of_month(ny, nm)?;
  first_next
    .date()
    .pred_opt()
    .map(|d| d.day())
    .context("date underflow computing month length")
}

fn subtract_months(dt: NaiveDateTime, n: i64) -> Result<NaiveDateTime> {
  let total = (i64::from(dt.year()) * 12 + i64::from(dt.month()) - 1) - n;
  let y = i32::try_from(total.div_euclid(12)).context("window out of range")?;
  let m = (total.rem_euclid(12) + 1) as u32;
  let d = dt.day().min(last_day_of_month(y, m)?);

  NaiveDate::from_ymd_opt(y, m, d)
    .and_then(|nd| nd.and_hms_opt(dt.hour(), dt.minute(), dt.second()))
    .with_context(|| format!("subtracting {n} months from {dt}"))
}
