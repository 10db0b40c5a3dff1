// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Small shared helpers: date/timestamp parsing, elapsed-time math, name normalization, output files, man page rendering
// role: utilities/helpers
// inputs: Raw date strings from flags and API payloads; paths; clap CommandFactory
// outputs: Parsed dates/instants, durations in hours, written files, man page text
// side_effects: write_output creates parent directories and writes files
// invariants:
// - parse_flexible_date accepts exactly the documented formats and errors otherwise
// - parse_timestamp accepts RFC3339 and Jira's `+0000` offsets
// - write_output("-") writes stdout only
// errors: Malformed dates bubble as anyhow errors naming the input; IO errors carry the path
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use clap::CommandFactory;

/// Date formats accepted for `--since`/`--until`.
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%m-%d-%Y"];

pub fn parse_flexible_date(raw: &str) -> Result<NaiveDate> {
  let trimmed = raw.trim();

  for fmt in DATE_FORMATS {
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
      return Ok(d);
    }
  }

  bail!(
    "invalid date {raw:?}; use one of YYYY-MM-DD, YYYY/MM/DD, MM/DD/YYYY, MM-DD-YYYY"
  )
}

/// Parse API timestamps: RFC3339 (GitHub) or `2024-03-04T10:00:00.000+0000` (Jira).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
  DateTime::parse_from_rfc3339(raw)
    .ok()
    .or_else(|| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z").ok())
}

/// Returns the effective "now" given an optional override.
pub fn effective_now(override_now: Option<DateTime<Utc>>) -> DateTime<Utc> {
  override_now.unwrap_or_else(Utc::now)
}

pub fn hours_between(start: &DateTime<FixedOffset>, end: &DateTime<FixedOffset>) -> f64 {
  (*end - *start).num_seconds() as f64 / 3600.0
}

/// "backend" / "BACKEND" / " Backend " → "Backend".
pub fn capitalize(raw: &str) -> String {
  let lower = raw.trim().to_lowercase();
  let mut chars = lower.chars();

  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}

/// Split a comma list, dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
  raw
    .split(',')
    .map(|s| s.trim())
    .filter(|s| !s.is_empty())
    .map(|s| s.to_string())
    .collect()
}

/// Write rendered output to stdout (`-`) or a file, creating parent directories.
pub fn write_output(out: &str, contents: &str) -> Result<()> {
  if out == "-" {
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    lock.write_all(contents.as_bytes()).context("writing report to stdout")?;
    return Ok(());
  }

  let path = Path::new(out);
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
  }
  std::fs::write(path, contents).with_context(|| format!("writing {}", path.display()))?;

  Ok(())
}

/// Render a section-1 man page for a clap `CommandFactory` implementor.
/// Returns the troff content as a UTF-8 string.
pub fn render_man_page<T: CommandFactory>() -> Result<String> {
  let cmd = T::command();
  let man = clap_mangen::Man::new(cmd);
  let mut buf: Vec<u8> = Vec::new();

  man.render(&mut buf)?;

  Ok(String::from_utf8_lossy(&buf).to_string())
}
