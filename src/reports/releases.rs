//! Release tags per month, read from the repository's tag list.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::cache::acquire_rows;
use crate::ext::serde_json::JsonFetch;
use crate::model::{ReportDoc, TableRow};
use crate::reports::RunContext;

pub const DEFAULT_TAG_PREFIX: &str = "release-";

/// Matches `<prefix>YYYY-MM...` and captures the month key.
pub fn tag_pattern(prefix: &str) -> Result<Regex> {
  Regex::new(&format!(r"^{}(\d{{4}})-(\d{{2}})", regex::escape(prefix)))
    .with_context(|| format!("building tag pattern for prefix {prefix:?}"))
}

pub fn tag_month(pattern: &Regex, name: &str) -> Option<String> {
  let caps = pattern.captures(name)?;
  let month: u32 = caps[2].parse().ok()?;
  if !(1..=12).contains(&month) {
    return None;
  }
  Some(format!("{}-{:02}", &caps[1], month))
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReleaseRow {
  pub month: String,
  pub count: usize,
  pub names: Vec<String>,
}

impl TableRow for ReleaseRow {
  const HEADERS: &'static [&'static str] = &["Month", "Releases", "Tags"];

  fn cells(&self) -> Vec<String> {
    vec![self.month.clone(), self.count.to_string(), self.names.join(", ")]
  }
}

/// Group tag names by month, keeping only months in `months`; tags inside a month are sorted.
pub fn group_by_month(names: &[&str], pattern: &Regex, months: &[String]) -> Vec<ReleaseRow> {
  let mut by_month: BTreeMap<&str, Vec<String>> = BTreeMap::new();

  for name in names {
    let Some(month) = tag_month(pattern, name) else {
      debug!(tag = *name, "tag does not match release pattern");
      continue;
    };
    if let Some(m) = months.iter().find(|m| **m == month) {
      by_month.entry(m.as_str()).or_default().push(name.to_string());
    }
  }

  by_month
    .into_iter()
    .map(|(month, mut names)| {
      names.sort();
      ReleaseRow { month: month.to_string(), count: names.len(), names }
    })
    .collect()
}

pub fn run(ctx: &RunContext, tag_prefix: &str, repo: Option<&str>) -> Result<ReportDoc> {
  let settings = ctx.github_settings();
  let (owner, name) = settings.require_repo(repo)?;
  let pattern = tag_pattern(tag_prefix)?;

  let tags = acquire_rows(&ctx.rows, || {
    let api = ctx.github_api(&settings)?;
    info!(owner = %owner, repo = %name, "listing tags");
    api.list_tags(&owner, &name)
  })?;

  let names: Vec<&str> = tags.iter().filter_map(|t| t.fetch("name").as_str()).collect();
  let rows = group_by_month(&names, &pattern, &ctx.window.months());
  let total: usize = rows.iter().map(|r| r.count).sum();
  info!(tags = names.len(), releases = total, "releases computed");

  Ok(
    ctx
      .doc("releases", &rows)?
      .with_summary("repository", format!("{owner}/{name}"))
      .with_summary("tag_prefix", tag_prefix)
      .with_summary("total", total),
  )
}
