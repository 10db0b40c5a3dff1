//! Lines added and deleted on the default branch, per month.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::cache::acquire_rows;
use crate::ext::serde_json::JsonFetch;
use crate::integrations::github_api::graphql_paginate;
use crate::model::{ReportDoc, TableRow};
use crate::reports::RunContext;
use crate::stats::month_key;
use crate::util::parse_timestamp;
use crate::window::DateWindow;

pub const HISTORY_PATH: &str = "repository.defaultBranchRef.target.history";

pub const HISTORY_QUERY: &str = r#"
query($owner: String!, $name: String!, $since: GitTimestamp!, $until: GitTimestamp!, $after: String) {
  repository(owner: $owner, name: $name) {
    defaultBranchRef {
      target {
        ... on Commit {
          history(since: $since, until: $until, first: 100, after: $after) {
            pageInfo { hasNextPage endCursor }
            nodes { oid committedDate additions deletions }
          }
        }
      }
    }
  }
}
"#;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct LinesRow {
  pub month: String,
  pub commits: usize,
  pub additions: i64,
  pub deletions: i64,
  pub net: i64,
}

impl TableRow for LinesRow {
  const HEADERS: &'static [&'static str] = &["Month", "Commits", "Additions", "Deletions", "Net"];

  fn cells(&self) -> Vec<String> {
    vec![
      self.month.clone(),
      self.commits.to_string(),
      self.additions.to_string(),
      self.deletions.to_string(),
      self.net.to_string(),
    ]
  }
}

/// Bucket commit nodes by committed month; commits outside the window or without a date are dropped.
pub fn aggregate(commits: &[Value], window: &DateWindow, tz: &Tz) -> Vec<LinesRow> {
  let mut by_month: BTreeMap<String, LinesRow> = BTreeMap::new();

  for c in commits {
    let Some(at) = c.fetch("committedDate").as_str().and_then(parse_timestamp) else {
      debug!(oid = c.fetch("oid").as_str().unwrap_or("?"), "commit without committedDate");
      continue;
    };
    if !window.contains(&at, tz) {
      continue;
    }

    let month = month_key(&at, tz);
    let row = by_month.entry(month.clone()).or_insert_with(|| LinesRow { month, ..Default::default() });
    row.commits += 1;
    row.additions += c.fetch("additions").to_or_default::<i64>();
    row.deletions += c.fetch("deletions").to_or_default::<i64>();
    row.net = row.additions - row.deletions;
  }

  by_month.into_values().collect()
}

pub fn run(ctx: &RunContext, repo: Option<&str>) -> Result<ReportDoc> {
  let settings = ctx.github_settings();
  let (owner, name) = settings.require_repo(repo)?;
  let (since, until) = ctx.window.utc_bounds(&ctx.tz);

  let commits = acquire_rows(&ctx.rows, || {
    let api = ctx.github_api(&settings)?;
    info!(owner = %owner, repo = %name, since = %since, until = %until, "fetching default branch history");
    let variables = json!({ "owner": owner, "name": name, "since": since, "until": until });
    graphql_paginate(api.as_ref(), HISTORY_QUERY, variables, HISTORY_PATH, |_| true)
  })?;

  let rows = aggregate(&commits, &ctx.window, &ctx.tz);
  let additions: i64 = rows.iter().map(|r| r.additions).sum();
  let deletions: i64 = rows.iter().map(|r| r.deletions).sum();
  let total_commits: usize = rows.iter().map(|r| r.commits).sum();
  info!(commits = total_commits, additions, deletions, "lines changed computed");

  Ok(
    ctx
      .doc("lines-changed", &rows)?
      .with_summary("repository", format!("{owner}/{name}"))
      .with_summary("commits", total_commits)
      .with_summary("additions", additions)
      .with_summary("deletions", deletions)
      .with_summary("net", additions - deletions),
  )
}
