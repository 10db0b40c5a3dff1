//! Organisation repositories with pull-request activity in the last N days.

use anyhow::{Result, bail};
use chrono::{DateTime, Duration, FixedOffset, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::cache::acquire_rows;
use crate::ext::serde_json::JsonFetch;
use crate::integrations::github_api::graphql_paginate;
use crate::model::{ReportDoc, TableRow};
use crate::reports::RunContext;
use crate::util::parse_timestamp;

pub const DEFAULT_DAYS: u32 = 60;

pub const REPOSITORIES_PATH: &str = "organization.repositories";

pub const REPOSITORIES_QUERY: &str = r#"
query($org: String!, $after: String) {
  organization(login: $org) {
    repositories(first: 100, after: $after, orderBy: {field: PUSHED_AT, direction: DESC}) {
      pageInfo { hasNextPage endCursor }
      nodes {
        name
        pushedAt
        pullRequests(states: [OPEN, CLOSED, MERGED], first: 50, orderBy: {field: UPDATED_AT, direction: DESC}) {
          nodes { updatedAt number createdAt }
          totalCount
        }
        defaultBranchRef { name }
      }
    }
  }
}
"#;

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveRepo {
  pub name: String,
  pub default_branch: String,
  pub last_pr: DateTime<FixedOffset>,
  pub last_push: Option<DateTime<FixedOffset>>,
  pub recent_prs: usize,
  pub total_prs: i64,
}

/// A repository counts as active when it has a default branch and PRs updated at or after `since`.
pub fn activity(repo: &Value, since: DateTime<Utc>) -> Option<ActiveRepo> {
  let name = repo.fetch("name").as_str()?;
  let Some(branch) = repo.fetch("defaultBranchRef.name").as_str() else {
    debug!(repo = name, "skipping repository without a default branch");
    return None;
  };

  let mut recent: Vec<DateTime<FixedOffset>> = repo
    .fetch("pullRequests.nodes")
    .items()
    .iter()
    .filter_map(|pr| pr.fetch("updatedAt").as_str().and_then(parse_timestamp))
    .filter(|updated| *updated >= since)
    .collect();
  recent.sort();

  let last_pr = *recent.last()?;

  Some(ActiveRepo {
    name: name.to_string(),
    default_branch: branch.to_string(),
    last_pr,
    last_push: repo.fetch("pushedAt").as_str().and_then(parse_timestamp),
    recent_prs: recent.len(),
    total_prs: repo.fetch("pullRequests.totalCount").to_or_default(),
  })
}

/// Active repositories, most recent PR first; `only` restricts by name when non-empty.
pub fn select_active(repos: &[Value], since: DateTime<Utc>, only: &[String]) -> Vec<ActiveRepo> {
  let mut active: Vec<ActiveRepo> = repos
    .iter()
    .filter(|r| {
      only.is_empty() || r.fetch("name").as_str().is_some_and(|n| only.iter().any(|o| o == n))
    })
    .filter_map(|r| activity(r, since))
    .collect();

  active.sort_by(|a, b| b.last_pr.cmp(&a.last_pr).then_with(|| a.name.cmp(&b.name)));
  active
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ActiveRepoRow {
  pub name: String,
  pub default_branch: String,
  pub last_pr_date: String,
  pub last_push_date: Option<String>,
  pub recent_prs: usize,
  pub total_prs: i64,
}

impl TableRow for ActiveRepoRow {
  const HEADERS: &'static [&'static str] = &[
    "Repository",
    "Default Branch",
    "Last PR",
    "Last Push",
    "Recent PRs",
    "Total PRs",
  ];

  fn cells(&self) -> Vec<String> {
    vec![
      self.name.clone(),
      self.default_branch.clone(),
      self.last_pr_date.clone(),
      self.last_push_date.clone().unwrap_or_default(),
      self.recent_prs.to_string(),
      self.total_prs.to_string(),
    ]
  }
}

impl ActiveRepoRow {
  pub fn from_active(repo: &ActiveRepo, tz: &Tz) -> Self {
    let day = |t: &DateTime<FixedOffset>| t.with_timezone(tz).format("%Y-%m-%d").to_string();
    Self {
      name: repo.name.clone(),
      default_branch: repo.default_branch.clone(),
      last_pr_date: day(&repo.last_pr),
      last_push_date: repo.last_push.as_ref().map(day),
      recent_prs: repo.recent_prs,
      total_prs: repo.total_prs,
    }
  }
}

pub fn run(ctx: &RunContext, days: u32, repos: &[String], org: Option<&str>) -> Result<ReportDoc> {
  if days == 0 {
    bail!("--days must be at least 1");
  }

  let settings = ctx.github_settings();
  let org = match org {
    Some(o) => o.to_string(),
    None => settings.require_owner()?,
  };
  let only: &[String] = if repos.is_empty() { &settings.repos_filter } else { repos };
  let since = ctx.now - Duration::days(i64::from(days));

  let nodes = acquire_rows(&ctx.rows, || {
    let api = ctx.github_api(&settings)?;
    info!(org = %org, days, "fetching organization repositories");
    graphql_paginate(api.as_ref(), REPOSITORIES_QUERY, json!({ "org": org }), REPOSITORIES_PATH, |_| true)
  })?;

  let active = select_active(&nodes, since, only);
  info!(scanned = nodes.len(), active = active.len(), "active repositories computed");

  let rows: Vec<ActiveRepoRow> = active.iter().map(|r| ActiveRepoRow::from_active(r, &ctx.tz)).collect();

  Ok(
    ctx
      .doc_unranged("active-repos", &rows)?
      .with_summary("organization", org.as_str())
      .with_summary("days", days)
      .with_summary("since", since.to_rfc3339_opts(SecondsFormat::Secs, true))
      .with_summary("active", rows.len())
      .with_summary("scanned", nodes.len()),
  )
}
