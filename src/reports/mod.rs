// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Report dispatch and the per-run context (clock, zone, window, cache, row files) shared by every command
// role: reports/namespace
// inputs: EffectiveConfig from cli::normalize
// outputs: ReportDoc for the selected command
// side_effects: Network/cache IO through the integration seams
// invariants:
// - Each report is independent: fetch (cache/row files) → pure aggregation → ReportDoc
// - Backends are chosen once per run (fixtures when EM_TEST_* is set, HTTP otherwise)
// errors: Configuration, API and parse failures bubble as anyhow errors with context
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

pub mod active_repos;
pub mod bug_priority;
pub mod bug_stats;
pub mod code_review;
pub mod cycle_time;
pub mod developer_activity;
pub mod engineering_excellence;
pub mod epic_tracking;
pub mod individual;
pub mod lines_changed;
pub mod pr_performance;
pub mod release_failure;
pub mod releases;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::cache::{ResponseCache, RowFiles, acquire_rows};
use crate::cli::{Command, EffectiveConfig};
use crate::config::{GithubSettings, JiraSettings};
use crate::integrations::github_api::{self, GithubApi};
use crate::integrations::jira_api::{self, search_all};
use crate::integrations::jira_issue::Issue;
use crate::model::{RangeInfo, ReportDoc, TableRow};
use crate::window::{DateWindow, WindowSpec, resolve};

pub struct RunContext<'c> {
  pub now: DateTime<Utc>,
  pub tz: Tz,
  /// Window options as given, for reports that derive their own periods.
  pub spec: WindowSpec,
  pub window: DateWindow,
  pub cache: &'c ResponseCache,
  pub rows: RowFiles,
}

impl<'c> RunContext<'c> {
  pub fn new(cfg: &EffectiveConfig, cache: &'c ResponseCache) -> Result<Self> {
    let local_now = cfg.now.with_timezone(&cfg.tz).naive_local();
    let window = resolve(&cfg.window, local_now)?;

    Ok(Self {
      now: cfg.now,
      tz: cfg.tz,
      spec: cfg.window.clone(),
      window,
      cache,
      rows: cfg.rows.clone(),
    })
  }

  pub fn generated_at(&self) -> String {
    self.now.to_rfc3339_opts(SecondsFormat::Secs, true)
  }

  pub fn range_info(&self) -> RangeInfo {
    RangeInfo {
      label: self.window.label.clone(),
      start: self.window.start_in(&self.tz).to_rfc3339_opts(SecondsFormat::Secs, false),
      end: self.window.end_in(&self.tz).to_rfc3339_opts(SecondsFormat::Secs, false),
      timezone: self.tz.name().to_string(),
    }
  }

  /// Document for a windowed report.
  pub fn doc<T: Serialize + TableRow>(&self, report: &str, rows: &[T]) -> Result<ReportDoc> {
    ReportDoc::build(report, self.generated_at(), Some(self.range_info()), rows)
  }

  /// Document for a report that ignores the window.
  pub fn doc_unranged<T: Serialize + TableRow>(&self, report: &str, rows: &[T]) -> Result<ReportDoc> {
    ReportDoc::build(report, self.generated_at(), None, rows)
  }

  /// Credentials are only needed when rows will actually be fetched from a live server.
  pub fn jira_settings(&self) -> Result<JiraSettings> {
    JiraSettings::from_env(self.rows.load.is_none() && !jira_api::env_wants_mock())
  }

  /// Raw issues for `jql`, honoring --load-from-file / --save-to-file.
  pub fn jira_rows(&self, settings: &JiraSettings, jql: &str) -> Result<Vec<Value>> {
    acquire_rows(&self.rows, || {
      info!(jql, "querying jira");
      let api = jira_api::build_api(settings, self.cache);
      search_all(api.as_ref(), jql)
    })
  }

  pub fn github_settings(&self) -> GithubSettings {
    GithubSettings::from_env(self.rows.load.is_none() && !github_api::env_wants_mock())
  }

  pub fn github_api(&self, settings: &GithubSettings) -> Result<Box<dyn GithubApi + 'c>> {
    github_api::build_api(settings, self.cache)
  }
}

/// Parse raw issues, logging the ones without a key.
pub fn parse_issues(raw: &[Value], settings: &JiraSettings) -> Vec<Issue> {
  raw
    .iter()
    .filter_map(|v| {
      let parsed = Issue::from_json(v, &settings.fields);
      if parsed.is_none() {
        warn!("skipping jira issue without a key");
      }
      parsed
    })
    .collect()
}

pub fn run(cfg: &EffectiveConfig) -> Result<ReportDoc> {
  let cache = ResponseCache::new(cfg.cache.clone(), cfg.now);
  let ctx = RunContext::new(cfg, &cache)?;

  info!(
    command = cfg.command.name(),
    window = %ctx.window.label,
    tz = ctx.tz.name(),
    "running report"
  );

  match &cfg.command {
    Command::CycleTime => cycle_time::run(&ctx),
    Command::EngineeringExcellence => engineering_excellence::run(&ctx),
    Command::BugStats { start_year, end_year } => bug_stats::run(&ctx, *start_year, *end_year),
    Command::ReleaseFailure { exceptions, summary } => release_failure::run(&ctx, exceptions, summary),
    Command::Individual { team } => individual::run(&ctx, team),
    Command::Releases { tag_prefix, repo } => releases::run(&ctx, tag_prefix, repo.as_deref()),
    Command::LinesChanged { repo } => lines_changed::run(&ctx, repo.as_deref()),
    Command::PrPerformance { repo } => pr_performance::run(&ctx, repo.as_deref()),
    Command::CodeReview { repo, limit } => code_review::run(&ctx, repo.as_deref(), *limit),
    Command::ActiveRepos { days, repos, org } => active_repos::run(&ctx, *days, repos, org.as_deref()),
    Command::EpicTracking { epics, labels, quarter, periods } => {
      epic_tracking::run(&ctx, epics, labels, quarter.as_deref(), *periods)
    }
    Command::BugPriority => bug_priority::run(&ctx),
    Command::DeveloperActivity { repo, users } => developer_activity::run(&ctx, repo.as_deref(), users),
  }
}
