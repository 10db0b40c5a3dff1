use std::path::PathBuf;

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};

use crate::cache::{CachePolicy, RowFiles};
use crate::render::OutputFormat;
use crate::reports::active_repos::DEFAULT_DAYS;
use crate::reports::release_failure::DEFAULT_SUMMARY;
use crate::reports::releases::DEFAULT_TAG_PREFIX;
use crate::util::effective_now;
use crate::window::{WindowSpec, parse_now_override};

#[derive(Parser, Debug)]
#[command(
    name = "eng-metrics",
    version,
    about = "Engineering metrics from Jira and GitHub as console tables, CSV, or JSON",
    long_about = None
)]
pub struct Cli {
  #[command(subcommand)]
  pub command: Option<Command>,

  #[command(flatten)]
  pub window: WindowArgs,

  #[command(flatten)]
  pub cache: CacheArgs,

  /// Output format
  #[arg(long, value_enum, default_value_t = OutputFormat::Table, global = true)]
  pub format: OutputFormat,

  /// Output file ("-" = stdout)
  #[arg(long, default_value = "-", global = true)]
  pub out: String,

  /// IANA zone for window bounds and month bucketing, e.g. America/New_York
  #[arg(long, default_value = "UTC", global = true)]
  pub tz: String,

  /// Debug logging (RUST_LOG overrides)
  #[arg(short, long, global = true)]
  pub verbose: bool,

  /// Log as JSON lines on stderr
  #[arg(long, global = true)]
  pub log_json: bool,

  /// Emit a troff man page to stdout (internal; for packaging)
  #[arg(long, hide = true)]
  pub gen_man: bool,

  /// Override the "now" instant (hidden; tests only)
  #[arg(long = "now-override", hide = true, global = true)]
  pub now_override: Option<String>,
}

/// Report window; the current calendar year when nothing is given.
#[derive(Args, Debug, Clone, Default)]
pub struct WindowArgs {
  /// Calendar year, e.g. 2024
  #[arg(long, global = true)]
  pub year: Option<i32>,

  /// Calendar month, e.g. 2024-08
  #[arg(long, global = true)]
  pub month: Option<String>,

  /// Natural language window, e.g. "last month" or "this quarter"
  #[arg(long = "for", global = true)]
  pub for_phrase: Option<String>,

  /// Window start (YYYY-MM-DD, YYYY/MM/DD, MM/DD/YYYY); must be paired with --until
  #[arg(long, alias = "start-date", global = true)]
  pub since: Option<String>,

  /// Window end; a bare date includes that whole day
  #[arg(long, alias = "end-date", global = true)]
  pub until: Option<String>,

  /// The last N weeks up to now
  #[arg(long, global = true)]
  pub weeks_back: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct CacheArgs {
  /// Directory for cached API responses
  #[arg(long, default_value = ".eng-metrics-cache", global = true)]
  pub cache_dir: PathBuf,

  /// Do not read or write the response cache
  #[arg(long, global = true)]
  pub no_cache: bool,

  /// Ignore cached responses and refetch (may hit rate limits)
  #[arg(long, global = true)]
  pub force_fresh: bool,

  /// Cache entry lifetime in hours (0 = never expires)
  #[arg(long, default_value_t = 8, global = true)]
  pub cache_ttl_hours: u64,

  /// Read the report's raw rows from this JSON file instead of querying the API
  #[arg(long, global = true)]
  pub load_from_file: Option<PathBuf>,

  /// Save the raw rows fetched from the API to this JSON file
  #[arg(long, global = true)]
  pub save_to_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// Business days from code review to release, per team and month (Jira)
  CycleTime,

  /// Debt-reduction and critical work versus product work, per team and month (Jira)
  EngineeringExcellence,

  /// Bugs created, closed, won't do, and open at year end, per project (Jira)
  BugStats {
    /// First year (default: current year)
    #[arg(long)]
    start_year: Option<i32>,

    /// Last year (default: current year)
    #[arg(long)]
    end_year: Option<i32>,
  },

  /// Share of releases rolled back out of Released, per month (Jira)
  ReleaseFailure {
    /// Release ticket key whose rollbacks do not count as failures (repeatable)
    #[arg(long = "exception", value_name = "KEY")]
    exceptions: Vec<String>,

    /// Summary text that identifies release tickets
    #[arg(long, default_value = DEFAULT_SUMMARY)]
    summary: String,
  },

  /// Points and tickets per assignee relative to the team average (Jira)
  Individual {
    /// Team name as it appears in the team field (case-insensitive)
    #[arg(long)]
    team: String,
  },

  /// Release tags per month (GitHub)
  Releases {
    /// Tag prefix followed by YYYY-MM
    #[arg(long, default_value = DEFAULT_TAG_PREFIX)]
    tag_prefix: String,

    /// Repository as owner/name (default: GITHUB_METRIC_OWNER_OR_ORGANIZATION/GITHUB_METRIC_REPO)
    #[arg(long)]
    repo: Option<String>,
  },

  /// Additions and deletions on the default branch, per month (GitHub)
  LinesChanged {
    /// Repository as owner/name
    #[arg(long)]
    repo: Option<String>,
  },

  /// Merge time, CI time, and review stats of approved merged PRs (GitHub)
  PrPerformance {
    /// Repository as owner/name
    #[arg(long)]
    repo: Option<String>,
  },

  /// Time to first review, first approval, and merge per closed PR (GitHub)
  CodeReview {
    /// Repository as owner/name
    #[arg(long)]
    repo: Option<String>,

    /// Process at most N pull requests
    #[arg(long)]
    limit: Option<usize>,
  },

  /// Organisation repositories with recent pull-request activity (GitHub)
  ActiveRepos {
    /// Look-back period in days
    #[arg(long, default_value_t = DEFAULT_DAYS)]
    days: u32,

    /// Only these repositories (comma list; default: GITHUB_METRIC_REPOS)
    #[arg(long, value_delimiter = ',')]
    repos: Vec<String>,

    /// Organisation (default: GITHUB_METRIC_OWNER_OR_ORGANIZATION)
    #[arg(long)]
    org: Option<String>,
  },

  /// Completed tickets and points of chosen epics over recent periods (Jira)
  EpicTracking {
    /// Epic key (repeatable or comma list)
    #[arg(long = "epic", alias = "epics", value_delimiter = ',', value_name = "KEY")]
    epics: Vec<String>,

    /// Select epics by label instead of key (repeatable or comma list)
    #[arg(long = "label", alias = "labels", value_delimiter = ',', value_name = "LABEL")]
    labels: Vec<String>,

    /// Anchor quarter as YYYY-QN (otherwise periods follow --month or --year)
    #[arg(long)]
    quarter: Option<String>,

    /// Number of periods ending at the anchor (default: 4 quarters, 6 months, or 1 year)
    #[arg(long)]
    periods: Option<u32>,
  },

  /// Days from creation to completion of closed bugs, per priority (Jira)
  BugPriority,

  /// Authored pull requests and review activity per developer and month (GitHub)
  DeveloperActivity {
    /// Repository as owner/name
    #[arg(long)]
    repo: Option<String>,

    /// Only these GitHub logins (comma list, case-insensitive)
    #[arg(long, value_delimiter = ',')]
    users: Vec<String>,
  },
}

impl Command {
  pub fn name(&self) -> &'static str {
    match self {
      Command::CycleTime => "cycle-time",
      Command::EngineeringExcellence => "engineering-excellence",
      Command::BugStats { .. } => "bug-stats",
      Command::ReleaseFailure { .. } => "release-failure",
      Command::Individual { .. } => "individual",
      Command::Releases { .. } => "releases",
      Command::LinesChanged { .. } => "lines-changed",
      Command::PrPerformance { .. } => "pr-performance",
      Command::CodeReview { .. } => "code-review",
      Command::ActiveRepos { .. } => "active-repos",
      Command::EpicTracking { .. } => "epic-tracking",
      Command::BugPriority => "bug-priority",
      Command::DeveloperActivity { .. } => "developer-activity",
    }
  }
}

#[derive(Debug, Clone)]
pub struct EffectiveConfig {
  pub command: Command,
  pub window: WindowSpec,
  pub tz: Tz,
  pub now: DateTime<Utc>,
  pub cache: CachePolicy,
  pub rows: RowFiles,
  pub format: OutputFormat,
  pub out: String,
}

fn window_spec(w: &WindowArgs) -> Result<WindowSpec> {
  let selected = [
    w.year.is_some(),
    w.month.is_some(),
    w.for_phrase.is_some(),
    w.since.is_some() || w.until.is_some(),
    w.weeks_back.is_some(),
  ]
  .iter()
  .filter(|s| **s)
  .count();

  if selected > 1 {
    bail!("Ambiguous time selection: choose only one of --year | --month | --for | --since/--until | --weeks-back");
  }

  Ok(match w {
    WindowArgs { year: Some(year), .. } => WindowSpec::Year { year: *year },
    WindowArgs { month: Some(ym), .. } => WindowSpec::Month { ym: ym.clone() },
    WindowArgs { for_phrase: Some(p), .. } => WindowSpec::ForPhrase { phrase: p.clone() },
    WindowArgs { since: Some(s), until: Some(u), .. } => WindowSpec::SinceUntil {
      since: s.clone(),
      until: u.clone(),
    },
    WindowArgs { since: Some(_), .. } | WindowArgs { until: Some(_), .. } => {
      bail!("--since and --until must be used together")
    }
    WindowArgs { weeks_back: Some(weeks), .. } => WindowSpec::WeeksBack { weeks: *weeks },
    _ => WindowSpec::CurrentYear,
  })
}

pub fn normalize(cli: Cli) -> Result<EffectiveConfig> {
  let command = cli
    .command
    .ok_or_else(|| anyhow!("No report selected; run with --help to list the report subcommands"))?;

  let window = window_spec(&cli.window)?;

  if cli.cache.force_fresh && cli.cache.load_from_file.is_some() {
    bail!("--force-fresh cannot be combined with --load-from-file");
  }

  let tz: Tz = cli
    .tz
    .trim()
    .parse()
    .map_err(|e| anyhow!("invalid --tz {:?}: {e}", cli.tz))?;

  let override_now = match cli.now_override.as_deref() {
    Some(raw) => Some(parse_now_override(Some(raw)).ok_or_else(|| anyhow!("invalid --now-override {raw:?}"))?),
    None => None,
  };

  Ok(EffectiveConfig {
    command,
    window,
    tz,
    now: effective_now(override_now),
    cache: CachePolicy {
      dir: cli.cache.cache_dir,
      enabled: !cli.cache.no_cache,
      ttl_hours: cli.cache.cache_ttl_hours,
      force_fresh: cli.cache.force_fresh,
    },
    rows: RowFiles {
      load: cli.cache.load_from_file,
      save: cli.cache.save_to_file,
    },
    format: cli.format,
    out: cli.out,
  })
}
