// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Environment contracts for the Jira and GitHub integrations (.env aware)
// role: configuration/env
// inputs: Process env (optionally seeded from .env via dotenvy); `gh auth token` via token discovery
// outputs: JiraSettings and GithubSettings values
// side_effects: load_dotenv reads ./.env once at startup (existing variables win)
// invariants:
// - All missing required variables are reported together, never one at a time
// - Blank values count as missing
// - Fixture mode (EM_TEST_* present) never requires credentials
// errors: anyhow error listing each missing variable with a description
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use anyhow::{Result, bail};
use tracing::debug;

use crate::integrations::github_api::get_github_token;
use crate::integrations::jira_issue::FieldMap;
use crate::util::split_list;

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Seed the process env from `./.env` when present.
pub fn load_dotenv() {
  match dotenvy::dotenv() {
    Ok(path) => debug!(path = %path.display(), "loaded .env"),
    Err(err) if err.not_found() => {}
    Err(err) => debug!(error = %err, "ignoring unreadable .env"),
  }
}

pub fn env_nonempty(name: &str) -> Option<String> {
  std::env::var(name)
    .ok()
    .map(|v| v.trim().to_string())
    .filter(|v| !v.is_empty())
}

fn missing_error(missing: &[(&str, &str)]) -> anyhow::Error {
  let lines: Vec<String> = missing
    .iter()
    .map(|(name, what)| format!("- {name} ({what})"))
    .collect();
  anyhow::anyhow!("Missing required environment variables:\n{}", lines.join("\n"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JiraSettings {
  pub base_url: String,
  pub email: String,
  pub api_token: String,
  pub projects: Vec<String>,
  pub fields: FieldMap,
}

impl JiraSettings {
  /// `JIRA_PROJECTS` is always required; credentials only when talking to a real server.
  pub fn from_env(credentials_required: bool) -> Result<Self> {
    let mut missing: Vec<(&str, &str)> = Vec::new();

    let base_url = env_nonempty("JIRA_LINK");
    let email = env_nonempty("USER_EMAIL");
    let api_token = env_nonempty("JIRA_API_KEY");
    let projects = env_nonempty("JIRA_PROJECTS").map(|p| split_list(&p)).unwrap_or_default();

    if credentials_required {
      if base_url.is_none() {
        missing.push(("JIRA_LINK", "Jira base URL, e.g. https://example.atlassian.net"));
      }
      if email.is_none() {
        missing.push(("USER_EMAIL", "Jira account email"));
      }
      if api_token.is_none() {
        missing.push(("JIRA_API_KEY", "Jira API token"));
      }
    }
    if projects.is_empty() {
      missing.push(("JIRA_PROJECTS", "comma-separated Jira project keys"));
    }

    if !missing.is_empty() {
      return Err(missing_error(&missing));
    }

    Ok(Self {
      base_url: base_url.unwrap_or_default().trim_end_matches('/').to_string(),
      email: email.unwrap_or_default(),
      api_token: api_token.unwrap_or_default(),
      projects,
      fields: FieldMap::from_env(),
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubSettings {
  pub api_url: String,
  pub token: Option<String>,
  pub owner: Option<String>,
  pub repo: Option<String>,
  pub repos_filter: Vec<String>,
}

impl GithubSettings {
  pub fn from_env(discover_token: bool) -> Self {
    Self {
      api_url: env_nonempty("GITHUB_API_URL")
        .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string())
        .trim_end_matches('/')
        .to_string(),
      token: if discover_token { get_github_token() } else { None },
      owner: env_nonempty("GITHUB_METRIC_OWNER_OR_ORGANIZATION"),
      repo: env_nonempty("GITHUB_METRIC_REPO"),
      repos_filter: env_nonempty("GITHUB_METRIC_REPOS")
        .map(|r| split_list(&r))
        .unwrap_or_default(),
    }
  }

  pub fn require_token(&self) -> Result<String> {
    match &self.token {
      Some(t) => Ok(t.clone()),
      None => Err(missing_error(&[(
        "GITHUB_TOKEN",
        "GitHub token; GH_TOKEN or `gh auth login` also work",
      )])),
    }
  }

  pub fn require_owner(&self) -> Result<String> {
    match &self.owner {
      Some(o) => Ok(o.clone()),
      None => Err(missing_error(&[(
        "GITHUB_METRIC_OWNER_OR_ORGANIZATION",
        "GitHub user or organization that owns the repositories",
      )])),
    }
  }

  /// Owner and repository name, from `--repo owner/name` or the env pair.
  pub fn require_repo(&self, flag: Option<&str>) -> Result<(String, String)> {
    if let Some(full) = flag {
      return crate::integrations::github_api::validate_repo_format(full);
    }

    let mut missing: Vec<(&str, &str)> = Vec::new();
    if self.owner.is_none() {
      missing.push((
        "GITHUB_METRIC_OWNER_OR_ORGANIZATION",
        "GitHub user or organization that owns the repository",
      ));
    }
    if self.repo.is_none() {
      missing.push(("GITHUB_METRIC_REPO", "repository name"));
    }
    if !missing.is_empty() {
      return Err(missing_error(&missing));
    }

    match (&self.owner, &self.repo) {
      (Some(o), Some(r)) => Ok((o.clone(), r.clone())),
      _ => bail!("GitHub repository is not configured"),
    }
  }
}
