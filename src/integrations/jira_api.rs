// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Jira search seam (HTTP, env fixtures, file cache) and JQL pagination
// role: integrations/jira-api
// inputs: JiraSettings (base URL, email, API token); JQL strings; env EM_TEST_JIRA_ISSUES_JSON for fixtures
// outputs: Raw search pages and flattened issue arrays (serde_json::Value)
// side_effects: Network calls to {JIRA_LINK}/rest/api/3/search; cache files via ResponseCache
// invariants:
// - search_all requests pages of PAGE_SIZE with startAt advancing by PAGE_SIZE; stops on a short or empty page
// - Every request carries expand=changelog so status history is available to reports
// - Fixture mode slices the fixture array exactly like the server would
// errors: Non-2xx responses become errors with status and body; malformed JSON bubbles with URL context
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::time::Duration;

use anyhow::{Context, Result, bail};
use base64::Engine;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::cache::ResponseCache;
use crate::config::JiraSettings;
use crate::ext::serde_json::JsonFetch;

pub const PAGE_SIZE: usize = 100;
const FIXTURE_VAR: &str = "EM_TEST_JIRA_ISSUES_JSON";

// --- Trait seam for Jira search ---
pub trait JiraApi {
  /// One page of `/search` results: `{ "startAt", "maxResults", "total", "issues": [...] }`.
  fn search(&self, jql: &str, start_at: usize, max_results: usize) -> Result<Value>;
}

/// All issues matching `jql`, following `startAt` pagination.
pub fn search_all(api: &dyn JiraApi, jql: &str) -> Result<Vec<Value>> {
  let mut issues: Vec<Value> = Vec::new();
  let mut start_at = 0usize;

  loop {
    let page = api.search(jql, start_at, PAGE_SIZE)?;
    let batch = page.fetch("issues").items();
    let total = page.fetch("total").to::<usize>();

    debug!(start_at, fetched = batch.len(), total = ?total, "jira search page");
    if batch.is_empty() {
      break;
    }

    issues.extend(batch.iter().cloned());
    start_at += PAGE_SIZE;

    if batch.len() < PAGE_SIZE || total.map(|t| issues.len() >= t).unwrap_or(false) {
      break;
    }
  }

  info!(count = issues.len(), "jira search complete");
  Ok(issues)
}

pub struct JiraHttpApi {
  base_url: String,
  auth_header: String,
  agent: ureq::Agent,
}

impl JiraHttpApi {
  pub fn new(settings: &JiraSettings) -> Self {
    let credentials = format!("{}:{}", settings.email, settings.api_token);
    let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);

    Self {
      base_url: settings.base_url.clone(),
      auth_header: format!("Basic {encoded}"),
      agent: ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(60)))
        .http_status_as_error(false)
        .build()
        .into(),
    }
  }
}

impl JiraApi for JiraHttpApi {
  fn search(&self, jql: &str, start_at: usize, max_results: usize) -> Result<Value> {
    let url = format!("{}/rest/api/3/search", self.base_url);

    let mut resp = self
      .agent
      .get(&url)
      .header("Accept", "application/json")
      .header("Authorization", &self.auth_header)
      .query("jql", jql)
      .query("startAt", start_at.to_string())
      .query("maxResults", max_results.to_string())
      .query("expand", "changelog")
      .call()
      .with_context(|| format!("GET {url}"))?;

    let status = resp.status().as_u16();
    if !(200..300).contains(&status) {
      let body = resp.body_mut().read_to_string().unwrap_or_default();
      bail!("Jira search failed: HTTP {status} from {url}: {body}");
    }

    resp
      .body_mut()
      .read_json::<Value>()
      .with_context(|| format!("decoding JSON from {url}"))
  }
}

/// Fixture backend: an array of issues served for every JQL, or an object whose keys are matched
/// as substrings of the JQL (first match wins).
pub struct JiraEnvApi;

impl JiraEnvApi {
  fn issues_for(jql: &str) -> Result<Vec<Value>> {
    let raw = std::env::var(FIXTURE_VAR).with_context(|| format!("{FIXTURE_VAR} is not set"))?;
    let parsed: Value = serde_json::from_str(&raw).with_context(|| format!("parsing {FIXTURE_VAR}"))?;

    match parsed {
      Value::Array(items) => Ok(items),
      Value::Object(map) => Ok(
        map
          .iter()
          .find(|(needle, _)| jql.contains(needle.as_str()))
          .map(|(_, v)| v.fetch("").items().to_vec())
          .unwrap_or_default(),
      ),
      _ => bail!("{FIXTURE_VAR} must be a JSON array or object"),
    }
  }
}

impl JiraApi for JiraEnvApi {
  fn search(&self, jql: &str, start_at: usize, max_results: usize) -> Result<Value> {
    let all = Self::issues_for(jql)?;
    let page: Vec<Value> = all.iter().skip(start_at).take(max_results).cloned().collect();

    Ok(json!({
      "startAt": start_at,
      "maxResults": max_results,
      "total": all.len(),
      "issues": page,
    }))
  }
}

// --- File cache wrapper ---
// One entry per page, keyed by (jql, startAt, maxResults).
pub struct JiraCachedApi<'c> {
  inner: Box<dyn JiraApi>,
  cache: &'c ResponseCache,
}

impl<'c> JiraCachedApi<'c> {
  pub fn new(inner: Box<dyn JiraApi>, cache: &'c ResponseCache) -> Self {
    Self { inner, cache }
  }
}

impl JiraApi for JiraCachedApi<'_> {
  fn search(&self, jql: &str, start_at: usize, max_results: usize) -> Result<Value> {
    let start = start_at.to_string();
    let max = max_results.to_string();
    let key = ResponseCache::key(
      "jira-search",
      &[("jql", jql), ("startAt", &start), ("maxResults", &max)],
    );

    self
      .cache
      .get_or_fetch(&key, || self.inner.search(jql, start_at, max_results))
  }
}

pub fn env_wants_mock() -> bool {
  std::env::var(FIXTURE_VAR).is_ok()
}

/// Select the backend (fixtures or HTTP) and wrap it with the file cache when enabled.
pub fn build_api<'c>(settings: &JiraSettings, cache: &'c ResponseCache) -> Box<dyn JiraApi + 'c> {
  let inner: Box<dyn JiraApi> = if env_wants_mock() {
    Box::new(JiraEnvApi)
  } else {
    Box::new(JiraHttpApi::new(settings))
  };

  if cache.policy().enabled {
    Box::new(JiraCachedApi::new(inner, cache))
  } else {
    inner
  }
}

/// `project in (A, B)` clause.
pub fn project_clause(projects: &[String]) -> String {
  format!("project in ({})", projects.join(", "))
}
