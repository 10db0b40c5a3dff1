// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: GitHub REST/GraphQL seam (HTTP with retry, env fixtures, file cache), token discovery, repo validation
// role: integrations/github-api
// inputs: GithubSettings (API URL, token); owner/repo; GraphQL documents + variables; env EM_TEST_GITHUB_* for fixtures
// outputs: JSON arrays for REST listings (all pages) and GraphQL `data` objects
// side_effects: Network calls to the GitHub API; spawns `gh auth token` during discovery; cache files via ResponseCache
// invariants:
// - REST listings follow `Link: rel="next"` until exhausted, per_page=100
// - GraphQL responses with an `errors` array are errors, never partial data
// - Retries only on transport errors and 403/429/5xx gateway statuses; bounded attempts with capped exponential delay
// - Token discovery prefers GITHUB_TOKEN, then GH_TOKEN, then `gh auth token`
// errors: anyhow errors naming the URL/status/body; exhausted retries keep the last cause
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::cell::Cell;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::cache::ResponseCache;
use crate::config::GithubSettings;
use crate::ext::serde_json::JsonFetch;

const USER_AGENT: &str = "eng-metrics";

/// Discover a GitHub token: env vars first, then `gh auth token` if available.
pub fn get_github_token() -> Option<String> {
  for var in ["GITHUB_TOKEN", "GH_TOKEN"] {
    if let Ok(t) = std::env::var(var) {
      if !t.trim().is_empty() {
        return Some(t.trim().to_string());
      }
    }
  }

  if let Ok(output) = std::process::Command::new("gh").args(["auth", "token"]).output() {
    if output.status.success() {
      let t = String::from_utf8_lossy(&output.stdout).trim().to_string();

      if !t.is_empty() {
        return Some(t);
      }
    }
  }

  None
}

static RE_REPO: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+/[A-Za-z0-9._-]+$").expect("repo regex"));

/// Validate `owner/repo` and split it.
pub fn validate_repo_format(full: &str) -> Result<(String, String)> {
  let full = full.trim();

  if full.contains("..") || !RE_REPO.is_match(full) {
    bail!("invalid repository {full:?}: expected owner/repo using letters, digits, '.', '_' or '-'");
  }

  match full.split_once('/') {
    Some((owner, repo)) => Ok((owner.to_string(), repo.to_string())),
    None => bail!("invalid repository {full:?}: expected owner/repo"),
  }
}

/// Extract the `rel="next"` target of a `Link` header.
pub fn next_link(header: &str) -> Option<String> {
  header.split(',').find_map(|part| {
    let mut pieces = part.split(';');
    let target = pieces.next()?.trim();
    let is_next = pieces.any(|p| p.trim() == "rel=\"next\"");

    (is_next && target.starts_with('<') && target.ends_with('>'))
      .then(|| target[1..target.len() - 1].to_string())
  })
}

/// `data` of a GraphQL response, or an error built from its `errors` array.
pub fn graphql_data(resp: Value) -> Result<Value> {
  let errors = resp.fetch("errors").items();

  if !errors.is_empty() {
    let messages: Vec<String> = errors
      .iter()
      .map(|e| e.fetch("message").as_str().unwrap_or("unknown error").to_string())
      .collect();
    bail!("GraphQL error: {}", messages.join("; "));
  }

  match resp.get("data") {
    Some(data) if !data.is_null() => Ok(data.clone()),
    _ => bail!("GraphQL response has no data"),
  }
}

// --- Trait seam for GitHub API ---
pub trait GithubApi {
  fn list_tags(&self, owner: &str, repo: &str) -> Result<Vec<Value>>;
  fn list_pulls(&self, owner: &str, repo: &str, state: &str) -> Result<Vec<Value>>;
  fn list_reviews(&self, owner: &str, repo: &str, number: i64) -> Result<Vec<Value>>;
  fn list_timeline(&self, owner: &str, repo: &str, number: i64) -> Result<Vec<Value>>;
  /// Run a GraphQL document; returns the `data` object.
  fn graphql(&self, query: &str, variables: &Value) -> Result<Value>;
}

/// Follow a GraphQL connection at `connection_path` (e.g. `repository.pullRequests`) page by page.
///
/// `keep_going` sees each page's nodes and may stop pagination early.
pub fn graphql_paginate<F>(
  api: &dyn GithubApi,
  query: &str,
  mut variables: Value,
  connection_path: &str,
  mut keep_going: F,
) -> Result<Vec<Value>>
where
  F: FnMut(&[Value]) -> bool,
{
  let mut out: Vec<Value> = Vec::new();

  loop {
    let data = api.graphql(query, &variables)?;
    let connection = data.fetch(connection_path);
    if !connection.is_present() {
      bail!("GraphQL response is missing {connection_path}");
    }

    let nodes = data.fetch(&format!("{connection_path}.nodes")).items();
    out.extend(nodes.iter().cloned());
    debug!(connection = connection_path, page = nodes.len(), total = out.len(), "graphql page");

    if !keep_going(nodes) {
      break;
    }

    let has_next = data
      .fetch(&format!("{connection_path}.pageInfo.hasNextPage"))
      .to::<bool>()
      .unwrap_or(false);
    let cursor = data
      .fetch(&format!("{connection_path}.pageInfo.endCursor"))
      .to::<String>();

    match (has_next, cursor) {
      (true, Some(c)) => variables["after"] = Value::String(c),
      _ => break,
    }
  }

  Ok(out)
}

/// Retry schedule for rate-limited or flaky calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub attempts: u32,
  pub base: Duration,
  pub cap: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      attempts: 5,
      base: Duration::from_secs(1),
      cap: Duration::from_secs(60),
    }
  }
}

impl RetryPolicy {
  pub fn delay(&self, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    self.base.saturating_mul(factor).min(self.cap)
  }
}

fn is_retryable(status: u16) -> bool {
  matches!(status, 403 | 429 | 502 | 503 | 504)
}

type HttpResponse = ureq::http::Response<ureq::Body>;

pub struct GithubHttpApi {
  api_url: String,
  token: String,
  agent: ureq::Agent,
  retry: RetryPolicy,
}

impl GithubHttpApi {
  pub fn new(api_url: &str, token: String) -> Self {
    Self {
      api_url: api_url.trim_end_matches('/').to_string(),
      token,
      agent: ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(60)))
        .http_status_as_error(false)
        .build()
        .into(),
      retry: RetryPolicy::default(),
    }
  }

  #[cfg(test)]
  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  fn graphql_url(&self) -> String {
    // GitHub Enterprise serves REST at /api/v3 and GraphQL at /api/graphql
    match self.api_url.strip_suffix("/api/v3") {
      Some(host) => format!("{host}/api/graphql"),
      None => format!("{}/graphql", self.api_url),
    }
  }

  fn send<F>(&self, what: &str, mut call: F) -> Result<HttpResponse>
  where
    F: FnMut() -> Result<HttpResponse, ureq::Error>,
  {
    let attempts = self.retry.attempts.max(1);

    for attempt in 0..attempts {
      let last = attempt + 1 == attempts;

      match call() {
        Ok(resp) if is_retryable(resp.status().as_u16()) && !last => {
          let delay = self.retry.delay(attempt);
          warn!(request = what, status = resp.status().as_u16(), delay_ms = delay.as_millis() as u64, "retrying");
          std::thread::sleep(delay);
        }
        Ok(mut resp) => {
          let status = resp.status().as_u16();
          if !(200..300).contains(&status) {
            let body = resp.body_mut().read_to_string().unwrap_or_default();
            bail!("{what} failed: HTTP {status}: {body}");
          }
          return Ok(resp);
        }
        Err(err) if !last => {
          let delay = self.retry.delay(attempt);
          warn!(request = what, error = %err, delay_ms = delay.as_millis() as u64, "retrying");
          std::thread::sleep(delay);
        }
        Err(err) => {
          return Err(anyhow::Error::new(err).context(format!("{what} failed after {attempts} attempts")));
        }
      }
    }

    bail!("{what}: retries exhausted")
  }

  /// GET every page of a REST listing.
  fn get_paginated(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<Value>> {
    let mut out: Vec<Value> = Vec::new();
    let first = format!("{}{}", self.api_url, path);
    let mut next: Option<String> = Some(first.clone());
    let mut is_first = true;

    while let Some(url) = next.take() {
      let what = format!("GET {url}");
      let mut resp = self.send(&what, || {
        let mut req = self
          .agent
          .get(&url)
          .header("Accept", "application/vnd.github+json")
          .header("User-Agent", USER_AGENT)
          .header("Authorization", &format!("Bearer {}", self.token));

        // next links already carry the query string
        if is_first {
          req = req.query("per_page", "100");
          for (k, v) in query {
            req = req.query(*k, *v);
          }
        }
        req.call()
      })?;

      next = resp
        .headers()
        .get("link")
        .and_then(|h| h.to_str().ok())
        .and_then(next_link);
      let page: Value = resp
        .body_mut()
        .read_json()
        .with_context(|| format!("decoding JSON from {url}"))?;

      match page {
        Value::Array(items) => out.extend(items),
        other => bail!("expected a JSON array from {url}, got {}", kind(&other)),
      }
      is_first = false;
    }

    Ok(out)
  }
}

fn kind(v: &Value) -> &'static str {
  match v {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}

impl GithubApi for GithubHttpApi {
  fn list_tags(&self, owner: &str, repo: &str) -> Result<Vec<Value>> {
    self.get_paginated(&format!("/repos/{owner}/{repo}/tags"), &[])
  }

  fn list_pulls(&self, owner: &str, repo: &str, state: &str) -> Result<Vec<Value>> {
    self.get_paginated(
      &format!("/repos/{owner}/{repo}/pulls"),
      &[("state", state), ("sort", "created"), ("direction", "desc")],
    )
  }

  fn list_reviews(&self, owner: &str, repo: &str, number: i64) -> Result<Vec<Value>> {
    self.get_paginated(&format!("/repos/{owner}/{repo}/pulls/{number}/reviews"), &[])
  }

  fn list_timeline(&self, owner: &str, repo: &str, number: i64) -> Result<Vec<Value>> {
    self.get_paginated(&format!("/repos/{owner}/{repo}/issues/{number}/timeline"), &[])
  }

  fn graphql(&self, query: &str, variables: &Value) -> Result<Value> {
    let url = self.graphql_url();
    let body = json!({ "query": query, "variables": variables });
    let what = format!("POST {url}");

    let mut resp = self.send(&what, || {
      self
        .agent
        .post(&url)
        .header("Accept", "application/json")
        .header("User-Agent", USER_AGENT)
        .header("Authorization", &format!("Bearer {}", self.token))
        .send_json(&body)
    })?;

    let parsed: Value = resp
      .body_mut()
      .read_json()
      .with_context(|| format!("decoding JSON from {url}"))?;

    graphql_data(parsed)
  }
}

const ENV_TAGS: &str = "EM_TEST_GITHUB_TAGS_JSON";
const ENV_PULLS: &str = "EM_TEST_GITHUB_PULLS_JSON";
const ENV_REVIEWS: &str = "EM_TEST_GITHUB_REVIEWS_JSON";
const ENV_TIMELINE: &str = "EM_TEST_GITHUB_TIMELINE_JSON";
const ENV_GRAPHQL: &str = "EM_TEST_GITHUB_GRAPHQL_JSON";

/// Fixture backend fed from `EM_TEST_GITHUB_*` variables.
#[derive(Default)]
pub struct GithubEnvApi {
  graphql_served: Cell<usize>,
}

fn env_json(var: &str) -> Result<Option<Value>> {
  match std::env::var(var) {
    Ok(raw) => serde_json::from_str(&raw).map(Some).with_context(|| format!("parsing {var}")),
    Err(_) => Ok(None),
  }
}

fn env_array(var: &str) -> Result<Vec<Value>> {
  match env_json(var)? {
    None => Ok(Vec::new()),
    Some(Value::Array(items)) => Ok(items),
    Some(other) => bail!("{var} must be a JSON array, got {}", kind(&other)),
  }
}

/// Per-PR fixtures: one array for every PR, or an object keyed by PR number.
fn env_per_pull(var: &str, number: i64) -> Result<Vec<Value>> {
  match env_json(var)? {
    None => Ok(Vec::new()),
    Some(Value::Array(items)) => Ok(items),
    Some(Value::Object(map)) => Ok(
      map
        .get(&number.to_string())
        .map(|v| v.fetch("").items().to_vec())
        .unwrap_or_default(),
    ),
    Some(other) => bail!("{var} must be a JSON array or object, got {}", kind(&other)),
  }
}

impl GithubApi for GithubEnvApi {
  fn list_tags(&self, _owner: &str, _repo: &str) -> Result<Vec<Value>> {
    env_array(ENV_TAGS)
  }

  fn list_pulls(&self, _owner: &str, _repo: &str, state: &str) -> Result<Vec<Value>> {
    let pulls = env_array(ENV_PULLS)?;
    if state == "all" {
      return Ok(pulls);
    }

    Ok(
      pulls
        .into_iter()
        .filter(|p| p.fetch("state").as_str().map(|s| s == state).unwrap_or(true))
        .collect(),
    )
  }

  fn list_reviews(&self, _owner: &str, _repo: &str, number: i64) -> Result<Vec<Value>> {
    env_per_pull(ENV_REVIEWS, number)
  }

  fn list_timeline(&self, _owner: &str, _repo: &str, number: i64) -> Result<Vec<Value>> {
    env_per_pull(ENV_TIMELINE, number)
  }

  fn graphql(&self, _query: &str, _variables: &Value) -> Result<Value> {
    let response = match env_json(ENV_GRAPHQL)? {
      None => bail!("{ENV_GRAPHQL} is not set"),
      Some(Value::Array(responses)) => {
        let idx = self.graphql_served.get();
        self.graphql_served.set(idx + 1);
        match responses.get(idx) {
          Some(r) => r.clone(),
          None => bail!("{ENV_GRAPHQL} has no response #{}", idx + 1),
        }
      }
      Some(single) => single,
    };

    // fixtures may omit the {"data": ...} envelope
    if response.get("data").is_some() || response.get("errors").is_some() {
      graphql_data(response)
    } else {
      Ok(response)
    }
  }
}

// --- File cache wrapper ---
// One entry per request (REST listing or GraphQL page), keyed by its parameters.
pub struct GithubCachedApi<'c> {
  inner: Box<dyn GithubApi>,
  cache: &'c ResponseCache,
}

impl<'c> GithubCachedApi<'c> {
  pub fn new(inner: Box<dyn GithubApi>, cache: &'c ResponseCache) -> Self {
    Self { inner, cache }
  }

  fn cached_list<F>(&self, namespace: &str, params: &[(&str, &str)], fetch: F) -> Result<Vec<Value>>
  where
    F: FnOnce() -> Result<Vec<Value>>,
  {
    let key = ResponseCache::key(namespace, params);
    let value = self.cache.get_or_fetch(&key, || fetch().map(Value::Array))?;

    match value {
      Value::Array(items) => Ok(items),
      other => bail!("cache entry {key} holds {} instead of an array", kind(&other)),
    }
  }
}

impl GithubApi for GithubCachedApi<'_> {
  fn list_tags(&self, owner: &str, repo: &str) -> Result<Vec<Value>> {
    self.cached_list("github-tags", &[("owner", owner), ("repo", repo)], || {
      self.inner.list_tags(owner, repo)
    })
  }

  fn list_pulls(&self, owner: &str, repo: &str, state: &str) -> Result<Vec<Value>> {
    self.cached_list(
      "github-pulls",
      &[("owner", owner), ("repo", repo), ("state", state)],
      || self.inner.list_pulls(owner, repo, state),
    )
  }

  fn list_reviews(&self, owner: &str, repo: &str, number: i64) -> Result<Vec<Value>> {
    let n = number.to_string();
    self.cached_list(
      "github-reviews",
      &[("owner", owner), ("repo", repo), ("number", &n)],
      || self.inner.list_reviews(owner, repo, number),
    )
  }

  fn list_timeline(&self, owner: &str, repo: &str, number: i64) -> Result<Vec<Value>> {
    let n = number.to_string();
    self.cached_list(
      "github-timeline",
      &[("owner", owner), ("repo", repo), ("number", &n)],
      || self.inner.list_timeline(owner, repo, number),
    )
  }

  fn graphql(&self, query: &str, variables: &Value) -> Result<Value> {
    let vars = variables.to_string();
    let key = ResponseCache::key("github-graphql", &[("query", query), ("variables", &vars)]);

    self.cache.get_or_fetch(&key, || self.inner.graphql(query, variables))
  }
}

pub fn env_wants_mock() -> bool {
  [ENV_TAGS, ENV_PULLS, ENV_REVIEWS, ENV_TIMELINE, ENV_GRAPHQL]
    .iter()
    .any(|v| std::env::var(v).is_ok())
}

/// Select the backend (fixtures or HTTP) and wrap it with the file cache when enabled.
pub fn build_api<'c>(settings: &GithubSettings, cache: &'c ResponseCache) -> Result<Box<dyn GithubApi + 'c>> {
  let inner: Box<dyn GithubApi> = if env_wants_mock() {
    Box::new(GithubEnvApi::default())
  } else {
    Box::new(GithubHttpApi::new(&settings.api_url, settings.require_token()?))
  };

  if cache.policy().enabled {
    Ok(Box::new(GithubCachedApi::new(inner, cache)))
  } else {
    Ok(inner)
  }
}
