// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: File-backed JSON cache for raw API responses plus explicit row dump/load files
// role: storage/cache
// inputs: CachePolicy (dir, ttl, force-fresh); namespace + query parameters; RowFiles paths
// outputs: Cached payloads (serde_json::Value); cache files `<dir>/<namespace>-<hash>.json`
// side_effects: Creates the cache dir; writes via temp file + rename; deletes expired, corrupt, or forced-fresh entries
// invariants:
// - A present entry that is neither expired nor forced-fresh is returned as-is (authoritative for the run)
// - Keys depend only on namespace and the ordered parameter list
// - force_fresh deletes each entry on first touch, then caches the fresh response
// errors: Store failures bubble with path context; unreadable entries degrade to a miss with a warning
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::cell::RefCell;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
  pub dir: PathBuf,
  pub enabled: bool,
  /// Zero means entries never expire.
  pub ttl_hours: u64,
  pub force_fresh: bool,
}

impl Default for CachePolicy {
  fn default() -> Self {
    Self {
      dir: PathBuf::from(".eng-metrics-cache"),
      enabled: true,
      ttl_hours: 8,
      force_fresh: false,
    }
  }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope {
  key: String,
  stored_at: String,
  payload: Value,
}

pub struct ResponseCache {
  policy: CachePolicy,
  now: DateTime<Utc>,
  // entries already purged this run under force_fresh
  refreshed: RefCell<HashSet<String>>,
}

impl ResponseCache {
  pub fn new(policy: CachePolicy, now: DateTime<Utc>) -> Self {
    Self {
      policy,
      now,
      refreshed: RefCell::new(HashSet::new()),
    }
  }

  pub fn policy(&self) -> &CachePolicy {
    &self.policy
  }

  /// Stable key: `<namespace>-<16 hex of sha256(namespace + ordered params)>`.
  pub fn key(namespace: &str, params: &[(&str, &str)]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());

    for (k, v) in params {
      hasher.update(b"\n");
      hasher.update(k.as_bytes());
      hasher.update(b"=");
      hasher.update(v.as_bytes());
    }

    let digest = hex::encode(hasher.finalize());
    format!("{}-{}", sanitize(namespace), &digest[..16])
  }

  pub fn path_for(&self, key: &str) -> PathBuf {
    self.policy.dir.join(format!("{key}.json"))
  }

  pub fn load(&self, key: &str) -> Result<Option<Value>> {
    let path = self.path_for(key);

    if !path.exists() {
      return Ok(None);
    }

    if self.policy.force_fresh && self.refreshed.borrow_mut().insert(key.to_string()) {
      debug!(path = %path.display(), "force-fresh: dropping cache entry");
      remove_quietly(&path);
      return Ok(None);
    }

    let envelope = match read_envelope(&path) {
      Ok(env) => env,
      Err(err) => {
        warn!(path = %path.display(), error = %format!("{err:#}"), "discarding unreadable cache entry");
        remove_quietly(&path);
        return Ok(None);
      }
    };

    if self.is_expired(&envelope) {
      debug!(path = %path.display(), stored_at = %envelope.stored_at, "cache entry expired");
      remove_quietly(&path);
      return Ok(None);
    }

    debug!(path = %path.display(), "cache hit");
    Ok(Some(envelope.payload))
  }

  pub fn store(&self, key: &str, payload: &Value) -> Result<PathBuf> {
    std::fs::create_dir_all(&self.policy.dir)
      .with_context(|| format!("creating cache dir {}", self.policy.dir.display()))?;

    let envelope = CacheEnvelope {
      key: key.to_string(),
      stored_at: self.now.to_rfc3339(),
      payload: payload.clone(),
    };
    let path = self.path_for(key);
    let tmp = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec(&envelope).context("serializing cache entry")?;

    std::fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, &path).with_context(|| format!("renaming {} into place", tmp.display()))?;
    if self.policy.force_fresh {
      self.refreshed.borrow_mut().insert(key.to_string());
    }

    Ok(path)
  }

  pub fn get_or_fetch<F>(&self, key: &str, fetch: F) -> Result<Value>
  where
    F: FnOnce() -> Result<Value>,
  {
    if let Some(hit) = self.load(key)? {
      return Ok(hit);
    }

    let fresh = fetch()?;
    self.store(key, &fresh)?;

    Ok(fresh)
  }

  fn is_expired(&self, envelope: &CacheEnvelope) -> bool {
    if self.policy.ttl_hours == 0 {
      return false;
    }

    let Ok(stored) = DateTime::parse_from_rfc3339(&envelope.stored_at) else {
      return true;
    };
    let age = self.now - stored.with_timezone(&Utc);

    age > Duration::hours(self.policy.ttl_hours as i64)
  }
}

fn sanitize(namespace: &str) -> String {
  namespace
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
    .collect()
}

fn read_envelope(path: &Path) -> Result<CacheEnvelope> {
  let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
  serde_json::from_slice(&data).with_context(|| format!("parsing {}", path.display()))
}

fn remove_quietly(path: &Path) {
  if let Err(err) = std::fs::remove_file(path) {
    warn!(path = %path.display(), error = %err, "could not remove cache entry");
  }
}

/// `--load-from-file` / `--save-to-file` for a report's raw rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFiles {
  pub load: Option<PathBuf>,
  pub save: Option<PathBuf>,
}

/// Rows come from `files.load` when given; otherwise from `fetch`, optionally dumped to `files.save`.
pub fn acquire_rows<F>(files: &RowFiles, fetch: F) -> Result<Vec<Value>>
where
  F: FnOnce() -> Result<Vec<Value>>,
{
  if let Some(path) = &files.load {
    let rows = load_rows(path)?;
    info!(path = %path.display(), rows = rows.len(), "loaded rows from file");
    return Ok(rows);
  }

  let rows = fetch()?;

  if let Some(path) = &files.save {
    save_rows(path, &rows)?;
    info!(path = %path.display(), rows = rows.len(), "saved rows to file");
  }

  Ok(rows)
}

pub fn load_rows(path: &Path) -> Result<Vec<Value>> {
  let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
  let value: Value = serde_json::from_slice(&data).with_context(|| format!("parsing {}", path.display()))?;

  let Value::Array(rows) = value else {
    bail!("{}: expected a JSON array of objects", path.display());
  };
  if let Some(idx) = rows.iter().position(|r| !r.is_object()) {
    bail!("{}: element {idx} is not a JSON object", path.display());
  }

  Ok(rows)
}

pub fn save_rows(path: &Path, rows: &[Value]) -> Result<()> {
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
  }
  let data = serde_json::to_vec_pretty(rows).context("serializing rows")?;
  std::fs::write(path, data).with_context(|| format!("writing {}", path.display()))
}
