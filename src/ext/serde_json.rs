// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Nested JSON fetching via dotted paths (object keys and array indexes) with typed extraction for API payloads
// role: extension/serde_json
// outputs: JsonFetch trait and JsonFetched wrapper (typed extraction, string/number coercion, array iteration)
// invariants: No panics; missing paths yield None; to_or_default returns T::default on failure; items() on non-arrays is empty
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Wrapper around a JSON location to allow typed extraction via a clear second step.
pub struct JsonFetched<'a> {
  inner: Option<&'a Value>,
}

impl<'a> JsonFetched<'a> {
  /// Attempt to deserialize the fetched value as `T`.
  pub fn to<T>(&self) -> Option<T>
  where
    T: DeserializeOwned,
  {
    self.inner.and_then(|v| serde_json::from_value::<T>(v.clone()).ok())
  }

  /// Deserialize as `T`, returning `T::default()` on failure.
  pub fn to_or_default<T>(&self) -> T
  where
    T: DeserializeOwned + Default,
  {
    self.to::<T>().unwrap_or_default()
  }

  /// Borrow the value as a string slice; `null` and non-strings yield None.
  pub fn as_str(&self) -> Option<&'a str> {
    self.inner.and_then(|v| v.as_str())
  }

  /// Numeric view that also accepts numeric strings (Jira story points arrive both ways).
  pub fn as_f64(&self) -> Option<f64> {
    match self.inner? {
      Value::Number(n) => n.as_f64(),
      Value::String(s) => s.trim().parse::<f64>().ok(),
      _ => None,
    }
  }

  /// Array elements at this location, or an empty slice.
  pub fn items(&self) -> &'a [Value] {
    self.inner.and_then(|v| v.as_array()).map(|a| a.as_slice()).unwrap_or(&[])
  }

  pub fn is_present(&self) -> bool {
    self.inner.map(|v| !v.is_null()).unwrap_or(false)
  }

  pub fn value(&self) -> Option<&'a Value> {
    self.inner
  }
}

/// Extension to fetch nested values via dotted paths like "user.login" or "nodes.0.commit".
pub trait JsonFetch {
  fn fetch(&self, path: &str) -> JsonFetched<'_>;
}

impl JsonFetch for Value {
  fn fetch(&self, path: &str) -> JsonFetched<'_> {
    if path.is_empty() {
      return JsonFetched { inner: Some(self) };
    }

    let mut cur = self;

    for key in path.split('.') {
      let next = match cur {
        Value::Array(items) => key.parse::<usize>().ok().and_then(|idx| items.get(idx)),
        _ => cur.get(key),
      };

      match next {
        Some(next) => cur = next,
        None => return JsonFetched { inner: None },
      }
    }

    JsonFetched { inner: Some(cur) }
  }
}
