// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Report document shared by every command: typed rows flattened to JSON plus a string table for console/CSV
// role: model/types
// outputs: ReportDoc (serializable), Table (headers + string cells), RangeInfo, TableRow trait
// invariants:
// - rows and table rows are built from the same typed records, in the same order
// - count == rows.len()
// - summary keys serialize alphabetically (serde_json Map)
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};

/// A typed report row that can also be shown as table cells.
pub trait TableRow {
  const HEADERS: &'static [&'static str];

  fn cells(&self) -> Vec<String>;
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RangeInfo {
  pub label: String,
  pub start: String,
  pub end: String,
  pub timezone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
  pub headers: Vec<String>,
  pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportDoc {
  pub report: String,
  pub generated_at: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub range: Option<RangeInfo>,
  pub count: usize,
  pub rows: Vec<Value>,
  pub summary: Map<String, Value>,
  #[serde(skip)]
  pub table: Table,
}

impl ReportDoc {
  pub fn build<T>(report: &str, generated_at: String, range: Option<RangeInfo>, rows: &[T]) -> Result<Self>
  where
    T: Serialize + TableRow,
  {
    let json_rows = rows
      .iter()
      .map(serde_json::to_value)
      .collect::<Result<Vec<Value>, _>>()
      .with_context(|| format!("serializing {report} rows"))?;

    Ok(Self {
      report: report.to_string(),
      generated_at,
      range,
      count: json_rows.len(),
      rows: json_rows,
      summary: Map::new(),
      table: Table {
        headers: T::HEADERS.iter().map(|h| h.to_string()).collect(),
        rows: rows.iter().map(|r| r.cells()).collect(),
      },
    })
  }

  pub fn with_summary(mut self, key: &str, value: impl Into<Value>) -> Self {
    self.summary.insert(key.to_string(), value.into());
    self
  }
}

/// Two-decimal cell text.
pub fn cell2(v: f64) -> String {
  format!("{v:.2}")
}

/// Optional numeric cell; absent values render empty.
pub fn cell_opt(v: Option<f64>) -> String {
  v.map(cell2).unwrap_or_default()
}
