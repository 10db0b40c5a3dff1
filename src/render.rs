// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Render a ReportDoc as an aligned console table, CSV, or pretty JSON and write it to stdout or a file
// role: rendering/output
// inputs: ReportDoc, OutputFormat, --out target
// outputs: Text written via util::write_output
// side_effects: Writes stdout or the --out file
// invariants:
// - table: header, dashed rule, rows, then `key: value` summary lines
// - csv: header + rows only (summary omitted)
// - json: the whole document, pretty-printed, trailing newline
// errors: CSV/JSON serialization and IO errors bubble with context
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use anyhow::{Context, Result, anyhow};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::model::ReportDoc;
use crate::util::write_output;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
  Table,
  Csv,
  Json,
}

pub fn render(doc: &ReportDoc, format: OutputFormat) -> Result<String> {
  match format {
    OutputFormat::Table => Ok(render_table(doc)),
    OutputFormat::Csv => render_csv(doc),
    OutputFormat::Json => render_json(doc),
  }
}

pub fn emit(doc: &ReportDoc, format: OutputFormat, out: &str) -> Result<()> {
  let text = render(doc, format)?;
  write_output(out, &text)?;

  if out != "-" {
    info!(path = out, report = %doc.report, rows = doc.count, "wrote report");
  }

  Ok(())
}

fn render_json(doc: &ReportDoc) -> Result<String> {
  let mut text = serde_json::to_string_pretty(doc).context("serializing report JSON")?;
  text.push('\n');
  Ok(text)
}

fn render_csv(doc: &ReportDoc) -> Result<String> {
  let mut writer = csv::Writer::from_writer(Vec::new());

  writer.write_record(&doc.table.headers).context("writing CSV header")?;
  for row in &doc.table.rows {
    writer.write_record(row).context("writing CSV row")?;
  }

  let bytes = writer
    .into_inner()
    .map_err(|e| anyhow!("flushing CSV: {}", e.error()))?;

  String::from_utf8(bytes).context("CSV output is not UTF-8")
}

fn render_table(doc: &ReportDoc) -> String {
  let headers = &doc.table.headers;
  let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();

  for row in &doc.table.rows {
    for (idx, cell) in row.iter().enumerate() {
      if let Some(w) = widths.get_mut(idx) {
        *w = (*w).max(cell.chars().count());
      }
    }
  }

  let mut out = String::new();
  if let Some(range) = &doc.range {
    out.push_str(&format!("{} ({} .. {}, {})\n\n", doc.report, range.start, range.end, range.timezone));
  } else {
    out.push_str(&format!("{}\n\n", doc.report));
  }

  out.push_str(&format_line(headers, &widths));
  let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
  out.push_str(&format_line(&rule, &widths));

  if doc.table.rows.is_empty() {
    out.push_str("(no rows)\n");
  }
  for row in &doc.table.rows {
    out.push_str(&format_line(row, &widths));
  }

  if !doc.summary.is_empty() {
    out.push('\n');
    for (key, value) in &doc.summary {
      out.push_str(&format!("{key}: {}\n", display_value(value)));
    }
  }

  out
}

fn format_line(cells: &[String], widths: &[usize]) -> String {
  let last = cells.len().saturating_sub(1);
  let parts: Vec<String> = cells
    .iter()
    .enumerate()
    .map(|(idx, cell)| {
      if idx == last {
        cell.clone()
      } else {
        let width = widths.get(idx).copied().unwrap_or(0);
        format!("{cell:<width$}")
      }
    })
    .collect();

  format!("{}\n", parts.join("  ").trim_end())
}

/// Human text for summary values: strings unquoted, lists comma-joined, objects as `k=v`.
fn display_value(value: &Value) -> String {
  match value {
    Value::Null => "-".to_string(),
    Value::String(s) => s.clone(),
    Value::Number(n) => match n.as_f64() {
      Some(f) if n.is_f64() => format!("{f:.2}"),
      _ => n.to_string(),
    },
    Value::Array(items) => items.iter().map(display_value).collect::<Vec<_>>().join(", "),
    Value::Object(map) => map
      .iter()
      .map(|(k, v)| format!("{k}={}", display_value(v)))
      .collect::<Vec<_>>()
      .join(" "),
    other => other.to_string(),
  }
}
