// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Typed view over Jira issue JSON (team, work type, points, priority, links, status changelog) and milestone extraction
// role: integrations/jira-model
// inputs: Raw issue JSON from /rest/api/3/search with expand=changelog; FieldMap custom field ids
// outputs: Issue values with chronological StatusChange lists; Milestones (review start, released, done)
// invariants:
// - status_changes are sorted oldest → newest regardless of API order
// - Review start is the FIRST entry into a code-review status; released/done are the LAST entries into those statuses
// - Missing team falls back to the project key; both are capitalized
// - Missing or non-numeric points count as 0
// errors: Unparseable issues (no key) yield None; unparseable history timestamps are skipped
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use chrono::{DateTime, FixedOffset};
use serde_json::Value;

use crate::config::env_nonempty;
use crate::ext::serde_json::JsonFetch;
use crate::util::{capitalize, parse_timestamp};

/// Statuses that mark a ticket as ready for code review.
pub const CODE_REVIEW_STATUSES: [&str; 6] = [
  "code review",
  "in code review",
  "to review",
  "to code review",
  "in review",
  "in design review",
];

pub const RELEASED_STATUS: &str = "released";
pub const DONE_STATUS: &str = "done";

/// Custom field ids for the values Jira instances model differently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
  pub team: Option<String>,
  pub work_type: Option<String>,
  pub points: Option<String>,
  /// Bug priority field; the built-in `priority` is used when unset.
  pub bug_priority: Option<String>,
}

impl FieldMap {
  pub fn from_env() -> Self {
    Self {
      team: env_nonempty("JIRA_TEAM_FIELD").map(|f| normalize_field_id(&f)),
      work_type: env_nonempty("JIRA_WORK_TYPE_FIELD").map(|f| normalize_field_id(&f)),
      points: env_nonempty("JIRA_POINTS_FIELD").map(|f| normalize_field_id(&f)),
      bug_priority: env_nonempty("JIRA_BUG_PRIORITY_FIELD").map(|f| normalize_field_id(&f)),
    }
  }

  /// JQL reference to the bug priority field: `cf[10042]` for custom fields.
  pub fn bug_priority_jql(&self) -> String {
    match self.bug_priority.as_deref() {
      Some(id) => match id.strip_prefix("customfield_") {
        Some(num) => format!("cf[{num}]"),
        None => id.to_string(),
      },
      None => "priority".to_string(),
    }
  }
}

/// `10075` → `customfield_10075`; anything else is used verbatim.
pub fn normalize_field_id(raw: &str) -> String {
  let raw = raw.trim();
  if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
    format!("customfield_{raw}")
  } else {
    raw.to_string()
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
  pub at: DateTime<FixedOffset>,
  pub from: Option<String>,
  pub to: Option<String>,
}

impl StatusChange {
  fn enters(&self, status: &str) -> bool {
    self.to.as_deref().map(|s| s.eq_ignore_ascii_case(status)).unwrap_or(false)
  }

  fn leaves(&self, status: &str) -> bool {
    self.from.as_deref().map(|s| s.eq_ignore_ascii_case(status)).unwrap_or(false) && !self.enters(status)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
  pub key: String,
  pub project_key: String,
  pub issue_type: String,
  pub summary: String,
  /// Current workflow status name.
  pub status: Option<String>,
  pub created: Option<DateTime<FixedOffset>>,
  pub priority: Option<String>,
  pub assignee: Option<String>,
  pub team: String,
  pub work_type: Option<String>,
  pub story_points: f64,
  pub outward_links: Vec<String>,
  pub status_changes: Vec<StatusChange>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Milestones {
  pub review_start: Option<DateTime<FixedOffset>>,
  pub released: Option<DateTime<FixedOffset>>,
  pub done: Option<DateTime<FixedOffset>>,
}

/// Display text of a Jira field: select options (`{"value": ..}`), named objects, plain strings,
/// or the first element of a multi-select.
fn field_text(v: &Value) -> Option<String> {
  let text = match v {
    Value::String(s) => Some(s.clone()),
    Value::Object(_) => v
      .fetch("value")
      .as_str()
      .or_else(|| v.fetch("name").as_str())
      .map(|s| s.to_string()),
    Value::Array(items) => items.first().and_then(field_text),
    _ => None,
  }?;

  let trimmed = text.trim();
  (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn custom_field<'a>(v: &'a Value, id: &Option<String>) -> Option<&'a Value> {
  id.as_ref().and_then(|f| v.fetch(&format!("fields.{f}")).value())
}

impl Issue {
  pub fn from_json(v: &Value, fields: &FieldMap) -> Option<Issue> {
    let key = v.fetch("key").as_str()?.to_string();
    let project_key = v
      .fetch("fields.project.key")
      .as_str()
      .map(|s| s.to_string())
      .or_else(|| key.split('-').next().map(|s| s.to_string()))
      .unwrap_or_default();

    let team = custom_field(v, &fields.team)
      .and_then(field_text)
      .map(|t| capitalize(&t))
      .unwrap_or_else(|| capitalize(&project_key));
    let work_type = custom_field(v, &fields.work_type).and_then(field_text);
    let story_points = fields
      .points
      .as_ref()
      .and_then(|f| v.fetch(&format!("fields.{f}")).as_f64())
      .unwrap_or(0.0);

    let priority = match &fields.bug_priority {
      Some(_) => custom_field(v, &fields.bug_priority).and_then(field_text),
      None => v.fetch("fields.priority").value().and_then(field_text),
    };

    let outward_links = v
      .fetch("fields.issuelinks")
      .items()
      .iter()
      .filter_map(|link| link.fetch("outwardIssue.key").as_str().map(|s| s.to_string()))
      .collect();

    Some(Issue {
      key,
      project_key,
      issue_type: v.fetch("fields.issuetype.name").to_or_default::<String>(),
      summary: v.fetch("fields.summary").to_or_default::<String>(),
      status: v.fetch("fields.status.name").as_str().map(|s| s.trim().to_string()),
      created: v.fetch("fields.created").as_str().and_then(parse_timestamp),
      priority,
      assignee: v.fetch("fields.assignee.displayName").as_str().map(|s| s.to_string()),
      team,
      work_type,
      story_points,
      outward_links,
      status_changes: status_changes(v),
    })
  }

  pub fn milestones(&self) -> Milestones {
    let mut out = Milestones::default();

    for change in &self.status_changes {
      if out.review_start.is_none() && CODE_REVIEW_STATUSES.iter().any(|s| change.enters(s)) {
        out.review_start = Some(change.at);
      }
      if change.enters(RELEASED_STATUS) {
        out.released = Some(change.at);
      }
      if change.enters(DONE_STATUS) {
        out.done = Some(change.at);
      }
    }

    out
  }

  /// Release events in order; an event fails when the ticket later leaves Released.
  pub fn release_events(&self) -> Vec<ReleaseEvent> {
    let mut events: Vec<ReleaseEvent> = Vec::new();

    for change in &self.status_changes {
      if change.enters(RELEASED_STATUS) {
        events.push(ReleaseEvent {
          at: change.at,
          failed: false,
        });
      } else if change.leaves(RELEASED_STATUS) {
        if let Some(last) = events.last_mut() {
          last.failed = true;
        }
      }
    }

    events
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReleaseEvent {
  pub at: DateTime<FixedOffset>,
  pub failed: bool,
}

fn status_changes(v: &Value) -> Vec<StatusChange> {
  let mut out: Vec<StatusChange> = Vec::new();

  for history in v.fetch("changelog.histories").items() {
    let Some(at) = history.fetch("created").as_str().and_then(parse_timestamp) else {
      continue;
    };

    for item in history.fetch("items").items() {
      let is_status = item
        .fetch("field")
        .as_str()
        .map(|f| f.eq_ignore_ascii_case("status"))
        .unwrap_or(false);
      if !is_status {
        continue;
      }

      out.push(StatusChange {
        at,
        from: item.fetch("fromString").as_str().map(|s| s.to_string()),
        to: item.fetch("toString").as_str().map(|s| s.to_string()),
      });
    }
  }

  out.sort_by_key(|c| c.at);
  out
}
