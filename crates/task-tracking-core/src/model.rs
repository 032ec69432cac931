//! The data model (`spec.md` §3): task metadata records, the transaction
//! record, and the per-status index type.
//!
//! On-disk index entries are read as raw `serde_json::Value`s rather than
//! eagerly deserialized into [`TaskMetadata`] — §4.H's integrity checker
//! needs to distinguish *which* required field is missing from an entry,
//! a distinction a single failed `Deserialize` call would erase. Only the
//! "happy path" mutators (§4.G) construct a [`TaskMetadata`] directly and
//! serialize it in; everything that reads back off disk works at the
//! `serde_json::Value` level, matching
//! `examples/original_source/scripts/service.py`'s treatment of index
//! entries as plain dicts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Per-status index: `task_id -> metadata`. A `BTreeMap` keyed by
/// `task_id` serializes as a JSON object with sorted keys by construction,
/// satisfying §3's determinism requirement without extra bookkeeping.
pub type RawIndex = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
}

impl Priority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::P0 => "P0",
            Priority::P1 => "P1",
            Priority::P2 => "P2",
            Priority::P3 => "P3",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "P0" => Ok(Priority::P0),
            "P1" => Ok(Priority::P1),
            "P2" => Ok(Priority::P2),
            "P3" => Ok(Priority::P3),
            _ => Err(()),
        }
    }
}

/// A well-formed task metadata record, as constructed by the mutators
/// (§4.G) before being serialized into the index. `title` and `status`
/// are derived, never part of this type (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub task_id: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// Forward-compatible extension bag: unknown keys set via
    /// meta-update's `set` round-trip verbatim (§4.G).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TaskMetadata {
    #[must_use]
    pub fn new(task_id: impl Into<String>, now: impl Into<String>) -> Self {
        let now = now.into();
        Self {
            task_id: task_id.into(),
            created_at: now.clone(),
            updated_at: now,
            tags: None,
            assignee: None,
            priority: None,
            due_date: None,
            extra: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("TaskMetadata always serializes")
    }
}

/// The pending-move transaction record at `.tx_move.json` (§3, §4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum TxRecord {
    Move {
        task_id: String,
        from: String,
        to: String,
        updated_meta: serde_json::Value,
    },
}

/// Returns `true` if `value` is a JSON object containing non-empty string
/// values for `task_id`, `created_at`, and `updated_at` (§3 invariant 5),
/// irrespective of whether other fields validate.
#[must_use]
pub fn has_required_fields(value: &serde_json::Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    ["task_id", "created_at", "updated_at"]
        .iter()
        .all(|field| obj.get(*field).and_then(|v| v.as_str()).is_some_and(|s| !s.is_empty()))
}

/// Parses the `updated_at` field as an RFC 3339 timestamp, accepting both
/// the `Z` and `+00:00` offset forms (§6 Timestamp shape). Returns `None`
/// for anything unparseable, letting callers fall back to tie-break rules.
#[must_use]
pub fn parse_updated_at(value: &serde_json::Value) -> Option<chrono::DateTime<chrono::Utc>> {
    let s = value.as_object()?.get("updated_at")?.as_str()?;
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}
