//! Mutators (`spec.md` §4.G): create task, replace body, patch metadata.
//!
//! Grounded on `examples/original_source/scripts/service.py`'s `add_task`,
//! `set_body`, and `meta_update`. Title-derivation and per-field input
//! validation ahead of the forbidden-key/type checks named below are the
//! CLI collaborator's job (§1); the checks here are the ones §4.G assigns
//! to the core directly.

use std::str::FromStr as _;

use serde_json::{json, Map, Value};

use crate::{
    atomic_io,
    error::{Error, Result},
    locator,
    model::{Priority, TaskMetadata},
    paths::PathResolver,
    status,
};

const FORBIDDEN_KEYS: [&str; 5] = ["task_id", "created_at", "updated_at", "status", "title"];

/// Inputs to task creation. `derived` tells the core whether `task_id` was
/// computed from a title (in which case a collision is resolved by
/// appending `-2`, `-3`, …) or supplied explicitly (in which case a
/// collision is a hard [`Error::conflict`]).
pub struct NewTask {
    pub task_id: String,
    pub derived: bool,
    pub status: Option<String>,
    pub tags: Option<Vec<String>>,
    pub assignee: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<String>,
    pub body: String,
}

/// Creates a task, returning the `(status, task_id)` it was actually filed
/// under (the id may differ from the input if a derived id collided).
pub fn create_task(
    paths: &PathResolver,
    project_id: &str,
    statuses: &[String],
    input: NewTask,
    now: &str,
) -> Result<(String, String)> {
    let target_status = match input.status {
        Some(status) => status,
        None => statuses
            .first()
            .cloned()
            .expect("discover_statuses never returns an empty set"),
    };
    if !statuses.iter().any(|s| s == &target_status) {
        return Err(Error::not_found("Status not found")
            .with_details(json!({ "status": target_status })));
    }

    let mut candidate = input.task_id.clone();
    let mut suffix = 2u32;
    loop {
        if !task_id_exists_anywhere(paths, project_id, statuses, &candidate)? {
            break;
        }
        if !input.derived {
            return Err(Error::conflict("Task already exists")
                .with_details(json!({ "task_id": candidate })));
        }
        candidate = format!("{}-{suffix}", input.task_id);
        suffix += 1;
    }

    let body_path = status::body_path(paths, project_id, &target_status, &candidate)?;
    if body_path.exists() {
        return Err(Error::integrity("Body file already exists without an index entry")
            .with_details(json!({ "task_id": candidate, "status": target_status })));
    }

    let mut meta = TaskMetadata::new(candidate.clone(), now);
    meta.tags = input.tags;
    meta.assignee = input.assignee;
    meta.priority = input.priority;
    meta.due_date = input.due_date;

    atomic_io::write_text_atomic(&body_path, &input.body)?;

    let mut index = status::read_index(paths, project_id, &target_status)?;
    index.insert(candidate.clone(), meta.to_value());
    if let Err(err) = status::write_index(paths, project_id, &target_status, &index) {
        let _ = std::fs::remove_file(&body_path);
        return Err(err);
    }

    Ok((target_status, candidate))
}

fn task_id_exists_anywhere(
    paths: &PathResolver,
    project_id: &str,
    statuses: &[String],
    task_id: &str,
) -> Result<bool> {
    for status_name in statuses {
        let index = status::read_index(paths, project_id, status_name)?;
        if index.contains_key(task_id) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Replaces a task's body text, bumping `updated_at`.
pub fn replace_body(
    paths: &PathResolver,
    project_id: &str,
    statuses: &[String],
    task_id: &str,
    text: &str,
    now: &str,
) -> Result<()> {
    let located = locator::locate(paths, project_id, statuses, task_id)?;
    let body_path = status::body_path(paths, project_id, &located.status, task_id)?;
    atomic_io::write_text_atomic(&body_path, text)?;

    let mut meta = located.metadata;
    if let Some(obj) = meta.as_object_mut() {
        obj.insert("updated_at".to_string(), Value::String(now.to_string()));
    }

    let mut index = status::read_index(paths, project_id, &located.status)?;
    index.insert(task_id.to_string(), meta);
    status::write_index(paths, project_id, &located.status, &index)
}

/// A metadata patch: `set` applies verbatim (after validation of the
/// fields the core knows about), `unset` removes keys.
pub struct MetadataPatch {
    pub set: Map<String, Value>,
    pub unset: Vec<String>,
}

pub fn patch_metadata(
    paths: &PathResolver,
    project_id: &str,
    statuses: &[String],
    task_id: &str,
    patch: &MetadataPatch,
    now: &str,
) -> Result<()> {
    for key in patch.set.keys().chain(patch.unset.iter()) {
        if FORBIDDEN_KEYS.contains(&key.as_str()) {
            return Err(Error::validation("Field cannot be modified")
                .with_details(json!({ "field": key })));
        }
    }
    for (key, value) in &patch.set {
        if value.is_null() {
            return Err(invalid(key, "must not be null"));
        }
        validate_known_field(key, value)?;
    }

    let located = locator::locate(paths, project_id, statuses, task_id)?;
    let mut meta = located.metadata;
    let obj = meta
        .as_object_mut()
        .ok_or_else(|| Error::integrity("Metadata must be a JSON object"))?;

    for (key, value) in &patch.set {
        obj.insert(key.clone(), value.clone());
    }
    for key in &patch.unset {
        obj.remove(key);
    }
    obj.insert("updated_at".to_string(), Value::String(now.to_string()));

    let mut index = status::read_index(paths, project_id, &located.status)?;
    index.insert(task_id.to_string(), meta);
    status::write_index(paths, project_id, &located.status, &index)
}

/// Validates the fields `spec.md` §4.G names explicitly. Any other key is
/// an unknown, forward-compatible field and is accepted verbatim.
fn validate_known_field(key: &str, value: &Value) -> Result<()> {
    match key {
        "tags" => {
            let items = value
                .as_array()
                .ok_or_else(|| invalid(key, "must be a list of non-empty strings"))?;
            let all_non_empty_strings = items
                .iter()
                .all(|item| item.as_str().is_some_and(|s| !s.is_empty()));
            if !all_non_empty_strings {
                return Err(invalid(key, "must be a list of non-empty strings"));
            }
        }
        "assignee" => {
            if value.as_str().is_none() {
                return Err(invalid(key, "must be a string"));
            }
        }
        "priority" => {
            let parses = value.as_str().is_some_and(|s| Priority::from_str(s).is_ok());
            if !parses {
                return Err(invalid(key, "must be one of P0, P1, P2, P3"));
            }
        }
        "due_date" => {
            let Some(s) = value.as_str() else {
                return Err(invalid(key, "must be an ISO-8601 date or date-time"));
            };
            let is_date = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok();
            let is_date_time = chrono::DateTime::parse_from_rfc3339(s).is_ok();
            if !is_date && !is_date_time {
                return Err(invalid(key, "must be an ISO-8601 date or date-time"));
            }
        }
        _ => {}
    }
    Ok(())
}

fn invalid(field: &str, reason: &str) -> Error {
    Error::validation(format!("Invalid value for '{field}'"))
        .with_details(json!({ "field": field, "reason": reason }))
}
