//! Input validation and identifier/title transforms: the external
//! collaborator's half of the contract the core places out of its own
//! scope (identifier/date/priority validation, title <-> task-id
//! transformation).

use anyhow::{bail, Result};
use task_tracking_core::identifiers::is_identifier_shaped;

pub fn validate_identifier(kind: &str, value: &str) -> Result<()> {
    if !is_identifier_shaped(value) {
        bail!("{kind} '{value}' must match ^[A-Za-z0-9_-]+$");
    }
    Ok(())
}

/// Trims, collapses internal whitespace, and replaces spaces with
/// underscores — the transform `spec.md` §4.G names for deriving a
/// `task_id` from a title.
#[must_use]
pub fn title_to_task_id(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join("_")
}

/// The inverse transform, used to derive the display `title` from a
/// `task_id` (`spec.md` §3).
#[must_use]
pub fn task_id_to_title(task_id: &str) -> String {
    task_id.replace('_', " ")
}

pub fn validate_priority(value: &str) -> Result<()> {
    if !matches!(value, "P0" | "P1" | "P2" | "P3") {
        bail!("priority must be one of P0, P1, P2, P3");
    }
    Ok(())
}

pub fn validate_due_date(value: &str) -> Result<()> {
    let is_date = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok();
    let is_date_time = chrono::DateTime::parse_from_rfc3339(value).is_ok();
    if !is_date && !is_date_time {
        bail!("due_date must be an ISO-8601 date or date-time");
    }
    Ok(())
}

pub fn validate_tags(tags: &[String]) -> Result<()> {
    if tags.iter().any(String::is_empty) {
        bail!("tags must be non-empty strings");
    }
    Ok(())
}

/// Parses a `key=value` patch argument (`meta-update --set key=value`). The
/// value is parsed as JSON when possible (so `--set tags=["a","b"]` and
/// `--set priority=P1` both work), falling back to a bare string.
pub fn parse_set_arg(arg: &str) -> Result<(String, serde_json::Value)> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("--set expects key=value, got '{arg}'"))?;
    let parsed = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_to_task_id_collapses_whitespace() {
        assert_eq!(title_to_task_id("  fix   the   bug  "), "fix_the_bug");
    }

    #[test]
    fn task_id_to_title_is_the_inverse_for_simple_ids() {
        assert_eq!(task_id_to_title("fix_the_bug"), "fix the bug");
    }

    #[test]
    fn parse_set_arg_prefers_json_then_falls_back_to_string() {
        assert_eq!(parse_set_arg("priority=P1").unwrap().1, serde_json::json!("P1"));
        assert_eq!(
            parse_set_arg("tags=[\"a\",\"b\"]").unwrap().1,
            serde_json::json!(["a", "b"])
        );
    }
}
