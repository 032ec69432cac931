//! Integrity Checker/Repairer (`spec.md` §4.H).
//!
//! Grounded on `examples/original_source/scripts/service.py`'s
//! `integrity_check`, which this module follows phase for phase: preface
//! transaction recovery, load indexes, resolve cross-status duplicates,
//! per-entry field checks, orphan-body adoption, missing-status-dir
//! detection.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};

use crate::{
    atomic_io,
    clock,
    error::Result,
    identifiers,
    model::{self, RawIndex},
    paths::PathResolver,
    status, transaction,
};

#[derive(Debug, Default)]
pub struct IntegrityReport {
    pub ok: bool,
    pub project_id: String,
    pub recovered: bool,
    pub fixed: Vec<String>,
    pub issues: Vec<String>,
    pub found: Vec<String>,
}

/// Runs the integrity scan over `statuses` (the project's already
/// discovered status set). Transaction recovery always runs regardless of
/// `fix`, since a pending move being rolled forward is a correctness
/// requirement, not an optional repair (§8 invariant 4). All other phases
/// only mutate on-disk state when `fix` is `true`.
pub fn check(
    paths: &PathResolver,
    project_id: &str,
    statuses: &[String],
    fix: bool,
) -> Result<IntegrityReport> {
    let span = tracing::info_span!("integrity_check", project_id = %project_id, fix);
    let _enter = span.enter();

    let mut found = Vec::new();
    let mut fixed = Vec::new();
    let mut issues = Vec::new();

    let recovered = transaction::recover(paths, project_id, statuses)?;

    let mut indexes: HashMap<String, RawIndex> = HashMap::new();
    let mut usable_statuses: Vec<String> = Vec::new();
    let mut dirty_statuses: HashSet<String> = HashSet::new();

    // Phase 1: load indexes.
    for status_name in statuses {
        let dir = status::status_dir(paths, project_id, status_name)?;
        if !dir.is_dir() {
            found.push(format!("STATUS_DIR_MISSING:{status_name}"));
            issues.push(format!("STATUS_DIR_MISSING:{status_name}"));
            continue;
        }

        match status::try_read_index(paths, project_id, status_name) {
            status::IndexRead::Ok(index) => {
                indexes.insert(status_name.clone(), index);
                usable_statuses.push(status_name.clone());
            }
            status::IndexRead::Missing if fix => {
                indexes.insert(status_name.clone(), RawIndex::new());
                usable_statuses.push(status_name.clone());
                dirty_statuses.insert(status_name.clone());
                found.push(format!("INDEX_CREATED:{status_name}"));
                fixed.push(format!("INDEX_CREATED:{status_name}"));
            }
            status::IndexRead::Missing | status::IndexRead::Invalid(_) => {
                found.push(format!("INDEX_ERROR:{status_name}"));
                issues.push(format!("INDEX_ERROR:{status_name}"));
            }
        }
    }

    // Phase 2: cross-status duplicates.
    let mut holders_by_task: HashMap<String, Vec<String>> = HashMap::new();
    for status_name in &usable_statuses {
        for task_id in indexes[status_name].keys() {
            holders_by_task
                .entry(task_id.clone())
                .or_default()
                .push(status_name.clone());
        }
    }

    let mut duplicate_ids: Vec<String> = holders_by_task
        .iter()
        .filter(|(_, holders)| holders.len() > 1)
        .map(|(task_id, _)| task_id.clone())
        .collect();
    duplicate_ids.sort();

    for task_id in duplicate_ids {
        let holders = holders_by_task[&task_id].clone();
        if !fix {
            found.push(format!("DUPLICATE:{task_id}"));
            issues.push(format!("DUPLICATE:{task_id}"));
            continue;
        }

        let winner = pick_duplicate_winner(&indexes, &holders, &task_id, &usable_statuses);
        for status_name in &holders {
            if status_name != &winner {
                indexes.get_mut(status_name).expect("holder present").remove(&task_id);
                dirty_statuses.insert(status_name.clone());
            }
        }
        found.push(format!("DUPLICATE_RESOLVED:{task_id}"));
        fixed.push(format!("DUPLICATE_RESOLVED:{task_id}"));

        let winner_body = status::body_path(paths, project_id, &winner, &task_id)?;
        if !winner_body.exists() {
            for status_name in &holders {
                if status_name == &winner {
                    continue;
                }
                let candidate_body = status::body_path(paths, project_id, status_name, &task_id)?;
                if candidate_body.exists() {
                    std::fs::rename(&candidate_body, &winner_body)?;
                    found.push(format!("BODY_MOVED_FROM_DUPLICATE:{task_id}"));
                    fixed.push(format!("BODY_MOVED_FROM_DUPLICATE:{task_id}"));
                    break;
                }
            }
        }
    }

    // Phase 3: per-entry checks.
    for status_name in &usable_statuses {
        let task_ids: Vec<String> = indexes[status_name].keys().cloned().collect();
        for task_id in task_ids {
            let mut meta = indexes[status_name][&task_id].clone();
            let mut entry_mutated = false;

            if !meta.is_object() {
                let now = clock::now_rfc3339();
                meta = json!({ "task_id": task_id, "created_at": now.clone(), "updated_at": now });
                found.push(format!("META_REPLACED:{task_id}"));
                if fix {
                    fixed.push(format!("META_REPLACED:{task_id}"));
                    entry_mutated = true;
                } else {
                    issues.push(format!("META_REPLACED:{task_id}"));
                }
            } else {
                let obj = meta.as_object_mut().expect("checked is_object");

                if obj.get("task_id").and_then(Value::as_str) != Some(task_id.as_str()) {
                    found.push(format!("TASK_ID_FIXED:{task_id}"));
                    if fix {
                        obj.insert("task_id".to_string(), Value::String(task_id.clone()));
                        fixed.push(format!("TASK_ID_FIXED:{task_id}"));
                        entry_mutated = true;
                    } else {
                        issues.push(format!("TASK_ID_FIXED:{task_id}"));
                    }
                }

                for field in ["task_id", "created_at", "updated_at"] {
                    if !field_present(obj.get(field)) {
                        found.push(format!("FIELD_FILLED:{task_id}:{field}"));
                        if fix {
                            let fill = if field == "task_id" {
                                task_id.clone()
                            } else {
                                clock::now_rfc3339()
                            };
                            obj.insert(field.to_string(), Value::String(fill));
                            fixed.push(format!("FIELD_FILLED:{task_id}:{field}"));
                            entry_mutated = true;
                        } else {
                            issues.push(format!("FIELD_FILLED:{task_id}:{field}"));
                        }
                    }
                }
            }

            if entry_mutated {
                indexes.get_mut(status_name).expect("status present").insert(task_id.clone(), meta);
                dirty_statuses.insert(status_name.clone());
            }

            let body_path = status::body_path(paths, project_id, status_name, &task_id)?;
            if !body_path.exists() {
                found.push(format!("BODY_CREATED:{task_id}"));
                if fix {
                    atomic_io::write_text_atomic(&body_path, "")?;
                    fixed.push(format!("BODY_CREATED:{task_id}"));
                } else {
                    issues.push(format!("BODY_CREATED:{task_id}"));
                }
            }
        }
    }

    // Phase 4: orphan bodies.
    for status_name in usable_statuses.clone() {
        let dir = status::status_dir(paths, project_id, &status_name)?;
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name.strip_suffix(".md") else { continue };
            if indexes[&status_name].contains_key(stem) {
                continue;
            }

            if !identifiers::is_identifier_shaped(stem) {
                found.push(format!("ORPHAN_BODY:{stem}"));
                issues.push(format!("ORPHAN_BODY:{stem}"));
                continue;
            }

            let seen_elsewhere = usable_statuses.iter().any(|s| indexes[s].contains_key(stem));
            if seen_elsewhere {
                found.push(format!("ORPHAN_BODY:{stem}"));
                issues.push(format!("ORPHAN_BODY:{stem}"));
                continue;
            }

            if fix {
                let now = clock::now_rfc3339();
                let meta = json!({ "task_id": stem, "created_at": now.clone(), "updated_at": now });
                indexes.get_mut(&status_name).expect("status present").insert(stem.to_string(), meta);
                dirty_statuses.insert(status_name.clone());
                found.push(format!("ORPHAN_INDEX_CREATED:{stem}"));
                fixed.push(format!("ORPHAN_INDEX_CREATED:{stem}"));
            } else {
                found.push(format!("ORPHAN_BODY:{stem}"));
                issues.push(format!("ORPHAN_BODY:{stem}"));
            }
        }
    }

    for status_name in &dirty_statuses {
        status::write_index(paths, project_id, status_name, &indexes[status_name])?;
    }

    for kind in discrepancy_kinds(&fixed) {
        tracing::info!(kind, "repaired discrepancy");
    }
    if !issues.is_empty() {
        tracing::warn!(count = issues.len(), "integrity issues remain unresolved");
    }

    Ok(IntegrityReport {
        ok: issues.is_empty(),
        project_id: project_id.to_string(),
        recovered,
        fixed,
        issues,
        found,
    })
}

fn field_present(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::String(s)) if !s.is_empty())
}

/// The set of distinct discrepancy-type prefixes (the part before the first
/// `:`) among `fixed`, for one `info` log line per repaired type rather than
/// one per individual entry.
fn discrepancy_kinds(fixed: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    let mut kinds = Vec::new();
    for entry in fixed {
        let kind = entry.split(':').next().unwrap_or(entry.as_str());
        if seen.insert(kind) {
            kinds.push(kind);
        }
    }
    kinds
}

/// Picks the winning status for a cross-status duplicate: greatest
/// parseable `updated_at` (`updated_at` rule), falling back to the first
/// status in the project's status order that holds the task
/// (`status_order` rule) on a tie or when no timestamp parses.
fn pick_duplicate_winner(
    indexes: &HashMap<String, RawIndex>,
    holders: &[String],
    task_id: &str,
    status_order: &[String],
) -> String {
    let mut best: Option<(&str, chrono::DateTime<chrono::Utc>)> = None;
    for status_name in holders {
        let Some(meta) = indexes[status_name].get(task_id) else {
            continue;
        };
        let Some(ts) = model::parse_updated_at(meta) else {
            continue;
        };
        match best {
            Some((_, best_ts)) if best_ts >= ts => {}
            _ => best = Some((status_name, ts)),
        }
    }
    if let Some((status_name, _)) = best {
        return status_name.to_string();
    }
    status_order
        .iter()
        .find(|s| holders.contains(s))
        .cloned()
        .expect("holders is a non-empty subset of status_order")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(statuses: &[&str]) -> (tempfile::TempDir, PathResolver) {
        let tmp = tempfile::tempdir().unwrap();
        let paths = PathResolver::with_root(tmp.path()).unwrap();
        let project = tmp.path().join("proj");
        std::fs::create_dir(&project).unwrap();
        for s in statuses {
            std::fs::create_dir(project.join(s)).unwrap();
            status::write_index(&paths, "proj", s, &RawIndex::new()).unwrap();
        }
        (tmp, paths)
    }

    #[test]
    fn clean_project_is_ok_with_no_findings() {
        let (_tmp, paths) = setup(&["backlog", "open"]);
        let statuses = vec!["backlog".to_string(), "open".to_string()];
        let report = check(&paths, "proj", &statuses, true).unwrap();
        assert!(report.ok);
        assert!(report.found.is_empty());
    }

    #[test]
    fn duplicate_resolved_by_updated_at_keeps_newer_status() {
        let (_tmp, paths) = setup(&["backlog", "open"]);
        let mut backlog = RawIndex::new();
        backlog.insert(
            "dup".into(),
            json!({"task_id": "dup", "created_at": "2024-01-01T00:00:00Z", "updated_at": "2024-01-01T00:00:00Z"}),
        );
        status::write_index(&paths, "proj", "backlog", &backlog).unwrap();
        let mut open = RawIndex::new();
        open.insert(
            "dup".into(),
            json!({"task_id": "dup", "created_at": "2024-01-01T00:00:00Z", "updated_at": "2024-06-01T00:00:00Z"}),
        );
        status::write_index(&paths, "proj", "open", &open).unwrap();
        std::fs::write(paths.root().join("proj/open/dup.md"), "body").unwrap();
        std::fs::write(paths.root().join("proj/backlog/dup.md"), "body").unwrap();

        let statuses = vec!["backlog".to_string(), "open".to_string()];
        let report = check(&paths, "proj", &statuses, true).unwrap();

        assert!(report.fixed.iter().any(|f| f == "DUPLICATE_RESOLVED:dup"));
        let backlog_after = status::read_index(&paths, "proj", "backlog").unwrap();
        let open_after = status::read_index(&paths, "proj", "open").unwrap();
        assert!(!backlog_after.contains_key("dup"));
        assert!(open_after.contains_key("dup"));
    }

    #[test]
    fn orphan_body_is_adopted_with_minimal_record() {
        let (_tmp, paths) = setup(&["open"]);
        std::fs::write(paths.root().join("proj/open/lost.md"), "").unwrap();

        let statuses = vec!["open".to_string()];
        let report = check(&paths, "proj", &statuses, true).unwrap();

        assert!(report.fixed.iter().any(|f| f == "ORPHAN_INDEX_CREATED:lost"));
        let index = status::read_index(&paths, "proj", "open").unwrap();
        assert!(index.contains_key("lost"));
    }

    #[test]
    fn orphan_body_in_report_only_mode_is_an_unresolved_issue() {
        let (_tmp, paths) = setup(&["open"]);
        std::fs::write(paths.root().join("proj/open/lost.md"), "").unwrap();

        let statuses = vec!["open".to_string()];
        let report = check(&paths, "proj", &statuses, false).unwrap();

        assert!(!report.ok);
        assert!(report.issues.iter().any(|i| i == "ORPHAN_BODY:lost"));
        let index = status::read_index(&paths, "proj", "open").unwrap();
        assert!(!index.contains_key("lost"));
    }

    #[test]
    fn second_fix_run_on_clean_project_is_idempotent() {
        let (_tmp, paths) = setup(&["open"]);
        std::fs::write(paths.root().join("proj/open/lost.md"), "").unwrap();
        let statuses = vec!["open".to_string()];
        check(&paths, "proj", &statuses, true).unwrap();
        let second = check(&paths, "proj", &statuses, true).unwrap();
        assert!(second.fixed.is_empty());
        assert!(second.issues.is_empty());
    }

    #[test]
    fn missing_status_dir_is_reported_not_created() {
        let (_tmp, paths) = setup(&["open"]);
        std::fs::remove_dir_all(paths.root().join("proj/open")).unwrap();
        let statuses = vec!["open".to_string()];
        let report = check(&paths, "proj", &statuses, true).unwrap();
        assert!(report.issues.iter().any(|i| i == "STATUS_DIR_MISSING:open"));
        assert!(!paths.root().join("proj/open").exists());
    }
}
