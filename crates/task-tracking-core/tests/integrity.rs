//! Integration coverage for scenarios S3 and S4 (`spec.md` §8).

use task_tracking_core::{core::Core, paths::PathResolver};

fn core_in_temp() -> (tempfile::TempDir, Core) {
    let tmp = tempfile::tempdir().unwrap();
    let paths = PathResolver::with_root(tmp.path()).unwrap();
    (tmp, Core::new(paths))
}

#[test]
fn s3_duplicate_repair_by_updated_at() {
    let (_tmp, core) = core_in_temp();
    core.init_project("P", &["backlog".to_string(), "open".to_string()])
        .unwrap();

    std::fs::write(core.paths().safe_join(["P", "open", "dup.md"]).unwrap(), "x").unwrap();
    std::fs::write(core.paths().safe_join(["P", "backlog", "dup.md"]).unwrap(), "x").unwrap();
    std::fs::write(
        core.paths().safe_join(["P", "backlog", "index.json"]).unwrap(),
        serde_json::to_vec(&serde_json::json!({
            "dup": {"task_id": "dup", "created_at": "2024-01-01T00:00:00+00:00", "updated_at": "2024-01-01T00:00:00+00:00"},
        }))
        .unwrap(),
    )
    .unwrap();
    std::fs::write(
        core.paths().safe_join(["P", "open", "index.json"]).unwrap(),
        serde_json::to_vec(&serde_json::json!({
            "dup": {"task_id": "dup", "created_at": "2024-01-01T00:00:00+00:00", "updated_at": "2024-06-01T00:00:00+00:00"},
        }))
        .unwrap(),
    )
    .unwrap();

    let report = core.integrity_check("P", true).unwrap();
    assert!(report.fixed.iter().any(|f| f == "DUPLICATE_RESOLVED:dup"));

    let backlog = std::fs::read_to_string(
        core.paths().safe_join(["P", "backlog", "index.json"]).unwrap(),
    )
    .unwrap();
    let open =
        std::fs::read_to_string(core.paths().safe_join(["P", "open", "index.json"]).unwrap())
            .unwrap();
    assert!(!backlog.contains("dup"));
    assert!(open.contains("dup"));
}

#[test]
fn s4_orphan_body_adoption() {
    let (_tmp, core) = core_in_temp();
    core.init_project("P", &["open".to_string()]).unwrap();
    std::fs::write(core.paths().safe_join(["P", "open", "lost.md"]).unwrap(), "").unwrap();

    let report = core.integrity_check("P", true).unwrap();
    assert!(report.fixed.iter().any(|f| f == "ORPHAN_INDEX_CREATED:lost"));

    let open =
        std::fs::read_to_string(core.paths().safe_join(["P", "open", "index.json"]).unwrap())
            .unwrap();
    assert!(open.contains("lost"));
}

#[test]
fn two_consecutive_fix_runs_on_clean_project_are_idempotent() {
    let (_tmp, core) = core_in_temp();
    core.init_project("P", &["open".to_string()]).unwrap();
    std::fs::write(core.paths().safe_join(["P", "open", "lost.md"]).unwrap(), "").unwrap();

    core.integrity_check("P", true).unwrap();
    let second = core.integrity_check("P", true).unwrap();
    assert!(second.fixed.is_empty());
    assert!(second.issues.is_empty());
    assert!(second.ok);
}
