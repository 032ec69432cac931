//! Integration coverage for scenarios S5 and S6 (`spec.md` §8).

use task_tracking_core::{core::Core, lock::ProjectLock, paths::PathResolver};

fn core_in_temp() -> (tempfile::TempDir, Core) {
    let tmp = tempfile::tempdir().unwrap();
    let paths = PathResolver::with_root(tmp.path()).unwrap();
    (tmp, Core::new(paths))
}

#[test]
fn s5_stale_lock_is_reclaimed_and_a_live_holder_still_conflicts() {
    let (_tmp, core) = core_in_temp();
    core.init_project("P", &["backlog".to_string()]).unwrap();

    let project_dir = core.paths().safe_join(["P"]).unwrap();
    let lock_path = project_dir.join(".lock");

    // A dead PID: spawn and reap a child so its pid is guaranteed unused.
    let mut child = std::process::Command::new("true")
        .spawn()
        .unwrap_or_else(|_| std::process::Command::new("/bin/true").spawn().unwrap());
    let dead_pid = child.id();
    let _ = child.wait();
    std::fs::write(
        &lock_path,
        serde_json::to_vec(&serde_json::json!({ "pid": dead_pid })).unwrap(),
    )
    .unwrap();

    // The stale lock is reclaimed transparently by the next operation.
    core.integrity_check("P", true).unwrap();

    // A genuinely live holder still blocks a concurrent operation.
    let _held = ProjectLock::acquire(&project_dir).unwrap();
    let err = core.integrity_check("P", true).unwrap_err();
    assert_eq!(err.kind(), task_tracking_core::ErrorKind::Conflict);
}

#[test]
fn s6_path_traversal_in_configured_root_is_rejected() {
    let err = PathResolver::with_root("/tmp/t/../t").unwrap_err();
    assert_eq!(err.kind(), task_tracking_core::ErrorKind::Validation);
    assert!(err.message().contains(".."));
}
