//! Top-level facade (`spec.md` §2 data flow): acquire the project lock, run
//! integrity-check-with-repair as a precondition, dispatch to the
//! component the operation needs, release the lock on every exit path.

use serde_json::json;

use crate::{
    clock,
    error::{Error, Result},
    integrity::{self, IntegrityReport},
    lock::ProjectLock,
    locator::{self, Located},
    model::RawIndex,
    mutators::{self, MetadataPatch, NewTask},
    paths::PathResolver,
    status, transaction,
};

/// Entry point for every operation against a single root. Cheap to
/// construct; holds no lock itself (each method acquires and releases its
/// own [`ProjectLock`] for the duration of the call).
pub struct Core {
    paths: PathResolver,
}

impl Core {
    #[must_use]
    pub fn new(paths: PathResolver) -> Self {
        Self { paths }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(PathResolver::from_env()?))
    }

    #[must_use]
    pub fn paths(&self) -> &PathResolver {
        &self.paths
    }

    pub fn init_project(&self, project_id: &str, statuses: &[String]) -> Result<()> {
        if !crate::identifiers::is_identifier_shaped(project_id) {
            return Err(Error::validation("project_id must match the identifier shape")
                .with_details(json!({ "project_id": project_id })));
        }
        if statuses.is_empty() {
            return Err(Error::validation("At least one status is required"));
        }
        for status_name in statuses {
            if !crate::identifiers::is_identifier_shaped(status_name) {
                return Err(Error::validation("status must match the identifier shape")
                    .with_details(json!({ "status": status_name })));
            }
        }

        let project_dir = self.paths.safe_join([project_id])?;
        if project_dir.exists() {
            return Err(Error::conflict("Project already exists")
                .with_details(json!({ "project_id": project_id })));
        }

        std::fs::create_dir_all(&project_dir)?;
        for status_name in statuses {
            let dir = self.paths.safe_join([project_id, status_name])?;
            std::fs::create_dir(&dir)?;
            status::write_index(&self.paths, project_id, status_name, &RawIndex::new())?;
        }
        Ok(())
    }

    pub fn add_task(&self, project_id: &str, input: NewTask) -> Result<(String, String)> {
        self.with_lock(project_id, |statuses| {
            let now = clock::now_rfc3339();
            mutators::create_task(&self.paths, project_id, statuses, input, &now)
        })
    }

    pub fn set_body(&self, project_id: &str, task_id: &str, text: &str) -> Result<()> {
        self.with_lock(project_id, |statuses| {
            let now = clock::now_rfc3339();
            mutators::replace_body(&self.paths, project_id, statuses, task_id, text, &now)
        })
    }

    pub fn meta_update(
        &self,
        project_id: &str,
        task_id: &str,
        patch: &MetadataPatch,
    ) -> Result<()> {
        self.with_lock(project_id, |statuses| {
            let now = clock::now_rfc3339();
            mutators::patch_metadata(&self.paths, project_id, statuses, task_id, patch, &now)
        })
    }

    pub fn move_task(&self, project_id: &str, task_id: &str, to: &str) -> Result<()> {
        self.with_lock(project_id, |statuses| {
            transaction::perform_move(&self.paths, project_id, statuses, task_id, to)
        })
    }

    pub fn show_task(&self, project_id: &str, task_id: &str) -> Result<Located> {
        self.with_lock(project_id, |statuses| {
            locator::locate(&self.paths, project_id, statuses, task_id)
        })
    }

    /// Reads a task's body text verbatim, with no truncation policy applied
    /// — that is the CLI collaborator's job, layered on top of this
    /// primitive.
    pub fn read_body(&self, project_id: &str, task_id: &str) -> Result<String> {
        self.with_lock(project_id, |statuses| {
            let located = locator::locate(&self.paths, project_id, statuses, task_id)?;
            status::read_body(&self.paths, project_id, &located.status, task_id)
        })
    }

    /// Enumerates every task across every status, with no filtering or
    /// sorting — those are the CLI collaborator's job (§1, §15).
    pub fn list_all(&self, project_id: &str) -> Result<Vec<(String, RawIndex)>> {
        self.with_lock(project_id, |statuses| {
            statuses
                .iter()
                .map(|status_name| {
                    let index = status::read_index(&self.paths, project_id, status_name)?;
                    Ok((status_name.clone(), index))
                })
                .collect()
        })
    }

    /// Runs the integrity checker directly, without the usual
    /// refuse-if-unresolved-issues gate (this *is* the gate, for callers
    /// that want to invoke it on its own rather than as a precondition).
    pub fn integrity_check(&self, project_id: &str, fix: bool) -> Result<IntegrityReport> {
        let project_dir = self.paths.safe_join([project_id])?;
        let _lock = ProjectLock::acquire(&project_dir)?;
        let statuses = status::discover_statuses(&self.paths, project_id)?;
        integrity::check(&self.paths, project_id, &statuses, fix)
    }

    /// Acquires the project lock, runs integrity-check-with-repair as a
    /// precondition (refusing the operation if issues remain unresolved),
    /// then invokes `op` with the discovered status set. The lock is held
    /// for `op`'s entire duration and released on every exit path.
    fn with_lock<T>(&self, project_id: &str, op: impl FnOnce(&[String]) -> Result<T>) -> Result<T> {
        let project_dir = self.paths.safe_join([project_id])?;
        let _lock = ProjectLock::acquire(&project_dir)?;

        let statuses = status::discover_statuses(&self.paths, project_id)?;
        let report = integrity::check(&self.paths, project_id, &statuses, true)?;
        if !report.ok {
            return Err(Error::integrity("Integrity check failed").with_details(json!({
                "issues": report.issues,
                "fixed": report.fixed,
                "found": report.found,
                "recovered": report.recovered,
            })));
        }

        op(&statuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core_in_temp() -> (tempfile::TempDir, Core) {
        let tmp = tempfile::tempdir().unwrap();
        let paths = PathResolver::with_root(tmp.path()).unwrap();
        (tmp, Core::new(paths))
    }

    fn new_task(task_id: &str) -> NewTask {
        NewTask {
            task_id: task_id.to_string(),
            derived: true,
            status: None,
            tags: None,
            assignee: None,
            priority: None,
            due_date: None,
            body: "hello".to_string(),
        }
    }

    #[test]
    fn init_add_move_end_to_end() {
        let (_tmp, core) = core_in_temp();
        core.init_project(
            "p",
            &["backlog".to_string(), "open".to_string(), "done".to_string()],
        )
        .unwrap();

        let (status_name, task_id) = core.add_task("p", new_task("fix_bug")).unwrap();
        assert_eq!(status_name, "backlog");
        assert_eq!(task_id, "fix_bug");

        core.move_task("p", "fix_bug", "done").unwrap();
        let located = core.show_task("p", "fix_bug").unwrap();
        assert_eq!(located.status, "done");

        let tx_path = core.paths().safe_join(["p", ".tx_move.json"]).unwrap();
        assert!(!tx_path.exists());

        assert_eq!(core.read_body("p", "fix_bug").unwrap(), "hello");
    }

    #[test]
    fn init_rejects_duplicate_project() {
        let (_tmp, core) = core_in_temp();
        core.init_project("p", &["backlog".to_string()]).unwrap();
        let err = core.init_project("p", &["backlog".to_string()]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
    }

    #[test]
    fn mutating_op_refuses_when_integrity_cannot_be_repaired() {
        let (_tmp, core) = core_in_temp();
        core.init_project("p", &["backlog".to_string(), "open".to_string()])
            .unwrap();
        // Orphan body whose stem also exists under another status's index:
        // unresolvable without operator intervention.
        core.add_task("p", new_task("dup")).unwrap();
        let orphan_path = core.paths().safe_join(["p", "open", "dup.md"]).unwrap();
        std::fs::write(orphan_path, "orphan").unwrap();

        let err = core.add_task("p", new_task("other")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Integrity);
    }

    #[test]
    fn concurrent_lock_holder_blocks_second_operation() {
        let (_tmp, core) = core_in_temp();
        core.init_project("p", &["backlog".to_string()]).unwrap();
        let project_dir = core.paths().safe_join(["p"]).unwrap();
        let _held = ProjectLock::acquire(&project_dir).unwrap();

        let err = core.add_task("p", new_task("t1")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
    }
}
