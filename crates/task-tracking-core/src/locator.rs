//! Task Locator (`spec.md` §4.E).

use serde_json::{json, Value};

use crate::{
    error::{Error, Result},
    paths::PathResolver,
    status,
};

/// The result of locating a task: the status it lives in and its raw
/// metadata value.
pub struct Located {
    pub status: String,
    pub metadata: Value,
}

/// Scans every status index of `project_id` for `task_id`, returning the
/// unique `(status, metadata)` pair.
pub fn locate(
    paths: &PathResolver,
    project_id: &str,
    statuses: &[String],
    task_id: &str,
) -> Result<Located> {
    let mut found: Vec<Located> = Vec::new();

    for status_name in statuses {
        let index = status::read_index(paths, project_id, status_name)?;
        if let Some(metadata) = index.get(task_id) {
            found.push(Located {
                status: status_name.clone(),
                metadata: metadata.clone(),
            });
        }
    }

    match found.len() {
        0 => Err(Error::not_found("Task not found").with_details(json!({ "task_id": task_id }))),
        1 => Ok(found.into_iter().next().expect("len == 1")),
        _ => Err(Error::integrity("Task exists in multiple statuses").with_details(json!({
            "task_id": task_id,
            "statuses": found.iter().map(|l| l.status.clone()).collect::<Vec<_>>(),
        }))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawIndex;

    fn setup() -> (tempfile::TempDir, PathResolver) {
        let tmp = tempfile::tempdir().unwrap();
        let paths = PathResolver::with_root(tmp.path()).unwrap();
        let project = tmp.path().join("proj");
        std::fs::create_dir(&project).unwrap();
        for s in ["backlog", "open", "done"] {
            std::fs::create_dir(project.join(s)).unwrap();
        }
        (tmp, paths)
    }

    fn write_index(paths: &PathResolver, status: &str, index: RawIndex) {
        status::write_index(paths, "proj", status, &index).unwrap();
    }

    #[test]
    fn locates_unique_task() {
        let (_tmp, paths) = setup();
        let mut idx = RawIndex::new();
        idx.insert("t1".into(), json!({"task_id": "t1"}));
        write_index(&paths, "open", idx);
        write_index(&paths, "backlog", RawIndex::new());
        write_index(&paths, "done", RawIndex::new());

        let statuses = vec!["backlog".to_string(), "done".to_string(), "open".to_string()];
        let located = locate(&paths, "proj", &statuses, "t1").unwrap();
        assert_eq!(located.status, "open");
    }

    #[test]
    fn missing_task_is_not_found() {
        let (_tmp, paths) = setup();
        for s in ["backlog", "open", "done"] {
            write_index(&paths, s, RawIndex::new());
        }
        let statuses = vec!["backlog".to_string(), "done".to_string(), "open".to_string()];
        let err = locate(&paths, "proj", &statuses, "missing").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn duplicate_task_is_integrity_error() {
        let (_tmp, paths) = setup();
        let mut backlog = RawIndex::new();
        backlog.insert("t1".into(), json!({"task_id": "t1"}));
        let mut open = RawIndex::new();
        open.insert("t1".into(), json!({"task_id": "t1"}));
        write_index(&paths, "backlog", backlog);
        write_index(&paths, "open", open);
        write_index(&paths, "done", RawIndex::new());

        let statuses = vec!["backlog".to_string(), "done".to_string(), "open".to_string()];
        let err = locate(&paths, "proj", &statuses, "t1").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Integrity);
    }
}
