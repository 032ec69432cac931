//! Status & Index Access (`spec.md` §4.D).

use std::path::PathBuf;

use serde_json::json;

use crate::{
    atomic_io,
    error::{Error, Result},
    identifiers,
    model::RawIndex,
    paths::PathResolver,
};

/// Discovers the project's status set: immediate subdirectories of the
/// project directory whose name is identifier-shaped, sorted
/// lexicographically. `project.json` (if present) is never consulted.
pub fn discover_statuses(paths: &PathResolver, project_id: &str) -> Result<Vec<String>> {
    let project_dir = paths.safe_join([project_id])?;
    if !project_dir.is_dir() {
        return Err(Error::not_found("Project not found")
            .with_details(json!({ "project_id": project_id })));
    }

    let mut statuses = Vec::new();
    for entry in std::fs::read_dir(&project_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if identifiers::is_identifier_shaped(name) {
            statuses.push(name.to_string());
        }
    }
    statuses.sort();

    if statuses.is_empty() {
        return Err(Error::integrity("No statuses found")
            .with_details(json!({ "project_id": project_id })));
    }
    Ok(statuses)
}

#[must_use]
pub fn status_dir(paths: &PathResolver, project_id: &str, status: &str) -> Result<PathBuf> {
    paths.safe_join([project_id, status])
}

#[must_use]
pub fn index_path(paths: &PathResolver, project_id: &str, status: &str) -> Result<PathBuf> {
    paths.safe_join([project_id, status, "index.json"])
}

pub fn body_path(
    paths: &PathResolver,
    project_id: &str,
    status: &str,
    task_id: &str,
) -> Result<PathBuf> {
    paths.safe_join([project_id, status, &format!("{task_id}.md")])
}

/// Reads a task's body text verbatim. A missing body file for a task that
/// has an index entry is a structural violation, not an ordinary I/O
/// failure, so it is surfaced as [`Error::integrity`] rather than
/// [`ErrorKind::Unexpected`] — the CLI layer applies any truncation policy
/// on top of this primitive.
pub fn read_body(
    paths: &PathResolver,
    project_id: &str,
    status: &str,
    task_id: &str,
) -> Result<String> {
    let path = body_path(paths, project_id, status, task_id)?;
    match std::fs::read_to_string(&path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::integrity("Body file missing").with_details(json!({ "task_id": task_id })))
        }
        Err(e) => Err(Error::from(e)),
    }
}

/// The three distinguishable outcomes of reading a status's `index.json`.
/// Kept distinct (rather than collapsed into a single `Result`) because
/// `spec.md` §9's first Open Question requires repair logic to gate
/// `INDEX_CREATED` on "index file absent" specifically, as a structured
/// variant rather than a message-text comparison.
pub enum IndexRead {
    Ok(RawIndex),
    Missing,
    Invalid(Error),
}

pub fn try_read_index(paths: &PathResolver, project_id: &str, status: &str) -> IndexRead {
    let path = match index_path(paths, project_id, status) {
        Ok(path) => path,
        Err(e) => return IndexRead::Invalid(e),
    };

    let data = match std::fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return IndexRead::Missing,
        Err(e) => return IndexRead::Invalid(Error::from(e)),
    };

    match serde_json::from_slice::<serde_json::Value>(&data) {
        Err(e) => IndexRead::Invalid(
            Error::integrity("Invalid JSON")
                .with_details(json!({ "path": path.display().to_string() }))
                .with_source(e),
        ),
        Ok(serde_json::Value::Object(map)) => IndexRead::Ok(map.into_iter().collect()),
        Ok(_) => IndexRead::Invalid(
            Error::integrity("Index must be a JSON object")
                .with_details(json!({ "status": status })),
        ),
    }
}

/// Reads an index, folding all three [`IndexRead`] outcomes into a single
/// error for callers (mutators, locator) that have no special handling for
/// "index file missing" versus "index file malformed".
pub fn read_index(paths: &PathResolver, project_id: &str, status: &str) -> Result<RawIndex> {
    match try_read_index(paths, project_id, status) {
        IndexRead::Ok(index) => Ok(index),
        IndexRead::Missing => Err(Error::integrity("Missing required file").with_details(json!({
            "path": index_path(paths, project_id, status)?.display().to_string(),
        }))),
        IndexRead::Invalid(e) => Err(e),
    }
}

pub fn write_index(
    paths: &PathResolver,
    project_id: &str,
    status: &str,
    index: &RawIndex,
) -> Result<()> {
    let path = index_path(paths, project_id, status)?;
    atomic_io::write_json_atomic(&path, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_project(statuses: &[&str]) -> (tempfile::TempDir, PathResolver) {
        let tmp = tempfile::tempdir().unwrap();
        let paths = PathResolver::with_root(tmp.path()).unwrap();
        let project_dir = tmp.path().join("proj");
        std::fs::create_dir(&project_dir).unwrap();
        for s in statuses {
            let dir = project_dir.join(s);
            std::fs::create_dir(&dir).unwrap();
            std::fs::write(dir.join("index.json"), b"{}").unwrap();
        }
        (tmp, paths)
    }

    #[test]
    fn discovers_sorted_identifier_shaped_dirs_only() {
        let (_tmp, paths) = make_project(&["open", "backlog", "done"]);
        std::fs::create_dir(paths.root().join("proj").join("not valid!")).unwrap();
        let statuses = discover_statuses(&paths, "proj").unwrap();
        assert_eq!(statuses, vec!["backlog", "done", "open"]);
    }

    #[test]
    fn empty_status_set_is_integrity_error() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = PathResolver::with_root(tmp.path()).unwrap();
        std::fs::create_dir(tmp.path().join("proj")).unwrap();
        let err = discover_statuses(&paths, "proj").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Integrity);
    }

    #[test]
    fn missing_index_is_distinguishable_from_malformed() {
        let (_tmp, paths) = make_project(&["open"]);
        match try_read_index(&paths, "proj", "open") {
            IndexRead::Ok(idx) => assert!(idx.is_empty()),
            _ => panic!("expected Ok"),
        }

        let bad_dir = paths.root().join("proj").join("bad");
        std::fs::create_dir(&bad_dir).unwrap();
        match try_read_index(&paths, "proj", "bad") {
            IndexRead::Missing => {}
            _ => panic!("expected Missing"),
        }

        std::fs::write(bad_dir.join("index.json"), b"not json").unwrap();
        match try_read_index(&paths, "proj", "bad") {
            IndexRead::Invalid(_) => {}
            _ => panic!("expected Invalid"),
        }
    }

    #[test]
    fn read_body_returns_text_and_flags_missing_file_as_integrity_error() {
        let (_tmp, paths) = make_project(&["open"]);
        let path = body_path(&paths, "proj", "open", "t1").unwrap();
        std::fs::write(&path, "hello").unwrap();
        assert_eq!(read_body(&paths, "proj", "open", "t1").unwrap(), "hello");

        let err = read_body(&paths, "proj", "open", "missing").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Integrity);
    }
}
