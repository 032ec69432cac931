//! Path Resolver (`spec.md` §4.A) and the safe-join primitive all on-disk
//! access goes through.

use std::{
    env,
    ffi::OsStr,
    io,
    path::{Path, PathBuf},
};

use serde_json::json;

use crate::error::{Error, Result};

pub const ROOT_ENV: &str = "TASK_TRACKING_ROOT";
pub const DEFAULT_DIR: &str = ".task_tracking";

/// Resolves the project root and safe-joins every subsequent path against
/// it. Constructed once per process invocation.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Resolves the root from `TASK_TRACKING_ROOT`, falling back to
    /// `<cwd>/.task_tracking`.
    pub fn from_env() -> Result<Self> {
        match env::var(ROOT_ENV) {
            Ok(value) if !value.is_empty() => {
                reject_traversal(&value)?;
                Ok(Self {
                    root: PathBuf::from(value),
                })
            }
            _ => {
                let cwd = env::current_dir().map_err(|e| {
                    Error::unexpected("Could not determine current directory").with_source(e)
                })?;
                Ok(Self {
                    root: cwd.join(DEFAULT_DIR),
                })
            }
        }
    }

    /// Builds a resolver against an explicit root, applying the same
    /// traversal rejection as [`PathResolver::from_env`]. Used by tests and
    /// by collaborators that accept an explicit `--root` override.
    pub fn with_root(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        reject_traversal(&root.to_string_lossy())?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Joins `parts` onto the root and verifies the result is still rooted
    /// at the (symlink-resolved) root directory. This is the only path
    /// construction primitive the rest of the core is allowed to use.
    pub fn safe_join<I, S>(&self, parts: I) -> Result<PathBuf>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        let mut candidate = self.root.clone();
        for part in parts {
            candidate.push(part.as_ref());
        }

        let resolved_root = resolve_best_effort(&self.root).map_err(|e| {
            Error::validation("Could not resolve project root").with_source(e)
        })?;
        let resolved_candidate = resolve_best_effort(&candidate).map_err(|e| {
            Error::validation("Could not resolve path").with_source(e)
        })?;

        if !resolved_candidate.starts_with(&resolved_root) {
            return Err(Error::validation("Path escapes root").with_details(json!({
                "path": candidate.display().to_string(),
            })));
        }

        Ok(candidate)
    }
}

fn reject_traversal(value: &str) -> Result<()> {
    let normalized = value.replace('\\', "/");
    let has_dotdot = normalized.split('/').any(|segment| segment == "..");
    if has_dotdot {
        return Err(
            Error::validation("TASK_TRACKING_ROOT must not contain '..' path segments")
                .with_details(json!({ "env": ROOT_ENV, "value": value })),
        );
    }
    Ok(())
}

/// Canonicalizes the longest existing ancestor of `path` and re-appends the
/// remaining (not-yet-created) components literally. Plain
/// `std::fs::canonicalize` fails outright on paths that don't fully exist
/// yet, which is the common case here (we safe-join paths we are about to
/// create).
fn resolve_best_effort(path: &Path) -> io::Result<PathBuf> {
    let mut missing: Vec<&OsStr> = Vec::new();
    let mut existing = path;
    while !existing.exists() {
        missing.push(existing.file_name().unwrap_or_default());
        match existing.parent() {
            Some(parent) => existing = parent,
            None => break,
        }
    }

    let mut resolved = if existing.as_os_str().is_empty() {
        env::current_dir()?
    } else {
        std::fs::canonicalize(existing)?
    };
    for component in missing.into_iter().rev() {
        resolved.push(component);
    }
    Ok(resolved)
}
