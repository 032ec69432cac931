//! Command-line front end (`spec.md` §1, §6): argument parsing, the
//! validation the core places out of its own scope, and single-line JSON
//! stdout formatting. Thin by design — every piece of hard engineering
//! lives in `task-tracking-core`.

use std::{path::PathBuf, str::FromStr as _};

use clap::{Parser, Subcommand};
use serde_json::json;
use task_tracking_core::{
    core::Core,
    model::Priority,
    mutators::{MetadataPatch, NewTask},
    paths::PathResolver,
    Error,
};

use crate::{format, validate};

#[derive(Parser)]
#[command(name = "task-tracking", about = "A crash-safe, file-backed task tracking engine")]
pub struct Cli {
    /// Overrides `TASK_TRACKING_ROOT` / the `<cwd>/.task_tracking` default.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    InitProject {
        project_id: String,
        #[arg(long, value_delimiter = ',', required = true)]
        statuses: Vec<String>,
    },
    Add {
        project_id: String,
        title: String,
        #[arg(long)]
        task_id: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        due_date: Option<String>,
        #[arg(long)]
        body: Option<String>,
    },
    List {
        project_id: String,
        #[arg(long)]
        status: Option<String>,
    },
    Show {
        project_id: String,
        task_id: String,
        #[arg(long)]
        include_body: bool,
        #[arg(long)]
        max_body_chars: Option<usize>,
        #[arg(long)]
        max_body_lines: Option<usize>,
    },
    Move {
        project_id: String,
        task_id: String,
        to: String,
    },
    MetaUpdate {
        project_id: String,
        task_id: String,
        #[arg(long = "set")]
        set: Vec<String>,
        #[arg(long = "unset")]
        unset: Vec<String>,
    },
    SetBody {
        project_id: String,
        task_id: String,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    IntegrityCheck {
        project_id: String,
        #[arg(long)]
        fix: bool,
    },
}

/// Parses and dispatches a single invocation, returning the process exit
/// code (`spec.md` §6/§7). Every outcome, success or failure, is a single
/// line of JSON on stdout.
#[must_use]
pub fn run(cli: Cli) -> i32 {
    let paths = match resolve_paths(cli.root) {
        Ok(paths) => paths,
        Err(err) => return fail(&err),
    };
    let core = Core::new(paths);

    match dispatch(&core, cli.command) {
        Ok(()) => 0,
        Err(err) => {
            tracing::warn!(exit_code = err.kind().exit_code(), "command failed: {err}");
            fail(&err)
        }
    }
}

fn fail(err: &Error) -> i32 {
    format::print_error(err);
    err.kind().exit_code()
}

fn resolve_paths(root: Option<PathBuf>) -> task_tracking_core::Result<PathResolver> {
    match root {
        Some(root) => PathResolver::with_root(root),
        None => PathResolver::from_env(),
    }
}

fn to_validation_err(e: anyhow::Error) -> Error {
    Error::validation(e.to_string())
}

fn dispatch(core: &Core, command: Command) -> task_tracking_core::Result<()> {
    match command {
        Command::InitProject {
            project_id,
            statuses,
        } => {
            validate::validate_identifier("project_id", &project_id).map_err(to_validation_err)?;
            for status_name in &statuses {
                validate::validate_identifier("status", status_name).map_err(to_validation_err)?;
            }
            core.init_project(&project_id, &statuses)?;
            format::print_json(&json!({ "project_id": project_id, "statuses": statuses }));
            Ok(())
        }

        Command::Add {
            project_id,
            title,
            task_id,
            status,
            tags,
            assignee,
            priority,
            due_date,
            body,
        } => {
            validate::validate_identifier("project_id", &project_id).map_err(to_validation_err)?;
            if let Some(explicit) = &task_id {
                validate::validate_identifier("task_id", explicit).map_err(to_validation_err)?;
            }
            if let Some(tags) = &tags {
                validate::validate_tags(tags).map_err(to_validation_err)?;
            }
            if let Some(priority) = &priority {
                validate::validate_priority(priority).map_err(to_validation_err)?;
            }
            if let Some(due_date) = &due_date {
                validate::validate_due_date(due_date).map_err(to_validation_err)?;
            }

            let derived_from_title = validate::title_to_task_id(&title);
            let (candidate, derived) = match task_id {
                Some(explicit) if explicit == derived_from_title => (explicit, false),
                Some(explicit) => {
                    return Err(Error::validation(
                        "Explicit task_id must equal the title-derived id",
                    )
                    .with_details(json!({ "task_id": explicit, "derived": derived_from_title })));
                }
                None => (derived_from_title, true),
            };

            let priority = priority
                .map(|p| Priority::from_str(&p))
                .transpose()
                .map_err(|()| Error::validation("priority must be one of P0, P1, P2, P3"))?;

            let input = NewTask {
                task_id: candidate,
                derived,
                status,
                tags,
                assignee,
                priority,
                due_date,
                body: body.unwrap_or_default(),
            };
            let (status_name, task_id) = core.add_task(&project_id, input)?;
            format::print_json(&json!({
                "project_id": project_id,
                "status": status_name,
                "task_id": task_id,
                "title": validate::task_id_to_title(&task_id),
            }));
            Ok(())
        }

        Command::List { project_id, status } => {
            validate::validate_identifier("project_id", &project_id).map_err(to_validation_err)?;
            let all = core.list_all(&project_id)?;
            let tasks: Vec<_> = all
                .into_iter()
                .filter(|(status_name, _)| status.as_deref().is_none_or(|s| s == status_name))
                .flat_map(|(status_name, index)| {
                    index.into_iter().map(move |(task_id, mut meta)| {
                        if let Some(obj) = meta.as_object_mut() {
                            obj.insert("status".to_string(), json!(status_name));
                            obj.insert(
                                "title".to_string(),
                                json!(validate::task_id_to_title(&task_id)),
                            );
                        }
                        meta
                    })
                })
                .collect();
            format::print_json(&tasks);
            Ok(())
        }

        Command::Show {
            project_id,
            task_id,
            include_body,
            max_body_chars,
            max_body_lines,
        } => {
            validate::validate_identifier("project_id", &project_id).map_err(to_validation_err)?;
            validate::validate_identifier("task_id", &task_id).map_err(to_validation_err)?;
            let located = core.show_task(&project_id, &task_id)?;
            let mut meta = located.metadata;
            if let Some(obj) = meta.as_object_mut() {
                obj.insert("status".to_string(), json!(located.status));
                obj.insert(
                    "title".to_string(),
                    json!(validate::task_id_to_title(&task_id)),
                );
                if include_body {
                    let text = core.read_body(&project_id, &task_id)?;
                    obj.insert(
                        "body".to_string(),
                        format::truncate_body(&text, max_body_chars, max_body_lines),
                    );
                }
            }
            format::print_json(&meta);
            Ok(())
        }

        Command::Move {
            project_id,
            task_id,
            to,
        } => {
            validate::validate_identifier("project_id", &project_id).map_err(to_validation_err)?;
            validate::validate_identifier("task_id", &task_id).map_err(to_validation_err)?;
            validate::validate_identifier("status", &to).map_err(to_validation_err)?;
            core.move_task(&project_id, &task_id, &to)?;
            format::print_json(&json!({ "project_id": project_id, "task_id": task_id, "status": to }));
            Ok(())
        }

        Command::MetaUpdate {
            project_id,
            task_id,
            set,
            unset,
        } => {
            validate::validate_identifier("project_id", &project_id).map_err(to_validation_err)?;
            validate::validate_identifier("task_id", &task_id).map_err(to_validation_err)?;
            let mut set_map = serde_json::Map::new();
            for arg in set {
                let (key, value) = validate::parse_set_arg(&arg).map_err(to_validation_err)?;
                set_map.insert(key, value);
            }
            let patch = MetadataPatch {
                set: set_map,
                unset,
            };
            core.meta_update(&project_id, &task_id, &patch)?;
            format::print_json(&json!({ "project_id": project_id, "task_id": task_id }));
            Ok(())
        }

        Command::SetBody {
            project_id,
            task_id,
            text,
            file,
        } => {
            validate::validate_identifier("project_id", &project_id).map_err(to_validation_err)?;
            validate::validate_identifier("task_id", &task_id).map_err(to_validation_err)?;
            let body = match (text, file) {
                (Some(text), None) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .map_err(|e| Error::not_found("Body file not found").with_source(e))?,
                _ => {
                    return Err(Error::validation(
                        "Exactly one of --text or --file is required",
                    ));
                }
            };
            core.set_body(&project_id, &task_id, &body)?;
            format::print_json(&json!({ "project_id": project_id, "task_id": task_id }));
            Ok(())
        }

        Command::IntegrityCheck { project_id, fix } => {
            validate::validate_identifier("project_id", &project_id).map_err(to_validation_err)?;
            let report = core.integrity_check(&project_id, fix)?;
            format::print_json(&json!({
                "ok": report.ok,
                "project_id": report.project_id,
                "recovered": report.recovered,
                "fixed": report.fixed,
                "issues": report.issues,
                "found": report.found,
            }));
            Ok(())
        }
    }
}
