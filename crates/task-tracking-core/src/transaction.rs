//! Transactional Move (`spec.md` §4.F): the two-phase move of a task
//! between statuses, and its crash-recovery procedure.
//!
//! Grounded on `scitool-cli`'s `fs/atomic_dir/recovery.rs` for the
//! observe-four-booleans-then-decide shape, and directly on
//! `examples/original_source/scripts/service.py`'s `move_task` /
//! `_recover_move` for the exact state table (S0-S5) and forward-roll
//! policy.

use serde_json::{json, Value};

use crate::{
    atomic_io,
    clock,
    error::{Error, Result},
    locator,
    model::{self, TxRecord},
    paths::PathResolver,
    status,
};

const TX_FILE_NAME: &str = ".tx_move.json";

fn tx_path(paths: &PathResolver, project_id: &str) -> Result<std::path::PathBuf> {
    paths.safe_join([project_id, TX_FILE_NAME])
}

/// Reads the pending transaction record, if any. `Ok(None)` means no move
/// is in flight; `Err` means the file exists but is not a valid record.
pub fn read_tx(paths: &PathResolver, project_id: &str) -> Result<Option<TxRecord>> {
    let path = tx_path(paths, project_id)?;
    let data = match std::fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::from(e)),
    };
    serde_json::from_slice(&data).map(Some).map_err(|e| {
        Error::integrity("Corrupted transaction record")
            .with_details(json!({ "path": path.display().to_string() }))
            .with_source(e)
    })
}

fn write_tx(paths: &PathResolver, project_id: &str, tx: &TxRecord) -> Result<()> {
    let path = tx_path(paths, project_id)?;
    atomic_io::write_json_atomic(&path, tx)
}

fn remove_tx(paths: &PathResolver, project_id: &str) -> Result<()> {
    let path = tx_path(paths, project_id)?;
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::from(e)),
    }
}

/// Moves `task_id` from its current status to `to`, running the forward
/// protocol S0 -> S5. `statuses` is the project's already-discovered status
/// set (§4.D), used to validate `to` and to scope the locator scan.
pub fn perform_move(
    paths: &PathResolver,
    project_id: &str,
    statuses: &[String],
    task_id: &str,
    to: &str,
) -> Result<()> {
    let span = tracing::info_span!("move_task", task_id = %task_id, to = %to, from = tracing::field::Empty);
    let _enter = span.enter();

    let located = locator::locate(paths, project_id, statuses, task_id)?;
    let from = located.status;
    span.record("from", from.as_str());

    if from == to {
        return Err(Error::validation("Task is already in the target status")
            .with_details(json!({ "task_id": task_id, "status": to })));
    }
    if !statuses.iter().any(|s| s == to) {
        return Err(Error::not_found("Status not found").with_details(json!({ "status": to })));
    }

    let mut updated_meta = located.metadata;
    stamp_and_strip(&mut updated_meta, &clock::now_rfc3339());

    let tx = TxRecord::Move {
        task_id: task_id.to_string(),
        from: from.clone(),
        to: to.to_string(),
        updated_meta: updated_meta.clone(),
    };
    write_tx(paths, project_id, &tx)?; // enters S1
    tracing::info!("move transaction recorded");

    apply_move(paths, project_id, &from, to, task_id, &updated_meta)?; // S2 -> S4

    remove_tx(paths, project_id)?; // S5
    tracing::info!("move committed");
    Ok(())
}

/// Sets `updated_at` and drops the non-persisted derived fields, in case a
/// caller's metadata value happened to carry them.
fn stamp_and_strip(meta: &mut Value, now: &str) {
    if let Some(obj) = meta.as_object_mut() {
        obj.insert("updated_at".to_string(), Value::String(now.to_string()));
        obj.remove("status");
        obj.remove("title");
    }
}

/// Applies the body rename and both index rewrites (S2 -> S4), with a
/// best-effort rollback toward source if the index writes fail after the
/// body has already moved. Shared by forward progress and by recovery's
/// forward-roll branch.
fn apply_move(
    paths: &PathResolver,
    project_id: &str,
    from: &str,
    to: &str,
    task_id: &str,
    updated_meta: &Value,
) -> Result<()> {
    let src_body = status::body_path(paths, project_id, from, task_id)?;
    let dst_body = status::body_path(paths, project_id, to, task_id)?;

    if src_body.exists() && !dst_body.exists() {
        std::fs::rename(&src_body, &dst_body)?;
    }

    let mut src_index = status::read_index(paths, project_id, from)?;
    let removed = src_index.remove(task_id);
    let mut dst_index = status::read_index(paths, project_id, to)?;
    dst_index.insert(task_id.to_string(), updated_meta.clone());

    let write_result = status::write_index(paths, project_id, from, &src_index)
        .and_then(|()| status::write_index(paths, project_id, to, &dst_index));

    if let Err(err) = write_result {
        if dst_body.exists() && !src_body.exists() {
            let _ = std::fs::rename(&dst_body, &src_body);
        }
        if let Some(meta) = removed {
            if let Ok(mut restore) = status::read_index(paths, project_id, from) {
                restore.insert(task_id.to_string(), meta);
                let _ = status::write_index(paths, project_id, from, &restore);
            }
        }
        return Err(Error::integrity("Atomic move failed")
            .with_details(json!({ "task_id": task_id, "from": from, "to": to }))
            .with_source(err));
    }
    Ok(())
}

/// Runs move recovery if `.tx_move.json` exists. Returns `true` if a
/// pending transaction was found and resolved (one way or the other).
pub fn recover(paths: &PathResolver, project_id: &str, statuses: &[String]) -> Result<bool> {
    let Some(TxRecord::Move {
        task_id,
        from,
        to,
        updated_meta,
    }) = read_tx(paths, project_id)?
    else {
        return Ok(false);
    };

    let span = tracing::info_span!("recover_move", task_id = %task_id, from = %from, to = %to);
    let _enter = span.enter();

    if !statuses.iter().any(|s| s == &from) || !statuses.iter().any(|s| s == &to) {
        return Err(Error::integrity("Transaction record references unknown status")
            .with_details(json!({ "from": from, "to": to })));
    }

    let src_body = status::body_path(paths, project_id, &from, &task_id)?;
    let dst_body = status::body_path(paths, project_id, &to, &task_id)?;
    let src_index = status::read_index(paths, project_id, &from)?;
    let dst_index = status::read_index(paths, project_id, &to)?;

    let src_body_exists = src_body.exists();
    let dst_body_exists = dst_body.exists();
    let in_src_index = src_index.contains_key(&task_id);
    let in_dst_index = dst_index.contains_key(&task_id);

    // S0: the move never progressed past writing the transaction record.
    if src_body_exists && in_src_index && !dst_body_exists && !in_dst_index {
        remove_tx(paths, project_id)?;
        tracing::info!("recovered at S0, transaction discarded");
        return Ok(true);
    }
    // S5 in all but name: the move already fully committed.
    if dst_body_exists && in_dst_index && !src_body_exists && !in_src_index {
        remove_tx(paths, project_id)?;
        tracing::info!("recovered at S5, transaction already committed");
        return Ok(true);
    }
    if (src_body_exists && dst_body_exists) || (in_src_index && in_dst_index) {
        return Err(Error::integrity("Pending move cannot be reconciled").with_details(json!({
            "task_id": task_id,
            "from": from,
            "to": to,
        })));
    }

    // Partial state between S2 and S4: forward-roll to destination.
    let mut meta = if model::has_required_fields(&updated_meta) {
        updated_meta
    } else if let Some(m) = dst_index.get(&task_id) {
        m.clone()
    } else if let Some(m) = src_index.get(&task_id) {
        m.clone()
    } else {
        updated_meta
    };
    stamp_and_strip(&mut meta, &clock::now_rfc3339());

    if !dst_body_exists {
        std::fs::rename(&src_body, &dst_body)?;
    }

    let mut src_index = src_index;
    src_index.remove(&task_id);
    let mut dst_index = dst_index;
    dst_index.insert(task_id.clone(), meta);
    status::write_index(paths, project_id, &from, &src_index)?;
    status::write_index(paths, project_id, &to, &dst_index)?;

    remove_tx(paths, project_id)?;
    tracing::info!("recovered from partial S2-S4 state, rolled forward to destination");
    Ok(true)
}
