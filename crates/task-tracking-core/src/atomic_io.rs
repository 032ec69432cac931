//! Atomic I/O (`spec.md` §4.B): `write_json_atomic` / `write_text_atomic` /
//! `read_json`.
//!
//! Grounded on `atomic-dir::util::write_file_atomic_at` (temp file in the
//! target directory, `fsync`, rename-replace) and on
//! `examples/original_source/scripts/storage.py`'s `write_json_atomic` /
//! `_fsync_dir`, simplified to single-file atomicity rather than
//! `atomic-dir`'s whole-directory commit protocol — this spec never swaps
//! an entire directory subtree in one step, only individual index/body
//! files.

use std::{
    fs::File,
    io::{self, Write as _},
    path::Path,
};

use rand::distr::SampleString as _;
use serde::Serialize;
use serde_json::json;

use crate::error::{Error, Result};

/// Writes `value` as JSON to `path` atomically: a uniquely named temp file
/// in the same directory, flushed and `fsync`'d, then renamed over `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| Error::unexpected("Failed to encode JSON").with_source(e))?;
    write_bytes_atomic(path, &bytes)
}

/// Writes `text` to `path` atomically. See [`write_json_atomic`].
pub fn write_text_atomic(path: &Path, text: &str) -> Result<()> {
    write_bytes_atomic(path, text.as_bytes())
}

fn write_bytes_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::unexpected("Path must have a parent directory"))?;

    let tmp_path = dir.join(format!(
        ".{}.tmp",
        rand::distr::Alphanumeric.sample_string(&mut rand::rng(), 10)
    ));

    let result: io::Result<()> = (|| {
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(data)?;
            file.flush()?;
            // Best-effort: durability is not guaranteed on fsync failure,
            // but atomicity (the rename below) still is.
            let _ = file.sync_all();
        }
        std::fs::rename(&tmp_path, path)?;
        // Best-effort directory fsync so the rename is durable after a
        // crash; failures here are not fatal either.
        let _ = fsync_dir(dir);
        Ok(())
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }

    result.map_err(Error::from)
}

fn fsync_dir(dir: &Path) -> io::Result<()> {
    let dir_handle = File::open(dir)?;
    dir_handle.sync_all()
}

/// Reads and parses a required JSON file, producing structured
/// [`crate::error::ErrorKind::Integrity`] errors (not raw I/O errors) on
/// the two failure modes the spec names: missing file and malformed JSON.
pub fn read_json_value(path: &Path) -> Result<serde_json::Value> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::integrity("Missing required file")
                .with_details(json!({ "path": path.display().to_string() })));
        }
        Err(e) => return Err(Error::from(e)),
    };

    serde_json::from_slice(&data).map_err(|e| {
        Error::integrity("Invalid JSON")
            .with_details(json!({ "path": path.display().to_string() }))
            .with_source(e)
    })
}
