//! Writing the run output: the summary table and the directory of replay documents.
//!
//! Both artifacts are first written next to their destinations (a staging directory and a
//! temporary file), then swapped into place. Nothing at the destination changes until
//! every document and the table have been written successfully.

use regex::Regex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

use crate::config::OutputConfig;
use crate::error::{CollectError, Result};
use crate::stats::SummaryRow;
use crate::summary;

/// Replay ids become file names, so only a conservative character set is accepted.
pub fn is_safe_replay_id(id: &str) -> bool {
    static SAFE: OnceLock<Regex> = OnceLock::new();
    SAFE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex"))
        .is_match(id)
}

fn restore_previous(backup: Option<&Path>, out_dir: &Path) {
    if let Some(parked) = backup {
        match fs::rename(parked, out_dir) {
            Ok(()) => debug!(path = %out_dir.display(), "Restored previous output directory"),
            Err(e) => error!(
                error = ?e,
                backup = %parked.display(),
                path = %out_dir.display(),
                "Failed to restore previous output directory"
            ),
        }
    }
}

pub fn document_file_name(replay_id: &str) -> String {
    format!("{replay_id}.json")
}

fn parent_or_cwd(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Replaces the previous run output with `rows` and `documents`.
///
/// `documents` pairs each replay id with its raw payload; callers keep it in the same order
/// and with the same ids as `rows`. Returns the SHA-256 of the written summary table.
pub fn write_run_output(
    output: &OutputConfig,
    rows: &[SummaryRow],
    documents: &[(String, serde_json::Value)],
) -> Result<String> {
    if let Some((id, _)) = documents.iter().find(|(id, _)| !is_safe_replay_id(id)) {
        return Err(CollectError::InvalidReplayId(id.clone()));
    }

    let dir_parent = parent_or_cwd(&output.output_dir);
    let summary_parent = parent_or_cwd(&output.summary_path);
    for dir in [&dir_parent, &summary_parent] {
        fs::create_dir_all(dir).map_err(|e| CollectError::io(dir, e))?;
    }

    // Stage documents.
    let staging = tempfile::Builder::new()
        .prefix(".replay-stats-")
        .tempdir_in(&dir_parent)
        .map_err(|e| CollectError::io(&dir_parent, e))?;
    for (id, document) in documents {
        let path = staging.path().join(document_file_name(id));
        let mut bytes = serde_json::to_vec_pretty(document)?;
        bytes.push(b'\n');
        fs::write(&path, bytes).map_err(|e| CollectError::io(&path, e))?;
        debug!(replay_id = %id, path = %path.display(), "Staged replay document");
    }

    // Stage summary.
    let table = summary::render_summary(rows)?;
    let sha256 = summary::digest(&table);
    let mut staged_summary =
        NamedTempFile::new_in(&summary_parent).map_err(|e| CollectError::io(&summary_parent, e))?;
    let staged_path = staged_summary.path().to_path_buf();
    staged_summary
        .write_all(&table)
        .map_err(|e| CollectError::io(&staged_path, e))?;
    staged_summary
        .flush()
        .map_err(|e| CollectError::io(&staged_path, e))?;

    // Swap into place. The previous directory is parked in a backup until the summary has
    // been persisted, so any failure below restores it.
    let out_dir = &output.output_dir;
    let backup_root = tempfile::Builder::new()
        .prefix(".replay-stats-old-")
        .tempdir_in(&dir_parent)
        .map_err(|e| CollectError::io(&dir_parent, e))?;
    let backup = if out_dir.exists() {
        let parked = backup_root.path().join("previous");
        fs::rename(out_dir, &parked).map_err(|e| CollectError::io(out_dir, e))?;
        debug!(path = %out_dir.display(), "Parked previous output directory");
        Some(parked)
    } else {
        None
    };

    if let Err(e) = fs::rename(staging.path(), out_dir) {
        restore_previous(backup.as_deref(), out_dir);
        return Err(CollectError::io(out_dir, e));
    }
    if let Err(e) = staged_summary.persist(&output.summary_path) {
        if let Err(remove_err) = fs::remove_dir_all(out_dir) {
            error!(error = ?remove_err, path = %out_dir.display(), "Failed to remove new output directory");
        }
        restore_previous(backup.as_deref(), out_dir);
        return Err(CollectError::io(&output.summary_path, e.error));
    }
    // Dropping `backup_root` deletes the previous directory.
    drop(backup_root);

    info!(
        summary_path = %output.summary_path.display(),
        output_dir = %out_dir.display(),
        rows = rows.len(),
        documents = documents.len(),
        sha256 = %sha256,
        "Wrote run output"
    );
    Ok(sha256)
}
