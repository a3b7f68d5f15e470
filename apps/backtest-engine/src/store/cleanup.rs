//! Removal of store scopes left behind by interrupted processes.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};

/// Result of a cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Scope directories removed.
    pub removed: Vec<PathBuf>,
    /// Scope directories that could not be removed.
    pub failed: Vec<PathBuf>,
}

/// Whether a directory name looks like a scope of the named engine.
pub(crate) fn is_scope_dir_name(dir_name: &str, engine_name: &str) -> bool {
    dir_name
        .strip_prefix(engine_name)
        .and_then(|rest| rest.strip_prefix('_'))
        .is_some_and(|id| Uuid::parse_str(id).is_ok())
}

/// Remove every `{engine_name}_{uuid}` scope under `parent` except `keep`.
///
/// Per-entry failures are logged and reported, not returned as errors.
pub fn clean_artifacts(parent: &Path, engine_name: &str, keep: Option<&Path>) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();
    if !parent.exists() {
        return Ok(report);
    }

    let entries = fs::read_dir(parent).map_err(|e| EngineError::resource(parent, e))?;
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(parent = ?parent, error = ?e, "Failed to read cache entry");
                continue;
            }
        };
        let path = entry.path();
        let is_scope = path.is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| is_scope_dir_name(name, engine_name));
        if !is_scope || keep.is_some_and(|k| k == path.as_path()) {
            continue;
        }

        match fs::remove_dir_all(&path) {
            Ok(()) => {
                debug!(path = ?path, "Removed leftover store scope");
                report.removed.push(path);
            }
            Err(e) => {
                warn!(path = ?path, error = ?e, "Failed to remove leftover store scope");
                report.failed.push(path);
            }
        }
    }

    if !report.removed.is_empty() {
        info!(
            removed = report.removed.len(),
            failed = report.failed.len(),
            "Cleaned cache artifacts"
        );
    }
    Ok(report)
}
