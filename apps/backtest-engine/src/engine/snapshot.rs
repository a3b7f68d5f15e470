//! On-disk snapshot of an engine.
//!
//! ```text
//! <dir>/
//!   {name}.state.json   engine state, run register, analysis results
//!   {name}_store/       copy of the result store scope
//! ```

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::metrics::AnalysisResults;
use crate::partition::RunRegister;

use super::state::EngineState;

const STATE_FILE_SUFFIX: &str = ".state.json";
const STORE_DIR_SUFFIX: &str = "_store";

/// Path of the state file for `name` under `dir`.
#[must_use]
pub fn state_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}{STATE_FILE_SUFFIX}"))
}

/// Path of the store copy for `name` under `dir`.
#[must_use]
pub fn store_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}{STORE_DIR_SUFFIX}"))
}

/// Everything needed to restore an engine besides its strategies and the
/// stored runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Engine name.
    pub name: String,
    /// When the snapshot was written.
    pub saved_at: DateTime<Utc>,
    /// Lifecycle flags and lookbacks.
    pub state: EngineState,
    /// Partitions of the saved run.
    pub register: RunRegister,
    /// Analysis results, if the engine was analyzed.
    #[serde(default)]
    pub results: Option<AnalysisResults>,
    /// Names of the custom metrics used by the analysis.
    #[serde(default)]
    pub metric_names: Vec<String>,
}

impl Snapshot {
    /// Write the state file, replacing any previous one.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).map_err(|e| EngineError::resource(dir, e))?;
        let path = state_path(dir, &self.name);
        let bytes = serde_json::to_vec_pretty(self)?;
        fs::write(&path, bytes).map_err(|e| EngineError::resource(&path, e))?;
        Ok(path)
    }

    /// Read the state file of `name` under `dir`.
    pub fn read(dir: &Path, name: &str) -> Result<Self> {
        let path = state_path(dir, name);
        let file = File::open(&path).map_err(|e| EngineError::resource(&path, e))?;
        let snapshot: Self = serde_json::from_reader(BufReader::new(file))?;
        if snapshot.name != name {
            return Err(EngineError::validation(format!(
                "snapshot at '{}' belongs to engine '{}', not '{name}'",
                path.display(),
                snapshot.name
            )));
        }
        Ok(snapshot)
    }
}
