//! Durable keyed cache of run results.
//!
//! Each engine owns one directory scope `<cache_dir>/<engine_name>_<uuid>/`:
//!
//! ```text
//! <scope>/
//!   runs/   one JSON blob per (strategy, window, start), written once
//!   meta/   auxiliary metadata (lookbacks, strategy sources, run balances)
//! ```
//!
//! Runs are written concurrently by workers through `&self`; the write-once
//! guarantee comes from `create_new` on the blob file. A store opened from a
//! snapshot does not own its directory and is never modified or removed.

mod cleanup;
mod key;

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::strategy::RunResult;

pub use cleanup::{CleanupReport, clean_artifacts};
pub use key::{RUN_FILE_SUFFIX, ResultKey};

const RUNS_DIR: &str = "runs";
const META_DIR: &str = "meta";

// ============================================
// Metadata
// ============================================

/// Auxiliary entries stored next to the runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataKind {
    /// Strategy name to lookback.
    Lookbacks,
    /// Strategy name to source description.
    StrategySources,
    /// Result key to start/end balance.
    RunBalances,
}

impl MetadataKind {
    /// Every metadata kind.
    pub const ALL: [Self; 3] = [Self::Lookbacks, Self::StrategySources, Self::RunBalances];

    /// File name inside `meta/`.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Lookbacks => "lookbacks.json",
            Self::StrategySources => "strategy_sources.json",
            Self::RunBalances => "run_balances.json",
        }
    }
}

// ============================================
// Store
// ============================================

/// Directory-backed result cache.
#[derive(Debug)]
pub struct ResultStore {
    root: PathBuf,
    owned: bool,
    torn_down: bool,
}

impl ResultStore {
    /// Create a fresh owned scope under `cache_dir`.
    pub fn create(cache_dir: &Path, engine_name: &str) -> Result<Self> {
        let root = cache_dir.join(format!("{engine_name}_{}", Uuid::new_v4()));
        for dir in [RUNS_DIR, META_DIR] {
            let path = root.join(dir);
            fs::create_dir_all(&path).map_err(|e| EngineError::resource(&path, e))?;
        }
        debug!(root = ?root, "Created result store scope");
        Ok(Self {
            root,
            owned: true,
            torn_down: false,
        })
    }

    /// Open a snapshot copy without taking ownership of it.
    pub fn open_snapshot(path: &Path) -> Result<Self> {
        let runs = path.join(RUNS_DIR);
        if !runs.is_dir() {
            return Err(EngineError::resource(
                &runs,
                io::Error::new(io::ErrorKind::NotFound, "snapshot has no runs directory"),
            ));
        }
        Ok(Self {
            root: path.to_path_buf(),
            owned: false,
            torn_down: false,
        })
    }

    /// Scope directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether this store will delete its directory on teardown.
    #[must_use]
    pub const fn is_owned(&self) -> bool {
        self.owned
    }

    /// Whether [`ResultStore::teardown`] has run.
    #[must_use]
    pub const fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    fn ensure_live(&self) -> Result<()> {
        if self.torn_down {
            return Err(EngineError::invalid_state("result store has been torn down"));
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_live()?;
        if !self.owned {
            return Err(EngineError::invalid_state(
                "result store is a read-only snapshot",
            ));
        }
        Ok(())
    }

    fn run_path(&self, key: &ResultKey) -> PathBuf {
        self.root.join(RUNS_DIR).join(key.file_name())
    }

    fn meta_path(&self, kind: MetadataKind) -> PathBuf {
        self.root.join(META_DIR).join(kind.file_name())
    }

    // ============================================
    // Runs
    // ============================================

    /// Store a run result. Fails with `DuplicateResult` if the key exists.
    pub fn put(&self, key: &ResultKey, result: &RunResult) -> Result<()> {
        self.ensure_writable()?;
        let path = self.run_path(key);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => EngineError::DuplicateResult {
                    strategy: key.strategy.clone(),
                    partition: key.partition,
                },
                _ => EngineError::resource(&path, e),
            })?;

        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, result)?;
        writer.flush().map_err(|e| EngineError::resource(&path, e))
    }

    /// Load a run result. Fails with `NotFound` if the key is absent.
    pub fn get(&self, key: &ResultKey) -> Result<RunResult> {
        self.ensure_live()?;
        let path = self.run_path(key);
        let file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => EngineError::NotFound {
                strategy: key.strategy.clone(),
                partition: key.partition.to_string(),
            },
            _ => EngineError::resource(&path, e),
        })?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Every stored key, sorted.
    pub fn keys(&self) -> Result<Vec<ResultKey>> {
        self.ensure_live()?;
        let runs = self.root.join(RUNS_DIR);
        let entries = fs::read_dir(&runs).map_err(|e| EngineError::resource(&runs, e))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::resource(&runs, e))?;
            let name = entry.file_name();
            match name.to_str().and_then(ResultKey::from_file_name) {
                Some(key) => keys.push(key),
                None => warn!(file = ?name, "Ignoring foreign file in result store"),
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Number of stored runs.
    pub fn len(&self) -> Result<usize> {
        Ok(self.keys()?.len())
    }

    /// Whether no runs are stored.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove every run and every metadata entry not listed in `keep`.
    pub fn clear(&self, keep: &[MetadataKind]) -> Result<()> {
        self.ensure_writable()?;
        let runs = self.root.join(RUNS_DIR);
        fs::remove_dir_all(&runs).map_err(|e| EngineError::resource(&runs, e))?;
        fs::create_dir_all(&runs).map_err(|e| EngineError::resource(&runs, e))?;

        for kind in MetadataKind::ALL.into_iter().filter(|k| !keep.contains(k)) {
            let path = self.meta_path(kind);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(EngineError::resource(&path, e)),
            }
        }
        debug!(root = ?self.root, kept = ?keep, "Cleared result store");
        Ok(())
    }

    // ============================================
    // Metadata
    // ============================================

    /// Write a metadata entry, replacing any previous value.
    pub fn put_metadata<T: Serialize>(&self, kind: MetadataKind, value: &T) -> Result<()> {
        self.ensure_writable()?;
        let path = self.meta_path(kind);
        let bytes = serde_json::to_vec_pretty(value)?;
        fs::write(&path, bytes).map_err(|e| EngineError::resource(&path, e))
    }

    /// Read a metadata entry; `None` if it was never written.
    pub fn get_metadata<T: DeserializeOwned>(&self, kind: MetadataKind) -> Result<Option<T>> {
        self.ensure_live()?;
        let path = self.meta_path(kind);
        match File::open(&path) {
            Ok(file) => Ok(Some(serde_json::from_reader(BufReader::new(file))?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::resource(&path, e)),
        }
    }

    // ============================================
    // Lifecycle
    // ============================================

    /// Copy the whole scope to `dest`, replacing anything already there.
    pub fn copy_to(&self, dest: &Path) -> Result<()> {
        self.ensure_live()?;
        if dest.exists() {
            fs::remove_dir_all(dest).map_err(|e| EngineError::resource(dest, e))?;
        }
        copy_dir_all(&self.root, dest)?;
        info!(from = ?self.root, to = ?dest, "Copied result store");
        Ok(())
    }

    /// Remove the scope directory. Idempotent; a no-op for snapshot stores.
    pub fn teardown(&mut self) -> Result<()> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;
        if !self.owned {
            debug!(root = ?self.root, "Skipping teardown of snapshot store");
            return Ok(());
        }

        match fs::remove_dir_all(&self.root) {
            Ok(()) => {
                debug!(root = ?self.root, "Tore down result store");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                error!(root = ?self.root, error = ?e, "Failed to tear down result store");
                Err(EngineError::resource(&self.root, e))
            }
        }
    }
}

impl Drop for ResultStore {
    fn drop(&mut self) {
        if self.owned && !self.torn_down {
            if let Err(e) = self.teardown() {
                warn!(error = %e, "Result store teardown on drop failed");
            }
        }
    }
}

fn copy_dir_all(src: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest).map_err(|e| EngineError::resource(dest, e))?;
    let entries = fs::read_dir(src).map_err(|e| EngineError::resource(src, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::resource(src, e))?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        if from.is_dir() {
            copy_dir_all(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(|e| EngineError::resource(&from, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::error::ErrorCode;
    use crate::partition::{Partition, StartIndex};
    use tempfile::{TempDir, tempdir};

    fn setup() -> (TempDir, ResultStore) {
        let Ok(dir) = tempdir() else {
            panic!("tempdir should be created");
        };
        let Ok(store) = ResultStore::create(dir.path(), "engine") else {
            panic!("store should be created");
        };
        (dir, store)
    }

    fn key(window: usize, start: StartIndex) -> ResultKey {
        ResultKey::new("hold", Partition::new(window, start))
    }

    fn result(balances: Vec<f64>) -> RunResult {
        RunResult {
            merged_total_balances: balances,
            ..RunResult::default()
        }
    }

    #[test]
    fn test_put_get() {
        let (_dir, store) = setup();
        let k = key(3, StartIndex::At(1));
        if let Err(e) = store.put(&k, &result(vec![1.0, 2.0])) {
            panic!("put failed: {e}");
        }
        let Ok(loaded) = store.get(&k) else {
            panic!("get should succeed");
        };
        assert_eq!(loaded.merged_total_balances, vec![1.0, 2.0]);
    }

    #[test]
    fn test_put_is_write_once() {
        let (_dir, store) = setup();
        let k = key(3, StartIndex::At(1));
        assert!(store.put(&k, &result(vec![1.0])).is_ok());
        let Err(err) = store.put(&k, &result(vec![2.0])) else {
            panic!("second put should fail");
        };
        assert_eq!(err.code(), ErrorCode::DuplicateResult);
        let Ok(loaded) = store.get(&k) else {
            panic!("get should succeed");
        };
        assert_eq!(loaded.merged_total_balances, vec![1.0]);
    }

    #[test]
    fn test_get_missing() {
        let (_dir, store) = setup();
        let Err(err) = store.get(&key(9, StartIndex::Runthrough)) else {
            panic!("get should fail");
        };
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn test_keys_sorted() {
        let (_dir, store) = setup();
        let keys = [
            key(5, StartIndex::Runthrough),
            key(3, StartIndex::At(2)),
            key(3, StartIndex::At(0)),
        ];
        for k in &keys {
            assert!(store.put(k, &result(vec![1.0])).is_ok());
        }
        let Ok(stored) = store.keys() else {
            panic!("keys should succeed");
        };
        assert_eq!(
            stored,
            vec![
                key(3, StartIndex::At(0)),
                key(3, StartIndex::At(2)),
                key(5, StartIndex::Runthrough)
            ]
        );
        assert!(matches!(store.len(), Ok(3)));
    }

    #[test]
    fn test_clear_keeps_selected_metadata() {
        let (_dir, store) = setup();
        let lookbacks = BTreeMap::from([("hold".to_string(), 2_usize)]);
        assert!(store.put(&key(3, StartIndex::At(0)), &result(vec![1.0])).is_ok());
        assert!(store.put_metadata(MetadataKind::Lookbacks, &lookbacks).is_ok());
        assert!(store.put_metadata(MetadataKind::RunBalances, &lookbacks).is_ok());

        assert!(store.clear(&[MetadataKind::Lookbacks]).is_ok());

        assert!(matches!(store.is_empty(), Ok(true)));
        let kept: Option<BTreeMap<String, usize>> = match store.get_metadata(MetadataKind::Lookbacks) {
            Ok(v) => v,
            Err(e) => panic!("metadata read failed: {e}"),
        };
        assert_eq!(kept, Some(lookbacks));
        assert!(matches!(
            store.get_metadata::<BTreeMap<String, usize>>(MetadataKind::RunBalances),
            Ok(None)
        ));
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let (_dir, mut store) = setup();
        let root = store.root().to_path_buf();
        assert!(root.exists());
        assert!(store.teardown().is_ok());
        assert!(store.teardown().is_ok());
        assert!(!root.exists());
        assert!(store.is_torn_down());
        assert!(store.keys().is_err());
    }

    #[test]
    fn test_drop_removes_scope() {
        let (_dir, store) = setup();
        let root = store.root().to_path_buf();
        drop(store);
        assert!(!root.exists());
    }

    #[test]
    fn test_snapshot_store_is_read_only_and_kept() {
        let (dir, store) = setup();
        let k = key(4, StartIndex::At(1));
        assert!(store.put(&k, &result(vec![3.0, 4.0])).is_ok());

        let copy = dir.path().join("copy");
        assert!(store.copy_to(&copy).is_ok());

        let Ok(mut snapshot) = ResultStore::open_snapshot(&copy) else {
            panic!("snapshot should open");
        };
        assert!(!snapshot.is_owned());
        assert!(snapshot.get(&k).is_ok());
        let Err(err) = snapshot.put(&key(1, StartIndex::At(0)), &result(vec![1.0])) else {
            panic!("snapshot put should fail");
        };
        assert_eq!(err.code(), ErrorCode::InvalidState);

        assert!(snapshot.teardown().is_ok());
        drop(snapshot);
        assert!(copy.join("runs").exists());
    }

    #[test]
    fn test_open_snapshot_missing() {
        let Ok(dir) = tempdir() else {
            panic!("tempdir should be created");
        };
        let Err(err) = ResultStore::open_snapshot(&dir.path().join("nope")) else {
            panic!("open should fail");
        };
        assert_eq!(err.code(), ErrorCode::Resource);
    }
}
