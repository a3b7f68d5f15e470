//! Engine construction settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Engine construction settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine name; prefixes the cache scope directory and snapshot files.
    #[serde(default = "default_name")]
    pub name: String,
    /// Parent directory of the result store scope.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Worker count: 0 sequential, -1 all cores, N fixed.
    #[serde(default = "default_n_jobs")]
    pub n_jobs: i64,
    /// Seed for partition sampling; entropy-seeded when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Remove leftover scopes of this engine name on construction.
    #[serde(default)]
    pub clean_cache_artifacts: bool,
    /// Record each strategy's source description as metadata.
    #[serde(default)]
    pub record_strategy_sources: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            cache_dir: default_cache_dir(),
            n_jobs: default_n_jobs(),
            seed: None,
            clean_cache_artifacts: false,
            record_strategy_sources: false,
        }
    }
}

fn default_name() -> String {
    "backtest".to_string()
}

fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("backtest-engine")
}

const fn default_n_jobs() -> i64 {
    -1
}
