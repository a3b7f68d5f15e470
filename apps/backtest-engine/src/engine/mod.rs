//! Engine lifecycle: the only public entry point.
//!
//! ```text
//! Idle --run()--> Ran --analyze()--> Analyzed
//!   ^               |                   |
//!   +---reset()-----+-------------------+
//!
//! any error in run()/analyze() --> store torn down --> Closed
//! close() --> Closed          load() --> snapshot state
//! ```
//!
//! Every `run()` wipes the previous run's results before planning, so
//! results of two runs never mix. Errors inside `run()` or `analyze()`
//! leave no cached data behind.

mod snapshot;
mod state;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, error, info, warn};

use crate::config::{EngineConfig, RunConfig};
use crate::data::TimeSeriesFrame;
use crate::dispatch::{Job, JobDispatcher, RunBalances};
use crate::error::{EngineError, Result};
use crate::metrics::{AnalysisResults, MetricSet, MetricsAnalyzer};
use crate::parallel::{Concurrency, WorkerPool};
use crate::partition::{Partition, RunRegister, StartIndex, runthrough_window};
use crate::store::{MetadataKind, ResultKey, ResultStore, clean_artifacts};
use crate::strategy::{RunResult, Strategy};

pub use snapshot::{Snapshot, state_path, store_path};
pub use state::{EngineState, Lifecycle};

/// Metadata that survives `reset()`.
const REGISTRATION_METADATA: [MetadataKind; 2] =
    [MetadataKind::Lookbacks, MetadataKind::StrategySources];

/// Sampling backtest engine.
pub struct Engine {
    config: EngineConfig,
    strategies: Vec<Box<dyn Strategy>>,
    store: ResultStore,
    register: RunRegister,
    state: EngineState,
    closed: bool,
    rng: StdRng,
    pool: WorkerPool,
    results: Option<AnalysisResults>,
    run_balances: RunBalances,
    metric_names: Vec<String>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.config.name)
            .field("lifecycle", &self.lifecycle())
            .field("strategies", &self.strategies)
            .field("store", &self.store.root())
            .field("runs", &self.register.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine and its result store scope.
    ///
    /// Strategy names must be non-empty, filesystem-safe, unique, and no
    /// name may contain another.
    pub fn new(config: EngineConfig, strategies: Vec<Box<dyn Strategy>>) -> Result<Self> {
        if !is_safe_name(&config.name) {
            return Err(EngineError::validation(format!(
                "engine name '{}' must be non-empty ASCII letters, digits, '-' or '_'",
                config.name
            )));
        }
        validate_strategies(&strategies)?;
        let pool = WorkerPool::new(Concurrency::from_n_jobs(config.n_jobs)?);

        if config.clean_cache_artifacts {
            clean_artifacts(&config.cache_dir, &config.name, None)?;
        }
        let store = ResultStore::create(&config.cache_dir, &config.name)?;

        let rng = config
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        let state = EngineState::new(lookbacks_of(&strategies));

        let engine = Self {
            config,
            strategies,
            store,
            register: RunRegister::new(),
            state,
            closed: false,
            rng,
            pool,
            results: None,
            run_balances: RunBalances::new(),
            metric_names: Vec::new(),
        };
        engine.write_registration_metadata()?;

        info!(
            engine = %engine.config.name,
            strategies = engine.strategies.len(),
            workers = %pool.concurrency(),
            store = ?engine.store.root(),
            "Engine created"
        );
        Ok(engine)
    }

    // ============================================
    // Accessors
    // ============================================

    /// Engine name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Construction settings.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current lifecycle position.
    #[must_use]
    pub const fn lifecycle(&self) -> Lifecycle {
        if self.closed {
            Lifecycle::Closed
        } else {
            self.state.lifecycle()
        }
    }

    /// Lifecycle flags and lookbacks.
    #[must_use]
    pub const fn state(&self) -> &EngineState {
        &self.state
    }

    /// Partitions of the current run.
    #[must_use]
    pub const fn register(&self) -> &RunRegister {
        &self.register
    }

    /// Analysis results of the current run, if analyzed.
    #[must_use]
    pub const fn results(&self) -> Option<&AnalysisResults> {
        self.results.as_ref()
    }

    /// Start/end balance of every run of the current run.
    #[must_use]
    pub const fn run_balances(&self) -> &RunBalances {
        &self.run_balances
    }

    /// Strategy name to lookback.
    #[must_use]
    pub const fn lookbacks(&self) -> &BTreeMap<String, usize> {
        &self.state.lookbacks
    }

    /// Names of the custom metrics of the last analysis.
    #[must_use]
    pub fn metric_names(&self) -> &[String] {
        &self.metric_names
    }

    /// Names of the registered strategies.
    pub fn strategy_names(&self) -> impl Iterator<Item = &str> {
        self.strategies.iter().map(|s| s.name())
    }

    /// Directory currently backing the result store.
    #[must_use]
    pub fn store_root(&self) -> &Path {
        self.store.root()
    }

    /// Whether the store is a snapshot this engine does not own.
    #[must_use]
    pub const fn is_snapshot_backed(&self) -> bool {
        !self.store.is_owned()
    }

    // ============================================
    // Run & analyze
    // ============================================

    /// Plan partitions for every strategy, run them all, and store the
    /// results. Replaces any previous run.
    ///
    /// On error the store is torn down and the engine is closed.
    pub fn run(
        &mut self,
        price: &TimeSeriesFrame,
        volume: Option<&TimeSeriesFrame>,
        run_config: &RunConfig,
    ) -> Result<RunBalances> {
        self.ensure_open()?;
        let outcome = self.run_inner(price, volume, run_config);
        self.fail_fast(outcome)
    }

    fn run_inner(
        &mut self,
        price: &TimeSeriesFrame,
        volume: Option<&TimeSeriesFrame>,
        run_config: &RunConfig,
    ) -> Result<RunBalances> {
        self.wipe(&REGISTRATION_METADATA)?;

        if run_config.reference_currency.is_empty() {
            return Err(EngineError::validation("reference currency must not be empty"));
        }

        let planner = run_config.planner();
        for strategy in &self.strategies {
            let plan = planner.plan(price.len(), strategy.lookback(), &mut self.rng)?;
            self.register.insert_plan(strategy.name(), &plan);
            if run_config.run_through {
                let window = runthrough_window(price.len(), strategy.lookback())?;
                self.register
                    .insert(strategy.name(), Partition::new(window, StartIndex::Runthrough));
            }
        }

        let mut jobs = Vec::with_capacity(self.register.len());
        for (strategy_index, strategy) in self.strategies.iter().enumerate() {
            jobs.extend(self.register.partitions(strategy.name()).map(|partition| Job {
                strategy_index,
                reference_currency: run_config.reference_currency.clone(),
                partition,
            }));
        }

        info!(
            engine = %self.config.name,
            jobs = jobs.len(),
            series_len = price.len(),
            budget = %run_config.max_total_runs,
            run_through = run_config.run_through,
            "Starting run"
        );

        let balances =
            JobDispatcher::new(&self.strategies, &self.store, self.pool).dispatch(&jobs, price, volume)?;
        self.store.put_metadata(MetadataKind::RunBalances, &balances)?;

        self.state.mark_ran(&run_config.reference_currency);
        self.run_balances.clone_from(&balances);

        info!(engine = %self.config.name, runs = balances.len(), "Run complete");
        Ok(balances)
    }

    /// Reduce every stored run with the standard metrics and `custom`
    /// (the default custom set when `None`).
    ///
    /// A repeated call without an intervening `run()` keeps the previous
    /// results and only warns. On error the store is torn down and the
    /// engine is closed.
    pub fn analyze(&mut self, custom: Option<MetricSet>) -> Result<&AnalysisResults> {
        self.ensure_open()?;

        if self.state.is_analyzed {
            warn!(
                engine = %self.config.name,
                "analyze() called again without a new run(); keeping previous results"
            );
        } else {
            let outcome = self.analyze_inner(custom);
            let (results, metric_names) = self.fail_fast(outcome)?;
            self.results = Some(results);
            self.metric_names = metric_names;
            self.state.mark_analyzed();
        }

        self.results
            .as_ref()
            .ok_or_else(|| EngineError::invalid_state("analysis flagged complete without results"))
    }

    fn analyze_inner(&self, custom: Option<MetricSet>) -> Result<(AnalysisResults, Vec<String>)> {
        if !self.state.has_run {
            return Err(EngineError::invalid_state("analyze() requires a completed run()"));
        }
        let analyzer = MetricsAnalyzer::new(custom, self.pool);
        let metric_names = analyzer.custom_set().metric_names();
        let results = analyzer.analyze(&self.store)?;
        Ok((results, metric_names))
    }

    /// Load one stored run.
    ///
    /// Without `window_size` the largest window is used; without
    /// `start_index` the runthrough partition is preferred, otherwise the
    /// smallest start. A missing result does not close the engine.
    pub fn load_result(
        &self,
        strategy: &str,
        window_size: Option<usize>,
        start_index: Option<StartIndex>,
    ) -> Result<RunResult> {
        self.ensure_open()?;
        if !self.state.has_run {
            return Err(EngineError::invalid_state("load_result() requires a completed run()"));
        }
        let partition = self.register.resolve(strategy, window_size, start_index)?;
        debug!(strategy, partition = %partition, "Loading result");
        self.store.get(&ResultKey::new(strategy, partition))
    }

    // ============================================
    // Snapshots
    // ============================================

    /// Write `dir/{name}.state.json` and copy the store to `dir/{name}_store/`.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        self.ensure_open()?;
        let store_copy = store_path(dir, &self.config.name);

        if same_dir(self.store.root(), &store_copy) {
            debug!(store = ?store_copy, "Store already lives at snapshot location");
        } else {
            self.store.copy_to(&store_copy)?;
        }

        let snapshot = Snapshot {
            name: self.config.name.clone(),
            saved_at: Utc::now(),
            state: self.state.clone(),
            register: self.register.clone(),
            results: self.results.clone(),
            metric_names: self.metric_names.clone(),
        };
        let path = snapshot.write(dir)?;

        info!(
            engine = %self.config.name,
            state = ?path,
            store = ?store_copy,
            "Saved snapshot"
        );
        Ok(path)
    }

    /// Restore state from a snapshot written by [`Engine::save`] and read
    /// results from its store copy. The copy is never modified or removed
    /// by this engine.
    ///
    /// Also revives a closed engine.
    pub fn load(&mut self, dir: &Path) -> Result<()> {
        let snapshot = Snapshot::read(dir, &self.config.name)?;
        let store = ResultStore::open_snapshot(&store_path(dir, &self.config.name))?;
        let run_balances = store
            .get_metadata::<RunBalances>(MetadataKind::RunBalances)?
            .unwrap_or_default();

        for name in snapshot.state.lookbacks.keys() {
            if !self.strategies.iter().any(|s| s.name() == name) {
                warn!(strategy = %name, "Snapshot strategy is not registered with this engine");
            }
        }

        let mut previous = std::mem::replace(&mut self.store, store);
        if let Err(e) = previous.teardown() {
            warn!(error = %e, "Failed to tear down replaced result store");
        }

        self.state = snapshot.state;
        self.register = snapshot.register;
        self.results = snapshot.results;
        self.metric_names = snapshot.metric_names;
        self.run_balances = run_balances;
        self.closed = false;

        info!(
            engine = %self.config.name,
            saved_at = %snapshot.saved_at,
            lifecycle = %self.lifecycle(),
            runs = self.register.len(),
            "Loaded snapshot"
        );
        Ok(())
    }

    // ============================================
    // Reset & close
    // ============================================

    /// Drop the current run and its analysis, keeping strategies.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.wipe(&REGISTRATION_METADATA)?;
        info!(engine = %self.config.name, "Engine reset");
        Ok(())
    }

    /// Replace the registered strategies. Drops the current run.
    pub fn register_strategies(&mut self, strategies: Vec<Box<dyn Strategy>>) -> Result<()> {
        self.ensure_open()?;
        validate_strategies(&strategies)?;
        self.wipe(&[])?;
        self.state.lookbacks = lookbacks_of(&strategies);
        self.strategies = strategies;
        self.write_registration_metadata()?;
        info!(
            engine = %self.config.name,
            strategies = self.strategies.len(),
            "Registered strategies"
        );
        Ok(())
    }

    /// Release the result store. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.discard_run();
        self.store.teardown()?;
        info!(engine = %self.config.name, "Engine closed");
        Ok(())
    }

    // ============================================
    // Internals
    // ============================================

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(EngineError::Closed {
                engine: self.config.name.clone(),
            });
        }
        Ok(())
    }

    /// Tear everything down if `outcome` is an error.
    fn fail_fast<T>(&mut self, outcome: Result<T>) -> Result<T> {
        if let Err(e) = &outcome {
            error!(
                engine = %self.config.name,
                code = %e.code(),
                error = %e,
                "Engine operation failed; tearing down result store"
            );
            self.closed = true;
            self.discard_run();
            if let Err(teardown) = self.store.teardown() {
                error!(error = %teardown, "Teardown after failure also failed");
            }
        }
        outcome
    }

    fn discard_run(&mut self) {
        self.register.clear();
        self.results = None;
        self.run_balances.clear();
        self.metric_names.clear();
        self.state.clear_run();
    }

    /// Drop run data from memory and the store, keeping `keep` metadata.
    /// A snapshot-backed engine moves to a fresh owned scope instead.
    fn wipe(&mut self, keep: &[MetadataKind]) -> Result<()> {
        if self.store.is_owned() {
            self.store.clear(keep)?;
        } else {
            info!(
                engine = %self.config.name,
                snapshot = ?self.store.root(),
                "Detaching from snapshot store"
            );
            self.store = ResultStore::create(&self.config.cache_dir, &self.config.name)?;
            self.write_registration_metadata()?;
        }
        self.discard_run();
        Ok(())
    }

    fn write_registration_metadata(&self) -> Result<()> {
        self.store
            .put_metadata(MetadataKind::Lookbacks, &lookbacks_of(&self.strategies))?;
        if self.config.record_strategy_sources {
            let sources: BTreeMap<&str, String> = self
                .strategies
                .iter()
                .filter_map(|s| Some((s.name(), s.source()?)))
                .collect();
            self.store.put_metadata(MetadataKind::StrategySources, &sources)?;
        }
        Ok(())
    }
}

fn lookbacks_of(strategies: &[Box<dyn Strategy>]) -> BTreeMap<String, usize> {
    strategies
        .iter()
        .map(|s| (s.name().to_string(), s.lookback()))
        .collect()
}

fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Reject empty lists, unsafe names, duplicates, and names contained in
/// other names (result file names are prefixed by the strategy name).
fn validate_strategies(strategies: &[Box<dyn Strategy>]) -> Result<()> {
    if strategies.is_empty() {
        return Err(EngineError::validation("at least one strategy is required"));
    }
    for strategy in strategies {
        if !is_safe_name(strategy.name()) {
            return Err(EngineError::validation(format!(
                "strategy name '{}' must be non-empty ASCII letters, digits, '-' or '_'",
                strategy.name()
            )));
        }
    }
    for (i, a) in strategies.iter().enumerate() {
        for b in &strategies[i + 1..] {
            let (a, b) = (a.name(), b.name());
            if a == b {
                return Err(EngineError::DuplicateName {
                    message: format!("'{a}' is registered twice"),
                });
            }
            if a.contains(b) || b.contains(a) {
                return Err(EngineError::DuplicateName {
                    message: format!("'{a}' and '{b}' overlap"),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::partition::RunBudget;
    use crate::strategy::BuyAndHold;
    use tempfile::{TempDir, tempdir};

    fn hold(name: &str, lookback: usize) -> Box<dyn Strategy> {
        Box::new(BuyAndHold::new(name, lookback, 100.0))
    }

    fn config(dir: &TempDir) -> EngineConfig {
        EngineConfig {
            name: "unit".to_string(),
            cache_dir: dir.path().to_path_buf(),
            n_jobs: 0,
            seed: Some(7),
            ..EngineConfig::default()
        }
    }

    fn price(len: usize) -> TimeSeriesFrame {
        let prices = (1..=len).map(|i| 100.0 + i as f64).collect();
        match TimeSeriesFrame::from_pairs([("BTC", "EUR", prices)]) {
            Ok(f) => f,
            Err(e) => panic!("frame should build: {e}"),
        }
    }

    #[test]
    fn test_validate_strategy_names() {
        assert!(validate_strategies(&[hold("alpha", 0), hold("beta", 0)]).is_ok());

        let Err(dup) = validate_strategies(&[hold("alpha", 0), hold("alpha", 1)]) else {
            panic!("duplicate should fail");
        };
        assert_eq!(dup.code(), ErrorCode::DuplicateName);

        let Err(overlap) = validate_strategies(&[hold("mom", 0), hold("momentum", 0)]) else {
            panic!("overlap should fail");
        };
        assert_eq!(overlap.code(), ErrorCode::DuplicateName);

        let Err(unsafe_name) = validate_strategies(&[hold("a/b", 0)]) else {
            panic!("unsafe name should fail");
        };
        assert_eq!(unsafe_name.code(), ErrorCode::Validation);

        assert!(validate_strategies(&[]).is_err());
    }

    #[test]
    fn test_new_writes_registration_metadata() {
        let Ok(dir) = tempdir() else {
            panic!("tempdir should be created");
        };
        let cfg = EngineConfig {
            record_strategy_sources: true,
            ..config(&dir)
        };
        let Ok(engine) = Engine::new(cfg, vec![hold("hold", 3)]) else {
            panic!("engine should be created");
        };
        assert_eq!(engine.lifecycle(), Lifecycle::Idle);
        assert_eq!(engine.lookbacks().get("hold"), Some(&3));

        let Ok(Some(sources)) = engine
            .store
            .get_metadata::<BTreeMap<String, String>>(MetadataKind::StrategySources)
        else {
            panic!("sources should be recorded");
        };
        assert!(sources["hold"].contains("lookback=3"));
    }

    #[test]
    fn test_run_then_reset() {
        let Ok(dir) = tempdir() else {
            panic!("tempdir should be created");
        };
        let Ok(mut engine) = Engine::new(config(&dir), vec![hold("hold", 2)]) else {
            panic!("engine should be created");
        };
        let run = RunConfig::new("EUR")
            .with_run_lengths(3, Some(5))
            .with_budget(RunBudget::AllOnce);

        let Ok(balances) = engine.run(&price(20), None, &run) else {
            panic!("run should succeed");
        };
        // one start per window plus the runthrough
        assert_eq!(balances.len(), 4);
        assert_eq!(engine.lifecycle(), Lifecycle::Ran);
        assert_eq!(engine.state().reference_currency.as_deref(), Some("EUR"));

        assert!(engine.reset().is_ok());
        assert_eq!(engine.lifecycle(), Lifecycle::Idle);
        assert!(engine.register().is_empty());
        assert!(matches!(engine.store.is_empty(), Ok(true)));
        assert!(matches!(
            engine
                .store
                .get_metadata::<BTreeMap<String, usize>>(MetadataKind::Lookbacks),
            Ok(Some(_))
        ));
    }

    #[test]
    fn test_analyze_before_run_closes_engine() {
        let Ok(dir) = tempdir() else {
            panic!("tempdir should be created");
        };
        let Ok(mut engine) = Engine::new(config(&dir), vec![hold("hold", 0)]) else {
            panic!("engine should be created");
        };
        let root = engine.store_root().to_path_buf();

        let Err(err) = engine.analyze(None) else {
            panic!("analyze should fail");
        };
        assert_eq!(err.code(), ErrorCode::InvalidState);
        assert_eq!(engine.lifecycle(), Lifecycle::Closed);
        assert!(!root.exists());

        let Err(closed) = engine.reset() else {
            panic!("reset on closed engine should fail");
        };
        assert_eq!(closed.code(), ErrorCode::Closed);
    }

    #[test]
    fn test_register_strategies_resets_run() {
        let Ok(dir) = tempdir() else {
            panic!("tempdir should be created");
        };
        let Ok(mut engine) = Engine::new(config(&dir), vec![hold("hold", 1)]) else {
            panic!("engine should be created");
        };
        let run = RunConfig::new("EUR").with_budget(RunBudget::Total(3));
        assert!(engine.run(&price(12), None, &run).is_ok());

        assert!(engine.register_strategies(vec![hold("other", 4)]).is_ok());
        assert_eq!(engine.lifecycle(), Lifecycle::Idle);
        assert_eq!(engine.lookbacks().len(), 1);
        assert_eq!(engine.lookbacks().get("other"), Some(&4));
        assert_eq!(engine.strategy_names().collect::<Vec<_>>(), vec!["other"]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let Ok(dir) = tempdir() else {
            panic!("tempdir should be created");
        };
        let Ok(mut engine) = Engine::new(config(&dir), vec![hold("hold", 0)]) else {
            panic!("engine should be created");
        };
        let root = engine.store_root().to_path_buf();
        assert!(engine.close().is_ok());
        assert!(engine.close().is_ok());
        assert!(!root.exists());
        assert_eq!(engine.lifecycle(), Lifecycle::Closed);
    }

    #[test]
    fn test_clean_cache_artifacts_on_create() {
        let Ok(dir) = tempdir() else {
            panic!("tempdir should be created");
        };
        let leftover = dir.path().join(format!("unit_{}", uuid::Uuid::new_v4()));
        assert!(std::fs::create_dir_all(leftover.join("runs")).is_ok());

        let cfg = EngineConfig {
            clean_cache_artifacts: true,
            ..config(&dir)
        };
        let Ok(engine) = Engine::new(cfg, vec![hold("hold", 0)]) else {
            panic!("engine should be created");
        };
        assert!(!leftover.exists());
        assert!(engine.store_root().exists());
    }
}
