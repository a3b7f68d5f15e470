//! Backtest Engine Binary
//!
//! Runs a buy-and-hold demonstration over a synthetic random walk and logs
//! the mean standard metrics of every sampled window.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin backtest-engine
//! ```
//!
//! # Environment Variables
//!
//! - `BACKTEST_CONFIG`: Path to the YAML config (default: config.yaml; built-in
//!   defaults when the file does not exist)
//! - `RUST_LOG`: Overrides `logging.level`

use std::path::Path;

use anyhow::Context;
use backtest_engine::config::{Config, load_config};
use backtest_engine::metrics::standard_set;
use backtest_engine::observability::init_tracing;
use backtest_engine::{BuyAndHold, Engine, Strategy, TimeSeriesFrame};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

/// Length of the synthetic series.
const SERIES_LEN: usize = 500;

/// Seed for the synthetic series when the config has none.
const DEFAULT_SERIES_SEED: u64 = 42;

fn main() -> anyhow::Result<()> {
    let config = read_config()?;
    init_tracing(&config.logging)?;

    let seed = config.engine.seed.unwrap_or(DEFAULT_SERIES_SEED);
    let price = random_walk(&config.run.reference_currency, SERIES_LEN, seed)?;

    let strategies: Vec<Box<dyn Strategy>> = vec![
        Box::new(BuyAndHold::new("hold-fast", 5, 1_000.0)),
        Box::new(BuyAndHold::new("hold-slow", 50, 1_000.0)),
    ];
    let names: Vec<String> = strategies.iter().map(|s| s.name().to_string()).collect();

    let mut engine = Engine::new(config.engine.clone(), strategies)?;
    let balances = engine.run(&price, None, &config.run)?;
    info!(runs = balances.len(), "Sampled windows complete");

    let results = engine.analyze(None)?;
    let metrics = standard_set().metric_names();
    for name in &names {
        for metric in &metrics {
            if let Some(mean) = results.standard_mean(name, metric) {
                info!(strategy = %name, metric = %metric, mean, "Mean standard metric");
            }
        }
    }

    engine.close()?;
    Ok(())
}

/// Load `BACKTEST_CONFIG`, falling back to defaults when the file is absent.
fn read_config() -> anyhow::Result<Config> {
    let path = std::env::var("BACKTEST_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    if !Path::new(&path).exists() {
        return Ok(Config::default());
    }
    load_config(Some(&path)).with_context(|| format!("loading {path}"))
}

/// Geometric random walk quoted in `quote`.
fn random_walk(quote: &str, len: usize, seed: u64) -> anyhow::Result<TimeSeriesFrame> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut price = 100.0_f64;
    let series = (0..len)
        .map(|_| {
            price *= 1.0 + rng.random_range(-0.02..0.021);
            price
        })
        .collect();
    Ok(TimeSeriesFrame::from_pairs([("SYN", quote, series)])?)
}
