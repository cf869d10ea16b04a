//! Multi-instrument batch runner
//!
//! Each symbol is backtested independently, in parallel on the rayon pool
//! unless sequential mode is requested. A symbol that fails (missing data,
//! download error, bad parameters) is recorded as failed and the batch
//! carries on.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::{error, info};

use crate::backtest::Backtester;
use crate::config::Instrument;
use crate::diagnostics::Diagnostics;
use crate::{data, strategies, Config, PerformanceMetrics, Position, Symbol};

/// How to run a batch
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub sequential: bool,
    pub show_progress: bool,
    /// Fetch missing or stale cache files before running
    pub download: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            sequential: false,
            show_progress: true,
            download: true,
        }
    }
}

/// Summary of one successful instrument run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub metrics: PerformanceMetrics,
    pub final_position: Position,
    pub bars: usize,
}

/// Outcome for one configured instrument
#[derive(Debug, Clone)]
pub struct InstrumentRun {
    pub instrument: Instrument,
    pub outcome: Result<RunSummary, String>,
}

/// Load data, build the strategy and run one symbol
pub fn run_symbol(config: &Config, symbol: &Symbol) -> Result<RunSummary> {
    let candles = data::load_symbol(
        &config.backtest.data_dir,
        symbol,
        config.universe.start,
        config.universe.end,
    )?;

    let strategy = strategies::create_strategy(config)?;
    let mut diagnostics = Diagnostics::create(
        &config.backtest.results_dir,
        symbol,
        config.backtest.log_sizing,
        config.backtest.log_orders,
    )?;

    let mut backtester = Backtester::new(config.clone(), strategy);
    let result = backtester.run(symbol, &candles, &mut diagnostics)?;

    Ok(RunSummary {
        metrics: result.metrics,
        final_position: result.final_position,
        bars: candles.len(),
    })
}

/// Run every configured instrument.
///
/// A symbol listed under several categories is simulated once and its
/// result shared, so each symbol's diagnostics files have a single writer.
pub fn run_batch(config: &Config, options: &BatchOptions) -> Result<Vec<InstrumentRun>> {
    let instruments = config.universe.instruments();
    let symbols = config.universe.symbols();

    let mut failed: HashMap<Symbol, String> = HashMap::new();
    if options.download {
        for (symbol, reason) in data::ensure_data_available_sync(
            &config.backtest.data_dir,
            &symbols,
            config.universe.start,
            config.universe.end,
            false,
        )? {
            failed.insert(symbol, reason);
        }
    }

    let pb = if options.show_progress {
        let pb = ProgressBar::new(symbols.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█░ "),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let run_one = |symbol: &Symbol| -> (Symbol, Result<RunSummary, String>) {
        let outcome = match failed.get(symbol) {
            Some(reason) => Err(reason.clone()),
            None => run_symbol(config, symbol).map_err(|e| format!("{:#}", e)),
        };
        if let Err(ref e) = outcome {
            error!(symbol = %symbol, "Backtest failed: {}", e);
        }
        pb.set_message(symbol.to_string());
        pb.inc(1);
        (symbol.clone(), outcome)
    };

    let results: HashMap<Symbol, Result<RunSummary, String>> = if options.sequential {
        symbols.iter().map(run_one).collect()
    } else {
        symbols.par_iter().map(run_one).collect()
    };
    pb.finish_and_clear();

    let runs: Vec<InstrumentRun> = instruments
        .into_iter()
        .map(|instrument| {
            let outcome = results
                .get(&instrument.symbol)
                .cloned()
                .unwrap_or_else(|| Err("not run".to_string()));
            InstrumentRun { instrument, outcome }
        })
        .collect();

    let ok = runs.iter().filter(|r| r.outcome.is_ok()).count();
    info!("Batch finished: {} succeeded, {} failed", ok, runs.len() - ok);

    Ok(runs)
}
