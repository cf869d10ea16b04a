//! Backtest command implementation

use anyhow::Result;
use elder_screen::report::Report;
use elder_screen::runner::{self, BatchOptions};
use std::path::Path;
use tracing::info;

use super::{apply_universe_overrides, load_config};

pub struct BacktestArgs {
    pub config_path: String,
    pub tickers: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub capital: Option<f64>,
    pub sizing: Option<String>,
    pub sequential: bool,
}

pub fn run(args: BacktestArgs) -> Result<()> {
    info!("Starting backtest");

    let mut config = load_config(&args.config_path)?;
    apply_universe_overrides(&mut config, args.tickers, args.start, args.end)?;

    if let Some(capital) = args.capital {
        info!("Overriding initial capital to: {:.2}", capital);
        config.broker.initial_cash = capital;
    }

    if let Some(method) = args.sizing {
        info!("Overriding sizing method to: {}", method);
        config.sizing = config.sizing.with_method(&method)?;
    }

    config.validate()?;

    let instruments = config.universe.instruments();
    println!("\n{}", "=".repeat(60));
    println!("ELDER TRIPLE SCREEN");
    println!("{}", "=".repeat(60));
    println!("Instruments:        {}", instruments.len());
    println!(
        "Period:             {} .. {}",
        config.universe.start, config.universe.end
    );
    println!("Initial Cash:       {:.2}", config.broker.initial_cash);
    println!("Sizing:             {}", config.sizing.method_name());
    println!("{}", "=".repeat(60));

    let options = BatchOptions {
        sequential: args.sequential,
        ..BatchOptions::default()
    };
    let runs = runner::run_batch(&config, &options)?;

    let report = Report::new(&runs);
    report.print();

    let summary_path = Path::new(&config.backtest.results_dir).join("summary.csv");
    report.write_csv(&summary_path)?;
    println!("Summary written to {}", summary_path.display());

    info!("Backtest completed");
    Ok(())
}
