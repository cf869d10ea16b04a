//! Elder triple-screen backtester - main entry point
//!
//! This binary provides two subcommands:
//! - backtest: Run the strategy over the configured instruments
//! - download: Fetch daily bars from Yahoo Finance into the CSV cache

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "elder-screen")]
#[command(about = "Elder triple-screen strategy backtester with ATR position sizing", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run strategy backtest
    Backtest {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/moex_blue_chips.json")]
        config: String,

        /// Tickers to test (comma-separated), replacing the configured universe
        #[arg(long)]
        tickers: Option<String>,

        /// Start date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD, exclusive)
        #[arg(long)]
        end: Option<String>,

        /// Initial capital
        #[arg(long)]
        capital: Option<f64>,

        /// Sizing method (risk_fraction, bounded_atr, cash_decrement)
        #[arg(long)]
        sizing: Option<String>,

        /// Run instruments one at a time instead of in parallel
        #[arg(long)]
        sequential: bool,
    },

    /// Download daily history from Yahoo Finance
    Download {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/moex_blue_chips.json")]
        config: String,

        /// Tickers to download (comma-separated), replacing the configured universe
        #[arg(long)]
        tickers: Option<String>,

        /// Start date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD, exclusive)
        #[arg(long)]
        end: Option<String>,

        /// Download again even when the cache covers the range
        #[arg(long)]
        force: bool,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // Create log file with naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Set log level - filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    if file_only {
        // Keep the console clean for the progress bar
        let file_appender = tracing_appender::rolling::never("logs", &log_filename);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        let file_appender = tracing_appender::rolling::never("logs", &log_filename);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        info!("Logging initialized");
        info!("Log file: {}", log_path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    // .env is optional
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    // Parallel backtests draw a progress bar; per-bar logs go to the file only
    let (command_name, file_only) = match &cli.command {
        Commands::Backtest { sequential, .. } => ("backtest", !*sequential),
        Commands::Download { .. } => ("download", false),
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Backtest {
            config,
            tickers,
            start,
            end,
            capital,
            sizing,
            sequential,
        } => commands::backtest::run(commands::backtest::BacktestArgs {
            config_path: config,
            tickers,
            start,
            end,
            capital,
            sizing,
            sequential,
        }),
        Commands::Download {
            config,
            tickers,
            start,
            end,
            force,
        } => commands::download::run(config, tickers, start, end, force),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_logging_creates_log_file() {
        setup_logging(false, "logging_test", false).unwrap();
        let created = std::fs::read_dir("logs")
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with("logging_test_"));
        assert!(created);
    }
}
