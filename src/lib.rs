//! Elder Triple-Screen Backtester
//!
//! Backtests an Elder triple-screen trend strategy on daily equity data:
//! a weekly impulse filter (EMA and MACD histogram) fading into flat,
//! confirmed by weekly ADX, daily RSI and the 200-day EMA, with ATR-based
//! position sizing and an ATR take-profit / stop-loss bracket.
//!
//! Daily bars come from the Yahoo Finance chart API and are cached as CSV.
//! Each instrument runs against its own simulated [`broker::Broker`]; a
//! batch of instruments runs in parallel and is summarised by
//! [`report::Report`].
//!
//! ```no_run
//! use elder_screen::runner::{run_batch, BatchOptions};
//! use elder_screen::{report::Report, Config};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file("configs/moex_blue_chips.json")?;
//!     config.validate()?;
//!     let runs = run_batch(&config, &BatchOptions::default())?;
//!     Report::new(&runs).print();
//!     Ok(())
//! }
//! ```

pub mod backtest;
pub mod broker;
pub mod config;
pub mod data;
pub mod diagnostics;
pub mod indicators;
pub mod report;
pub mod resample;
pub mod runner;
pub mod sizing;
pub mod strategies;
pub mod types;
pub mod yahoo;

pub use config::Config;
pub use strategies::Strategy;
pub use types::*;

// Re-export the market data client for convenience
pub use yahoo::YahooClient;
