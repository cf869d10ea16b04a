pub mod backtest;
pub mod download;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use elder_screen::Config;
use std::path::Path;
use tracing::{info, warn};

/// Load the config file, falling back to defaults when it does not exist
pub fn load_config(config_path: &str) -> Result<Config> {
    if Path::new(config_path).exists() {
        let config = Config::from_file(config_path)?;
        info!("Loaded configuration from: {}", config_path);
        Ok(config)
    } else {
        warn!("Config {} not found, using defaults", config_path);
        let mut config = Config::default();
        config.apply_env_overrides();
        Ok(config)
    }
}

/// Apply the universe overrides shared by every subcommand
pub fn apply_universe_overrides(
    config: &mut Config,
    tickers: Option<String>,
    start: Option<String>,
    end: Option<String>,
) -> Result<()> {
    if let Some(tickers) = tickers {
        info!("Overriding tickers to: {}", tickers);
        config.universe.tickers = tickers
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        config.universe.categories.clear();
    }
    if let Some(start) = start {
        config.universe.start = parse_day(&start)?;
    }
    if let Some(end) = end {
        config.universe.end = parse_day(&end)?;
    }
    Ok(())
}

fn parse_day(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", value))
}
