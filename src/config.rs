//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable overrides for the data and results directories.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::resample::WeekBoundary;
use crate::Symbol;

/// Configuration errors that callers may want to branch on
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("universe is empty: set `universe.tickers` or `universe.categories`")]
    EmptyUniverse,

    #[error("start date {start} must be before end date {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("initial cash must be positive, got {0}")]
    NonPositiveCash(f64),

    #[error("risk percent must be in (0, 100], got {0}")]
    InvalidRiskPercent(f64),

    #[error("ATR bounds are inverted: min {min} > max {max}")]
    InvertedAtrBounds { min: f64, max: f64 },

    #[error("unknown sizing method '{0}' (expected risk_fraction, bounded_atr or cash_decrement)")]
    UnknownSizingMethod(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default = "default_strategy_name")]
    pub strategy_name: String,
    /// Strategy parameters, parsed by the strategy named in `strategy_name`
    #[serde(default = "default_strategy_params")]
    pub strategy: serde_json::Value,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub universe: UniverseConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
}

fn default_strategy_name() -> String {
    "elder".to_string()
}

fn default_strategy_params() -> serde_json::Value {
    serde_json::json!({})
}

impl Config {
    /// Load configuration from JSON file.
    ///
    /// Not validated here: command-line overrides are applied first, then
    /// the caller runs [`Config::validate`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        config.apply_env_overrides();

        Ok(config)
    }

    /// Override directories from `ELDER_DATA_DIR` / `ELDER_RESULTS_DIR`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("ELDER_DATA_DIR") {
            self.backtest.data_dir = dir;
        }
        if let Ok(dir) = std::env::var("ELDER_RESULTS_DIR") {
            self.backtest.results_dir = dir;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.initial_cash <= 0.0 {
            return Err(ConfigError::NonPositiveCash(self.broker.initial_cash));
        }
        if self.universe.start >= self.universe.end {
            return Err(ConfigError::InvalidDateRange {
                start: self.universe.start,
                end: self.universe.end,
            });
        }
        if self.universe.instruments().is_empty() {
            return Err(ConfigError::EmptyUniverse);
        }
        self.sizing.validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            broker: BrokerConfig::default(),
            strategy_name: default_strategy_name(),
            strategy: default_strategy_params(),
            sizing: SizingConfig::default(),
            universe: UniverseConfig::default(),
            backtest: BacktestConfig::default(),
        }
    }
}

/// Simulated broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub initial_cash: f64,
    /// Commission as a fraction of traded value (0.001 = 0.1%)
    pub commission: f64,
    /// Slippage as a fraction of price, applied against the trader on market fills
    pub slippage: f64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            initial_cash: 100_000.0,
            commission: 0.0,
            slippage: 0.0,
        }
    }
}

/// Position sizing method and its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SizingConfig {
    /// `floor(equity * risk% / ATR)`
    RiskFraction {
        #[serde(default = "default_risk_percent")]
        risk_percent: f64,
    },
    /// ATR clamped to bounds, then capped by cash and leverage
    BoundedAtr {
        #[serde(default = "default_risk_percent")]
        risk_percent: f64,
        #[serde(default)]
        atr_min: Option<f64>,
        #[serde(default)]
        atr_max: Option<f64>,
        #[serde(default = "default_leverage")]
        leverage: f64,
    },
    /// `trunc(equity * risk% / ATR)`, decremented until affordable
    CashDecrement {
        #[serde(default = "default_risk_percent")]
        risk_percent: f64,
    },
}

fn default_risk_percent() -> f64 {
    1.0
}

fn default_leverage() -> f64 {
    1.0
}

impl Default for SizingConfig {
    fn default() -> Self {
        SizingConfig::RiskFraction {
            risk_percent: default_risk_percent(),
        }
    }
}

impl SizingConfig {
    pub fn method_name(&self) -> &'static str {
        match self {
            SizingConfig::RiskFraction { .. } => "risk_fraction",
            SizingConfig::BoundedAtr { .. } => "bounded_atr",
            SizingConfig::CashDecrement { .. } => "cash_decrement",
        }
    }

    pub fn risk_percent(&self) -> f64 {
        match self {
            SizingConfig::RiskFraction { risk_percent }
            | SizingConfig::BoundedAtr { risk_percent, .. }
            | SizingConfig::CashDecrement { risk_percent } => *risk_percent,
        }
    }

    /// Switch to another method, keeping the risk percent
    pub fn with_method(&self, method: &str) -> Result<SizingConfig, ConfigError> {
        let risk_percent = self.risk_percent();
        match method {
            "risk_fraction" => Ok(SizingConfig::RiskFraction { risk_percent }),
            "bounded_atr" => Ok(match self {
                SizingConfig::BoundedAtr { .. } => self.clone(),
                _ => SizingConfig::BoundedAtr {
                    risk_percent,
                    atr_min: None,
                    atr_max: None,
                    leverage: default_leverage(),
                },
            }),
            "cash_decrement" => Ok(SizingConfig::CashDecrement { risk_percent }),
            other => Err(ConfigError::UnknownSizingMethod(other.to_string())),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let risk = self.risk_percent();
        if !(risk > 0.0 && risk <= 100.0) {
            return Err(ConfigError::InvalidRiskPercent(risk));
        }
        if let SizingConfig::BoundedAtr {
            atr_min: Some(min),
            atr_max: Some(max),
            ..
        } = self
        {
            if min > max {
                return Err(ConfigError::InvertedAtrBounds {
                    min: *min,
                    max: *max,
                });
            }
        }
        Ok(())
    }
}

/// Instruments and date range to backtest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseConfig {
    /// Uncategorised tickers
    pub tickers: Vec<String>,
    /// Category name -> tickers
    pub categories: BTreeMap<String, Vec<String>>,
    /// First day included
    pub start: NaiveDate,
    /// First day excluded
    pub end: NaiveDate,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        UniverseConfig {
            tickers: [
                "GAZP.ME", "SBER.ME", "LKOH.ME", "MGNT.ME", "NVTK.ME", "SNGS.ME", "GMKN.ME",
                "ROSN.ME", "NLMK.ME", "TATN.ME", "MTSS.ME", "ALRS.ME", "CHMF.ME",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            categories: BTreeMap::new(),
            start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap_or_default(),
        }
    }
}

/// One backtest target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    pub category: Option<String>,
    pub symbol: Symbol,
}

impl UniverseConfig {
    /// Uncategorised tickers first, then categories in name order
    pub fn instruments(&self) -> Vec<Instrument> {
        let plain = self.tickers.iter().map(|t| Instrument {
            category: None,
            symbol: Symbol::new(t.trim()),
        });
        let categorised = self.categories.iter().flat_map(|(category, tickers)| {
            tickers.iter().map(move |t| Instrument {
                category: Some(category.clone()),
                symbol: Symbol::new(t.trim()),
            })
        });
        plain
            .chain(categorised)
            .filter(|i| !i.symbol.as_str().is_empty())
            .collect()
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self.instruments().into_iter().map(|i| i.symbol).collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }
}

/// Backtest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub data_dir: String,
    pub results_dir: String,
    /// Write per-bar sizing diagnostics
    pub log_sizing: bool,
    /// Write per-order lifecycle events
    pub log_orders: bool,
    /// Annual risk-free rate used by the Sharpe ratio
    pub risk_free_rate: f64,
    pub week_boundary: WeekBoundary,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            data_dir: "data".to_string(),
            results_dir: "results".to_string(),
            log_sizing: true,
            log_orders: true,
            risk_free_rate: 0.01,
            week_boundary: WeekBoundary::default(),
        }
    }
}
