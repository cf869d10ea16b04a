//! Elder Triple-Screen Strategy
//!
//! Weekly impulse fading into flat, confirmed by weekly ADX, daily RSI and
//! the daily 200 EMA; ATR-sized with an ATR bracket.

mod config;
pub mod signal;
mod strategy;

pub use config::{BracketMode, ElderConfig};
pub use signal::{
    DailySnapshot, EntryPairing, GateParams, TrendState, TrendTransition, WeeklySnapshot,
};
pub use strategy::{
    signal_and_size, Decision, DecisionAction, ElderStrategy, PortfolioState,
};

use crate::sizing::PositionSizer;
use crate::{Config, Strategy};
use anyhow::Result;

/// Create strategy from config (called by the factory table)
pub fn create(config: &Config) -> Result<Box<dyn Strategy>> {
    let strategy_config: ElderConfig = serde_json::from_value(config.strategy.clone())
        .map_err(|e| anyhow::anyhow!("Failed to parse elder config: {}", e))?;
    strategy_config.validate()?;

    let sizer = PositionSizer::from_config(&config.sizing, config.broker.commission);
    Ok(Box::new(ElderStrategy::new(strategy_config, sizer)))
}
