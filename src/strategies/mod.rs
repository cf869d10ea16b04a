//! Trading Strategies Module
//!
//! Strategies see one daily bar at a time through a [`StrategyContext`] and
//! answer with [`Action`]s for the broker. Indicator series are computed once
//! in [`Strategy::init`] over the full daily and weekly history; `next` must
//! only read values at or before the current bar.

pub mod elder;

use crate::broker::OrderRequest;
use crate::resample::WeeklySeries;
use crate::sizing::SizingDecision;
use crate::{Candle, Config, Order, OrderId, OrderRole, OrderStatus, Position, Symbol, Trade};
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Read-only view of the current bar and portfolio
#[derive(Debug, Clone, Copy)]
pub struct StrategyContext<'a> {
    pub symbol: &'a Symbol,
    /// Index of the current daily bar
    pub bar_index: usize,
    pub candle: &'a Candle,
    pub position: Position,
    pub open_orders: &'a [Order],
    pub cash: f64,
    pub equity: f64,
}

impl StrategyContext<'_> {
    pub fn datetime(&self) -> DateTime<Utc> {
        self.candle.datetime
    }

    /// Whether an entry order is waiting to fill
    pub fn has_pending_entry(&self) -> bool {
        self.open_orders.iter().any(|o| o.role == OrderRole::Entry)
    }
}

/// What a strategy asks the broker to do on this bar
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Submit(OrderRequest),
    Cancel(OrderId),
    /// Market-close the whole position and cancel its bracket
    Close,
}

/// Trading strategy trait
pub trait Strategy: Send {
    /// Strategy identifier (matches config's `strategy_name`)
    fn name(&self) -> &'static str;

    /// Precompute indicators over the full series (called once before the first bar)
    fn init(&mut self, _daily: &[Candle], _weekly: &WeeklySeries) {}

    /// Decide this bar's actions
    fn next(&mut self, ctx: &StrategyContext) -> Vec<Action>;

    /// Sizing computed during the last `next` call, if any
    fn take_sizing(&mut self) -> Option<SizingDecision> {
        None
    }

    /// Notification when an order state changes
    fn notify_order(&mut self, order: &Order) {
        match order.status {
            OrderStatus::Completed => {
                if let Some(ref exec) = order.executed {
                    tracing::debug!(
                        symbol = %order.symbol,
                        side = %order.side,
                        role = ?order.role,
                        price = exec.price,
                        size = exec.size,
                        "Order executed"
                    );
                }
            }
            OrderStatus::Margin | OrderStatus::Rejected => {
                tracing::warn!(symbol = %order.symbol, id = order.id, status = %order.status, "Order failed");
            }
            _ => {}
        }
    }

    /// Notification when a trade is closed
    fn notify_trade(&mut self, trade: &Trade) {
        tracing::debug!(
            symbol = %trade.symbol,
            pnl = trade.net_pnl,
            return_pct = format!("{:.2}%", trade.return_pct()),
            "Trade closed"
        );
    }
}

/// Factory function type for creating strategies from config
pub type StrategyFactory = fn(&Config) -> Result<Box<dyn Strategy>>;

const STRATEGIES: &[(&str, StrategyFactory)] = &[("elder", elder::create)];

/// Create a strategy from configuration
pub fn create_strategy(config: &Config) -> Result<Box<dyn Strategy>> {
    let factory = STRATEGIES
        .iter()
        .find(|(name, _)| *name == config.strategy_name)
        .map(|(_, factory)| factory)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown strategy: '{}'. Available: {}",
                config.strategy_name,
                available_strategies().join(", ")
            )
        })?;

    factory(config)
}

/// Get list of available strategy names
pub fn available_strategies() -> Vec<&'static str> {
    STRATEGIES.iter().map(|(name, _)| *name).collect()
}
