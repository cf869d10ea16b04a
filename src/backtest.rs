//! Backtesting engine
//!
//! Runs one strategy over one instrument's daily bars with T+1 execution:
//! orders placed on bar T are matched against bar T+1 by the [`Broker`].
//! Weekly bars are resampled from the same daily series before the run.

use anyhow::Result;
use chrono::{DateTime, Utc};
use statrs::statistics::Statistics;
use tracing::{debug, info};

use crate::broker::Broker;
use crate::diagnostics::{Diagnostics, OrderRecord, SizingRecord};
use crate::resample::resample_weekly;
use crate::strategies::{Action, StrategyContext};
use crate::{Candle, Config, PerformanceMetrics, Position, Strategy, Symbol, Trade};

/// Trading days per year, used to turn the annual risk-free rate into a daily one
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Backtest engine for a single instrument
pub struct Backtester {
    config: Config,
    strategy: Box<dyn Strategy>,
}

impl Backtester {
    pub fn new(config: Config, strategy: Box<dyn Strategy>) -> Self {
        Backtester { config, strategy }
    }

    /// Run the strategy over `candles` (sorted, daily)
    pub fn run(
        &mut self,
        symbol: &Symbol,
        candles: &[Candle],
        diagnostics: &mut Diagnostics,
    ) -> Result<BacktestResult> {
        let initial_value = self.config.broker.initial_cash;
        let mut broker = Broker::new(symbol.clone(), &self.config.broker);
        let mut equity_curve = Vec::with_capacity(candles.len());
        let mut trades = Vec::new();

        let weekly = resample_weekly(candles, self.config.backtest.week_boundary);
        self.strategy.init(candles, &weekly);

        info!(
            symbol = %symbol,
            strategy = self.strategy.name(),
            daily_bars = candles.len(),
            weekly_bars = weekly.candles.len(),
            "Starting backtest"
        );

        for (i, bar) in candles.iter().enumerate() {
            // ============================================================
            // PHASE 1: Match orders from the previous bar
            // ============================================================
            broker.process_bar(bar);
            self.dispatch_events(&mut broker, diagnostics, &mut trades)?;

            // ============================================================
            // PHASE 2: Strategy decision on this bar's close
            // ============================================================
            let actions = {
                let ctx = StrategyContext {
                    symbol,
                    bar_index: i,
                    candle: bar,
                    position: broker.position(),
                    open_orders: broker.open_orders(),
                    cash: broker.cash(),
                    equity: broker.value(bar.close),
                };
                self.strategy.next(&ctx)
            };

            if let Some(sizing) = self.strategy.take_sizing() {
                diagnostics.log_sizing(&SizingRecord::new(bar.datetime, symbol, &sizing))?;
            }

            for action in actions {
                match action {
                    Action::Submit(request) => {
                        broker.submit(request, bar.datetime);
                    }
                    Action::Cancel(id) => {
                        if !broker.cancel(id, bar.datetime) {
                            debug!(symbol = %symbol, id, "Cancel ignored, order not open");
                        }
                    }
                    Action::Close => {
                        broker.close_position(bar.datetime);
                    }
                }
            }
            self.dispatch_events(&mut broker, diagnostics, &mut trades)?;

            equity_curve.push((bar.datetime, broker.value(bar.close)));
        }

        let metrics = calculate_metrics(
            initial_value,
            &trades,
            &equity_curve,
            self.config.backtest.risk_free_rate,
            broker.total_commission(),
        );

        info!(
            symbol = %symbol,
            final_value = format!("{:.2}", metrics.final_value),
            profit_pct = format!("{:.2}", metrics.profit_pct),
            trades = metrics.total_trades,
            "Backtest finished"
        );

        Ok(BacktestResult {
            symbol: symbol.clone(),
            trades,
            equity_curve,
            metrics,
            final_position: broker.position(),
        })
    }

    /// Forward broker notifications to the logs and the strategy
    fn dispatch_events(
        &mut self,
        broker: &mut Broker,
        diagnostics: &mut Diagnostics,
        trades: &mut Vec<Trade>,
    ) -> Result<()> {
        let (cash, position) = (broker.cash(), broker.position());
        for order in broker.drain_order_events() {
            diagnostics.log_order(&OrderRecord::new(&order, cash, position))?;
            self.strategy.notify_order(&order);
        }
        for trade in broker.drain_trades() {
            self.strategy.notify_trade(&trade);
            trades.push(trade);
        }
        Ok(())
    }
}

/// Daily Sharpe ratio of an equity curve.
///
/// Returns are bar-over-bar equity changes; the annual risk-free rate is
/// compounded down to a daily rate. Not annualized. `None` with fewer than
/// two returns or zero dispersion.
pub fn sharpe_ratio(equity: &[f64], annual_risk_free: f64) -> Option<f64> {
    if equity.len() < 3 {
        return None;
    }

    let daily_rf = (1.0 + annual_risk_free).powf(1.0 / TRADING_DAYS_PER_YEAR) - 1.0;
    let excess: Vec<f64> = equity
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0] - daily_rf)
        .collect();
    if excess.len() < 2 {
        return None;
    }

    let mean = excess.iter().mean();
    let std_dev = excess.iter().population_std_dev();
    if !std_dev.is_finite() || std_dev <= f64::EPSILON {
        return None;
    }
    Some(mean / std_dev)
}

/// Largest peak-to-trough fall of the curve, in percent
pub fn max_drawdown_pct(initial: f64, equity: &[f64]) -> f64 {
    let mut peak = initial;
    let mut max_dd = 0.0;

    for &value in equity {
        if value > peak {
            peak = value;
        }
        if peak > 0.0 {
            let dd = (peak - value) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }

    max_dd * 100.0
}

pub fn calculate_metrics(
    initial_value: f64,
    trades: &[Trade],
    equity_curve: &[(DateTime<Utc>, f64)],
    risk_free_rate: f64,
    total_commission: f64,
) -> PerformanceMetrics {
    let values: Vec<f64> = equity_curve.iter().map(|(_, v)| *v).collect();
    let final_value = values.last().copied().unwrap_or(initial_value);
    let profit_pct = if initial_value > 0.0 {
        (final_value - initial_value) / initial_value * 100.0
    } else {
        0.0
    };

    let winning_trades: Vec<&Trade> = trades.iter().filter(|t| t.net_pnl > 0.0).collect();
    let losing_trades: Vec<&Trade> = trades.iter().filter(|t| t.net_pnl <= 0.0).collect();

    let win_rate = if !trades.is_empty() {
        (winning_trades.len() as f64 / trades.len() as f64) * 100.0
    } else {
        0.0
    };

    let gross_profits: f64 = winning_trades.iter().map(|t| t.net_pnl).sum();
    let gross_losses: f64 = losing_trades.iter().map(|t| t.net_pnl.abs()).sum();

    let profit_factor = if gross_losses > 0.0 {
        gross_profits / gross_losses
    } else if gross_profits > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    let avg_win = if !winning_trades.is_empty() {
        gross_profits / winning_trades.len() as f64
    } else {
        0.0
    };

    let avg_loss = if !losing_trades.is_empty() {
        gross_losses / losing_trades.len() as f64
    } else {
        0.0
    };

    let largest_win = winning_trades.iter().map(|t| t.net_pnl).fold(0.0, f64::max);
    let largest_loss = losing_trades.iter().map(|t| t.net_pnl).fold(0.0, f64::min);

    PerformanceMetrics {
        initial_value,
        final_value,
        profit_pct,
        sharpe_ratio: sharpe_ratio(&values, risk_free_rate),
        max_drawdown: max_drawdown_pct(initial_value, &values),
        win_rate,
        profit_factor,
        total_trades: trades.len(),
        winning_trades: winning_trades.len(),
        losing_trades: losing_trades.len(),
        avg_win,
        avg_loss,
        largest_win,
        largest_loss,
        total_commission,
    }
}

#[derive(Debug)]
pub struct BacktestResult {
    pub symbol: Symbol,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<(DateTime<Utc>, f64)>,
    pub metrics: PerformanceMetrics,
    /// Position still open after the last bar (marked to the last close)
    pub final_position: Position,
}
