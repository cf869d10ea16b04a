//! Elder Triple-Screen Strategy
//!
//! Screen one is the weekly impulse (EMA and MACD histogram), screen two the
//! weekly ADX, screen three the daily RSI and the 200-day EMA. Positions are
//! sized from daily ATR and protected by an ATR bracket around the close of
//! the signal bar.

use tracing::{debug, info};

use crate::broker::OrderRequest;
use crate::indicators;
use crate::resample::WeeklySeries;
use crate::sizing::{PositionSizer, SizingDecision, SizingInput};
use crate::strategies::{Action, Strategy, StrategyContext};
use crate::{Candle, OrderRole, Position, Side, Trade};

use super::config::{BracketMode, ElderConfig};
use super::signal::{bracket_prices, entry_signal, trend_flip_exit, DailySnapshot, WeeklySnapshot};

/// Portfolio facts the decision depends on
#[derive(Debug, Clone, Copy)]
pub struct PortfolioState {
    pub position: Position,
    pub equity: f64,
    pub cash: f64,
    /// Close of the bar that triggered the open position
    pub reference_price: Option<f64>,
}

/// What to do on this bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecisionAction {
    Hold,
    Enter(Side),
    Close,
}

/// Output of [`signal_and_size`]
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: DecisionAction,
    pub size: u64,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
    /// Present whenever a size was computed (every bar while flat)
    pub sizing: Option<SizingDecision>,
}

impl Decision {
    fn hold() -> Self {
        Self {
            action: DecisionAction::Hold,
            size: 0,
            take_profit: None,
            stop_loss: None,
            sizing: None,
        }
    }
}

/// Pure decision step: gates, sizing and bracket levels for one bar.
///
/// While flat this sizes a candidate entry and fires it if every gate
/// passes and the size is positive. While in a position it returns `Close`
/// on a trend flip, otherwise `Hold` with the bracket levels to keep in
/// force.
pub fn signal_and_size(
    weekly: &WeeklySnapshot,
    daily: &DailySnapshot,
    portfolio: &PortfolioState,
    config: &ElderConfig,
    sizer: &PositionSizer,
) -> Decision {
    if let Some(side) = portfolio.position.side() {
        if trend_flip_exit(side, weekly.transition().curr) {
            return Decision {
                action: DecisionAction::Close,
                size: portfolio.position.quantity(),
                ..Decision::hold()
            };
        }
        let reference = portfolio.reference_price.unwrap_or(daily.close);
        let (tp, sl) = bracket_prices(side, reference, daily.atr, config.tp_mult, config.sl_mult);
        return Decision {
            size: portfolio.position.quantity(),
            take_profit: Some(tp),
            stop_loss: Some(sl),
            ..Decision::hold()
        };
    }

    let sizing = sizer.size(&SizingInput {
        equity: portfolio.equity,
        cash: portfolio.cash,
        price: daily.close,
        atr: daily.atr,
    });

    let side = match entry_signal(weekly, daily, &config.gate_params()).entry_side() {
        Some(side) if sizing.size > 0 => side,
        _ => {
            return Decision {
                sizing: Some(sizing),
                ..Decision::hold()
            }
        }
    };

    let (tp, sl) = bracket_prices(side, daily.close, daily.atr, config.tp_mult, config.sl_mult);
    Decision {
        action: DecisionAction::Enter(side),
        size: sizing.size,
        take_profit: Some(tp),
        stop_loss: Some(sl),
        sizing: Some(sizing),
    }
}

/// Elder triple-screen strategy
pub struct ElderStrategy {
    config: ElderConfig,
    sizer: PositionSizer,

    // Weekly series, indexed by week
    ema_w: Vec<Option<f64>>,
    hist_w: Vec<Option<f64>>,
    adx_w: Vec<Option<f64>>,
    // Completed weeks before each daily bar
    weeks_done: Vec<usize>,

    // Daily series
    atr: Vec<Option<f64>>,
    rsi: Vec<Option<f64>>,
    ema_trend: Vec<Option<f64>>,

    reference_price: Option<f64>,
    bracket_placed: bool,
    last_sizing: Option<SizingDecision>,
}

impl ElderStrategy {
    pub fn new(config: ElderConfig, sizer: PositionSizer) -> Self {
        Self {
            config,
            sizer,
            ema_w: Vec::new(),
            hist_w: Vec::new(),
            adx_w: Vec::new(),
            weeks_done: Vec::new(),
            atr: Vec::new(),
            rsi: Vec::new(),
            ema_trend: Vec::new(),
            reference_price: None,
            bracket_placed: false,
            last_sizing: None,
        }
    }

    /// Weekly values as of daily bar `bar_index`, using completed weeks only
    pub fn weekly_snapshot(&self, bar_index: usize) -> Option<WeeklySnapshot> {
        let done = *self.weeks_done.get(bar_index)?;
        if done < 3 {
            return None;
        }
        let at = |series: &[Option<f64>], back: usize| series.get(done - 1 - back).copied().flatten();

        Some(WeeklySnapshot {
            ema: [at(&self.ema_w, 0)?, at(&self.ema_w, 1)?, at(&self.ema_w, 2)?],
            hist: [at(&self.hist_w, 0)?, at(&self.hist_w, 1)?, at(&self.hist_w, 2)?],
            adx: at(&self.adx_w, 0)?,
        })
    }

    /// Daily values on bar `bar_index`
    pub fn daily_snapshot(&self, bar_index: usize, close: f64) -> Option<DailySnapshot> {
        Some(DailySnapshot {
            close,
            atr: self.atr.get(bar_index).copied().flatten()?,
            rsi: self.rsi.get(bar_index).copied().flatten()?,
            ema_trend: self.ema_trend.get(bar_index).copied().flatten()?,
        })
    }

    fn bracket_actions(&mut self, ctx: &StrategyContext, decision: &Decision) -> Vec<Action> {
        let (Some(tp), Some(sl), Some(side)) =
            (decision.take_profit, decision.stop_loss, ctx.position.side())
        else {
            return vec![];
        };

        let mut actions = Vec::new();
        match self.config.bracket_mode {
            BracketMode::Once if self.bracket_placed => return actions,
            BracketMode::Once => {}
            BracketMode::EveryBar => {
                actions.extend(
                    ctx.open_orders
                        .iter()
                        .filter(|o| matches!(o.role, OrderRole::TakeProfit | OrderRole::StopLoss))
                        .map(|o| Action::Cancel(o.id)),
                );
            }
        }

        let exit_side = side.opposite();
        actions.push(Action::Submit(OrderRequest::limit(
            exit_side,
            decision.size,
            tp,
            OrderRole::TakeProfit,
        )));
        actions.push(Action::Submit(OrderRequest::stop(
            exit_side,
            decision.size,
            sl,
            OrderRole::StopLoss,
        )));
        self.bracket_placed = true;
        actions
    }
}

impl Strategy for ElderStrategy {
    fn name(&self) -> &'static str {
        "elder"
    }

    fn init(&mut self, daily: &[Candle], weekly: &WeeklySeries) {
        let c = &self.config;

        let w_close: Vec<f64> = weekly.candles.iter().map(|k| k.close).collect();
        let w_high: Vec<f64> = weekly.candles.iter().map(|k| k.high).collect();
        let w_low: Vec<f64> = weekly.candles.iter().map(|k| k.low).collect();
        self.ema_w = indicators::ema(&w_close, c.ema_len);
        self.hist_w = indicators::macd(&w_close, c.macd_fast, c.macd_slow, c.macd_signal).histogram;
        self.adx_w = indicators::adx(&w_high, &w_low, &w_close, c.adx_len);
        self.weeks_done = weekly.week_index.clone();

        let close: Vec<f64> = daily.iter().map(|k| k.close).collect();
        let high: Vec<f64> = daily.iter().map(|k| k.high).collect();
        let low: Vec<f64> = daily.iter().map(|k| k.low).collect();
        self.atr = indicators::atr(&high, &low, &close, c.atr_len);
        self.rsi = indicators::rsi(&close, c.rsi_period);
        self.ema_trend = indicators::ema(&close, c.ema_trend);

        self.reference_price = None;
        self.bracket_placed = false;
        self.last_sizing = None;

        debug!(
            daily_bars = daily.len(),
            weekly_bars = weekly.candles.len(),
            "Elder indicators ready"
        );
    }

    fn next(&mut self, ctx: &StrategyContext) -> Vec<Action> {
        if ctx.position.is_flat() {
            self.bracket_placed = false;
            if ctx.has_pending_entry() {
                return vec![];
            }
        }

        let (Some(weekly), Some(daily)) = (
            self.weekly_snapshot(ctx.bar_index),
            self.daily_snapshot(ctx.bar_index, ctx.candle.close),
        ) else {
            return vec![];
        };

        let portfolio = PortfolioState {
            position: ctx.position,
            equity: ctx.equity,
            cash: ctx.cash,
            reference_price: self.reference_price,
        };
        let decision = signal_and_size(&weekly, &daily, &portfolio, &self.config, &self.sizer);
        self.last_sizing = decision.sizing.clone();

        match decision.action {
            DecisionAction::Enter(side) => {
                info!(
                    symbol = %ctx.symbol,
                    date = %ctx.datetime().format("%Y-%m-%d"),
                    side = %side,
                    size = decision.size,
                    close = daily.close,
                    atr = daily.atr,
                    "Entry signal"
                );
                self.reference_price = Some(daily.close);
                vec![Action::Submit(OrderRequest::market(side, decision.size, OrderRole::Entry))]
            }
            DecisionAction::Close => {
                info!(
                    symbol = %ctx.symbol,
                    date = %ctx.datetime().format("%Y-%m-%d"),
                    size = decision.size,
                    "Weekly trend flipped, closing position"
                );
                self.bracket_placed = false;
                vec![Action::Close]
            }
            DecisionAction::Hold => self.bracket_actions(ctx, &decision),
        }
    }

    fn take_sizing(&mut self) -> Option<SizingDecision> {
        self.last_sizing.take()
    }

    fn notify_trade(&mut self, trade: &Trade) {
        info!(
            symbol = %trade.symbol,
            side = %trade.side,
            entry = trade.entry_price,
            exit = trade.exit_price,
            pnl = trade.net_pnl,
            return_pct = format!("{:.2}%", trade.return_pct()),
            "Trade closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::elder::signal::EntryPairing;
    use crate::{Order, OrderStatus, OrderType, Signal, Symbol};
    use chrono::Utc;

    fn faded_down() -> WeeklySnapshot {
        WeeklySnapshot {
            ema: [8.0, 9.0, 10.0],
            hist: [-0.4, -0.5, -0.2],
            adx: 20.0,
        }
    }

    fn bullish_daily() -> DailySnapshot {
        DailySnapshot {
            close: 100.0,
            atr: 2.0,
            rsi: 45.0,
            ema_trend: 90.0,
        }
    }

    fn flat_portfolio() -> PortfolioState {
        PortfolioState {
            position: Position::default(),
            equity: 100_000.0,
            cash: 100_000.0,
            reference_price: None,
        }
    }

    fn sizer() -> PositionSizer {
        PositionSizer::RiskFraction { risk_percent: 1.0 }
    }

    #[test]
    fn test_signal_and_size_enters_long() {
        let d = signal_and_size(
            &faded_down(),
            &bullish_daily(),
            &flat_portfolio(),
            &ElderConfig::default(),
            &sizer(),
        );
        assert_eq!(d.action, DecisionAction::Enter(Side::Buy));
        assert_eq!(d.size, 500);
        assert_eq!(d.take_profit, Some(103.0));
        assert_eq!(d.stop_loss, Some(98.0));
        assert!(d.sizing.is_some());
    }

    #[test]
    fn test_zero_atr_holds() {
        let daily = DailySnapshot {
            atr: 0.0,
            ..bullish_daily()
        };
        let d = signal_and_size(&faded_down(), &daily, &flat_portfolio(), &ElderConfig::default(), &sizer());
        assert_eq!(d.action, DecisionAction::Hold);
        assert_eq!(d.sizing.map(|s| s.size), Some(0));
    }

    #[test]
    fn test_open_long_closes_on_down_trend() {
        let weekly = WeeklySnapshot {
            ema: [8.0, 9.0, 10.0],
            hist: [-0.6, -0.5, -0.2],
            adx: 20.0,
        };
        let portfolio = PortfolioState {
            position: Position { size: 300, price: 100.0 },
            reference_price: Some(100.0),
            ..flat_portfolio()
        };
        let d = signal_and_size(&weekly, &bullish_daily(), &portfolio, &ElderConfig::default(), &sizer());
        assert_eq!(d.action, DecisionAction::Close);
        assert_eq!(d.size, 300);
    }

    #[test]
    fn test_open_position_keeps_bracket_on_reference() {
        let portfolio = PortfolioState {
            position: Position { size: -50, price: 101.0 },
            reference_price: Some(100.0),
            ..flat_portfolio()
        };
        let d = signal_and_size(&faded_down(), &bullish_daily(), &portfolio, &ElderConfig::default(), &sizer());
        assert_eq!(d.action, DecisionAction::Hold);
        assert_eq!(d.take_profit, Some(97.0));
        assert_eq!(d.stop_loss, Some(102.0));
        assert!(d.sizing.is_none());
    }

    #[test]
    fn test_gate_params_respect_pairing() {
        let config = ElderConfig {
            entry_pairing: EntryPairing::Continuation,
            ..Default::default()
        };
        assert_eq!(
            entry_signal(&faded_down(), &bullish_daily(), &config.gate_params()),
            Signal::Flat
        );
        assert_eq!(
            entry_signal(&faded_down(), &bullish_daily(), &ElderConfig::default().gate_params()),
            Signal::Long
        );
    }

    #[test]
    fn test_every_bar_bracket_replaces_orders() {
        let config = ElderConfig {
            bracket_mode: BracketMode::EveryBar,
            ..Default::default()
        };
        let mut strategy = ElderStrategy::new(config, sizer());
        let now = Utc::now();
        let symbol = Symbol::new("SBER.ME");
        let open = Order {
            id: 7,
            symbol: symbol.clone(),
            side: Side::Sell,
            order_type: OrderType::Limit,
            role: OrderRole::TakeProfit,
            status: OrderStatus::Accepted,
            size: 10,
            price: Some(103.0),
            executed: None,
            created_time: now,
            updated_time: now,
        };
        let candle = Candle::new_unchecked(now, 100.0, 101.0, 99.0, 100.0, 1.0);
        let orders = [open];
        let ctx = StrategyContext {
            symbol: &symbol,
            bar_index: 0,
            candle: &candle,
            position: Position { size: 10, price: 100.0 },
            open_orders: &orders,
            cash: 0.0,
            equity: 0.0,
        };
        let decision = Decision {
            action: DecisionAction::Hold,
            size: 10,
            take_profit: Some(104.0),
            stop_loss: Some(99.0),
            sizing: None,
        };

        let actions = strategy.bracket_actions(&ctx, &decision);
        assert_eq!(actions.len(), 3);
        assert_eq!(actions[0], Action::Cancel(7));

        // Once mode only places the pair a single time
        let mut once = ElderStrategy::new(ElderConfig::default(), sizer());
        assert_eq!(once.bracket_actions(&ctx, &decision).len(), 2);
        assert!(once.bracket_actions(&ctx, &decision).is_empty());
    }
}
