//! Simulated broker for a single instrument
//!
//! Orders submitted while processing bar T are matched against bar T+1:
//! market orders fill at the open (plus slippage), limit and stop orders
//! fill when the bar's range reaches their price. A bar that gaps through
//! the price fills at the open, since that is the first price available.
//!
//! Take-profit and stop-loss orders form a one-cancels-other pair, and any
//! protective or exit order still open when the position returns to flat
//! is canceled.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::BrokerConfig;
use crate::{
    Candle, Order, OrderExecution, OrderId, OrderRole, OrderStatus, OrderType, Position, Side,
    Symbol, Trade,
};

/// Order intent emitted by a strategy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderRequest {
    pub side: Side,
    pub order_type: OrderType,
    pub role: OrderRole,
    pub size: u64,
    /// Limit or stop price; ignored for market orders
    pub price: Option<f64>,
}

impl OrderRequest {
    pub fn market(side: Side, size: u64, role: OrderRole) -> Self {
        Self {
            side,
            order_type: OrderType::Market,
            role,
            size,
            price: None,
        }
    }

    pub fn limit(side: Side, size: u64, price: f64, role: OrderRole) -> Self {
        Self {
            side,
            order_type: OrderType::Limit,
            role,
            size,
            price: Some(price),
        }
    }

    pub fn stop(side: Side, size: u64, price: f64, role: OrderRole) -> Self {
        Self {
            side,
            order_type: OrderType::Stop,
            role,
            size,
            price: Some(price),
        }
    }
}

/// Round trip being built while a position is open
#[derive(Debug, Clone)]
struct OpenTrade {
    side: Side,
    entry_time: DateTime<Utc>,
    max_quantity: u64,
    realized_pnl: f64,
    commission: f64,
    exit_value: f64,
    exit_quantity: u64,
}

/// Single-instrument simulated broker
#[derive(Debug)]
pub struct Broker {
    symbol: Symbol,
    cash: f64,
    commission: f64,
    slippage: f64,
    position: Position,
    open_orders: Vec<Order>,
    next_id: OrderId,
    open_trade: Option<OpenTrade>,
    order_events: Vec<Order>,
    closed_trades: Vec<Trade>,
    total_commission: f64,
}

impl Broker {
    pub fn new(symbol: Symbol, config: &BrokerConfig) -> Self {
        Self {
            symbol,
            cash: config.initial_cash,
            commission: config.commission,
            slippage: config.slippage,
            position: Position::default(),
            open_orders: Vec::new(),
            next_id: 1,
            open_trade: None,
            order_events: Vec::new(),
            closed_trades: Vec::new(),
            total_commission: 0.0,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Cash plus the marked-to-market position
    pub fn value(&self, price: f64) -> f64 {
        self.cash + self.position.market_value(price)
    }

    pub fn open_orders(&self) -> &[Order] {
        &self.open_orders
    }

    pub fn total_commission(&self) -> f64 {
        self.total_commission
    }

    /// Order status changes since the last call, oldest first
    pub fn drain_order_events(&mut self) -> Vec<Order> {
        std::mem::take(&mut self.order_events)
    }

    /// Round trips closed since the last call
    pub fn drain_trades(&mut self) -> Vec<Trade> {
        std::mem::take(&mut self.closed_trades)
    }

    /// Accept an order for matching on the next bar
    pub fn submit(&mut self, request: OrderRequest, now: DateTime<Utc>) -> OrderId {
        let id = self.next_id;
        self.next_id += 1;

        let mut order = Order {
            id,
            symbol: self.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            role: request.role,
            status: OrderStatus::Submitted,
            size: request.size,
            price: match request.order_type {
                OrderType::Market => None,
                _ => request.price,
            },
            executed: None,
            created_time: now,
            updated_time: now,
        };
        self.order_events.push(order.clone());

        let bad_price = order.order_type != OrderType::Market
            && !order.price.is_some_and(|p| p.is_finite() && p > 0.0);
        if order.size == 0 || bad_price {
            warn!(symbol = %self.symbol, id, size = order.size, price = ?order.price, "Order rejected");
            order.status = OrderStatus::Rejected;
            self.order_events.push(order);
            return id;
        }

        order.status = OrderStatus::Accepted;
        self.order_events.push(order.clone());
        self.open_orders.push(order);
        id
    }

    /// Cancel an open order; returns false if it is no longer open
    pub fn cancel(&mut self, id: OrderId, now: DateTime<Utc>) -> bool {
        let Some(idx) = self.open_orders.iter().position(|o| o.id == id) else {
            return false;
        };
        let mut order = self.open_orders.remove(idx);
        order.status = OrderStatus::Canceled;
        order.updated_time = now;
        self.order_events.push(order);
        true
    }

    /// Cancel every open take-profit and stop-loss order
    pub fn cancel_bracket(&mut self, now: DateTime<Utc>) {
        let ids: Vec<OrderId> = self
            .open_orders
            .iter()
            .filter(|o| matches!(o.role, OrderRole::TakeProfit | OrderRole::StopLoss))
            .map(|o| o.id)
            .collect();
        for id in ids {
            self.cancel(id, now);
        }
    }

    /// Cancel the bracket and send a market order for the full position.
    ///
    /// Returns `None` while flat or if an exit is already pending.
    pub fn close_position(&mut self, now: DateTime<Utc>) -> Option<OrderId> {
        let side = self.position.side()?;
        if self.open_orders.iter().any(|o| o.role == OrderRole::Exit) {
            return None;
        }
        self.cancel_bracket(now);
        let request = OrderRequest::market(side.opposite(), self.position.quantity(), OrderRole::Exit);
        Some(self.submit(request, now))
    }

    /// Match open orders against a new bar, in submission order
    pub fn process_bar(&mut self, bar: &Candle) {
        let mut idx = 0;
        while idx < self.open_orders.len() {
            let order = &self.open_orders[idx];
            let Some(fill_price) = self.match_price(order, bar) else {
                idx += 1;
                continue;
            };

            let mut order = self.open_orders.remove(idx);
            order.updated_time = bar.datetime;

            let value = order.size as f64 * fill_price;
            let commission = value * self.commission;

            if order.side == Side::Buy && !self.reduces_position(order.side) && value + commission > self.cash {
                warn!(
                    symbol = %self.symbol,
                    id = order.id,
                    cost = value + commission,
                    cash = self.cash,
                    "Insufficient cash for buy"
                );
                order.status = OrderStatus::Margin;
                self.order_events.push(order);
                continue;
            }

            self.apply_fill(order.side, order.size, fill_price, commission, bar.datetime);

            order.status = OrderStatus::Completed;
            order.executed = Some(OrderExecution {
                price: fill_price,
                size: order.size,
                value,
                commission,
            });
            debug!(
                symbol = %self.symbol,
                id = order.id,
                side = %order.side,
                role = ?order.role,
                price = fill_price,
                size = order.size,
                "Order filled"
            );

            let role = order.role;
            self.order_events.push(order);

            if matches!(role, OrderRole::TakeProfit | OrderRole::StopLoss) {
                self.cancel_bracket(bar.datetime);
            }
            if self.position.is_flat() {
                self.cancel_orphans(bar.datetime);
            }
            // Indices shifted by removals; rescan from the start
            idx = 0;
        }
    }

    /// Fill price for `order` on `bar`, or `None` if it does not trigger
    fn match_price(&self, order: &Order, bar: &Candle) -> Option<f64> {
        match (order.order_type, order.side) {
            (OrderType::Market, Side::Buy) => Some(bar.open * (1.0 + self.slippage)),
            (OrderType::Market, Side::Sell) => Some(bar.open * (1.0 - self.slippage)),
            (OrderType::Limit, Side::Sell) => {
                let p = order.price?;
                (bar.high >= p).then(|| bar.open.max(p))
            }
            (OrderType::Limit, Side::Buy) => {
                let p = order.price?;
                (bar.low <= p).then(|| bar.open.min(p))
            }
            (OrderType::Stop, Side::Sell) => {
                let p = order.price?;
                (bar.low <= p).then(|| bar.open.min(p))
            }
            (OrderType::Stop, Side::Buy) => {
                let p = order.price?;
                (bar.high >= p).then(|| bar.open.max(p))
            }
        }
    }

    fn reduces_position(&self, side: Side) -> bool {
        self.position.side() == Some(side.opposite())
    }

    /// Cancel exit and bracket orders left behind once flat
    fn cancel_orphans(&mut self, now: DateTime<Utc>) {
        let ids: Vec<OrderId> = self
            .open_orders
            .iter()
            .filter(|o| o.role != OrderRole::Entry)
            .map(|o| o.id)
            .collect();
        for id in ids {
            self.cancel(id, now);
        }
    }

    fn apply_fill(&mut self, side: Side, size: u64, price: f64, commission: f64, now: DateTime<Utc>) {
        let signed = side.sign() * size as i64;
        self.cash -= signed as f64 * price + commission;
        self.total_commission += commission;

        let old = self.position;
        let new_size = old.size + signed;

        if old.is_flat() || old.side() == Some(side) {
            // Opening or adding
            let total = old.quantity() + size;
            let avg = if total == 0 {
                price
            } else {
                (old.price * old.quantity() as f64 + price * size as f64) / total as f64
            };
            self.position = Position {
                size: new_size,
                price: avg,
            };
            let trade = self.open_trade.get_or_insert(OpenTrade {
                side,
                entry_time: now,
                max_quantity: 0,
                realized_pnl: 0.0,
                commission: 0.0,
                exit_value: 0.0,
                exit_quantity: 0,
            });
            trade.max_quantity = trade.max_quantity.max(self.position.quantity());
            trade.commission += commission;
            return;
        }

        // Reducing, possibly through zero
        let closed = size.min(old.quantity());
        let pnl = (price - old.price) * closed as f64 * old.size.signum() as f64;
        let closing_commission = commission * closed as f64 / size as f64;

        if let Some(trade) = self.open_trade.as_mut() {
            trade.realized_pnl += pnl;
            trade.commission += closing_commission;
            trade.exit_value += price * closed as f64;
            trade.exit_quantity += closed;
        }

        if new_size == 0 || new_size.signum() != old.size.signum() {
            self.finish_trade(old.price, now);
        }

        if new_size == 0 {
            self.position = Position::default();
        } else if new_size.signum() == old.size.signum() {
            self.position = Position {
                size: new_size,
                price: old.price,
            };
        } else {
            // Flipped: the remainder opens a new trade at the fill price
            self.position = Position {
                size: new_size,
                price,
            };
            self.open_trade = Some(OpenTrade {
                side,
                entry_time: now,
                max_quantity: new_size.unsigned_abs(),
                realized_pnl: 0.0,
                commission: commission - closing_commission,
                exit_value: 0.0,
                exit_quantity: 0,
            });
        }
    }

    fn finish_trade(&mut self, entry_price: f64, now: DateTime<Utc>) {
        let Some(trade) = self.open_trade.take() else {
            return;
        };
        let exit_price = if trade.exit_quantity > 0 {
            trade.exit_value / trade.exit_quantity as f64
        } else {
            entry_price
        };
        self.closed_trades.push(Trade {
            symbol: self.symbol.clone(),
            side: trade.side,
            entry_price,
            exit_price,
            quantity: trade.max_quantity,
            entry_time: trade.entry_time,
            exit_time: now,
            pnl: trade.realized_pnl,
            commission: trade.commission,
            net_pnl: trade.realized_pnl - trade.commission,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn bar(day: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day);
        Candle::new_unchecked(t, open, high, low, close, 1000.0)
    }

    fn broker(cash: f64, commission: f64) -> Broker {
        Broker::new(
            Symbol::new("SBER.ME"),
            &BrokerConfig {
                initial_cash: cash,
                commission,
                slippage: 0.0,
            },
        )
    }

    #[test]
    fn test_market_order_fills_next_open() {
        let mut b = broker(10_000.0, 0.0);
        let t0 = bar(0, 100.0, 101.0, 99.0, 100.0);
        b.submit(OrderRequest::market(Side::Buy, 10, OrderRole::Entry), t0.datetime);
        assert_eq!(b.open_orders().len(), 1);
        assert_eq!(b.open_orders()[0].role, OrderRole::Entry);
        assert!(b.position().is_flat());

        b.process_bar(&bar(1, 102.0, 104.0, 101.0, 103.0));

        assert_eq!(b.position(), Position { size: 10, price: 102.0 });
        assert!((b.cash() - 8_980.0).abs() < 1e-9);
        assert!((b.value(103.0) - 10_010.0).abs() < 1e-9);

        let statuses: Vec<OrderStatus> = b.drain_order_events().iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![OrderStatus::Submitted, OrderStatus::Accepted, OrderStatus::Completed]
        );
    }

    #[test]
    fn test_unaffordable_buy_gets_margin() {
        let mut b = broker(1_000.0, 0.0);
        let t0 = bar(0, 100.0, 101.0, 99.0, 100.0);
        b.submit(OrderRequest::market(Side::Buy, 20, OrderRole::Entry), t0.datetime);
        b.process_bar(&bar(1, 100.0, 101.0, 99.0, 100.0));

        assert!(b.position().is_flat());
        let last = b.drain_order_events().pop().unwrap();
        assert_eq!(last.status, OrderStatus::Margin);
        assert!(b.open_orders().is_empty());
    }

    #[test]
    fn test_bracket_is_one_cancels_other() {
        let mut b = broker(10_000.0, 0.0);
        let t0 = bar(0, 100.0, 101.0, 99.0, 100.0);
        b.submit(OrderRequest::market(Side::Buy, 10, OrderRole::Entry), t0.datetime);
        b.process_bar(&bar(1, 100.0, 101.0, 99.0, 100.0));

        b.submit(OrderRequest::limit(Side::Sell, 10, 105.0, OrderRole::TakeProfit), t0.datetime);
        b.submit(OrderRequest::stop(Side::Sell, 10, 95.0, OrderRole::StopLoss), t0.datetime);
        b.process_bar(&bar(2, 103.0, 106.0, 102.0, 105.5));

        assert!(b.position().is_flat());
        assert!(b.open_orders().is_empty());
        let trades = b.drain_trades();
        assert_eq!(trades.len(), 1);
        assert!((trades[0].exit_price - 105.0).abs() < 1e-9);
        assert!((trades[0].pnl - 50.0).abs() < 1e-9);

        let canceled = b
            .drain_order_events()
            .into_iter()
            .filter(|o| o.status == OrderStatus::Canceled)
            .count();
        assert_eq!(canceled, 1);
    }

    #[test]
    fn test_stop_gap_fills_at_open() {
        let mut b = broker(10_000.0, 0.0);
        let t0 = bar(0, 100.0, 101.0, 99.0, 100.0);
        b.submit(OrderRequest::market(Side::Buy, 10, OrderRole::Entry), t0.datetime);
        b.process_bar(&bar(1, 100.0, 101.0, 99.0, 100.0));
        b.submit(OrderRequest::stop(Side::Sell, 10, 95.0, OrderRole::StopLoss), t0.datetime);

        // Gaps down through the stop
        b.process_bar(&bar(2, 90.0, 92.0, 88.0, 91.0));

        let trade = &b.drain_trades()[0];
        assert!((trade.exit_price - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_round_trip_and_close() {
        let mut b = broker(10_000.0, 0.001);
        let t0 = bar(0, 100.0, 101.0, 99.0, 100.0);
        b.submit(OrderRequest::market(Side::Sell, 10, OrderRole::Entry), t0.datetime);
        b.process_bar(&bar(1, 100.0, 101.0, 99.0, 100.0));
        assert_eq!(b.position().size, -10);

        b.submit(OrderRequest::limit(Side::Buy, 10, 90.0, OrderRole::TakeProfit), t0.datetime);
        b.submit(OrderRequest::stop(Side::Buy, 10, 110.0, OrderRole::StopLoss), t0.datetime);
        let close_id = b.close_position(t0.datetime);
        assert!(close_id.is_some());
        // Bracket was canceled, only the exit remains
        assert_eq!(b.open_orders().len(), 1);
        assert_eq!(b.open_orders()[0].role, OrderRole::Exit);
        assert!(b.close_position(t0.datetime).is_none());

        b.process_bar(&bar(2, 95.0, 96.0, 94.0, 95.0));

        assert!(b.position().is_flat());
        let trade = &b.drain_trades()[0];
        assert_eq!(trade.side, Side::Sell);
        assert!((trade.pnl - 50.0).abs() < 1e-9);
        assert!((trade.commission - (1.0 + 0.95)).abs() < 1e-9);
        assert!((b.cash() - (10_000.0 + 50.0 - 1.95)).abs() < 1e-9);
    }

    #[test]
    fn test_zero_size_rejected() {
        let mut b = broker(10_000.0, 0.0);
        let now = Utc::now();
        b.submit(OrderRequest::market(Side::Buy, 0, OrderRole::Entry), now);
        assert!(b.open_orders().is_empty());
        assert_eq!(b.drain_order_events().pop().unwrap().status, OrderStatus::Rejected);
    }
}
