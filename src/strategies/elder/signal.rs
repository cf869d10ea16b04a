//! Weekly trend classification and the entry/exit rules built on it

use serde::{Deserialize, Serialize};

use crate::{Side, Signal};

/// Weekly impulse: EMA slope and MACD-histogram slope agreeing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendState {
    Up,
    Down,
    Flat,
}

impl TrendState {
    /// Up if both rose strictly, Down if both fell strictly, otherwise Flat
    pub fn classify(ema_now: f64, ema_prev: f64, hist_now: f64, hist_prev: f64) -> Self {
        if ema_now > ema_prev && hist_now > hist_prev {
            TrendState::Up
        } else if ema_now < ema_prev && hist_now < hist_prev {
            TrendState::Down
        } else {
            TrendState::Flat
        }
    }

    pub fn is_directional(self) -> bool {
        self != TrendState::Flat
    }
}

/// Trend state on the prior and the current completed week
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendTransition {
    pub prev: TrendState,
    pub curr: TrendState,
}

impl TrendTransition {
    /// Momentum just faded: directional last week, flat this week
    pub fn is_fresh_flat(&self) -> bool {
        self.prev.is_directional() && self.curr == TrendState::Flat
    }
}

/// Which faded direction becomes which entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPairing {
    /// Fade out of Down -> long, fade out of Up -> short
    #[default]
    Reversal,
    /// Fade out of Up -> long, fade out of Down -> short
    Continuation,
}

impl EntryPairing {
    /// Entry direction for a fresh-flat transition out of `faded`
    pub fn direction(self, faded: TrendState) -> Signal {
        match (self, faded) {
            (_, TrendState::Flat) => Signal::Flat,
            (EntryPairing::Reversal, TrendState::Down)
            | (EntryPairing::Continuation, TrendState::Up) => Signal::Long,
            (EntryPairing::Reversal, TrendState::Up)
            | (EntryPairing::Continuation, TrendState::Down) => Signal::Short,
        }
    }
}

/// Weekly values; index 0 is the latest completed week
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeeklySnapshot {
    pub ema: [f64; 3],
    pub hist: [f64; 3],
    pub adx: f64,
}

impl WeeklySnapshot {
    pub fn transition(&self) -> TrendTransition {
        TrendTransition {
            prev: TrendState::classify(self.ema[1], self.ema[2], self.hist[1], self.hist[2]),
            curr: TrendState::classify(self.ema[0], self.ema[1], self.hist[0], self.hist[1]),
        }
    }
}

/// Daily values on the current bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailySnapshot {
    pub close: f64,
    pub atr: f64,
    pub rsi: f64,
    pub ema_trend: f64,
}

/// Thresholds for the entry gate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateParams {
    pub adx_threshold: f64,
    pub rsi_low: f64,
    pub rsi_high: f64,
    pub pairing: EntryPairing,
}

/// Entry direction if every filter passes, otherwise `Signal::Flat`.
///
/// Callers must only ask while flat with no entry pending.
pub fn entry_signal(weekly: &WeeklySnapshot, daily: &DailySnapshot, params: &GateParams) -> Signal {
    let transition = weekly.transition();
    if !transition.is_fresh_flat() || weekly.adx <= params.adx_threshold {
        return Signal::Flat;
    }

    match params.pairing.direction(transition.prev) {
        Signal::Long if daily.rsi > params.rsi_low && daily.close > daily.ema_trend => Signal::Long,
        Signal::Short if daily.rsi < params.rsi_high && daily.close < daily.ema_trend => {
            Signal::Short
        }
        _ => Signal::Flat,
    }
}

/// Close when the current weekly state turns against the open side
pub fn trend_flip_exit(position_side: Side, curr: TrendState) -> bool {
    matches!(
        (position_side, curr),
        (Side::Buy, TrendState::Down) | (Side::Sell, TrendState::Up)
    )
}

/// Take-profit and stop-loss prices around `reference`
pub fn bracket_prices(side: Side, reference: f64, atr: f64, tp_mult: f64, sl_mult: f64) -> (f64, f64) {
    match side {
        Side::Buy => (reference + atr * tp_mult, reference - atr * sl_mult),
        Side::Sell => (reference - atr * tp_mult, reference + atr * sl_mult),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(pairing: EntryPairing) -> GateParams {
        GateParams {
            adx_threshold: 15.0,
            rsi_low: 30.0,
            rsi_high: 70.0,
            pairing,
        }
    }

    /// Weekly snapshot whose previous week was `prev` and current week is flat
    fn faded_from(prev: TrendState, adx: f64) -> WeeklySnapshot {
        let (ema, hist) = match prev {
            // ema and hist both rose into week 1, then ema kept rising while hist fell
            TrendState::Up => ([12.0, 11.0, 10.0], [0.4, 0.5, 0.2]),
            TrendState::Down => ([8.0, 9.0, 10.0], [-0.4, -0.5, -0.2]),
            TrendState::Flat => ([10.0, 10.0, 10.0], [0.0, 0.0, 0.0]),
        };
        WeeklySnapshot { ema, hist, adx }
    }

    #[test]
    fn test_classify_labels() {
        assert_eq!(TrendState::classify(2.0, 1.0, 0.5, 0.1), TrendState::Up);
        assert_eq!(TrendState::classify(1.0, 2.0, 0.1, 0.5), TrendState::Down);
        assert_eq!(TrendState::classify(2.0, 1.0, 0.1, 0.5), TrendState::Flat);
        // Equal values are not a strict move
        assert_eq!(TrendState::classify(1.0, 1.0, 0.5, 0.1), TrendState::Flat);
    }

    #[test]
    fn test_fresh_flat_requires_directional_prev() {
        let t = TrendTransition {
            prev: TrendState::Up,
            curr: TrendState::Flat,
        };
        assert!(t.is_fresh_flat());
        let t = TrendTransition {
            prev: TrendState::Flat,
            curr: TrendState::Flat,
        };
        assert!(!t.is_fresh_flat());
        let t = TrendTransition {
            prev: TrendState::Down,
            curr: TrendState::Up,
        };
        assert!(!t.is_fresh_flat());
    }

    #[test]
    fn test_snapshot_transition() {
        let t = faded_from(TrendState::Up, 20.0).transition();
        assert_eq!(t.prev, TrendState::Up);
        assert_eq!(t.curr, TrendState::Flat);
    }

    #[test]
    fn test_continuation_long_after_up_fades() {
        let daily = DailySnapshot {
            close: 110.0,
            atr: 2.0,
            rsi: 45.0,
            ema_trend: 100.0,
        };
        let weekly = faded_from(TrendState::Up, 20.0);
        assert_eq!(entry_signal(&weekly, &daily, &gate(EntryPairing::Continuation)), Signal::Long);
        // Reversal reads the same fade as a short candidate, blocked by close > EMA200
        assert_eq!(entry_signal(&weekly, &daily, &gate(EntryPairing::Reversal)), Signal::Flat);
    }

    #[test]
    fn test_reversal_long_after_down_fades() {
        let daily = DailySnapshot {
            close: 110.0,
            atr: 2.0,
            rsi: 45.0,
            ema_trend: 100.0,
        };
        let weekly = faded_from(TrendState::Down, 20.0);
        assert_eq!(entry_signal(&weekly, &daily, &gate(EntryPairing::Reversal)), Signal::Long);
    }

    #[test]
    fn test_reversal_short_after_up_fades() {
        let daily = DailySnapshot {
            close: 90.0,
            atr: 2.0,
            rsi: 60.0,
            ema_trend: 100.0,
        };
        let weekly = faded_from(TrendState::Up, 20.0);
        assert_eq!(entry_signal(&weekly, &daily, &gate(EntryPairing::Reversal)), Signal::Short);

        let overbought = DailySnapshot { rsi: 75.0, ..daily };
        assert_eq!(entry_signal(&weekly, &overbought, &gate(EntryPairing::Reversal)), Signal::Flat);
    }

    #[test]
    fn test_weak_adx_blocks_entry() {
        let daily = DailySnapshot {
            close: 110.0,
            atr: 2.0,
            rsi: 45.0,
            ema_trend: 100.0,
        };
        let weekly = faded_from(TrendState::Down, 15.0);
        assert_eq!(entry_signal(&weekly, &daily, &gate(EntryPairing::Reversal)), Signal::Flat);
    }

    #[test]
    fn test_trend_flip_exit() {
        assert!(trend_flip_exit(Side::Buy, TrendState::Down));
        assert!(!trend_flip_exit(Side::Buy, TrendState::Flat));
        assert!(trend_flip_exit(Side::Sell, TrendState::Up));
        assert!(!trend_flip_exit(Side::Sell, TrendState::Down));
    }

    #[test]
    fn test_bracket_prices() {
        let (tp, sl) = bracket_prices(Side::Buy, 100.0, 2.0, 1.5, 1.0);
        assert_eq!((tp, sl), (103.0, 98.0));
        let (tp, sl) = bracket_prices(Side::Sell, 100.0, 2.0, 1.5, 1.0);
        assert_eq!((tp, sl), (97.0, 102.0));
    }
}
