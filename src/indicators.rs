//! Technical indicators
//!
//! Moving averages, MACD and RSI wrap the `ta` crate. ATR and ADX use
//! Wilder's smoothing, matching how trend-strength is usually quoted.
//!
//! Every function returns one entry per input bar; entries are `None` until
//! the indicator has seen enough bars to be meaningful.

use ta::indicators::{
    ExponentialMovingAverage, MovingAverageConvergenceDivergence, RelativeStrengthIndex,
    SimpleMovingAverage,
};
use ta::Next;

/// MACD line, signal line and histogram (MACD - signal)
#[derive(Debug, Clone, Default)]
pub struct MacdOutput {
    pub macd: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

// =============================================================================
// Moving Averages
// =============================================================================

/// Calculate Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match SimpleMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let v = indicator.next(value);
            (i + 1 >= period).then_some(v)
        })
        .collect()
}

/// Calculate Exponential Moving Average
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match ExponentialMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let v = indicator.next(value);
            (i + 1 >= period).then_some(v)
        })
        .collect()
}

// =============================================================================
// Volatility
// =============================================================================

/// Calculate True Range
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(high.len());

    for i in 0..high.len() {
        let tr_value = if i == 0 {
            high[i] - low[i]
        } else {
            let hl = high[i] - low[i];
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            hl.max(hc).max(lc)
        };
        tr.push(tr_value);
    }

    tr
}

/// Wilder's smoothing: first value is the SMA of the first `period` inputs,
/// then `(prev * (period - 1) + x) / period`
fn wilders_smooth(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut result = Vec::with_capacity(values.len());
    let mut smoothed: Option<f64> = None;

    for i in 0..values.len() {
        if i + 1 < period {
            result.push(None);
        } else if i + 1 == period {
            let sum: f64 = values[0..period].iter().sum();
            smoothed = Some(sum / period as f64);
            result.push(smoothed);
        } else if let Some(prev) = smoothed {
            let new_val = (prev * (period - 1) as f64 + values[i]) / period as f64;
            smoothed = Some(new_val);
            result.push(smoothed);
        } else {
            result.push(None);
        }
    }

    result
}

/// Calculate Average True Range (ATR) using Wilder's smoothing
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    if high.is_empty() || period == 0 || high.len() != low.len() || high.len() != close.len() {
        return vec![];
    }

    wilders_smooth(&true_range(high, low, close), period)
}

/// Calculate Directional Movement Index components (+DI, -DI)
pub fn dmi(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    if high.is_empty() || period == 0 {
        return (vec![], vec![]);
    }

    let mut plus_dm = vec![0.0; high.len()];
    let mut minus_dm = vec![0.0; high.len()];

    for i in 1..high.len() {
        let up_move = high[i] - high[i - 1];
        let down_move = low[i - 1] - low[i];

        if up_move > down_move && up_move > 0.0 {
            plus_dm[i] = up_move;
        }
        if down_move > up_move && down_move > 0.0 {
            minus_dm[i] = down_move;
        }
    }

    let smoothed_plus_dm = wilders_smooth(&plus_dm, period);
    let smoothed_minus_dm = wilders_smooth(&minus_dm, period);
    let atr_values = atr(high, low, close, period);

    let mut plus_di = Vec::with_capacity(high.len());
    let mut minus_di = Vec::with_capacity(high.len());

    for i in 0..high.len() {
        match (
            smoothed_plus_dm.get(i),
            smoothed_minus_dm.get(i),
            atr_values.get(i),
        ) {
            (Some(Some(pdm)), Some(Some(mdm)), Some(Some(atr_val))) if *atr_val > 0.0 => {
                plus_di.push(Some(pdm / atr_val * 100.0));
                minus_di.push(Some(mdm / atr_val * 100.0));
            }
            _ => {
                plus_di.push(None);
                minus_di.push(None);
            }
        }
    }

    (plus_di, minus_di)
}

/// Calculate Average Directional Index (ADX) using Wilder's smoothing
///
/// Needs `2 * period - 1` bars: one period for the DI lines, a second for
/// smoothing DX.
pub fn adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    if high.is_empty() || period == 0 {
        return vec![];
    }

    let (plus_di, minus_di) = dmi(high, low, close, period);
    let di_start = period - 1;

    let mut result = vec![None; high.len()];
    if high.len() <= di_start {
        return result;
    }

    let dx_values: Vec<f64> = (di_start..high.len())
        .map(|i| match (plus_di[i], minus_di[i]) {
            (Some(pdi), Some(mdi)) if pdi + mdi > 0.0 => (pdi - mdi).abs() / (pdi + mdi) * 100.0,
            _ => 0.0,
        })
        .collect();

    for (j, value) in wilders_smooth(&dx_values, period).into_iter().enumerate() {
        result[di_start + j] = value;
    }

    result
}

// =============================================================================
// Momentum
// =============================================================================

/// Calculate RSI (Relative Strength Index) using ta crate
///
/// The first value is reported after `period` price changes.
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match RelativeStrengthIndex::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let v = indicator.next(value);
            (i >= period).then_some(v)
        })
        .collect()
}

/// Calculate MACD using ta crate
///
/// Values are reported once both the slow EMA and the signal EMA have
/// warmed up (`slow + signal - 1` bars).
pub fn macd(values: &[f64], fast_period: usize, slow_period: usize, signal_period: usize) -> MacdOutput {
    if values.is_empty() {
        return MacdOutput::default();
    }

    let mut indicator =
        match MovingAverageConvergenceDivergence::new(fast_period, slow_period, signal_period) {
            Ok(i) => i,
            Err(_) => {
                return MacdOutput {
                    macd: vec![None; values.len()],
                    signal: vec![None; values.len()],
                    histogram: vec![None; values.len()],
                }
            }
        };

    let warmup = slow_period + signal_period - 1;
    let mut output = MacdOutput {
        macd: Vec::with_capacity(values.len()),
        signal: Vec::with_capacity(values.len()),
        histogram: Vec::with_capacity(values.len()),
    };

    for (i, &value) in values.iter().enumerate() {
        let out = indicator.next(value);
        let ready = i + 1 >= warmup;
        output.macd.push(ready.then_some(out.macd));
        output.signal.push(ready.then_some(out.signal));
        output.histogram.push(ready.then_some(out.histogram));
    }

    output
}

// =============================================================================
// Tests
// =============================================================================
