//! Elder Triple-Screen Configuration

use serde::{Deserialize, Serialize};

use super::signal::{EntryPairing, GateParams};

/// When the take-profit / stop-loss pair is (re)submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketMode {
    /// Once, on the first bar the position is seen open
    #[default]
    Once,
    /// Canceled and replaced on every bar with the current ATR
    EveryBar,
}

/// Configuration for the Elder triple-screen strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElderConfig {
    /// Weekly EMA period (default: 13)
    #[serde(default = "default_ema_len")]
    pub ema_len: usize,

    /// Weekly MACD fast EMA (default: 12)
    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,

    /// Weekly MACD slow EMA (default: 26)
    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,

    /// Weekly MACD signal EMA (default: 9)
    #[serde(default = "default_macd_signal")]
    pub macd_signal: usize,

    /// Weekly ADX period (default: 14)
    #[serde(default = "default_adx_len")]
    pub adx_len: usize,

    /// Minimum weekly ADX for entries (default: 15)
    #[serde(default = "default_adx_threshold")]
    pub adx_threshold: f64,

    /// Daily ATR period (default: 14)
    #[serde(default = "default_atr_len")]
    pub atr_len: usize,

    /// Take profit distance in ATR (default: 1.5)
    #[serde(default = "default_tp_mult")]
    pub tp_mult: f64,

    /// Stop loss distance in ATR (default: 1.0)
    #[serde(default = "default_sl_mult")]
    pub sl_mult: f64,

    /// Daily RSI period (default: 14)
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,

    /// Longs need RSI above this (default: 30)
    #[serde(default = "default_rsi_low")]
    pub rsi_low: f64,

    /// Shorts need RSI below this (default: 70)
    #[serde(default = "default_rsi_high")]
    pub rsi_high: f64,

    /// Daily macro trend EMA period (default: 200)
    #[serde(default = "default_ema_trend")]
    pub ema_trend: usize,

    #[serde(default)]
    pub entry_pairing: EntryPairing,

    #[serde(default)]
    pub bracket_mode: BracketMode,
}

fn default_ema_len() -> usize { 13 }
fn default_macd_fast() -> usize { 12 }
fn default_macd_slow() -> usize { 26 }
fn default_macd_signal() -> usize { 9 }
fn default_adx_len() -> usize { 14 }
fn default_adx_threshold() -> f64 { 15.0 }
fn default_atr_len() -> usize { 14 }
fn default_tp_mult() -> f64 { 1.5 }
fn default_sl_mult() -> f64 { 1.0 }
fn default_rsi_period() -> usize { 14 }
fn default_rsi_low() -> f64 { 30.0 }
fn default_rsi_high() -> f64 { 70.0 }
fn default_ema_trend() -> usize { 200 }

impl Default for ElderConfig {
    fn default() -> Self {
        Self {
            ema_len: default_ema_len(),
            macd_fast: default_macd_fast(),
            macd_slow: default_macd_slow(),
            macd_signal: default_macd_signal(),
            adx_len: default_adx_len(),
            adx_threshold: default_adx_threshold(),
            atr_len: default_atr_len(),
            tp_mult: default_tp_mult(),
            sl_mult: default_sl_mult(),
            rsi_period: default_rsi_period(),
            rsi_low: default_rsi_low(),
            rsi_high: default_rsi_high(),
            ema_trend: default_ema_trend(),
            entry_pairing: EntryPairing::default(),
            bracket_mode: BracketMode::default(),
        }
    }
}

impl ElderConfig {
    /// Thresholds for the entry gate
    pub fn gate_params(&self) -> GateParams {
        GateParams {
            adx_threshold: self.adx_threshold,
            rsi_low: self.rsi_low,
            rsi_high: self.rsi_high,
            pairing: self.entry_pairing,
        }
    }

    /// Reject parameter sets the indicators cannot be built from
    pub fn validate(&self) -> anyhow::Result<()> {
        let periods = [
            ("ema_len", self.ema_len),
            ("macd_fast", self.macd_fast),
            ("macd_slow", self.macd_slow),
            ("macd_signal", self.macd_signal),
            ("adx_len", self.adx_len),
            ("atr_len", self.atr_len),
            ("rsi_period", self.rsi_period),
            ("ema_trend", self.ema_trend),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, p)| *p == 0) {
            anyhow::bail!("{} must be at least 1", name);
        }
        if self.macd_fast >= self.macd_slow {
            anyhow::bail!(
                "macd_fast ({}) must be below macd_slow ({})",
                self.macd_fast,
                self.macd_slow
            );
        }
        if self.tp_mult <= 0.0 || self.sl_mult <= 0.0 {
            anyhow::bail!("tp_mult and sl_mult must be positive");
        }
        if self.rsi_low >= self.rsi_high {
            anyhow::bail!(
                "rsi_low ({}) must be below rsi_high ({})",
                self.rsi_low,
                self.rsi_high
            );
        }
        Ok(())
    }
}
