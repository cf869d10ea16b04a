//! ATR-based position sizing
//!
//! Three variants, all risking a fixed percentage of equity per ATR of
//! adverse movement:
//!
//! ```text
//! risk_fraction:  size = floor(equity * risk% / ATR)
//! bounded_atr:    size = min(ceil(equity * risk% / clamp(ATR)),
//!                            floor(cash / price),
//!                            floor(equity * leverage / price))
//! cash_decrement: size = trunc(equity * risk% / ATR), reduced until
//!                 size * price * (1 + commission) <= cash
//! ```
//!
//! A non-finite or non-positive ATR yields size 0, which suppresses entry.

use serde::Serialize;
use tracing::warn;

use crate::config::SizingConfig;

/// Portfolio and market inputs for one sizing call
#[derive(Debug, Clone, Copy)]
pub struct SizingInput {
    pub equity: f64,
    pub cash: f64,
    pub price: f64,
    pub atr: f64,
}

/// Inputs, intermediate caps and result of one sizing call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizingDecision {
    pub method: &'static str,
    pub equity: f64,
    pub cash: f64,
    pub price: f64,
    pub atr: f64,
    /// ATR after clamping (equal to `atr` for unclamped variants)
    pub atr_used: f64,
    /// equity * risk% / 100
    pub risk_amount: f64,
    /// risk_amount / atr_used before rounding
    pub raw_size: f64,
    pub cash_cap: Option<u64>,
    pub leverage_cap: Option<u64>,
    pub size: u64,
}

/// Position sizer built from [`SizingConfig`]
#[derive(Debug, Clone, PartialEq)]
pub enum PositionSizer {
    RiskFraction {
        risk_percent: f64,
    },
    BoundedAtr {
        risk_percent: f64,
        atr_min: Option<f64>,
        atr_max: Option<f64>,
        leverage: f64,
    },
    CashDecrement {
        risk_percent: f64,
        commission: f64,
    },
}

impl PositionSizer {
    /// Build a sizer; `commission` is the broker's fractional commission
    pub fn from_config(config: &SizingConfig, commission: f64) -> Self {
        match *config {
            SizingConfig::RiskFraction { risk_percent } => PositionSizer::RiskFraction { risk_percent },
            SizingConfig::BoundedAtr {
                risk_percent,
                atr_min,
                atr_max,
                leverage,
            } => PositionSizer::BoundedAtr {
                risk_percent,
                atr_min,
                atr_max,
                leverage,
            },
            SizingConfig::CashDecrement { risk_percent } => PositionSizer::CashDecrement {
                risk_percent,
                commission,
            },
        }
    }

    pub fn method_name(&self) -> &'static str {
        match self {
            PositionSizer::RiskFraction { .. } => "risk_fraction",
            PositionSizer::BoundedAtr { .. } => "bounded_atr",
            PositionSizer::CashDecrement { .. } => "cash_decrement",
        }
    }

    fn risk_percent(&self) -> f64 {
        match self {
            PositionSizer::RiskFraction { risk_percent }
            | PositionSizer::BoundedAtr { risk_percent, .. }
            | PositionSizer::CashDecrement { risk_percent, .. } => *risk_percent,
        }
    }

    /// Compute the share count for an entry
    pub fn size(&self, input: &SizingInput) -> SizingDecision {
        let risk_amount = input.equity * self.risk_percent() / 100.0;
        let mut decision = SizingDecision {
            method: self.method_name(),
            equity: input.equity,
            cash: input.cash,
            price: input.price,
            atr: input.atr,
            atr_used: input.atr,
            risk_amount,
            raw_size: 0.0,
            cash_cap: None,
            leverage_cap: None,
            size: 0,
        };

        if !input.atr.is_finite() || input.atr <= 0.0 {
            warn!(atr = input.atr, "ATR is not positive, sizing to zero");
            return decision;
        }
        if !risk_amount.is_finite() || risk_amount <= 0.0 {
            return decision;
        }

        match *self {
            PositionSizer::RiskFraction { .. } => {
                decision.raw_size = risk_amount / input.atr;
                decision.size = to_shares(decision.raw_size.floor());
            }
            PositionSizer::BoundedAtr {
                atr_min,
                atr_max,
                leverage,
                ..
            } => {
                let mut atr_used = input.atr;
                if let Some(max) = atr_max {
                    atr_used = atr_used.min(max);
                }
                if let Some(min) = atr_min {
                    atr_used = atr_used.max(min);
                }
                if atr_used <= 0.0 {
                    warn!(atr = atr_used, "Clamped ATR is not positive, sizing to zero");
                    return decision;
                }
                decision.atr_used = atr_used;
                decision.raw_size = risk_amount / atr_used;

                if input.price <= 0.0 || !input.price.is_finite() {
                    return decision;
                }
                let cash_cap = to_shares((input.cash / input.price).floor());
                let leverage_cap = to_shares((input.equity * leverage / input.price).floor());
                decision.cash_cap = Some(cash_cap);
                decision.leverage_cap = Some(leverage_cap);
                decision.size = to_shares(decision.raw_size.ceil())
                    .min(cash_cap)
                    .min(leverage_cap);
            }
            PositionSizer::CashDecrement { commission, .. } => {
                decision.raw_size = risk_amount / input.atr;
                let mut size = to_shares(decision.raw_size.trunc());

                if input.price <= 0.0 || !input.price.is_finite() {
                    decision.size = 0;
                    return decision;
                }
                let unit_cost = input.price * (1.0 + commission);
                let cash_cap = to_shares((input.cash / unit_cost).floor());
                decision.cash_cap = Some(cash_cap);

                size = size.min(cash_cap);
                while size > 0 && size as f64 * unit_cost > input.cash {
                    size -= 1;
                }
                decision.size = size;
            }
        }

        decision
    }
}

/// Convert a rounded share count to an integer, treating anything
/// non-finite or negative as zero
fn to_shares(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(equity: f64, cash: f64, price: f64, atr: f64) -> SizingInput {
        SizingInput {
            equity,
            cash,
            price,
            atr,
        }
    }

    #[test]
    fn test_risk_fraction_floor() {
        let sizer = PositionSizer::RiskFraction { risk_percent: 1.0 };
        let d = sizer.size(&input(100_000.0, 100_000.0, 50.0, 2.0));
        assert_eq!(d.size, 500);

        let d = sizer.size(&input(100_000.0, 100_000.0, 50.0, 3.0));
        assert_eq!(d.size, 333);
    }

    #[test]
    fn test_zero_atr_suppresses_entry() {
        for sizer in [
            PositionSizer::RiskFraction { risk_percent: 1.0 },
            PositionSizer::BoundedAtr {
                risk_percent: 1.0,
                atr_min: None,
                atr_max: None,
                leverage: 1.0,
            },
            PositionSizer::CashDecrement {
                risk_percent: 1.0,
                commission: 0.0,
            },
        ] {
            assert_eq!(sizer.size(&input(100_000.0, 100_000.0, 10.0, 0.0)).size, 0);
            assert_eq!(sizer.size(&input(100_000.0, 100_000.0, 10.0, f64::NAN)).size, 0);
        }
    }

    #[test]
    fn test_bounded_atr_clamps_then_caps_by_cash() {
        let sizer = PositionSizer::BoundedAtr {
            risk_percent: 1.0,
            atr_min: None,
            atr_max: Some(1.5),
            leverage: 1.0,
        };

        // raw = 1000 / 1.5 = 666.67, cash only covers 500 shares at 100
        let d = sizer.size(&input(100_000.0, 50_000.0, 100.0, 2.0));
        assert_eq!(d.atr_used, 1.5);
        assert!((d.raw_size - 666.666_666).abs() < 1e-3);
        assert_eq!(d.cash_cap, Some(500));
        assert_eq!(d.size, 500);
        assert!(d.size as f64 * 100.0 <= 50_000.0);
    }

    #[test]
    fn test_bounded_atr_rounds_up_when_uncapped() {
        let sizer = PositionSizer::BoundedAtr {
            risk_percent: 1.0,
            atr_min: None,
            atr_max: Some(1.5),
            leverage: 1.0,
        };
        let d = sizer.size(&input(100_000.0, 100_000.0, 10.0, 2.0));
        assert_eq!(d.size, 667);
    }

    #[test]
    fn test_bounded_atr_min_floor() {
        let sizer = PositionSizer::BoundedAtr {
            risk_percent: 1.0,
            atr_min: Some(4.0),
            atr_max: None,
            leverage: 1.0,
        };
        let d = sizer.size(&input(100_000.0, 100_000.0, 10.0, 2.0));
        assert_eq!(d.atr_used, 4.0);
        assert_eq!(d.size, 250);
    }

    #[test]
    fn test_cash_decrement_respects_commission() {
        let sizer = PositionSizer::CashDecrement {
            risk_percent: 1.0,
            commission: 0.01,
        };
        // raw 500 shares at 100 = 50000 + 1% > 40000 cash
        let d = sizer.size(&input(100_000.0, 40_000.0, 100.0, 2.0));
        assert_eq!(d.size, 396);
        assert!(d.size as f64 * 100.0 * 1.01 <= 40_000.0);
    }

    #[test]
    fn test_from_config_carries_commission() {
        let sizer = PositionSizer::from_config(&SizingConfig::CashDecrement { risk_percent: 2.0 }, 0.001);
        assert_eq!(
            sizer,
            PositionSizer::CashDecrement {
                risk_percent: 2.0,
                commission: 0.001,
            }
        );
        assert_eq!(sizer.method_name(), "cash_decrement");
    }
}
