//! Daily to weekly aggregation
//!
//! Weekly bars are rolled up from daily bars (first open, highest high,
//! lowest low, last close, summed volume) and stamped with the datetime of
//! the last daily bar in the group.
//!
//! A weekly bar is only complete once a daily bar belonging to a later week
//! has been seen, so at daily bar `i` the strategy may use exactly
//! `week_index[i]` weekly bars.

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::Candle;

/// How daily bars are grouped into weeks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekBoundary {
    /// Calendar week (ISO 8601, Monday start)
    #[default]
    IsoWeek,
    /// Every `n` trading days, counted from the first bar
    FixedBars(usize),
}

/// Weekly candles plus, for every daily bar, the index of the week it belongs to
#[derive(Debug, Clone)]
pub struct WeeklySeries {
    pub candles: Vec<Candle>,
    pub week_index: Vec<usize>,
}

/// Group key for a daily bar; equal keys share a week
fn group_key(candle: &Candle, position: usize, boundary: WeekBoundary) -> (i32, u32) {
    match boundary {
        WeekBoundary::IsoWeek => {
            let week = candle.datetime.iso_week();
            (week.year(), week.week())
        }
        WeekBoundary::FixedBars(n) => (0, (position / n.max(1)) as u32),
    }
}

/// Resample daily candles into weekly candles
pub fn resample_weekly(daily: &[Candle], boundary: WeekBoundary) -> WeeklySeries {
    let mut candles: Vec<Candle> = Vec::new();
    let mut week_index = Vec::with_capacity(daily.len());
    let mut current_key: Option<(i32, u32)> = None;

    for (i, bar) in daily.iter().enumerate() {
        let key = group_key(bar, i, boundary);

        match (current_key, candles.last_mut()) {
            (Some(k), Some(week)) if k == key => {
                week.high = week.high.max(bar.high);
                week.low = week.low.min(bar.low);
                week.close = bar.close;
                week.volume += bar.volume;
                week.datetime = bar.datetime;
            }
            _ => {
                candles.push(bar.clone());
                current_key = Some(key);
            }
        }

        week_index.push(candles.len() - 1);
    }

    WeeklySeries {
        candles,
        week_index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn day(y: i32, m: u32, d: u32, o: f64, h: f64, l: f64, c: f64) -> Candle {
        Candle::new_unchecked(
            Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap(),
            o,
            h,
            l,
            c,
            100.0,
        )
    }

    #[test]
    fn test_iso_week_rollup() {
        // Mon 2024-01-08 .. Fri 2024-01-12, then Mon 2024-01-15
        let daily = vec![
            day(2024, 1, 8, 10.0, 11.0, 9.5, 10.5),
            day(2024, 1, 9, 10.5, 12.0, 10.0, 11.0),
            day(2024, 1, 10, 11.0, 11.5, 9.0, 9.5),
            day(2024, 1, 12, 9.5, 10.0, 9.2, 9.8),
            day(2024, 1, 15, 9.8, 10.2, 9.6, 10.0),
        ];

        let weekly = resample_weekly(&daily, WeekBoundary::IsoWeek);

        assert_eq!(weekly.candles.len(), 2);
        let w = &weekly.candles[0];
        assert_eq!(w.open, 10.0);
        assert_eq!(w.high, 12.0);
        assert_eq!(w.low, 9.0);
        assert_eq!(w.close, 9.8);
        assert_eq!(w.volume, 400.0);
        assert_eq!(w.datetime, daily[3].datetime);
        assert_eq!(weekly.week_index, vec![0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_week_visible_only_after_it_closes() {
        let daily = vec![
            day(2024, 1, 11, 10.0, 11.0, 9.0, 10.0),
            day(2024, 1, 12, 10.0, 11.0, 9.0, 10.0),
            day(2024, 1, 15, 10.0, 11.0, 9.0, 10.0),
        ];
        let weekly = resample_weekly(&daily, WeekBoundary::IsoWeek);

        // Friday still sees no closed week; the next Monday sees one
        assert_eq!(weekly.week_index[1], 0);
        assert_eq!(weekly.week_index[2], 1);
    }

    #[test]
    fn test_fixed_bars_grouping() {
        let daily: Vec<Candle> = (1..=7)
            .map(|d| day(2024, 3, d, 10.0, 11.0, 9.0, 10.0 + d as f64 * 0.1))
            .collect();

        let weekly = resample_weekly(&daily, WeekBoundary::FixedBars(3));

        assert_eq!(weekly.candles.len(), 3);
        assert_eq!(weekly.week_index, vec![0, 0, 0, 1, 1, 1, 2]);
        assert!((weekly.candles[1].close - 10.6).abs() < 1e-9);
    }

    #[test]
    fn test_week_boundary_serde() {
        let b: WeekBoundary = serde_json::from_str(r#""iso_week""#).unwrap();
        assert_eq!(b, WeekBoundary::IsoWeek);
        let b: WeekBoundary = serde_json::from_str(r#"{"fixed_bars": 5}"#).unwrap();
        assert_eq!(b, WeekBoundary::FixedBars(5));
    }
}
