//! Yahoo Finance chart API client
//!
//! Fetches daily bars and adjusts them for splits and dividends using the
//! adjusted-close ratio, so the series is continuous.
//!
//! # Example
//! ```no_run
//! use chrono::NaiveDate;
//! use elder_screen::yahoo::YahooClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = YahooClient::new()?;
//!     let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//!     let end = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
//!     let bars = client.get_daily_bars("SBER.ME", start, end).await?;
//!     println!("Fetched {} bars", bars.len());
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use std::time::Duration as StdDuration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::types::{ChartResponse, ChartResult};
use crate::Candle;

/// Base URL for the chart endpoint
const YAHOO_CHART_BASE: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Yahoo rejects requests without a browser-like agent
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) elder-screen/0.1";

/// Errors from the Yahoo Finance API
#[derive(Debug, Error)]
pub enum YahooError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Yahoo API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Yahoo API error {code}: {description}")]
    Api { code: String, description: String },

    #[error("no data returned for {0}")]
    NoData(String),
}

/// Yahoo Finance chart API client
#[derive(Debug, Clone)]
pub struct YahooClient {
    client: Client,
    auto_adjust: bool,
}

impl YahooClient {
    /// Create a new client that adjusts prices by the adjusted close
    pub fn new() -> Result<Self, YahooError> {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(YahooClient {
            client,
            auto_adjust: true,
        })
    }

    /// Keep raw, unadjusted prices
    pub fn without_adjustment(mut self) -> Self {
        self.auto_adjust = false;
        self
    }

    /// Fetch daily bars with `start <= date < end`
    pub async fn get_daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Candle>, YahooError> {
        let url = format!("{}/{}", YAHOO_CHART_BASE, symbol);
        let params = [
            ("period1", midnight_ts(start).to_string()),
            ("period2", midnight_ts(end).to_string()),
            ("interval", "1d".to_string()),
            ("events", "div,split".to_string()),
            ("includeAdjustedClose", "true".to_string()),
        ];

        debug!(symbol, %start, %end, "Fetching Yahoo chart");

        let response = self.client.get(&url).query(&params).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            // Yahoo reports unknown symbols as 404 with a JSON error body
            if let Ok(parsed) = serde_json::from_str::<ChartResponse>(&body) {
                if let Some(err) = parsed.chart.error {
                    return Err(YahooError::Api {
                        code: err.code,
                        description: err.description,
                    });
                }
            }
            return Err(YahooError::Status { status, body });
        }

        let parsed: ChartResponse = response.json().await?;
        if let Some(err) = parsed.chart.error {
            return Err(YahooError::Api {
                code: err.code,
                description: err.description,
            });
        }

        let result = parsed
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| YahooError::NoData(symbol.to_string()))?;

        let bars: Vec<Candle> = bars_from_chart(&result, self.auto_adjust)
            .into_iter()
            .filter(|c| {
                let d = c.datetime.date_naive();
                d >= start && d < end
            })
            .collect();

        if bars.is_empty() {
            return Err(YahooError::NoData(symbol.to_string()));
        }

        info!("Fetched {} daily bars for {}", bars.len(), symbol);
        Ok(bars)
    }
}

/// Unix seconds at UTC midnight of `date`
fn midnight_ts(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

/// Convert a chart result into candles.
///
/// Timestamps are shifted into exchange-local time and truncated to the
/// calendar date (stored as UTC midnight). Rows with missing fields are
/// dropped; rows failing candle validation are skipped with a warning.
pub fn bars_from_chart(result: &ChartResult, auto_adjust: bool) -> Vec<Candle> {
    let Some(quote) = result.indicators.quote.first() else {
        return Vec::new();
    };
    let adjclose = result.indicators.adjclose.first().map(|a| &a.adjclose);
    let offset = result.meta.gmtoffset;

    let column = |col: &[Option<f64>], i: usize| col.get(i).copied().flatten();

    let mut bars = Vec::with_capacity(result.timestamp.len());
    let mut missing = 0usize;

    for (i, &ts) in result.timestamp.iter().enumerate() {
        let (Some(open), Some(high), Some(low), Some(close)) = (
            column(&quote.open, i),
            column(&quote.high, i),
            column(&quote.low, i),
            column(&quote.close, i),
        ) else {
            missing += 1;
            continue;
        };
        let volume = column(&quote.volume, i).unwrap_or(0.0);

        let Some(date) = DateTime::<Utc>::from_timestamp(ts + offset, 0).map(|dt| dt.date_naive())
        else {
            missing += 1;
            continue;
        };
        let Some(datetime) = date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()) else {
            missing += 1;
            continue;
        };

        let (open, high, low, close) = match adjclose.and_then(|a| column(a, i)) {
            Some(adj) if auto_adjust && close > 0.0 => {
                let ratio = adj / close;
                (open * ratio, high * ratio, low * ratio, adj)
            }
            _ => (open, high, low, close),
        };

        match Candle::new(datetime, open, high, low, close, volume) {
            Ok(candle) => bars.push(candle),
            Err(e) => warn!(symbol = %result.meta.symbol, date = %date, "Skipping invalid bar: {}", e),
        }
    }

    if missing > 0 {
        debug!(symbol = %result.meta.symbol, missing, "Dropped bars with missing fields");
    }

    // Intraday snapshots of the current session can repeat the last date
    bars.dedup_by_key(|c| c.datetime);
    bars
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "chart": {
            "result": [{
                "meta": { "symbol": "SBER.ME", "currency": "RUB", "gmtoffset": 10800 },
                "timestamp": [1704261600, 1704348000, 1704434400],
                "indicators": {
                    "quote": [{
                        "open":   [270.0, 272.0, null],
                        "high":   [274.0, 275.0, 276.0],
                        "low":    [268.0, 271.0, 270.0],
                        "close":  [272.0, 274.0, 275.0],
                        "volume": [1000, 1200, 900]
                    }],
                    "adjclose": [{ "adjclose": [136.0, 137.0, 137.5] }]
                }
            }],
            "error": null
        }
    }"#;

    fn sample_result() -> ChartResult {
        let parsed: ChartResponse = serde_json::from_str(SAMPLE).unwrap();
        parsed.chart.result.unwrap().remove(0)
    }

    #[test]
    fn test_adjusted_bars() {
        let bars = bars_from_chart(&sample_result(), true);

        // Third row has a null open and is dropped
        assert_eq!(bars.len(), 2);
        let first = &bars[0];
        assert!((first.close - 136.0).abs() < 1e-9);
        assert!((first.open - 135.0).abs() < 1e-9);
        assert!((first.high - 137.0).abs() < 1e-9);
        assert_eq!(first.datetime.format("%Y-%m-%d %H:%M").to_string(), "2024-01-03 00:00");
    }

    #[test]
    fn test_raw_bars() {
        let bars = bars_from_chart(&sample_result(), false);
        assert!((bars[1].close - 274.0).abs() < 1e-9);
        assert_eq!(bars[1].volume, 1200.0);
    }

    #[test]
    fn test_error_body_parses() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let parsed: ChartResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.chart.result.is_none());
        assert_eq!(parsed.chart.error.unwrap().code, "Not Found");
    }

    #[test]
    fn test_midnight_ts() {
        let d = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        assert_eq!(midnight_ts(d), 1_577_836_800);
    }
}
