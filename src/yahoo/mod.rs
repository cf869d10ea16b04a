//! Yahoo Finance client for downloading daily OHLCV history
//! No API key needed for the public chart endpoint.

mod client;
mod types;

pub use client::{bars_from_chart, YahooClient, YahooError};
pub use types::*;
