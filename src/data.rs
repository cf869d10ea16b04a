//! Data loading and management
//!
//! Daily bars are cached as `{data_dir}/{SYMBOL}_1d.csv`. Missing files, or
//! files that do not cover the requested range, are (re)downloaded from
//! Yahoo Finance.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::yahoo::YahooClient;
use crate::{Candle, Symbol};

/// Cache file interval suffix
pub const DAILY_INTERVAL: &str = "1d";

/// Gap tolerated at either end of a cached file (weekends and holidays)
const COVERAGE_SLACK_DAYS: i64 = 7;

// =============================================================================
// CSV Data Loading
// =============================================================================

/// Load OHLCV data from CSV file with validation
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path).context("Failed to open CSV file")?;

    let mut candles = Vec::new();
    let mut invalid_count = 0;

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.context(format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(0).context("Missing datetime column")?;
        let datetime = parse_date(dt_str)?;

        let field = |idx: usize, name: &str| -> Result<f64> {
            record
                .get(idx)
                .context(format!("Missing {} column", name))?
                .trim()
                .parse()
                .context(format!("Failed to parse {}", name))
        };
        let open = field(1, "open")?;
        let high = field(2, "high")?;
        let low = field(3, "low")?;
        let close = field(4, "close")?;
        let volume = field(5, "volume")?;

        match Candle::new(datetime, open, high, low, close, volume) {
            Ok(candle) => candles.push(candle),
            Err(e) => {
                invalid_count += 1;
                warn!(
                    "Skipping invalid candle at row {} in {:?}: {}",
                    row_idx + 2, // +2 for 1-indexed and header row
                    path.file_name().unwrap_or_default(),
                    e
                );
            }
        }
    }

    if invalid_count > 0 {
        warn!(
            "Skipped {} invalid candles out of {} in {:?}",
            invalid_count,
            invalid_count + candles.len(),
            path.file_name().unwrap_or_default()
        );
    }

    candles.sort_by_key(|c| c.datetime);
    candles.dedup_by_key(|c| c.datetime);
    Ok(candles)
}

/// Write candles in the format `load_csv` reads
pub fn save_csv(candles: &[Candle], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create data directory")?;
    }
    let mut file = BufWriter::new(File::create(path).context("Failed to create output file")?);

    writeln!(file, "datetime,open,high,low,close,volume")?;

    for candle in candles {
        writeln!(
            file,
            "{},{},{},{},{},{}",
            candle.datetime.format("%Y-%m-%d %H:%M:%S"),
            candle.open,
            candle.high,
            candle.low,
            candle.close,
            candle.volume
        )?;
    }
    file.flush()?;

    info!("Saved {} rows to {}", candles.len(), path.display());
    Ok(())
}

/// Keep candles dated `start <= date < end`
pub fn filter_candles_by_date(candles: Vec<Candle>, start: NaiveDate, end: NaiveDate) -> Vec<Candle> {
    candles
        .into_iter()
        .filter(|c| {
            let d = c.datetime.date_naive();
            d >= start && d < end
        })
        .collect()
}

/// Parse a date string (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS) to DateTime<Utc>
pub fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    let date_str = date_str.trim();

    if let Ok(dt) = date_str.parse::<DateTime<Utc>>() {
        return Ok(dt);
    }

    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(date_str, "%Y-%m-%d %H:%M:%S") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc));
    }

    if let Ok(nd) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
        if let Some(ndt) = nd.and_hms_opt(0, 0, 0) {
            return Ok(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc));
        }
    }

    anyhow::bail!(
        "Failed to parse date: {}. Use YYYY-MM-DD or YYYY-MM-DD HH:MM:SS format",
        date_str
    )
}

/// Cache location for a symbol's daily bars
pub fn cache_path(data_dir: impl AsRef<Path>, symbol: &Symbol) -> PathBuf {
    data_dir
        .as_ref()
        .join(format!("{}_{}.csv", symbol.as_str(), DAILY_INTERVAL))
}

/// Whether cached bars span `[start, end)`, allowing for non-trading days
pub fn covers_range(candles: &[Candle], start: NaiveDate, end: NaiveDate) -> bool {
    let (Some(first), Some(last)) = (candles.first(), candles.last()) else {
        return false;
    };
    let slack = Duration::days(COVERAGE_SLACK_DAYS);
    // Data cannot exist past today
    let effective_end = end.min(Utc::now().date_naive());

    first.datetime.date_naive() <= start + slack && last.datetime.date_naive() + slack >= effective_end
}

/// Load a symbol's cached bars for `[start, end)`
pub fn load_symbol(
    data_dir: impl AsRef<Path>,
    symbol: &Symbol,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<Candle>> {
    let path = cache_path(&data_dir, symbol);
    if !path.exists() {
        anyhow::bail!("Data file not found: {}", path.display());
    }

    let candles = load_csv(&path).context(format!("Failed to load data for {}", symbol))?;
    let original_len = candles.len();
    let candles = filter_candles_by_date(candles, start, end);

    info!(
        "Loaded {} candles for {} (filtered from {} total)",
        candles.len(),
        symbol,
        original_len
    );

    if candles.is_empty() {
        anyhow::bail!("No data for {} between {} and {}", symbol, start, end);
    }
    Ok(candles)
}

// =============================================================================
// Yahoo Data Fetcher
// =============================================================================

/// Downloads daily bars and writes them to the CSV cache
pub struct YahooDataFetcher {
    client: YahooClient,
    pub data_dir: PathBuf,
}

impl YahooDataFetcher {
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir).context("Failed to create data directory")?;
        let client = YahooClient::new().context("Failed to create Yahoo client")?;
        Ok(Self { client, data_dir })
    }

    /// Download `[start, end)` for `symbol` and overwrite its cache file
    pub async fn download(&self, symbol: &Symbol, start: NaiveDate, end: NaiveDate) -> Result<PathBuf> {
        let candles = self
            .client
            .get_daily_bars(symbol.as_str(), start, end)
            .await
            .with_context(|| format!("Failed to download {}", symbol))?;

        let path = cache_path(&self.data_dir, symbol);
        save_csv(&candles, &path)?;
        Ok(path)
    }
}

/// Cached symbols whose file is missing or does not cover the range
pub fn find_missing_data(
    data_dir: impl AsRef<Path>,
    symbols: &[Symbol],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<Symbol> {
    symbols
        .iter()
        .filter(|symbol| {
            let path = cache_path(&data_dir, symbol);
            if !path.exists() {
                return true;
            }
            match load_csv(&path) {
                Ok(candles) => !covers_range(&candles, start, end),
                Err(e) => {
                    warn!("Unreadable cache {}: {:#}", path.display(), e);
                    true
                }
            }
        })
        .cloned()
        .collect()
}

/// Ensure every symbol has cached data for the range, downloading as needed.
///
/// With `force`, every symbol is downloaded again. Returns the symbols that
/// could not be fetched together with the reason.
pub async fn ensure_data_available(
    data_dir: impl AsRef<Path>,
    symbols: &[Symbol],
    start: NaiveDate,
    end: NaiveDate,
    force: bool,
) -> Result<Vec<(Symbol, String)>> {
    let data_dir = data_dir.as_ref();
    let missing = if force {
        symbols.to_vec()
    } else {
        find_missing_data(data_dir, symbols, start, end)
    };

    if missing.is_empty() {
        info!("All data files present");
        return Ok(Vec::new());
    }

    info!("Fetching {} symbols from Yahoo Finance...", missing.len());

    let fetcher = YahooDataFetcher::new(data_dir)?;
    let mut failed = Vec::new();

    for symbol in &missing {
        info!("Fetching {}...", symbol);
        match fetcher.download(symbol, start, end).await {
            Ok(path) => info!("Saved {}", path.display()),
            Err(e) => {
                warn!("Failed to fetch {}: {:#}", symbol, e);
                failed.push((symbol.clone(), format!("{:#}", e)));
            }
        }
    }

    Ok(failed)
}

/// Synchronous wrapper for ensure_data_available
pub fn ensure_data_available_sync(
    data_dir: impl AsRef<Path>,
    symbols: &[Symbol],
    start: NaiveDate,
    end: NaiveDate,
    force: bool,
) -> Result<Vec<(Symbol, String)>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(ensure_data_available(data_dir, symbols, start, end, force))
}
