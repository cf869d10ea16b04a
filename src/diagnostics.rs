//! CSV diagnostic logs
//!
//! One file per instrument and log kind, truncated when the run starts and
//! appended row by row. Each row is flushed as it is written so a crashed
//! run still leaves a readable log.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, File};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::sizing::SizingDecision;
use crate::{Order, Position, Symbol};

/// Append-only CSV writer for one record type
pub struct CsvLog<T: Serialize> {
    path: PathBuf,
    writer: csv::Writer<File>,
    _record: PhantomData<T>,
}

impl<T: Serialize> CsvLog<T> {
    /// Create (or truncate) the file; the header is written with the first row
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        Ok(Self {
            path,
            writer,
            _record: PhantomData,
        })
    }

    pub fn write(&mut self, record: &T) -> Result<()> {
        self.writer
            .serialize(record)
            .with_context(|| format!("Failed to write row to {}", self.path.display()))?;
        self.writer
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        Ok(())
    }
}

/// One sizing computation
#[derive(Debug, Clone, Serialize)]
pub struct SizingRecord {
    pub date: String,
    pub symbol: String,
    pub method: &'static str,
    pub equity: f64,
    pub cash: f64,
    pub price: f64,
    pub atr: f64,
    pub atr_used: f64,
    pub risk_amount: f64,
    pub raw_size: f64,
    pub cash_cap: Option<u64>,
    pub leverage_cap: Option<u64>,
    pub size: u64,
}

impl SizingRecord {
    pub fn new(datetime: DateTime<Utc>, symbol: &Symbol, d: &SizingDecision) -> Self {
        Self {
            date: datetime.format("%Y-%m-%d").to_string(),
            symbol: symbol.to_string(),
            method: d.method,
            equity: d.equity,
            cash: d.cash,
            price: d.price,
            atr: d.atr,
            atr_used: d.atr_used,
            risk_amount: d.risk_amount,
            raw_size: d.raw_size,
            cash_cap: d.cash_cap,
            leverage_cap: d.leverage_cap,
            size: d.size,
        }
    }
}

/// One order status change
#[derive(Debug, Clone, Serialize)]
pub struct OrderRecord {
    pub date: String,
    pub symbol: String,
    pub order_id: u64,
    pub side: String,
    pub order_type: String,
    pub role: String,
    pub status: String,
    pub size: u64,
    pub price: Option<f64>,
    pub exec_price: Option<f64>,
    pub exec_size: Option<u64>,
    pub commission: Option<f64>,
    pub cash: f64,
    pub position: i64,
}

impl OrderRecord {
    pub fn new(order: &Order, cash: f64, position: Position) -> Self {
        Self {
            date: order.updated_time.format("%Y-%m-%d").to_string(),
            symbol: order.symbol.to_string(),
            order_id: order.id,
            side: order.side.to_string(),
            order_type: format!("{:?}", order.order_type),
            role: format!("{:?}", order.role),
            status: order.status.to_string(),
            size: order.size,
            price: order.price,
            exec_price: order.executed.map(|e| e.price),
            exec_size: order.executed.map(|e| e.size),
            commission: order.executed.map(|e| e.commission),
            cash,
            position: position.size,
        }
    }
}

/// Per-instrument pair of diagnostic logs; either may be disabled
pub struct Diagnostics {
    sizing: Option<CsvLog<SizingRecord>>,
    orders: Option<CsvLog<OrderRecord>>,
}

impl Diagnostics {
    /// Open `{dir}/{SYMBOL}_sizing.csv` and `{dir}/{SYMBOL}_orders.csv`
    pub fn create(dir: impl AsRef<Path>, symbol: &Symbol, log_sizing: bool, log_orders: bool) -> Result<Self> {
        let dir = dir.as_ref();
        let sizing = if log_sizing {
            Some(CsvLog::create(dir.join(format!("{}_sizing.csv", symbol)))?)
        } else {
            None
        };
        let orders = if log_orders {
            Some(CsvLog::create(dir.join(format!("{}_orders.csv", symbol)))?)
        } else {
            None
        };
        Ok(Self { sizing, orders })
    }

    /// No-op logs
    pub fn disabled() -> Self {
        Self {
            sizing: None,
            orders: None,
        }
    }

    pub fn log_sizing(&mut self, record: &SizingRecord) -> Result<()> {
        match self.sizing.as_mut() {
            Some(log) => log.write(record),
            None => Ok(()),
        }
    }

    pub fn log_order(&mut self, record: &OrderRecord) -> Result<()> {
        match self.orders.as_mut() {
            Some(log) => log.write(record),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OrderRole, OrderStatus, OrderType, Side};

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("elder_diag_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_order_log_header_and_rows() {
        let dir = temp_dir("orders");
        let symbol = Symbol::new("SBER.ME");
        let now = Utc::now();
        let order = Order {
            id: 1,
            symbol: symbol.clone(),
            side: Side::Buy,
            order_type: OrderType::Market,
            role: OrderRole::Entry,
            status: OrderStatus::Margin,
            size: 10,
            price: None,
            executed: None,
            created_time: now,
            updated_time: now,
        };

        let mut diag = Diagnostics::create(&dir, &symbol, false, true).unwrap();
        diag.log_order(&OrderRecord::new(&order, 1000.0, Position::default()))
            .unwrap();
        diag.log_order(&OrderRecord::new(&order, 1000.0, Position::default()))
            .unwrap();

        let text = fs::read_to_string(dir.join("SBER.ME_orders.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("date,symbol,order_id,side"));
        assert!(lines[1].contains("Margin"));
        assert!(!dir.join("SBER.ME_sizing.csv").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_create_truncates_previous_run() {
        let dir = temp_dir("truncate");
        let path = dir.join("log.csv");

        let mut log: CsvLog<SizingRecord> = CsvLog::create(&path).unwrap();
        let decision = SizingDecision {
            method: "risk_fraction",
            equity: 100_000.0,
            cash: 100_000.0,
            price: 50.0,
            atr: 2.0,
            atr_used: 2.0,
            risk_amount: 1000.0,
            raw_size: 500.0,
            cash_cap: None,
            leverage_cap: None,
            size: 500,
        };
        let record = SizingRecord::new(Utc::now(), &Symbol::new("GAZP.ME"), &decision);
        log.write(&record).unwrap();
        log.write(&record).unwrap();
        drop(log);

        let mut log: CsvLog<SizingRecord> = CsvLog::create(&path).unwrap();
        log.write(&record).unwrap();
        drop(log);

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);

        let _ = fs::remove_dir_all(&dir);
    }
}
