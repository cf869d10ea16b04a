//! Results table
//!
//! One row per configured instrument with profit % and Sharpe ratio,
//! averages per category and overall, printed to stdout and written to
//! `summary.csv`.

use anyhow::{Context, Result};
use itertools::Itertools;
use serde::Serialize;
use statrs::statistics::Statistics;
use std::path::Path;

use crate::runner::InstrumentRun;

/// Category label for uncategorised tickers
pub const UNCATEGORISED: &str = "-";

/// One instrument's line in the table
#[derive(Debug, Clone, Serialize)]
pub struct ResultRow {
    pub category: String,
    pub ticker: String,
    pub profit_pct: Option<f64>,
    pub sharpe: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub trades: Option<usize>,
    pub final_value: Option<f64>,
    pub error: Option<String>,
}

impl ResultRow {
    fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Averages over a group of rows; failed runs are excluded and missing
/// Sharpe values are skipped
#[derive(Debug, Clone, PartialEq)]
pub struct GroupAverage {
    pub name: String,
    pub instruments: usize,
    pub failed: usize,
    pub avg_profit_pct: Option<f64>,
    pub avg_sharpe: Option<f64>,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().mean())
}

fn average(name: &str, rows: &[&ResultRow]) -> GroupAverage {
    GroupAverage {
        name: name.to_string(),
        instruments: rows.len(),
        failed: rows.iter().filter(|r| !r.is_ok()).count(),
        avg_profit_pct: mean(rows.iter().filter_map(|r| r.profit_pct)),
        avg_sharpe: mean(rows.iter().filter_map(|r| r.sharpe)),
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v))
}

/// Results for a whole batch
#[derive(Debug, Clone)]
pub struct Report {
    pub rows: Vec<ResultRow>,
}

impl Report {
    pub fn new(runs: &[InstrumentRun]) -> Self {
        let rows = runs
            .iter()
            .map(|run| {
                let category = run
                    .instrument
                    .category
                    .clone()
                    .unwrap_or_else(|| UNCATEGORISED.to_string());
                let ticker = run.instrument.symbol.to_string();
                match &run.outcome {
                    Ok(summary) => ResultRow {
                        category,
                        ticker,
                        profit_pct: Some(summary.metrics.profit_pct),
                        sharpe: summary.metrics.sharpe_ratio,
                        max_drawdown: Some(summary.metrics.max_drawdown),
                        trades: Some(summary.metrics.total_trades),
                        final_value: Some(summary.metrics.final_value),
                        error: None,
                    },
                    Err(e) => ResultRow {
                        category,
                        ticker,
                        profit_pct: None,
                        sharpe: None,
                        max_drawdown: None,
                        trades: None,
                        final_value: None,
                        error: Some(e.clone()),
                    },
                }
            })
            .collect();
        Report { rows }
    }

    /// Per-category averages, in category name order
    pub fn category_averages(&self) -> Vec<GroupAverage> {
        self.rows
            .iter()
            .into_group_map_by(|r| r.category.clone())
            .into_iter()
            .sorted_by(|a, b| a.0.cmp(&b.0))
            .map(|(name, rows)| average(&name, &rows))
            .collect()
    }

    pub fn overall(&self) -> GroupAverage {
        let rows: Vec<&ResultRow> = self.rows.iter().collect();
        average("ALL", &rows)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ResultRow> {
        self.rows.iter().filter(|r| !r.is_ok())
    }

    pub fn print(&self) {
        let has_categories = self.rows.iter().any(|r| r.category != UNCATEGORISED);

        println!("\n{}", "=".repeat(72));
        println!("BACKTEST RESULTS");
        println!("{}", "=".repeat(72));
        println!(
            "{:<12} {:<12} {:>12} {:>10} {:>10} {:>8}",
            "Category", "Ticker", "Profit (%)", "Sharpe", "MaxDD (%)", "Trades"
        );
        println!("{}", "-".repeat(72));

        for row in &self.rows {
            match &row.error {
                None => println!(
                    "{:<12} {:<12} {:>12} {:>10} {:>10} {:>8}",
                    row.category,
                    row.ticker,
                    fmt_opt(row.profit_pct),
                    fmt_opt(row.sharpe),
                    fmt_opt(row.max_drawdown),
                    row.trades.unwrap_or(0)
                ),
                Some(_) => println!("{:<12} {:<12} {:>12}", row.category, row.ticker, "FAILED"),
            }
        }

        if has_categories {
            println!("{}", "-".repeat(72));
            for avg in self.category_averages() {
                println!(
                    "{:<25} {:>12} {:>10}   ({} instruments)",
                    format!("Average {}", avg.name),
                    fmt_opt(avg.avg_profit_pct),
                    fmt_opt(avg.avg_sharpe),
                    avg.instruments - avg.failed
                );
            }
        }

        let overall = self.overall();
        println!("{}", "=".repeat(72));
        println!("Average Sharpe:      {}", fmt_opt(overall.avg_sharpe));
        println!("Average Profit (%):  {}", fmt_opt(overall.avg_profit_pct));

        let failures: Vec<&ResultRow> = self.failures().collect();
        if !failures.is_empty() {
            println!("{}", "-".repeat(72));
            println!("Failed ({}):", failures.len());
            for row in failures {
                println!("  {}: {}", row.ticker, row.error.as_deref().unwrap_or_default());
            }
        }
        println!("{}", "=".repeat(72));
    }

    /// Write all rows to a CSV file
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create results directory")?;
        }
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Instrument;
    use crate::runner::RunSummary;
    use crate::{PerformanceMetrics, Position, Symbol};

    fn run(category: Option<&str>, ticker: &str, profit: f64, sharpe: Option<f64>) -> InstrumentRun {
        InstrumentRun {
            instrument: Instrument {
                category: category.map(String::from),
                symbol: Symbol::new(ticker),
            },
            outcome: Ok(RunSummary {
                metrics: PerformanceMetrics {
                    profit_pct: profit,
                    sharpe_ratio: sharpe,
                    ..Default::default()
                },
                final_position: Position::default(),
                bars: 100,
            }),
        }
    }

    #[test]
    fn test_averages_skip_missing_sharpe_and_failures() {
        let runs = vec![
            run(Some("banks"), "SBER.ME", 10.0, Some(0.1)),
            run(Some("banks"), "VTBR.ME", -4.0, None),
            run(Some("energy"), "ROSN.ME", 6.0, Some(0.3)),
            InstrumentRun {
                instrument: Instrument {
                    category: Some("energy".into()),
                    symbol: Symbol::new("BAD.ME"),
                },
                outcome: Err("no data".into()),
            },
        ];
        let report = Report::new(&runs);

        let cats = report.category_averages();
        assert_eq!(cats.len(), 2);
        assert_eq!(cats[0].name, "banks");
        assert_eq!(cats[0].avg_profit_pct, Some(3.0));
        assert_eq!(cats[0].avg_sharpe, Some(0.1));
        assert_eq!(cats[1].failed, 1);
        assert_eq!(cats[1].avg_profit_pct, Some(6.0));

        let all = report.overall();
        assert_eq!(all.instruments, 4);
        assert!((all.avg_profit_pct.unwrap() - 4.0).abs() < 1e-9);
        assert!((all.avg_sharpe.unwrap() - 0.2).abs() < 1e-9);
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn test_empty_group_has_no_average() {
        let runs = vec![InstrumentRun {
            instrument: Instrument {
                category: None,
                symbol: Symbol::new("BAD.ME"),
            },
            outcome: Err("no data".into()),
        }];
        let overall = Report::new(&runs).overall();
        assert_eq!(overall.avg_profit_pct, None);
        assert_eq!(overall.avg_sharpe, None);
        assert_eq!(overall.failed, 1);
    }

    #[test]
    fn test_write_csv() {
        let dir = std::env::temp_dir().join(format!("elder_report_{}", std::process::id()));
        let path = dir.join("summary.csv");
        let report = Report::new(&[run(None, "GAZP.ME", 1.5, None)]);

        report.write_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("category,ticker,profit_pct,sharpe"));
        assert!(text.contains("GAZP.ME,1.5,"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
