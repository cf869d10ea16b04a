//! Download command implementation

use anyhow::Result;
use elder_screen::data;
use tracing::info;

use super::{apply_universe_overrides, load_config};

pub fn run(
    config_path: String,
    tickers: Option<String>,
    start: Option<String>,
    end: Option<String>,
    force: bool,
) -> Result<()> {
    let mut config = load_config(&config_path)?;
    apply_universe_overrides(&mut config, tickers, start, end)?;
    config.validate()?;

    let symbols = config.universe.symbols();
    info!(
        "Downloading {} symbols ({} .. {})",
        symbols.len(),
        config.universe.start,
        config.universe.end
    );

    let failed = data::ensure_data_available_sync(
        &config.backtest.data_dir,
        &symbols,
        config.universe.start,
        config.universe.end,
        force,
    )?;

    println!("\n{}", "=".repeat(60));
    println!("DOWNLOAD SUMMARY");
    println!("{}", "=".repeat(60));
    println!("  Requested: {}", symbols.len());
    if failed.is_empty() {
        println!("  ✓ All data available in {}", config.backtest.data_dir);
    } else {
        println!("  ⚠ Could not fetch {} symbols:", failed.len());
        for (symbol, reason) in &failed {
            println!("    - {}: {}", symbol, reason);
        }
    }
    println!("{}", "=".repeat(60));

    Ok(())
}
