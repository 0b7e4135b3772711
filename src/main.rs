mod analysis;
mod cache;
mod coingecko;
mod comfy_table;
mod indicators;
mod market_data;
mod normalize;
mod scorer;
mod storage_utils;
mod tui;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

use crate::coingecko::CoinGeckoClient;
use crate::market_data::MarketDataService;

/// Ranks the top 250 tokens by market cap on a blended strength score.
#[derive(Parser, Debug)]
#[command(name = "altcoin-screener", version, about)]
struct Cli {
    /// Open the interactive terminal dashboard instead of printing a table
    #[arg(long)]
    tui: bool,

    /// Fetch price histories for the leading tokens and show their 14-day RSI
    #[arg(long)]
    rsi: bool,

    /// Number of rows to print
    #[arg(long)]
    rows: Option<usize>,

    /// Config file (defaults to storage/config.json next to the binary)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log at info level
    #[arg(short, long)]
    verbose: bool,

    /// Log at debug level
    #[arg(long)]
    debug: bool,
}

fn init_logging(cli: &Cli) {
    let default = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.tui {
        // Anything written to stderr would tear the alternate screen.
        "off"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let mut config = storage_utils::load_config(cli.config.as_deref()).await?;
    if let Some(rows) = cli.rows {
        config.display.rows = rows;
    }
    if cli.rsi {
        config.rsi.enabled = true;
    }
    tracing::debug!(?config, "configuration loaded");

    let client = CoinGeckoClient::new(&config.api).context("Failed to create HTTP client")?;
    let mut service = MarketDataService::new(client);

    let dashboard = analysis::run_analysis_pipeline(&mut service, &config.rsi).await;

    if cli.tui {
        tui::run_tui(&mut service, &config, dashboard).await
    } else {
        comfy_table::run(&dashboard, &config.display);
        Ok(())
    }
}
