mod config;
mod extractor;
mod models;
mod pipeline;
mod storage;
mod transform;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;
use crate::pipeline::Pipeline;
use crate::storage::Warehouse;

#[derive(Parser)]
#[command(name = "vantage-etl", about = "Daily stock price ETL into a DuckDB warehouse", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Run one full extract, merge and load pass for the configured symbols
    Run,

    /// Show warehouse statistics
    Stats,

    /// List symbols currently present in the warehouse
    Symbols,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "vantage_etl=info,warn",
        1 => "vantage_etl=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Run => {
            let _t = utils::Timer::start("Daily ETL run");
            let stats = Pipeline::new(config).run().await?;
            info!(
                "Done: {} symbols, {} records merged, {} rows loaded",
                stats.symbols_processed, stats.records_merged, stats.rows_loaded
            );
        }

        Command::Stats => {
            let warehouse = Warehouse::open(&config.warehouse.db_path)?;
            let rows = warehouse.row_count()?;
            let symbols = warehouse.list_symbols()?;
            let (min, max) = warehouse.date_range()?;
            println!("─────────────────────────────────");
            println!("  vantage-etl — Warehouse Stats");
            println!("─────────────────────────────────");
            println!("  Symbols : {}", symbols.len());
            println!("  Rows    : {}", utils::fmt_count(rows));
            println!("  From    : {}", min.map(|d| d.to_string()).unwrap_or("—".into()));
            println!("  To      : {}", max.map(|d| d.to_string()).unwrap_or("—".into()));
            println!("─────────────────────────────────");
        }

        Command::Symbols => {
            let warehouse = Warehouse::open(&config.warehouse.db_path)?;
            let syms = warehouse.list_symbols()?;
            if syms.is_empty() {
                println!("No symbols — run `vantage-etl run` first.");
            } else {
                println!("{} symbols:", syms.len());
                for s in &syms {
                    println!("  {}", s);
                }
            }
        }
    }

    Ok(())
}
