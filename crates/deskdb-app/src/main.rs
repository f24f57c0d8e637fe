//! deskdb - data access service for the service desk
//!
//! Opens the SQLite store through the pooled data-access layer, probes it and
//! reports the status surface as JSON. With `--serve` it keeps the pool and its
//! maintenance tasks running until interrupted.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use deskdb_app::{AppConfig, logging};
use deskdb_driver_sqlite::SqliteConnectionFactory;
use deskdb_pool::{DataAccess, QueryOptions};

#[derive(Debug, Parser)]
#[command(name = "deskdb", version, about = "Pooled data access for the service desk")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, env = "DESKDB_CONFIG")]
    config: Option<PathBuf>,

    /// Override the database path from the config
    #[arg(long)]
    database: Option<String>,

    /// Keep running until Ctrl-C, logging a status report periodically
    #[arg(long)]
    serve: bool,

    /// Seconds between status reports in serve mode
    #[arg(long, default_value_t = 60)]
    report_interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::resolve(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.storage.path = database;
    }

    if let Err(e) = logging::init(config.logging.clone()) {
        // Logging isn't up yet.
        eprintln!("FATAL: Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        database = %config.storage.path,
        min_size = config.data_access.pool.min_size(),
        max_size = config.data_access.pool.max_size(),
        "Starting deskdb"
    );

    let factory = SqliteConnectionFactory::new(config.storage.clone());
    let data = DataAccess::connect(config.data_access.clone(), factory)
        .await
        .context("opening data access layer")?;

    match data.query("SELECT 1", &[], QueryOptions::default()).await {
        Ok(_) => tracing::info!("Storage probe succeeded"),
        Err(e) => tracing::error!(error = %e, status = e.http_status(), "Storage probe failed"),
    }

    if cli.serve {
        let mut ticker = tokio::time::interval(Duration::from_secs(cli.report_interval.max(1)));
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = data.stats();
                    tracing::info!(
                        health = ?report.health.status,
                        active = report.pool.active(),
                        idle = report.pool.idle(),
                        waiting = report.pool.waiting(),
                        total_queries = report.metrics.total_queries,
                        "Status report"
                    );
                }
                signal = tokio::signal::ctrl_c() => {
                    signal.context("listening for Ctrl-C")?;
                    tracing::info!("Interrupt received, shutting down");
                    break;
                }
            }
        }
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&data.stats()).context("serializing status report")?
    );

    data.close().await;
    tracing::info!("deskdb stopped");
    Ok(())
}
