//! emas-scraper binary
//!
//! Usage: `emas-scraper [SOURCE] [--config PATH]`
//!
//! Runs one scrape of SOURCE (the configured default when omitted), prints
//! the result as JSON and exits non-zero when the run failed.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use emas_scraper::infrastructure::{
    AppConfig, DatabaseConnection, SqlitePriceRecordStore, init_logging, log_system_info,
};
use emas_scraper::PriceScrapingService;

/// Scrape one vendor price page into the local price database
#[derive(Parser, Debug)]
#[command(name = "emas-scraper", version)]
struct Args {
    /// Configured source id, e.g. `logammulia` or `galeri24`
    source: Option<String>,

    /// Configuration file instead of the discovered `config/emas_scraper.*`
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

async fn run(args: Args) -> Result<bool> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e).context("failed to read .env");
        }
    }

    let config = AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    init_logging(&config.logging)?;
    log_system_info();

    let db = DatabaseConnection::connect(&config.database)
        .await
        .context("failed to open the price database")?;
    db.migrate().await.context("failed to migrate the price database")?;

    let store = Arc::new(SqlitePriceRecordStore::new(db.pool().clone()));
    let service = PriceScrapingService::from_config(&config, store)?;

    let shutdown = service.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling scrape");
            shutdown.cancel();
        }
    });

    let (result, failure) = service.trigger_scrape(args.source.as_deref()).await;
    if let Some(failure) = &failure {
        error!("Scrape failed: {}", failure);
    }
    println!("{}", serde_json::to_string_pretty(&result)?);

    db.close().await;
    info!("Done");
    Ok(result.success)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("emas-scraper: {e:#}");
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_and_config_are_optional() {
        let args = Args::try_parse_from(["emas-scraper"]).unwrap();
        assert!(args.source.is_none());
        assert!(args.config.is_none());
    }

    #[test]
    fn test_source_with_short_config_flag() {
        let args = Args::try_parse_from(["emas-scraper", "galeri24", "-c", "prod.toml"]).unwrap();
        assert_eq!(args.source.as_deref(), Some("galeri24"));
        assert_eq!(args.config, Some(PathBuf::from("prod.toml")));
    }

    #[test]
    fn test_rejects_unknown_flag_and_extra_source() {
        assert!(Args::try_parse_from(["emas-scraper", "--verbose"]).is_err());
        assert!(Args::try_parse_from(["emas-scraper", "antam", "ubs"]).is_err());
        assert!(Args::try_parse_from(["emas-scraper", "--config"]).is_err());
    }
}
