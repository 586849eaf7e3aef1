//! Logging system configuration and initialization
//!
//! - Console output with WIB (Western Indonesia Time, UTC+7) timestamps
//! - Optional daily rolling log files written through a non-blocking appender
//! - Optional structured JSON output
//! - Noisy dependency targets suppressed unless the level is `trace`
//!
//! `RUST_LOG` overrides the configured filter entirely.

use std::sync::Mutex;

use anyhow::{Result, anyhow};
use chrono::{FixedOffset, Utc};
use lazy_static::lazy_static;
use tracing::info;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<WorkerGuard>> = Mutex::new(Vec::new());
}

type FilteredRegistry = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

const WIB_OFFSET_SECONDS: i32 = 7 * 3600;

/// Targets that flood the output below `trace`
const QUIET_TARGETS: &[(&str, &str)] = &[
    ("sqlx::query", "warn"),
    ("sqlx::migrate", "info"),
    ("sqlx::sqlite", "warn"),
    ("reqwest", "info"),
    ("hyper", "warn"),
    ("hyper_util", "warn"),
    ("h2", "warn"),
    ("html5ever", "warn"),
    ("selectors", "warn"),
    ("chromiumoxide", "warn"),
    ("tungstenite", "warn"),
];

/// Timestamps in Western Indonesia Time, where vendors publish prices
struct WibTimeFormatter;

impl FormatTime for WibTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Utc::now();
        match FixedOffset::east_opt(WIB_OFFSET_SECONDS) {
            Some(wib) => write!(w, "{}", now.with_timezone(&wib).format("%Y-%m-%d %H:%M:%S%.3f %:z")),
            None => write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S%.3f UTC")),
        }
    }
}

/// Filter built from the configured level plus per-module overrides.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| anyhow!("Invalid log level {:?}: {}", config.level, e))?;

    if !config.level.to_lowercase().contains("trace") {
        for (target, level) in QUIET_TARGETS {
            filter = filter.add_directive(format!("{target}={level}").parse()?);
        }
        filter = filter.add_directive(format!("emas_scraper={}", config.level).parse()?);
    }

    let mut overrides: Vec<_> = config.module_filters.iter().collect();
    overrides.sort();
    for (module, level) in overrides {
        let directive = format!("{module}={level}")
            .parse()
            .map_err(|e| anyhow!("Invalid module filter {}={}: {}", module, level, e))?;
        filter = filter.add_directive(directive);
    }

    Ok(filter)
}

fn console_layer(config: &LoggingConfig) -> BoxedLayer {
    if config.json_format {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_timer(WibTimeFormatter)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_timer(WibTimeFormatter)
            .with_target(false)
            .boxed()
    }
}

fn file_layer(config: &LoggingConfig) -> Result<BoxedLayer> {
    std::fs::create_dir_all(&config.log_dir)
        .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", config.log_dir, e))?;

    let appender = rolling::daily(&config.log_dir, &config.file_prefix);
    let (writer, guard) = non_blocking(appender);
    LOG_GUARDS
        .lock()
        .map_err(|_| anyhow!("Log guard registry poisoned"))?
        .push(guard);

    let layer = if config.json_format {
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_timer(WibTimeFormatter)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(writer)
            .with_timer(WibTimeFormatter)
            .with_target(true)
            .with_ansi(false)
            .boxed()
    };
    Ok(layer)
}

/// Install the global subscriber. Fails when no output is enabled or a
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    if !config.console_output && !config.file_output {
        return Err(anyhow!("No logging output configured"));
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(config)?,
    };

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if config.console_output {
        layers.push(console_layer(config));
    }
    if config.file_output {
        layers.push(file_layer(config)?);
    }

    Registry::default()
        .with(filter)
        .with(layers)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    if config.file_output {
        info!("Log files: {:?}/{}.<date>", config.log_dir, config.file_prefix);
    }
    Ok(())
}

/// Log build and host information once at startup
pub fn log_system_info() {
    info!("=== emas-scraper {} ===", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {} ({})", std::env::consts::OS, std::env::consts::ARCH);
    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.console_output);
        assert!(!config.file_output);
    }

    #[test]
    fn test_filter_includes_quiet_targets() {
        let filter = build_filter(&LoggingConfig::default()).unwrap().to_string();
        assert!(filter.contains("sqlx::query=warn"));
        assert!(filter.contains("emas_scraper=info"));
    }

    #[test]
    fn test_trace_level_keeps_dependencies() {
        let config = LoggingConfig {
            level: "trace".to_string(),
            ..LoggingConfig::default()
        };
        let filter = build_filter(&config).unwrap().to_string();
        assert!(!filter.contains("sqlx::query"));
    }

    #[test]
    fn test_module_filters_applied() {
        let config = LoggingConfig {
            module_filters: HashMap::from([("emas_scraper::infrastructure::http_client".to_string(), "debug".to_string())]),
            ..LoggingConfig::default()
        };
        let filter = build_filter(&config).unwrap().to_string();
        assert!(filter.contains("emas_scraper::infrastructure::http_client=debug"));
    }

    #[test]
    fn test_invalid_module_filter_rejected() {
        let config = LoggingConfig {
            module_filters: HashMap::from([("sqlx".to_string(), "verbose".to_string())]),
            ..LoggingConfig::default()
        };
        assert!(build_filter(&config).is_err());
    }

    #[test]
    fn test_no_output_is_an_error() {
        let config = LoggingConfig {
            console_output: false,
            file_output: false,
            ..LoggingConfig::default()
        };
        assert!(init_logging(&config).is_err());
    }
}
