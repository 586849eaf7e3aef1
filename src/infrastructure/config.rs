//! Configuration infrastructure
//!
//! Configuration is layered with the `config` crate:
//! 1. Built-in defaults (`AppConfig::default()`)
//! 2. An optional TOML/JSON file
//! 3. `EMAS__*` environment variables (`EMAS__FETCH__TIMEOUT_SECONDS=10`)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::infrastructure::parsing::ParsingConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub fetch: FetchConfig,
    pub browser: BrowserConfig,
    pub scraping: ScrapingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection string, e.g. `sqlite://data/emas_prices.db`
    pub url: String,
    pub max_connections: u32,
}

/// HTTP fetch settings shared by every static source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_seconds: u64,
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
    /// Attempts per fetch, including the first one
    pub max_retries: u32,
    /// Linear backoff unit: attempt N waits `N * backoff_base_ms`
    pub backoff_base_ms: u64,
    pub max_requests_per_second: u32,
    pub follow_redirects: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Fixed wait after navigation so client-side rendering and API calls finish
    pub settle_delay_ms: u64,
    pub navigation_timeout_seconds: u64,
    pub executable: Option<PathBuf>,
    pub headless: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Plain HTTP GET
    Static,
    /// Headless browser navigation with XHR capture
    Browser,
}

/// One scrapeable vendor page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub url: String,
    pub render: RenderMode,
    /// Vendor label applied to tuples that carry no vendor of their own
    #[serde(default)]
    pub default_vendor: Option<String>,
    /// Origin whose XHR/fetch response bodies are captured in browser mode
    #[serde(default)]
    pub api_origin: Option<String>,
    #[serde(default)]
    pub selectors: ParsingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    pub sources: Vec<SourceConfig>,
    pub default_source: String,
    /// Orchestration-level attempts of fetch + extract
    pub run_attempts: u32,
    pub run_backoff_base_ms: u64,
    /// Populate `ScrapeResult.data` from the store after persisting
    pub read_back: bool,
    pub retention_days: u32,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,
    pub json_format: bool,
    pub console_output: bool,
    pub file_output: bool,
    /// Directory for rolling log files; relative paths resolve against the working directory
    pub log_dir: PathBuf,
    pub file_prefix: String,
    /// Module-specific log level filters (e.g., "sqlx": "warn")
    pub module_filters: HashMap<String, String>,
}

pub mod defaults {
    pub const DATABASE_URL: &str = "sqlite://data/emas_prices.db";
    pub const DATABASE_MAX_CONNECTIONS: u32 = 10;

    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;
    pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    pub const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
    pub const ACCEPT_LANGUAGE: &str = "id-ID,id;q=0.9,en-US;q=0.8,en;q=0.7";
    pub const MAX_RETRIES: u32 = 3;
    pub const BACKOFF_BASE_MS: u64 = 2000;
    pub const MAX_REQUESTS_PER_SECOND: u32 = 2;

    pub const SETTLE_DELAY_MS: u64 = 8000;
    pub const NAVIGATION_TIMEOUT_SECONDS: u64 = 60;

    pub const RUN_ATTEMPTS: u32 = 2;
    pub const RUN_BACKOFF_BASE_MS: u64 = 2000;
    pub const RETENTION_DAYS: u32 = 365;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_DIR: &str = "logs";
    pub const LOG_FILE_PREFIX: &str = "emas-scraper.log";

    pub const ENV_PREFIX: &str = "EMAS";
    pub const ENV_SEPARATOR: &str = "__";

    pub const LOGAMMULIA_URL: &str = "https://www.logammulia.com/id/harga-emas-hari-ini";
    pub const GALERI24_URL: &str = "https://galeri24.co.id/harga-emas";
    pub const GALERI24_API_ORIGIN: &str = "https://api.galeri24.co.id";
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            fetch: FetchConfig::default(),
            browser: BrowserConfig::default(),
            scraping: ScrapingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: defaults::DATABASE_URL.to_string(),
            max_connections: defaults::DATABASE_MAX_CONNECTIONS,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            user_agent: defaults::USER_AGENT.to_string(),
            accept: defaults::ACCEPT.to_string(),
            accept_language: defaults::ACCEPT_LANGUAGE.to_string(),
            max_retries: defaults::MAX_RETRIES,
            backoff_base_ms: defaults::BACKOFF_BASE_MS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            follow_redirects: true,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: defaults::SETTLE_DELAY_MS,
            navigation_timeout_seconds: defaults::NAVIGATION_TIMEOUT_SECONDS,
            executable: None,
            headless: true,
        }
    }
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            sources: vec![
                SourceConfig {
                    id: "logammulia".to_string(),
                    url: defaults::LOGAMMULIA_URL.to_string(),
                    render: RenderMode::Static,
                    default_vendor: Some("ANTAM".to_string()),
                    api_origin: None,
                    selectors: ParsingConfig::default(),
                },
                SourceConfig {
                    id: "galeri24".to_string(),
                    url: defaults::GALERI24_URL.to_string(),
                    render: RenderMode::Browser,
                    default_vendor: None,
                    api_origin: Some(defaults::GALERI24_API_ORIGIN.to_string()),
                    selectors: ParsingConfig::default(),
                },
            ],
            default_source: "logammulia".to_string(),
            run_attempts: defaults::RUN_ATTEMPTS,
            run_backoff_base_ms: defaults::RUN_BACKOFF_BASE_MS,
            read_back: true,
            retention_days: defaults::RETENTION_DAYS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut module_filters = HashMap::new();
        module_filters.insert("sqlx".to_string(), "warn".to_string());
        module_filters.insert("reqwest".to_string(), "info".to_string());

        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: PathBuf::from(defaults::LOG_DIR),
            file_prefix: defaults::LOG_FILE_PREFIX.to_string(),
            module_filters,
        }
    }
}

impl FetchConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub const fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

impl BrowserConfig {
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub const fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_seconds)
    }
}

impl ScrapingConfig {
    pub fn source(&self, id: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.id.eq_ignore_ascii_case(id))
    }

    pub const fn run_backoff_base(&self) -> Duration {
        Duration::from_millis(self.run_backoff_base_ms)
    }
}

impl AppConfig {
    /// Load defaults, then `path` (or the discovered config file), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?);

        match path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                builder = builder.add_source(config::File::from(path));
            }
            None => {
                for candidate in Self::candidate_files() {
                    debug!("Looking for optional configuration at {}", candidate.display());
                    builder = builder.add_source(config::File::from(candidate).required(false));
                }
            }
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(defaults::ENV_PREFIX)
                    .separator(defaults::ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Working-directory `config/emas_scraper.*` first, then the user config directory.
    fn candidate_files() -> Vec<PathBuf> {
        let mut files = vec![PathBuf::from("config/emas_scraper")];
        if let Some(dir) = dirs::config_dir() {
            files.push(dir.join("emas-scraper").join("config"));
        }
        files
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.timeout_seconds == 0 {
            return Err(ConfigError::invalid("fetch.timeout_seconds must be greater than 0"));
        }
        if self.fetch.max_retries == 0 {
            return Err(ConfigError::invalid("fetch.max_retries must be at least 1"));
        }
        if self.fetch.max_requests_per_second == 0 {
            return Err(ConfigError::invalid(
                "fetch.max_requests_per_second must be greater than 0",
            ));
        }
        if self.scraping.run_attempts == 0 {
            return Err(ConfigError::invalid("scraping.run_attempts must be at least 1"));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::invalid("database.max_connections must be greater than 0"));
        }

        let mut seen: Vec<String> = Vec::with_capacity(self.scraping.sources.len());
        for source in &self.scraping.sources {
            let id = source.id.to_ascii_lowercase();
            if id.is_empty() {
                return Err(ConfigError::invalid("source id must not be empty"));
            }
            if seen.contains(&id) {
                return Err(ConfigError::invalid(format!("duplicate source id '{}'", source.id)));
            }
            let parsed = url::Url::parse(&source.url).map_err(|e| {
                ConfigError::invalid(format!("source '{}' has invalid url: {e}", source.id))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::invalid(format!(
                    "source '{}' must use http or https",
                    source.id
                )));
            }
            seen.push(id);
        }

        if self.scraping.source(&self.scraping.default_source).is_none() {
            return Err(ConfigError::invalid(format!(
                "default source '{}' is not configured",
                self.scraping.default_source
            )));
        }

        Ok(())
    }
}
