//! Infrastructure layer for configuration, logging, storage, fetching and parsing

pub mod browser;
pub mod config;
pub mod database_connection;
pub mod fetching;
pub mod http_client;
pub mod logging;
pub mod parsing;
pub mod price_record_repository;
pub mod retry;
pub mod text_normalizer;

pub use browser::BrowserFetcher;
pub use config::{AppConfig, ConfigError, RenderMode, SourceConfig};
pub use database_connection::DatabaseConnection;
pub use fetching::{CapturedResponse, FetchError, FetchRequest, FetchedPage, PageFetcher, RoutingFetcher};
pub use http_client::HttpFetcher;
pub use logging::{init_logging, log_system_info};
pub use parsing::{ExtractionChain, ParsingConfig, ParsingError, ParsingResult, RawEntry, RawPriceTuple};
pub use price_record_repository::SqlitePriceRecordStore;
pub use retry::RetryPolicy;
pub use text_normalizer::NormalizationError;
