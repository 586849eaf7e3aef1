//! Application layer - scrape runs and the service facade
//!
//! - `scrape_orchestrator`: fetch, extract, normalize, persist for one source
//! - `record_normalizer`: raw tuples into typed records
//! - `diagnostics`: structured telemetry sink
//! - `price_scraping_service`: facade over the orchestrator and the store

pub mod diagnostics;
pub mod price_scraping_service;
pub mod record_normalizer;
pub mod scrape_orchestrator;

pub use diagnostics::{DiagnosticEvent, DiagnosticSink, MemoryDiagnostics, NoopDiagnostics, TracingDiagnostics};
pub use price_scraping_service::PriceScrapingService;
pub use record_normalizer::{NormalizedBatch, RecordNormalizer, Rejection};
pub use scrape_orchestrator::{ScrapeError, ScrapeOrchestrator};
