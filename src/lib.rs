//! emas-scraper - precious-metal price scraping for Indonesian vendors
//!
//! Fetches vendor price pages (static HTML or headless-browser rendered),
//! extracts raw price rows through a fallback chain of strategies,
//! normalizes rupiah amounts, weights, vendors and categories, and upserts
//! the result into SQLite keyed by `(pricing_date, product_type, vendor_source)`.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{PriceScrapingService, ScrapeError, ScrapeOrchestrator};
pub use domain::{PriceRecord, ScrapeResult, VendorSource};
pub use infrastructure::AppConfig;
