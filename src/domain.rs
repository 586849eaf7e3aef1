//! Domain module - price records and the vocabulary around them
//!
//! - `category` / `vendor`: closed enumerations recognized by the pipeline
//! - `price_record`: stored and pending records, filters, stats
//! - `scrape_result`: reporting contract of one run
//! - `repositories`: storage trait consumed by the application layer

pub mod category;
pub mod price_record;
pub mod repositories;
pub mod scrape_result;
pub mod vendor;

pub use category::ProductCategory;
pub use price_record::{BatchOutcome, NewPriceRecord, PriceOrigin, PriceRecord, PriceRecordFilter, PriceStats};
pub use repositories::{PriceRecordStore, StoreError, StoreResult};
pub use scrape_result::{ScrapeResult, ScrapeStage};
pub use vendor::VendorSource;
