//! Repository interfaces for price records
//!
//! The scrape pipeline only needs the store through this trait, so the SQLite
//! implementation in `infrastructure` can be swapped in tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::price_record::{
    BatchOutcome, NewPriceRecord, PriceRecord, PriceRecordFilter, PriceStats,
};
use crate::domain::vendor::VendorSource;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored row {id} could not be decoded: {reason}")]
    Decode { id: i64, reason: String },

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait PriceRecordStore: Send + Sync {
    /// Upsert every record in one transaction; any row failure rolls back the batch.
    async fn create_batch(&self, records: &[NewPriceRecord]) -> StoreResult<BatchOutcome>;

    async fn get_all(&self, filter: &PriceRecordFilter) -> StoreResult<Vec<PriceRecord>>;

    /// One row per `(product_type, vendor_source)` at its most recent pricing date
    async fn get_latest(&self) -> StoreResult<Vec<PriceRecord>>;
    async fn get_by_id(&self, id: i64) -> StoreResult<Option<PriceRecord>>;
    async fn get_by_date(&self, date: NaiveDate) -> StoreResult<Vec<PriceRecord>>;
    async fn get_by_date_range(&self, start: NaiveDate, end: NaiveDate) -> StoreResult<Vec<PriceRecord>>;

    async fn get_stats(&self) -> StoreResult<PriceStats>;
    async fn get_vendor_list(&self) -> StoreResult<Vec<VendorSource>>;
    async fn count_by_date(&self, date: NaiveDate) -> StoreResult<i64>;

    /// Retention purge relative to `today`; returns the number of deleted rows.
    async fn delete_older_than_from(&self, days: u32, today: NaiveDate) -> StoreResult<u64>;

    async fn delete_older_than(&self, days: u32) -> StoreResult<u64> {
        self.delete_older_than_from(days, chrono::Utc::now().date_naive()).await
    }
}
