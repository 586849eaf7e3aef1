//! SQLite implementation of [`PriceRecordStore`]
//!
//! Rows are unique on `(pricing_date, product_type, vendor_source)`. A batch is
//! written inside one transaction of upserts, so re-running a scrape for the
//! same pricing date overwrites prices instead of duplicating them. Each upsert
//! reports whether it inserted; the transaction never reads before its first
//! write, so concurrent batches queue on the SQLite write lock.

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use crate::domain::category::ProductCategory;
use crate::domain::price_record::{
    BatchOutcome, NewPriceRecord, PriceOrigin, PriceRecord, PriceRecordFilter, PriceStats,
};
use crate::domain::repositories::{PriceRecordStore, StoreError, StoreResult};
use crate::domain::vendor::VendorSource;

const COLUMNS: &str = "id, pricing_date, product_type, vendor_source, category, buy_price, \
                       buy_price_derived, sell_price, scraped_at, created_at, updated_at";

const UPSERT: &str = r"
    INSERT INTO price_records
        (pricing_date, product_type, vendor_source, category, buy_price, buy_price_derived,
         sell_price, scraped_at, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (pricing_date, product_type, vendor_source) DO UPDATE SET
        category = excluded.category,
        buy_price = excluded.buy_price,
        buy_price_derived = excluded.buy_price_derived,
        sell_price = excluded.sell_price,
        scraped_at = excluded.scraped_at,
        updated_at = excluded.updated_at
    RETURNING created_at = updated_at
";

#[derive(Clone)]
pub struct SqlitePriceRecordStore {
    pool: SqlitePool,
}

impl SqlitePriceRecordStore {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn decode(row: &SqliteRow) -> StoreResult<PriceRecord> {
        let id: i64 = row.try_get("id")?;
        let vendor: String = row.try_get("vendor_source")?;
        let category: String = row.try_get("category")?;
        let derived: bool = row.try_get("buy_price_derived")?;

        Ok(PriceRecord {
            id,
            pricing_date: row.try_get("pricing_date")?,
            product_type: row.try_get("product_type")?,
            vendor_source: vendor
                .parse::<VendorSource>()
                .map_err(|reason| StoreError::Decode { id, reason })?,
            category: category
                .parse::<ProductCategory>()
                .map_err(|reason| StoreError::Decode { id, reason })?,
            buy_price: row.try_get("buy_price")?,
            buy_price_origin: if derived { PriceOrigin::Derived } else { PriceOrigin::Observed },
            sell_price: row.try_get("sell_price")?,
            scraped_at: row.try_get("scraped_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn decode_all(rows: &[SqliteRow]) -> StoreResult<Vec<PriceRecord>> {
        rows.iter().map(Self::decode).collect()
    }
}

#[async_trait]
impl PriceRecordStore for SqlitePriceRecordStore {
    async fn create_batch(&self, records: &[NewPriceRecord]) -> StoreResult<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        if records.is_empty() {
            return Ok(outcome);
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for record in records {
            let inserted: bool = sqlx::query_scalar(UPSERT)
                .bind(record.pricing_date)
                .bind(&record.product_type)
                .bind(record.vendor_source.as_str())
                .bind(record.category.as_str())
                .bind(record.buy_price)
                .bind(record.buy_price_origin == PriceOrigin::Derived)
                .bind(record.sell_price)
                .bind(record.scraped_at)
                .bind(now)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;

            if inserted {
                outcome.saved += 1;
            } else {
                outcome.updated += 1;
            }
        }

        tx.commit().await?;
        info!(
            "Persisted {} price records ({} new, {} updated)",
            records.len(),
            outcome.saved,
            outcome.updated
        );
        Ok(outcome)
    }

    async fn get_all(&self, filter: &PriceRecordFilter) -> StoreResult<Vec<PriceRecord>> {
        let mut conditions = Vec::new();
        let mut bind_values = Vec::new();

        if let Some(product_type) = &filter.product_type {
            conditions.push("LOWER(product_type) LIKE ?");
            bind_values.push(format!("%{}%", product_type.to_lowercase()));
        }
        if let Some(vendor) = filter.vendor {
            conditions.push("vendor_source = ?");
            bind_values.push(vendor.as_str().to_string());
        }
        if let Some(start) = filter.start_date {
            conditions.push("pricing_date >= ?");
            bind_values.push(start.to_string());
        }
        if let Some(end) = filter.end_date {
            conditions.push("pricing_date <= ?");
            bind_values.push(end.to_string());
        }
        if let (Some(start), Some(end)) = (filter.start_date, filter.end_date) {
            if start > end {
                return Err(StoreError::InvalidQuery(format!("start date {start} is after end date {end}")));
            }
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let paging = match (filter.limit, filter.offset) {
            (None, None) => String::new(),
            (limit, offset) => format!(
                "LIMIT {} OFFSET {}",
                limit.map_or(-1, i64::from),
                offset.unwrap_or(0)
            ),
        };

        let sql = format!(
            "SELECT {COLUMNS} FROM price_records {where_clause} \
             ORDER BY pricing_date DESC, vendor_source, product_type {paging}"
        );
        debug!("Price record query: {}", sql);

        let mut query = sqlx::query(&sql);
        for value in &bind_values {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Self::decode_all(&rows)
    }

    async fn get_latest(&self) -> StoreResult<Vec<PriceRecord>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM price_records r
             WHERE r.pricing_date = (
                 SELECT MAX(l.pricing_date) FROM price_records l
                 WHERE l.product_type = r.product_type AND l.vendor_source = r.vendor_source
             )
             ORDER BY r.vendor_source, r.product_type"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Self::decode_all(&rows)
    }

    async fn get_by_id(&self, id: i64) -> StoreResult<Option<PriceRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM price_records WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn get_by_date(&self, date: NaiveDate) -> StoreResult<Vec<PriceRecord>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM price_records WHERE pricing_date = ? ORDER BY vendor_source, product_type"
        );
        let rows = sqlx::query(&sql).bind(date).fetch_all(&self.pool).await?;
        Self::decode_all(&rows)
    }

    async fn get_by_date_range(&self, start: NaiveDate, end: NaiveDate) -> StoreResult<Vec<PriceRecord>> {
        self.get_all(&PriceRecordFilter::between(start, end)).await
    }

    async fn get_stats(&self) -> StoreResult<PriceStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total_records,
                    COUNT(DISTINCT vendor_source) AS unique_vendors,
                    COUNT(DISTINCT product_type) AS unique_product_types,
                    MAX(scraped_at) AS latest_scraped_at,
                    MIN(pricing_date) AS oldest_pricing_date,
                    MAX(pricing_date) AS latest_pricing_date
             FROM price_records",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(PriceStats {
            total_records: row.try_get("total_records")?,
            unique_vendors: row.try_get("unique_vendors")?,
            unique_product_types: row.try_get("unique_product_types")?,
            latest_scraped_at: row.try_get::<Option<DateTime<Utc>>, _>("latest_scraped_at")?,
            oldest_pricing_date: row.try_get::<Option<NaiveDate>, _>("oldest_pricing_date")?,
            latest_pricing_date: row.try_get::<Option<NaiveDate>, _>("latest_pricing_date")?,
        })
    }

    async fn get_vendor_list(&self) -> StoreResult<Vec<VendorSource>> {
        let stored: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT vendor_source FROM price_records ORDER BY vendor_source")
                .fetch_all(&self.pool)
                .await?;

        let mut vendors: Vec<VendorSource> = stored
            .iter()
            .filter_map(|id| match id.parse() {
                Ok(vendor) => Some(vendor),
                Err(reason) => {
                    warn!("Skipping stored vendor: {}", reason);
                    None
                }
            })
            .collect();
        vendors.sort();
        Ok(vendors)
    }

    async fn count_by_date(&self, date: NaiveDate) -> StoreResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM price_records WHERE pricing_date = ?")
            .bind(date)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn delete_older_than_from(&self, days: u32, today: NaiveDate) -> StoreResult<u64> {
        let cutoff = today
            .checked_sub_days(Days::new(u64::from(days)))
            .ok_or_else(|| StoreError::InvalidQuery(format!("retention of {days} days is out of range")))?;

        let deleted = sqlx::query("DELETE FROM price_records WHERE pricing_date < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        info!("Deleted {} price records priced before {}", deleted, cutoff);
        Ok(deleted)
    }
}
