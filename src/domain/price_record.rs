//! Price record entities

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::category::ProductCategory;
use crate::domain::vendor::VendorSource;

/// Whether a buy price was printed by the vendor or computed from the sell price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PriceOrigin {
    #[default]
    Observed,
    Derived,
}

/// One stored price point, unique on `(pricing_date, product_type, vendor_source)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub id: i64,
    pub pricing_date: NaiveDate,
    pub product_type: String,
    pub vendor_source: VendorSource,
    pub category: ProductCategory,
    /// Integer rupiah
    pub buy_price: i64,
    pub buy_price_origin: PriceOrigin,
    pub sell_price: i64,
    pub scraped_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A normalized record ready for upsert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPriceRecord {
    pub pricing_date: NaiveDate,
    pub product_type: String,
    pub vendor_source: VendorSource,
    pub category: ProductCategory,
    pub buy_price: i64,
    pub buy_price_origin: PriceOrigin,
    pub sell_price: i64,
    pub scraped_at: DateTime<Utc>,
}

impl NewPriceRecord {
    pub fn identity(&self) -> (NaiveDate, &str, VendorSource) {
        (self.pricing_date, self.product_type.as_str(), self.vendor_source)
    }
}

/// Query filter used by listing endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRecordFilter {
    /// Substring match, case-insensitive
    pub product_type: Option<String>,
    pub vendor: Option<VendorSource>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl PriceRecordFilter {
    pub fn for_vendor(vendor: VendorSource) -> Self {
        Self {
            vendor: Some(vendor),
            ..Self::default()
        }
    }

    pub const fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            product_type: None,
            vendor: None,
            start_date: Some(start),
            end_date: Some(end),
            limit: None,
            offset: None,
        }
    }
}

/// Outcome counters of one batch upsert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub saved: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceStats {
    pub total_records: i64,
    pub unique_vendors: i64,
    pub unique_product_types: i64,
    pub latest_scraped_at: Option<DateTime<Utc>>,
    pub oldest_pricing_date: Option<NaiveDate>,
    pub latest_pricing_date: Option<NaiveDate>,
}
