//! Raw tuples to typed price records
//!
//! Every raw entry either becomes a [`NewPriceRecord`] or is rejected with a
//! [`NormalizationError`]; rejections never stop the batch.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use crate::domain::category::ProductCategory;
use crate::domain::price_record::{NewPriceRecord, PriceOrigin};
use crate::domain::vendor::VendorSource;
use crate::infrastructure::parsing::{RawEntry, RawPriceTuple};
use crate::infrastructure::text_normalizer::{
    NormalizationError, canonical_product_type, clean_text, derive_buy_price, detect_category, parse_currency,
    parse_weight,
};

/// A dropped entry and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Label of the entry as printed, for reporting
    pub product: String,
    pub error: NormalizationError,
}

impl Rejection {
    pub fn message(&self) -> String {
        format!("{}: {}", self.product, self.error)
    }
}

#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub records: Vec<NewPriceRecord>,
    pub rejections: Vec<Rejection>,
}

impl NormalizedBatch {
    pub fn len(&self) -> usize {
        self.records.len() + self.rejections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Normalizes all entries of one run against a single pricing date
pub struct RecordNormalizer {
    pricing_date: NaiveDate,
    scraped_at: DateTime<Utc>,
    default_vendor: Option<VendorSource>,
}

impl RecordNormalizer {
    pub const fn new(pricing_date: NaiveDate, scraped_at: DateTime<Utc>) -> Self {
        Self {
            pricing_date,
            scraped_at,
            default_vendor: None,
        }
    }

    #[must_use]
    pub const fn with_default_vendor(mut self, vendor: Option<VendorSource>) -> Self {
        self.default_vendor = vendor;
        self
    }

    pub fn normalize_all(&self, entries: &[RawEntry]) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();
        let mut seen = HashSet::new();

        for entry in entries {
            let outcome = match entry {
                RawEntry::Tuple(tuple) => self.normalize(tuple).map_err(|error| Rejection {
                    product: describe(tuple),
                    error,
                }),
                RawEntry::Misaligned {
                    vendor_label,
                    weights,
                    prices,
                } => Err(Rejection {
                    product: vendor_label.clone(),
                    error: NormalizationError::MisalignedBlock {
                        vendor: vendor_label.clone(),
                        weights: *weights,
                        prices: *prices,
                    },
                }),
            };

            match outcome {
                Ok(record) => {
                    let key = (record.product_type.clone(), record.vendor_source);
                    if seen.insert(key) {
                        batch.records.push(record);
                    } else {
                        batch.rejections.push(Rejection {
                            product: record.product_type.clone(),
                            error: NormalizationError::DuplicateIdentity {
                                product: record.product_type,
                                vendor: record.vendor_source.to_string(),
                            },
                        });
                    }
                }
                Err(rejection) => batch.rejections.push(rejection),
            }
        }

        debug!(
            "Normalized {} entries: {} accepted, {} rejected",
            entries.len(),
            batch.records.len(),
            batch.rejections.len()
        );
        batch
    }

    pub fn normalize(&self, tuple: &RawPriceTuple) -> Result<NewPriceRecord, NormalizationError> {
        let label = if tuple.product_label.trim().is_empty() {
            tuple.weight.as_deref().unwrap_or_default()
        } else {
            tuple.product_label.as_str()
        };
        let base_type = canonical_product_type(label)?;
        if let Some(weight) = &tuple.weight {
            parse_weight(weight)?;
        }

        let vendor_source = self.resolve_vendor(tuple.vendor_label.as_deref(), &base_type)?;
        let (category, product_type) = classify(&base_type, tuple.category_hint.as_deref());

        let sell_price = parse_currency(&tuple.sell_price)?;
        let (buy_price, buy_price_origin) = match &tuple.buy_price {
            Some(text) => {
                let buy = parse_currency(text)?;
                if buy > sell_price {
                    return Err(NormalizationError::PriceOrderViolation {
                        product: product_type,
                        buy,
                        sell: sell_price,
                    });
                }
                (buy, PriceOrigin::Observed)
            }
            None => (derive_buy_price(sell_price), PriceOrigin::Derived),
        };

        Ok(NewPriceRecord {
            pricing_date: self.pricing_date,
            product_type,
            vendor_source,
            category,
            buy_price,
            buy_price_origin,
            sell_price,
            scraped_at: self.scraped_at,
        })
    }

    fn resolve_vendor(&self, label: Option<&str>, product: &str) -> Result<VendorSource, NormalizationError> {
        match label {
            Some(label) => VendorSource::from_label(label).ok_or_else(|| NormalizationError::UnknownVendor {
                label: label.to_string(),
            }),
            None => self.default_vendor.ok_or_else(|| NormalizationError::MissingVendor {
                product: product.to_string(),
            }),
        }
    }
}

/// Category from the label, else from the heading above it. A heading naming
/// a special line is prefixed to bare weights so `5 gram` under `Gift Series`
/// stays distinct from the standard `5 gram` bar.
fn classify(base_type: &str, hint: Option<&str>) -> (ProductCategory, String) {
    let from_label = detect_category(base_type);
    if from_label != ProductCategory::default() {
        return (from_label, base_type.to_string());
    }

    let Some(hint) = hint.map(clean_text).filter(|h| !h.is_empty()) else {
        return (from_label, base_type.to_string());
    };
    let from_hint = detect_category(&hint);
    if from_hint == ProductCategory::default() || base_type.to_lowercase().contains(&hint.to_lowercase()) {
        (from_hint, base_type.to_string())
    } else {
        (from_hint, format!("{hint} {base_type}"))
    }
}

fn describe(tuple: &RawPriceTuple) -> String {
    let label = clean_text(&tuple.product_label);
    match &tuple.vendor_label {
        Some(vendor) => format!("{} {}", clean_text(vendor), label),
        None => label,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn normalizer() -> RecordNormalizer {
        RecordNormalizer::new(NaiveDate::from_ymd_opt(2025, 1, 13).unwrap(), Utc::now())
            .with_default_vendor(Some(VendorSource::Antam))
    }

    fn tuple(label: &str, buy: Option<&str>, sell: &str) -> RawPriceTuple {
        RawPriceTuple {
            vendor_label: None,
            product_label: label.to_string(),
            weight: Some(label.to_string()),
            buy_price: buy.map(str::to_string),
            sell_price: sell.to_string(),
            category_hint: Some("Emas Batangan".to_string()),
        }
    }

    #[test]
    fn test_observed_prices_are_kept() {
        let record = normalizer()
            .normalize(&tuple("1 gr", Some("Rp1.132.000"), "Rp1.271.000"))
            .unwrap();
        assert_eq!(record.product_type, "1 gram");
        assert_eq!(record.vendor_source, VendorSource::Antam);
        assert_eq!(record.category, ProductCategory::EmasBatangan);
        assert_eq!(record.buy_price, 1_132_000);
        assert_eq!(record.sell_price, 1_271_000);
        assert_eq!(record.buy_price_origin, PriceOrigin::Observed);
    }

    #[test]
    fn test_sell_only_derives_buy() {
        let record = normalizer().normalize(&tuple("0,5 gram", None, "Rp1.000")).unwrap();
        assert_eq!(record.product_type, "0.5 gram");
        assert_eq!(record.buy_price, 940);
        assert_eq!(record.buy_price_origin, PriceOrigin::Derived);
    }

    #[test]
    fn test_heading_names_special_line() {
        let mut gift = tuple("5 gr", None, "Rp6.000.000");
        gift.category_hint = Some("Emas Batangan Gift Series".to_string());
        let record = normalizer().normalize(&gift).unwrap();
        assert_eq!(record.category, ProductCategory::GiftSeries);
        assert_eq!(record.product_type, "Emas Batangan Gift Series 5 gram");
    }

    #[rstest]
    #[case(tuple("1 gram", Some("Rp2.000"), "Rp1.000"), "PriceOrderViolation")]
    #[case(tuple("1 gram", None, "harga"), "InvalidCurrency")]
    #[case(tuple("satu batang", None, "Rp1.000"), "InvalidWeight")]
    #[case(tuple("   ", None, "Rp1.000"), "EmptyLabel")]
    fn test_rejected_tuples(#[case] raw: RawPriceTuple, #[case] expected: &str) {
        let error = normalizer().normalize(&raw).unwrap_err();
        assert!(format!("{error:?}").starts_with(expected), "{error:?}");
    }

    #[test]
    fn test_vendor_resolution() {
        let mut labelled = tuple("1 gram", None, "Rp1.000");
        labelled.vendor_label = Some("BABY GALERI 24".to_string());
        assert_eq!(
            normalizer().normalize(&labelled).unwrap().vendor_source,
            VendorSource::BabyGaleri24
        );

        labelled.vendor_label = Some("EMAS PALSU".to_string());
        assert_eq!(
            normalizer().normalize(&labelled).unwrap_err(),
            NormalizationError::UnknownVendor {
                label: "EMAS PALSU".to_string()
            }
        );

        let orphan = RecordNormalizer::new(NaiveDate::from_ymd_opt(2025, 1, 13).unwrap(), Utc::now());
        assert!(matches!(
            orphan.normalize(&tuple("1 gram", None, "Rp1.000")),
            Err(NormalizationError::MissingVendor { .. })
        ));
    }

    #[test]
    fn test_batch_counts_every_entry() {
        let entries = vec![
            RawEntry::Tuple(tuple("1 gram", Some("Rp900"), "Rp1.000")),
            RawEntry::Tuple(tuple("1 gr", Some("Rp900"), "Rp1.000")),
            RawEntry::Tuple(tuple("2 gram", None, "abc")),
            RawEntry::Misaligned {
                vendor_label: "UBS".to_string(),
                weights: 3,
                prices: 5,
            },
        ];
        let batch = normalizer().normalize_all(&entries);

        assert_eq!(batch.len(), entries.len());
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.rejections.len(), 3);
        assert!(matches!(
            batch.rejections[0].error,
            NormalizationError::DuplicateIdentity { .. }
        ));
        assert!(matches!(
            batch.rejections[2].error,
            NormalizationError::MisalignedBlock { weights: 3, prices: 5, .. }
        ));
    }
}
