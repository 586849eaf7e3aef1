//! Text normalization for Indonesian price listings
//!
//! Vendor pages print amounts as `Rp1.234.567`, `IDR 1.234.567` or
//! `Rp 1,234,567` and weights as `0,5 gr`, `1 gram` or `100g`. These helpers
//! turn that text into integers (rupiah), decimals (grams) and categories.
//! Everything here is pure.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::category::ProductCategory;

/// Per-record normalization failure; the record is dropped, the run continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("invalid currency text '{input}': {reason}")]
    InvalidCurrency { input: String, reason: String },

    #[error("invalid weight text '{input}'")]
    InvalidWeight { input: String },

    #[error("unknown vendor label '{label}'")]
    UnknownVendor { label: String },

    #[error("no vendor label for '{product}' and the source has no default vendor")]
    MissingVendor { product: String },

    #[error("buy price {buy} exceeds sell price {sell} for '{product}'")]
    PriceOrderViolation { product: String, buy: i64, sell: i64 },

    #[error("misaligned block for {vendor}: {weights} weights but {prices} prices")]
    MisalignedBlock {
        vendor: String,
        weights: usize,
        prices: usize,
    },

    #[error("empty product label")]
    EmptyLabel,

    #[error("'{product}' from {vendor} appears more than once in the batch")]
    DuplicateIdentity { product: String, vendor: String },
}

impl NormalizationError {
    fn currency(input: &str, reason: &str) -> Self {
        Self::InvalidCurrency {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Spread applied when a vendor only publishes a sell price (94%).
pub const DERIVED_BUY_NUMERATOR: i64 = 94;
pub const DERIVED_BUY_DENOMINATOR: i64 = 100;

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("digit pattern"));
static CURRENCY_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:rp|idr)\.?").expect("currency marker pattern"));
static NEGATIVE_AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-\u{2212}]\s*\d").expect("negative amount pattern"));
static WEIGHT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(?:gram|gr|g)\b").expect("weight pattern")
});
static WEIGHT_ONLY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(\d+(?:[.,]\d+)?)\s*(?:gram|gr|g)\s*$").expect("weight-only pattern")
});

/// Parse a locale-formatted amount into integer rupiah.
///
/// Currency markers and separators are ignored and every digit run is
/// concatenated, so `"Rp 1.234,567"` is `1234567`. A string holding two
/// unrelated numbers is therefore read as one number.
pub fn parse_currency(text: &str) -> Result<i64, NormalizationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(NormalizationError::currency(text, "empty input"));
    }

    let without_markers = CURRENCY_MARKER.replace_all(trimmed, "");
    if NEGATIVE_AMOUNT.is_match(&without_markers) {
        return Err(NormalizationError::currency(text, "negative amount"));
    }

    let digits: String = DIGIT_RUN
        .find_iter(&without_markers)
        .map(|m| m.as_str())
        .collect();
    if digits.is_empty() {
        return Err(NormalizationError::currency(text, "no digits"));
    }

    digits
        .parse::<i64>()
        .map_err(|_| NormalizationError::currency(text, "amount out of range"))
}

/// Collapse runs of whitespace (including newlines and tabs) into single spaces.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Buy price implied by a sell-only listing: `floor(sell * 0.94)`.
pub fn derive_buy_price(sell_price: i64) -> i64 {
    let scaled = i128::from(sell_price) * i128::from(DERIVED_BUY_NUMERATOR);
    let derived = scaled.div_euclid(i128::from(DERIVED_BUY_DENOMINATOR));
    i64::try_from(derived).unwrap_or(sell_price)
}

/// First `<number> <unit>` weight inside `text`, in grams.
pub fn parse_weight(text: &str) -> Result<Decimal, NormalizationError> {
    let invalid = || NormalizationError::InvalidWeight {
        input: text.to_string(),
    };
    let captures = WEIGHT.captures(text).ok_or_else(invalid)?;
    let number = captures.get(1).ok_or_else(invalid)?.as_str().replace(',', ".");
    let grams = Decimal::from_str(&number).map_err(|_| invalid())?;
    if grams <= Decimal::ZERO {
        return Err(invalid());
    }
    Ok(grams.normalize())
}

/// `"<n> gram"` for a weight in grams (`0.5 gram`, `100 gram`).
pub fn format_weight(grams: Decimal) -> String {
    format!("{} gram", grams.normalize())
}

/// Product type stored for a label: canonical `"<n> gram"` when the label is a
/// bare weight, otherwise the cleaned label itself.
pub fn canonical_product_type(label: &str) -> Result<String, NormalizationError> {
    let cleaned = clean_text(label);
    if cleaned.is_empty() {
        return Err(NormalizationError::EmptyLabel);
    }
    if WEIGHT_ONLY.is_match(&cleaned) {
        return parse_weight(&cleaned).map(format_weight);
    }
    Ok(cleaned)
}

/// One ordered category rule: every group must match, any keyword within a group.
struct CategoryRule {
    all_of: &'static [&'static [&'static str]],
    category: ProductCategory,
}

const PENDANT: &[&str] = &["liontin", "pendant"];
const SILVER: &[&str] = &["perak", "silver"];

/// Most specific first; the first matching rule wins.
const CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule {
        all_of: &[PENDANT, &["batik"]],
        category: ProductCategory::PendantBatik,
    },
    CategoryRule {
        all_of: &[&["batik seri iii", "batik seri 3"]],
        category: ProductCategory::BatikSeriIii,
    },
    CategoryRule {
        all_of: &[&["gift series", "gift"]],
        category: ProductCategory::GiftSeries,
    },
    CategoryRule {
        all_of: &[&["idul fitri", "lebaran"]],
        category: ProductCategory::IdulFitri,
    },
    CategoryRule {
        all_of: &[&["imlek", "chinese new year", "lunar new year"]],
        category: ProductCategory::Imlek,
    },
    CategoryRule {
        all_of: &[SILVER, &["heritage"]],
        category: ProductCategory::PerakHeritage,
    },
    CategoryRule {
        all_of: &[SILVER],
        category: ProductCategory::PerakMurni,
    },
    CategoryRule {
        all_of: &[PENDANT],
        category: ProductCategory::Pendant,
    },
    CategoryRule {
        all_of: &[&["batik"]],
        category: ProductCategory::Batik,
    },
];

/// Classify a product label; unmatched labels are standard bars.
pub fn detect_category(label: &str) -> ProductCategory {
    let lowered = clean_text(label).to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|rule| {
            rule.all_of
                .iter()
                .all(|group| group.iter().any(|keyword| lowered.contains(keyword)))
        })
        .map_or(ProductCategory::default(), |rule| rule.category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("Rp1.234.567", 1_234_567)]
    #[case("1.234.567", 1_234_567)]
    #[case("IDR 500", 500)]
    #[case("IDR 1.234.567", 1_234_567)]
    #[case("Rp500", 500)]
    #[case("Rp123.456.789", 123_456_789)]
    #[case("Rp1,234,567", 1_234_567)]
    #[case("Rp 1.234,567", 1_234_567)]
    #[case("  Rp. 2.540.000\n", 2_540_000)]
    fn test_parse_currency_accepts(#[case] input: &str, #[case] expected: i64) {
        assert_eq!(parse_currency(input), Ok(expected));
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("abc")]
    #[case("Rp")]
    #[case("-1000")]
    #[case("Rp -1.000")]
    #[case("99999999999999999999999")]
    fn test_parse_currency_rejects(#[case] input: &str) {
        assert!(matches!(
            parse_currency(input),
            Err(NormalizationError::InvalidCurrency { .. })
        ));
    }

    #[test]
    fn test_parse_currency_concatenates_disjoint_runs() {
        // two unrelated numbers are read as one amount
        assert_eq!(parse_currency("Rp1.000 (5%)"), Ok(10_005));
    }

    #[test]
    fn test_derive_buy_price() {
        assert_eq!(derive_buy_price(1000), 940);
        assert_eq!(derive_buy_price(0), 0);
        assert_eq!(derive_buy_price(1_271_000), 1_194_740);
        assert_eq!(derive_buy_price(99), 93);
    }

    #[rstest]
    #[case("Liontin Batik Seri III", ProductCategory::PendantBatik)]
    #[case("Pendant Batik 2 gram", ProductCategory::PendantBatik)]
    #[case("Emas Batangan Batik Seri III 10 gram", ProductCategory::BatikSeriIii)]
    #[case("Batik Seri 3", ProductCategory::BatikSeriIii)]
    #[case("Emas Batangan Gift Series 5 gram", ProductCategory::GiftSeries)]
    #[case("Emas Lebaran 25 gram", ProductCategory::IdulFitri)]
    #[case("Emas Batangan Selamat Idul Fitri", ProductCategory::IdulFitri)]
    #[case("Gold Bar Chinese New Year 100 gram", ProductCategory::Imlek)]
    #[case("Perak Heritage 250 gram", ProductCategory::PerakHeritage)]
    #[case("Silver 50 gram", ProductCategory::PerakMurni)]
    #[case("Gold Pendant 1 gram", ProductCategory::Pendant)]
    #[case("Emas Batik 10 gram", ProductCategory::Batik)]
    #[case("Logam Mulia 1 gram", ProductCategory::EmasBatangan)]
    #[case("Unknown Product", ProductCategory::EmasBatangan)]
    fn test_detect_category(#[case] label: &str, #[case] expected: ProductCategory) {
        assert_eq!(detect_category(label), expected);
    }

    #[rstest]
    #[case("1 gram", "1 gram")]
    #[case("0,5 gr", "0.5 gram")]
    #[case("100g", "100 gram")]
    #[case("  5\n gram ", "5 gram")]
    #[case("Emas Batangan   Gift Series", "Emas Batangan Gift Series")]
    fn test_canonical_product_type(#[case] label: &str, #[case] expected: &str) {
        assert_eq!(canonical_product_type(label).unwrap(), expected);
    }

    #[test]
    fn test_parse_weight() {
        assert_eq!(parse_weight("Berat 2.5 gram").unwrap(), Decimal::new(25, 1));
        assert_eq!(parse_weight("1000 gr").unwrap(), Decimal::from(1000));
        assert!(parse_weight("0 gram").is_err());
        assert!(parse_weight("Rp1.000").is_err());
        assert_eq!(canonical_product_type("   "), Err(NormalizationError::EmptyLabel));
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Emas\t\tBatangan \n 1  gram "), "Emas Batangan 1 gram");
        assert_eq!(clean_text(""), "");
    }

    proptest! {
        #[test]
        fn prop_dotted_rupiah_parses_to_value(value in 0i64..1_000_000_000_000) {
            let digits = value.to_string();
            let mut groups = Vec::new();
            let mut end = digits.len();
            while end > 3 {
                groups.push(&digits[end - 3..end]);
                end -= 3;
            }
            groups.push(&digits[..end]);
            groups.reverse();
            let text = format!("Rp{}", groups.join("."));

            prop_assert_eq!(parse_currency(&text), Ok(value));
        }

        #[test]
        fn prop_derived_buy_is_floor_of_94_percent(sell in 0i64..i64::MAX / 100) {
            let derived = derive_buy_price(sell);
            prop_assert_eq!(derived, sell * 94 / 100);
            prop_assert!(derived <= sell);
            prop_assert_eq!(derive_buy_price(sell), derived);
        }
    }
}
