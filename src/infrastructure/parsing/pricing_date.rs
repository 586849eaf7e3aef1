//! Pricing date resolution
//!
//! Vendor pages state when prices were last updated, e.g.
//! `Diperbarui Senin, 13 Januari 2025` or `Harga Emas Hari Ini, 13 Jan 2025`.
//! A batch takes that date, or today's UTC date when the page has none.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;

use crate::infrastructure::text_normalizer::clean_text;

static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)diperbarui\s+\w+\s*,\s*(\d{1,2})\s+([a-z]+)\s+(\d{4})",
        r"(?i)diperbarui\s*:?\s*(\d{1,2})\s+([a-z]+)\s+(\d{4})",
        r"(?i)harga\s+emas\s+hari\s+ini\s*,?\s*(\d{1,2})\s+([a-z]+)\s+(\d{4})",
        r"(?i)(?:last\s+)?updated\s*:?\s*(?:\w+\s*,\s*)?(\d{1,2})\s+([a-z]+)\s+(\d{4})",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("pricing date pattern"))
    .collect()
});

/// Indonesian and English month names, full and abbreviated
fn month_number(name: &str) -> Option<u32> {
    let month = match name.to_lowercase().as_str() {
        "januari" | "january" | "jan" => 1,
        "februari" | "february" | "feb" | "pebruari" => 2,
        "maret" | "march" | "mar" => 3,
        "april" | "apr" => 4,
        "mei" | "may" => 5,
        "juni" | "june" | "jun" => 6,
        "juli" | "july" | "jul" => 7,
        "agustus" | "august" | "agu" | "agt" | "ags" | "aug" => 8,
        "september" | "sep" | "sept" => 9,
        "oktober" | "october" | "okt" | "oct" => 10,
        "november" | "nopember" | "nov" => 11,
        "desember" | "december" | "des" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// First "last updated" date stated in `text`.
pub fn extract_pricing_date(text: &str) -> Option<NaiveDate> {
    let text = clean_text(text);
    DATE_PATTERNS.iter().find_map(|pattern| {
        pattern.captures_iter(&text).find_map(|captures| {
            let day = captures.get(1)?.as_str().parse().ok()?;
            let month = month_number(captures.get(2)?.as_str())?;
            let year = captures.get(3)?.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        })
    })
}

/// Date stated by the page (document text, then rendered blocks), else `today`.
pub fn resolve_pricing_date(document: &Html, rendered_blocks: &[String], today: NaiveDate) -> NaiveDate {
    let document_text = document.root_element().text().collect::<Vec<_>>().join(" ");
    extract_pricing_date(&document_text)
        .or_else(|| rendered_blocks.iter().find_map(|block| extract_pricing_date(block)))
        .unwrap_or(today)
}
