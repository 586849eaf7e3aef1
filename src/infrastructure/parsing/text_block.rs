//! Free-text vendor block scanning
//!
//! JS-rendered vendor grids have no stable markup. Their text is split into
//! vendor sections at every known vendor label, and each section is read as
//! repeating `(weight, sell price, buy price)` groups:
//!
//! ```text
//! GALERI 24  0.5 gram Rp720.000 Rp640.000  1 gram Rp1.400.000 Rp1.250.000
//! ```
//!
//! A section whose price count is not twice its weight count is reported as
//! [`RawEntry::Misaligned`] instead of being paired by guesswork.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};
use std::collections::HashSet;
use tracing::debug;

use super::{
    ExtractionStrategy, PageSnapshot, ParseContext, ParsingConfig, ParsingResult, RawEntry,
    RawPriceTuple, compile_selectors, element_text,
};
use crate::domain::vendor::VendorSource;
use crate::infrastructure::text_normalizer::{format_weight, parse_weight};

static PRICE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:rp|idr)\.?\s?\d[\d.,]*").expect("price pattern"));
static WEIGHT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+(?:[.,]\d+)?)\s*(?:gram|gr|g)\b").expect("weight pattern")
});

/// Text of one vendor, from its label up to the next vendor label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorSection {
    pub vendor_label: Option<String>,
    pub text: String,
}

/// Split `text` at every known vendor label; text before the first label
/// belongs to no vendor.
pub fn split_vendor_sections(text: &str) -> Vec<VendorSection> {
    let mut starts: Vec<(usize, &'static str)> = Vec::new();
    let mut cursor = 0;

    while let Some((offset, _, label)) = VendorSource::first_label_in(&text[cursor..]) {
        let start = cursor + offset;
        starts.push((start, label));
        cursor = start + label.len();
    }

    if starts.is_empty() {
        return vec![VendorSection {
            vendor_label: None,
            text: text.to_string(),
        }];
    }

    let mut sections = Vec::with_capacity(starts.len() + 1);
    if starts[0].0 > 0 {
        sections.push(VendorSection {
            vendor_label: None,
            text: text[..starts[0].0].to_string(),
        });
    }
    for (i, (start, label)) in starts.iter().enumerate() {
        let end = starts.get(i + 1).map_or(text.len(), |next| next.0);
        sections.push(VendorSection {
            vendor_label: Some((*label).to_string()),
            text: text[start + label.len()..end].to_string(),
        });
    }
    sections
}

/// Read one section as `(weight, sell, buy)` groups.
pub fn pair_section(section: &VendorSection, fallback_vendor: Option<&str>) -> Vec<RawEntry> {
    let weights: Vec<&str> = WEIGHT.find_iter(&section.text).map(|m| m.as_str()).collect();
    let prices: Vec<&str> = PRICE.find_iter(&section.text).map(|m| m.as_str().trim()).collect();
    let vendor = section
        .vendor_label
        .clone()
        .or_else(|| fallback_vendor.map(str::to_string));

    if weights.is_empty() && prices.is_empty() {
        return Vec::new();
    }
    if weights.is_empty() || prices.len() != weights.len() * 2 {
        return vec![RawEntry::Misaligned {
            vendor_label: vendor.unwrap_or_else(|| "unknown".to_string()),
            weights: weights.len(),
            prices: prices.len(),
        }];
    }

    weights
        .iter()
        .enumerate()
        .map(|(i, weight)| {
            let product_label = parse_weight(weight).map_or_else(|_| (*weight).to_string(), format_weight);
            RawEntry::Tuple(RawPriceTuple {
                vendor_label: vendor.clone(),
                product_label,
                weight: Some((*weight).to_string()),
                sell_price: prices[i * 2].to_string(),
                buy_price: Some(prices[i * 2 + 1].to_string()),
                category_hint: None,
            })
        })
        .collect()
}

/// Sections of `text` paired into entries; vendorless text only counts when a
/// fallback vendor is known.
pub fn scan_text(text: &str, fallback_vendor: Option<&str>) -> Vec<RawEntry> {
    split_vendor_sections(text)
        .iter()
        .filter(|section| section.vendor_label.is_some() || fallback_vendor.is_some())
        .flat_map(|section| pair_section(section, fallback_vendor))
        .collect()
}

pub struct TextBlockStrategy {
    blocks: Vec<Selector>,
}

impl TextBlockStrategy {
    pub fn new(config: &ParsingConfig) -> ParsingResult<Self> {
        Ok(Self {
            blocks: compile_selectors("text_block", &config.text_block)?,
        })
    }

    /// Outermost matching elements mentioning a price or weight, in document order
    fn dom_blocks(&self, page: &PageSnapshot<'_>) -> Vec<String> {
        let mut matched: Vec<ElementRef<'_>> = Vec::new();
        let mut ids = HashSet::new();
        for selector in &self.blocks {
            for element in page.document.select(selector) {
                if ids.insert(element.id()) {
                    matched.push(element);
                }
            }
        }

        let mut outermost: Vec<ElementRef<'_>> = matched
            .iter()
            .filter(|element| !element.ancestors().any(|a| ids.contains(&a.id())))
            .copied()
            .collect();
        outermost.sort_by_key(|element| {
            page.document
                .root_element()
                .descendants()
                .position(|node| node.id() == element.id())
        });

        outermost
            .iter()
            .map(element_text)
            .filter(|text| mentions_price_or_weight(text))
            .collect()
    }
}

fn mentions_price_or_weight(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.contains("rp") || lowered.contains("gram")
}

impl ExtractionStrategy for TextBlockStrategy {
    fn name(&self) -> &'static str {
        "text_block"
    }

    fn extract(&self, page: &PageSnapshot<'_>, context: &ParseContext) -> ParsingResult<Vec<RawEntry>> {
        let blocks: Vec<String> = if page.rendered_blocks.is_empty() {
            self.dom_blocks(page)
        } else {
            page.rendered_blocks
                .iter()
                .map(|b| crate::infrastructure::text_normalizer::clean_text(b))
                .filter(|b| mentions_price_or_weight(b))
                .collect()
        };

        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for block in blocks {
            if !seen.insert(block.clone()) {
                continue;
            }
            entries.extend(scan_text(&block, context.default_vendor.as_deref()));
        }

        debug!("Text block strategy produced {} entries for {}", entries.len(), context.source_id);
        Ok(entries)
    }
}
