//! Parsing configuration for price extraction
//!
//! CSS selectors are lists so a vendor redesign can be handled by adding a
//! fallback instead of a code change.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingConfig {
    /// Candidate price tables
    pub table: Vec<String>,
    /// Process every matching table instead of only the one with most data rows
    pub merge_tables: bool,
    /// Row texts treated as column titles rather than category headers
    pub column_title_keywords: Vec<String>,

    pub embedded_json: Vec<String>,

    pub card_selectors: CardSelectors,

    /// Elements scanned for free-text vendor blocks
    pub text_block: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardSelectors {
    pub container: Vec<String>,
    pub weight: Vec<String>,
    pub weight_attribute: String,
    pub title: Vec<String>,
    pub buy_price: Vec<String>,
    pub sell_price: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| (*s).to_string()).collect()
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            table: strings(&["table"]),
            merge_tables: false,
            column_title_keywords: strings(&[
                "berat", "jenis", "type", "harga", "weight", "gramasi", "price",
            ]),
            embedded_json: strings(&["script[type='application/json']", "script#__NEXT_DATA__"]),
            card_selectors: CardSelectors::default(),
            text_block: strings(&[
                "[class*='card']",
                "[class*='price']",
                "[class*='vendor']",
                "[class*='product']",
            ]),
        }
    }
}

impl Default for CardSelectors {
    fn default() -> Self {
        Self {
            container: strings(&[".product-card", ".price-item", "tr.price-row", ".gold-price-item"]),
            weight: strings(&[".weight", ".gram", ".product-name"]),
            weight_attribute: "data-weight".to_string(),
            title: strings(&[".product-title", ".category-name"]),
            buy_price: strings(&[".buy-price", ".harga-beli"]),
            sell_price: strings(&[".sell-price", ".harga-jual"]),
        }
    }
}

impl ParsingConfig {
    /// Comma-joined text-block selectors, as used by the in-browser query
    pub fn text_block_query(&self) -> String {
        self.text_block.join(", ")
    }
}
