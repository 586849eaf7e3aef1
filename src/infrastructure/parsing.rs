//! Price extraction infrastructure
//!
//! A fetched page is run through an ordered chain of strategies, each turning
//! some shape of vendor page into raw, still-textual price tuples:
//!
//! 1. `api_payload` - intercepted API bodies and embedded JSON
//! 2. `table` - the semantic price table
//! 3. `card_grid` - repeated card elements
//! 4. `text_block` - free text of JS-rendered vendor grids
//!
//! The first strategy returning anything wins. Tuples are normalized later by
//! the orchestrator.

pub mod api_payload;
pub mod card_grid;
pub mod chain;
pub mod config;
pub mod context;
pub mod error;
pub mod pricing_date;
pub mod table;
pub mod text_block;

pub use api_payload::ApiPayloadStrategy;
pub use card_grid::CardGridStrategy;
pub use chain::{ChainOutcome, ExtractionChain};
pub use config::{CardSelectors, ParsingConfig};
pub use context::ParseContext;
pub use error::{ParsingError, ParsingResult};
pub use pricing_date::resolve_pricing_date;
pub use table::TableStrategy;
pub use text_block::TextBlockStrategy;

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, warn};

use crate::infrastructure::fetching::{CapturedResponse, FetchedPage};

/// A price row as printed by the vendor, before normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawPriceTuple {
    pub vendor_label: Option<String>,
    pub product_label: String,
    pub weight: Option<String>,
    pub buy_price: Option<String>,
    pub sell_price: String,
    /// Nearest category heading above the row, if the layout has one
    pub category_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RawEntry {
    Tuple(RawPriceTuple),
    /// Vendor block whose price count did not fit the (weight, sell, buy) pattern
    Misaligned {
        vendor_label: String,
        weights: usize,
        prices: usize,
    },
}

/// Everything a strategy may look at for one page
pub struct PageSnapshot<'a> {
    pub document: &'a Html,
    pub api_responses: &'a [CapturedResponse],
    pub rendered_blocks: &'a [String],
}

impl<'a> PageSnapshot<'a> {
    pub fn new(document: &'a Html, page: &'a FetchedPage) -> Self {
        Self {
            document,
            api_responses: &page.api_responses,
            rendered_blocks: &page.rendered_blocks,
        }
    }
}

/// One extraction approach in the fallback chain
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Raw entries found on the page; empty when the page has no such shape.
    fn extract(&self, page: &PageSnapshot<'_>, context: &ParseContext) -> ParsingResult<Vec<RawEntry>>;
}

/// Compile selector strings, skipping invalid ones; fails only when none compile.
pub(crate) fn compile_selectors(field: &str, selector_strings: &[String]) -> ParsingResult<Vec<Selector>> {
    let mut selectors = Vec::new();
    let mut errors = Vec::new();

    for selector_str in selector_strings {
        match Selector::parse(selector_str) {
            Ok(selector) => selectors.push(selector),
            Err(e) => {
                warn!("Failed to compile {} selector '{}': {}", field, selector_str, e);
                errors.push(format!("'{selector_str}': {e}"));
            }
        }
    }

    if selectors.is_empty() {
        return Err(ParsingError::NoSelectors {
            field: field.to_string(),
            errors: errors.join(", "),
        });
    }

    if !errors.is_empty() {
        debug!("Some {} selectors failed to compile: {}", field, errors.join(", "));
    }

    Ok(selectors)
}

pub(crate) fn compile_selector(selector: &str) -> ParsingResult<Selector> {
    Selector::parse(selector).map_err(|e| ParsingError::invalid_selector(selector, e))
}

/// Whitespace-collapsed text of an element
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    crate::infrastructure::text_normalizer::clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

/// Text of the first descendant matched by any selector, in selector order
pub(crate) fn first_text(element: &ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors
        .iter()
        .find_map(|selector| element.select(selector).next())
        .map(|found| element_text(&found))
        .filter(|text| !text.is_empty())
}

/// The default strategy order
pub fn default_strategies(config: &ParsingConfig) -> ParsingResult<Vec<Box<dyn ExtractionStrategy>>> {
    Ok(vec![
        Box::new(ApiPayloadStrategy::new(config)?),
        Box::new(TableStrategy::new(config)?),
        Box::new(CardGridStrategy::new(config)?),
        Box::new(TextBlockStrategy::new(config)?),
    ])
}
