//! Card/grid element extraction
//!
//! Cards are found with the configured container selectors (first selector
//! with matches wins). Each card is read through its sub-field selectors when
//! it has a sell price element; otherwise its text goes through the same
//! vendor-section scanning as free-text blocks.

use scraper::{ElementRef, Selector};
use tracing::debug;

use super::text_block::scan_text;
use super::{
    ExtractionStrategy, PageSnapshot, ParseContext, ParsingConfig, ParsingResult, RawEntry,
    RawPriceTuple, compile_selectors, element_text, first_text,
};

pub struct CardGridStrategy {
    containers: Vec<Selector>,
    weight: Vec<Selector>,
    weight_attribute: String,
    title: Vec<Selector>,
    buy_price: Vec<Selector>,
    sell_price: Vec<Selector>,
}

impl CardGridStrategy {
    pub fn new(config: &ParsingConfig) -> ParsingResult<Self> {
        let cards = &config.card_selectors;
        Ok(Self {
            containers: compile_selectors("card container", &cards.container)?,
            weight: compile_selectors("card weight", &cards.weight)?,
            weight_attribute: cards.weight_attribute.clone(),
            title: compile_selectors("card title", &cards.title)?,
            buy_price: compile_selectors("card buy price", &cards.buy_price)?,
            sell_price: compile_selectors("card sell price", &cards.sell_price)?,
        })
    }

    fn structured(&self, card: &ElementRef<'_>) -> Option<RawPriceTuple> {
        let sell_price = first_text(card, &self.sell_price)?;
        let weight = card
            .value()
            .attr(&self.weight_attribute)
            .map(str::to_string)
            .or_else(|| first_text(card, &self.weight))?;
        let title = first_text(card, &self.title);

        Some(RawPriceTuple {
            vendor_label: None,
            product_label: weight.clone(),
            weight: Some(weight),
            buy_price: first_text(card, &self.buy_price),
            sell_price,
            category_hint: title,
        })
    }
}

impl ExtractionStrategy for CardGridStrategy {
    fn name(&self) -> &'static str {
        "card_grid"
    }

    fn extract(&self, page: &PageSnapshot<'_>, context: &ParseContext) -> ParsingResult<Vec<RawEntry>> {
        for selector in &self.containers {
            let cards: Vec<ElementRef<'_>> = page.document.select(selector).collect();
            if cards.is_empty() {
                continue;
            }

            let mut entries = Vec::new();
            for card in &cards {
                match self.structured(card) {
                    Some(tuple) => entries.push(RawEntry::Tuple(tuple)),
                    None => entries.extend(scan_text(&element_text(card), context.default_vendor.as_deref())),
                }
            }
            debug!("{} cards produced {} entries", cards.len(), entries.len());
            return Ok(entries);
        }

        Ok(Vec::new())
    }
}
