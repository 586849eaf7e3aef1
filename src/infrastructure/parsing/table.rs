//! Semantic price table extraction
//!
//! Rows are read as `(label, buy, sell)`. Rows without data cells are
//! category headings ("Emas Batangan", "Gift Series") and become the category
//! hint of the rows below them, unless they are column titles.

use scraper::{ElementRef, Selector};
use tracing::debug;

use super::{
    ExtractionStrategy, PageSnapshot, ParseContext, ParsingConfig, ParsingResult, RawEntry,
    RawPriceTuple, compile_selector, compile_selectors, element_text,
};

pub struct TableStrategy {
    tables: Vec<Selector>,
    row: Selector,
    data_cell: Selector,
    header_cell: Selector,
    merge_tables: bool,
    column_title_keywords: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum RowKind {
    Data { cells: Vec<String> },
    Heading(String),
    Skip,
}

impl TableStrategy {
    pub fn new(config: &ParsingConfig) -> ParsingResult<Self> {
        Ok(Self {
            tables: compile_selectors("table", &config.table)?,
            row: compile_selector("tr")?,
            data_cell: compile_selector("td")?,
            header_cell: compile_selector("th")?,
            merge_tables: config.merge_tables,
            column_title_keywords: config
                .column_title_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
        })
    }

    fn is_column_title(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.column_title_keywords
            .iter()
            .any(|keyword| lowered.starts_with(keyword.as_str()))
    }

    fn classify(&self, row: &ElementRef<'_>) -> RowKind {
        let cells: Vec<String> = row.select(&self.data_cell).map(|c| element_text(&c)).collect();
        if cells.first().is_some_and(|label| self.is_column_title(label)) {
            return RowKind::Skip;
        }
        let has_price = cells.iter().skip(1).any(|c| c.chars().any(|ch| ch.is_ascii_digit()));

        if cells.len() >= 2 && has_price {
            return RowKind::Data { cells };
        }

        let heading = if cells.is_empty() {
            row.select(&self.header_cell)
                .map(|c| element_text(&c))
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            cells.into_iter().filter(|t| !t.is_empty()).collect::<Vec<_>>().join(" ")
        };

        if heading.is_empty() || self.is_column_title(&heading) {
            RowKind::Skip
        } else {
            RowKind::Heading(heading)
        }
    }

    fn data_rows(&self, table: &ElementRef<'_>) -> usize {
        table
            .select(&self.row)
            .filter(|row| matches!(self.classify(row), RowKind::Data { .. }))
            .count()
    }

    /// Tables with data rows; only the largest unless merging is configured.
    fn selected_tables<'a>(&self, page: &'a PageSnapshot<'_>) -> Vec<ElementRef<'a>> {
        for selector in &self.tables {
            let mut candidates: Vec<(usize, ElementRef<'a>)> = page
                .document
                .select(selector)
                .map(|table| (self.data_rows(&table), table))
                .filter(|(rows, _)| *rows > 0)
                .collect();
            if candidates.is_empty() {
                continue;
            }
            if self.merge_tables {
                return candidates.into_iter().map(|(_, table)| table).collect();
            }
            // first table wins ties
            candidates.sort_by(|a, b| b.0.cmp(&a.0));
            let best = candidates.swap_remove(0);
            return vec![best.1];
        }
        Vec::new()
    }
}

impl ExtractionStrategy for TableStrategy {
    fn name(&self) -> &'static str {
        "table"
    }

    fn extract(&self, page: &PageSnapshot<'_>, context: &ParseContext) -> ParsingResult<Vec<RawEntry>> {
        let tables = self.selected_tables(page);
        let mut entries = Vec::new();

        for table in &tables {
            let mut category: Option<String> = None;

            for row in table.select(&self.row) {
                match self.classify(&row) {
                    RowKind::Heading(heading) => {
                        debug!("Table heading '{}' on {}", heading, context.source_id);
                        category = Some(heading);
                    }
                    RowKind::Skip => {}
                    RowKind::Data { cells } => {
                        let label = cells[0].clone();
                        if label.is_empty() {
                            continue;
                        }
                        let (buy_price, sell_price) = if cells.len() >= 3 {
                            (Some(cells[1].clone()), cells[2].clone())
                        } else {
                            (None, cells[1].clone())
                        };
                        entries.push(RawEntry::Tuple(RawPriceTuple {
                            vendor_label: None,
                            weight: Some(label.clone()),
                            product_label: label,
                            buy_price,
                            sell_price,
                            category_hint: category.clone(),
                        }));
                    }
                }
            }
        }

        debug!("Table strategy read {} rows from {} table(s)", entries.len(), tables.len());
        Ok(entries)
    }
}
