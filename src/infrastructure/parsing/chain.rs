//! Ordered fallback chain of extraction strategies

use tracing::{debug, info, warn};

use super::{ExtractionStrategy, PageSnapshot, ParseContext, ParsingConfig, ParsingResult, RawEntry, default_strategies};

/// What the chain produced for one page
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ChainOutcome {
    /// Name of the strategy whose entries were taken
    pub strategy: Option<&'static str>,
    pub entries: Vec<RawEntry>,
    /// `(strategy, entries found)` for every strategy that was invoked
    pub evaluated: Vec<(&'static str, usize)>,
    /// Strategies that could not run
    pub errors: Vec<String>,
}

impl ChainOutcome {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct ExtractionChain {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl ExtractionChain {
    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Payload, table, card grid, then text blocks
    pub fn standard(config: &ParsingConfig) -> ParsingResult<Self> {
        Ok(Self::new(default_strategies(config)?))
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run strategies in order; the first non-empty result is returned as is.
    /// Later strategies are not invoked and results are never merged.
    pub fn run(&self, page: &PageSnapshot<'_>, context: &ParseContext) -> ChainOutcome {
        let mut outcome = ChainOutcome::default();

        for strategy in &self.strategies {
            match strategy.extract(page, context) {
                Ok(entries) => {
                    debug!("Strategy {} found {} entries", strategy.name(), entries.len());
                    outcome.evaluated.push((strategy.name(), entries.len()));
                    if !entries.is_empty() {
                        info!(
                            "Using {} entries from strategy {} for {}",
                            entries.len(),
                            strategy.name(),
                            context.source_id
                        );
                        outcome.strategy = Some(strategy.name());
                        outcome.entries = entries;
                        return outcome;
                    }
                }
                Err(e) => {
                    warn!("Strategy {} failed on {}: {}", strategy.name(), context.source_id, e);
                    outcome.evaluated.push((strategy.name(), 0));
                    outcome.errors.push(format!("{}: {}", strategy.name(), e));
                }
            }
        }

        outcome
    }
}
