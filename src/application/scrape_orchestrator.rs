//! Scrape run orchestration
//!
//! One run walks `Fetching -> Extracting -> Normalizing -> Persisting -> Done`
//! for a single configured source, or stops in `Failed`. Fetch and extraction
//! are retried together at run level with linear backoff; the page is fully
//! parsed before the store transaction opens.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use scraper::Html;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::application::diagnostics::{DiagnosticEvent, DiagnosticSink, TracingDiagnostics};
use crate::application::record_normalizer::RecordNormalizer;
use crate::domain::repositories::{PriceRecordStore, StoreError};
use crate::domain::scrape_result::{ScrapeResult, ScrapeStage};
use crate::domain::vendor::VendorSource;
use crate::infrastructure::config::{ScrapingConfig, SourceConfig};
use crate::infrastructure::fetching::{FetchError, FetchRequest, FetchedPage, PageFetcher};
use crate::infrastructure::parsing::{
    ChainOutcome, ExtractionChain, PageSnapshot, ParseContext, ParsingError, resolve_pricing_date,
};
use crate::infrastructure::retry::RetryPolicy;

pub const NO_PRICING_DATA: &str = "no pricing data found";

/// Fatal run error, returned next to the failed [`ScrapeResult`]
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("unknown source '{0}'")]
    UnknownSource(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("no pricing data found")]
    ExtractionEmpty { strategy_errors: Vec<String> },

    #[error("extraction chain could not be built: {0}")]
    Parsing(#[from] ParsingError),

    #[error("all {0} entries failed normalization")]
    NoValidRecords(usize),

    #[error("failed to persist batch: {0}")]
    Persistence(#[from] StoreError),

    #[error("scrape run was cancelled")]
    Cancelled,
}

/// Result of one successful fetch-and-extract attempt
struct Extraction {
    pricing_date: NaiveDate,
    outcome: ChainOutcome,
}

pub struct ScrapeOrchestrator {
    config: ScrapingConfig,
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn PriceRecordStore>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl ScrapeOrchestrator {
    pub fn new(config: ScrapingConfig, fetcher: Arc<dyn PageFetcher>, store: Arc<dyn PriceRecordStore>) -> Self {
        Self {
            config,
            fetcher,
            store,
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }

    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub const fn config(&self) -> &ScrapingConfig {
        &self.config
    }

    /// Run one scrape of `source_id` (the default source when `None`).
    ///
    /// Never fails: a fatal error yields `success == false` and is also
    /// returned as the second value.
    pub async fn run(&self, source_id: Option<&str>, cancel: &CancellationToken) -> (ScrapeResult, Option<ScrapeError>) {
        let source_id = source_id.unwrap_or(&self.config.default_source).to_string();
        let run_id = Uuid::new_v4();
        let span = info_span!("scrape_run", %run_id, source = %source_id);

        let (result, failure) = self.execute(run_id, &source_id, cancel).instrument(span).await;
        self.diagnostics.record(DiagnosticEvent::RunFinished {
            run_id,
            stage: result.stage,
            success: result.success,
        });
        (result, failure)
    }

    async fn execute(
        &self,
        run_id: Uuid,
        source_id: &str,
        cancel: &CancellationToken,
    ) -> (ScrapeResult, Option<ScrapeError>) {
        let result = ScrapeResult::started(run_id, source_id);

        let Some(source) = self.config.source(source_id) else {
            let failure = ScrapeError::UnknownSource(source_id.to_string());
            error!("{}", failure);
            return (result.failed(failure.to_string()), Some(failure));
        };
        info!("Starting scrape of {} ({})", source.id, source.url);

        let chain = match ExtractionChain::standard(&source.selectors) {
            Ok(chain) => chain,
            Err(e) => return Self::fail(result, ScrapeError::Parsing(e)),
        };

        let mut result = result;
        let extraction = match self.fetch_and_extract(run_id, source, &chain, &mut result, cancel).await {
            Ok(extraction) => extraction,
            Err(failure) => return Self::fail(result, failure),
        };

        result.stage = ScrapeStage::Normalizing;
        result.pricing_date = Some(extraction.pricing_date);
        result.total_scraped = extraction.outcome.entries.len();
        info!(
            "Strategy {} produced {} entries for {}",
            extraction.outcome.strategy.unwrap_or("none"),
            result.total_scraped,
            extraction.pricing_date
        );

        let default_vendor = source.default_vendor.as_deref().and_then(VendorSource::from_label);
        let batch = RecordNormalizer::new(extraction.pricing_date, Utc::now())
            .with_default_vendor(default_vendor)
            .normalize_all(&extraction.outcome.entries);
        for rejection in &batch.rejections {
            warn!("Dropping {}", rejection.message());
            self.diagnostics.record(DiagnosticEvent::RecordRejected {
                run_id,
                product: rejection.product.clone(),
                reason: rejection.error.to_string(),
            });
            result.errors.push(rejection.message());
        }
        if batch.records.is_empty() {
            return Self::fail(result, ScrapeError::NoValidRecords(batch.rejections.len()));
        }
        if cancel.is_cancelled() {
            return Self::fail(result, ScrapeError::Cancelled);
        }

        result.stage = ScrapeStage::Persisting;
        let outcome = match self.store.create_batch(&batch.records).await {
            Ok(outcome) => outcome,
            Err(e) => return Self::fail(result, ScrapeError::Persistence(e)),
        };
        self.diagnostics.record(DiagnosticEvent::BatchPersisted {
            run_id,
            saved: outcome.saved,
            updated: outcome.updated,
        });

        if self.config.read_back {
            match self.store.get_by_date(extraction.pricing_date).await {
                Ok(rows) => result.data = Some(rows),
                Err(e) => {
                    warn!("Read-back for {} failed: {}", extraction.pricing_date, e);
                    result.errors.push(format!("read-back failed: {e}"));
                }
            }
        }

        let result = result.finish(outcome.saved, outcome.updated, batch.rejections.len());
        info!("{} in {}ms", result.message, result.duration_ms);
        (result, None)
    }

    /// Fetch and extract, retried as a unit while attempts remain.
    async fn fetch_and_extract(
        &self,
        run_id: Uuid,
        source: &SourceConfig,
        chain: &ExtractionChain,
        result: &mut ScrapeResult,
        cancel: &CancellationToken,
    ) -> Result<Extraction, ScrapeError> {
        let policy = RetryPolicy::new(self.config.run_attempts.max(1), self.config.run_backoff_base());
        let request = FetchRequest::for_source(source);
        let context = ParseContext::new(&source.id).with_default_vendor(source.default_vendor.clone());

        let mut attempt = 1;
        loop {
            result.stage = ScrapeStage::Fetching;
            self.diagnostics.record(DiagnosticEvent::FetchAttempt {
                run_id,
                source: source.id.clone(),
                url: request.url.clone(),
                attempt,
            });

            let failure = match self.fetcher.fetch(&request, cancel).await {
                Ok(page) => {
                    self.diagnostics.record(DiagnosticEvent::FetchCompleted {
                        run_id,
                        url: page.url.clone(),
                        status: page.status,
                        bytes: page.html.len(),
                        api_responses: page.api_responses.len(),
                        rendered_blocks: page.rendered_blocks.len(),
                    });

                    result.stage = ScrapeStage::Extracting;
                    let extraction = extract(&page, chain, &context, Utc::now().date_naive());
                    for (strategy, entries) in &extraction.outcome.evaluated {
                        self.diagnostics.record(DiagnosticEvent::StrategyEvaluated {
                            run_id,
                            strategy: (*strategy).to_string(),
                            entries: *entries,
                        });
                    }
                    if !extraction.outcome.is_empty() {
                        return Ok(extraction);
                    }
                    ScrapeError::ExtractionEmpty {
                        strategy_errors: extraction.outcome.errors,
                    }
                }
                Err(FetchError::Cancelled { .. }) => return Err(ScrapeError::Cancelled),
                Err(e) if !e.is_exhausted() => return Err(ScrapeError::Fetch(e)),
                Err(e) => ScrapeError::Fetch(e),
            };

            if !policy.has_attempts_after(attempt) {
                return Err(failure);
            }
            warn!("Attempt {} failed: {}; retrying", attempt, failure);
            result.errors.push(format!("attempt {attempt}: {failure}"));
            if !policy.backoff(attempt, None, cancel).await {
                return Err(ScrapeError::Cancelled);
            }
            attempt += 1;
        }
    }

    fn fail(result: ScrapeResult, failure: ScrapeError) -> (ScrapeResult, Option<ScrapeError>) {
        error!("Scrape failed during {:?}: {}", result.stage, failure);
        if let ScrapeError::ExtractionEmpty { strategy_errors } = &failure {
            for strategy_error in strategy_errors {
                warn!("Strategy error: {}", strategy_error);
            }
        }
        (result.failed(failure.to_string()), Some(failure))
    }
}

/// Parse the page, resolve its pricing date and run the chain. The document
/// never outlives this call.
fn extract(page: &FetchedPage, chain: &ExtractionChain, context: &ParseContext, today: NaiveDate) -> Extraction {
    let document = Html::parse_document(&page.html);
    let pricing_date = resolve_pricing_date(&document, &page.rendered_blocks, today);
    let snapshot = PageSnapshot::new(&document, page);
    Extraction {
        pricing_date,
        outcome: chain.run(&snapshot, context),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::diagnostics::MemoryDiagnostics;
    use crate::domain::price_record::{
        BatchOutcome, NewPriceRecord, PriceRecord, PriceRecordFilter, PriceStats,
    };
    use crate::domain::repositories::StoreResult;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    const PAGE: &str = r#"<html><body>
        <p>Diperbarui Senin, 13 Januari 2025</p>
        <table>
          <tr><th colspan="3">Emas Batangan</th></tr>
          <tr><td>1 gr</td><td>Rp1.132.000</td><td>Rp1.271.000</td></tr>
          <tr><td>2 gr</td><td>Rp2.204.000</td><td>Rp2.482.000</td></tr>
          <tr><td>5 gr</td><td>Rp9.999.999</td><td>Rp5.000.000</td></tr>
        </table>
    </body></html>"#;

    /// Serves `pages` in order, the last one repeating
    struct ScriptedFetcher {
        pages: Vec<Result<String, FetchError>>,
        calls: AtomicU32,
    }

    impl ScriptedFetcher {
        fn new(pages: Vec<Result<String, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                pages,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch(&self, request: &FetchRequest, _cancel: &CancellationToken) -> Result<FetchedPage, FetchError> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            self.pages[index.min(self.pages.len() - 1)]
                .clone()
                .map(|html| FetchedPage::from_html(&request.url, html))
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        batches: Mutex<Vec<Vec<NewPriceRecord>>>,
        fail: bool,
    }

    #[async_trait]
    impl PriceRecordStore for RecordingStore {
        async fn create_batch(&self, records: &[NewPriceRecord]) -> StoreResult<BatchOutcome> {
            if self.fail {
                return Err(StoreError::InvalidQuery("disk full".to_string()));
            }
            self.batches.lock().unwrap().push(records.to_vec());
            Ok(BatchOutcome {
                saved: records.len(),
                updated: 0,
            })
        }
        async fn get_all(&self, _filter: &PriceRecordFilter) -> StoreResult<Vec<PriceRecord>> {
            Ok(Vec::new())
        }
        async fn get_latest(&self) -> StoreResult<Vec<PriceRecord>> {
            Ok(Vec::new())
        }
        async fn get_by_id(&self, _id: i64) -> StoreResult<Option<PriceRecord>> {
            Ok(None)
        }
        async fn get_by_date(&self, _date: NaiveDate) -> StoreResult<Vec<PriceRecord>> {
            Ok(Vec::new())
        }
        async fn get_by_date_range(&self, _start: NaiveDate, _end: NaiveDate) -> StoreResult<Vec<PriceRecord>> {
            Ok(Vec::new())
        }
        async fn get_stats(&self) -> StoreResult<PriceStats> {
            Ok(PriceStats::default())
        }
        async fn get_vendor_list(&self) -> StoreResult<Vec<VendorSource>> {
            Ok(Vec::new())
        }
        async fn count_by_date(&self, _date: NaiveDate) -> StoreResult<i64> {
            Ok(0)
        }
        async fn delete_older_than_from(&self, _days: u32, _today: NaiveDate) -> StoreResult<u64> {
            Ok(0)
        }
    }

    fn config() -> ScrapingConfig {
        ScrapingConfig {
            run_backoff_base_ms: 10,
            ..ScrapingConfig::default()
        }
    }

    fn exhausted() -> FetchError {
        FetchError::Exhausted {
            url: "https://www.logammulia.com".to_string(),
            attempts: 3,
            last_status: Some(503),
            last_error: "HTTP 503".to_string(),
        }
    }

    #[tokio::test]
    async fn test_partial_success_counts_rejections() {
        let store = Arc::new(RecordingStore::default());
        let diagnostics = Arc::new(MemoryDiagnostics::new());
        let orchestrator = ScrapeOrchestrator::new(config(), ScriptedFetcher::new(vec![Ok(PAGE.to_string())]), store.clone())
            .with_diagnostics(diagnostics.clone());

        let (result, failure) = orchestrator.run(Some("logammulia"), &CancellationToken::new()).await;

        assert!(failure.is_none());
        assert!(result.success);
        assert_eq!(result.stage, ScrapeStage::Done);
        assert_eq!(result.pricing_date, NaiveDate::from_ymd_opt(2025, 1, 13));
        assert_eq!(result.total_scraped, 3);
        assert_eq!(result.saved_count, 2);
        assert_eq!(result.failed_count, 1);
        assert!(result.is_consistent());
        assert!(result.errors[0].contains("exceeds sell price"));
        assert_eq!(diagnostics.rejections(), 1);

        let batches = store.batches.lock().unwrap();
        assert_eq!(batches[0][0].product_type, "1 gram");
        assert_eq!(batches[0][0].vendor_source, VendorSource::Antam);
    }

    #[tokio::test]
    async fn test_fetch_exhaustion_retries_then_fails() {
        let fetcher = ScriptedFetcher::new(vec![Err(exhausted())]);
        let store = Arc::new(RecordingStore::default());
        let orchestrator = ScrapeOrchestrator::new(config(), fetcher.clone(), store.clone());

        let (result, failure) = orchestrator.run(None, &CancellationToken::new()).await;

        assert!(!result.success);
        assert_eq!(result.stage, ScrapeStage::Failed);
        assert!(matches!(failure, Some(ScrapeError::Fetch(_))));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert!(store.batches.lock().unwrap().is_empty());
        assert!(result.is_consistent());
    }

    #[tokio::test]
    async fn test_second_attempt_recovers() {
        let fetcher = ScriptedFetcher::new(vec![Err(exhausted()), Ok(PAGE.to_string())]);
        let orchestrator = ScrapeOrchestrator::new(config(), fetcher, Arc::new(RecordingStore::default()));

        let (result, failure) = orchestrator.run(None, &CancellationToken::new()).await;
        assert!(failure.is_none());
        assert!(result.success);
        assert!(result.errors[0].starts_with("attempt 1:"));
    }

    #[tokio::test]
    async fn test_empty_page_fails_with_no_pricing_data() {
        let fetcher = ScriptedFetcher::new(vec![Ok("<html><body>maintenance</body></html>".to_string())]);
        let orchestrator = ScrapeOrchestrator::new(config(), fetcher, Arc::new(RecordingStore::default()));

        let (result, failure) = orchestrator.run(None, &CancellationToken::new()).await;
        assert!(!result.success);
        assert_eq!(result.message, NO_PRICING_DATA);
        assert_eq!(result.total_scraped, 0);
        assert!(matches!(failure, Some(ScrapeError::ExtractionEmpty { .. })));
    }

    #[tokio::test]
    async fn test_store_failure_rolls_up() {
        let store = Arc::new(RecordingStore {
            fail: true,
            ..RecordingStore::default()
        });
        let orchestrator = ScrapeOrchestrator::new(config(), ScriptedFetcher::new(vec![Ok(PAGE.to_string())]), store);

        let (result, failure) = orchestrator.run(None, &CancellationToken::new()).await;
        assert!(!result.success);
        assert_eq!(result.saved_count, 0);
        assert_eq!(result.failed_count, 3);
        assert!(result.is_consistent());
        assert!(matches!(failure, Some(ScrapeError::Persistence(_))));
        assert!(result.message.contains("disk full"));
    }

    #[tokio::test]
    async fn test_unknown_source() {
        let orchestrator = ScrapeOrchestrator::new(
            config(),
            ScriptedFetcher::new(vec![Ok(PAGE.to_string())]),
            Arc::new(RecordingStore::default()),
        );
        let (result, failure) = orchestrator.run(Some("tokopedia"), &CancellationToken::new()).await;
        assert!(!result.success);
        assert!(matches!(failure, Some(ScrapeError::UnknownSource(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_during_backoff() {
        let cancel = CancellationToken::new();
        let fetcher = ScriptedFetcher::new(vec![Err(exhausted())]);
        let orchestrator = ScrapeOrchestrator::new(
            ScrapingConfig {
                run_backoff_base_ms: 60_000,
                ..ScrapingConfig::default()
            },
            fetcher,
            Arc::new(RecordingStore::default()),
        );

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let (result, failure) = orchestrator.run(None, &cancel).await;
        assert!(!result.success);
        assert!(matches!(failure, Some(ScrapeError::Cancelled)));
    }
}
