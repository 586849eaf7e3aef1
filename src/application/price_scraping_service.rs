//! Price scraping service facade
//!
//! Entry point for callers such as the binary or an HTTP layer: trigger a
//! scrape and read back stored prices.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::diagnostics::DiagnosticSink;
use crate::application::scrape_orchestrator::{ScrapeError, ScrapeOrchestrator};
use crate::domain::price_record::{PriceRecord, PriceRecordFilter, PriceStats};
use crate::domain::repositories::{PriceRecordStore, StoreResult};
use crate::domain::scrape_result::ScrapeResult;
use crate::domain::vendor::VendorSource;
use crate::infrastructure::browser::BrowserFetcher;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::fetching::{FetchError, PageFetcher, RoutingFetcher};
use crate::infrastructure::http_client::HttpFetcher;
use crate::infrastructure::retry::RetryPolicy;

pub struct PriceScrapingService {
    orchestrator: ScrapeOrchestrator,
    store: Arc<dyn PriceRecordStore>,
    retention_days: u32,
    shutdown: CancellationToken,
}

impl PriceScrapingService {
    pub fn new(orchestrator: ScrapeOrchestrator, store: Arc<dyn PriceRecordStore>) -> Self {
        let retention_days = orchestrator.config().retention_days;
        Self {
            orchestrator,
            store,
            retention_days,
            shutdown: CancellationToken::new(),
        }
    }

    /// Wire the HTTP and browser fetchers from configuration.
    pub fn from_config(config: &AppConfig, store: Arc<dyn PriceRecordStore>) -> Result<Self, FetchError> {
        let policy = RetryPolicy::new(config.fetch.max_retries.max(1), config.fetch.backoff_base());
        let http = HttpFetcher::new(config.fetch.clone())?;
        let browser = BrowserFetcher::new(config.browser.clone(), policy);
        let fetcher: Arc<dyn PageFetcher> = Arc::new(RoutingFetcher::new(http, browser));
        let orchestrator = ScrapeOrchestrator::new(config.scraping.clone(), fetcher, Arc::clone(&store));
        Ok(Self::new(orchestrator, store))
    }

    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.orchestrator = self.orchestrator.with_diagnostics(diagnostics);
        self
    }

    /// Token cancelling every in-flight scrape of this service
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn trigger_scrape(&self, source_id: Option<&str>) -> (ScrapeResult, Option<ScrapeError>) {
        let cancel = self.shutdown.child_token();
        self.orchestrator.run(source_id, &cancel).await
    }

    pub async fn get_all(&self, filter: &PriceRecordFilter) -> StoreResult<Vec<PriceRecord>> {
        self.store.get_all(filter).await
    }

    pub async fn get_latest(&self) -> StoreResult<Vec<PriceRecord>> {
        self.store.get_latest().await
    }

    pub async fn get_by_id(&self, id: i64) -> StoreResult<Option<PriceRecord>> {
        self.store.get_by_id(id).await
    }

    pub async fn get_by_date(&self, date: NaiveDate) -> StoreResult<Vec<PriceRecord>> {
        self.store.get_by_date(date).await
    }

    pub async fn get_stats(&self) -> StoreResult<PriceStats> {
        self.store.get_stats().await
    }

    pub async fn get_vendor_list(&self) -> StoreResult<Vec<VendorSource>> {
        self.store.get_vendor_list().await
    }

    /// Delete rows older than `days`, or the configured retention
    pub async fn purge_older_than(&self, days: Option<u32>) -> StoreResult<u64> {
        let days = days.unwrap_or(self.retention_days);
        let deleted = self.store.delete_older_than(days).await?;
        info!("Retention purge ({} days) removed {} rows", days, deleted);
        Ok(deleted)
    }
}
