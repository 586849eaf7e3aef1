//! Scrape run reporting contract

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::price_record::PriceRecord;

/// Orchestration state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStage {
    Fetching,
    Extracting,
    Normalizing,
    Persisting,
    Done,
    Failed,
}

impl ScrapeStage {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Outcome of one orchestration run.
///
/// `total_scraped == saved_count + updated_count + failed_count` holds for
/// every value built through [`ScrapeResult::finish`] and [`ScrapeResult::failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub run_id: Uuid,
    pub source: String,
    pub success: bool,
    pub message: String,
    pub stage: ScrapeStage,
    pub pricing_date: Option<NaiveDate>,
    pub total_scraped: usize,
    pub saved_count: usize,
    pub updated_count: usize,
    pub failed_count: usize,
    pub errors: Vec<String>,
    /// Wall-clock duration of the run in milliseconds
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<PriceRecord>>,
}

impl ScrapeResult {
    pub fn started(run_id: Uuid, source: impl Into<String>) -> Self {
        Self {
            run_id,
            source: source.into(),
            success: false,
            message: String::new(),
            stage: ScrapeStage::Fetching,
            pricing_date: None,
            total_scraped: 0,
            saved_count: 0,
            updated_count: 0,
            failed_count: 0,
            errors: Vec::new(),
            duration_ms: 0,
            started_at: Utc::now(),
            data: None,
        }
    }

    /// Terminal failure: nothing persisted, every scraped entry counts as failed.
    pub fn failed(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.success = false;
        self.stage = ScrapeStage::Failed;
        self.saved_count = 0;
        self.updated_count = 0;
        self.failed_count = self.total_scraped;
        self.errors.push(message.clone());
        self.message = message;
        self.stamp_duration();
        self
    }

    pub fn finish(mut self, saved: usize, updated: usize, failed: usize) -> Self {
        self.success = true;
        self.stage = ScrapeStage::Done;
        self.saved_count = saved;
        self.updated_count = updated;
        self.failed_count = failed;
        self.total_scraped = saved + updated + failed;
        self.message = format!(
            "Scraped {} entries: {} saved, {} updated, {} failed",
            self.total_scraped, saved, updated, failed
        );
        self.stamp_duration();
        self
    }

    pub const fn is_consistent(&self) -> bool {
        self.total_scraped == self.saved_count + self.updated_count + self.failed_count
    }

    fn stamp_duration(&mut self) {
        let elapsed = Utc::now().signed_duration_since(self.started_at);
        self.duration_ms = u64::try_from(elapsed.num_milliseconds()).unwrap_or(0);
    }
}
