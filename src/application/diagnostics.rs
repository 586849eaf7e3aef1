//! Structured run telemetry
//!
//! The orchestrator reports what it fetched, which strategy matched and why
//! records were rejected through a [`DiagnosticSink`] instead of dumping
//! intermediate HTML to disk.

use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::scrape_result::ScrapeStage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    FetchAttempt {
        run_id: Uuid,
        source: String,
        url: String,
        attempt: u32,
    },
    FetchCompleted {
        run_id: Uuid,
        url: String,
        status: u16,
        bytes: usize,
        api_responses: usize,
        rendered_blocks: usize,
    },
    StrategyEvaluated {
        run_id: Uuid,
        strategy: String,
        entries: usize,
    },
    RecordRejected {
        run_id: Uuid,
        product: String,
        reason: String,
    },
    BatchPersisted {
        run_id: Uuid,
        saved: usize,
        updated: usize,
    },
    RunFinished {
        run_id: Uuid,
        stage: ScrapeStage,
        success: bool,
    },
}

pub trait DiagnosticSink: Send + Sync {
    fn record(&self, event: DiagnosticEvent);
}

/// Emits every event as a structured tracing record
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn record(&self, event: DiagnosticEvent) {
        match event {
            DiagnosticEvent::FetchAttempt { run_id, source, url, attempt } => {
                debug!(%run_id, %source, %url, attempt, "fetch attempt");
            }
            DiagnosticEvent::FetchCompleted {
                run_id,
                url,
                status,
                bytes,
                api_responses,
                rendered_blocks,
            } => {
                info!(%run_id, %url, status, bytes, api_responses, rendered_blocks, "fetch completed");
            }
            DiagnosticEvent::StrategyEvaluated { run_id, strategy, entries } => {
                debug!(%run_id, %strategy, entries, "strategy evaluated");
            }
            DiagnosticEvent::RecordRejected { run_id, product, reason } => {
                warn!(%run_id, %product, %reason, "record rejected");
            }
            DiagnosticEvent::BatchPersisted { run_id, saved, updated } => {
                info!(%run_id, saved, updated, "batch persisted");
            }
            DiagnosticEvent::RunFinished { run_id, stage, success } => {
                info!(%run_id, ?stage, success, "run finished");
            }
        }
    }
}

/// Keeps events in memory
#[derive(Debug, Default)]
pub struct MemoryDiagnostics {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl MemoryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Strategies evaluated so far, in order
    pub fn strategies(&self) -> Vec<(String, usize)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DiagnosticEvent::StrategyEvaluated { strategy, entries, .. } => Some((strategy, entries)),
                _ => None,
            })
            .collect()
    }

    pub fn rejections(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, DiagnosticEvent::RecordRejected { .. }))
            .count()
    }
}

impl DiagnosticSink for MemoryDiagnostics {
    fn record(&self, event: DiagnosticEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDiagnostics;

impl DiagnosticSink for NoopDiagnostics {
    fn record(&self, _event: DiagnosticEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_diagnostics_collects_in_order() {
        let sink = MemoryDiagnostics::new();
        let run_id = Uuid::new_v4();
        sink.record(DiagnosticEvent::StrategyEvaluated {
            run_id,
            strategy: "api_payload".to_string(),
            entries: 0,
        });
        sink.record(DiagnosticEvent::StrategyEvaluated {
            run_id,
            strategy: "table".to_string(),
            entries: 4,
        });
        sink.record(DiagnosticEvent::RecordRejected {
            run_id,
            product: "1 gram".to_string(),
            reason: "unknown vendor label 'X'".to_string(),
        });

        assert_eq!(
            sink.strategies(),
            vec![("api_payload".to_string(), 0), ("table".to_string(), 4)]
        );
        assert_eq!(sink.rejections(), 1);
        assert_eq!(sink.events().len(), 3);
    }

    #[test]
    fn test_events_serialize_with_tag() {
        let event = DiagnosticEvent::BatchPersisted {
            run_id: Uuid::nil(),
            saved: 2,
            updated: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "batch_persisted");
        assert_eq!(json["saved"], 2);
    }
}
