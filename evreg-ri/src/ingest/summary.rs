//! Ingestion results reported back to callers

use super::error::IngestError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Outcome of one ingestion call
#[derive(Debug, Clone, Serialize)]
pub struct IngestionSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
}

impl IngestionSummary {
    pub fn rows_inserted(&self) -> u64 {
        self.sources.iter().map(|s| s.rows_inserted).sum()
    }

    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.error.is_some()).count()
    }

    pub fn source(&self, source_id: &str) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.source_id == source_id)
    }
}

/// Per-source counters
///
/// `rows_new` is the unprocessed suffix beyond the previous watermark;
/// `rows_without_code + rows_invalid_code + rows_inserted == rows_new` for a
/// successful source.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceReport {
    pub source_id: String,
    pub event_name: String,
    pub rows_total: u64,
    pub previous_watermark: u64,
    pub rows_new: u64,
    pub rows_without_code: u64,
    pub rows_invalid_code: u64,
    pub rows_inserted: u64,
    /// Watermark after this pass; `None` when the pass failed
    pub watermark: Option<u64>,
    pub error: Option<SourceFailure>,
}

impl SourceReport {
    pub fn new(source_id: impl Into<String>, event_name: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            event_name: event_name.into(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub(crate) fn fail(&mut self, err: &IngestError) {
        self.rows_inserted = 0;
        self.watermark = None;
        self.error = Some(SourceFailure {
            kind: err.kind().to_string(),
            message: err.to_string(),
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub kind: String,
    pub message: String,
}
