//! Per-source ingestion failures
//!
//! Every variant aborts the source it occurred in and leaves that source's
//! watermark untouched. Sibling sources are unaffected.

use super::records::ParseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Source could not be read at all (missing file, unreadable buffer)
    #[error("Source unavailable: {source_id}: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    /// Content is not well-formed delimited text
    #[error("Malformed CSV in {source_id}: {error}")]
    Parse {
        source_id: String,
        #[source]
        error: ParseError,
    },

    /// The user directory query failed
    #[error("Referral code lookup failed for {source_id}: {error}")]
    ValidationLookup {
        source_id: String,
        #[source]
        error: evreg_common::Error,
    },

    /// The stored watermark could not be read
    #[error("Watermark read failed for {source_id}: {error}")]
    WatermarkRead {
        source_id: String,
        #[source]
        error: evreg_common::Error,
    },

    /// Storing referrals or the watermark failed; nothing was committed
    #[error("Referral insert failed for {source_id}: {error}")]
    Insert {
        source_id: String,
        #[source]
        error: evreg_common::Error,
    },

    /// Another writer advanced the watermark since it was read
    #[error("Watermark for {source_id} changed during ingestion (expected {expected:?})")]
    WatermarkConflict {
        source_id: String,
        expected: Option<u64>,
    },
}

impl IngestError {
    /// Stable machine-readable kind, used in summaries
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::SourceUnavailable { .. } => "source_unavailable",
            IngestError::Parse { .. } => "parse_error",
            IngestError::ValidationLookup { .. } => "validation_lookup_failure",
            IngestError::WatermarkRead { .. } => "watermark_read_failure",
            IngestError::Insert { .. } => "insert_failure",
            IngestError::WatermarkConflict { .. } => "watermark_conflict",
        }
    }
}
