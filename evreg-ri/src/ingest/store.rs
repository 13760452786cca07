//! Storage seams used by the reconciler
//!
//! The SQLite implementations live in `crate::db`; tests substitute
//! in-memory fakes to inject failures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evreg_common::db::NewReferral;
use evreg_common::Result;
use std::collections::{BTreeSet, HashSet};

/// Read-only view of registered users
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Subset of `candidates` that are phone numbers of registered users
    async fn find_existing_phone_numbers(
        &self,
        candidates: &BTreeSet<String>,
    ) -> Result<HashSet<String>>;
}

/// Everything one source's pass writes, committed as a unit
#[derive(Debug, Clone)]
pub struct SourceCommit<'a> {
    pub source_id: &'a str,
    pub records: &'a [NewReferral],
    /// Watermark read at the start of the pass (`None` if absent)
    pub expected_watermark: Option<u64>,
    /// New watermark value
    pub processed_rows: u64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Records and watermark are durable
    Committed { inserted: u64 },
    /// The stored watermark no longer matched `expected_watermark`; nothing was written
    WatermarkMoved,
}

/// Referral rows plus per-source watermarks
#[async_trait]
pub trait ReferralStore: Send + Sync {
    async fn get_watermark(&self, source_id: &str) -> Result<Option<u64>>;

    /// Bulk-insert the records and upsert the watermark atomically
    ///
    /// The watermark write is conditioned on the stored value still equal
    /// to `expected_watermark`. On any error nothing is written.
    async fn commit_source(&self, commit: SourceCommit<'_>) -> Result<CommitOutcome>;
}
