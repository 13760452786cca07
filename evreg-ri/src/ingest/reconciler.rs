//! Referral reconciliation engine
//!
//! Per source, as one unit under the source's lock:
//! 1. read and parse the full source
//! 2. read the watermark (absent = 0)
//! 3. take the rows from the watermark onwards
//! 4. resolve referral codes and look the distinct ones up once
//! 5. build referrals for rows with a valid code
//! 6. commit referrals and the new watermark (= total rows) atomically
//!
//! Sources are assumed append-only: rows before the watermark are never
//! re-examined. A failure on one source is recorded in its report and the
//! next source proceeds.

use super::error::IngestError;
use super::fields::{
    parse_registered_at, resolve_field, COLLEGE_NAME_ALIASES, NAME_ALIASES,
    REFERRAL_CODE_ALIASES, REGISTERED_AT_FIELD,
};
use super::locks::SourceLocks;
use super::records::{parse_records, CsvRecord};
use super::sources::{enumerate_directory, Source, CSV_EXTENSION};
use super::store::{CommitOutcome, ReferralStore, SourceCommit, UserDirectory};
use super::summary::{IngestionSummary, SourceReport};
use chrono::{DateTime, Utc};
use evreg_common::db::NewReferral;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ReferralReconciler {
    store: Arc<dyn ReferralStore>,
    users: Arc<dyn UserDirectory>,
    locks: SourceLocks,
}

impl ReferralReconciler {
    pub fn new(store: Arc<dyn ReferralStore>, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            store,
            users,
            locks: SourceLocks::new(),
        }
    }

    /// Ingest every `*.csv` file in `dir`
    ///
    /// Fails only when the directory itself cannot be listed.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<IngestionSummary, IngestError> {
        let sources = enumerate_directory(dir, CSV_EXTENSION).await?;
        info!(
            dir = %dir.display(),
            sources = sources.len(),
            "Enumerated CSV sources"
        );
        Ok(self.ingest(&sources).await)
    }

    /// Ingest sources one after another, isolating failures per source
    pub async fn ingest(&self, sources: &[Source]) -> IngestionSummary {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut reports = Vec::with_capacity(sources.len());

        for source in sources {
            let mut report = SourceReport::new(source.id(), source.event_name());

            match self.ingest_source(source, &mut report).await {
                Ok(()) => info!(
                    %run_id,
                    source_id = %report.source_id,
                    rows_total = report.rows_total,
                    rows_new = report.rows_new,
                    rows_inserted = report.rows_inserted,
                    rows_without_code = report.rows_without_code,
                    rows_invalid_code = report.rows_invalid_code,
                    "Source ingested"
                ),
                Err(err) => {
                    error!(
                        %run_id,
                        source_id = %report.source_id,
                        kind = err.kind(),
                        error = %err,
                        "Source ingestion failed; watermark left unchanged"
                    );
                    report.fail(&err);
                }
            }

            reports.push(report);
        }

        IngestionSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            sources: reports,
        }
    }

    async fn ingest_source(
        &self,
        source: &Source,
        report: &mut SourceReport,
    ) -> Result<(), IngestError> {
        let source_id = report.source_id.clone();
        let _guard = self.locks.acquire(&source_id).await;
        let now = Utc::now();

        let content = source.read().await?;
        let records = parse_records(&content).map_err(|error| IngestError::Parse {
            source_id: source_id.clone(),
            error,
        })?;
        let total = records.len() as u64;
        report.rows_total = total;

        let stored = self
            .store
            .get_watermark(&source_id)
            .await
            .map_err(|error| IngestError::WatermarkRead {
                source_id: source_id.clone(),
                error,
            })?;
        let previous = stored.unwrap_or(0);
        report.previous_watermark = previous;

        if previous > total {
            warn!(
                source_id = %source_id,
                watermark = previous,
                rows_total = total,
                "Source has fewer rows than its watermark; keeping watermark"
            );
        }

        let new_rows: &[CsvRecord] = if previous >= total {
            &[]
        } else {
            &records[previous as usize..]
        };
        report.rows_new = new_rows.len() as u64;

        let referrals = if new_rows.is_empty() {
            debug!(source_id = %source_id, "No new rows");
            Vec::new()
        } else {
            let candidates = collect_referral_codes(new_rows);
            let valid = if candidates.is_empty() {
                HashSet::new()
            } else {
                self.users
                    .find_existing_phone_numbers(&candidates)
                    .await
                    .map_err(|error| IngestError::ValidationLookup {
                        source_id: source_id.clone(),
                        error,
                    })?
            };

            let batch = build_referrals(new_rows, &valid, &report.event_name, now);
            report.rows_without_code = batch.without_code;
            report.rows_invalid_code = batch.invalid_code;
            batch.referrals
        };

        let processed_rows = previous.max(total);
        let outcome = self
            .store
            .commit_source(SourceCommit {
                source_id: &source_id,
                records: &referrals,
                expected_watermark: stored,
                processed_rows,
                at: now,
            })
            .await
            .map_err(|error| IngestError::Insert {
                source_id: source_id.clone(),
                error,
            })?;

        match outcome {
            CommitOutcome::Committed { inserted } => {
                report.rows_inserted = inserted;
                report.watermark = Some(processed_rows);
                Ok(())
            }
            CommitOutcome::WatermarkMoved => Err(IngestError::WatermarkConflict {
                source_id,
                expected: stored,
            }),
        }
    }
}

/// Distinct referral codes across `rows`
pub fn collect_referral_codes(rows: &[CsvRecord]) -> BTreeSet<String> {
    rows.iter()
        .filter_map(|row| resolve_field(row, REFERRAL_CODE_ALIASES))
        .map(str::to_string)
        .collect()
}

/// Referrals built from one source's new rows
#[derive(Debug, Default)]
pub struct ReferralBatch {
    pub referrals: Vec<NewReferral>,
    pub without_code: u64,
    pub invalid_code: u64,
}

/// Turn rows into referrals, dropping rows without a code or with a code
/// missing from `valid_codes`
pub fn build_referrals(
    rows: &[CsvRecord],
    valid_codes: &HashSet<String>,
    event_name: &str,
    now: DateTime<Utc>,
) -> ReferralBatch {
    let mut batch = ReferralBatch::default();

    for row in rows {
        let Some(code) = resolve_field(row, REFERRAL_CODE_ALIASES) else {
            batch.without_code += 1;
            continue;
        };

        if !valid_codes.contains(code) {
            debug!(referral_code = code, event_name, "Skipping invalid referral code");
            batch.invalid_code += 1;
            continue;
        }

        let registered_at = row
            .get(REGISTERED_AT_FIELD)
            .and_then(parse_registered_at)
            .unwrap_or(now);

        batch.referrals.push(NewReferral {
            name: resolve_field(row, NAME_ALIASES).map(str::to_string),
            college_name: resolve_field(row, COLLEGE_NAME_ALIASES).map(str::to_string),
            referral_code: code.to_string(),
            event_name: event_name.to_string(),
            is_paid: false,
            registered_at,
        });
    }

    batch
}
