//! SQLite implementations of the ingestion storage traits

use crate::ingest::{CommitOutcome, ReferralStore, SourceCommit, UserDirectory};
use async_trait::async_trait;
use evreg_common::Result;
use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashSet};

/// Referral rows and watermarks in the shared database
#[derive(Clone)]
pub struct SqliteReferralStore {
    pool: SqlitePool,
}

impl SqliteReferralStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReferralStore for SqliteReferralStore {
    async fn get_watermark(&self, source_id: &str) -> Result<Option<u64>> {
        let value = super::watermarks::get_watermark(&self.pool, source_id).await?;
        Ok(value.map(|v| v.max(0) as u64))
    }

    async fn commit_source(&self, commit: SourceCommit<'_>) -> Result<CommitOutcome> {
        let mut tx = self.pool.begin().await?;

        let inserted = super::referrals::bulk_insert(&mut tx, commit.records, commit.at).await?;

        let advanced = super::watermarks::upsert_watermark(
            &mut tx,
            commit.source_id,
            commit.expected_watermark.map(|v| v as i64),
            commit.processed_rows as i64,
            commit.at,
        )
        .await?;

        if !advanced {
            tx.rollback().await?;
            return Ok(CommitOutcome::WatermarkMoved);
        }

        tx.commit().await?;
        Ok(CommitOutcome::Committed { inserted })
    }
}

/// Phone-number lookups against the `users` table
#[derive(Clone)]
pub struct SqliteUserDirectory {
    pool: SqlitePool,
}

impl SqliteUserDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for SqliteUserDirectory {
    async fn find_existing_phone_numbers(
        &self,
        candidates: &BTreeSet<String>,
    ) -> Result<HashSet<String>> {
        super::users::find_existing_phone_numbers(&self.pool, candidates).await
    }
}
