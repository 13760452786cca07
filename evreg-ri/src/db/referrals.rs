//! Referral rows

use super::BATCH_SIZE;
use chrono::{DateTime, Utc};
use evreg_common::db::{NewReferral, Referral, User};
use evreg_common::{Error, Result};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

const REFERRAL_COLUMNS: &str =
    "referral_id, name, college_name, referral_code, event_name, is_paid, registered_at, created_at";

/// Referral together with the user its code resolves to
#[derive(Debug, Clone, Serialize)]
pub struct ReferralWithUser {
    #[serde(flatten)]
    pub referral: Referral,
    pub user: Option<User>,
}

/// Insert all records on `conn`
///
/// Run inside a transaction for all-or-nothing semantics. Does not
/// deduplicate against existing rows.
pub async fn bulk_insert(
    conn: &mut SqliteConnection,
    records: &[NewReferral],
    created_at: DateTime<Utc>,
) -> Result<u64> {
    let mut inserted = 0;

    for chunk in records.chunks(BATCH_SIZE) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO referrals (name, college_name, referral_code, event_name, is_paid, registered_at, created_at) ",
        );
        builder.push_values(chunk, |mut row, record| {
            row.push_bind(record.name.clone())
                .push_bind(record.college_name.clone())
                .push_bind(record.referral_code.clone())
                .push_bind(record.event_name.clone())
                .push_bind(record.is_paid)
                .push_bind(record.registered_at)
                .push_bind(created_at);
        });

        let result = builder.build().execute(&mut *conn).await?;
        inserted += result.rows_affected();
    }

    Ok(inserted)
}

/// Unpaid referrals carrying `referral_code`, oldest first, with the referring user
pub async fn list_unpaid_by_code(
    pool: &SqlitePool,
    referral_code: &str,
) -> Result<Vec<ReferralWithUser>> {
    let referrals = sqlx::query_as::<_, Referral>(&format!(
        "SELECT {} FROM referrals WHERE referral_code = ? AND is_paid = 0 ORDER BY registered_at, referral_id",
        REFERRAL_COLUMNS
    ))
    .bind(referral_code)
    .fetch_all(pool)
    .await?;

    let user = super::users::find_by_phone(pool, referral_code).await?;

    Ok(referrals
        .into_iter()
        .map(|referral| ReferralWithUser {
            referral,
            user: user.clone(),
        })
        .collect())
}

pub async fn find_referral(pool: &SqlitePool, referral_id: i64) -> Result<Option<Referral>> {
    let referral = sqlx::query_as::<_, Referral>(&format!(
        "SELECT {} FROM referrals WHERE referral_id = ?",
        REFERRAL_COLUMNS
    ))
    .bind(referral_id)
    .fetch_optional(pool)
    .await?;

    Ok(referral)
}

/// Mark a referral as paid and return the updated row
pub async fn mark_paid(pool: &SqlitePool, referral_id: i64) -> Result<Referral> {
    let result = sqlx::query("UPDATE referrals SET is_paid = 1 WHERE referral_id = ?")
        .bind(referral_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Referral {} not found", referral_id)));
    }

    find_referral(pool, referral_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Referral {} not found", referral_id)))
}
