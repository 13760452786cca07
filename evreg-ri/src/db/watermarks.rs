//! Per-source ingestion watermarks (`processing_metadata` table)

use chrono::{DateTime, Utc};
use evreg_common::db::IngestionWatermark;
use evreg_common::Result;
use sqlx::{SqliteConnection, SqlitePool};

/// Stored watermark for `source_id`, if any
pub async fn get_watermark(pool: &SqlitePool, source_id: &str) -> Result<Option<i64>> {
    let value = sqlx::query_scalar(
        "SELECT last_processed_line FROM processing_metadata WHERE source_id = ?",
    )
    .bind(source_id)
    .fetch_optional(pool)
    .await?;

    Ok(value)
}

/// Create or advance the watermark, conditioned on its previous value
///
/// With `expected = None` the row must not exist yet; otherwise the stored
/// value must still equal `expected`. Returns `false` (and writes nothing)
/// when the condition does not hold.
pub async fn upsert_watermark(
    conn: &mut SqliteConnection,
    source_id: &str,
    expected: Option<i64>,
    processed_rows: i64,
    at: DateTime<Utc>,
) -> Result<bool> {
    let result = match expected {
        None => {
            sqlx::query(
                r#"
                INSERT INTO processing_metadata (source_id, last_processed_line, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT(source_id) DO NOTHING
                "#,
            )
            .bind(source_id)
            .bind(processed_rows)
            .bind(at)
            .execute(&mut *conn)
            .await?
        }
        Some(previous) => {
            sqlx::query(
                r#"
                UPDATE processing_metadata
                SET last_processed_line = ?, updated_at = ?
                WHERE source_id = ? AND last_processed_line = ?
                "#,
            )
            .bind(processed_rows)
            .bind(at)
            .bind(source_id)
            .bind(previous)
            .execute(&mut *conn)
            .await?
        }
    };

    Ok(result.rows_affected() == 1)
}

/// All watermarks ordered by source identifier
pub async fn list_watermarks(pool: &SqlitePool) -> Result<Vec<IngestionWatermark>> {
    let rows = sqlx::query_as::<_, IngestionWatermark>(
        "SELECT source_id, last_processed_line, updated_at FROM processing_metadata ORDER BY source_id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use evreg_common::db::init_memory_database;

    #[tokio::test]
    async fn test_conditional_upsert() {
        let pool = init_memory_database().await.unwrap();
        let now = Utc::now();
        let mut conn = pool.acquire().await.unwrap();

        assert!(upsert_watermark(&mut conn, "a.csv", None, 2, now).await.unwrap());
        // Row exists now, a second create is refused
        assert!(!upsert_watermark(&mut conn, "a.csv", None, 9, now).await.unwrap());
        // Stale expectation is refused
        assert!(!upsert_watermark(&mut conn, "a.csv", Some(1), 9, now).await.unwrap());
        assert!(upsert_watermark(&mut conn, "a.csv", Some(2), 5, now).await.unwrap());
        drop(conn);

        assert_eq!(get_watermark(&pool, "a.csv").await.unwrap(), Some(5));
        assert_eq!(get_watermark(&pool, "b.csv").await.unwrap(), None);

        let all = list_watermarks(&pool).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].source_id, "a.csv");
        assert_eq!(all[0].last_processed_line, 5);
    }
}
