//! Database initialization
//!
//! Opens (or creates) the SQLite database and creates every table the
//! services use. All statements are idempotent, so calling this on an
//! existing database is safe.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas go on the connect options so every pooled connection gets them
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let options = SqliteConnectOptions::from_str(&db_url)?
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Open a private in-memory database with the full schema
///
/// Limited to a single connection: every connection to `sqlite::memory:`
/// would otherwise see its own empty database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_users_table(pool).await?;
    create_referrals_table(pool).await?;
    create_processing_metadata_table(pool).await?;
    create_uploads_table(pool).await?;
    sync_columns(pool, "users", USER_PROFILE_COLUMNS).await?;
    Ok(())
}

/// Profile columns added after the first release of the `users` table
const USER_PROFILE_COLUMNS: &[(&str, &str)] = &[
    ("year_of_study", "INTEGER CHECK (year_of_study BETWEEN 1 AND 6)"),
    ("district", "TEXT"),
];

/// Add any of `columns` missing from `table` (databases created by older versions)
async fn sync_columns(pool: &SqlitePool, table: &str, columns: &[(&str, &str)]) -> Result<()> {
    let existing: Vec<String> = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| row.get::<String, _>("name"))
        .collect();

    for (name, definition) in columns {
        if existing.iter().any(|column| column == name) {
            continue;
        }

        let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, name, definition);
        match sqlx::query(&sql).execute(pool).await {
            Ok(_) => info!("Added column {}.{}", table, name),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
                // Another connection added it concurrently
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT,
            email TEXT UNIQUE,
            phone_no TEXT UNIQUE,
            college_name TEXT,
            year_of_study INTEGER CHECK (year_of_study BETWEEN 1 AND 6),
            district TEXT,
            role TEXT NOT NULL DEFAULT 'CA' CHECK (role IN ('CA', 'admin')),
            is_profile_complete INTEGER NOT NULL DEFAULT 0,
            points INTEGER NOT NULL DEFAULT 0,
            storage_usage INTEGER NOT NULL DEFAULT 0 CHECK (storage_usage >= 0),
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_referrals_table(pool: &SqlitePool) -> Result<()> {
    // referral_code is a soft reference to users.phone_no (no foreign key)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS referrals (
            referral_id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT,
            college_name TEXT,
            referral_code TEXT NOT NULL,
            event_name TEXT NOT NULL,
            is_paid INTEGER NOT NULL DEFAULT 0,
            registered_at TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_referrals_referral_code ON referrals(referral_code)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_processing_metadata_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processing_metadata (
            source_id TEXT PRIMARY KEY,
            last_processed_line INTEGER NOT NULL CHECK (last_processed_line >= 0),
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_uploads_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS uploads (
            upload_id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
            file_path TEXT,
            category TEXT NOT NULL CHECK (category IN ('poster', 'whatsapp', 'instagram')),
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'approved', 'rejected')),
            file_size INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_uploads_user_id ON uploads(user_id)")
        .execute(pool)
        .await?;

    Ok(())
}
