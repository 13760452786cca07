//! evreg-ri (Referral Ingest) library
//!
//! Referral CSV ingestion plus the admin HTTP API around it: referral
//! payouts, campus ambassador overview and upload moderation.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::db::{SqliteReferralStore, SqliteUserDirectory};
use crate::ingest::ReferralReconciler;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Referral ingestion engine (holds the per-source locks)
    pub reconciler: ReferralReconciler,
    /// Directory scanned by POST /admin/process-csvs
    pub csv_dir: PathBuf,
    /// Request signing secret; 0 disables authentication
    pub shared_secret: i64,
    /// Per-user storage quota in bytes; `None` means unlimited
    pub user_storage_limit: Option<i64>,
    /// Service startup timestamp for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, csv_dir: PathBuf, shared_secret: i64) -> Self {
        let reconciler = build_reconciler(&db);
        Self {
            db,
            reconciler,
            csv_dir,
            shared_secret,
            user_storage_limit: None,
            startup_time: Utc::now(),
        }
    }

    pub fn with_storage_limit(mut self, limit: Option<i64>) -> Self {
        self.user_storage_limit = limit;
        self
    }
}

/// Reconciler backed by the SQLite stores
pub fn build_reconciler(db: &SqlitePool) -> ReferralReconciler {
    ReferralReconciler::new(
        Arc::new(SqliteReferralStore::new(db.clone())),
        Arc::new(SqliteUserDirectory::new(db.clone())),
    )
}

/// Build application router
///
/// Everything under /admin requires a signed request; /health is public.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;

    let protected = Router::new()
        .merge(api::ingest_routes())
        .merge(api::referral_routes())
        .merge(api::user_routes())
        .merge(api::upload_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    Router::new()
        .merge(protected)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
