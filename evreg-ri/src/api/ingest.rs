//! CSV referral ingestion endpoints
//!
//! POST /admin/process-csvs, POST /admin/upload-csvs, GET /admin/watermarks

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use evreg_common::db::IngestionWatermark;
use serde::Deserialize;
use std::path::Path;

use crate::error::{ApiError, ApiResult};
use crate::ingest::{IngestError, IngestionSummary, Source};
use crate::AppState;

/// POST /admin/upload-csvs request
#[derive(Debug, Deserialize)]
pub struct UploadCsvsRequest {
    pub files: Vec<UploadedCsv>,
}

/// One uploaded CSV; `name` becomes the watermark key
#[derive(Debug, Deserialize)]
pub struct UploadedCsv {
    pub name: String,
    pub content: String,
}

/// POST /admin/process-csvs
///
/// Ingest every CSV file in the configured directory.
pub async fn process_csvs(State(state): State<AppState>) -> ApiResult<Json<IngestionSummary>> {
    if !state.csv_dir.is_dir() {
        return Err(ApiError::NotFound(format!(
            "CSV directory not found: {}",
            state.csv_dir.display()
        )));
    }

    let summary = state
        .reconciler
        .ingest_directory(&state.csv_dir)
        .await
        .map_err(|e| match e {
            IngestError::SourceUnavailable { .. } => ApiError::NotFound(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        })?;

    tracing::info!(
        run_id = %summary.run_id,
        sources = summary.sources.len(),
        rows_inserted = summary.rows_inserted(),
        failed_sources = summary.failed_sources(),
        "CSV directory processing completed"
    );

    Ok(Json(summary))
}

/// POST /admin/upload-csvs
///
/// Ingest CSV buffers sent in the request body.
pub async fn upload_csvs(
    State(state): State<AppState>,
    Json(request): Json<UploadCsvsRequest>,
) -> ApiResult<Json<IngestionSummary>> {
    if request.files.is_empty() {
        return Err(ApiError::BadRequest("No files were uploaded".to_string()));
    }

    let mut sources = Vec::with_capacity(request.files.len());
    for file in request.files {
        let name = upload_name(&file.name).ok_or_else(|| {
            ApiError::BadRequest(format!("Invalid file name: {:?}", file.name))
        })?;
        sources.push(Source::buffer(name, file.content.into_bytes()));
    }

    let summary = state.reconciler.ingest(&sources).await;

    tracing::info!(
        run_id = %summary.run_id,
        sources = summary.sources.len(),
        rows_inserted = summary.rows_inserted(),
        failed_sources = summary.failed_sources(),
        "Uploaded CSV processing completed"
    );

    Ok(Json(summary))
}

/// GET /admin/watermarks
pub async fn list_watermarks(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<IngestionWatermark>>> {
    let watermarks = crate::db::watermarks::list_watermarks(&state.db).await?;
    Ok(Json(watermarks))
}

/// Final path component of an uploaded file name
fn upload_name(raw: &str) -> Option<String> {
    Path::new(raw.trim())
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}

pub fn ingest_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/process-csvs", post(process_csvs))
        .route("/admin/upload-csvs", post(upload_csvs))
        .route("/admin/watermarks", get(list_watermarks))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_name_strips_directories() {
        assert_eq!(upload_name("Hackathon2024.csv").as_deref(), Some("Hackathon2024.csv"));
        assert_eq!(upload_name("../../etc/Expo.csv").as_deref(), Some("Expo.csv"));
        assert_eq!(upload_name("  "), None);
        assert_eq!(upload_name(".."), None);
    }
}
