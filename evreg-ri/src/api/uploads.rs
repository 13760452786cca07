//! Upload registration and moderation endpoints

use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use evreg_common::db::{Upload, UploadCategory};
use serde::{Deserialize, Serialize};

use crate::api::users::fetch_user;
use crate::db::uploads::{
    check_file, check_registration, pending_path, ModerationDecision, UploadFilter, UploadRejection,
};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Requested moderation outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    Approved,
    Rejected,
}

/// PUT /admin/uploads/:upload_id request
#[derive(Debug, Deserialize)]
pub struct ModerateUploadRequest {
    pub status: ModerationStatus,
    #[serde(default = "default_points")]
    pub points: i64,
}

fn default_points() -> i64 {
    -1
}

/// One file in a registration request
#[derive(Debug, Clone, Deserialize)]
pub struct UploadFile {
    pub name: String,
    pub file_size: i64,
}

/// POST /admin/users/:user_id/uploads request
#[derive(Debug, Deserialize)]
pub struct RegisterUploadsRequest {
    pub category: UploadCategory,
    #[serde(default)]
    pub files: Vec<UploadFile>,
}

#[derive(Debug, Serialize)]
pub struct SavedFile {
    pub name: String,
    pub upload_id: i64,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct FailedFile {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterUploadsResponse {
    pub saved_files: Vec<SavedFile>,
    pub failed_files: Vec<FailedFile>,
}

impl From<UploadRejection> for ApiError {
    fn from(rejection: UploadRejection) -> Self {
        let message = rejection.to_string();
        match rejection {
            UploadRejection::NoFiles | UploadRejection::TooManyFiles => ApiError::BadRequest(message),
            UploadRejection::QuotaExhausted { .. } => ApiError::QuotaExceeded(message),
            UploadRejection::PosterRequiresAdmin => ApiError::Forbidden(message),
        }
    }
}

/// GET /admin/uploads?category=&status=&username=&user_id=&upload_id=
pub async fn list_uploads(
    State(state): State<AppState>,
    Query(filter): Query<UploadFilter>,
) -> ApiResult<Json<Vec<Upload>>> {
    let uploads = crate::db::uploads::list_uploads(&state.db, &filter).await?;
    Ok(Json(uploads))
}

/// GET /admin/users/:user_id/uploads?category=&status=
pub async fn list_user_uploads(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(filter): Query<UploadFilter>,
) -> ApiResult<Json<Vec<Upload>>> {
    fetch_user(&state, user_id).await?;

    let filter = UploadFilter {
        user_id: Some(user_id),
        username: None,
        ..filter
    };
    let uploads = crate::db::uploads::list_uploads(&state.db, &filter).await?;
    Ok(Json(uploads))
}

/// POST /admin/users/:user_id/uploads
///
/// Files failing the extension or size checks are reported individually;
/// the rest are recorded as pending.
pub async fn register_uploads(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<RegisterUploadsRequest>,
) -> ApiResult<Json<RegisterUploadsResponse>> {
    let user = fetch_user(&state, user_id).await?;
    check_registration(
        &user,
        request.category,
        request.files.len(),
        state.user_storage_limit,
    )?;

    let mut saved_files = Vec::new();
    let mut failed_files = Vec::new();

    for file in request.files {
        if let Err(reason) = check_file(&file.name, file.file_size) {
            failed_files.push(FailedFile {
                name: file.name,
                reason: reason.to_string(),
            });
            continue;
        }

        let path = pending_path(user_id, &file.name);
        let upload_id = crate::db::uploads::create_upload(
            &state.db,
            user_id,
            &path,
            request.category,
            file.file_size,
        )
        .await?;

        saved_files.push(SavedFile {
            name: file.name,
            upload_id,
            path,
        });
    }

    tracing::info!(
        user_id,
        category = ?request.category,
        saved = saved_files.len(),
        failed = failed_files.len(),
        "Uploads registered"
    );

    Ok(Json(RegisterUploadsResponse {
        saved_files,
        failed_files,
    }))
}

/// PUT /admin/uploads/:upload_id
pub async fn moderate_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<i64>,
    Json(request): Json<ModerateUploadRequest>,
) -> ApiResult<Json<Upload>> {
    let decision = match request.status {
        ModerationStatus::Approved => ModerationDecision::Approve {
            points: request.points,
        },
        ModerationStatus::Rejected => ModerationDecision::Reject,
    };

    let upload = crate::db::uploads::moderate_upload(&state.db, upload_id, decision).await?;
    tracing::info!(upload_id, status = ?upload.status, "Upload moderated");
    Ok(Json(upload))
}

pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/uploads", get(list_uploads))
        .route("/admin/uploads/:upload_id", put(moderate_upload))
        .route(
            "/admin/users/:user_id/uploads",
            get(list_user_uploads).post(register_uploads),
        )
}
