//! User accounts, profiles and the campus ambassador overview
//!
//! Sign-in happens elsewhere; the signed admin API addresses users by id.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use evreg_common::db::User;
use serde::Deserialize;

use crate::db::users::{NewUser, ProfileUpdate};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CaQuery {
    /// Only ambassadors with a complete profile; any value but `true` means no
    pub verified: Option<String>,
}

impl CaQuery {
    pub fn verified_only(&self) -> bool {
        self.verified.as_deref() == Some("true")
    }
}

/// GET /admin/cas?verified=true
pub async fn list_cas(
    State(state): State<AppState>,
    Query(query): Query<CaQuery>,
) -> ApiResult<Json<Vec<User>>> {
    let users = crate::db::users::list_campus_ambassadors(&state.db, query.verified_only()).await?;
    Ok(Json(users))
}

/// POST /admin/users
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<NewUser>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user_id = crate::db::users::create_user(&state.db, &request).await?;
    let user = fetch_user(&state, user_id).await?;

    tracing::info!(user_id, role = ?user.role, "User created");
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /admin/users/:user_id
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<User>> {
    Ok(Json(fetch_user(&state, user_id).await?))
}

/// POST /admin/users/:user_id/profile
pub async fn update_profile(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<User>> {
    let user = crate::db::users::update_profile(&state.db, user_id, &update).await?;
    tracing::info!(
        user_id,
        complete = user.is_profile_complete,
        "Profile updated"
    );
    Ok(Json(user))
}

pub(crate) async fn fetch_user(state: &AppState, user_id: i64) -> ApiResult<User> {
    crate::db::users::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {} not found", user_id)))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/cas", get(list_cas))
        .route("/admin/users", post(create_user))
        .route("/admin/users/:user_id", get(get_user))
        .route("/admin/users/:user_id/profile", post(update_profile))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verified_only_requires_literal_true() {
        let query = |value: Option<&str>| CaQuery {
            verified: value.map(str::to_string),
        };

        assert!(query(Some("true")).verified_only());
        assert!(!query(Some("yes")).verified_only());
        assert!(!query(Some("false")).verified_only());
        assert!(!query(Some("TRUE")).verified_only());
        assert!(!query(None).verified_only());
    }
}
