//! Referral payout endpoints

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use evreg_common::db::{Referral, User};
use serde::Deserialize;

use crate::db::referrals::ReferralWithUser;
use crate::error::ApiResult;
use crate::AppState;

/// POST /admin/update-referral request
#[derive(Debug, Deserialize)]
pub struct UpdateReferralRequest {
    pub referral_id: i64,
}

/// GET /admin/referrals
///
/// Users with at least one unpaid referral.
pub async fn users_with_unpaid_referrals(State(state): State<AppState>) -> ApiResult<Json<Vec<User>>> {
    let users = crate::db::users::list_with_unpaid_referrals(&state.db).await?;
    Ok(Json(users))
}

/// GET /admin/referrals/:phone_no
pub async fn unpaid_referrals_for_code(
    State(state): State<AppState>,
    Path(phone_no): Path<String>,
) -> ApiResult<Json<Vec<ReferralWithUser>>> {
    let referrals = crate::db::referrals::list_unpaid_by_code(&state.db, &phone_no).await?;
    Ok(Json(referrals))
}

/// POST /admin/update-referral
///
/// Mark a referral as paid.
pub async fn update_referral(
    State(state): State<AppState>,
    Json(request): Json<UpdateReferralRequest>,
) -> ApiResult<Json<Referral>> {
    let referral = crate::db::referrals::mark_paid(&state.db, request.referral_id).await?;
    tracing::info!(
        referral_id = referral.referral_id,
        referral_code = %referral.referral_code,
        "Referral marked as paid"
    );
    Ok(Json(referral))
}

pub fn referral_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/referrals", get(users_with_unpaid_referrals))
        .route("/admin/referrals/:phone_no", get(unpaid_referrals_for_code))
        .route("/admin/update-referral", post(update_referral))
}
