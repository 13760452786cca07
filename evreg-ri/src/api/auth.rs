//! Request signing middleware for admin routes
//!
//! Validates the `x-evreg-timestamp` / `x-evreg-hash` headers against the
//! shared secret. See `evreg_common::api::auth` for the signing scheme.

use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use evreg_common::api::auth::{
    now_millis, signing_payload, validate_hash, validate_timestamp, ApiAuthError, HASH_HEADER,
    TIMESTAMP_HEADER,
};
use serde_json::Value;
use tracing::warn;

use crate::error::ApiError;
use crate::AppState;

/// Largest body accepted on signed routes (CSV uploads included)
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Authentication middleware
///
/// Returns 401 when the signature is missing, stale or wrong. A shared
/// secret of 0 disables checking.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if state.shared_secret == 0 {
        return Ok(next.run(request).await);
    }

    let (parts, body) = request.into_parts();

    let timestamp = header_value(&parts.headers, TIMESTAMP_HEADER)
        .ok_or(ApiAuthError::MissingTimestamp)
        .and_then(|raw| {
            raw.parse::<i64>()
                .map_err(|e| ApiAuthError::ParseError(format!("timestamp: {}", e)))
        })
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;
    let hash = header_value(&parts.headers, HASH_HEADER)
        .ok_or_else(|| ApiError::Unauthorized(ApiAuthError::MissingHash.to_string()))?
        .to_string();

    validate_timestamp(timestamp, now_millis())
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    let body_bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read body: {}", e)))?;

    let body_json = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes)
            .map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {}", e)))?
    };

    let payload = signing_payload(parts.method.as_str(), parts.uri.path(), timestamp, body_json);
    validate_hash(&hash, &payload, state.shared_secret).map_err(|e| {
        warn!(path = %parts.uri.path(), method = %parts.method, "Hash validation failed");
        ApiError::Unauthorized(e.to_string())
    })?;

    // Restore the consumed body for the handler
    let request = Request::from_parts(parts, Body::from(body_bytes));
    Ok(next.run(request).await)
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}
