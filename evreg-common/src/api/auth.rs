//! Admin API request signing
//!
//! Every protected request carries two headers:
//! - `x-evreg-timestamp`: Unix epoch milliseconds
//! - `x-evreg-hash`: SHA-256 (64 hex chars) of the canonical signing payload
//!   followed by the shared secret as a decimal i64
//!
//! The signing payload is the JSON object
//! `{"body": <json body or null>, "method": "...", "path": "...", "timestamp": n}`
//! rendered canonically (sorted keys, no whitespace).
//!
//! The shared secret lives in the `settings` table under `api_shared_secret`.
//! A secret of 0 disables checking.
//!
//! This module holds only pure functions and database operations; the axum
//! middleware lives in the service crate.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::time::{SystemTime, UNIX_EPOCH};

/// Header carrying the request timestamp
pub const TIMESTAMP_HEADER: &str = "x-evreg-timestamp";

/// Header carrying the request hash
pub const HASH_HEADER: &str = "x-evreg-hash";

/// Oldest accepted timestamp, relative to now
pub const MAX_PAST_MS: i64 = 30_000;

/// Newest accepted timestamp, relative to now (clock drift only)
pub const MAX_FUTURE_MS: i64 = 1_000;

const SHARED_SECRET_KEY: &str = "api_shared_secret";

/// Authentication error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiAuthError {
    /// Timestamp outside acceptable window
    #[error("Invalid timestamp: {reason}")]
    InvalidTimestamp {
        timestamp: i64,
        now: i64,
        reason: String,
    },

    /// Hash does not match calculated value
    #[error("Invalid hash")]
    InvalidHash { provided: String, calculated: String },

    #[error("Missing timestamp header")]
    MissingTimestamp,

    #[error("Missing hash header")]
    MissingHash,

    /// Database error loading shared secret
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Failed to parse request header or body
    #[error("Parse error: {0}")]
    ParseError(String),
}

// ========================================
// Shared Secret Management
// ========================================

/// Load shared secret from database settings
///
/// Generates and stores a new non-zero secret when none exists.
pub async fn load_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    let result: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(SHARED_SECRET_KEY)
        .fetch_optional(db)
        .await
        .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    match result {
        Some((value,)) => value
            .trim()
            .parse::<i64>()
            .map_err(|e| ApiAuthError::DatabaseError(format!("Invalid i64: {}", e))),
        None => initialize_shared_secret(db).await,
    }
}

/// Generate a cryptographically random non-zero secret and store it
pub async fn initialize_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    let secret: i64 = loop {
        let val = rng.gen::<i64>();
        if val != 0 {
            break val;
        }
    };

    store_shared_secret(db, secret).await?;
    Ok(secret)
}

/// Overwrite the shared secret (0 disables authentication)
pub async fn store_shared_secret(db: &SqlitePool, secret: i64) -> Result<(), ApiAuthError> {
    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
        .bind(SHARED_SECRET_KEY)
        .bind(secret.to_string())
        .execute(db)
        .await
        .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    Ok(())
}

// ========================================
// Timestamp Validation
// ========================================

/// Current Unix time in milliseconds
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Validate a request timestamp against `now`
///
/// Accepts at most [`MAX_PAST_MS`] in the past and [`MAX_FUTURE_MS`] in the
/// future.
pub fn validate_timestamp(timestamp: i64, now: i64) -> Result<(), ApiAuthError> {
    let diff = now - timestamp;

    if diff > MAX_PAST_MS {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!("Timestamp {}ms too old (max {}ms past)", diff, MAX_PAST_MS),
        });
    }

    if diff < -MAX_FUTURE_MS {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!(
                "Timestamp {}ms in future (max {}ms future)",
                diff.abs(),
                MAX_FUTURE_MS
            ),
        });
    }

    Ok(())
}

// ========================================
// Hash Calculation and Validation
// ========================================

/// Build the JSON value a client signs
pub fn signing_payload(method: &str, path: &str, timestamp: i64, body: Value) -> Value {
    json!({
        "body": body,
        "method": method.to_ascii_uppercase(),
        "path": path,
        "timestamp": timestamp,
    })
}

/// Calculate the request hash
///
/// SHA-256 over canonical JSON of `payload` with the decimal secret appended,
/// returned as 64 lowercase hex characters.
///
/// # Examples
///
/// ```
/// use evreg_common::api::auth::{calculate_hash, signing_payload};
/// use serde_json::Value;
///
/// let payload = signing_payload("POST", "/admin/process-csvs", 1730000000000, Value::Null);
/// let hash = calculate_hash(&payload, 123456789);
/// assert_eq!(hash.len(), 64);
/// ```
pub fn calculate_hash(payload: &Value, shared_secret: i64) -> String {
    let canonical = to_canonical_json(payload);
    let to_hash = format!("{}{}", canonical, shared_secret);

    let mut hasher = Sha256::new();
    hasher.update(to_hash.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Convert JSON to canonical form (sorted keys, no whitespace)
///
/// # Examples
///
/// ```
/// use evreg_common::api::auth::to_canonical_json;
/// use serde_json::json;
///
/// let canonical = to_canonical_json(&json!({"z": 3, "a": 1}));
/// assert_eq!(canonical, r#"{"a":1,"z":3}"#);
/// ```
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let items: Vec<String> = pairs
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), to_canonical_json(v)))
                .collect();
            format!("{{{}}}", items.join(","))
        }
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        // serde_json's Display gives compact, correctly escaped scalars
        other => other.to_string(),
    }
}

/// Validate hash matches calculated value
pub fn validate_hash(
    provided_hash: &str,
    payload: &Value,
    shared_secret: i64,
) -> Result<(), ApiAuthError> {
    let calculated = calculate_hash(payload, shared_secret);

    if !provided_hash.eq_ignore_ascii_case(&calculated) {
        return Err(ApiAuthError::InvalidHash {
            provided: provided_hash.to_string(),
            calculated,
        });
    }

    Ok(())
}
