//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum UserRole {
    /// Campus ambassador; the phone number doubles as referral code
    #[serde(rename = "CA")]
    #[sqlx(rename = "CA")]
    CampusAmbassador,
    #[serde(rename = "admin")]
    #[sqlx(rename = "admin")]
    Admin,
}

/// Registered account
///
/// The profile is complete once name, phone number, college, year of study
/// and district are all set.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub user_id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_no: Option<String>,
    pub college_name: Option<String>,
    pub year_of_study: Option<i64>,
    pub district: Option<String>,
    pub role: UserRole,
    pub is_profile_complete: bool,
    pub points: i64,
    pub storage_usage: i64,
    pub created_at: DateTime<Utc>,
}

/// Stored referral row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Referral {
    pub referral_id: i64,
    pub name: Option<String>,
    pub college_name: Option<String>,
    pub referral_code: String,
    pub event_name: String,
    pub is_paid: bool,
    pub registered_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Referral row produced by ingestion, not yet stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReferral {
    pub name: Option<String>,
    pub college_name: Option<String>,
    pub referral_code: String,
    pub event_name: String,
    pub is_paid: bool,
    pub registered_at: DateTime<Utc>,
}

/// Per-source ingestion watermark
///
/// `last_processed_line` counts parsed rows (not file lines) seen by the
/// last successful pass over the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct IngestionWatermark {
    pub source_id: String,
    pub last_processed_line: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum UploadCategory {
    Poster,
    Whatsapp,
    Instagram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Upload {
    pub upload_id: i64,
    pub user_id: i64,
    pub file_path: Option<String>,
    pub category: UploadCategory,
    pub status: UploadStatus,
    pub file_size: i64,
    pub created_at: DateTime<Utc>,
}
