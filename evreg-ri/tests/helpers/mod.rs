//! Test Helper Utilities
//!
//! Shared setup for evreg-ri integration tests

#![allow(dead_code)]

use axum::body::Body;
use axum::http::Request;
use evreg_common::db::UserRole;
use evreg_ri::db::users::{create_user, update_profile, NewUser, ProfileUpdate};
use serde_json::Value;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// On-disk database plus a CSV directory, both inside one temp dir
pub struct TestEnv {
    pub dir: TempDir,
    pub db: SqlitePool,
    pub csv_dir: PathBuf,
}

impl TestEnv {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db = evreg_common::db::init_database(&dir.path().join("evreg.db"))
            .await
            .expect("Failed to init database");
        let csv_dir = dir.path().join("csv");
        std::fs::create_dir_all(&csv_dir).expect("Failed to create CSV dir");

        Self { dir, db, csv_dir }
    }

    pub fn write_csv(&self, name: &str, content: &str) -> PathBuf {
        write_file(&self.csv_dir, name, content)
    }
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("Failed to write file");
    path
}

/// Register a campus ambassador with the given phone number
///
/// A `complete` ambassador also gets a year of study and district, which
/// marks the profile complete.
pub async fn seed_ambassador(db: &SqlitePool, name: &str, phone_no: &str, complete: bool) -> i64 {
    let user_id = create_user(
        db,
        &NewUser {
            name: Some(name.to_string()),
            email: Some(format!("{}@example.com", phone_no)),
            phone_no: Some(phone_no.to_string()),
            college_name: Some("Test College".to_string()),
            role: UserRole::CampusAmbassador,
        },
    )
    .await
    .expect("Failed to create user");

    if complete {
        let profile = ProfileUpdate {
            year_of_study: Some(2),
            district: Some("Ernakulam".to_string()),
            ..Default::default()
        };
        update_profile(db, user_id, &profile)
            .await
            .expect("Failed to complete profile");
    }

    user_id
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}
