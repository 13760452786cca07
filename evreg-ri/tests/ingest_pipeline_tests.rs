//! End-to-end ingestion against the SQLite stores
//!
//! Covers directory enumeration, resume from watermark, idempotent reruns
//! and the same referral code appearing across events.

mod helpers;

use evreg_ri::build_reconciler;
use evreg_ri::db::watermarks::get_watermark;
use evreg_ri::ingest::{IngestError, Source};
use helpers::{seed_ambassador, TestEnv};

const HACKATHON: &str = "\
name,collegeName,referralCode
Asha,ABC Institute,9876543210
Ravi,XYZ College,0000000000
";

async fn referral_count(db: &sqlx::SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM referrals")
        .fetch_one(db)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_directory_ingestion_inserts_valid_referrals() {
    let env = TestEnv::new().await;
    seed_ambassador(&env.db, "Meera", "9876543210", true).await;
    env.write_csv("Hackathon2024.csv", HACKATHON);

    let reconciler = build_reconciler(&env.db);
    let summary = reconciler.ingest_directory(&env.csv_dir).await.unwrap();

    let report = summary.source("Hackathon2024.csv").unwrap();
    assert!(report.is_success());
    assert_eq!(report.event_name, "Hackathon2024");
    assert_eq!(report.rows_total, 2);
    assert_eq!(report.rows_inserted, 1);
    assert_eq!(report.rows_invalid_code, 1);
    assert_eq!(report.watermark, Some(2));

    let (name, college, code, event, is_paid): (Option<String>, Option<String>, String, String, bool) =
        sqlx::query_as(
            "SELECT name, college_name, referral_code, event_name, is_paid FROM referrals",
        )
        .fetch_one(&env.db)
        .await
        .unwrap();
    assert_eq!(name.as_deref(), Some("Asha"));
    assert_eq!(college.as_deref(), Some("ABC Institute"));
    assert_eq!(code, "9876543210");
    assert_eq!(event, "Hackathon2024");
    assert!(!is_paid);

    assert_eq!(
        get_watermark(&env.db, "Hackathon2024.csv").await.unwrap(),
        Some(2)
    );
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let env = TestEnv::new().await;
    seed_ambassador(&env.db, "Meera", "9876543210", true).await;
    env.write_csv("Hackathon2024.csv", HACKATHON);

    let reconciler = build_reconciler(&env.db);
    reconciler.ingest_directory(&env.csv_dir).await.unwrap();
    let second = reconciler.ingest_directory(&env.csv_dir).await.unwrap();

    let report = second.source("Hackathon2024.csv").unwrap();
    assert_eq!(report.rows_new, 0);
    assert_eq!(report.rows_inserted, 0);
    assert_eq!(report.watermark, Some(2));
    assert_eq!(referral_count(&env.db).await, 1);
}

#[tokio::test]
async fn test_appended_rows_resume_from_watermark() {
    let env = TestEnv::new().await;
    seed_ambassador(&env.db, "Meera", "9876543210", true).await;
    seed_ambassador(&env.db, "Kiran", "9123456780", false).await;
    env.write_csv("Hackathon2024.csv", HACKATHON);

    let reconciler = build_reconciler(&env.db);
    reconciler.ingest_directory(&env.csv_dir).await.unwrap();

    env.write_csv(
        "Hackathon2024.csv",
        &format!("{}Nila,DEF University,9123456780\n", HACKATHON),
    );
    let summary = reconciler.ingest_directory(&env.csv_dir).await.unwrap();

    let report = summary.source("Hackathon2024.csv").unwrap();
    assert_eq!(report.previous_watermark, 2);
    assert_eq!(report.rows_new, 1);
    assert_eq!(report.rows_inserted, 1);
    assert_eq!(report.watermark, Some(3));
    assert_eq!(referral_count(&env.db).await, 2);
}

#[tokio::test]
async fn test_same_code_across_events() {
    let env = TestEnv::new().await;
    seed_ambassador(&env.db, "Meera", "9876543210", true).await;
    env.write_csv("Hackathon2024.csv", HACKATHON);
    env.write_csv(
        "RoboWars.csv",
        "Full Name,College Name,Referral Code\nTara,ABC Institute,9876543210\n",
    );
    env.write_csv("notes.txt", "not,a,referral\n");

    let summary = build_reconciler(&env.db)
        .ingest_directory(&env.csv_dir)
        .await
        .unwrap();

    assert_eq!(summary.sources.len(), 2);
    assert_eq!(summary.sources[0].source_id, "Hackathon2024.csv");
    assert_eq!(summary.sources[1].source_id, "RoboWars.csv");
    assert_eq!(summary.rows_inserted(), 2);

    let events: Vec<String> = sqlx::query_scalar(
        "SELECT event_name FROM referrals WHERE referral_code = ? ORDER BY event_name",
    )
    .bind("9876543210")
    .fetch_all(&env.db)
    .await
    .unwrap();
    assert_eq!(events, vec!["Hackathon2024", "RoboWars"]);
}

#[tokio::test]
async fn test_malformed_source_does_not_block_siblings() {
    let env = TestEnv::new().await;
    seed_ambassador(&env.db, "Meera", "9876543210", true).await;
    env.write_csv("Broken.csv", "name,referralCode\n\"Asha,9876543210\n");
    env.write_csv("Hackathon2024.csv", HACKATHON);

    let summary = build_reconciler(&env.db)
        .ingest_directory(&env.csv_dir)
        .await
        .unwrap();

    let broken = summary.source("Broken.csv").unwrap();
    assert_eq!(broken.error.as_ref().unwrap().kind, "parse_error");
    assert_eq!(get_watermark(&env.db, "Broken.csv").await.unwrap(), None);

    assert!(summary.source("Hackathon2024.csv").unwrap().is_success());
    assert_eq!(summary.failed_sources(), 1);
    assert_eq!(referral_count(&env.db).await, 1);
}

#[tokio::test]
async fn test_missing_directory_fails_enumeration() {
    let env = TestEnv::new().await;
    let missing = env.dir.path().join("nope");

    let result = build_reconciler(&env.db).ingest_directory(&missing).await;
    assert!(matches!(result, Err(IngestError::SourceUnavailable { .. })));
}

#[tokio::test]
async fn test_buffer_source_uses_upload_name() {
    let env = TestEnv::new().await;
    seed_ambassador(&env.db, "Meera", "9876543210", true).await;

    let sources = vec![Source::buffer("Quiz.csv", HACKATHON.as_bytes().to_vec())];
    let summary = build_reconciler(&env.db).ingest(&sources).await;

    let report = summary.source("Quiz.csv").unwrap();
    assert_eq!(report.event_name, "Quiz");
    assert_eq!(report.rows_inserted, 1);
    assert_eq!(get_watermark(&env.db, "Quiz.csv").await.unwrap(), Some(2));
}
