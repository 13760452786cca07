//! Upload registration and moderation
//!
//! Registered uploads start `pending` and are charged to the owner's storage
//! usage. An admin either approves one (awarding points to its owner) or
//! rejects it (releasing the owner's storage usage). Both transitions are
//! final.

use chrono::Utc;
use evreg_common::db::{Upload, UploadCategory, UploadStatus, User, UserRole};
use evreg_common::{Error, Result};
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::path::Path;

const UPLOAD_COLUMNS: &str = "upload_id, user_id, file_path, category, status, file_size, created_at";

/// Largest accepted file (1.5 MiB)
pub const MAX_FILE_SIZE: i64 = 1_572_864;

/// Files accepted per registration request
pub const MAX_FILES_PER_REQUEST: usize = 3;

const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// Directory new uploads are filed under until moderated
pub const PENDING_DIR: &str = "public/uploads/pending";

/// Optional filters for listing uploads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadFilter {
    pub category: Option<UploadCategory>,
    pub status: Option<UploadStatus>,
    /// Case-insensitive substring of the owner's name
    pub username: Option<String>,
    pub user_id: Option<i64>,
    pub upload_id: Option<i64>,
}

/// Reasons a whole registration request is refused
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UploadRejection {
    #[error("No files were uploaded")]
    NoFiles,

    #[error("You can upload a maximum of 3 files at once")]
    TooManyFiles,

    #[error("User quota exhausted ({usage} of {limit} bytes used)")]
    QuotaExhausted { usage: i64, limit: i64 },

    #[error("Only admins can upload posters")]
    PosterRequiresAdmin,
}

/// Request-level checks, in the order they are reported
///
/// `storage_limit` of `None` means no quota.
pub fn check_registration(
    user: &User,
    category: UploadCategory,
    file_count: usize,
    storage_limit: Option<i64>,
) -> std::result::Result<(), UploadRejection> {
    if file_count == 0 {
        return Err(UploadRejection::NoFiles);
    }
    if let Some(limit) = storage_limit {
        if user.storage_usage > limit {
            return Err(UploadRejection::QuotaExhausted {
                usage: user.storage_usage,
                limit,
            });
        }
    }
    if category == UploadCategory::Poster && user.role != UserRole::Admin {
        return Err(UploadRejection::PosterRequiresAdmin);
    }
    if file_count > MAX_FILES_PER_REQUEST {
        return Err(UploadRejection::TooManyFiles);
    }
    Ok(())
}

/// Per-file check; the error is the reason reported for that file
pub fn check_file(name: &str, file_size: i64) -> std::result::Result<(), &'static str> {
    let extension = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => {}
        _ => return Err("Invalid file extension"),
    }

    if file_size <= 0 {
        return Err("File is empty");
    }
    if file_size > MAX_FILE_SIZE {
        return Err("File size exceeds limit");
    }
    Ok(())
}

/// Storage path for a newly registered file
pub fn pending_path(user_id: i64, name: &str) -> String {
    format!(
        "{}/{}_{}_{}",
        PENDING_DIR,
        user_id,
        Utc::now().timestamp_millis(),
        name
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationDecision {
    Approve { points: i64 },
    Reject,
}

/// Record a stored upload and charge its size to the owner
pub async fn create_upload(
    pool: &SqlitePool,
    user_id: i64,
    file_path: &str,
    category: UploadCategory,
    file_size: i64,
) -> Result<i64> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO uploads (user_id, file_path, category, status, file_size, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(file_path)
    .bind(category)
    .bind(UploadStatus::Pending)
    .bind(file_size)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE users SET storage_usage = storage_usage + ? WHERE user_id = ?")
        .bind(file_size)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(result.last_insert_rowid())
}

pub async fn find_upload(pool: &SqlitePool, upload_id: i64) -> Result<Option<Upload>> {
    let upload = sqlx::query_as::<_, Upload>(&format!(
        "SELECT {} FROM uploads WHERE upload_id = ?",
        UPLOAD_COLUMNS
    ))
    .bind(upload_id)
    .fetch_optional(pool)
    .await?;

    Ok(upload)
}

/// Uploads matching `filter`, newest first
pub async fn list_uploads(pool: &SqlitePool, filter: &UploadFilter) -> Result<Vec<Upload>> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM uploads WHERE 1 = 1",
        UPLOAD_COLUMNS
    ));

    if let Some(category) = filter.category {
        builder.push(" AND category = ").push_bind(category);
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status);
    }
    if let Some(user_id) = filter.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(username) = filter.username.as_deref().filter(|name| !name.is_empty()) {
        // LIKE is case-insensitive for ASCII in SQLite
        builder
            .push(" AND user_id IN (SELECT user_id FROM users WHERE name LIKE '%' || ")
            .push_bind(username.to_string())
            .push(" || '%')");
    }
    if let Some(upload_id) = filter.upload_id {
        builder.push(" AND upload_id = ").push_bind(upload_id);
    }
    builder.push(" ORDER BY created_at DESC, upload_id DESC");

    let uploads = builder.build_query_as::<Upload>().fetch_all(pool).await?;
    Ok(uploads)
}

/// Apply a moderation decision to a pending upload
pub async fn moderate_upload(
    pool: &SqlitePool,
    upload_id: i64,
    decision: ModerationDecision,
) -> Result<Upload> {
    if let ModerationDecision::Approve { points } = decision {
        if points < 0 {
            return Err(Error::InvalidInput(
                "Points must be provided and non-negative when approving an upload".to_string(),
            ));
        }
    }

    let mut tx = pool.begin().await?;

    let upload = sqlx::query_as::<_, Upload>(&format!(
        "SELECT {} FROM uploads WHERE upload_id = ?",
        UPLOAD_COLUMNS
    ))
    .bind(upload_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Upload {} not found", upload_id)))?;

    if upload.status != UploadStatus::Pending {
        return Err(Error::InvalidInput(
            "Only pending uploads can be approved/rejected".to_string(),
        ));
    }

    // Status condition guards against a concurrent moderation of the same upload
    let updated = match decision {
        ModerationDecision::Approve { points } => {
            let result = sqlx::query(
                "UPDATE uploads SET status = ? WHERE upload_id = ? AND status = ?",
            )
            .bind(UploadStatus::Approved)
            .bind(upload_id)
            .bind(UploadStatus::Pending)
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE users SET points = points + ? WHERE user_id = ?")
                .bind(points)
                .bind(upload.user_id)
                .execute(&mut *tx)
                .await?;

            result.rows_affected()
        }
        ModerationDecision::Reject => {
            let result = sqlx::query(
                "UPDATE uploads SET status = ?, file_path = NULL WHERE upload_id = ? AND status = ?",
            )
            .bind(UploadStatus::Rejected)
            .bind(upload_id)
            .bind(UploadStatus::Pending)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE users SET storage_usage = MAX(storage_usage - ?, 0) WHERE user_id = ?",
            )
            .bind(upload.file_size)
            .bind(upload.user_id)
            .execute(&mut *tx)
            .await?;

            result.rows_affected()
        }
    };

    if updated != 1 {
        tx.rollback().await?;
        return Err(Error::InvalidInput(
            "Only pending uploads can be approved/rejected".to_string(),
        ));
    }

    tx.commit().await?;

    find_upload(pool, upload_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Upload {} not found", upload_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::users::{create_user, find_by_id, NewUser};
    use evreg_common::db::init_memory_database;

    async fn setup() -> (SqlitePool, i64, i64) {
        let pool = init_memory_database().await.unwrap();
        let user_id = create_user(&pool, &NewUser::default()).await.unwrap();
        let upload_id = create_upload(&pool, user_id, "public/uploads/pending/1_a.png", UploadCategory::Instagram, 1000)
            .await
            .unwrap();
        (pool, user_id, upload_id)
    }

    #[tokio::test]
    async fn test_approve_awards_points() {
        let (pool, user_id, upload_id) = setup().await;

        let upload = moderate_upload(&pool, upload_id, ModerationDecision::Approve { points: 15 })
            .await
            .unwrap();
        assert_eq!(upload.status, UploadStatus::Approved);
        assert!(upload.file_path.is_some());

        let user = find_by_id(&pool, user_id).await.unwrap().unwrap();
        assert_eq!(user.points, 15);
        assert_eq!(user.storage_usage, 1000);
    }

    #[tokio::test]
    async fn test_reject_releases_storage() {
        let (pool, user_id, upload_id) = setup().await;

        let upload = moderate_upload(&pool, upload_id, ModerationDecision::Reject)
            .await
            .unwrap();
        assert_eq!(upload.status, UploadStatus::Rejected);
        assert!(upload.file_path.is_none());

        let user = find_by_id(&pool, user_id).await.unwrap().unwrap();
        assert_eq!(user.storage_usage, 0);
        assert_eq!(user.points, 0);
    }

    #[tokio::test]
    async fn test_only_pending_can_be_moderated() {
        let (pool, _user_id, upload_id) = setup().await;

        moderate_upload(&pool, upload_id, ModerationDecision::Reject)
            .await
            .unwrap();
        let again = moderate_upload(&pool, upload_id, ModerationDecision::Approve { points: 1 }).await;
        assert!(matches!(again, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_approve_requires_points() {
        let (pool, _user_id, upload_id) = setup().await;

        let result = moderate_upload(&pool, upload_id, ModerationDecision::Approve { points: -1 }).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        let upload = find_upload(&pool, upload_id).await.unwrap().unwrap();
        assert_eq!(upload.status, UploadStatus::Pending);
    }

    #[tokio::test]
    async fn test_missing_upload() {
        let pool = init_memory_database().await.unwrap();
        let result = moderate_upload(&pool, 77, ModerationDecision::Reject).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_filters() {
        let (pool, user_id, first) = setup().await;
        create_upload(&pool, user_id, "public/uploads/pending/1_b.png", UploadCategory::Poster, 10)
            .await
            .unwrap();
        moderate_upload(&pool, first, ModerationDecision::Reject).await.unwrap();

        let all = list_uploads(&pool, &UploadFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let pending = list_uploads(
            &pool,
            &UploadFilter {
                status: Some(UploadStatus::Pending),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].category, UploadCategory::Poster);

        let by_id = list_uploads(
            &pool,
            &UploadFilter {
                upload_id: Some(first),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].status, UploadStatus::Rejected);
    }

    #[tokio::test]
    async fn test_list_filters_by_owner() {
        let pool = init_memory_database().await.unwrap();
        let meera = create_user(
            &pool,
            &NewUser {
                name: Some("Meera Nair".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let rahul = create_user(
            &pool,
            &NewUser {
                name: Some("Rahul".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        create_upload(&pool, meera, "a.png", UploadCategory::Whatsapp, 1).await.unwrap();
        create_upload(&pool, rahul, "b.png", UploadCategory::Whatsapp, 1).await.unwrap();

        let by_name = list_uploads(
            &pool,
            &UploadFilter {
                username: Some("mEErA".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].user_id, meera);

        let by_user = list_uploads(
            &pool,
            &UploadFilter {
                user_id: Some(rahul),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(by_user.len(), 1);
        assert_eq!(by_user[0].file_path.as_deref(), Some("b.png"));

        let nobody = list_uploads(
            &pool,
            &UploadFilter {
                username: Some("zed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(nobody.is_empty());
    }

    #[tokio::test]
    async fn test_registration_checks() {
        let pool = init_memory_database().await.unwrap();
        let ca_id = create_user(&pool, &NewUser::default()).await.unwrap();
        let mut ca = find_by_id(&pool, ca_id).await.unwrap().unwrap();

        assert_eq!(
            check_registration(&ca, UploadCategory::Instagram, 0, None),
            Err(UploadRejection::NoFiles)
        );
        assert_eq!(
            check_registration(&ca, UploadCategory::Poster, 1, None),
            Err(UploadRejection::PosterRequiresAdmin)
        );
        assert_eq!(
            check_registration(&ca, UploadCategory::Instagram, 4, None),
            Err(UploadRejection::TooManyFiles)
        );
        assert!(check_registration(&ca, UploadCategory::Instagram, 3, Some(0)).is_ok());

        // Usage equal to the limit is still allowed
        ca.storage_usage = 100;
        assert!(check_registration(&ca, UploadCategory::Whatsapp, 1, Some(100)).is_ok());
        assert_eq!(
            check_registration(&ca, UploadCategory::Whatsapp, 1, Some(99)),
            Err(UploadRejection::QuotaExhausted { usage: 100, limit: 99 })
        );

        ca.role = UserRole::Admin;
        assert!(check_registration(&ca, UploadCategory::Poster, 1, None).is_ok());
    }

    #[test]
    fn test_file_checks() {
        assert!(check_file("story.PNG", 10).is_ok());
        assert!(check_file("story.jpeg", MAX_FILE_SIZE).is_ok());
        assert!(check_file("story.webp", 1).is_ok());

        assert_eq!(check_file("story.gif", 10), Err("Invalid file extension"));
        assert_eq!(check_file("story", 10), Err("Invalid file extension"));
        assert_eq!(check_file("story.png", MAX_FILE_SIZE + 1), Err("File size exceeds limit"));
        assert_eq!(check_file("story.png", 0), Err("File is empty"));
    }
}
