//! User directory queries
//!
//! Accounts are created by the admin API (sign-in itself is handled
//! elsewhere); this service maintains profiles, validates referral codes and
//! serves admin overviews.

use chrono::Utc;
use evreg_common::db::{User, UserRole};
use evreg_common::{Error, Result};
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::{BTreeSet, HashSet};

const USER_COLUMNS: &str = "user_id, name, email, phone_no, college_name, year_of_study, district, role, is_profile_complete, points, storage_usage, created_at";

/// Bind parameters per lookup statement
const LOOKUP_CHUNK: usize = 500;

/// Fields for a new account
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_no: Option<String>,
    pub college_name: Option<String>,
    #[serde(default = "default_role")]
    pub role: UserRole,
}

fn default_role() -> UserRole {
    UserRole::CampusAmbassador
}

impl Default for NewUser {
    fn default() -> Self {
        Self {
            name: None,
            email: None,
            phone_no: None,
            college_name: None,
            role: default_role(),
        }
    }
}

/// Partial profile update; absent fields keep their stored value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone_no: Option<String>,
    pub college_name: Option<String>,
    pub year_of_study: Option<i64>,
    pub district: Option<String>,
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(phone_no) = &self.phone_no {
            validate_phone_no(phone_no)?;
        }
        if let Some(year) = self.year_of_study {
            if !(1..=6).contains(&year) {
                return Err(Error::InvalidInput(
                    "Year of study must be between 1 and 6".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Phone numbers double as referral codes and must be exactly 10 digits
pub fn validate_phone_no(phone_no: &str) -> Result<()> {
    if phone_no.len() == 10 && phone_no.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(Error::InvalidInput(
            "Phone number must be 10 digits".to_string(),
        ))
    }
}

/// Map a uniqueness violation on email/phone to `Error::Conflict`
fn unique_conflict(err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => Error::Conflict(
            "Email or phone number already belongs to another user".to_string(),
        ),
        other => other.into(),
    }
}

pub async fn create_user(pool: &SqlitePool, user: &NewUser) -> Result<i64> {
    if let Some(phone_no) = &user.phone_no {
        validate_phone_no(phone_no)?;
    }

    let result = sqlx::query(
        r#"
        INSERT INTO users (name, email, phone_no, college_name, role, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.phone_no)
    .bind(&user.college_name)
    .bind(user.role)
    .bind(Utc::now())
    .execute(pool)
    .await
    .map_err(unique_conflict)?;

    Ok(result.last_insert_rowid())
}

/// Apply a profile update and return the stored user
///
/// The profile is flagged complete once name, phone number, college, year of
/// study and district are all present. The flag is never cleared.
pub async fn update_profile(pool: &SqlitePool, user_id: i64, update: &ProfileUpdate) -> Result<User> {
    update.validate()?;

    let result = sqlx::query(
        r#"
        UPDATE users SET
            name = COALESCE(?, name),
            phone_no = COALESCE(?, phone_no),
            college_name = COALESCE(?, college_name),
            year_of_study = COALESCE(?, year_of_study),
            district = COALESCE(?, district)
        WHERE user_id = ?
        "#,
    )
    .bind(&update.name)
    .bind(&update.phone_no)
    .bind(&update.college_name)
    .bind(update.year_of_study)
    .bind(&update.district)
    .bind(user_id)
    .execute(pool)
    .await
    .map_err(unique_conflict)?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("User {} not found", user_id)));
    }

    sqlx::query(
        r#"
        UPDATE users SET is_profile_complete = 1
        WHERE user_id = ?
          AND name IS NOT NULL AND name != ''
          AND phone_no IS NOT NULL
          AND college_name IS NOT NULL AND college_name != ''
          AND year_of_study IS NOT NULL
          AND district IS NOT NULL AND district != ''
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await?;

    let user = find_by_id(pool, user_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User {} not found", user_id)))?;

    if user.is_profile_complete {
        tracing::debug!(user_id, "Profile complete");
    }

    Ok(user)
}

/// Subset of `candidates` that are registered phone numbers
pub async fn find_existing_phone_numbers(
    pool: &SqlitePool,
    candidates: &BTreeSet<String>,
) -> Result<HashSet<String>> {
    let candidates: Vec<&String> = candidates.iter().collect();
    let mut existing = HashSet::new();

    for chunk in candidates.chunks(LOOKUP_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT phone_no FROM users WHERE phone_no IN (");
        let mut separated = builder.separated(", ");
        for candidate in chunk {
            separated.push_bind((*candidate).clone());
        }
        separated.push_unseparated(")");

        let found: Vec<String> = builder.build_query_scalar().fetch_all(pool).await?;
        existing.extend(found);
    }

    Ok(existing)
}

pub async fn find_by_phone(pool: &SqlitePool, phone_no: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE phone_no = ?",
        USER_COLUMNS
    ))
    .bind(phone_no)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

pub async fn find_by_id(pool: &SqlitePool, user_id: i64) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE user_id = ?",
        USER_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Users whose phone number has at least one unpaid referral
pub async fn list_with_unpaid_referrals(pool: &SqlitePool) -> Result<Vec<User>> {
    let users = sqlx::query_as::<_, User>(&format!(
        r#"
        SELECT {} FROM users u
        WHERE EXISTS (
            SELECT 1 FROM referrals r
            WHERE r.referral_code = u.phone_no AND r.is_paid = 0
        )
        ORDER BY u.user_id
        "#,
        USER_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    Ok(users)
}

/// Campus ambassadors, optionally only those with a complete profile
pub async fn list_campus_ambassadors(pool: &SqlitePool, verified_only: bool) -> Result<Vec<User>> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM users WHERE role = ",
        USER_COLUMNS
    ));
    builder.push_bind(UserRole::CampusAmbassador);
    if verified_only {
        builder.push(" AND is_profile_complete = 1");
    }
    builder.push(" ORDER BY user_id");

    let users = builder.build_query_as::<User>().fetch_all(pool).await?;
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use evreg_common::db::init_memory_database;

    async fn seed(pool: &SqlitePool) {
        for (phone, role, complete) in [
            ("1111111111", UserRole::CampusAmbassador, true),
            ("2222222222", UserRole::CampusAmbassador, false),
            ("3333333333", UserRole::Admin, true),
        ] {
            let user_id = create_user(
                pool,
                &NewUser {
                    phone_no: Some(phone.to_string()),
                    role,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

            if complete {
                update_profile(pool, user_id, &full_profile()).await.unwrap();
            }
        }
    }

    fn full_profile() -> ProfileUpdate {
        ProfileUpdate {
            name: Some("Asha".to_string()),
            college_name: Some("GEC".to_string()),
            year_of_study: Some(2),
            district: Some("Thrissur".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_find_existing_phone_numbers() {
        let pool = init_memory_database().await.unwrap();
        seed(&pool).await;

        let candidates: BTreeSet<String> = ["1111111111", "0000000000", "3333333333"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let existing = find_existing_phone_numbers(&pool, &candidates).await.unwrap();

        assert_eq!(existing.len(), 2);
        assert!(existing.contains("1111111111"));
        assert!(existing.contains("3333333333"));

        let none = find_existing_phone_numbers(&pool, &BTreeSet::new()).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_large_candidate_set_is_chunked() {
        let pool = init_memory_database().await.unwrap();
        seed(&pool).await;

        let mut candidates: BTreeSet<String> = (0..1200).map(|i| format!("x{}", i)).collect();
        candidates.insert("2222222222".to_string());

        let existing = find_existing_phone_numbers(&pool, &candidates).await.unwrap();
        assert_eq!(existing, HashSet::from(["2222222222".to_string()]));
    }

    #[tokio::test]
    async fn test_list_campus_ambassadors() {
        let pool = init_memory_database().await.unwrap();
        seed(&pool).await;

        let all = list_campus_ambassadors(&pool, false).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|u| u.role == UserRole::CampusAmbassador));

        let verified = list_campus_ambassadors(&pool, true).await.unwrap();
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].phone_no.as_deref(), Some("1111111111"));
    }

    #[tokio::test]
    async fn test_profile_completion_derived() {
        let pool = init_memory_database().await.unwrap();
        let user_id = create_user(&pool, &NewUser::default()).await.unwrap();

        let partial = ProfileUpdate {
            name: Some("Asha".to_string()),
            phone_no: Some("9876543210".to_string()),
            ..Default::default()
        };
        let user = update_profile(&pool, user_id, &partial).await.unwrap();
        assert!(!user.is_profile_complete);
        assert_eq!(user.name.as_deref(), Some("Asha"));

        let rest = ProfileUpdate {
            college_name: Some("GEC".to_string()),
            year_of_study: Some(3),
            district: Some("Thrissur".to_string()),
            ..Default::default()
        };
        let user = update_profile(&pool, user_id, &rest).await.unwrap();
        assert!(user.is_profile_complete);
        // Fields absent from the second update are kept
        assert_eq!(user.name.as_deref(), Some("Asha"));
        assert_eq!(user.phone_no.as_deref(), Some("9876543210"));
        assert_eq!(user.year_of_study, Some(3));
    }

    #[tokio::test]
    async fn test_profile_validation() {
        let pool = init_memory_database().await.unwrap();
        let user_id = create_user(&pool, &NewUser::default()).await.unwrap();

        for phone in ["12345", "12345678901", "98765abcde", "+919876543"] {
            let update = ProfileUpdate {
                phone_no: Some(phone.to_string()),
                ..Default::default()
            };
            let result = update_profile(&pool, user_id, &update).await;
            assert!(matches!(result, Err(Error::InvalidInput(_))), "{} accepted", phone);
        }

        for year in [0, 7] {
            let update = ProfileUpdate {
                year_of_study: Some(year),
                ..Default::default()
            };
            let result = update_profile(&pool, user_id, &update).await;
            assert!(matches!(result, Err(Error::InvalidInput(_))));
        }

        let missing = update_profile(&pool, 999, &full_profile()).await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_phone_is_conflict() {
        let pool = init_memory_database().await.unwrap();
        seed(&pool).await;

        let duplicate = NewUser {
            phone_no: Some("1111111111".to_string()),
            ..Default::default()
        };
        let result = create_user(&pool, &duplicate).await;
        assert!(matches!(result, Err(Error::Conflict(_))));

        let other = create_user(&pool, &NewUser::default()).await.unwrap();
        let update = ProfileUpdate {
            phone_no: Some("2222222222".to_string()),
            ..Default::default()
        };
        let result = update_profile(&pool, other, &update).await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }
}
