// ==============================================================================
// db/users.rs - User Accounts
// ==============================================================================
// Description: Account storage, lookup and admin mutations
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{CoreError, Result};
use crate::models::User;

const USER_COLUMNS: &str =
    "id, email, password_hash, full_name, is_active, is_admin, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct UserRecord {
    id: i64,
    email: String,
    password_hash: String,
    full_name: Option<String>,
    is_active: bool,
    is_admin: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            email: record.email,
            password_hash: record.password_hash,
            full_name: record.full_name,
            is_active: record.is_active,
            is_admin: record.is_admin,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Insert a new account; `email` must already be normalized
pub async fn create(
    pool: &SqlitePool,
    email: &str,
    password_hash: &str,
    full_name: Option<&str>,
    is_active: bool,
    is_admin: bool,
) -> Result<User> {
    if find_by_email(pool, email).await?.is_some() {
        return Err(CoreError::Duplicate("Email already registered".to_string()));
    }

    let now = Utc::now();
    let record: UserRecord = sqlx::query_as(&format!(
        "INSERT INTO users (email, password_hash, full_name, is_active, is_admin, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         RETURNING {}",
        USER_COLUMNS
    ))
    .bind(email)
    .bind(password_hash)
    .bind(full_name)
    .bind(is_active)
    .bind(is_admin)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(record.into())
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let record: Option<UserRecord> =
        sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(record.map(User::from))
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<User> {
    find_by_id(pool, id).await?.ok_or(CoreError::NotFound("User"))
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let record: Option<UserRecord> =
        sqlx::query_as(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
            .bind(email)
            .fetch_optional(pool)
            .await?;
    Ok(record.map(User::from))
}

/// All accounts, newest first
pub async fn list(pool: &SqlitePool) -> Result<Vec<User>> {
    let records: Vec<UserRecord> = sqlx::query_as(&format!(
        "SELECT {} FROM users ORDER BY created_at DESC, id DESC",
        USER_COLUMNS
    ))
    .fetch_all(pool)
    .await?;
    Ok(records.into_iter().map(User::from).collect())
}

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Changes applied by the admin edit form; `None` leaves a field as is
#[derive(Debug, Default, Clone)]
pub struct UserChanges {
    pub email: Option<String>,
    pub full_name: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub is_admin: Option<bool>,
}

pub async fn update(pool: &SqlitePool, id: i64, changes: &UserChanges) -> Result<User> {
    let current = get(pool, id).await?;

    if let Some(email) = &changes.email {
        if let Some(other) = find_by_email(pool, email).await? {
            if other.id != id {
                return Err(CoreError::Duplicate("Email already registered".to_string()));
            }
        }
    }

    let email = changes.email.clone().unwrap_or(current.email);
    let full_name = changes.full_name.clone().unwrap_or(current.full_name);
    let is_active = changes.is_active.unwrap_or(current.is_active);
    let is_admin = changes.is_admin.unwrap_or(current.is_admin);

    let record: UserRecord = sqlx::query_as(&format!(
        "UPDATE users
         SET email = ?, full_name = ?, is_active = ?, is_admin = ?, updated_at = ?
         WHERE id = ?
         RETURNING {}",
        USER_COLUMNS
    ))
    .bind(&email)
    .bind(&full_name)
    .bind(is_active)
    .bind(is_admin)
    .bind(Utc::now())
    .bind(id)
    .fetch_one(pool)
    .await?;

    Ok(record.into())
}

pub async fn set_active(pool: &SqlitePool, id: i64, is_active: bool) -> Result<User> {
    update(
        pool,
        id,
        &UserChanges {
            is_active: Some(is_active),
            ..Default::default()
        },
    )
    .await
}

pub async fn set_admin(pool: &SqlitePool, id: i64, is_admin: bool) -> Result<User> {
    update(
        pool,
        id,
        &UserChanges {
            is_admin: Some(is_admin),
            ..Default::default()
        },
    )
    .await
}

pub async fn set_password_hash(pool: &SqlitePool, id: i64, password_hash: &str) -> Result<()> {
    let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::NotFound("User"));
    }
    Ok(())
}

/// Delete an account together with its sessions.
///
/// Accounts that still own individuals or analyses cannot be removed.
pub async fn delete(pool: &SqlitePool, id: i64) -> Result<()> {
    let (owned,): (i64,) = sqlx::query_as(
        "SELECT (SELECT COUNT(*) FROM individuals WHERE created_by = ?1)
              + (SELECT COUNT(*) FROM analyses WHERE created_by = ?1)",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;

    if owned > 0 {
        return Err(CoreError::Conflict(format!(
            "Cannot delete user: {} individual(s) or analysis task(s) were created by this account",
            owned
        )));
    }

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::NotFound("User"));
    }
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support;

    #[tokio::test]
    async fn test_create_and_find() {
        let pool = test_support::pool().await;
        let user = create(&pool, "alice@example.org", "hash", Some("Alice"), true, false)
            .await
            .unwrap();

        assert!(user.is_active);
        assert!(!user.is_admin);
        let found = find_by_email(&pool, "alice@example.org").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.full_name.as_deref(), Some("Alice"));
        assert_eq!(count(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let pool = test_support::pool().await;
        test_support::user(&pool, "dup@example.org").await;

        let err = create(&pool, "dup@example.org", "hash", None, true, false)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_update_flags() {
        let pool = test_support::pool().await;
        let user = test_support::user(&pool, "bob@example.org").await;

        let user = set_admin(&pool, user.id, true).await.unwrap();
        assert!(user.is_admin);
        let user = set_active(&pool, user.id, false).await.unwrap();
        assert!(!user.is_active);

        let user = update(
            &pool,
            user.id,
            &UserChanges {
                full_name: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(user.full_name, None);
        assert!(user.is_admin);
    }

    #[tokio::test]
    async fn test_update_email_collision() {
        let pool = test_support::pool().await;
        test_support::user(&pool, "a@example.org").await;
        let b = test_support::user(&pool, "b@example.org").await;

        let err = update(
            &pool,
            b.id,
            &UserChanges {
                email: Some("a@example.org".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_delete_blocked_when_owning_rows() {
        let pool = test_support::pool().await;
        let owner = test_support::user(&pool, "owner@example.org").await;
        test_support::individual(&pool, "P0001", owner.id).await;

        assert!(matches!(
            delete(&pool, owner.id).await.unwrap_err(),
            CoreError::Conflict(_)
        ));

        let other = test_support::user(&pool, "other@example.org").await;
        delete(&pool, other.id).await.unwrap();
        assert!(find_by_id(&pool, other.id).await.unwrap().is_none());
    }
}
