// ==============================================================================
// db/sessions.rs - Login Sessions
// ==============================================================================
// Description: Server-side sessions keyed by a random cookie token
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::Result;
use crate::security::generate_session_token;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub remember: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Open a session for `user_id` that expires after `ttl`
pub async fn create(
    pool: &SqlitePool,
    user_id: i64,
    remember: bool,
    ttl: chrono::Duration,
) -> Result<Session> {
    let now = Utc::now();
    let session = Session {
        token: generate_session_token(),
        user_id,
        remember,
        created_at: now,
        expires_at: now + ttl,
    };

    sqlx::query(
        "INSERT INTO sessions (token, user_id, remember, created_at, expires_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&session.token)
    .bind(session.user_id)
    .bind(session.remember)
    .bind(session.created_at)
    .bind(session.expires_at)
    .execute(pool)
    .await?;

    debug!("Created session for user {}", user_id);
    Ok(session)
}

/// Look up an unexpired session by token
pub async fn find_valid(pool: &SqlitePool, token: &str) -> Result<Option<Session>> {
    let session: Option<Session> = sqlx::query_as(
        "SELECT token, user_id, remember, created_at, expires_at
         FROM sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(session.filter(|s| s.expires_at > Utc::now()))
}

pub async fn delete(pool: &SqlitePool, token: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Drop every session of a user (deactivation, password reset)
pub async fn delete_for_user(pool: &SqlitePool, user_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn purge_expired(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(Utc::now())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
