// ==============================================================================
// db/mod.rs - Persistence Layer
// ==============================================================================
// Description: SQLite connection pool, schema bootstrap and table statistics
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::Result;

pub mod analyses;
pub mod individuals;
pub mod sessions;
pub mod users;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        full_name TEXT,
        is_active BOOLEAN NOT NULL DEFAULT 1,
        is_admin BOOLEAN NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS sessions (
        token TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        remember BOOLEAN NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        expires_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)",
    "CREATE TABLE IF NOT EXISTS individuals (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        identity TEXT NOT NULL UNIQUE,
        full_name TEXT NOT NULL,
        sex TEXT NOT NULL DEFAULT 'UNKNOWN',
        age_years INTEGER,
        medical_history TEXT,
        diagnosis TEXT,
        hpo_terms TEXT NOT NULL DEFAULT '[]',
        vcf_filename TEXT,
        vcf_file_path TEXT NOT NULL,
        phenopacket_yaml TEXT,
        created_by INTEGER NOT NULL REFERENCES users(id),
        updated_by INTEGER NOT NULL REFERENCES users(id),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS analyses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT,
        genome_assembly TEXT NOT NULL DEFAULT 'hg19',
        analysis_mode TEXT NOT NULL DEFAULT 'PASS_ONLY',
        frequency_threshold REAL NOT NULL DEFAULT 1.0,
        pathogenicity_threshold REAL NOT NULL DEFAULT 0.5,
        status TEXT NOT NULL DEFAULT 'PENDING',
        individual_id INTEGER NOT NULL REFERENCES individuals(id),
        phenopacket_path TEXT,
        output_html TEXT,
        started_at TEXT,
        completed_at TEXT,
        error_message TEXT,
        created_by INTEGER NOT NULL REFERENCES users(id),
        updated_by INTEGER NOT NULL REFERENCES users(id),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_analyses_individual ON analyses(individual_id)",
    "CREATE INDEX IF NOT EXISTS idx_analyses_status ON analyses(status)",
];

/// Tables reported by `check-db` and the readiness probe
pub const TABLES: [&str; 4] = ["users", "sessions", "individuals", "analyses"];

/// Open a connection pool, creating the database file if missing
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await?;

    info!("Connected to database");
    Ok(pool)
}

/// Private in-memory database on a single long-lived connection
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables and indexes if they do not exist
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("Database schema ready");
    Ok(())
}

/// Row count of every portal table
pub async fn table_counts(pool: &SqlitePool) -> Result<Vec<(&'static str, i64)>> {
    let mut counts = Vec::with_capacity(TABLES.len());
    for table in TABLES {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool)
            .await?;
        counts.push((table, count));
    }
    Ok(counts)
}

/// Cheap connectivity probe
pub async fn ping(pool: &SqlitePool) -> bool {
    sqlx::query("SELECT 1").fetch_one(pool).await.is_ok()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::db::{individuals, users};
    use crate::forms::IndividualInput;
    use crate::models::{HpoTerm, Individual, SexType, User};

    pub async fn pool() -> SqlitePool {
        connect_in_memory().await.unwrap()
    }

    pub async fn user(pool: &SqlitePool, email: &str) -> User {
        users::create(pool, email, "$argon2id$test", Some("Test User"), true, false)
            .await
            .unwrap()
    }

    pub async fn individual(pool: &SqlitePool, identity: &str, owner: i64) -> Individual {
        let input = IndividualInput {
            identity: identity.to_string(),
            full_name: format!("Subject {}", identity),
            sex: SexType::Female,
            age_years: 10,
            medical_history: None,
            diagnosis: None,
            hpo_terms: vec![HpoTerm::new("HP:0001250", "Seizures")],
        };
        let path = format!("/data/vcf/{}_{}_deadbeef.vcf", owner, identity);
        individuals::create(pool, &input, Some("sample.vcf"), &path, None, owner)
            .await
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let pool = connect_in_memory().await.unwrap();
        init_schema(&pool).await.unwrap();

        let counts = table_counts(&pool).await.unwrap();
        assert_eq!(counts.len(), 4);
        assert!(counts.iter().all(|(_, count)| *count == 0));
        assert!(ping(&pool).await);
    }
}
