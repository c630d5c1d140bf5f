// ==============================================================================
// state.rs - Application State Management
// ==============================================================================
// Description: Shared application state for the Exomiser web server
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

use exomiser_core::config::{SessionConfig, Settings, StoragePaths};
use exomiser_core::db::{self, analyses, sessions};
use exomiser_worker::AnalysisRunner;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// SQLite connection pool
    db_pool: SqlitePool,

    settings: Settings,

    /// Background Exomiser runner and live output store
    runner: AnalysisRunner,
}

impl AppState {
    /// Connect, migrate and recover state left behind by a previous process
    pub async fn new(settings: Settings) -> Result<Self> {
        let db_pool = db::connect(&settings.database_url)
            .await
            .context("Failed to connect to SQLite")?;

        db::init_schema(&db_pool)
            .await
            .context("Failed to initialize database schema")?;

        settings.storage.ensure().await?;

        let recovered = analyses::recover_interrupted(&db_pool)
            .await
            .context("Failed to recover interrupted analyses")?;
        if recovered > 0 {
            warn!("Marked {} interrupted analysis run(s) as FAILED", recovered);
        }

        let purged = sessions::purge_expired(&db_pool)
            .await
            .context("Failed to purge expired sessions")?;
        if purged > 0 {
            info!("Purged {} expired session(s)", purged);
        }

        Ok(Self::from_parts(db_pool, settings))
    }

    /// Build state around an existing pool (tests, tooling)
    pub fn from_parts(db_pool: SqlitePool, settings: Settings) -> Self {
        let runner = AnalysisRunner::new(
            db_pool.clone(),
            settings.storage.clone(),
            settings.exomiser.clone(),
            &settings.runner,
        );

        Self {
            inner: Arc::new(AppStateInner {
                db_pool,
                settings,
                runner,
            }),
        }
    }

    /// Get database pool
    pub fn db_pool(&self) -> &SqlitePool {
        &self.inner.db_pool
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// Upload, phenopacket and results directories
    pub fn storage(&self) -> &StoragePaths {
        &self.inner.settings.storage
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.inner.settings.session
    }

    pub fn runner(&self) -> &AnalysisRunner {
        &self.inner.runner
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use exomiser_core::config::{ExomiserConfig, RunnerConfig};
    use exomiser_core::db::users;
    use exomiser_core::models::User;
    use std::path::Path;

    pub fn settings(root: &Path, exomiser: ExomiserConfig) -> Settings {
        Settings {
            database_url: "sqlite::memory:".to_string(),
            server_port: 0,
            storage: StoragePaths::under(root),
            exomiser,
            runner: RunnerConfig::default(),
            session: SessionConfig::default(),
            cors_allowed_origins: vec!["http://localhost:8000".to_string()],
        }
    }

    /// State over a private in-memory database with storage under `root`
    pub async fn state(root: &Path) -> AppState {
        state_with(root, ExomiserConfig::default()).await
    }

    pub async fn state_with(root: &Path, exomiser: ExomiserConfig) -> AppState {
        let pool = db::connect_in_memory().await.unwrap();
        let settings = settings(root, exomiser);
        settings.storage.ensure().await.unwrap();
        AppState::from_parts(pool, settings)
    }

    /// Account plus a live session token (password hash is not usable)
    pub async fn signed_in(state: &AppState, email: &str, is_admin: bool) -> (User, String) {
        let user = users::create(state.db_pool(), email, "unused", None, true, is_admin)
            .await
            .unwrap();
        let session = sessions::create(state.db_pool(), user.id, false, chrono::Duration::hours(1))
            .await
            .unwrap();
        (user, session.token)
    }
}
