// ==============================================================================
// runner.rs - Analysis Runner
// ==============================================================================
// Description: Launches Exomiser for an analysis in a tracked background task,
//              records the outcome and manages live output retention
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================
//
// Run flow:
//   1. claim the row (PENDING/FAILED -> RUNNING, atomic)
//   2. regenerate the phenopacket, write PHENOPACKET_DIR/analysis_{id}.yml
//   3. wait for a concurrency permit
//   4. spawn Java, stream output into the OutputBuffer
//   5. record COMPLETED/FAILED/CANCELLED, discover the HTML report
//   6. evict the output after the retention period
//
// ==============================================================================

use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use exomiser_core::config::{ExomiserConfig, RunnerConfig, StoragePaths};
use exomiser_core::db::{analyses, individuals};
use exomiser_core::models::{Analysis, AnalysisStatus};
use exomiser_core::{phenopacket, CoreError};

use crate::error::{Result, RunnerError};
use crate::exomiser::{ExitOutcome, ExomiserCommand};
use crate::output::OutputBuffer;
use crate::report;

/// Handle to the background analysis runner (cheap to clone)
#[derive(Clone)]
pub struct AnalysisRunner {
    inner: Arc<RunnerInner>,
}

struct RunnerInner {
    pool: SqlitePool,
    storage: StoragePaths,
    exomiser: ExomiserConfig,
    output_retention: Duration,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    output: OutputBuffer,
    active: Mutex<HashMap<i64, CancellationToken>>,
}

impl AnalysisRunner {
    pub fn new(
        pool: SqlitePool,
        storage: StoragePaths,
        exomiser: ExomiserConfig,
        config: &RunnerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                pool,
                storage,
                exomiser,
                output_retention: config.output_retention,
                permits: Arc::new(Semaphore::new(config.max_concurrent_runs.max(1))),
                tracker: TaskTracker::new(),
                output: OutputBuffer::new(),
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Captured output lines for an analysis (empty when unknown or evicted)
    pub fn output(&self, analysis_id: i64) -> Vec<String> {
        self.inner.output.get(analysis_id)
    }

    /// Drop any retained output (analysis deleted)
    pub fn discard_output(&self, analysis_id: i64) {
        self.inner.output.discard(analysis_id);
    }

    /// Whether a background task currently owns this analysis
    pub fn is_active(&self, analysis_id: i64) -> bool {
        self.inner.lock_active().contains_key(&analysis_id)
    }

    /// Start an analysis from PENDING or FAILED.
    ///
    /// Returns the row as it looks once RUNNING; the external process runs
    /// in a tracked background task.
    pub async fn run(&self, analysis_id: i64) -> std::result::Result<Analysis, CoreError> {
        let analysis = analyses::claim_for_run(&self.inner.pool, analysis_id).await?;
        info!("Analysis {} ({}) started", analysis.id, analysis.name);

        let token = CancellationToken::new();
        self.inner.lock_active().insert(analysis.id, token.clone());
        let generation = self.inner.output.start(analysis.id);

        let inner = Arc::clone(&self.inner);
        let id = analysis.id;
        let individual_id = analysis.individual_id;
        self.inner.tracker.spawn(async move {
            inner.execute(id, individual_id, token).await;
            inner.lock_active().remove(&id);
            inner.schedule_eviction(id, generation);
        });

        Ok(analysis)
    }

    /// Reset a finished analysis to a clean PENDING state and run it again
    pub async fn rerun(
        &self,
        analysis_id: i64,
        user_id: i64,
    ) -> std::result::Result<Analysis, CoreError> {
        analyses::reset_for_rerun(&self.inner.pool, analysis_id, user_id).await?;
        self.inner.output.discard(analysis_id);
        self.run(analysis_id).await
    }

    /// Cancel a RUNNING analysis and kill its process
    pub async fn cancel(&self, analysis_id: i64) -> std::result::Result<Analysis, CoreError> {
        let analysis = analyses::get(&self.inner.pool, analysis_id).await?;
        if analysis.status != AnalysisStatus::Running {
            return Err(CoreError::InvalidState(format!(
                "Only running analyses can be cancelled (status is {})",
                analysis.status
            )));
        }

        if !analyses::mark_cancelled(&self.inner.pool, analysis_id).await? {
            // Finished between the read and the update
            return analyses::get(&self.inner.pool, analysis_id).await;
        }

        let token = self.inner.lock_active().get(&analysis_id).cloned();
        match token {
            Some(token) => token.cancel(),
            None => warn!("Analysis {} had no active task to cancel", analysis_id),
        }

        info!("Analysis {} cancelled", analysis_id);
        analyses::get(&self.inner.pool, analysis_id).await
    }

    /// Stop accepting the notion of "new" work and wait for running tasks
    pub async fn wait_idle(&self) {
        self.inner.tracker.close();
        let outstanding = self.inner.tracker.len();
        if outstanding > 0 {
            info!("Waiting for {} analysis run(s) to finish", outstanding);
        }
        self.inner.tracker.wait().await;
        self.inner.tracker.reopen();
    }
}

impl RunnerInner {
    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashMap<i64, CancellationToken>> {
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Runner lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Body of the background task; never propagates errors
    async fn execute(&self, id: i64, individual_id: i64, token: CancellationToken) {
        let outcome = self.launch(id, individual_id, &token).await;

        let recorded = match outcome {
            Ok((ExitOutcome::Success, identity)) => {
                let report = report::find_report(&self.storage.results_dir, &identity).await;
                match &report {
                    Some(path) => info!("Analysis {} completed, report {:?}", id, path),
                    None => warn!("Analysis {} completed but no report matched {}", id, identity),
                }
                let report = report.map(|path| path.to_string_lossy().into_owned());
                analyses::mark_completed(&self.pool, id, report.as_deref()).await
            }
            Ok((ExitOutcome::Cancelled, _)) => {
                info!("Analysis {} process stopped after cancellation", id);
                analyses::mark_cancelled(&self.pool, id).await
            }
            Err(e) => {
                error!("Analysis {} failed: {}", id, e);
                analyses::mark_failed(&self.pool, id, &e.to_string()).await
            }
        };

        if let Err(e) = recorded {
            error!("Failed to record outcome of analysis {}: {}", id, e);
        }
    }

    /// Prepare inputs and run the external process; returns the outcome and
    /// the individual's identity for report discovery
    async fn launch(
        &self,
        id: i64,
        individual_id: i64,
        token: &CancellationToken,
    ) -> Result<(ExitOutcome, String)> {
        let individual = individuals::get(&self.pool, individual_id).await?;

        let yaml = phenopacket::for_individual(&individual, &self.storage.vcf_uri_prefix)?;
        individuals::set_phenopacket_yaml(&self.pool, individual.id, &yaml).await?;

        let phenopacket_path = write_phenopacket(&self.storage.phenopacket_dir, id, &yaml).await?;
        analyses::set_phenopacket_path(&self.pool, id, &phenopacket_path.to_string_lossy())
            .await?;

        let _permit = tokio::select! {
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|_| RunnerError::ShuttingDown)?
            }
            _ = token.cancelled() => return Ok((ExitOutcome::Cancelled, individual.identity)),
        };

        let command = ExomiserCommand::new(&self.exomiser, &phenopacket_path);
        let outcome = command
            .run(|line| self.output.append(id, line), token)
            .await?;

        Ok((outcome, individual.identity))
    }

    fn schedule_eviction(self: &Arc<Self>, id: i64, generation: u64) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(inner.output_retention).await;
            inner.output.evict(id, generation);
        });
    }
}

async fn write_phenopacket(dir: &Path, analysis_id: i64, yaml: &str) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("analysis_{}.yml", analysis_id));
    tokio::fs::write(&path, yaml).await?;
    Ok(path)
}
