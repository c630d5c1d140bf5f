// ==============================================================================
// db/analyses.rs - Analysis (Job) Records
// ==============================================================================
// Description: CRUD and lifecycle transitions for Exomiser analyses
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================
//
// Lifecycle:
//   PENDING --run--> RUNNING --exit 0--> COMPLETED
//   FAILED  --run--> RUNNING --exit N--> FAILED
//                    RUNNING --cancel--> CANCELLED
//   FAILED | CANCELLED --edit/rerun--> PENDING
//
// Every transition out of or into RUNNING is a single conditional UPDATE so
// two concurrent requests cannot both start the same analysis.
//
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::error::{CoreError, Result};
use crate::forms::AnalysisInput;
use crate::models::{Analysis, AnalysisStatus};

const ANALYSIS_COLUMNS: &str = "id, name, description, genome_assembly, analysis_mode, \
     frequency_threshold, pathogenicity_threshold, status, individual_id, phenopacket_path, \
     output_html, started_at, completed_at, error_message, created_by, updated_by, created_at, \
     updated_at";

/// Maximum number of hits returned by `search`
pub const SEARCH_LIMIT: i64 = 20;

#[derive(Debug, sqlx::FromRow)]
struct AnalysisRecord {
    id: i64,
    name: String,
    description: Option<String>,
    genome_assembly: String,
    analysis_mode: String,
    frequency_threshold: f64,
    pathogenicity_threshold: f64,
    status: String,
    individual_id: i64,
    phenopacket_path: Option<String>,
    output_html: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    created_by: i64,
    updated_by: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AnalysisRecord> for Analysis {
    type Error = CoreError;

    fn try_from(record: AnalysisRecord) -> Result<Self> {
        Ok(Self {
            id: record.id,
            name: record.name,
            description: record.description,
            genome_assembly: record.genome_assembly.parse()?,
            analysis_mode: record.analysis_mode,
            frequency_threshold: record.frequency_threshold,
            pathogenicity_threshold: record.pathogenicity_threshold,
            status: record.status.parse()?,
            individual_id: record.individual_id,
            phenopacket_path: record.phenopacket_path,
            output_html: record.output_html,
            started_at: record.started_at,
            completed_at: record.completed_at,
            error_message: record.error_message,
            created_by: record.created_by,
            updated_by: record.updated_by,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

fn convert_all(records: Vec<AnalysisRecord>) -> Result<Vec<Analysis>> {
    records.into_iter().map(Analysis::try_from).collect()
}

async fn ensure_individual_exists(pool: &SqlitePool, individual_id: i64) -> Result<()> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM individuals WHERE id = ?")
        .bind(individual_id)
        .fetch_one(pool)
        .await?;
    if count == 0 {
        return Err(CoreError::validation("Selected individual not found"));
    }
    Ok(())
}

/// Explain why a conditional UPDATE touched no row
async fn rejection(pool: &SqlitePool, id: i64, action: &str) -> CoreError {
    match find_by_id(pool, id).await {
        Ok(Some(analysis)) => CoreError::InvalidState(format!(
            "Cannot {} analysis while it is {}",
            action, analysis.status
        )),
        Ok(None) => CoreError::NotFound("Analysis"),
        Err(e) => e,
    }
}

pub async fn create(pool: &SqlitePool, input: &AnalysisInput, user_id: i64) -> Result<Analysis> {
    ensure_individual_exists(pool, input.individual_id).await?;

    let now = Utc::now();
    let record: AnalysisRecord = sqlx::query_as(&format!(
        "INSERT INTO analyses (name, description, genome_assembly, analysis_mode,
                               frequency_threshold, pathogenicity_threshold, status,
                               individual_id, created_by, updated_by, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING {}",
        ANALYSIS_COLUMNS
    ))
    .bind(&input.name)
    .bind(&input.description)
    .bind(input.genome_assembly.as_str())
    .bind(&input.analysis_mode)
    .bind(input.frequency_threshold)
    .bind(input.pathogenicity_threshold)
    .bind(AnalysisStatus::Pending.as_str())
    .bind(input.individual_id)
    .bind(user_id)
    .bind(user_id)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    info!("Created analysis {} ({})", record.id, record.name);
    record.try_into()
}

/// Apply an edit. Rejected while RUNNING; FAILED/CANCELLED fall back to
/// PENDING with the error cleared.
pub async fn update(
    pool: &SqlitePool,
    id: i64,
    input: &AnalysisInput,
    user_id: i64,
) -> Result<Analysis> {
    ensure_individual_exists(pool, input.individual_id).await?;

    let record: Option<AnalysisRecord> = sqlx::query_as(&format!(
        "UPDATE analyses
         SET name = ?, description = ?, genome_assembly = ?, analysis_mode = ?,
             frequency_threshold = ?, pathogenicity_threshold = ?, individual_id = ?,
             status = CASE WHEN status IN ('FAILED', 'CANCELLED') THEN 'PENDING' ELSE status END,
             error_message = CASE WHEN status IN ('FAILED', 'CANCELLED') THEN NULL ELSE error_message END,
             updated_by = ?, updated_at = ?
         WHERE id = ? AND status != 'RUNNING'
         RETURNING {}",
        ANALYSIS_COLUMNS
    ))
    .bind(&input.name)
    .bind(&input.description)
    .bind(input.genome_assembly.as_str())
    .bind(&input.analysis_mode)
    .bind(input.frequency_threshold)
    .bind(input.pathogenicity_threshold)
    .bind(input.individual_id)
    .bind(user_id)
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match record {
        Some(record) => record.try_into(),
        None => Err(rejection(pool, id, "edit").await),
    }
}

/// Delete an analysis that is not running; returns the removed row
pub async fn delete(pool: &SqlitePool, id: i64) -> Result<Analysis> {
    let record: Option<AnalysisRecord> = sqlx::query_as(&format!(
        "DELETE FROM analyses WHERE id = ? AND status != 'RUNNING' RETURNING {}",
        ANALYSIS_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match record {
        Some(record) => record.try_into(),
        None => Err(rejection(pool, id, "delete").await),
    }
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Analysis>> {
    let record: Option<AnalysisRecord> = sqlx::query_as(&format!(
        "SELECT {} FROM analyses WHERE id = ?",
        ANALYSIS_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    record.map(Analysis::try_from).transpose()
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Analysis> {
    find_by_id(pool, id).await?.ok_or(CoreError::NotFound("Analysis"))
}

/// All analyses, newest first
pub async fn list(pool: &SqlitePool) -> Result<Vec<Analysis>> {
    let records: Vec<AnalysisRecord> = sqlx::query_as(&format!(
        "SELECT {} FROM analyses ORDER BY created_at DESC, id DESC",
        ANALYSIS_COLUMNS
    ))
    .fetch_all(pool)
    .await?;
    convert_all(records)
}

/// All analyses, most recently updated first
pub async fn list_results(pool: &SqlitePool) -> Result<Vec<Analysis>> {
    let records: Vec<AnalysisRecord> = sqlx::query_as(&format!(
        "SELECT {} FROM analyses ORDER BY updated_at DESC, id DESC",
        ANALYSIS_COLUMNS
    ))
    .fetch_all(pool)
    .await?;
    convert_all(records)
}

// ==============================================================================
// LIFECYCLE TRANSITIONS
// ==============================================================================

/// Atomically move a PENDING/FAILED analysis to RUNNING
pub async fn claim_for_run(pool: &SqlitePool, id: i64) -> Result<Analysis> {
    let now = Utc::now();
    let record: Option<AnalysisRecord> = sqlx::query_as(&format!(
        "UPDATE analyses
         SET status = 'RUNNING', started_at = ?, completed_at = NULL, error_message = NULL,
             updated_at = ?
         WHERE id = ? AND status IN ('PENDING', 'FAILED')
         RETURNING {}",
        ANALYSIS_COLUMNS
    ))
    .bind(now)
    .bind(now)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match record {
        Some(record) => record.try_into(),
        None => Err(rejection(pool, id, "run").await),
    }
}

/// Reset a non-running analysis to a clean PENDING state
pub async fn reset_for_rerun(pool: &SqlitePool, id: i64, user_id: i64) -> Result<Analysis> {
    let record: Option<AnalysisRecord> = sqlx::query_as(&format!(
        "UPDATE analyses
         SET status = 'PENDING', started_at = NULL, completed_at = NULL, error_message = NULL,
             output_html = NULL, phenopacket_path = NULL, updated_by = ?, updated_at = ?
         WHERE id = ? AND status != 'RUNNING'
         RETURNING {}",
        ANALYSIS_COLUMNS
    ))
    .bind(user_id)
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match record {
        Some(record) => record.try_into(),
        None => Err(rejection(pool, id, "rerun").await),
    }
}

pub async fn set_phenopacket_path(pool: &SqlitePool, id: i64, path: &str) -> Result<()> {
    sqlx::query("UPDATE analyses SET phenopacket_path = ?, updated_at = ? WHERE id = ?")
        .bind(path)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Finish a RUNNING analysis. Returns false when the row had already left
/// RUNNING (e.g. it was cancelled while the process was exiting).
async fn finish(
    pool: &SqlitePool,
    id: i64,
    status: AnalysisStatus,
    error_message: Option<&str>,
    output_html: Option<&str>,
) -> Result<bool> {
    let now = Utc::now();
    let result = sqlx::query(
        "UPDATE analyses
         SET status = ?, completed_at = ?, error_message = ?,
             output_html = COALESCE(?, output_html), updated_at = ?
         WHERE id = ? AND status = 'RUNNING'",
    )
    .bind(status.as_str())
    .bind(now)
    .bind(error_message)
    .bind(output_html)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    let finished = result.rows_affected() > 0;
    if !finished {
        debug!("Analysis {} was no longer RUNNING; {} not recorded", id, status);
    }
    Ok(finished)
}

pub async fn mark_completed(pool: &SqlitePool, id: i64, output_html: Option<&str>) -> Result<bool> {
    finish(pool, id, AnalysisStatus::Completed, None, output_html).await
}

pub async fn mark_failed(pool: &SqlitePool, id: i64, error_message: &str) -> Result<bool> {
    finish(pool, id, AnalysisStatus::Failed, Some(error_message), None).await
}

pub async fn mark_cancelled(pool: &SqlitePool, id: i64) -> Result<bool> {
    finish(
        pool,
        id,
        AnalysisStatus::Cancelled,
        Some("Cancelled by user"),
        None,
    )
    .await
}

/// Fail analyses left RUNNING by a process that is no longer alive
pub async fn recover_interrupted(pool: &SqlitePool) -> Result<u64> {
    let now = Utc::now();
    let result = sqlx::query(
        "UPDATE analyses
         SET status = 'FAILED', completed_at = ?, error_message = 'Interrupted by server restart',
             updated_at = ?
         WHERE status = 'RUNNING'",
    )
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let recovered = result.rows_affected();
    if recovered > 0 {
        warn!("Marked {} interrupted analysis(es) as FAILED", recovered);
    }
    Ok(recovered)
}

// ==============================================================================
// SEARCH
// ==============================================================================

/// Completed analysis matching a search query
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SearchHit {
    pub id: i64,
    pub name: String,
    pub individual_identity: String,
    pub individual_name: String,
    pub completed_at: Option<DateTime<Utc>>,
}

fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Substring search over completed analyses. SQLite LIKE folds ASCII case
/// only; other characters must match exactly.
pub async fn search(pool: &SqlitePool, query: &str) -> Result<Vec<SearchHit>> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }

    let pattern = like_pattern(query);
    let hits: Vec<SearchHit> = sqlx::query_as(
        "SELECT a.id, a.name, i.identity AS individual_identity,
                i.full_name AS individual_name, a.completed_at
         FROM analyses a
         JOIN individuals i ON i.id = a.individual_id
         WHERE a.status = 'COMPLETED'
           AND (a.name LIKE ?1 ESCAPE '\\'
                OR i.identity LIKE ?1 ESCAPE '\\'
                OR i.full_name LIKE ?1 ESCAPE '\\')
         ORDER BY a.completed_at DESC, a.id DESC
         LIMIT ?2",
    )
    .bind(pattern)
    .bind(SEARCH_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(hits)
}
