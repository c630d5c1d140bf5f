// ==============================================================================
// handlers/analyses.rs - Analysis (Job) Handlers
// ==============================================================================
// Description: Analysis CRUD, run/rerun/cancel, live output polling, search
//              and report delivery
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

use exomiser_core::db::{analyses, individuals};
use exomiser_core::forms::AnalysisForm;
use exomiser_core::models::{Analysis, Individual};
use exomiser_worker::report;

use super::{file_response, AppError};
use crate::middleware::CurrentUser;
use crate::models::{AnalysisView, OutputResponse, SearchQuery, SearchResponse};
use crate::state::AppState;

/// Attach individual identity/name to each analysis (one query for all)
async fn with_individuals(
    state: &AppState,
    rows: Vec<Analysis>,
) -> Result<Vec<AnalysisView>, AppError> {
    let by_id: HashMap<i64, Individual> = individuals::list(state.db_pool())
        .await?
        .into_iter()
        .map(|individual| (individual.id, individual))
        .collect();

    Ok(rows
        .into_iter()
        .map(|analysis| {
            let individual = by_id.get(&analysis.individual_id);
            AnalysisView::new(analysis, individual)
        })
        .collect())
}

async fn view_of(state: &AppState, analysis: Analysis) -> Result<AnalysisView, AppError> {
    let individual = individuals::find_by_id(state.db_pool(), analysis.individual_id).await?;
    Ok(AnalysisView::new(analysis, individual.as_ref()))
}

/// All analyses, newest first
pub async fn list_analyses(
    State(state): State<AppState>,
    _current: CurrentUser,
) -> Result<Json<Vec<AnalysisView>>, AppError> {
    let rows = analyses::list(state.db_pool()).await?;
    Ok(Json(with_individuals(&state, rows).await?))
}

/// Results page: analyses by most recent activity
pub async fn list_results(
    State(state): State<AppState>,
    _current: CurrentUser,
) -> Result<Json<Vec<AnalysisView>>, AppError> {
    let rows = analyses::list_results(state.db_pool()).await?;
    Ok(Json(with_individuals(&state, rows).await?))
}

pub async fn add_analysis(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(form): Json<AnalysisForm>,
) -> Result<(StatusCode, Json<AnalysisView>), AppError> {
    let input = form.validate()?;
    let analysis = analyses::create(state.db_pool(), &input, current.user.id).await?;

    info!("Analysis {} created by {}", analysis.id, current.user.email);
    Ok((StatusCode::CREATED, Json(view_of(&state, analysis).await?)))
}

pub async fn view_analysis(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(analysis_id): Path<i64>,
) -> Result<Json<AnalysisView>, AppError> {
    let analysis = analyses::get(state.db_pool(), analysis_id).await?;
    Ok(Json(view_of(&state, analysis).await?))
}

/// Edit settings; rejected while RUNNING
pub async fn edit_analysis(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(analysis_id): Path<i64>,
    Json(form): Json<AnalysisForm>,
) -> Result<Json<AnalysisView>, AppError> {
    let input = form.validate()?;
    let analysis =
        analyses::update(state.db_pool(), analysis_id, &input, current.user.id).await?;

    info!("Analysis {} updated by {}", analysis.id, current.user.email);
    Ok(Json(view_of(&state, analysis).await?))
}

pub async fn delete_analysis(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(analysis_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let removed = analyses::delete(state.db_pool(), analysis_id).await?;
    state.runner().discard_output(removed.id);

    info!("Analysis {} deleted by {}", removed.id, current.user.email);
    Ok(StatusCode::NO_CONTENT)
}

/// Start Exomiser for a PENDING or FAILED analysis
pub async fn run_analysis(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(analysis_id): Path<i64>,
) -> Result<(StatusCode, Json<AnalysisView>), AppError> {
    let analysis = state.runner().run(analysis_id).await?;

    info!("Analysis {} run requested by {}", analysis.id, current.user.email);
    Ok((StatusCode::ACCEPTED, Json(view_of(&state, analysis).await?)))
}

/// Reset to a clean PENDING state and run again
pub async fn rerun_analysis(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(analysis_id): Path<i64>,
) -> Result<(StatusCode, Json<AnalysisView>), AppError> {
    let analysis = state.runner().rerun(analysis_id, current.user.id).await?;

    info!("Analysis {} rerun requested by {}", analysis.id, current.user.email);
    Ok((StatusCode::ACCEPTED, Json(view_of(&state, analysis).await?)))
}

pub async fn cancel_analysis(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(analysis_id): Path<i64>,
) -> Result<Json<AnalysisView>, AppError> {
    let analysis = state.runner().cancel(analysis_id).await?;

    info!("Analysis {} cancelled by {}", analysis.id, current.user.email);
    Ok(Json(view_of(&state, analysis).await?))
}

/// Live output poll; unknown or expired ids give an empty list
pub async fn analysis_output(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(analysis_id): Path<i64>,
) -> Json<OutputResponse> {
    Json(OutputResponse::from(state.runner().output(analysis_id)))
}

/// Search-as-you-type over completed analyses
pub async fn search_analyses(
    State(state): State<AppState>,
    _current: CurrentUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, AppError> {
    let results = analyses::search(state.db_pool(), &query.q).await?;
    Ok(Json(SearchResponse {
        count: results.len(),
        results,
    }))
}

/// Stored report path, or the newest matching report in RESULTS_DIR
async fn locate_report(
    state: &AppState,
    analysis: &Analysis,
    individual: &Individual,
) -> Result<PathBuf, AppError> {
    if let Some(stored) = &analysis.output_html {
        let path = PathBuf::from(stored);
        if path.is_file() {
            return Ok(path);
        }
    }

    report::find_report(&state.storage().results_dir, &individual.identity)
        .await
        .ok_or_else(|| AppError::NotFound("Report not found".to_string()))
}

/// Download the HTML report as `{original stem}_analysis.html`
pub async fn download_report(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(analysis_id): Path<i64>,
) -> Result<Response, AppError> {
    let analysis = analyses::get(state.db_pool(), analysis_id).await?;
    let individual = individuals::get(state.db_pool(), analysis.individual_id).await?;

    let path = locate_report(&state, &analysis, &individual).await?;
    let name = report::download_name(individual.vcf_filename.as_deref(), &individual.identity);

    file_response(&path, "text/html; charset=utf-8", &name, false).await
}

/// Serve the HTML report inline
pub async fn report_html(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(analysis_id): Path<i64>,
) -> Result<Response, AppError> {
    let analysis = analyses::get(state.db_pool(), analysis_id).await?;
    let individual = individuals::get(state.db_pool(), analysis.individual_id).await?;

    let path = locate_report(&state, &analysis, &individual).await?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("report.html")
        .to_string();

    file_response(&path, "text/html; charset=utf-8", &name, true).await
}
