// ==============================================================================
// handlers/system.rs - Service Endpoints
// ==============================================================================
// Description: API information, liveness and readiness
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;

use exomiser_core::db;

use crate::models::{ApiInfoResponse, HealthResponse, ReadinessResponse};
use crate::state::AppState;

/// Root endpoint - API information
pub async fn root() -> Json<ApiInfoResponse> {
    Json(ApiInfoResponse {
        service: "Exomiser Portal",
        version: env!("CARGO_PKG_VERSION"),
        endpoints: vec![
            "/health - Health check",
            "/ready - Readiness check",
            "/login, /register, /logout, /me - Session management",
            "/individuals - List (GET) or add (POST, multipart)",
            "/individuals/{id} - View (GET), edit (POST, multipart) or delete (DELETE)",
            "/individuals/{id}/vcf - Download uploaded VCF",
            "/analyses - List (GET) or add (POST)",
            "/analyses/results - Results list",
            "/analyses/search?q= - Search completed analyses",
            "/analyses/{id} - View (GET), edit (PUT) or delete (DELETE)",
            "/analyses/{id}/run, /rerun, /cancel - Lifecycle (POST)",
            "/analyses/{id}/output - Live output polling",
            "/analyses/{id}/download, /html - Exomiser report",
            "/admin/users - User administration",
        ],
    })
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
    })
}

/// Readiness check endpoint
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = db::ping(state.db_pool()).await;

    let storage = state.storage();
    let storage_ready = [&storage.upload_dir, &storage.phenopacket_dir, &storage.results_dir]
        .iter()
        .all(|dir| dir.is_dir());

    let ready = database && storage_ready;

    let response = ReadinessResponse {
        ready,
        database,
        storage: storage_ready,
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}
