// ==============================================================================
// handlers/mod.rs - API Request Handlers
// ==============================================================================
// Description: HTTP handlers for the Exomiser portal and the shared error type
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::path::Path;
use tokio_util::io::ReaderStream;
use tracing::{error, info};

use exomiser_core::CoreError;

use crate::models::ErrorResponse;

pub mod admin;
pub mod analyses;
pub mod auth;
pub mod individuals;
pub mod system;

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    /// Every failed form field, reported together
    Validation(Vec<String>),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    Internal(String),
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(errors) => AppError::Validation(errors),
            CoreError::NotFound(_) => AppError::NotFound(err.to_string()),
            CoreError::Duplicate(msg) | CoreError::Conflict(msg) | CoreError::InvalidState(msg) => {
                AppError::Conflict(msg)
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorResponse::new(msg)),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorResponse::new(msg)),
            AppError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::with_details("Validation failed", errors.join("; ")),
            ),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, ErrorResponse::new(msg)),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, ErrorResponse::new(msg)),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ErrorResponse::new(msg)),
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details("Internal server error", msg),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Stream a file from disk with download or inline disposition
pub(crate) async fn file_response(
    path: &Path,
    content_type: &'static str,
    file_name: &str,
    inline: bool,
) -> Result<Response, AppError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => {
            error!("File not found on disk: {:?}", path);
            return Err(AppError::NotFound("File not found".to_string()));
        }
    };

    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to open file: {}", e)))?;

    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    let disposition = if inline { "inline" } else { "attachment" };
    let file_name = file_name.replace('"', "");

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.len()));
    headers.insert(
        header::CONTENT_DISPOSITION,
        format!("{}; filename=\"{}\"", disposition, file_name)
            .parse()
            .map_err(|_| AppError::Internal(format!("Invalid file name: {}", file_name)))?,
    );

    info!("Serving {} ({} bytes)", file_name, metadata.len());

    Ok((headers, body).into_response())
}
