// ==============================================================================
// handlers/individuals.rs - Individual (Subject) Handlers
// ==============================================================================
// Description: Multipart add/edit with VCF upload, list, view, delete and
//              VCF download
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================
//
// Upload flow (add and edit):
//   1. read all multipart fields, keep the file in memory
//   2. validate every form field, collecting all errors
//   3. reject a duplicate identity BEFORE anything is written
//   4. FileValidator (size, extension, magic, header) then store under UPLOAD_DIR
//   5. write the row with fresh phenopacket YAML; remove the file if that fails
//
// ==============================================================================

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use chrono::Utc;
use std::path::{Path as FsPath, PathBuf};
use tracing::{info, warn};

use exomiser_core::db::individuals::{self, VcfReplacement};
use exomiser_core::forms::{IndividualForm, IndividualInput};
use exomiser_core::models::Individual;
use exomiser_core::phenopacket::{self, SubjectRecord, DEFAULT_CREATOR};
use exomiser_core::uploads;
use exomiser_core::validator::FileValidator;

use super::{file_response, AppError};
use crate::middleware::CurrentUser;
use crate::models::{IndividualDetail, IndividualSummary};
use crate::state::AppState;

/// VCF part of the multipart body
struct UploadedFile {
    filename: String,
    data: Bytes,
}

struct IndividualUpload {
    form: IndividualForm,
    file: Option<UploadedFile>,
}

async fn read_multipart(mut multipart: Multipart) -> Result<IndividualUpload, AppError> {
    let mut form = IndividualForm::default();
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "vcf_file" | "file" => {
                let filename = field.file_name().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read VCF file: {}", e)))?;

                // Browsers send an empty part when no file was chosen
                if !filename.is_empty() || !data.is_empty() {
                    file = Some(UploadedFile { filename, data });
                }
            }
            _ => {
                let value = field.text().await.map_err(|e| {
                    AppError::BadRequest(format!("Failed to read field {}: {}", name, e))
                })?;
                form.set_field(&name, value);
            }
        }
    }

    Ok(IndividualUpload { form, file })
}

/// Validate and store an uploaded VCF; returns the stored path
async fn store_upload(
    state: &AppState,
    owner_id: i64,
    identity: &str,
    file: &UploadedFile,
) -> Result<PathBuf, AppError> {
    let validator = FileValidator::new();
    let validated = validator.validate_upload(&file.filename, &file.data)?;

    let path = uploads::store_vcf(
        &state.storage().upload_dir,
        owner_id,
        identity,
        &validated,
        &file.data,
    )
    .await?;

    Ok(path)
}

fn phenopacket_for(
    state: &AppState,
    input: &IndividualInput,
    vcf_file_path: &str,
) -> Result<String, AppError> {
    let record = SubjectRecord {
        identity: &input.identity,
        sex: input.sex,
        age_years: Some(input.age_years),
        hpo_terms: &input.hpo_terms,
        vcf_file_path: Some(vcf_file_path),
    };

    Ok(phenopacket::generate_phenopacket_yaml(
        &record,
        DEFAULT_CREATOR,
        Utc::now(),
        &state.storage().vcf_uri_prefix,
    )?)
}

/// List individuals, newest first
pub async fn list_individuals(
    State(state): State<AppState>,
    _current: CurrentUser,
) -> Result<Json<Vec<IndividualSummary>>, AppError> {
    let rows = individuals::list(state.db_pool()).await?;
    Ok(Json(rows.iter().map(IndividualSummary::from).collect()))
}

/// Register a new individual with a mandatory VCF
pub async fn add_individual(
    State(state): State<AppState>,
    current: CurrentUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Individual>), AppError> {
    let upload = read_multipart(multipart).await?;
    let input = upload.form.validate(true, upload.file.is_some())?;

    individuals::ensure_identity_available(state.db_pool(), &input.identity, None).await?;

    let file = upload
        .file
        .as_ref()
        .ok_or_else(|| AppError::Validation(vec!["VCF file is required".to_string()]))?;
    let stored = store_upload(&state, current.user.id, &input.identity, file).await?;
    let stored_path = stored.to_string_lossy().into_owned();

    let created = match phenopacket_for(&state, &input, &stored_path) {
        Ok(yaml) => {
            individuals::create(
                state.db_pool(),
                &input,
                Some(&file.filename),
                &stored_path,
                Some(&yaml),
                current.user.id,
            )
            .await
            .map_err(AppError::from)
        }
        Err(e) => Err(e),
    };

    match created {
        Ok(individual) => {
            info!(
                "Individual {} added by {} ({} HPO terms)",
                individual.identity,
                current.user.email,
                individual.hpo_count()
            );
            Ok((StatusCode::CREATED, Json(individual)))
        }
        Err(e) => {
            uploads::discard(&stored).await;
            Err(e)
        }
    }
}

/// Individual detail with analysis count
pub async fn view_individual(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(individual_id): Path<i64>,
) -> Result<Json<IndividualDetail>, AppError> {
    let individual = individuals::get(state.db_pool(), individual_id).await?;
    let analysis_count = individuals::analysis_count(state.db_pool(), individual_id).await?;

    Ok(Json(IndividualDetail {
        hpo_count: individual.hpo_count(),
        analysis_count,
        individual,
    }))
}

/// Edit an individual; a new VCF replaces the stored one
pub async fn edit_individual(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(individual_id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<Individual>, AppError> {
    let existing = individuals::get(state.db_pool(), individual_id).await?;

    let upload = read_multipart(multipart).await?;
    let input = upload.form.validate(false, upload.file.is_some())?;

    individuals::ensure_identity_available(state.db_pool(), &input.identity, Some(individual_id))
        .await?;

    let stored = match &upload.file {
        Some(file) => Some((
            store_upload(&state, current.user.id, &input.identity, file).await?,
            file.filename.as_str(),
        )),
        None => None,
    };

    let stored_path = stored
        .as_ref()
        .map(|(path, _)| path.to_string_lossy().into_owned());
    let replacement = match (&stored, &stored_path) {
        (Some((_, original_name)), Some(path)) => Some(VcfReplacement {
            original_name,
            stored_path: path,
        }),
        _ => None,
    };

    let updated = match individuals::update(
        state.db_pool(),
        individual_id,
        &input,
        replacement,
        current.user.id,
    )
    .await
    {
        Ok(updated) => updated,
        Err(e) => {
            if let Some((path, _)) = &stored {
                uploads::discard(path).await;
            }
            return Err(e.into());
        }
    };

    let yaml = phenopacket::for_individual(&updated, &state.storage().vcf_uri_prefix)?;
    individuals::set_phenopacket_yaml(state.db_pool(), updated.id, &yaml).await?;

    if stored.is_some() && existing.vcf_file_path != updated.vcf_file_path {
        uploads::discard(FsPath::new(&existing.vcf_file_path)).await;
    }

    info!("Individual {} updated by {}", updated.identity, current.user.email);

    let refreshed = individuals::get(state.db_pool(), updated.id).await?;
    Ok(Json(refreshed))
}

/// Delete an individual that no analysis references
pub async fn delete_individual(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(individual_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let removed = individuals::delete(state.db_pool(), individual_id).await?;

    let path = FsPath::new(&removed.vcf_file_path);
    if path.exists() {
        uploads::discard(path).await;
    } else {
        warn!("VCF for deleted individual {} was already gone: {:?}", removed.identity, path);
    }

    info!("Individual {} deleted by {}", removed.identity, current.user.email);
    Ok(StatusCode::NO_CONTENT)
}

/// Download the uploaded VCF as `{identity}_{basename}`
pub async fn download_vcf(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(individual_id): Path<i64>,
) -> Result<Response, AppError> {
    let individual = individuals::get(state.db_pool(), individual_id).await?;

    let path = FsPath::new(&individual.vcf_file_path);
    let basename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("variants.vcf");
    let download_name = format!("{}_{}", individual.identity, basename);

    let content_type = if basename.to_lowercase().ends_with(".gz") {
        "application/gzip"
    } else {
        "text/plain"
    };

    file_response(path, content_type, &download_name, false).await
}
