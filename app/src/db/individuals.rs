// ==============================================================================
// db/individuals.rs - Individual (Subject) Records
// ==============================================================================
// Description: CRUD for genomic subjects and their stored VCF/phenopacket
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::SqlitePool;

use crate::error::{CoreError, Result};
use crate::forms::IndividualInput;
use crate::models::{HpoTerm, Individual};

const INDIVIDUAL_COLUMNS: &str = "id, identity, full_name, sex, age_years, medical_history, \
     diagnosis, hpo_terms, vcf_filename, vcf_file_path, phenopacket_yaml, created_by, \
     updated_by, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct IndividualRecord {
    id: i64,
    identity: String,
    full_name: String,
    sex: String,
    age_years: Option<i64>,
    medical_history: Option<String>,
    diagnosis: Option<String>,
    hpo_terms: Json<Vec<HpoTerm>>,
    vcf_filename: Option<String>,
    vcf_file_path: String,
    phenopacket_yaml: Option<String>,
    created_by: i64,
    updated_by: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<IndividualRecord> for Individual {
    type Error = CoreError;

    fn try_from(record: IndividualRecord) -> Result<Self> {
        Ok(Self {
            id: record.id,
            identity: record.identity,
            full_name: record.full_name,
            sex: record.sex.parse()?,
            age_years: record.age_years.and_then(|age| u32::try_from(age).ok()),
            medical_history: record.medical_history,
            diagnosis: record.diagnosis,
            hpo_terms: record.hpo_terms.0,
            vcf_filename: record.vcf_filename,
            vcf_file_path: record.vcf_file_path,
            phenopacket_yaml: record.phenopacket_yaml,
            created_by: record.created_by,
            updated_by: record.updated_by,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

fn convert_all(records: Vec<IndividualRecord>) -> Result<Vec<Individual>> {
    records.into_iter().map(Individual::try_from).collect()
}

fn duplicate_identity(identity: &str) -> CoreError {
    CoreError::Duplicate(format!("Individual ID '{}' already exists", identity))
}

/// Whether another individual already uses `identity`
pub async fn identity_taken(
    pool: &SqlitePool,
    identity: &str,
    exclude_id: Option<i64>,
) -> Result<bool> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM individuals WHERE identity = ? AND id != ?")
            .bind(identity)
            .bind(exclude_id.unwrap_or(-1))
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}

/// Guard used before any upload is written
pub async fn ensure_identity_available(
    pool: &SqlitePool,
    identity: &str,
    exclude_id: Option<i64>,
) -> Result<()> {
    if identity_taken(pool, identity, exclude_id).await? {
        return Err(duplicate_identity(identity));
    }
    Ok(())
}

pub async fn create(
    pool: &SqlitePool,
    input: &IndividualInput,
    vcf_filename: Option<&str>,
    vcf_file_path: &str,
    phenopacket_yaml: Option<&str>,
    user_id: i64,
) -> Result<Individual> {
    ensure_identity_available(pool, &input.identity, None).await?;

    let now = Utc::now();
    let record: IndividualRecord = sqlx::query_as(&format!(
        "INSERT INTO individuals (identity, full_name, sex, age_years, medical_history, diagnosis,
                                  hpo_terms, vcf_filename, vcf_file_path, phenopacket_yaml,
                                  created_by, updated_by, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING {}",
        INDIVIDUAL_COLUMNS
    ))
    .bind(&input.identity)
    .bind(&input.full_name)
    .bind(input.sex.as_str())
    .bind(i64::from(input.age_years))
    .bind(&input.medical_history)
    .bind(&input.diagnosis)
    .bind(Json(&input.hpo_terms))
    .bind(vcf_filename)
    .bind(vcf_file_path)
    .bind(phenopacket_yaml)
    .bind(user_id)
    .bind(user_id)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    record.try_into()
}

/// Replacement VCF for an edit
#[derive(Debug, Clone, Copy)]
pub struct VcfReplacement<'a> {
    pub original_name: &'a str,
    pub stored_path: &'a str,
}

pub async fn update(
    pool: &SqlitePool,
    id: i64,
    input: &IndividualInput,
    replacement: Option<VcfReplacement<'_>>,
    user_id: i64,
) -> Result<Individual> {
    let current = get(pool, id).await?;
    ensure_identity_available(pool, &input.identity, Some(id)).await?;

    let (vcf_filename, vcf_file_path) = match replacement {
        Some(file) => (Some(file.original_name.to_string()), file.stored_path.to_string()),
        None => (current.vcf_filename, current.vcf_file_path),
    };

    let record: IndividualRecord = sqlx::query_as(&format!(
        "UPDATE individuals
         SET identity = ?, full_name = ?, sex = ?, age_years = ?, medical_history = ?,
             diagnosis = ?, hpo_terms = ?, vcf_filename = ?, vcf_file_path = ?,
             updated_by = ?, updated_at = ?
         WHERE id = ?
         RETURNING {}",
        INDIVIDUAL_COLUMNS
    ))
    .bind(&input.identity)
    .bind(&input.full_name)
    .bind(input.sex.as_str())
    .bind(i64::from(input.age_years))
    .bind(&input.medical_history)
    .bind(&input.diagnosis)
    .bind(Json(&input.hpo_terms))
    .bind(vcf_filename)
    .bind(vcf_file_path)
    .bind(user_id)
    .bind(Utc::now())
    .bind(id)
    .fetch_one(pool)
    .await?;

    record.try_into()
}

pub async fn set_phenopacket_yaml(pool: &SqlitePool, id: i64, yaml: &str) -> Result<()> {
    sqlx::query("UPDATE individuals SET phenopacket_yaml = ? WHERE id = ?")
        .bind(yaml)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Individual>> {
    let record: Option<IndividualRecord> = sqlx::query_as(&format!(
        "SELECT {} FROM individuals WHERE id = ?",
        INDIVIDUAL_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    record.map(Individual::try_from).transpose()
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Individual> {
    find_by_id(pool, id)
        .await?
        .ok_or(CoreError::NotFound("Individual"))
}

pub async fn find_by_identity(pool: &SqlitePool, identity: &str) -> Result<Option<Individual>> {
    let record: Option<IndividualRecord> = sqlx::query_as(&format!(
        "SELECT {} FROM individuals WHERE identity = ?",
        INDIVIDUAL_COLUMNS
    ))
    .bind(identity)
    .fetch_optional(pool)
    .await?;
    record.map(Individual::try_from).transpose()
}

/// All individuals, newest first
pub async fn list(pool: &SqlitePool) -> Result<Vec<Individual>> {
    let records: Vec<IndividualRecord> = sqlx::query_as(&format!(
        "SELECT {} FROM individuals ORDER BY created_at DESC, id DESC",
        INDIVIDUAL_COLUMNS
    ))
    .fetch_all(pool)
    .await?;
    convert_all(records)
}

pub async fn analysis_count(pool: &SqlitePool, id: i64) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM analyses WHERE individual_id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Delete an individual that no analysis references; returns the removed row
/// so the caller can clean up its files
pub async fn delete(pool: &SqlitePool, id: i64) -> Result<Individual> {
    let individual = get(pool, id).await?;

    let linked = analysis_count(pool, id).await?;
    if linked > 0 {
        return Err(CoreError::Conflict(format!(
            "Cannot delete individual: {} analysis task(s) are associated with it",
            linked
        )));
    }

    sqlx::query("DELETE FROM individuals WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(individual)
}
