// ==============================================================================
// models.rs - Portal Data Models
// ==============================================================================
// Description: Users, individuals (subjects) and analyses (jobs)
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Sex of an individual as recorded on the intake form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SexType {
    Male,
    Female,
    Other,
    #[default]
    Unknown,
}

impl SexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SexType::Male => "MALE",
            SexType::Female => "FEMALE",
            SexType::Other => "OTHER",
            SexType::Unknown => "UNKNOWN",
        }
    }

    /// Phenopacket v1 sex vocabulary
    pub fn phenopacket_sex(&self) -> &'static str {
        match self {
            SexType::Male => "MALE",
            SexType::Female => "FEMALE",
            SexType::Other => "OTHER_SEX",
            SexType::Unknown => "UNKNOWN_SEX",
        }
    }
}

impl FromStr for SexType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "MALE" => Ok(SexType::Male),
            "FEMALE" => Ok(SexType::Female),
            "OTHER" => Ok(SexType::Other),
            "UNKNOWN" | "" => Ok(SexType::Unknown),
            other => Err(CoreError::validation(format!("Invalid sex: {}", other))),
        }
    }
}

/// Analysis lifecycle status (stored as its string value)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnalysisStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "PENDING",
            AnalysisStatus::Running => "RUNNING",
            AnalysisStatus::Completed => "COMPLETED",
            AnalysisStatus::Failed => "FAILED",
            AnalysisStatus::Cancelled => "CANCELLED",
        }
    }

    /// Statuses from which `run` may start the external tool
    pub fn is_runnable(&self) -> bool {
        matches!(self, AnalysisStatus::Pending | AnalysisStatus::Failed)
    }

    /// Statuses that an edit or rerun resets back to PENDING
    pub fn resets_on_edit(&self) -> bool {
        matches!(self, AnalysisStatus::Failed | AnalysisStatus::Cancelled)
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(AnalysisStatus::Pending),
            "RUNNING" => Ok(AnalysisStatus::Running),
            "COMPLETED" => Ok(AnalysisStatus::Completed),
            "FAILED" => Ok(AnalysisStatus::Failed),
            "CANCELLED" => Ok(AnalysisStatus::Cancelled),
            other => Err(CoreError::validation(format!("Invalid analysis status: {}", other))),
        }
    }
}

/// Reference genome build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenomeAssembly {
    #[default]
    Hg19,
    Hg38,
}

impl GenomeAssembly {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenomeAssembly::Hg19 => "hg19",
            GenomeAssembly::Hg38 => "hg38",
        }
    }
}

impl FromStr for GenomeAssembly {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hg19" | "grch37" | "" => Ok(GenomeAssembly::Hg19),
            "hg38" | "grch38" => Ok(GenomeAssembly::Hg38),
            other => Err(CoreError::validation(format!("Invalid genome assembly: {}", other))),
        }
    }
}

/// Human Phenotype Ontology term (e.g. HP:0001250 "Seizures")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpoTerm {
    pub id: String,
    #[serde(default)]
    pub label: String,
}

impl HpoTerm {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Portal account
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Genomic subject registered with an uploaded VCF
#[derive(Debug, Clone, Serialize)]
pub struct Individual {
    pub id: i64,
    /// External identifier, globally unique (e.g. "P0001")
    pub identity: String,
    pub full_name: String,
    pub sex: SexType,
    pub age_years: Option<u32>,
    pub medical_history: Option<String>,
    pub diagnosis: Option<String>,
    pub hpo_terms: Vec<HpoTerm>,
    /// Original filename at upload time
    pub vcf_filename: Option<String>,
    /// Stored path under the upload directory
    pub vcf_file_path: String,
    pub phenopacket_yaml: Option<String>,
    pub created_by: i64,
    pub updated_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Individual {
    pub fn hpo_count(&self) -> usize {
        self.hpo_terms.len()
    }
}

/// Exomiser analysis run against one individual
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub genome_assembly: GenomeAssembly,
    pub analysis_mode: String,
    pub frequency_threshold: f64,
    pub pathogenicity_threshold: f64,
    pub status: AnalysisStatus,
    pub individual_id: i64,
    pub phenopacket_path: Option<String>,
    pub output_html: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_by: i64,
    pub updated_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Analysis {
    /// Wall-clock runtime; still ticking while the analysis runs
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            (Some(start), None) if self.status == AnalysisStatus::Running => {
                Some(Utc::now() - start)
            }
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == AnalysisStatus::Running
    }
}

pub const DEFAULT_ANALYSIS_MODE: &str = "PASS_ONLY";
pub const DEFAULT_FREQUENCY_THRESHOLD: f64 = 1.0;
pub const DEFAULT_PATHOGENICITY_THRESHOLD: f64 = 0.5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sex_mapping_to_phenopacket() {
        assert_eq!(SexType::Male.phenopacket_sex(), "MALE");
        assert_eq!(SexType::Female.phenopacket_sex(), "FEMALE");
        assert_eq!(SexType::Other.phenopacket_sex(), "OTHER_SEX");
        assert_eq!(SexType::Unknown.phenopacket_sex(), "UNKNOWN_SEX");
    }

    #[test]
    fn test_status_string_values() {
        for status in [
            AnalysisStatus::Pending,
            AnalysisStatus::Running,
            AnalysisStatus::Completed,
            AnalysisStatus::Failed,
            AnalysisStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<AnalysisStatus>().unwrap(), status);
        }
        assert!("running".parse::<AnalysisStatus>().is_err());
    }

    #[test]
    fn test_runnable_statuses() {
        assert!(AnalysisStatus::Pending.is_runnable());
        assert!(AnalysisStatus::Failed.is_runnable());
        assert!(!AnalysisStatus::Running.is_runnable());
        assert!(!AnalysisStatus::Completed.is_runnable());
        assert!(!AnalysisStatus::Cancelled.is_runnable());
    }

    #[test]
    fn test_assembly_parsing_defaults_to_hg19() {
        assert_eq!("".parse::<GenomeAssembly>().unwrap(), GenomeAssembly::Hg19);
        assert_eq!("HG38".parse::<GenomeAssembly>().unwrap(), GenomeAssembly::Hg38);
        assert!("mm10".parse::<GenomeAssembly>().is_err());
    }

    #[test]
    fn test_hpo_term_label_defaults_empty() {
        let term: HpoTerm = serde_json::from_str(r#"{"id":"HP:0001250"}"#).unwrap();
        assert_eq!(term.label, "");
    }
}
