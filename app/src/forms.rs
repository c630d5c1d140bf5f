// ==============================================================================
// forms.rs - Form Input Validation
// ==============================================================================
// Description: Raw form payloads for individuals, analyses and accounts, and
//              their conversion into validated inputs
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use serde::Deserialize;

use crate::error::{CoreError, Result};
use crate::models::{
    GenomeAssembly, HpoTerm, SexType, DEFAULT_ANALYSIS_MODE, DEFAULT_FREQUENCY_THRESHOLD,
    DEFAULT_PATHOGENICITY_THRESHOLD,
};
use crate::security::check_password_length;

/// Trim a string and lower-case it for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse the `hpo_terms` field (JSON array of `{id, label}`).
///
/// Malformed JSON is treated as an empty list so the "at least one term"
/// rule reports it.
pub fn parse_hpo_terms(raw: &str) -> Vec<HpoTerm> {
    serde_json::from_str::<Vec<HpoTerm>>(raw)
        .unwrap_or_default()
        .into_iter()
        .map(|term| HpoTerm::new(term.id.trim(), term.label.trim()))
        .filter(|term| !term.id.is_empty())
        .collect()
}

// ==============================================================================
// INDIVIDUALS
// ==============================================================================

/// Text fields of the individual add/edit form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndividualForm {
    #[serde(default, alias = "individual_id")]
    pub identity: String,
    #[serde(default)]
    pub full_name: String,
    pub sex: Option<String>,
    pub age: Option<String>,
    pub medical_history: Option<String>,
    pub diagnosis: Option<String>,
    pub hpo_terms: Option<String>,
}

impl IndividualForm {
    /// Set a field by its multipart name; unknown names are ignored
    pub fn set_field(&mut self, name: &str, value: String) {
        match name {
            "identity" | "individual_id" => self.identity = value,
            "full_name" => self.full_name = value,
            "sex" => self.sex = Some(value),
            "age" | "age_years" => self.age = Some(value),
            "medical_history" => self.medical_history = Some(value),
            "diagnosis" => self.diagnosis = Some(value),
            "hpo_terms" => self.hpo_terms = Some(value),
            _ => {}
        }
    }

    /// Validate all fields, collecting every problem into one error
    pub fn validate(&self, file_required: bool, has_file: bool) -> Result<IndividualInput> {
        let mut errors = Vec::new();

        let identity = self.identity.trim().to_string();
        if identity.is_empty() {
            errors.push("Individual ID is required".to_string());
        }

        let full_name = self.full_name.trim().to_string();
        if full_name.is_empty() {
            errors.push("Full name is required".to_string());
        }

        let age_years = match non_empty(&self.age) {
            None => {
                errors.push("Age is required".to_string());
                None
            }
            Some(raw) => match raw.parse::<u32>() {
                Ok(age) => Some(age),
                Err(_) => {
                    errors.push("Age must be a non-negative whole number".to_string());
                    None
                }
            },
        };

        let sex = match non_empty(&self.sex) {
            None => SexType::Unknown,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                errors.push(format!("Invalid sex: {}", raw));
                SexType::Unknown
            }),
        };

        let hpo_terms = self
            .hpo_terms
            .as_deref()
            .map(parse_hpo_terms)
            .unwrap_or_default();
        if hpo_terms.is_empty() {
            errors.push("At least one HPO term is required".to_string());
        }

        if file_required && !has_file {
            errors.push("VCF file is required".to_string());
        }

        match age_years {
            Some(age_years) if errors.is_empty() => Ok(IndividualInput {
                identity,
                full_name,
                sex,
                age_years,
                medical_history: non_empty(&self.medical_history),
                diagnosis: non_empty(&self.diagnosis),
                hpo_terms,
            }),
            _ => Err(CoreError::Validation(errors)),
        }
    }
}

/// Validated individual fields ready for persistence
#[derive(Debug, Clone, PartialEq)]
pub struct IndividualInput {
    pub identity: String,
    pub full_name: String,
    pub sex: SexType,
    pub age_years: u32,
    pub medical_history: Option<String>,
    pub diagnosis: Option<String>,
    pub hpo_terms: Vec<HpoTerm>,
}

// ==============================================================================
// ANALYSES
// ==============================================================================

/// Analysis add/edit payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisForm {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub individual_id: Option<i64>,
    pub genome_assembly: Option<String>,
    pub analysis_mode: Option<String>,
    pub frequency_threshold: Option<f64>,
    pub pathogenicity_threshold: Option<f64>,
}

impl AnalysisForm {
    /// Validate required fields and fill defaults; the individual's existence
    /// is checked by the repository
    pub fn validate(&self) -> Result<AnalysisInput> {
        let mut errors = Vec::new();

        let name = self.name.trim().to_string();
        if name.is_empty() {
            errors.push("Analysis name is required".to_string());
        }

        if self.individual_id.is_none() {
            errors.push("Individual is required".to_string());
        }

        let genome_assembly = match non_empty(&self.genome_assembly) {
            None => GenomeAssembly::default(),
            Some(raw) => raw.parse().unwrap_or_else(|e: CoreError| {
                errors.push(e.to_string());
                GenomeAssembly::default()
            }),
        };

        let frequency_threshold = self
            .frequency_threshold
            .unwrap_or(DEFAULT_FREQUENCY_THRESHOLD);
        if !frequency_threshold.is_finite() || frequency_threshold < 0.0 {
            errors.push("Frequency threshold must be a non-negative number".to_string());
        }

        let pathogenicity_threshold = self
            .pathogenicity_threshold
            .unwrap_or(DEFAULT_PATHOGENICITY_THRESHOLD);
        if !pathogenicity_threshold.is_finite() || pathogenicity_threshold < 0.0 {
            errors.push("Pathogenicity threshold must be a non-negative number".to_string());
        }

        match self.individual_id {
            Some(individual_id) if errors.is_empty() => Ok(AnalysisInput {
                name,
                description: non_empty(&self.description),
                individual_id,
                genome_assembly,
                analysis_mode: non_empty(&self.analysis_mode)
                    .unwrap_or_else(|| DEFAULT_ANALYSIS_MODE.to_string()),
                frequency_threshold,
                pathogenicity_threshold,
            }),
            _ => Err(CoreError::Validation(errors)),
        }
    }
}

/// Validated analysis fields ready for persistence
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisInput {
    pub name: String,
    pub description: Option<String>,
    pub individual_id: i64,
    pub genome_assembly: GenomeAssembly,
    pub analysis_mode: String,
    pub frequency_threshold: f64,
    pub pathogenicity_threshold: f64,
}

// ==============================================================================
// ACCOUNTS
// ==============================================================================

/// Self-service registration payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, alias = "confirm")]
    pub confirm_password: String,
    #[serde(alias = "name")]
    pub full_name: Option<String>,
}

impl RegisterForm {
    pub fn validate(&self) -> Result<AccountInput> {
        let mut errors = Vec::new();

        let email = normalize_email(&self.email);
        if email.is_empty() {
            errors.push("Email is required".to_string());
        }
        if self.password.is_empty() {
            errors.push("Password is required".to_string());
        } else if self.password != self.confirm_password {
            errors.push("Passwords do not match".to_string());
        }

        if !errors.is_empty() {
            return Err(CoreError::Validation(errors));
        }

        Ok(AccountInput {
            email,
            full_name: non_empty(&self.full_name),
            password: self.password.clone(),
            is_active: true,
            is_admin: false,
        })
    }
}

/// Admin "add user" payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUserForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub full_name: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_admin: bool,
}

fn default_true() -> bool {
    true
}

impl NewUserForm {
    pub fn validate(&self) -> Result<AccountInput> {
        let email = normalize_email(&self.email);
        if email.is_empty() {
            return Err(CoreError::validation("Email is required"));
        }
        check_password_length(&self.password)?;

        Ok(AccountInput {
            email,
            full_name: non_empty(&self.full_name),
            password: self.password.clone(),
            is_active: self.is_active,
            is_admin: self.is_admin,
        })
    }
}

/// Account fields ready to be hashed and stored
#[derive(Debug, Clone)]
pub struct AccountInput {
    pub email: String,
    pub full_name: Option<String>,
    pub password: String,
    pub is_active: bool,
    pub is_admin: bool,
}

/// Admin "edit user" payload; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditUserForm {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub is_active: Option<bool>,
    pub is_admin: Option<bool>,
}

impl EditUserForm {
    /// Normalized email, if one was supplied
    pub fn email(&self) -> Result<Option<String>> {
        match self.email.as_deref().map(normalize_email) {
            Some(email) if email.is_empty() => Err(CoreError::validation("Email cannot be empty")),
            other => Ok(other),
        }
    }

    /// Supplied name; an empty string clears it
    pub fn full_name(&self) -> Option<Option<String>> {
        self.full_name.as_ref().map(|name| {
            let trimmed = name.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
    }
}
