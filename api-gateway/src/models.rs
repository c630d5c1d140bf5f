// ==============================================================================
// models.rs - API Data Models
// ==============================================================================
// Description: Request payloads and page view models for the Exomiser portal
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use exomiser_core::db::analyses::SearchHit;
use exomiser_core::models::{Analysis, Individual, SexType, User};

// ==============================================================================
// REQUESTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub remember: bool,
}

/// Body of the admin toggle endpoints (`{"action": "..."}`)
#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    #[serde(default)]
    pub action: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default, alias = "new_password")]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

// ==============================================================================
// RESPONSES
// ==============================================================================

/// Outcome envelope used by the AJAX endpoints
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
}

impl ActionResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            user_id: None,
            is_active: None,
            is_admin: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::ok(message)
        }
    }

    /// Attach the user's id and current flags
    pub fn for_user(mut self, user: &User) -> Self {
        self.user_id = Some(user.id);
        self.is_active = Some(user.is_active);
        self.is_admin = Some(user.is_admin);
        self
    }
}

/// Signed-in account
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: User,
    pub expires_at: DateTime<Utc>,
}

/// Row of the individuals list
#[derive(Debug, Serialize)]
pub struct IndividualSummary {
    pub id: i64,
    pub identity: String,
    pub full_name: String,
    pub sex: SexType,
    pub age_years: Option<u32>,
    pub hpo_count: usize,
    pub vcf_filename: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Individual> for IndividualSummary {
    fn from(individual: &Individual) -> Self {
        Self {
            id: individual.id,
            identity: individual.identity.clone(),
            full_name: individual.full_name.clone(),
            sex: individual.sex,
            age_years: individual.age_years,
            hpo_count: individual.hpo_count(),
            vcf_filename: individual.vcf_filename.clone(),
            created_at: individual.created_at,
            updated_at: individual.updated_at,
        }
    }
}

/// Individual detail page
#[derive(Debug, Serialize)]
pub struct IndividualDetail {
    #[serde(flatten)]
    pub individual: Individual,
    pub hpo_count: usize,
    pub analysis_count: i64,
}

/// Analysis with the fields the list and detail pages display
#[derive(Debug, Serialize)]
pub struct AnalysisView {
    #[serde(flatten)]
    pub analysis: Analysis,
    pub individual_identity: Option<String>,
    pub individual_name: Option<String>,
    pub duration_seconds: Option<i64>,
    pub has_report: bool,
}

impl AnalysisView {
    pub fn new(analysis: Analysis, individual: Option<&Individual>) -> Self {
        Self {
            individual_identity: individual.map(|i| i.identity.clone()),
            individual_name: individual.map(|i| i.full_name.clone()),
            duration_seconds: analysis.duration().map(|d| d.num_seconds()),
            has_report: analysis.output_html.is_some(),
            analysis,
        }
    }
}

/// Live output poll
#[derive(Debug, Serialize)]
pub struct OutputResponse {
    pub lines: Vec<String>,
    pub count: usize,
}

impl From<Vec<String>> for OutputResponse {
    fn from(lines: Vec<String>) -> Self {
        Self {
            count: lines.len(),
            lines,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub count: usize,
}

/// API information response
#[derive(Debug, Serialize)]
pub struct ApiInfoResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub endpoints: Vec<&'static str>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub database: bool,
    pub storage: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_response_counts_lines() {
        let response = OutputResponse::from(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(response.count, 2);

        let empty = serde_json::to_value(OutputResponse::from(Vec::new())).unwrap();
        assert_eq!(empty, serde_json::json!({"lines": [], "count": 0}));
    }

    #[test]
    fn test_action_response_omits_absent_fields() {
        let value = serde_json::to_value(ActionResponse::failed("Invalid action")).unwrap();
        assert_eq!(value, serde_json::json!({"success": false, "message": "Invalid action"}));
    }
}
