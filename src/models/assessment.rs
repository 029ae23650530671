use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::RiskLabel;
use super::observation::ClinicalObservation;

/// Output of one scoring call. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub id: Uuid,
    pub probability: f64,
    pub label: RiskLabel,
    pub confidence_percent: f64,
    pub model_version: String,
    pub created_at: DateTime<Utc>,
    pub requested_by: String,
}

/// An assessment together with the observation it was scored from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub assessment: RiskAssessment,
    pub observation: ClinicalObservation,
}

/// Aggregate counts over the assessment history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentStatistics {
    pub total: u64,
    pub diabetic: u64,
    pub non_diabetic: u64,
    pub mean_probability: Option<f64>,
}

/// Append-only audit record written alongside every assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
}
